//! Type conflicts between the two sides of a join comparison, and between
//! the bounds of a BETWEEN condition.
//!
//! Reported column types are folded into a handful of categories; any pair
//! of distinct categories is a conflict that needs a cast before the
//! statement may run. Resolutions are kept per conflict key for the length
//! of an editing session.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ast::{FilterValue, Group, Literal, Operator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCategory {
    Integer,
    Float,
    String,
    Boolean,
    Temporal,
    Unknown,
}

impl TypeCategory {
    /// Folds a type name as reported by an engine (`VARCHAR(255)`,
    /// `bigint unsigned`, `timestamp with time zone`, ...) into a category.
    pub fn from_sql_type(sql_type: &str) -> Self {
        let lowered = sql_type.trim().to_ascii_lowercase();
        // MySQL reports booleans as tinyint(1)
        if lowered.replace(' ', "").starts_with("tinyint(1)") {
            return TypeCategory::Boolean;
        }
        if lowered.ends_with("[]") {
            return TypeCategory::Unknown;
        }
        let base = lowered
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .trim_end_matches(" unsigned")
            .trim();

        match base {
            "int" | "integer" | "bigint" | "smallint" | "tinyint" | "mediumint" | "hugeint"
            | "int1" | "int2" | "int4" | "int8" | "serial" | "bigserial" | "smallserial"
            | "ubigint" | "uinteger" | "usmallint" | "utinyint" | "uhugeint" | "long" => {
                TypeCategory::Integer
            }
            "float" | "float4" | "float8" | "double" | "double precision" | "real" | "decimal"
            | "numeric" | "money" | "number" => TypeCategory::Float,
            "varchar" | "char" | "character" | "character varying" | "text" | "string"
            | "nvarchar" | "nchar" | "bpchar" | "tinytext" | "mediumtext" | "longtext" | "clob"
            | "uuid" | "json" | "jsonb" | "enum" | "name" => TypeCategory::String,
            "bool" | "boolean" | "bit" => TypeCategory::Boolean,
            "date" | "datetime" | "year" | "interval" | "timestamptz" | "timetz" => {
                TypeCategory::Temporal
            }
            _ if base.starts_with("time") => TypeCategory::Temporal,
            _ => TypeCategory::Unknown,
        }
    }

    /// Category of a filter literal. Strings that read as a date or a
    /// timestamp count as temporal.
    pub fn of_literal(literal: &Literal) -> Self {
        match literal {
            Literal::Integer(_) => TypeCategory::Integer,
            Literal::Float(_) => TypeCategory::Float,
            Literal::Boolean(_) => TypeCategory::Boolean,
            Literal::String(s) if is_temporal(s) => TypeCategory::Temporal,
            Literal::String(_) => TypeCategory::String,
        }
    }
}

impl fmt::Display for TypeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeCategory::Integer => "integer",
            TypeCategory::Float => "float",
            TypeCategory::String => "string",
            TypeCategory::Boolean => "boolean",
            TypeCategory::Temporal => "temporal",
            TypeCategory::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

fn is_temporal(s: &str) -> bool {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveTime::parse_from_str(s, "%H:%M:%S").is_ok()
        || DateTime::parse_from_rfc3339(s).is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Compatible,
    Castable,
    Unsafe,
}

/// Verdict and recommended cast target for a pair of categories.
///
/// An `Unknown` side gives no basis to block a join, so it is compatible
/// with anything.
pub fn classify(left: TypeCategory, right: TypeCategory) -> (Verdict, Option<&'static str>) {
    use TypeCategory::*;
    match (left, right) {
        (Unknown, _) | (_, Unknown) => (Verdict::Compatible, None),
        (l, r) if l == r => (Verdict::Compatible, None),
        (Integer, Float) | (Float, Integer) => (Verdict::Castable, Some("DOUBLE")),
        (String, _) | (_, String) => (Verdict::Castable, Some("VARCHAR")),
        (Boolean, Integer) | (Integer, Boolean) => (Verdict::Castable, Some("BIGINT")),
        _ => (Verdict::Unsafe, Some("VARCHAR")),
    }
}

/// Identity of a conflict, stable across re-detection of an unchanged
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConflictKey {
    Join {
        left_table: String,
        left_column: String,
        right_table: String,
        right_column: String,
    },
    /// The two bounds of the BETWEEN condition with this node id.
    Range { node_id: String },
}

impl fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKey::Join {
                left_table,
                left_column,
                right_table,
                right_column,
            } => write!(f, "{}.{} = {}.{}", left_table, left_column, right_table, right_column),
            ConflictKey::Range { node_id } => write!(f, "BETWEEN bounds of {}", node_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "cast_type", rename_all = "kebab-case")]
pub enum Resolution {
    #[default]
    Unresolved,
    AcceptedDefault,
    UserOverridden(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeConflict {
    pub key: ConflictKey,
    pub left_type: String,
    pub right_type: String,
    pub verdict: Verdict,
    pub recommended_cast: Option<String>,
    pub resolution: Resolution,
}

impl TypeConflict {
    /// Compatible conflicts never block; the rest need a resolution.
    pub fn is_blocking(&self) -> bool {
        self.verdict != Verdict::Compatible && self.resolution == Resolution::Unresolved
    }

    /// The cast type to apply, once resolved.
    pub fn cast_type(&self) -> Option<&str> {
        match &self.resolution {
            Resolution::Unresolved => None,
            Resolution::AcceptedDefault => self.recommended_cast.as_deref(),
            Resolution::UserOverridden(ty) => Some(ty),
        }
    }
}

/// A column comparison used as a join predicate, with the reported types of
/// both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPair {
    pub left_table: String,
    pub left_column: String,
    pub left_type: String,
    pub right_table: String,
    pub right_column: String,
    pub right_type: String,
}

impl ColumnPair {
    pub fn key(&self) -> ConflictKey {
        ConflictKey::Join {
            left_table: self.left_table.clone(),
            left_column: self.left_column.clone(),
            right_table: self.right_table.clone(),
            right_column: self.right_column.clone(),
        }
    }
}

/// Session state of the conflicts found in the current join configuration.
#[derive(Debug, Clone, Default)]
pub struct TypeConflictDetector {
    conflicts: Vec<TypeConflict>,
}

impl TypeConflictDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-runs detection over the join column pairs and the BETWEEN
    /// conditions of `filter`. Conflicts whose key survives keep their
    /// resolution; the others are forgotten.
    pub fn detect(&mut self, pairs: &[ColumnPair], filter: &Group) -> &[TypeConflict] {
        let mut previous: HashMap<ConflictKey, Resolution> = self
            .conflicts
            .drain(..)
            .map(|c| (c.key, c.resolution))
            .collect();

        let mut found = Vec::new();
        for pair in pairs {
            let left = TypeCategory::from_sql_type(&pair.left_type);
            let right = TypeCategory::from_sql_type(&pair.right_type);
            found.push((pair.key(), pair.left_type.clone(), pair.right_type.clone(), left, right));
        }
        for condition in filter.conditions() {
            if condition.operator != Operator::Between {
                continue;
            }
            let (Some(FilterValue::Single(low)), Some(high)) = (&condition.value, &condition.value2)
            else {
                continue;
            };
            let left = TypeCategory::of_literal(low);
            let right = TypeCategory::of_literal(high);
            let key = ConflictKey::Range {
                node_id: condition.id.clone(),
            };
            found.push((key, left.to_string(), right.to_string(), left, right));
        }

        for (key, left_type, right_type, left, right) in found {
            let (verdict, cast) = classify(left, right);
            if verdict == Verdict::Compatible {
                continue;
            }
            if self.conflicts.iter().any(|c| c.key == key) {
                continue;
            }
            let resolution = previous.remove(&key).unwrap_or_default();
            debug!(%key, ?verdict, ?cast, "type conflict");
            self.conflicts.push(TypeConflict {
                key,
                left_type,
                right_type,
                verdict,
                recommended_cast: cast.map(str::to_string),
                resolution,
            });
        }
        &self.conflicts
    }

    pub fn conflicts(&self) -> &[TypeConflict] {
        &self.conflicts
    }

    pub fn get(&self, key: &ConflictKey) -> Option<&TypeConflict> {
        self.conflicts.iter().find(|c| &c.key == key)
    }

    /// Accepts the recommended cast for every unresolved conflict.
    pub fn resolve_all_with_recommendations(&mut self) {
        for conflict in &mut self.conflicts {
            if conflict.resolution == Resolution::Unresolved && conflict.recommended_cast.is_some() {
                conflict.resolution = Resolution::AcceptedDefault;
            }
        }
    }

    /// Overrides the cast of one conflict; `None` clears it back to
    /// unresolved. Returns false when the key is unknown or the type name is
    /// not a plain SQL type.
    pub fn resolve_conflict(&mut self, key: &ConflictKey, cast_type: Option<&str>) -> bool {
        let Some(conflict) = self.conflicts.iter_mut().find(|c| &c.key == key) else {
            return false;
        };
        match cast_type {
            None => conflict.resolution = Resolution::Unresolved,
            Some(ty) if is_valid_type_name(ty) => {
                conflict.resolution = Resolution::UserOverridden(ty.trim().to_ascii_uppercase())
            }
            Some(_) => return false,
        }
        true
    }

    /// Conflicts that still block execution.
    pub fn unresolved(&self) -> Vec<TypeConflict> {
        self.conflicts.iter().filter(|c| c.is_blocking()).cloned().collect()
    }

    pub fn cast_for(&self, key: &ConflictKey) -> Option<&str> {
        self.get(key).and_then(TypeConflict::cast_type)
    }

    /// Resolved BETWEEN casts by condition id.
    pub fn range_casts(&self) -> HashMap<String, String> {
        self.conflicts
            .iter()
            .filter_map(|c| match (&c.key, c.cast_type()) {
                (ConflictKey::Range { node_id }, Some(ty)) => Some((node_id.clone(), ty.to_string())),
                _ => None,
            })
            .collect()
    }
}

/// Type names are spliced into CAST expressions, so only a conservative
/// character set is accepted.
fn is_valid_type_name(ty: &str) -> bool {
    let ty = ty.trim();
    !ty.is_empty()
        && ty.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && ty
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '(' | ')' | ','))
}
