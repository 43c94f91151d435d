//! Renders a filter tree to SQL text.

use std::collections::HashMap;

use tracing::debug;

use crate::ast::{Condition, FilterNode, FilterValue, Group, Literal, Operator, Placement};
use crate::dialect::Dialect;
use crate::error::QueryError;
use crate::tree::{check_depth, depth_of};

pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Dialect-aware filter renderer.
///
/// Output is deterministic: the same tree always renders to the same text,
/// and every group (including a single-child one) is parenthesised so that
/// parsing the output reproduces the structure.
#[derive(Debug, Clone)]
pub struct SqlGenerator {
    dialect: Dialect,
    max_depth: usize,
    /// Cast target per BETWEEN condition id, applied to both bounds.
    range_casts: HashMap<String, String>,
}

impl SqlGenerator {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            max_depth: DEFAULT_MAX_DEPTH,
            range_casts: HashMap::new(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_range_casts(mut self, casts: HashMap<String, String>) -> Self {
        self.range_casts = casts;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Renders any node. Empty groups render to an empty string.
    pub fn generate(&self, node: &FilterNode) -> Result<String, QueryError> {
        check_depth(depth_of(node), self.max_depth)?;
        Ok(self.render(node))
    }

    pub fn generate_group(&self, group: &Group) -> Result<String, QueryError> {
        check_depth(group.nesting_depth(), self.max_depth)?;
        Ok(self.render_group(group))
    }

    /// Renders only the part of `tree` with the given placement (and, for
    /// `On`, on `for_table`). `tree` itself is left as it is.
    pub fn generate_for_placement(
        &self,
        tree: &Group,
        placement: Placement,
        for_table: Option<&str>,
    ) -> Result<String, QueryError> {
        self.generate_group(&tree.for_placement(placement, for_table))
    }

    fn render(&self, node: &FilterNode) -> String {
        match node {
            FilterNode::Condition(c) => self.render_condition(c),
            FilterNode::Group(g) => self.render_group(g),
            FilterNode::Raw(r) => r.sql.trim().to_string(),
        }
    }

    fn render_group(&self, group: &Group) -> String {
        let parts: Vec<(String, bool)> = group
            .children
            .iter()
            .map(|child| (self.render(child), matches!(child, FilterNode::Raw(_))))
            .filter(|(sql, _)| !sql.is_empty())
            .collect();
        if parts.is_empty() {
            return String::new();
        }
        let combined = parts.len() > 1;
        let joined = parts
            .into_iter()
            .map(|(sql, raw)| if raw && combined { format!("({})", sql) } else { sql })
            .collect::<Vec<_>>()
            .join(&format!(" {} ", group.logic.as_sql()));
        format!("({})", joined)
    }

    /// Renders one condition; incomplete conditions render to nothing.
    pub fn render_condition(&self, condition: &Condition) -> String {
        if let Err(e) = condition.validate() {
            debug!(error = %e, "skipping incomplete condition");
            return String::new();
        }
        let column = self
            .dialect
            .quote_path([condition.table.as_str(), condition.column.as_str()]);

        match (condition.operator, &condition.value) {
            (Operator::IsNull | Operator::IsNotNull, _) => {
                format!("{} {}", column, condition.operator)
            }
            (Operator::In | Operator::NotIn, Some(FilterValue::List(values))) => {
                let items = values
                    .iter()
                    .map(|v| self.literal(v))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} {} ({})", column, condition.operator, items)
            }
            (Operator::Between, Some(FilterValue::Single(low))) => {
                let high = condition.value2.as_ref().map(|v| self.literal(v)).unwrap_or_default();
                let low = self.literal(low);
                match self.range_casts.get(&condition.id) {
                    Some(ty) => format!(
                        "{} BETWEEN {} AND {}",
                        column,
                        self.dialect.safe_cast(&low, ty),
                        self.dialect.safe_cast(&high, ty)
                    ),
                    None => format!("{} BETWEEN {} AND {}", column, low, high),
                }
            }
            (Operator::ILike, Some(FilterValue::Single(v))) if !self.dialect.supports_ilike() => {
                format!("{} LIKE {}", column, self.literal(v))
            }
            (op, Some(FilterValue::Single(v))) => format!("{} {} {}", column, op, self.literal(v)),
            // validate() rules out every other shape
            _ => String::new(),
        }
    }

    pub fn literal(&self, literal: &Literal) -> String {
        match literal {
            Literal::Integer(n) => n.to_string(),
            // `{:?}` keeps the fraction (`2.0`, `-0.0`) so the text reads back as a float
            Literal::Float(f) if f.is_finite() => format!("{:?}", f),
            Literal::Float(f) => self.dialect.quote_string(&f.to_string()),
            Literal::Boolean(true) => "TRUE".to_string(),
            Literal::Boolean(false) => "FALSE".to_string(),
            Literal::String(s) => self.dialect.quote_string(s),
        }
    }
}
