//! Table references and the attach aliases of external databases.
//!
//! A federated statement runs on the local engine with every external
//! connection attached under a short alias; tables of that connection are
//! then qualified as `"alias"."schema"."table"`.

use std::collections::HashSet;

use sea_query::{Alias, IntoIden, TableRef};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dialect::Dialect;
use crate::error::QueryError;

/// Catalog names the local engine already uses.
const RESERVED_ALIASES: &[&str] = &["main", "memory", "system", "temp"];

/// An external database known to the connections registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseConnection {
    pub id: String,
    pub name: String,
    /// Engine name such as `mysql`, `postgresql` or `sqlite`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// One external connection attached to a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachDatabase {
    pub alias: String,
    pub connection_id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TableSource {
    Local,
    External { connection: DatabaseConnection },
}

/// A column as reported by schema introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A table taking part in a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub source: TableSource,
    /// Available columns with their reported types.
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

impl TableDescriptor {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            source: TableSource::Local,
            columns: Vec::new(),
        }
    }

    pub fn external(name: impl Into<String>, connection: DatabaseConnection) -> Self {
        Self {
            name: name.into(),
            schema: None,
            source: TableSource::External { connection },
            columns: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_columns(mut self, columns: Vec<ColumnInfo>) -> Self {
        self.columns = columns;
        self
    }

    pub fn is_external(&self) -> bool {
        matches!(self.source, TableSource::External { .. })
    }

    pub fn column_type(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.data_type.as_str())
    }
}

/// A resolved table reference. Only external references carry an attach
/// alias, so a local reference can never be rendered with one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TableReference {
    Local {
        name: String,
        schema: Option<String>,
    },
    External {
        name: String,
        schema: Option<String>,
        alias: String,
        connection_id: String,
    },
}

impl TableReference {
    pub fn name(&self) -> &str {
        match self {
            TableReference::Local { name, .. } | TableReference::External { name, .. } => name,
        }
    }

    pub fn schema(&self) -> Option<&str> {
        match self {
            TableReference::Local { schema, .. } | TableReference::External { schema, .. } => {
                schema.as_deref()
            }
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, TableReference::External { .. })
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            TableReference::Local { .. } => None,
            TableReference::External { alias, .. } => Some(alias),
        }
    }

    /// Qualifier parts in order: attach alias, schema, table.
    fn parts(&self) -> Vec<&str> {
        self.alias()
            .into_iter()
            .chain(self.schema())
            .chain(std::iter::once(self.name()))
            .collect()
    }

    /// The reference as a sea-query table for statement building.
    pub fn table_ref(&self) -> TableRef {
        let idens: Vec<_> = self
            .parts()
            .into_iter()
            .map(|p| Alias::new(p).into_iden())
            .collect();
        match <[_; 3]>::try_from(idens) {
            Ok([db, schema, table]) => TableRef::DatabaseSchemaTable(db, schema, table),
            Err(idens) => match <[_; 2]>::try_from(idens) {
                Ok([schema, table]) => TableRef::SchemaTable(schema, table),
                Err(mut idens) => TableRef::Table(idens.remove(0)),
            },
        }
    }
}

/// Attach entries for the distinct external connections among `tables`, in
/// order of first appearance. Same input, same aliases.
pub fn extract_attach_databases(tables: &[TableDescriptor]) -> Vec<AttachDatabase> {
    let mut seen_connections = HashSet::new();
    let mut used_aliases: HashSet<String> = RESERVED_ALIASES.iter().map(|s| s.to_string()).collect();
    let mut attached = Vec::new();

    for table in tables {
        let TableSource::External { connection } = &table.source else {
            continue;
        };
        if !seen_connections.insert(connection.id.as_str()) {
            continue;
        }
        let base = sanitize_alias(&format!("{}_{}", connection.kind, connection.name));
        let mut alias = base.clone();
        let mut suffix = 2;
        while used_aliases.contains(&alias) {
            alias = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        used_aliases.insert(alias.clone());
        debug!(%alias, connection_id = %connection.id, "attaching external database");
        attached.push(AttachDatabase {
            alias,
            connection_id: connection.id.clone(),
            kind: connection.kind.clone(),
        });
    }
    attached
}

/// Lowercase, non-alphanumerics as `_`, starting with a letter.
fn sanitize_alias(raw: &str) -> String {
    let mut alias = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_alphanumeric() { c } else { '_' };
        if c == '_' && alias.ends_with('_') {
            continue;
        }
        alias.push(c);
    }
    let alias = alias.trim_matches('_');
    match alias.chars().next() {
        None => "db".to_string(),
        Some(c) if c.is_ascii_lowercase() => alias.to_string(),
        Some(_) => format!("db_{}", alias),
    }
}

/// Resolves `table` against the attach list computed for the same query.
pub fn create_table_reference(
    table: &TableDescriptor,
    attach_databases: &[AttachDatabase],
) -> Result<TableReference, QueryError> {
    match &table.source {
        TableSource::Local => Ok(TableReference::Local {
            name: table.name.clone(),
            schema: table.schema.clone(),
        }),
        TableSource::External { connection } => {
            let attached = attach_databases
                .iter()
                .find(|a| a.connection_id == connection.id)
                .ok_or_else(|| QueryError::UnknownConnectionAlias {
                    table: table.name.clone(),
                    connection_id: connection.id.clone(),
                })?;
            Ok(TableReference::External {
                name: table.name.clone(),
                schema: table.schema.clone(),
                alias: attached.alias.clone(),
                connection_id: connection.id.clone(),
            })
        }
    }
}

/// `"alias"."schema"."name"` for external tables, `"schema"."name"` for
/// local ones, dropping the schema when absent.
pub fn format_table_reference(reference: &TableReference, dialect: Dialect) -> String {
    dialect.quote_path(reference.parts())
}

/// Where the assembled statement has to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExecutionSource {
    /// Only local tables.
    DuckDb,
    /// At least one external table; the listed databases must be attached.
    Federated { attach_databases: Vec<AttachDatabase> },
}

impl ExecutionSource {
    pub fn for_attachments(attach_databases: &[AttachDatabase]) -> Self {
        if attach_databases.is_empty() {
            ExecutionSource::DuckDb
        } else {
            ExecutionSource::Federated {
                attach_databases: attach_databases.to_vec(),
            }
        }
    }
}
