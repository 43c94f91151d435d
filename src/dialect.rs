//! Per-dialect quoting of identifiers and literal values.

use std::fmt;
use std::str::FromStr;

use sea_query::{
    Alias, Iden, MysqlQueryBuilder, PostgresQueryBuilder, Quote, QuotedBuilder, SelectStatement,
    SqliteQueryBuilder,
};
use serde::{Deserialize, Serialize};

/// Target SQL dialect. DuckDB is the engine federated statements run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    DuckDb,
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Identifier quote character, taken from the matching sea-query backend.
    /// DuckDB follows the PostgreSQL quoting rules.
    fn quote(self) -> Quote {
        match self {
            Dialect::DuckDb | Dialect::Postgres => PostgresQueryBuilder.quote(),
            Dialect::MySql => MysqlQueryBuilder.quote(),
            Dialect::Sqlite => SqliteQueryBuilder.quote(),
        }
    }

    /// Quotes a single identifier, doubling any embedded quote character.
    pub fn quote_identifier(self, ident: &str) -> String {
        let mut out = String::with_capacity(ident.len() + 2);
        Alias::new(ident).prepare(&mut out, self.quote());
        out
    }

    /// Quotes and dot-joins a qualified name, skipping empty parts.
    pub fn quote_path<'a>(self, parts: impl IntoIterator<Item = &'a str>) -> String {
        parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .map(|p| self.quote_identifier(p))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Renders a string literal.
    pub fn quote_string(self, value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('\'');
        for c in value.chars() {
            match c {
                '\'' => out.push_str("''"),
                '\\' if self.backslash_escapes() => out.push_str("\\\\"),
                _ => out.push(c),
            }
        }
        out.push('\'');
        out
    }

    /// Whether `\` starts an escape sequence inside string literals.
    pub fn backslash_escapes(self) -> bool {
        matches!(self, Dialect::MySql)
    }

    /// Whether the dialect has a native `ILIKE` operator.
    pub fn supports_ilike(self) -> bool {
        !matches!(self, Dialect::MySql)
    }

    /// Wraps `expr` in a cast that yields NULL instead of failing where the
    /// dialect allows it.
    pub fn safe_cast(self, expr: &str, sql_type: &str) -> String {
        match self {
            Dialect::DuckDb => format!("TRY_CAST({} AS {})", expr, sql_type),
            Dialect::MySql => format!("CAST({} AS {})", expr, mysql_cast_type(sql_type)),
            Dialect::Postgres | Dialect::Sqlite => format!("CAST({} AS {})", expr, sql_type),
        }
    }

    /// Renders a sea-query statement with the matching backend.
    pub fn render(self, select: &SelectStatement) -> String {
        match self {
            Dialect::DuckDb | Dialect::Postgres => select.to_string(PostgresQueryBuilder),
            Dialect::MySql => select.to_string(MysqlQueryBuilder),
            Dialect::Sqlite => select.to_string(SqliteQueryBuilder),
        }
    }
}

/// MySQL's CAST only accepts a handful of target types.
fn mysql_cast_type(sql_type: &str) -> &str {
    match sql_type.to_ascii_uppercase().as_str() {
        "VARCHAR" | "TEXT" => "CHAR",
        "BIGINT" | "INTEGER" | "INT" => "SIGNED",
        "TIMESTAMP" => "DATETIME",
        "BOOLEAN" => "UNSIGNED",
        _ => sql_type,
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::DuckDb => "duckdb",
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duckdb" => Ok(Dialect::DuckDb),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(format!("unknown dialect '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(Dialect::DuckDb.quote_identifier("orders"), "\"orders\"");
        assert_eq!(Dialect::MySql.quote_identifier("orders"), "`orders`");
        assert_eq!(Dialect::Postgres.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_path_skips_empty_parts() {
        assert_eq!(
            Dialect::DuckDb.quote_path(["", "orders", "id"]),
            "\"orders\".\"id\""
        );
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(Dialect::DuckDb.quote_string("O'Brien"), "'O''Brien'");
        assert_eq!(Dialect::DuckDb.quote_string("C:\\dir"), "'C:\\dir'");
        assert_eq!(Dialect::MySql.quote_string("C:\\dir"), "'C:\\\\dir'");
    }

    #[test]
    fn test_safe_cast() {
        assert_eq!(Dialect::DuckDb.safe_cast("x", "VARCHAR"), "TRY_CAST(x AS VARCHAR)");
        assert_eq!(Dialect::Postgres.safe_cast("x", "VARCHAR"), "CAST(x AS VARCHAR)");
        assert_eq!(Dialect::MySql.safe_cast("x", "VARCHAR"), "CAST(x AS CHAR)");
    }

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("PostgreSQL".parse::<Dialect>(), Ok(Dialect::Postgres));
        assert_eq!("duckdb".parse::<Dialect>(), Ok(Dialect::DuckDb));
        assert!("oracle".parse::<Dialect>().is_err());
    }
}
