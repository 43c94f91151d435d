//! Filter-tree to SQL compiler for federated queries.
//!
//! The text side (`token`, `lexer`, `parser`) turns WHERE-clause text into a
//! filter tree; `generator` renders a tree back to text; `sql_compiler`
//! assembles whole statements over local and attached external tables.

pub mod ast;
pub mod config;
pub mod dialect;
pub mod error;
pub mod federation;
pub mod generator;
pub mod lexer;
pub mod parser;
pub mod sql_compiler;
pub mod token;
pub mod tree;
pub mod type_conflict;

pub use ast::{Condition, FilterGroup, FilterNode, Group, Literal, Logic, Operator, Placement};
pub use config::CompilerConfig;
pub use dialect::Dialect;
pub use error::QueryError;
pub use parser::{ParseOutcome, ParseWarning, ParserConfig};
pub use sql_compiler::{QueryPlan, SqlCompiler};

/// Renders a filter tree for the SQL text view.
pub fn generate_filter_sql(tree: &Group, dialect: Dialect) -> Result<String, QueryError> {
    generator::SqlGenerator::new(dialect).generate_group(tree)
}

/// Parses the SQL text view back into a filter tree, with default limits.
pub fn parse_filter_sql(text: &str, dialect: Dialect) -> Result<ParseOutcome, QueryError> {
    let config = ParserConfig {
        dialect,
        ..ParserConfig::default()
    };
    parser::parse_filter(text, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FilterValue;
    use crate::type_conflict::TypeConflictDetector;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_text_view_round_trip() {
        let text = r#"age > 30 AND (status = 'active' OR status = 'pending')"#;
        let parsed = parse_filter_sql(text, Dialect::DuckDb).unwrap();
        assert!(parsed.warnings.is_empty());

        let tree = parsed.into_root();
        let sql = generate_filter_sql(&tree, Dialect::DuckDb).unwrap();
        assert_eq!(
            sql,
            r#"("age" > 30 AND ("status" = 'active' OR "status" = 'pending'))"#
        );

        let again = parse_filter_sql(&sql, Dialect::DuckDb).unwrap().into_root();
        assert_eq!(generate_filter_sql(&again, Dialect::DuckDb).unwrap(), sql);
    }

    #[test]
    fn test_float_literals_keep_their_type_through_text() {
        let tree = Group::with_children(
            Logic::And,
            vec![
                Condition::between("o", "total", 1.5, 2.0).into(),
                Condition::compare("t", "x", Operator::Eq, -0.0).into(),
            ],
        );
        let sql = generate_filter_sql(&tree, Dialect::DuckDb).unwrap();
        assert_eq!(
            sql,
            r#"("o"."total" BETWEEN 1.5 AND 2.0 AND "t"."x" = -0.0)"#
        );

        let parsed = parse_filter_sql(&sql, Dialect::DuckDb).unwrap().into_root();
        let conditions = parsed.conditions();
        assert_eq!(conditions[0].value2, Some(Literal::Float(2.0)));
        match &conditions[1].value {
            Some(FilterValue::Single(Literal::Float(f))) => {
                assert!(*f == 0.0 && f.is_sign_negative())
            }
            other => panic!("expected negative zero, got {:?}", other),
        }
        assert_eq!(generate_filter_sql(&parsed, Dialect::DuckDb).unwrap(), sql);

        let mut detector = TypeConflictDetector::new();
        assert_eq!(detector.detect(&[], &tree).len(), 0);
        assert_eq!(detector.detect(&[], &parsed).len(), 0);
    }
}
