//! Assembles a complete SELECT statement from the selected tables, their
//! join specs and the filter tree, using sea-query for statement layout.

use std::collections::{HashMap, HashSet};

use sea_query::{Alias, Asterisk, Expr, JoinType, Query, SelectStatement};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ast::{Condition, Group, Operator, Placement};
use crate::config::CompilerConfig;
use crate::federation::{
    create_table_reference, extract_attach_databases, AttachDatabase, ExecutionSource,
    TableDescriptor, TableReference,
};
use crate::error::QueryError;
use crate::generator::SqlGenerator;
use crate::type_conflict::{ColumnPair, ConflictKey, TypeConflict, TypeConflictDetector};

/// Always-true ON clause standing in for a join the user has not finished.
pub const JOIN_PLACEHOLDER: &str = "TRUE /* join condition required */";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    fn join_type(self) -> JoinType {
        match self {
            JoinKind::Inner => JoinType::InnerJoin,
            JoinKind::Left => JoinType::LeftJoin,
            JoinKind::Right => JoinType::RightJoin,
            JoinKind::Full => JoinType::FullOuterJoin,
        }
    }

    /// Moving a predicate from ON into the joined side only preserves the
    /// result when that side is the optional one (or neither is).
    pub fn allows_push_down(self) -> bool {
        matches!(self, JoinKind::Inner | JoinKind::Left)
    }
}

/// One side of a join comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum JoinOperand {
    /// A column of a selected table, by table alias.
    Column { table: String, column: String },
    /// Free-form SQL substituted verbatim.
    Expression { sql: String },
}

impl JoinOperand {
    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
        JoinOperand::Column {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn expression(sql: impl Into<String>) -> Self {
        JoinOperand::Expression { sql: sql.into() }
    }

    fn is_complete(&self) -> bool {
        match self {
            JoinOperand::Column { table, column } => !table.is_empty() && !column.is_empty(),
            JoinOperand::Expression { sql } => !sql.trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinCondition {
    pub left: JoinOperand,
    pub operator: Operator,
    pub right: JoinOperand,
}

impl JoinCondition {
    pub fn new(left: JoinOperand, operator: Operator, right: JoinOperand) -> Self {
        Self {
            left,
            operator,
            right,
        }
    }

    /// `left_table.left_column = right_table.right_column`
    pub fn columns_eq(
        left_table: &str,
        left_column: &str,
        right_table: &str,
        right_column: &str,
    ) -> Self {
        Self::new(
            JoinOperand::column(left_table, left_column),
            Operator::Eq,
            JoinOperand::column(right_table, right_column),
        )
    }

    fn is_complete(&self) -> bool {
        self.operator.is_comparison() && self.left.is_complete() && self.right.is_complete()
    }
}

/// How table `i + 1` is joined to the tables before it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JoinSpec {
    pub kind: JoinKind,
    #[serde(default)]
    pub conditions: Vec<JoinCondition>,
}

impl JoinSpec {
    pub fn new(kind: JoinKind, conditions: Vec<JoinCondition>) -> Self {
        Self { kind, conditions }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryShape {
    /// Nothing selected yet; there is no statement.
    Empty,
    SingleTable,
    Joined,
}

/// The assembled statement and everything the caller needs to run it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub sql: String,
    pub attach_databases: Vec<AttachDatabase>,
    /// Conflicts that block execution until resolved.
    pub unresolved_conflicts: Vec<TypeConflict>,
    pub source: ExecutionSource,
    pub shape: QueryShape,
    /// Aliases of joined tables whose ON clause is still the placeholder.
    pub incomplete_joins: Vec<String>,
}

impl QueryPlan {
    fn empty() -> Self {
        Self {
            sql: String::new(),
            attach_databases: Vec::new(),
            unresolved_conflicts: Vec::new(),
            source: ExecutionSource::DuckDb,
            shape: QueryShape::Empty,
            incomplete_joins: Vec::new(),
        }
    }

    pub fn is_executable(&self) -> bool {
        self.shape != QueryShape::Empty
            && self.unresolved_conflicts.is_empty()
            && self.incomplete_joins.is_empty()
    }
}

/// A selected table together with its alias and resolved reference.
struct Bound<'t> {
    table: &'t TableDescriptor,
    alias: String,
    reference: TableReference,
}

/// Query assembler. Holds the type-conflict resolutions of the current
/// editing session, so one compiler should serve one query editor.
#[derive(Debug, Clone, Default)]
pub struct SqlCompiler {
    config: CompilerConfig,
    conflicts: TypeConflictDetector,
}

impl SqlCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: CompilerConfig) -> Self {
        Self {
            config,
            conflicts: TypeConflictDetector::new(),
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn conflicts(&self) -> &TypeConflictDetector {
        &self.conflicts
    }

    /// Resolution state of the session's type conflicts.
    pub fn conflicts_mut(&mut self) -> &mut TypeConflictDetector {
        &mut self.conflicts
    }

    /// Builds the statement for `tables` in order. `joins[i]` joins
    /// `tables[i + 1]`; `selected_columns` maps table aliases to the output
    /// columns chosen for them (none at all selects `*`).
    pub fn build_query(
        &mut self,
        tables: &[TableDescriptor],
        joins: &[JoinSpec],
        filter: &Group,
        selected_columns: &HashMap<String, Vec<String>>,
    ) -> Result<QueryPlan, QueryError> {
        filter.validate_nesting_depth(self.config.max_nesting_depth)?;
        if tables.is_empty() {
            self.conflicts.detect(&[], &Group::default());
            return Ok(QueryPlan::empty());
        }

        let attach_databases = extract_attach_databases(tables);
        let aliases = table_aliases(tables);
        let bound = tables
            .iter()
            .zip(aliases)
            .map(|(table, alias)| {
                create_table_reference(table, &attach_databases).map(|reference| Bound {
                    table,
                    alias,
                    reference,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if joins.len() >= bound.len() {
            warn!(
                joins = joins.len(),
                tables = bound.len(),
                "ignoring join specs without a table to join"
            );
        }
        let joins = &joins[..joins.len().min(bound.len() - 1)];

        self.conflicts.detect(&column_pairs(&bound, joins), filter);
        let generator = SqlGenerator::new(self.config.dialect)
            .with_max_depth(self.config.max_nesting_depth)
            .with_range_casts(self.conflicts.range_casts());

        let mut select = Query::select();
        self.select_columns(&mut select, &bound, selected_columns);
        let first = &bound[0];
        select.from(first.reference.table_ref().alias(Alias::new(&first.alias)));

        let joined: HashSet<&str> = bound[1..].iter().map(|b| b.alias.as_str()).collect();
        let mut incomplete_joins = Vec::new();
        for (i, target) in bound.iter().enumerate().skip(1) {
            let default_spec = JoinSpec::default();
            let spec = joins.get(i - 1).unwrap_or(&default_spec);
            let on_filter =
                generator.generate_for_placement(filter, Placement::On, Some(&target.alias))?;
            let mut on_parts: Vec<String> = spec
                .conditions
                .iter()
                .filter(|c| c.is_complete())
                .map(|c| self.render_join_condition(c))
                .collect();

            let push_down = self.config.push_down_join_filters
                && spec.kind.allows_push_down()
                && !on_parts.is_empty()
                && !on_filter.is_empty();
            if !push_down && !on_filter.is_empty() {
                on_parts.push(on_filter.clone());
            }

            let on = if on_parts.is_empty() {
                warn!(table = %target.alias, "join has no condition, using placeholder");
                incomplete_joins.push(target.alias.clone());
                JOIN_PLACEHOLDER.to_string()
            } else {
                on_parts.join(" AND ")
            };

            if push_down {
                debug!(table = %target.alias, "pushing join filter into derived table");
                let mut derived = Query::select();
                derived
                    .column(Asterisk)
                    .from(target.reference.table_ref().alias(Alias::new(&target.alias)))
                    .and_where(Expr::cust(on_filter));
                select.join_subquery(
                    spec.kind.join_type(),
                    derived,
                    Alias::new(&target.alias),
                    Expr::cust(on),
                );
            } else {
                select.join(
                    spec.kind.join_type(),
                    target.reference.table_ref().alias(Alias::new(&target.alias)),
                    Expr::cust(on),
                );
            }
        }

        // ON-placed conditions without a matching joined table fall back to WHERE
        let where_tree = filter.filtered(&|leaf: Option<&Condition>| match leaf {
            None => true,
            Some(c) => c.placement == Placement::Where || !joined.contains(c.table.as_str()),
        });
        let where_sql = generator.generate_group(&where_tree)?;
        if !where_sql.is_empty() {
            select.and_where(Expr::cust(where_sql));
        }
        select.limit(self.config.max_rows);

        let sql = self.config.dialect.render(&select);
        debug!(%sql, "assembled query");
        Ok(QueryPlan {
            sql,
            source: ExecutionSource::for_attachments(&attach_databases),
            attach_databases,
            unresolved_conflicts: self.conflicts.unresolved(),
            shape: if bound.len() == 1 {
                QueryShape::SingleTable
            } else {
                QueryShape::Joined
            },
            incomplete_joins,
        })
    }

    /// Qualified output columns; a name selected from more than one table is
    /// aliased `<table>_<column>` on every occurrence.
    fn select_columns(
        &self,
        select: &mut SelectStatement,
        bound: &[Bound<'_>],
        selected_columns: &HashMap<String, Vec<String>>,
    ) {
        let chosen: Vec<(&str, &str)> = bound
            .iter()
            .flat_map(|b| {
                selected_columns
                    .get(&b.alias)
                    .into_iter()
                    .flatten()
                    .map(move |col| (b.alias.as_str(), col.as_str()))
            })
            .collect();
        if chosen.is_empty() {
            select.column(Asterisk);
            return;
        }

        let mut seen = HashMap::new();
        for (_, col) in &chosen {
            *seen.entry(*col).or_insert(0usize) += 1;
        }
        for (table, col) in chosen {
            let expr = Expr::col((Alias::new(table), Alias::new(col)));
            if seen.get(col).copied().unwrap_or(0) > 1 {
                select.expr_as(expr, Alias::new(format!("{}_{}", table, col)));
            } else {
                select.expr(expr);
            }
        }
    }

    fn render_join_condition(&self, condition: &JoinCondition) -> String {
        let dialect = self.config.dialect;
        let render = |operand: &JoinOperand| match operand {
            JoinOperand::Column { table, column } => {
                dialect.quote_path([table.as_str(), column.as_str()])
            }
            JoinOperand::Expression { sql } => sql.trim().to_string(),
        };
        let (mut left, mut right) = (render(&condition.left), render(&condition.right));
        if let Some(pair) = pair_key(condition) {
            if let Some(ty) = self.conflicts.cast_for(&pair) {
                left = dialect.safe_cast(&left, ty);
                right = dialect.safe_cast(&right, ty);
            }
        }
        format!("{} {} {}", left, condition.operator, right)
    }
}

/// Table names as aliases, suffixed `_2`, `_3`, ... on repeats.
fn table_aliases(tables: &[TableDescriptor]) -> Vec<String> {
    let mut used = HashSet::new();
    tables
        .iter()
        .map(|table| {
            let mut alias = table.name.clone();
            let mut suffix = 2;
            while used.contains(&alias) {
                alias = format!("{}_{}", table.name, suffix);
                suffix += 1;
            }
            used.insert(alias.clone());
            alias
        })
        .collect()
}

fn pair_key(condition: &JoinCondition) -> Option<ConflictKey> {
    match (&condition.left, &condition.right) {
        (
            JoinOperand::Column {
                table: left_table,
                column: left_column,
            },
            JoinOperand::Column {
                table: right_table,
                column: right_column,
            },
        ) => Some(ConflictKey::Join {
            left_table: left_table.clone(),
            left_column: left_column.clone(),
            right_table: right_table.clone(),
            right_column: right_column.clone(),
        }),
        _ => None,
    }
}

/// Column-to-column join comparisons with the reported type of each side.
fn column_pairs(bound: &[Bound<'_>], joins: &[JoinSpec]) -> Vec<ColumnPair> {
    let column_type = |alias: &str, column: &str| {
        bound
            .iter()
            .find(|b| b.alias == alias)
            .and_then(|b| b.table.column_type(column))
            .unwrap_or_default()
            .to_string()
    };
    joins
        .iter()
        .flat_map(|spec| &spec.conditions)
        .filter(|c| c.is_complete())
        .filter_map(|c| match (&c.left, &c.right) {
            (
                JoinOperand::Column {
                    table: left_table,
                    column: left_column,
                },
                JoinOperand::Column {
                    table: right_table,
                    column: right_column,
                },
            ) => Some(ColumnPair {
                left_type: column_type(left_table, left_column),
                right_type: column_type(right_table, right_column),
                left_table: left_table.clone(),
                left_column: left_column.clone(),
                right_table: right_table.clone(),
                right_column: right_column.clone(),
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Logic, Operator};
    use crate::dialect::Dialect;
    use crate::federation::{ColumnInfo, DatabaseConnection};
    use crate::type_conflict::Verdict;
    use pretty_assertions::assert_eq;

    fn orders() -> TableDescriptor {
        TableDescriptor::local("orders").with_columns(vec![
            ColumnInfo::new("id", "INTEGER"),
            ColumnInfo::new("customer_id", "INTEGER"),
            ColumnInfo::new("total", "DECIMAL(10,2)"),
        ])
    }

    fn customers() -> TableDescriptor {
        let connection = DatabaseConnection {
            id: "c1".to_string(),
            name: "sales".to_string(),
            kind: "mysql".to_string(),
        };
        TableDescriptor::external("customers", connection).with_columns(vec![
            ColumnInfo::new("id", "VARCHAR(36)"),
            ColumnInfo::new("active", "tinyint(1)"),
        ])
    }

    fn customer_join(kind: JoinKind) -> Vec<JoinSpec> {
        vec![JoinSpec::new(
            kind,
            vec![JoinCondition::columns_eq("orders", "customer_id", "customers", "id")],
        )]
    }

    fn no_columns() -> HashMap<String, Vec<String>> {
        HashMap::new()
    }

    #[test]
    fn test_no_tables_is_empty() {
        let mut compiler = SqlCompiler::new();
        let plan = compiler
            .build_query(&[], &[], &Group::default(), &no_columns())
            .unwrap();
        assert_eq!(plan.shape, QueryShape::Empty);
        assert_eq!(plan.sql, "");
        assert!(!plan.is_executable());
    }

    #[test]
    fn test_single_table() {
        let mut compiler = SqlCompiler::new();
        let filter = Group::with_children(
            Logic::And,
            vec![
                Condition::compare("orders", "total", Operator::Gt, 100).into(),
                // no joined table to attach to: lands in WHERE
                Condition::new("orders", "id", Operator::IsNotNull)
                    .placed(Placement::On)
                    .into(),
            ],
        );
        let plan = compiler
            .build_query(&[orders()], &[], &filter, &no_columns())
            .unwrap();
        assert_eq!(plan.shape, QueryShape::SingleTable);
        assert_eq!(plan.source, ExecutionSource::DuckDb);
        assert!(plan.sql.starts_with(r#"SELECT * FROM "orders" AS "orders""#), "{}", plan.sql);
        assert!(plan
            .sql
            .contains(r#"("orders"."total" > 100 AND "orders"."id" IS NOT NULL)"#));
        assert!(plan.sql.ends_with("LIMIT 1000"), "{}", plan.sql);
        assert!(!plan.sql.contains("JOIN"));
        assert!(plan.is_executable());
    }

    #[test]
    fn test_federated_join_with_type_conflict() {
        let mut compiler = SqlCompiler::new();
        let tables = vec![orders(), customers()];
        let joins = customer_join(JoinKind::Inner);

        let plan = compiler
            .build_query(&tables, &joins, &Group::default(), &no_columns())
            .unwrap();
        assert_eq!(plan.shape, QueryShape::Joined);
        assert_eq!(plan.unresolved_conflicts.len(), 1);
        assert_eq!(plan.unresolved_conflicts[0].verdict, Verdict::Castable);
        assert_eq!(
            plan.unresolved_conflicts[0].recommended_cast.as_deref(),
            Some("VARCHAR")
        );
        assert!(!plan.is_executable());
        assert_eq!(plan.attach_databases.len(), 1);
        assert_eq!(plan.attach_databases[0].alias, "mysql_sales");
        assert!(matches!(plan.source, ExecutionSource::Federated { .. }));
        assert!(plan
            .sql
            .contains(r#"INNER JOIN "mysql_sales"."customers" AS "customers""#));
        assert!(plan.sql.contains(r#""orders"."customer_id" = "customers"."id""#));

        compiler.conflicts_mut().resolve_all_with_recommendations();
        let plan = compiler
            .build_query(&tables, &joins, &Group::default(), &no_columns())
            .unwrap();
        assert!(plan.unresolved_conflicts.is_empty());
        assert!(plan.is_executable());
        assert!(plan.sql.contains(
            r#"TRY_CAST("orders"."customer_id" AS VARCHAR) = TRY_CAST("customers"."id" AS VARCHAR)"#
        ));
    }

    #[test]
    fn test_on_placed_filters_route_to_their_join() {
        let mut compiler = SqlCompiler::new();
        let active = Condition::compare("customers", "active", Operator::Eq, true).placed(Placement::On);
        let total = Condition::compare("orders", "total", Operator::Gte, 10);
        let filter = Group::with_children(Logic::And, vec![active.into(), total.into()]);

        let plan = compiler
            .build_query(&[orders(), customers()], &customer_join(JoinKind::Left), &filter, &no_columns())
            .unwrap();
        assert!(plan.sql.contains(
            r#""orders"."customer_id" = "customers"."id" AND ("customers"."active" = TRUE)"#
        ));
        let where_part = plan.sql.split(" WHERE ").nth(1).unwrap_or_default();
        assert!(where_part.contains(r#""orders"."total" >= 10"#));
        assert!(!where_part.contains("active"));
    }

    #[test]
    fn test_missing_join_condition_uses_placeholder() {
        let mut compiler = SqlCompiler::new();
        let tables = vec![orders(), customers()];

        let plan = compiler
            .build_query(&tables, &[], &Group::default(), &no_columns())
            .unwrap();
        assert!(plan.sql.contains(JOIN_PLACEHOLDER));
        assert_eq!(plan.incomplete_joins, vec!["customers".to_string()]);
        assert!(!plan.is_executable());

        // only ON-placed filters: they become the whole ON clause
        let filter = Group::with_children(
            Logic::And,
            vec![Condition::compare("customers", "active", Operator::Eq, true)
                .placed(Placement::On)
                .into()],
        );
        let half_done = vec![JoinSpec::new(
            JoinKind::Inner,
            vec![JoinCondition::new(
                JoinOperand::column("orders", ""),
                Operator::Eq,
                JoinOperand::column("customers", "id"),
            )],
        )];
        let plan = compiler
            .build_query(&tables, &half_done, &filter, &no_columns())
            .unwrap();
        assert!(plan.incomplete_joins.is_empty());
        assert!(plan.sql.contains(r#"("customers"."active" = TRUE)"#));
        assert!(!plan.sql.contains(JOIN_PLACEHOLDER));
    }

    #[test]
    fn test_expression_operands_are_verbatim() {
        let mut compiler = SqlCompiler::new();
        let joins = vec![JoinSpec::new(
            JoinKind::Inner,
            vec![JoinCondition::new(
                JoinOperand::expression("CAST(orders.customer_id AS VARCHAR)"),
                Operator::Eq,
                JoinOperand::column("customers", "id"),
            )],
        )];
        let plan = compiler
            .build_query(&[orders(), customers()], &joins, &Group::default(), &no_columns())
            .unwrap();
        assert!(plan
            .sql
            .contains(r#"CAST(orders.customer_id AS VARCHAR) = "customers"."id""#));
        assert!(plan.unresolved_conflicts.is_empty());
    }

    #[test]
    fn test_push_down_only_for_inner_and_left() {
        let config = CompilerConfig {
            push_down_join_filters: true,
            ..CompilerConfig::default()
        };
        let filter = Group::with_children(
            Logic::And,
            vec![Condition::compare("customers", "active", Operator::Eq, true)
                .placed(Placement::On)
                .into()],
        );
        let tables = vec![orders(), customers()];

        let mut compiler = SqlCompiler::from_config(config.clone());
        let plan = compiler
            .build_query(&tables, &customer_join(JoinKind::Left), &filter, &no_columns())
            .unwrap();
        assert!(
            plan.sql
                .contains(r#"LEFT JOIN (SELECT * FROM "mysql_sales"."customers" AS "customers" WHERE "#),
            "{}",
            plan.sql
        );
        assert!(plan.sql.contains(r#"AS "customers" ON "orders"."customer_id" = "customers"."id""#));
        assert!(!plan.sql.contains(r#"AND ("customers"."active" = TRUE)"#));

        let mut compiler = SqlCompiler::from_config(config);
        let plan = compiler
            .build_query(&tables, &customer_join(JoinKind::Right), &filter, &no_columns())
            .unwrap();
        assert!(!plan.sql.contains("(SELECT"));
        assert!(plan.sql.contains(r#"AND ("customers"."active" = TRUE)"#));
    }

    #[test]
    fn test_selected_columns_and_duplicate_names() {
        let mut compiler = SqlCompiler::new();
        let columns = HashMap::from([
            ("orders".to_string(), vec!["id".to_string(), "total".to_string()]),
            ("customers".to_string(), vec!["id".to_string()]),
        ]);
        let plan = compiler
            .build_query(&[orders(), customers()], &customer_join(JoinKind::Inner), &Group::default(), &columns)
            .unwrap();
        assert!(plan.sql.starts_with(
            r#"SELECT "orders"."id" AS "orders_id", "orders"."total", "customers"."id" AS "customers_id" FROM"#
        ), "{}", plan.sql);
    }

    #[test]
    fn test_repeated_tables_get_distinct_aliases() {
        assert_eq!(
            table_aliases(&[orders(), orders(), TableDescriptor::local("orders_2"), orders()]),
            vec!["orders", "orders_2", "orders_2_2", "orders_3"]
        );
    }

    #[test]
    fn test_surplus_join_specs_are_ignored() {
        let mut compiler = SqlCompiler::new();
        let mut joins = customer_join(JoinKind::Inner);
        joins.push(JoinSpec::default());
        let plan = compiler
            .build_query(&[orders()], &joins, &Group::default(), &no_columns())
            .unwrap();
        assert!(!plan.sql.contains("JOIN"));
        assert!(plan.unresolved_conflicts.is_empty());
    }

    #[test]
    fn test_nesting_too_deep_is_refused() {
        let mut compiler = SqlCompiler::new();
        let mut node = Group::with_children(
            Logic::And,
            vec![Condition::new("orders", "id", Operator::IsNull).into()],
        );
        for _ in 0..5 {
            node = Group::with_children(Logic::Or, vec![node.into()]);
        }
        assert_eq!(
            compiler.build_query(&[orders()], &[], &node, &no_columns()),
            Err(QueryError::NestingTooDeep { depth: 6, max: 5 })
        );
    }

    #[test]
    fn test_mysql_rendering() {
        let mut compiler = SqlCompiler::from_config(CompilerConfig {
            dialect: Dialect::MySql,
            max_rows: 50,
            ..CompilerConfig::default()
        });
        let filter = Group::with_children(
            Logic::And,
            vec![Condition::compare("orders", "total", Operator::Gt, 5).into()],
        );
        let plan = compiler
            .build_query(&[orders()], &[], &filter, &no_columns())
            .unwrap();
        assert!(plan.sql.contains("FROM `orders` AS `orders`"), "{}", plan.sql);
        assert!(plan.sql.contains("(`orders`.`total` > 5)"));
        assert!(plan.sql.ends_with("LIMIT 50"));
    }

    #[test]
    fn test_between_range_cast_applied_once_resolved() {
        let mut compiler = SqlCompiler::new();
        let between = Condition::between("orders", "total", 1, "2024-01-01");
        let filter = Group::with_children(Logic::And, vec![between.into()]);

        let plan = compiler
            .build_query(&[orders()], &[], &filter, &no_columns())
            .unwrap();
        assert_eq!(plan.unresolved_conflicts.len(), 1);

        compiler.conflicts_mut().resolve_all_with_recommendations();
        let plan = compiler
            .build_query(&[orders()], &[], &filter, &no_columns())
            .unwrap();
        assert!(plan.is_executable());
        assert!(plan.sql.contains(
            r#""orders"."total" BETWEEN TRY_CAST(1 AS VARCHAR) AND TRY_CAST('2024-01-01' AS VARCHAR)"#
        ));
    }

    #[test]
    fn test_hand_written_comments_do_not_swallow_the_statement() {
        let text = "foo(x) -- only active rows\n > 1 AND y = 2 -- trailing";
        let filter = crate::parse_filter_sql(text, Dialect::DuckDb)
            .unwrap()
            .into_root();
        let mut compiler = SqlCompiler::new();
        let plan = compiler
            .build_query(&[orders()], &[], &filter, &no_columns())
            .unwrap();
        assert!(!plan.sql.contains("--"), "{}", plan.sql);
        assert!(plan.sql.contains(r#"(foo(x) > 1) AND "y" = 2"#), "{}", plan.sql);
        assert!(plan.sql.ends_with("LIMIT 1000"), "{}", plan.sql);
    }
}
