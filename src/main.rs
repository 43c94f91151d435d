use std::collections::HashMap;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use query_compiler::ast::{Condition, Group, Logic, Operator, Placement};
use query_compiler::federation::{ColumnInfo, DatabaseConnection, TableDescriptor};
use query_compiler::sql_compiler::{JoinCondition, JoinKind, JoinSpec};
use query_compiler::{generate_filter_sql, parse_filter_sql, CompilerConfig, Dialect, SqlCompiler};

const CONFIG_FILE: &str = "query_compiler.json";

/// 加载JSON配置文件，失败时使用默认配置
fn load_config() -> CompilerConfig {
    match CompilerConfig::from_json_file(CONFIG_FILE) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "无法加载JSON配置文件, 使用默认配置");
            CompilerConfig::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = load_config();
    let mut dialect = config.dialect;

    println!("--- query_compiler: WHERE 子句 <-> 过滤树 ---");
    println!("输入过滤表达式, 或者 :dialect <方言>, :demo, :quit");

    let mut rl = DefaultEditor::new().context("无法启动行编辑器")?;
    loop {
        let line = match rl.readline(&format!("{}> ", dialect)) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        rl.add_history_entry(input)?;

        match input.split_once(' ').unwrap_or((input, "")) {
            (":quit" | ":q", _) => break,
            (":dialect", name) => match name.parse::<Dialect>() {
                Ok(d) => {
                    dialect = d;
                    println!("✅ 方言已切换为 {}", dialect);
                }
                Err(e) => println!("✗ {}", e),
            },
            (":demo", _) => run_demo(&config)?,
            _ => show_filter(input, dialect)?,
        }
    }
    Ok(())
}

/// 解析输入，打印警告、过滤树和重新生成的SQL
fn show_filter(input: &str, dialect: Dialect) -> Result<()> {
    let outcome = match parse_filter_sql(input, dialect) {
        Ok(outcome) => outcome,
        Err(e) => {
            println!("✗ {}", e);
            return Ok(());
        }
    };
    for warning in &outcome.warnings {
        println!("⚠ {}", warning);
    }

    let tree = outcome.into_root();
    println!("\n[过滤树]:\n{}", serde_json::to_string_pretty(&tree)?);
    match generate_filter_sql(&tree, dialect) {
        Ok(sql) => println!("\n[生成的 SQL]:\n{}\n", sql),
        Err(e) => println!("✗ {}", e),
    }
    Ok(())
}

/// 演示：本地 `orders` 表关联附加的 MySQL 库中的 `customers` 表,
/// 分别打印接受推荐类型转换前后的SQL
fn run_demo(config: &CompilerConfig) -> Result<()> {
    let orders = TableDescriptor::local("orders").with_columns(vec![
        ColumnInfo::new("id", "INTEGER"),
        ColumnInfo::new("customer_id", "INTEGER"),
        ColumnInfo::new("total", "DECIMAL(10,2)"),
    ]);
    let customers = TableDescriptor::external(
        "customers",
        DatabaseConnection {
            id: "c1".to_string(),
            name: "sales".to_string(),
            kind: "mysql".to_string(),
        },
    )
    .with_columns(vec![
        ColumnInfo::new("id", "VARCHAR(36)"),
        ColumnInfo::new("name", "VARCHAR(255)"),
        ColumnInfo::new("active", "tinyint(1)"),
    ]);
    let tables = vec![orders, customers];
    let joins = vec![JoinSpec::new(
        JoinKind::Inner,
        vec![JoinCondition::columns_eq("orders", "customer_id", "customers", "id")],
    )];
    let filter = Group::with_children(
        Logic::And,
        vec![
            Condition::compare("customers", "active", Operator::Eq, true)
                .placed(Placement::On)
                .into(),
            Condition::compare("orders", "total", Operator::Gte, 100).into(),
        ],
    );
    let columns = HashMap::from([
        ("orders".to_string(), vec!["id".to_string(), "total".to_string()]),
        ("customers".to_string(), vec!["name".to_string()]),
    ]);

    let mut compiler = SqlCompiler::from_config(config.clone());
    let plan = compiler.build_query(&tables, &joins, &filter, &columns)?;
    println!("\n[生成的 SQL]:\n{}", plan.sql);
    println!("\n[附加数据库]:\n{}", serde_json::to_string_pretty(&plan.attach_databases)?);
    for conflict in &plan.unresolved_conflicts {
        println!(
            "⚠ 类型冲突 {}: {} vs {} ({:?}, 推荐转换为 {})",
            conflict.key,
            conflict.left_type,
            conflict.right_type,
            conflict.verdict,
            conflict.recommended_cast.as_deref().unwrap_or("-")
        );
    }

    compiler.conflicts_mut().resolve_all_with_recommendations();
    let plan = compiler.build_query(&tables, &joins, &filter, &columns)?;
    println!("\n[接受推荐转换后的 SQL]:\n{}", plan.sql);
    println!("可执行: {}\n", plan.is_executable());
    Ok(())
}
