//! 配置模块，负责加载JSON配置文件

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::dialect::Dialect;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {0}")]
    Missing(PathBuf),

    #[error("无法读取配置文件 {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("无法解析JSON配置文件 {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 编译器配置，由解析器、生成器和查询组装共用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// 生成语句使用的SQL方言
    pub dialect: Dialect,
    /// 允许的最大分组嵌套深度（根分组算作 1）
    pub max_nesting_depth: usize,
    /// LIMIT 子句的行数
    pub max_rows: u64,
    /// 解析器放弃前最多访问的 token 次数
    pub parse_step_budget: usize,
    /// 单次解析的耗时上限（毫秒）
    pub parse_timeout_ms: u64,
    /// 将 INNER/LEFT 连接上 ON 位置的过滤条件下推到子查询
    pub push_down_join_filters: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::DuckDb,
            max_nesting_depth: 5,
            max_rows: 1000,
            parse_step_budget: 100_000,
            parse_timeout_ms: 50,
            push_down_join_filters: false,
        }
    }
}

impl CompilerConfig {
    /// 从JSON文件加载配置，缺失的字段使用默认值
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", std::process::id(), name));
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "{}", content).unwrap();
        path
    }

    #[test]
    fn test_load_partial_json_config() {
        let path = temp_file(
            "compiler.json",
            r#"{ "dialect": "mysql", "max_rows": 50, "push_down_join_filters": true }"#,
        );

        let config = CompilerConfig::from_json_file(&path).unwrap();
        assert_eq!(config.dialect, Dialect::MySql);
        assert_eq!(config.max_rows, 50);
        assert!(config.push_down_join_filters);
        assert_eq!(config.max_nesting_depth, 5);

        fs::remove_file(path).ok();
    }

    #[test]
    fn test_invalid_json_config() {
        let path = temp_file("invalid.json", "invalid json");
        let result = CompilerConfig::from_json_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_unknown_dialect_is_rejected() {
        let path = temp_file("oracle.json", r#"{ "dialect": "oracle" }"#);
        assert!(CompilerConfig::from_json_file(&path).is_err());
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file() {
        let result = CompilerConfig::from_json_file("non_existent_file.json");
        assert!(matches!(result, Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert_eq!(config.dialect, Dialect::DuckDb);
        assert_eq!(config.max_rows, 1000);
        assert!(!config.push_down_join_filters);
    }
}
