//! 过滤树：WHERE/ON 谓词的结构化表示

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueryError;

/// 生成一个新的节点 id
pub fn new_node_id() -> String {
    Uuid::new_v4().to_string()
}

/// 过滤树的节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FilterNode {
    Condition(Condition),
    Group(Group),
    /// 解析器无法分解的原始SQL片段, 只能删除, 不能编辑
    Raw(RawFragment),
}

impl FilterNode {
    pub fn id(&self) -> &str {
        match self {
            FilterNode::Condition(c) => &c.id,
            FilterNode::Group(g) => &g.id,
            FilterNode::Raw(r) => &r.id,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        FilterNode::Raw(RawFragment::new(sql))
    }
}

impl From<Condition> for FilterNode {
    fn from(c: Condition) -> Self {
        FilterNode::Condition(c)
    }
}

impl From<Group> for FilterNode {
    fn from(g: Group) -> Self {
        FilterNode::Group(g)
    }
}

/// 分组的逻辑连接词
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    #[default]
    And,
    Or,
}

impl Logic {
    pub fn toggled(self) -> Self {
        match self {
            Logic::And => Logic::Or,
            Logic::Or => Logic::And,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
        }
    }
}

/// 条件输出的位置：JOIN 的 ON 子句或 WHERE 子句
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    On,
    #[default]
    Where,
}

/// 由同一个连接词连接的有序子节点。每棵过滤树的根都是 `Group`,
/// 根的 `logic` 对应编辑器顶层的 AND/OR 切换
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub logic: Logic,
    pub children: Vec<FilterNode>,
}

/// 编辑器持有的根分组
pub type FilterGroup = Group;

impl Group {
    pub fn new(logic: Logic) -> Self {
        Self {
            id: new_node_id(),
            logic,
            children: Vec::new(),
        }
    }

    pub fn with_children(logic: Logic, children: Vec<FilterNode>) -> Self {
        Self {
            id: new_node_id(),
            logic,
            children,
        }
    }
}

impl Default for Group {
    fn default() -> Self {
        Group::new(Logic::And)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFragment {
    pub id: String,
    pub sql: String,
}

impl RawFragment {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            id: new_node_id(),
            sql: sql.into(),
        }
    }
}

/// 编辑器中可用的比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "ILIKE")]
    ILike,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "IS NULL")]
    IsNull,
    #[serde(rename = "IS NOT NULL")]
    IsNotNull,
    #[serde(rename = "BETWEEN")]
    Between,
}

impl Operator {
    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::ILike => "ILIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::Between => "BETWEEN",
        }
    }

    /// 比较两个值的二元运算符, 也是两个连接列之间唯一允许的运算符
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::NotEq | Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// 字面量值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::String(s)
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Literal::Integer(n)
    }
}

impl From<i32> for Literal {
    fn from(n: i32) -> Self {
        Literal::Integer(n.into())
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Literal::Float(n)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Boolean(b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    List(Vec<Literal>),
    Single(Literal),
}

/// 单个谓词, 例如：`<table>.<column> <op> <value>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: String,
    /// 表别名, 列未限定时为空
    pub table: String,
    pub column: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FilterValue>,
    /// 上界, 仅用于 `BETWEEN`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value2: Option<Literal>,
    #[serde(default)]
    pub placement: Placement,
}

impl Condition {
    pub fn new(table: impl Into<String>, column: impl Into<String>, operator: Operator) -> Self {
        Self {
            id: new_node_id(),
            table: table.into(),
            column: column.into(),
            operator,
            value: None,
            value2: None,
            placement: Placement::Where,
        }
    }

    /// 例如：`table.column op value`
    pub fn compare(
        table: impl Into<String>,
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<Literal>,
    ) -> Self {
        let mut c = Self::new(table, column, operator);
        c.value = Some(FilterValue::Single(value.into()));
        c
    }

    pub fn in_list(
        table: impl Into<String>,
        column: impl Into<String>,
        negated: bool,
        values: Vec<Literal>,
    ) -> Self {
        let op = if negated { Operator::NotIn } else { Operator::In };
        let mut c = Self::new(table, column, op);
        c.value = Some(FilterValue::List(values));
        c
    }

    pub fn between(
        table: impl Into<String>,
        column: impl Into<String>,
        low: impl Into<Literal>,
        high: impl Into<Literal>,
    ) -> Self {
        let mut c = Self::new(table, column, Operator::Between);
        c.value = Some(FilterValue::Single(low.into()));
        c.value2 = Some(high.into());
        c
    }

    pub fn placed(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// 检查携带的值是否符合运算符的要求
    pub fn validate(&self) -> Result<(), QueryError> {
        let reason = match (self.operator, &self.value, &self.value2) {
            _ if self.column.is_empty() => Some("no column selected"),
            (Operator::IsNull | Operator::IsNotNull, None, None) => None,
            (Operator::IsNull | Operator::IsNotNull, _, _) => Some("null checks take no value"),
            (Operator::In | Operator::NotIn, Some(FilterValue::List(values)), None) => {
                if values.is_empty() {
                    Some("IN list is empty")
                } else {
                    None
                }
            }
            (Operator::In | Operator::NotIn, _, _) => Some("IN requires a list of values"),
            (Operator::Between, Some(FilterValue::Single(_)), Some(_)) => None,
            (Operator::Between, _, _) => Some("BETWEEN requires two values"),
            (_, Some(FilterValue::Single(_)), None) => None,
            _ => Some("operator requires exactly one value"),
        };
        match reason {
            None => Ok(()),
            Some(reason) => Err(QueryError::InvalidCondition {
                id: self.id.clone(),
                reason: reason.to_string(),
            }),
        }
    }
}
