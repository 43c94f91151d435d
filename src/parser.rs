//! WHERE 子句的语法分析器（可降级）：把SQL文本还原为过滤树
//!
//! ## 解析流程图
//!
//! ```text
//! parse()
//!   ├─ 分词 (Lexer), 去掉注释, 检查括号是否配对      ── 不配对 → Raw(整个输入)
//!   ├─ 去掉包裹整个输入的一对括号
//!   └─ parse_level()
//!        ├─ 在括号深度 0 处按 AND / OR 切分
//!        │    (`x BETWEEN a AND b` 中的 AND 不是切分点)
//!        ├─ 同一层同时出现 AND 和 OR                     ── 有歧义 → Raw(该层)
//!        └─ 逐个处理片段
//!             ├─ `( ... )`  → 递归调用 parse_level() (嵌套分组)
//!             ├─ column OP literal
//!             ├─ column [NOT] IN (literal, ...)
//!             ├─ column IS [NOT] NULL
//!             ├─ column BETWEEN literal AND literal
//!             └─ 其他                                    ── Raw(片段)
//! ```
//!
//! 无法识别的片段只影响它自己, 其余部分照常分解。片段中的注释会被删除,
//! 因此 `--` 注释不会吞掉其后生成的SQL。解析最多访问 `step_budget` 次 token,
//! 耗时不超过 `timeout`；超出任一限制时整个输入作为一个 Raw 节点返回,
//! 并附带 `Timeout` 警告。只有嵌套过深才会返回错误。

use std::borrow::Cow;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::ast::{Condition, FilterNode, FilterValue, Group, Literal, Logic, Operator};
use crate::config::CompilerConfig;
use crate::dialect::Dialect;
use crate::error::QueryError;
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};
use crate::tree::check_depth;

/// 每隔多少步检查一次耗时
const CLOCK_INTERVAL: usize = 64;

/// 解析过程中遇到的非致命问题, 受影响的文本保留为原始片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    /// 同一层混用 AND 和 OR 且没有括号
    Ambiguous { fragment: String },
    /// 不属于任何可识别条件形式的片段
    Unrecognized { fragment: String },
    /// 括号不配对, 无法分解
    Unbalanced,
    /// 步数或耗时超出限制
    Timeout { steps: usize },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::Ambiguous { fragment } => write!(
                f,
                "AND and OR are mixed without parentheses in '{}'; kept as raw SQL",
                fragment
            ),
            ParseWarning::Unrecognized { fragment } => {
                write!(f, "could not interpret '{}'; kept as raw SQL", fragment)
            }
            ParseWarning::Unbalanced => write!(f, "unbalanced parentheses; kept as raw SQL"),
            ParseWarning::Timeout { steps } => {
                write!(f, "parsing stopped after {} steps; kept as raw SQL", steps)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    /// 分组, 或在无法分解时为单个 Raw 节点
    pub node: FilterNode,
    pub warnings: Vec<ParseWarning>,
}

impl ParseOutcome {
    /// 将解析结果转换为编辑器的根分组
    pub fn into_root(self) -> Group {
        match self.node {
            FilterNode::Group(g) => g,
            other => Group::with_children(Logic::And, vec![other]),
        }
    }
}

/// 解析器限制
#[derive(Debug, Clone, Copy)]
pub struct ParserConfig {
    pub dialect: Dialect,
    pub max_depth: usize,
    pub step_budget: usize,
    pub timeout: Duration,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig::from(&CompilerConfig::default())
    }
}

impl From<&CompilerConfig> for ParserConfig {
    fn from(config: &CompilerConfig) -> Self {
        Self {
            dialect: config.dialect,
            max_depth: config.max_nesting_depth,
            step_budget: config.parse_step_budget,
            timeout: Duration::from_millis(config.parse_timeout_ms),
        }
    }
}

/// 提前终止解析的原因
enum Abort {
    Timeout,
    TooDeep(QueryError),
}

impl From<QueryError> for Abort {
    fn from(e: QueryError) -> Self {
        Abort::TooDeep(e)
    }
}

/// 一层 `a AND b AND c` 在顶层连接词处切分的结果
enum Split {
    Fragments(Logic, Vec<(usize, usize)>),
    Ambiguous,
    Malformed,
}

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token<'a>>,
    comments: Vec<Span>,
    config: ParserConfig,
    steps: usize,
    started: Instant,
    warnings: Vec<ParseWarning>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, config: ParserConfig) -> Self {
        let (comments, tokens): (Vec<_>, Vec<_>) = Lexer::new(source)
            .with_backslash_escapes(config.dialect.backslash_escapes())
            .partition(|t| t.kind == TokenKind::Comment);
        Self {
            source,
            tokens,
            comments: comments.into_iter().map(|t| t.span).collect(),
            config,
            steps: 0,
            started: Instant::now(),
            warnings: Vec::new(),
        }
    }

    pub fn parse(mut self) -> Result<ParseOutcome, QueryError> {
        if self.tokens.is_empty() {
            return Ok(self.finish(FilterNode::Group(Group::default())));
        }
        let whole = self.text(0, self.tokens.len()).into_owned();
        if !self.balanced() {
            warn!("filter text has unbalanced parentheses");
            self.warnings.push(ParseWarning::Unbalanced);
            return Ok(self.finish(FilterNode::raw(whole)));
        }

        let (mut lo, mut hi) = (0, self.tokens.len());
        if self.wraps(lo, hi) {
            lo += 1;
            hi -= 1;
        }

        let node = match self.parse_level(lo, hi, 1) {
            Ok(Some(group)) => FilterNode::Group(group),
            Ok(None) => FilterNode::raw(whole),
            Err(Abort::TooDeep(e)) => return Err(e),
            Err(Abort::Timeout) => {
                warn!(steps = self.steps, "filter parsing ran out of budget");
                self.warnings = vec![ParseWarning::Timeout { steps: self.steps }];
                FilterNode::raw(whole)
            }
        };

        if let FilterNode::Group(g) = &node {
            check_depth(g.nesting_depth(), self.config.max_depth)?;
        }
        debug!(warnings = self.warnings.len(), "parsed filter text");
        Ok(self.finish(node))
    }

    fn finish(self, node: FilterNode) -> ParseOutcome {
        ParseOutcome {
            node,
            warnings: self.warnings,
        }
    }

    fn tick(&mut self) -> Result<(), Abort> {
        self.steps += 1;
        if self.steps > self.config.step_budget {
            return Err(Abort::Timeout);
        }
        if self.steps % CLOCK_INTERVAL == 0 && self.started.elapsed() >= self.config.timeout {
            return Err(Abort::Timeout);
        }
        Ok(())
    }

    fn balanced(&self) -> bool {
        let mut depth = 0usize;
        for token in &self.tokens {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => match depth.checked_sub(1) {
                    Some(d) => depth = d,
                    None => return false,
                },
                _ => {}
            }
        }
        depth == 0
    }

    /// `tokens[lo..hi]` 是否是一个完整的括号单元
    fn wraps(&self, lo: usize, hi: usize) -> bool {
        if hi < lo + 2
            || self.tokens[lo].kind != TokenKind::LParen
            || self.tokens[hi - 1].kind != TokenKind::RParen
        {
            return false;
        }
        let mut depth = 0usize;
        for (i, token) in self.tokens[lo..hi].iter().enumerate() {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return lo + i == hi - 1;
                    }
                }
                _ => {}
            }
        }
        false
    }

    /// `tokens[lo..hi]` 覆盖的源文本, 注释已删除
    fn text(&self, lo: usize, hi: usize) -> Cow<'a, str> {
        if lo >= hi {
            return Cow::Borrowed("");
        }
        let span: Span = self.tokens[lo].span.to(self.tokens[hi - 1].span);
        let source: &'a str = self.source;
        let mut inner = self
            .comments
            .iter()
            .filter(|c| c.start >= span.start && c.end <= span.end)
            .peekable();
        if inner.peek().is_none() {
            return Cow::Borrowed(&source[span.start..span.end]);
        }
        let mut out = String::new();
        let mut at = span.start;
        for comment in inner {
            out.push_str(source[at..comment.start].trim_end());
            out.push(' ');
            at = comment.end;
        }
        out.push_str(source[at..span.end].trim_start());
        Cow::Owned(out)
    }

    /// 把一层解析为分组。返回 `None` 表示该层有歧义或格式错误,
    /// 调用者应保留为原始片段（警告已记录）
    fn parse_level(&mut self, lo: usize, hi: usize, depth: usize) -> Result<Option<Group>, Abort> {
        check_depth(depth, self.config.max_depth)?;
        let (logic, fragments) = match self.split(lo, hi)? {
            Split::Fragments(logic, fragments) => (logic, fragments),
            Split::Ambiguous => {
                let fragment = self.text(lo, hi).to_string();
                debug!(%fragment, "ambiguous AND/OR mix");
                self.warnings.push(ParseWarning::Ambiguous { fragment });
                return Ok(None);
            }
            Split::Malformed => {
                let fragment = self.text(lo, hi).to_string();
                self.warnings.push(ParseWarning::Unrecognized { fragment });
                return Ok(None);
            }
        };

        let mut group = Group::new(logic);
        for (start, end) in fragments {
            if let Some(child) = self.parse_fragment(start, end, depth)? {
                group.children.push(child);
            }
        }
        Ok(Some(group))
    }

    fn split(&mut self, lo: usize, hi: usize) -> Result<Split, Abort> {
        let mut logic: Option<Logic> = None;
        let mut fragments = Vec::new();
        let mut depth = 0usize;
        let mut start = lo;
        let mut pending_between = false;

        for i in lo..hi {
            self.tick()?;
            let connective = match self.tokens[i].kind {
                TokenKind::LParen => {
                    depth += 1;
                    None
                }
                TokenKind::RParen => {
                    depth -= 1;
                    None
                }
                TokenKind::Between if depth == 0 => {
                    pending_between = true;
                    None
                }
                TokenKind::And if depth == 0 && pending_between => {
                    pending_between = false;
                    None
                }
                TokenKind::And if depth == 0 => Some(Logic::And),
                TokenKind::Or if depth == 0 => Some(Logic::Or),
                _ => None,
            };
            let Some(connective) = connective else {
                continue;
            };
            match logic {
                Some(seen) if seen != connective => return Ok(Split::Ambiguous),
                _ => logic = Some(connective),
            }
            if start == i {
                return Ok(Split::Malformed);
            }
            fragments.push((start, i));
            start = i + 1;
            pending_between = false;
        }
        if start == hi {
            // 末尾多出连接词, 或者什么都没有
            return Ok(if fragments.is_empty() && lo == hi {
                Split::Fragments(Logic::And, fragments)
            } else {
                Split::Malformed
            });
        }
        fragments.push((start, hi));
        Ok(Split::Fragments(logic.unwrap_or_default(), fragments))
    }

    fn parse_fragment(&mut self, lo: usize, hi: usize, depth: usize) -> Result<Option<FilterNode>, Abort> {
        if self.wraps(lo, hi) {
            return Ok(match self.parse_level(lo + 1, hi - 1, depth + 1)? {
                Some(group) if group.children.is_empty() => None,
                Some(group) => Some(FilterNode::Group(group)),
                None => Some(FilterNode::raw(self.text(lo + 1, hi - 1))),
            });
        }
        match self.match_condition(lo, hi)? {
            Some(condition) => Ok(Some(FilterNode::Condition(condition))),
            None => {
                let fragment = self.text(lo, hi).to_string();
                debug!(%fragment, "keeping fragment as raw SQL");
                self.warnings.push(ParseWarning::Unrecognized {
                    fragment: fragment.clone(),
                });
                Ok(Some(FilterNode::raw(fragment)))
            }
        }
    }

    fn match_condition(&mut self, lo: usize, hi: usize) -> Result<Option<Condition>, Abort> {
        let mut cursor = Cursor { parser: self, pos: lo, end: hi };
        let condition = cursor.condition()?;
        Ok(condition.filter(|_| cursor.pos == cursor.end))
    }
}

/// 遍历单个片段的 token
struct Cursor<'p, 'a> {
    parser: &'p mut Parser<'a>,
    pos: usize,
    end: usize,
}

impl<'p, 'a> Cursor<'p, 'a> {
    fn peek(&self) -> Option<&TokenKind<'a>> {
        (self.pos < self.end).then(|| &self.parser.tokens[self.pos].kind)
    }

    fn advance(&mut self) -> Result<Option<TokenKind<'a>>, Abort> {
        if self.pos >= self.end {
            return Ok(None);
        }
        self.parser.tick()?;
        let kind = self.parser.tokens[self.pos].kind.clone();
        self.pos += 1;
        Ok(Some(kind))
    }

    fn eat(&mut self, expected: &TokenKind<'a>) -> Result<bool, Abort> {
        if self.peek() == Some(expected) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn condition(&mut self) -> Result<Option<Condition>, Abort> {
        let Some((table, column)) = self.column_ref()? else {
            return Ok(None);
        };
        let mut condition = Condition::new(table, column, Operator::Eq);

        let Some(kind) = self.advance()? else {
            return Ok(None);
        };
        let operator = match kind {
            TokenKind::Eq => Operator::Eq,
            TokenKind::NotEq => Operator::NotEq,
            TokenKind::Gt => Operator::Gt,
            TokenKind::Lt => Operator::Lt,
            TokenKind::Gte => Operator::Gte,
            TokenKind::Lte => Operator::Lte,
            TokenKind::Like => Operator::Like,
            TokenKind::ILike => Operator::ILike,
            TokenKind::In => Operator::In,
            TokenKind::Between => Operator::Between,
            TokenKind::Not if self.eat(&TokenKind::In)? => Operator::NotIn,
            TokenKind::Is => {
                let negated = self.eat(&TokenKind::Not)?;
                if !self.eat(&TokenKind::Null)? {
                    return Ok(None);
                }
                if negated {
                    Operator::IsNotNull
                } else {
                    Operator::IsNull
                }
            }
            _ => return Ok(None),
        };
        condition.operator = operator;

        match operator {
            Operator::IsNull | Operator::IsNotNull => {}
            Operator::In | Operator::NotIn => {
                let Some(values) = self.literal_list()? else {
                    return Ok(None);
                };
                condition.value = Some(FilterValue::List(values));
            }
            Operator::Between => {
                let Some(low) = self.literal()? else {
                    return Ok(None);
                };
                if !self.eat(&TokenKind::And)? {
                    return Ok(None);
                }
                let Some(high) = self.literal()? else {
                    return Ok(None);
                };
                condition.value = Some(FilterValue::Single(low));
                condition.value2 = Some(high);
            }
            _ => {
                let Some(value) = self.literal()? else {
                    return Ok(None);
                };
                condition.value = Some(FilterValue::Single(value));
            }
        }
        Ok(Some(condition))
    }

    /// `col` 或 `tbl.col`, 支持任意标识符引号
    fn column_ref(&mut self) -> Result<Option<(String, String)>, Abort> {
        let mut parts = Vec::new();
        loop {
            match self.advance()? {
                Some(TokenKind::Identifier(name)) => parts.push(name.to_string()),
                Some(TokenKind::QuotedIdentifier(name)) => parts.push(name.into_owned()),
                _ => return Ok(None),
            }
            if !self.eat(&TokenKind::Dot)? {
                break;
            }
        }
        Ok(match parts.len() {
            1 => parts.pop().map(|column| (String::new(), column)),
            2 => {
                let column = parts.pop().unwrap_or_default();
                let table = parts.pop().unwrap_or_default();
                Some((table, column))
            }
            _ => None,
        })
    }

    fn literal(&mut self) -> Result<Option<Literal>, Abort> {
        let negative = self.eat(&TokenKind::Minus)?;
        let literal = match self.advance()? {
            Some(TokenKind::Number(text)) => parse_number(text, negative),
            Some(TokenKind::String(s)) if !negative => Some(Literal::String(s.into_owned())),
            Some(TokenKind::True) if !negative => Some(Literal::Boolean(true)),
            Some(TokenKind::False) if !negative => Some(Literal::Boolean(false)),
            _ => None,
        };
        Ok(literal)
    }

    /// `(lit, lit, ...)`, 至少一个元素
    fn literal_list(&mut self) -> Result<Option<Vec<Literal>>, Abort> {
        if !self.eat(&TokenKind::LParen)? {
            return Ok(None);
        }
        let mut values = Vec::new();
        loop {
            let Some(value) = self.literal()? else {
                return Ok(None);
            };
            values.push(value);
            if self.eat(&TokenKind::RParen)? {
                return Ok(Some(values));
            }
            if !self.eat(&TokenKind::Comma)? {
                return Ok(None);
            }
        }
    }
}

fn parse_number(text: &str, negative: bool) -> Option<Literal> {
    let signed = if negative {
        format!("-{}", text)
    } else {
        text.to_string()
    };
    let fractional = text.contains(['.', 'e', 'E']);
    if !fractional {
        if let Ok(n) = signed.parse::<i64>() {
            return Some(Literal::Integer(n));
        }
    }
    signed.parse::<f64>().ok().map(Literal::Float)
}

/// 按给定限制解析过滤文本
pub fn parse_filter(text: &str, config: ParserConfig) -> Result<ParseOutcome, QueryError> {
    Parser::new(text, config).parse()
}
