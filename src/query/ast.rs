use std::fmt;

use indexmap::IndexMap;

use crate::document::Value;
use crate::error::{QueryError, QueryResult};
use crate::glob;

/// Whether a segment applies at the current map level only or recurses to
/// any depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    One,
    Any,
}

/// Node category a path segment expects the matched value to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyKind {
    #[default]
    Any,
    /// `%` — a scalar leaf
    Value,
    /// `$` — a regular table
    Regular,
    /// `@` — an array
    Array,
}

impl KeyKind {
    fn expected(self) -> &'static str {
        match self {
            KeyKind::Any => "any",
            KeyKind::Value => "value",
            KeyKind::Regular => "table",
            KeyKind::Array => "array",
        }
    }

    fn check(self, key: &str, value: &Value) -> QueryResult<()> {
        let ok = match self {
            KeyKind::Any => true,
            KeyKind::Value => value.is_scalar(),
            KeyKind::Regular => value.is_map(),
            KeyKind::Array => value.is_array(),
        };
        if ok {
            Ok(())
        } else {
            Err(QueryError::KindMismatch {
                key: key.to_string(),
                expected: self.expected(),
            })
        }
    }
}

/// How a path segment picks a key out of a map: by literal name or by glob
/// pattern, optionally constrained to a node kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Accepter {
    Name { label: String, kind: KeyKind },
    Pattern { pattern: String, kind: KeyKind },
}

impl Accepter {
    /// Find the entry this accepter designates. A pattern takes the first
    /// key it matches in iteration order. Finding a key whose value violates
    /// the kind constraint is an error, not a miss.
    pub fn accept<'a>(
        &self,
        map: &'a IndexMap<String, Value>,
    ) -> QueryResult<Option<(&'a str, &'a Value)>> {
        let (found, kind) = match self {
            Accepter::Name { label, kind } => (
                map.get_key_value(label).map(|(k, v)| (k.as_str(), v)),
                *kind,
            ),
            Accepter::Pattern { pattern, kind } => (
                map.iter()
                    .find(|(key, _)| glob::matches(pattern, key))
                    .map(|(k, v)| (k.as_str(), v)),
                *kind,
            ),
        };
        let Some((key, value)) = found else {
            return Ok(None);
        };
        kind.check(self.describe(), value)?;
        Ok(Some((key, value)))
    }

    fn describe(&self) -> &str {
        match self {
            Accepter::Name { label, .. } => label,
            Accepter::Pattern { pattern, .. } => pattern,
        }
    }

    fn kind(&self) -> KeyKind {
        match self {
            Accepter::Name { kind, .. } => *kind,
            Accepter::Pattern { kind, .. } => *kind,
        }
    }
}

/// Post-match refinement of the selected value: an array slice or a scalar
/// type filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    First,
    Last,
    At(usize),
    Range {
        start: Option<usize>,
        end: Option<usize>,
    },
    Int,
    Float,
    Number,
    Bool,
    String,
    Truthy,
    Falsy,
}

impl Selector {
    /// Refine `value`; `None` means the value is filtered out.
    pub fn select(&self, value: &Value) -> Option<Value> {
        match self {
            Selector::First => match value {
                Value::Array(items) => items.first().map(|v| Value::Array(vec![v.clone()])),
                _ => None,
            },
            Selector::Last => match value {
                Value::Array(items) => items.last().map(|v| Value::Array(vec![v.clone()])),
                _ => None,
            },
            Selector::At(index) => match value {
                Value::Array(items) => items.get(*index).map(|v| Value::Array(vec![v.clone()])),
                _ => None,
            },
            Selector::Range { start, end } => match value {
                Value::Array(items) => {
                    let from = start.unwrap_or(0);
                    let to = match end {
                        None | Some(0) => items.len(),
                        Some(n) => *n,
                    };
                    if from < to && to <= items.len() {
                        Some(Value::Array(items[from..to].to_vec()))
                    } else {
                        None
                    }
                }
                _ => None,
            },
            Selector::Int => keep_if(value, matches!(value, Value::Int(_))),
            Selector::Float => keep_if(value, matches!(value, Value::Float(_))),
            Selector::Number => keep_if(value, matches!(value, Value::Int(_) | Value::Float(_))),
            Selector::Bool => keep_if(value, matches!(value, Value::Bool(_))),
            Selector::String => keep_if(value, matches!(value, Value::String(_))),
            Selector::Truthy => keep_if(value, value.is_truthy()),
            Selector::Falsy => keep_if(value, !value.is_truthy()),
        }
    }
}

fn keep_if(value: &Value, keep: bool) -> Option<Value> {
    if keep {
        Some(value.clone())
    } else {
        None
    }
}

/// Comparison operator of a predicate expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Lesser,
    LessEq,
    Greater,
    GreatEq,
    Contains,
    StartsWith,
    EndsWith,
    Match,
}

/// Logical connective between two predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationOp {
    And,
    Or,
}

/// Predicate tree evaluated against a map.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// Bare identifier: the key exists.
    Has { option: String },
    /// `key op value` or `key op (v1, v2, …)`; the list is an OR over the
    /// candidate values.
    Expr {
        option: String,
        op: CompareOp,
        values: Vec<Value>,
    },
    Infix {
        op: RelationOp,
        left: Box<Matcher>,
        right: Box<Matcher>,
    },
}

/// One segment of a query chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub depth: Depth,
    pub choices: Vec<Accepter>,
    pub selector: Option<Selector>,
    pub matcher: Option<Matcher>,
    pub next: Option<Box<Query>>,
}

/// Top-level sequence of queries separated by commas; results concatenate.
///
/// A compiled queryset is immutable and evaluation never touches it, so one
/// instance can be shared across threads and evaluated concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct Queryset(pub Vec<Query>);

/// One selected entry: the value and the map keys walked to reach it. Array
/// indices do not appear in the path.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub path: Vec<String>,
    pub value: Value,
}

impl fmt::Display for Queryset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, query) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{query}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.depth {
            Depth::One => write!(f, ".")?,
            Depth::Any => write!(f, "..")?,
        }
        if let Some(choice) = self.choices.first() {
            match choice.kind() {
                KeyKind::Any => {}
                KeyKind::Value => write!(f, "%")?,
                KeyKind::Regular => write!(f, "$")?,
                KeyKind::Array => write!(f, "@")?,
            }
        }
        if self.choices.len() == 1 {
            write!(f, "{}", self.choices[0])?;
        } else {
            write!(f, "(")?;
            for (i, choice) in self.choices.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{choice}")?;
            }
            write!(f, ")")?;
        }
        if let Some(selector) = &self.selector {
            write!(f, "{selector}")?;
        }
        if let Some(matcher) = &self.matcher {
            write!(f, "[{matcher}]")?;
        }
        if let Some(next) = &self.next {
            write!(f, "{next}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Accepter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accepter::Name { label, .. } => write_key(f, label),
            Accepter::Pattern { pattern, .. } => write!(f, "/{pattern}/"),
        }
    }
}

/// Keys print bare when the scanner would read them back as a single key
/// token; anything else is double-quoted.
fn write_key(f: &mut fmt::Formatter<'_>, label: &str) -> fmt::Result {
    let bare_word = label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && matches!(label.chars().next(), Some(c) if c.is_ascii_alphabetic())
        && label != "true"
        && label != "false";
    let bare_number = !label.is_empty() && label.chars().all(|c| c.is_ascii_digit());
    if bare_word || bare_number {
        write!(f, "{label}")
    } else {
        write_quoted(f, label)
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in text.chars() {
        match c {
            '\\' => write!(f, "\\\\")?,
            '"' => write!(f, "\\\"")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            '\u{c}' => write!(f, "\\f")?,
            '\u{8}' => write!(f, "\\b")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::First => write!(f, ":first"),
            Selector::Last => write!(f, ":last"),
            Selector::At(index) => write!(f, ":at({index})"),
            Selector::Range { start, end } => {
                write!(f, ":range(")?;
                if let Some(start) = start {
                    write!(f, "{start}")?;
                }
                write!(f, ",")?;
                if let Some(end) = end {
                    write!(f, "{end}")?;
                }
                write!(f, ")")
            }
            Selector::Int => write!(f, ":int"),
            Selector::Float => write!(f, ":float"),
            Selector::Number => write!(f, ":number"),
            Selector::Bool => write!(f, ":bool"),
            Selector::String => write!(f, ":string"),
            Selector::Truthy => write!(f, ":truthy"),
            Selector::Falsy => write!(f, ":falsy"),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
            CompareOp::Lesser => "<",
            CompareOp::LessEq => "<=",
            CompareOp::Greater => ">",
            CompareOp::GreatEq => ">=",
            CompareOp::Contains => "*=",
            CompareOp::StartsWith => "^=",
            CompareOp::EndsWith => "$=",
            CompareOp::Match => "~=",
        };
        write!(f, "{symbol}")
    }
}

impl fmt::Display for RelationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationOp::And => write!(f, "&&"),
            RelationOp::Or => write!(f, "||"),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Has { option } => write_key(f, option),
            Matcher::Expr { option, op, values } => {
                write_key(f, option)?;
                write!(f, " {op} ")?;
                if values.len() == 1 {
                    write_literal(f, *op, &values[0])
                } else {
                    write!(f, "(")?;
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write_literal(f, *op, value)?;
                    }
                    write!(f, ")")
                }
            }
            Matcher::Infix { op, left, right } => {
                write_operand(f, left)?;
                write!(f, " {op} ")?;
                write_operand(f, right)
            }
        }
    }
}

/// Nested connectives get parenthesized so printing and reparsing agree.
fn write_operand(f: &mut fmt::Formatter<'_>, matcher: &Matcher) -> fmt::Result {
    if matches!(matcher, Matcher::Infix { .. }) {
        write!(f, "({matcher})")
    } else {
        write!(f, "{matcher}")
    }
}

/// Render a predicate value the way the scanner reads it back: strings
/// quoted, floats with their decimal point, patterns between slashes.
fn write_literal(f: &mut fmt::Formatter<'_>, op: CompareOp, value: &Value) -> fmt::Result {
    match value {
        Value::String(text) if op == CompareOp::Match => write!(f, "/{text}/"),
        Value::String(text) => write_quoted(f, text),
        Value::Float(v) => write!(f, "{v:?}"),
        other => write!(f, "{other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(items: Vec<i64>) -> Value {
        Value::Array(items.into_iter().map(Value::Int).collect())
    }

    #[test]
    fn test_first_last() {
        let selected = Selector::First.select(&array(vec![1, 2, 3]));
        assert_eq!(selected, Some(array(vec![1])));

        let selected = Selector::Last.select(&array(vec![1, 2, 3]));
        assert_eq!(selected, Some(array(vec![3])));

        assert_eq!(Selector::First.select(&Value::Int(1)), None);
        assert_eq!(Selector::First.select(&array(vec![])), None);
    }

    #[test]
    fn test_at() {
        assert_eq!(
            Selector::At(1).select(&array(vec![1, 2, 3])),
            Some(array(vec![2]))
        );
        assert_eq!(Selector::At(3).select(&array(vec![1, 2, 3])), None);
        assert_eq!(Selector::At(0).select(&Value::Bool(true)), None);
    }

    #[test]
    fn test_range() {
        let items = array(vec![1, 2, 3, 4, 5]);
        let slice = |start, end| Selector::Range { start, end }.select(&items);

        assert_eq!(slice(Some(1), Some(3)), Some(array(vec![2, 3])));
        assert_eq!(slice(None, Some(2)), Some(array(vec![1, 2])));
        assert_eq!(slice(Some(2), None), Some(array(vec![3, 4, 5])));
        assert_eq!(slice(Some(2), Some(0)), Some(array(vec![3, 4, 5])));
        assert_eq!(slice(Some(5), Some(10)), None);
        assert_eq!(slice(Some(3), Some(2)), None);
    }

    #[test]
    fn test_type_filters() {
        assert_eq!(
            Selector::Int.select(&Value::Int(3)),
            Some(Value::Int(3))
        );
        assert_eq!(Selector::Int.select(&Value::Float(0.5)), None);
        assert_eq!(
            Selector::Number.select(&Value::Float(0.5)),
            Some(Value::Float(0.5))
        );
        assert_eq!(Selector::String.select(&Value::Int(10)), None);
        assert_eq!(
            Selector::Bool.select(&Value::Bool(false)),
            Some(Value::Bool(false))
        );
        assert_eq!(Selector::Bool.select(&Value::Float(0.14)), None);
    }

    #[test]
    fn test_truthy_falsy() {
        assert_eq!(
            Selector::Falsy.select(&Value::Int(0)),
            Some(Value::Int(0))
        );
        assert_eq!(Selector::Falsy.select(&Value::String("x".into())), None);
        assert_eq!(
            Selector::Truthy.select(&Value::String("x".into())),
            Some(Value::String("x".into()))
        );
    }

    #[test]
    fn test_accept_by_name() {
        let mut map = IndexMap::new();
        map.insert("foo".to_string(), Value::Int(1));

        let accepter = Accepter::Name {
            label: "foo".to_string(),
            kind: KeyKind::Any,
        };
        let found = accepter.accept(&map).unwrap();
        assert_eq!(found, Some(("foo", &Value::Int(1))));

        let accepter = Accepter::Name {
            label: "bar".to_string(),
            kind: KeyKind::Any,
        };
        assert_eq!(accepter.accept(&map).unwrap(), None);
    }

    #[test]
    fn test_accept_kind_mismatch() {
        let mut map = IndexMap::new();
        map.insert("foo".to_string(), Value::Int(1));

        let accepter = Accepter::Name {
            label: "foo".to_string(),
            kind: KeyKind::Array,
        };
        let err = accepter.accept(&map).unwrap_err();
        assert_eq!(err.to_string(), "foo: array expected");
    }

    #[test]
    fn test_accept_by_pattern_takes_first_match() {
        let mut map = IndexMap::new();
        map.insert("alpha".to_string(), Value::Int(1));
        map.insert("beta".to_string(), Value::Int(2));
        map.insert("badge".to_string(), Value::Int(3));

        let accepter = Accepter::Pattern {
            pattern: "b*".to_string(),
            kind: KeyKind::Any,
        };
        let found = accepter.accept(&map).unwrap();
        assert_eq!(found, Some(("beta", &Value::Int(2))));
    }

    #[test]
    fn test_display_key_quoting() {
        let accepter = Accepter::Name {
            label: "foo bar".to_string(),
            kind: KeyKind::Any,
        };
        assert_eq!(accepter.to_string(), "\"foo bar\"");

        let accepter = Accepter::Name {
            label: "1234".to_string(),
            kind: KeyKind::Any,
        };
        assert_eq!(accepter.to_string(), "1234");

        let accepter = Accepter::Name {
            label: "true".to_string(),
            kind: KeyKind::Any,
        };
        assert_eq!(accepter.to_string(), "\"true\"");
    }
}
