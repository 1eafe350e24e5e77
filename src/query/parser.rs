use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

use crate::document::Value;
use crate::error::{QueryError, QueryResult};

use super::ast::{
    Accepter, CompareOp, Depth, KeyKind, Matcher, Query, Queryset, RelationOp, Selector,
};
use super::lexer::Scanner;
use super::token::{Token, TokenKind};

/// Compile a query string into an executable queryset.
pub fn parse(input: &str) -> QueryResult<Queryset> {
    Parser::new(input)?.parse()
}

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(input: &str) -> QueryResult<Self> {
        let tokens = Scanner::new(input).tokenize()?;

        Ok(Self {
            tokens,
            position: 0,
        })
    }

    fn current(&self) -> &Token {
        // tokenize always terminates the stream with an EOF token
        &self.tokens[self.position]
    }

    fn advance(&mut self) {
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
    }

    fn is_done(&self) -> bool {
        self.current().is_done()
    }

    fn expect(&mut self, kind: TokenKind, want: &str) -> QueryResult<()> {
        if self.current().kind != kind {
            return Err(self.unexpected(want));
        }
        self.advance();
        Ok(())
    }

    fn unexpected(&self, want: &str) -> QueryError {
        QueryError::Syntax(format!("unexpected token {}, want {}", self.current(), want))
    }

    pub fn parse(&mut self) -> QueryResult<Queryset> {
        let mut queries = Vec::new();
        while !self.is_done() {
            queries.push(self.parse_query()?);
            match self.current().kind {
                TokenKind::Comma => {
                    self.advance();
                    let token = self.current();
                    if !(token.is_key() || token.is_level() || token.is_type()) {
                        return Err(self.unexpected("key"));
                    }
                }
                TokenKind::Eof => {}
                _ => return Err(self.unexpected("comma or end of query")),
            }
        }
        Ok(Queryset(queries))
    }

    fn parse_query(&mut self) -> QueryResult<Query> {
        let mut depth = Depth::Any;
        if self.current().is_level() {
            if self.current().kind == TokenKind::LevelOne {
                depth = Depth::One;
            }
            self.advance();
        }
        let choices = self.parse_choices()?;
        let selector = if self.current().is_selector() {
            Some(self.parse_selector()?)
        } else {
            None
        };
        let matcher = if self.current().is_expression() {
            self.advance();
            Some(self.parse_matcher()?)
        } else {
            None
        };
        let next = if self.current().is_level() {
            Some(Box::new(self.parse_query()?))
        } else {
            None
        };
        Ok(Query {
            depth,
            choices,
            selector,
            matcher,
            next,
        })
    }

    fn parse_choices(&mut self) -> QueryResult<Vec<Accepter>> {
        let kind = if self.current().is_type() {
            let kind = match self.current().kind {
                TokenKind::Array => KeyKind::Array,
                TokenKind::Regular => KeyKind::Regular,
                _ => KeyKind::Value,
            };
            self.advance();
            kind
        } else {
            KeyKind::Any
        };
        if self.current().is_key() {
            let accepter = self.make_accepter(kind);
            self.advance();
            return Ok(vec![accepter]);
        }
        self.expect(TokenKind::BegGrp, "key or lparen")?;
        let mut choices = Vec::new();
        while !self.is_done() && self.current().kind != TokenKind::EndGrp {
            if !self.current().is_key() {
                return Err(self.unexpected("key"));
            }
            choices.push(self.make_accepter(kind));
            self.advance();
            match self.current().kind {
                TokenKind::Comma => self.advance(),
                TokenKind::EndGrp => {}
                _ => return Err(self.unexpected("comma or rparen")),
            }
        }
        self.expect(TokenKind::EndGrp, "rparen")?;
        if choices.is_empty() {
            return Err(QueryError::Syntax("empty choice group".to_string()));
        }
        Ok(choices)
    }

    fn make_accepter(&self, kind: KeyKind) -> Accepter {
        let token = self.current();
        if token.kind == TokenKind::Pattern {
            Accepter::Pattern {
                pattern: token.literal.clone(),
                kind,
            }
        } else {
            Accepter::Name {
                label: token.literal.clone(),
                kind,
            }
        }
    }

    fn parse_selector(&mut self) -> QueryResult<Selector> {
        let kind = self.current().kind;
        self.advance();
        let selector = match kind {
            TokenKind::SelectAt => self.parse_select_at()?,
            TokenKind::SelectRange => self.parse_select_range()?,
            TokenKind::SelectFirst => Selector::First,
            TokenKind::SelectLast => Selector::Last,
            TokenKind::SelectInt => Selector::Int,
            TokenKind::SelectFloat => Selector::Float,
            TokenKind::SelectNumber => Selector::Number,
            TokenKind::SelectBool => Selector::Bool,
            TokenKind::SelectString => Selector::String,
            TokenKind::SelectTruthy => Selector::Truthy,
            _ => Selector::Falsy,
        };
        Ok(selector)
    }

    fn parse_select_at(&mut self) -> QueryResult<Selector> {
        self.expect(TokenKind::BegGrp, "lparen")?;
        if self.current().kind != TokenKind::Integer {
            return Err(self.unexpected("index"));
        }
        let index = self.index_argument()?;
        self.advance();
        self.expect(TokenKind::EndGrp, "rparen")?;
        Ok(Selector::At(index))
    }

    fn parse_select_range(&mut self) -> QueryResult<Selector> {
        self.expect(TokenKind::BegGrp, "lparen")?;
        let start = if self.current().kind == TokenKind::Integer {
            let value = self.index_argument()?;
            self.advance();
            Some(value)
        } else {
            None
        };
        self.expect(TokenKind::Comma, "comma")?;
        let end = if self.current().kind == TokenKind::Integer {
            let value = self.index_argument()?;
            self.advance();
            Some(value)
        } else {
            None
        };
        self.expect(TokenKind::EndGrp, "rparen")?;
        Ok(Selector::Range { start, end })
    }

    fn index_argument(&self) -> QueryResult<usize> {
        let literal = &self.current().literal;
        let value = parse_integer(literal)?;
        usize::try_from(value)
            .map_err(|_| QueryError::Syntax(format!("invalid index {literal}")))
    }

    /// Predicate between brackets; `||` binds weaker than `&&`, groups with
    /// parentheses.
    fn parse_matcher(&mut self) -> QueryResult<Matcher> {
        let matcher = self.parse_or()?;
        self.expect(TokenKind::EndExpr, "end of expression")?;
        Ok(matcher)
    }

    fn parse_or(&mut self) -> QueryResult<Matcher> {
        let mut left = self.parse_and()?;
        while self.current().kind == TokenKind::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Matcher::Infix {
                op: RelationOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> QueryResult<Matcher> {
        let mut left = self.parse_operand()?;
        while self.current().kind == TokenKind::And {
            self.advance();
            let right = self.parse_operand()?;
            left = Matcher::Infix {
                op: RelationOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_operand(&mut self) -> QueryResult<Matcher> {
        if self.current().kind == TokenKind::BegGrp {
            self.advance();
            let matcher = self.parse_or()?;
            self.expect(TokenKind::EndGrp, "rparen")?;
            return Ok(matcher);
        }
        if !self.current().is_key() {
            return Err(self.unexpected("identifier"));
        }
        let option = self.current().literal.clone();
        self.advance();
        if !self.current().is_comparison() {
            return Ok(Matcher::Has { option });
        }
        let op = compare_op(self.current().kind);
        self.advance();
        let values = self.parse_values(op)?;
        Ok(Matcher::Expr { option, op, values })
    }

    fn parse_values(&mut self, op: CompareOp) -> QueryResult<Vec<Value>> {
        if self.current().is_value() {
            let value = self.parse_value(op)?;
            self.advance();
            return Ok(vec![value]);
        }
        self.expect(TokenKind::BegGrp, "value")?;
        let mut values = Vec::new();
        while !self.is_done() && self.current().kind != TokenKind::EndGrp {
            values.push(self.parse_value(op)?);
            self.advance();
            match self.current().kind {
                TokenKind::Comma => self.advance(),
                TokenKind::EndGrp => {}
                _ => return Err(self.unexpected("comma or rparen")),
            }
        }
        self.expect(TokenKind::EndGrp, "rparen")?;
        if values.is_empty() {
            return Err(QueryError::Syntax("empty value group".to_string()));
        }
        Ok(values)
    }

    /// Convert the literal text of a value token into a typed scalar.
    fn parse_value(&self, op: CompareOp) -> QueryResult<Value> {
        let token = self.current();
        if op == CompareOp::Match && token.kind != TokenKind::Pattern {
            return Err(self.unexpected("pattern"));
        }
        let value = match token.kind {
            TokenKind::Pattern | TokenKind::Literal => Value::String(token.literal.clone()),
            TokenKind::Bool => Value::Bool(token.literal == "true"),
            TokenKind::Integer => Value::Int(parse_integer(&token.literal)?),
            TokenKind::Float => {
                let value = token.literal.parse::<f64>().map_err(|err| {
                    QueryError::Syntax(format!("invalid float {}: {err}", token.literal))
                })?;
                Value::Float(value)
            }
            TokenKind::Date => Value::Date(parse_date(&token.literal)?),
            TokenKind::Time => Value::Time(parse_time(&token.literal)?),
            TokenKind::DateTime => Value::DateTime(parse_datetime(&token.literal)?),
            _ => return Err(self.unexpected("value")),
        };
        Ok(value)
    }
}

fn compare_op(kind: TokenKind) -> CompareOp {
    match kind {
        TokenKind::Equal => CompareOp::Equal,
        TokenKind::NotEqual => CompareOp::NotEqual,
        TokenKind::Lesser => CompareOp::Lesser,
        TokenKind::LessEq => CompareOp::LessEq,
        TokenKind::Greater => CompareOp::Greater,
        TokenKind::GreatEq => CompareOp::GreatEq,
        TokenKind::Contains => CompareOp::Contains,
        TokenKind::StartsWith => CompareOp::StartsWith,
        TokenKind::EndsWith => CompareOp::EndsWith,
        _ => CompareOp::Match,
    }
}

/// Signed 64-bit integer with an optional base prefix. The scanner already
/// stripped digit separators. The magnitude is parsed with headroom so the
/// most negative value survives the sign split.
fn parse_integer(literal: &str) -> QueryResult<i64> {
    let (negative, digits) = match literal.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, literal.strip_prefix('+').unwrap_or(literal)),
    };
    let (radix, digits) = if let Some(rest) = digits.strip_prefix("0x") {
        (16, rest)
    } else if let Some(rest) = digits.strip_prefix("0o") {
        (8, rest)
    } else if let Some(rest) = digits.strip_prefix("0b") {
        (2, rest)
    } else {
        (10, digits)
    };
    let magnitude = i128::from_str_radix(digits, radix)
        .map_err(|err| QueryError::Syntax(format!("invalid integer {literal}: {err}")))?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value)
        .map_err(|_| QueryError::Syntax(format!("invalid integer {literal}: out of range")))
}

fn parse_date(literal: &str) -> QueryResult<NaiveDate> {
    NaiveDate::parse_from_str(literal, "%Y-%m-%d")
        .map_err(|err| QueryError::Syntax(format!("invalid date {literal}: {err}")))
}

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M:%S"];

fn parse_time(literal: &str) -> QueryResult<NaiveTime> {
    for format in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(literal, format) {
            return Ok(time);
        }
    }
    Err(QueryError::Syntax(format!("invalid time {literal}")))
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

/// Accepted without an explicit zone; such literals are fixed to UTC.
const DATETIME_FORMATS_NAIVE: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%d %H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];

fn parse_datetime(literal: &str) -> QueryResult<DateTime<FixedOffset>> {
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = DateTime::parse_from_str(literal, format) {
            return Ok(datetime);
        }
    }
    for format in DATETIME_FORMATS_NAIVE {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(literal, format) {
            return Ok(datetime.and_utc().fixed_offset());
        }
    }
    Err(QueryError::Syntax(format!("invalid datetime {literal}")))
}
