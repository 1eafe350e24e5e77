use indexmap::IndexMap;

use crate::document::Value;
use crate::error::{QueryError, QueryResult};
use crate::glob;

use super::ast::{Accepter, CompareOp, Depth, Matcher, Query, Queryset, RelationOp, Selection};

impl Queryset {
    /// Evaluate every query in the set against `doc` and concatenate the
    /// results. The document is never mutated; selected values are owned
    /// copies.
    pub fn select(&self, doc: &Value) -> QueryResult<Vec<Selection>> {
        let mut results = Vec::new();
        for query in &self.0 {
            results.extend(query.select(doc)?);
        }
        Ok(results)
    }
}

impl Query {
    pub fn select(&self, doc: &Value) -> QueryResult<Vec<Selection>> {
        self.select_node(doc, &[])
    }

    fn select_node(&self, node: &Value, path: &[String]) -> QueryResult<Vec<Selection>> {
        match node {
            Value::Array(items) => {
                let mut results = Vec::new();
                for item in items {
                    results.extend(self.select_node(item, path)?);
                }
                Ok(results)
            }
            Value::Map(map) => {
                let mut results = Vec::new();
                for choice in &self.choices {
                    results.extend(self.select_from_map(choice, map, path)?);
                }
                Ok(results)
            }
            scalar => Err(QueryError::ApplyOnValue(scalar.to_string())),
        }
    }

    fn select_from_map(
        &self,
        choice: &Accepter,
        map: &IndexMap<String, Value>,
        path: &[String],
    ) -> QueryResult<Vec<Selection>> {
        let Some((key, value)) = choice.accept(map)? else {
            if self.depth == Depth::Any {
                return self.traverse_map(choice, map, path);
            }
            return Ok(Vec::new());
        };
        let value = match &self.selector {
            Some(selector) => match selector.select(value) {
                Some(value) => value,
                None => return Ok(Vec::new()),
            },
            None => value.clone(),
        };
        let value = match &self.matcher {
            Some(matcher) => match apply_matcher(matcher, value)? {
                Some(value) => value,
                None => return Ok(Vec::new()),
            },
            None => value,
        };
        let mut path = path.to_vec();
        path.push(key.to_string());
        match &self.next {
            Some(next) => next.select_node(&value, &path),
            None => Ok(vec![Selection { path, value }]),
        }
    }

    /// The accepter found nothing at this level: descend into every entry,
    /// looking for it deeper down. This is the only place where traversal is
    /// unbounded.
    fn traverse_map(
        &self,
        choice: &Accepter,
        map: &IndexMap<String, Value>,
        path: &[String],
    ) -> QueryResult<Vec<Selection>> {
        let mut results = Vec::new();
        for (key, value) in map {
            let mut deeper = path.to_vec();
            deeper.push(key.clone());
            match value {
                Value::Array(items) => {
                    results.extend(self.traverse_array(choice, items, &deeper)?);
                }
                Value::Map(inner) => {
                    results.extend(self.select_from_map(choice, inner, &deeper)?);
                }
                _ => {}
            }
        }
        Ok(results)
    }

    fn traverse_array(
        &self,
        choice: &Accepter,
        items: &[Value],
        path: &[String],
    ) -> QueryResult<Vec<Selection>> {
        let mut results = Vec::new();
        for item in items {
            match item {
                Value::Map(map) => {
                    results.extend(self.select_from_map(choice, map, path)?);
                }
                Value::Array(inner) => {
                    results.extend(self.traverse_array(choice, inner, path)?);
                }
                _ => {}
            }
        }
        Ok(results)
    }
}

/// Run the predicate over the selected value. A map is kept or dropped as a
/// whole; an array of maps is filtered element-wise, non-map elements are
/// discarded. Predicates over scalars are an error.
fn apply_matcher(matcher: &Matcher, value: Value) -> QueryResult<Option<Value>> {
    match value {
        Value::Map(map) => {
            if matcher.matches(&map)? {
                Ok(Some(Value::Map(map)))
            } else {
                Ok(None)
            }
        }
        Value::Array(items) => {
            let mut kept = Vec::new();
            for item in items {
                if let Value::Map(map) = item {
                    if matcher.matches(&map)? {
                        kept.push(Value::Map(map));
                    }
                }
            }
            if kept.is_empty() {
                Ok(None)
            } else {
                Ok(Some(Value::Array(kept)))
            }
        }
        scalar => Err(QueryError::ApplyOnValue(scalar.to_string())),
    }
}

impl Matcher {
    /// Evaluate the predicate against one map. Connectives short-circuit, so
    /// an error on the right side is never seen once the left side decides.
    pub fn matches(&self, map: &IndexMap<String, Value>) -> QueryResult<bool> {
        match self {
            Matcher::Has { option } => Ok(map.contains_key(option)),
            Matcher::Expr { option, op, values } => {
                let Some(field) = map.get(option) else {
                    return Err(QueryError::OptionNotFound(option.clone()));
                };
                for want in values {
                    if compare(*op, field, want)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Matcher::Infix { op, left, right } => match op {
                RelationOp::And => {
                    if !left.matches(map)? {
                        return Ok(false);
                    }
                    right.matches(map)
                }
                RelationOp::Or => {
                    if left.matches(map)? {
                        return Ok(true);
                    }
                    right.matches(map)
                }
            },
        }
    }
}

fn compare(op: CompareOp, field: &Value, want: &Value) -> QueryResult<bool> {
    match op {
        CompareOp::Equal => values_equal(field, want),
        CompareOp::NotEqual => values_equal(field, want).map(|equal| !equal),
        CompareOp::Lesser => values_less(field, want),
        CompareOp::LessEq => Ok(values_equal(field, want)? || values_less(field, want)?),
        CompareOp::Greater => values_less(want, field),
        CompareOp::GreatEq => Ok(values_equal(field, want)? || values_less(want, field)?),
        CompareOp::Contains => {
            let (field, want) = string_operands(field, want)?;
            Ok(field.contains(want))
        }
        CompareOp::StartsWith => {
            let (field, want) = string_operands(field, want)?;
            Ok(field.starts_with(want))
        }
        CompareOp::EndsWith => {
            let (field, want) = string_operands(field, want)?;
            Ok(field.ends_with(want))
        }
        CompareOp::Match => {
            let Value::String(pattern) = want else {
                return Err(QueryError::Cast {
                    value: want.to_string(),
                    kind: "pattern",
                });
            };
            let text = stringify(field)?;
            Ok(glob::matches(pattern, &text))
        }
    }
}

/// Equality is structural and strictly within a tag.
fn values_equal(field: &Value, want: &Value) -> QueryResult<bool> {
    match (field, want) {
        (Value::Int(a), Value::Int(b)) => Ok(a == b),
        (Value::Float(a), Value::Float(b)) => Ok(a == b),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::String(a), Value::String(b)) => Ok(a == b),
        (Value::Date(a), Value::Date(b)) => Ok(a == b),
        (Value::Time(a), Value::Time(b)) => Ok(a == b),
        (Value::DateTime(a), Value::DateTime(b)) => Ok(a == b),
        _ => Err(type_mismatch(field, want)),
    }
}

/// True when `field` sorts before `want`. Ordering is defined on numbers,
/// strings and the temporal tags; booleans only support equality.
fn values_less(field: &Value, want: &Value) -> QueryResult<bool> {
    match (field, want) {
        (Value::Int(a), Value::Int(b)) => Ok(a < b),
        (Value::Float(a), Value::Float(b)) => Ok(a < b),
        (Value::String(a), Value::String(b)) => Ok(a < b),
        (Value::Date(a), Value::Date(b)) => Ok(a < b),
        (Value::Time(a), Value::Time(b)) => Ok(a < b),
        (Value::DateTime(a), Value::DateTime(b)) => Ok(a < b),
        (Value::Bool(_), Value::Bool(_)) => Err(QueryError::TypeMismatch(
            "booleans can only be compared for equality".to_string(),
        )),
        _ => Err(type_mismatch(field, want)),
    }
}

fn type_mismatch(field: &Value, want: &Value) -> QueryError {
    QueryError::TypeMismatch(format!(
        "can not compare {} with {}",
        field.type_name(),
        want.type_name()
    ))
}

fn string_operands<'a>(field: &'a Value, want: &'a Value) -> QueryResult<(&'a str, &'a str)> {
    match (field, want) {
        (Value::String(field), Value::String(want)) => Ok((field, want)),
        _ => Err(type_mismatch(field, want)),
    }
}

/// Scalar rendering used by the glob operator: integers decimal, floats in
/// their shortest round-trip form, datetimes RFC 3339.
fn stringify(field: &Value) -> QueryResult<String> {
    match field {
        Value::Array(_) | Value::Map(_) => Err(QueryError::Cast {
            value: field.to_string(),
            kind: "string",
        }),
        scalar => Ok(scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, Value)]) -> IndexMap<String, Value> {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_has() {
        let doc = map(&[("name", Value::String("marlowe".into()))]);
        let matcher = Matcher::Has {
            option: "name".into(),
        };
        assert!(matcher.matches(&doc).unwrap());

        let matcher = Matcher::Has {
            option: "missing".into(),
        };
        assert!(!matcher.matches(&doc).unwrap());
    }

    #[test]
    fn test_expr_missing_option_is_an_error() {
        let doc = map(&[("name", Value::String("marlowe".into()))]);
        let matcher = Matcher::Expr {
            option: "missing".into(),
            op: CompareOp::Equal,
            values: vec![Value::Int(1)],
        };
        let err = matcher.matches(&doc).unwrap_err();
        assert!(matches!(err, QueryError::OptionNotFound(_)));
    }

    #[test]
    fn test_expr_value_list_is_a_disjunction() {
        let doc = map(&[("mode", Value::Int(255))]);
        let matcher = Matcher::Expr {
            option: "mode".into(),
            op: CompareOp::Equal,
            values: vec![Value::Int(0), Value::Int(255)],
        };
        assert!(matcher.matches(&doc).unwrap());
    }

    #[test]
    fn test_cross_tag_comparison_fails() {
        let doc = map(&[("mode", Value::Int(255))]);
        let matcher = Matcher::Expr {
            option: "mode".into(),
            op: CompareOp::Equal,
            values: vec![Value::String("255".into())],
        };
        let err = matcher.matches(&doc).unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch(_)));
    }

    #[test]
    fn test_ordering_direction() {
        let doc = map(&[("rps", Value::Int(50))]);
        let less = |op, value| {
            Matcher::Expr {
                option: "rps".into(),
                op,
                values: vec![Value::Int(value)],
            }
            .matches(&doc)
            .unwrap()
        };
        assert!(less(CompareOp::Lesser, 100));
        assert!(!less(CompareOp::Lesser, 50));
        assert!(less(CompareOp::LessEq, 50));
        assert!(less(CompareOp::Greater, 10));
        assert!(less(CompareOp::GreatEq, 50));
        assert!(!less(CompareOp::Greater, 50));
    }

    #[test]
    fn test_boolean_ordering_rejected() {
        let doc = map(&[("tls", Value::Bool(true))]);
        let matcher = Matcher::Expr {
            option: "tls".into(),
            op: CompareOp::Lesser,
            values: vec![Value::Bool(false)],
        };
        assert!(matcher.matches(&doc).is_err());
    }

    #[test]
    fn test_string_operators() {
        let doc = map(&[("addr", Value::String("239.192.0.1:31001".into()))]);
        let check = |op, value: &str| {
            Matcher::Expr {
                option: "addr".into(),
                op,
                values: vec![Value::String(value.into())],
            }
            .matches(&doc)
            .unwrap()
        };
        assert!(check(CompareOp::StartsWith, "239"));
        assert!(check(CompareOp::EndsWith, "31001"));
        assert!(check(CompareOp::Contains, "192"));
        assert!(!check(CompareOp::StartsWith, "224"));
    }

    #[test]
    fn test_glob_match_stringifies() {
        let doc = map(&[
            ("port", Value::Int(31001)),
            ("tls", Value::Bool(true)),
        ]);
        let check = |option: &str, pattern: &str| {
            Matcher::Expr {
                option: option.into(),
                op: CompareOp::Match,
                values: vec![Value::String(pattern.into())],
            }
            .matches(&doc)
            .unwrap()
        };
        assert!(check("port", "31*"));
        assert!(check("tls", "true"));
        assert!(!check("port", "32*"));
    }

    #[test]
    fn test_short_circuit_suppresses_right_error() {
        let doc = map(&[("tls", Value::Bool(true))]);
        let bad = Matcher::Expr {
            option: "missing".into(),
            op: CompareOp::Equal,
            values: vec![Value::Int(1)],
        };
        let good = Matcher::Expr {
            option: "tls".into(),
            op: CompareOp::Equal,
            values: vec![Value::Bool(true)],
        };

        let or = Matcher::Infix {
            op: RelationOp::Or,
            left: Box::new(good.clone()),
            right: Box::new(bad.clone()),
        };
        assert!(or.matches(&doc).unwrap());

        let and = Matcher::Infix {
            op: RelationOp::And,
            left: Box::new(good),
            right: Box::new(bad),
        };
        assert!(and.matches(&doc).is_err());
    }
}
