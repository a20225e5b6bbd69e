//! SQL clause types (WHERE/HAVING conditions, ORDER BY).

use sqlrecord_core::{Error, Params, Result, UsageErrorKind, Value};
use std::fmt;

/// Comparison operators accepted by conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
    In,
    NotIn,
    Between,
    Is,
    IsNot,
}

impl Operator {
    /// Parse an operator as written in SQL, ignoring case and spacing.
    pub fn parse(op: &str) -> Result<Self> {
        let normalized = op.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "LIKE" => Ok(Operator::Like),
            "NOT LIKE" => Ok(Operator::NotLike),
            "IN" => Ok(Operator::In),
            "NOT IN" => Ok(Operator::NotIn),
            "BETWEEN" => Ok(Operator::Between),
            "IS" => Ok(Operator::Is),
            "IS NOT" => Ok(Operator::IsNot),
            _ => Err(Error::usage(
                UsageErrorKind::UnsupportedOperator,
                format!("unsupported operator '{}'", op),
            )),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Between => "BETWEEN",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
        }
    }

    /// The operator implied by a value when none is given.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Array(_) => Operator::In,
            Value::Null => Operator::Is,
            v if v.has_wildcard() => Operator::Like,
            _ => Operator::Eq,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert a filter value into something bindable.
///
/// JSON arrays become lists and JSON scalars their plain equivalents. JSON
/// objects have no SQL meaning and are rejected.
pub fn bindable(value: Value) -> Result<Value> {
    match value {
        Value::Json(json) => from_json(json),
        Value::Array(items) => items
            .into_iter()
            .map(bindable)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

fn from_json(json: serde_json::Value) -> Result<Value> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_json::Value::Number(n) => Ok(n
            .as_i64()
            .map_or_else(|| Value::Double(n.as_f64().unwrap_or(0.0)), Value::Int)),
        serde_json::Value::String(s) => Ok(Value::Text(s)),
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(from_json)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        serde_json::Value::Object(_) => Err(Error::usage(
            UsageErrorKind::UnsupportedValue,
            "a JSON object cannot be used as a filter value",
        )),
    }
}

fn bind_list(items: Vec<Value>, params: &mut Params) -> String {
    items
        .into_iter()
        .map(|v| params.bind(v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render one condition, binding every literal through `params`.
///
/// A `?` in `key` is replaced by the bound value (a list for arrays) and the
/// operator is ignored.
pub fn render_condition(
    key: &str,
    op: Option<Operator>,
    value: Value,
    params: &mut Params,
) -> Result<String> {
    let value = bindable(value)?;

    if key.contains('?') {
        let placeholder = match value {
            Value::Array(items) if items.is_empty() => "NULL".to_string(),
            Value::Array(items) => bind_list(items, params),
            v => params.bind(v),
        };
        return Ok(key.replacen('?', &placeholder, 1));
    }

    let op = op.unwrap_or_else(|| Operator::infer(&value));
    match (op, value) {
        (Operator::Eq | Operator::Is, Value::Null) => Ok(format!("{} IS NULL", key)),
        (Operator::Ne | Operator::IsNot, Value::Null) => Ok(format!("{} IS NOT NULL", key)),
        (Operator::In | Operator::NotIn, value) => {
            let items = match value {
                Value::Array(items) => items,
                single => vec![single],
            };
            if items.is_empty() {
                // Empty lists are not valid SQL; fold to a constant.
                return Ok(if op == Operator::In { "1 = 0" } else { "1 = 1" }.to_string());
            }
            Ok(format!("{} {} ({})", key, op, bind_list(items, params)))
        }
        (Operator::Between, Value::Array(items)) if items.len() == 2 => {
            let mut items = items.into_iter();
            let low = params.bind(items.next().unwrap_or(Value::Null));
            let high = params.bind(items.next().unwrap_or(Value::Null));
            Ok(format!("{} BETWEEN {} AND {}", key, low, high))
        }
        (Operator::Between, _) => Err(Error::usage(
            UsageErrorKind::InvalidArity,
            format!("BETWEEN on '{}' needs exactly two values", key),
        )),
        (_, Value::Array(_)) => Err(Error::usage(
            UsageErrorKind::UnsupportedValue,
            format!("a list cannot be compared with '{}' on '{}'", op, key),
        )),
        (op, value) => Ok(format!("{} {} {}", key, op, params.bind(value))),
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// ORDER BY clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub expr: String,
    pub direction: OrderDirection,
}

impl OrderBy {
    /// Create an ascending order by clause.
    pub fn asc(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order by clause.
    pub fn desc(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            direction: OrderDirection::Desc,
        }
    }

    /// Generate SQL for this ORDER BY clause.
    pub fn to_sql(&self) -> String {
        match self.direction {
            OrderDirection::Asc => format!("{} ASC", self.expr),
            OrderDirection::Desc => format!("{} DESC", self.expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(key: &str, op: Option<Operator>, value: impl Into<Value>) -> (String, Params) {
        let mut params = Params::new();
        let sql = render_condition(key, op, value.into(), &mut params).unwrap();
        (sql, params)
    }

    #[test]
    fn test_operator_parse() {
        assert_eq!(Operator::parse("<>").unwrap(), Operator::Ne);
        assert_eq!(Operator::parse("not   like").unwrap(), Operator::NotLike);
        assert_eq!(Operator::parse("is not").unwrap(), Operator::IsNot);
        let err = Operator::parse("~=").unwrap_err();
        assert!(matches!(err, Error::Usage(ref e) if e.kind == UsageErrorKind::UnsupportedOperator));
    }

    #[test]
    fn test_inferred_operators() {
        let (sql, params) = render("name", None, "Jane");
        assert_eq!(sql, "name = :p0");
        assert_eq!(params.get("p0"), Some(&Value::from("Jane")));

        assert_eq!(render("name", None, "Ja%").0, "name LIKE :p0");
        assert_eq!(render("name", None, Value::Null).0, "name IS NULL");

        let (sql, params) = render("id", None, vec![1i64, 2, 3]);
        assert_eq!(sql, "id IN (:p0, :p1, :p2)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_explicit_operators() {
        assert_eq!(render("age", Some(Operator::Ge), 18).0, "age >= :p0");
        assert_eq!(render("age", Some(Operator::Ne), Value::Null).0, "age IS NOT NULL");
        assert_eq!(render("id", Some(Operator::NotIn), 4).0, "id NOT IN (:p0)");
        assert_eq!(
            render("age", Some(Operator::Between), [1, 9]).0,
            "age BETWEEN :p0 AND :p1"
        );
    }

    #[test]
    fn test_empty_lists_fold() {
        let (sql, params) = render("id", None, Vec::<Value>::new());
        assert_eq!(sql, "1 = 0");
        assert!(params.is_empty());
        assert_eq!(render("id", Some(Operator::NotIn), Vec::<Value>::new()).0, "1 = 1");
    }

    #[test]
    fn test_question_mark_substitution() {
        let (sql, params) = render("LOWER(name) = LOWER(?)", None, "Jane");
        assert_eq!(sql, "LOWER(name) = LOWER(:p0)");
        assert_eq!(params.len(), 1);

        let (sql, _) = render("id IN (?)", None, [7, 8]);
        assert_eq!(sql, "id IN (:p0, :p1)");
    }

    #[test]
    fn test_value_errors() {
        let mut params = Params::new();
        let err = render_condition("age", Some(Operator::Between), Value::from([1]), &mut params)
            .unwrap_err();
        assert!(matches!(err, Error::Usage(ref e) if e.kind == UsageErrorKind::InvalidArity));

        let object = Value::Json(serde_json::json!({"a": 1}));
        let err = render_condition("meta", None, object, &mut params).unwrap_err();
        assert!(matches!(err, Error::Usage(ref e) if e.kind == UsageErrorKind::UnsupportedValue));

        let err = render_condition("id", Some(Operator::Lt), Value::from([1, 2]), &mut params)
            .unwrap_err();
        assert!(matches!(err, Error::Usage(ref e) if e.kind == UsageErrorKind::UnsupportedValue));
        assert!(params.is_empty());
    }

    #[test]
    fn test_json_array_becomes_list() {
        let (sql, params) = render("id", None, Value::Json(serde_json::json!([1, "2"])));
        assert_eq!(sql, "id IN (:p0, :p1)");
        assert_eq!(params.get("p1"), Some(&Value::from("2")));
    }

    #[test]
    fn test_order_by() {
        assert_eq!(OrderBy::asc("name").to_sql(), "name ASC");
        assert_eq!(OrderBy::desc("post.id").to_sql(), "post.id DESC");
    }
}
