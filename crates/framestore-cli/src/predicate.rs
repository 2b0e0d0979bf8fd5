//! Parsing `--where` strings into predicate expressions.
//!
//! Grammar: `term (& term)* (| term (& term)*)*`, where a term is
//! `field op value`, `field in (v1, v2)` or `field not in (v1, v2)`, and
//! `op` is one of `== = != < <= > >=`. `&` binds tighter than `|`.

use framestore::expr::{Expr, Value};

use crate::error::{CliResult, InvalidPredicateSnafu};

const OPERATORS: [&str; 7] = [">=", "<=", "!=", "==", ">", "<", "="];

pub fn parse_where(input: &str) -> CliResult<Expr> {
    let mut any = Vec::new();
    for disjunct in input.split('|') {
        let mut all = Vec::new();
        for term in disjunct.split('&') {
            all.push(parse_term(input, term.trim())?);
        }
        any.push(all.into_iter().reduce(Expr::and).ok_or_else(|| invalid(input, "empty term"))?);
    }
    any.into_iter()
        .reduce(Expr::or)
        .ok_or_else(|| invalid(input, "empty expression"))
}

fn parse_term(input: &str, term: &str) -> CliResult<Expr> {
    if term.is_empty() {
        return Err(invalid(input, "empty term"));
    }
    if let Some((field, rest)) = split_membership(term) {
        let (negated, list) = rest;
        let values = parse_list(input, list)?;
        let col = Expr::col(field);
        return Ok(if negated { col.not_in(values) } else { col.isin(values) });
    }
    for op in OPERATORS {
        if let Some((field, value)) = term.split_once(op) {
            let field = field.trim();
            if field.is_empty() {
                return Err(invalid(input, &format!("missing field in '{term}'")));
            }
            let value = parse_value(value.trim());
            let col = Expr::col(field);
            return Ok(match op {
                ">=" => col.ge(value),
                "<=" => col.le(value),
                "!=" => col.ne(value),
                ">" => col.gt(value),
                "<" => col.lt(value),
                _ => col.eq(value),
            });
        }
    }
    Err(invalid(input, &format!("no operator in '{term}'")))
}

/// `field in (...)` or `field not in (...)`.
fn split_membership(term: &str) -> Option<(&str, (bool, &str))> {
    if let Some((field, list)) = term.split_once(" not in ") {
        return Some((field.trim(), (true, list.trim())));
    }
    term.split_once(" in ")
        .map(|(field, list)| (field.trim(), (false, list.trim())))
}

fn parse_list(input: &str, list: &str) -> CliResult<Vec<Value>> {
    let inner = list
        .strip_prefix('(')
        .and_then(|l| l.strip_suffix(')'))
        .or_else(|| list.strip_prefix('[').and_then(|l| l.strip_suffix(']')))
        .ok_or_else(|| invalid(input, &format!("expected a parenthesized list, got '{list}'")))?;
    Ok(inner
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(parse_value)
        .collect())
}

fn parse_value(raw: &str) -> Value {
    for quote in ['\'', '"'] {
        if let Some(s) = raw.strip_prefix(quote).and_then(|r| r.strip_suffix(quote)) {
            return Value::Str(s.to_string());
        }
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Value::Int(v);
    }
    if let Ok(v) = raw.parse::<f64>() {
        return Value::Float(v);
    }
    match raw {
        "true" | "True" => Value::Bool(true),
        "false" | "False" => Value::Bool(false),
        _ => Value::Str(raw.to_string()),
    }
}

fn invalid(input: &str, message: &str) -> crate::error::CliError {
    InvalidPredicateSnafu {
        input: input.to_string(),
        message: message.to_string(),
    }
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conjunction_binds_tighter_than_disjunction() -> Result<(), Box<dyn std::error::Error>> {
        let expr = parse_where("index >= 5 & a < 3 | b == 'x'")?;
        let expected = Expr::col("index")
            .ge(5)
            .and(Expr::col("a").lt(3))
            .or(Expr::col("b").eq("x"));
        assert_eq!(expr, expected);
        Ok(())
    }

    #[test]
    fn membership_lists() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(parse_where("a in (1, 2)")?, Expr::col("a").isin([1, 2]));
        assert_eq!(parse_where("s not in [x, 'y']")?, Expr::col("s").not_in(["x", "y"]));
        Ok(())
    }

    #[test]
    fn values_are_typed() {
        assert_eq!(parse_value("7"), Value::Int(7));
        assert_eq!(parse_value("1.5"), Value::Float(1.5));
        assert_eq!(parse_value("true"), Value::Bool(true));
        assert_eq!(parse_value("2024-01-01"), Value::Str("2024-01-01".into()));
    }

    #[test]
    fn terms_need_an_operator() {
        assert!(parse_where("index").is_err());
        assert!(parse_where("a > 1 & ").is_err());
    }
}
