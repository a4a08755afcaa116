//! Filter expression language.
//!
//! Parses the pandas-style comparison strings carried by `Filter` conditions
//! (`homework_submitted == 'No' & quiz_score > 60`) into a small AST and
//! evaluates it per row. `&` binds tighter than `|`; parentheses group.
//!
//! The evaluator is strict: unknown columns and unsupported comparisons are
//! errors. Degrading on failure is the executor's job, not this module's.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map},
    multi::many0,
    number::complete::double,
    sequence::{delimited, preceded, tuple},
    IResult,
};
use thiserror::Error;

use crate::dataset::{numeric, Row};

#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("invalid filter expression: {0}")]
    Parse(String),

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("cannot order-compare column '{column}' with the given value")]
    TypeMismatch { column: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    fn compare_f64(self, left: f64, right: f64) -> bool {
        match self {
            CmpOp::Eq => left == right,
            CmpOp::Ne => left != right,
            CmpOp::Gt => left > right,
            CmpOp::Ge => left >= right,
            CmpOp::Lt => left < right,
            CmpOp::Le => left <= right,
        }
    }

    fn compare_str(self, left: &str, right: &str) -> bool {
        match self {
            CmpOp::Eq => left == right,
            CmpOp::Ne => left != right,
            CmpOp::Gt => left > right,
            CmpOp::Ge => left >= right,
            CmpOp::Lt => left < right,
            CmpOp::Le => left <= right,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Cmp {
        column: String,
        op: CmpOp,
        value: Literal,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Evaluate against one row. Null cells compare false.
    pub fn eval(&self, row: &Row) -> Result<bool, ExprError> {
        match self {
            Expr::And(a, b) => Ok(a.eval(row)? && b.eval(row)?),
            Expr::Or(a, b) => Ok(a.eval(row)? || b.eval(row)?),
            Expr::Cmp { column, op, value } => eval_cmp(row, column, *op, value),
        }
    }

    /// Rewrite comparison column references in place. The callback sees each
    /// comparison's column and literal and may supply a replacement name.
    pub fn rewrite_columns<F>(&mut self, replace: &F)
    where
        F: Fn(&str, &Literal) -> Option<String>,
    {
        match self {
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.rewrite_columns(replace);
                b.rewrite_columns(replace);
            }
            Expr::Cmp { column, value, .. } => {
                if let Some(replacement) = replace(column, value) {
                    *column = replacement;
                }
            }
        }
    }
}

fn eval_cmp(row: &Row, column: &str, op: CmpOp, literal: &Literal) -> Result<bool, ExprError> {
    let cell = row.get(column).or_else(|| {
        row.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    });
    let Some(cell) = cell else {
        return Err(ExprError::UnknownColumn(column.to_string()));
    };
    if cell.is_null() {
        return Ok(false);
    }

    match literal {
        Literal::Number(number) => match numeric(cell) {
            Some(value) => Ok(op.compare_f64(value, *number)),
            None => equality_only(op, column),
        },
        Literal::Text(text) => {
            if let Some(cell_text) = cell.as_str() {
                Ok(op.compare_str(cell_text, text))
            } else if let (Some(value), Ok(number)) = (numeric(cell), text.parse::<f64>()) {
                Ok(op.compare_f64(value, number))
            } else {
                equality_only(op, column)
            }
        }
    }
}

/// Mixed-type comparisons: equality is simply false, inequality true, and
/// ordering is an error.
fn equality_only(op: CmpOp, column: &str) -> Result<bool, ExprError> {
    match op {
        CmpOp::Eq => Ok(false),
        CmpOp::Ne => Ok(true),
        _ => Err(ExprError::TypeMismatch {
            column: column.to_string(),
        }),
    }
}

/// Parse a full filter expression.
pub fn parse(input: &str) -> Result<Expr, ExprError> {
    match all_consuming(ws(or_expr))(input) {
        Ok((_, expr)) => Ok(expr),
        Err(err) => Err(ExprError::Parse(err.to_string())),
    }
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
    ))(input)
}

fn literal(input: &str) -> IResult<&str, Literal> {
    alt((
        map(quoted, |s: &str| Literal::Text(s.to_string())),
        map(double, Literal::Number),
        map(identifier, |s: &str| Literal::Text(s.to_string())),
    ))(input)
}

fn cmp_op(input: &str) -> IResult<&str, CmpOp> {
    alt((
        map(tag("=="), |_| CmpOp::Eq),
        map(tag("!="), |_| CmpOp::Ne),
        map(tag(">="), |_| CmpOp::Ge),
        map(tag("<="), |_| CmpOp::Le),
        map(tag(">"), |_| CmpOp::Gt),
        map(tag("<"), |_| CmpOp::Lt),
    ))(input)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    map(
        tuple((ws(identifier), cmp_op, ws(literal))),
        |(column, op, value)| Expr::Cmp {
            column: column.to_string(),
            op,
            value,
        },
    )(input)
}

fn atom(input: &str) -> IResult<&str, Expr> {
    alt((
        delimited(ws(char('(')), or_expr, ws(char(')'))),
        comparison,
    ))(input)
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = atom(input)?;
    let (input, rest) = many0(preceded(ws(alt((tag("&&"), tag("&")))), atom))(input)?;
    Ok((input, fold_binary(first, rest, Expr::And)))
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(ws(alt((tag("||"), tag("|")))), and_expr))(input)?;
    Ok((input, fold_binary(first, rest, Expr::Or)))
}

fn fold_binary(
    first: Expr,
    rest: Vec<Expr>,
    combine: fn(Box<Expr>, Box<Expr>) -> Expr,
) -> Expr {
    rest.into_iter()
        .fold(first, |acc, next| combine(Box::new(acc), Box::new(next)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn sample() -> Row {
        row(json!({
            "name": "Asha",
            "grade": 8,
            "class": "A",
            "quiz_score": 90,
            "homework_submitted": "No"
        }))
    }

    #[test]
    fn parses_simple_comparison() {
        let expr = parse("grade == 8").unwrap();
        assert_eq!(
            expr,
            Expr::Cmp {
                column: "grade".to_string(),
                op: CmpOp::Eq,
                value: Literal::Number(8.0)
            }
        );
    }

    #[test]
    fn parses_quoted_strings() {
        assert!(parse("homework_submitted == 'No'").unwrap().eval(&sample()).unwrap());
        assert!(parse(r#"class == "A""#).unwrap().eval(&sample()).unwrap());
    }

    #[test]
    fn bareword_literal_reads_as_text() {
        assert!(parse("homework_submitted == No").unwrap().eval(&sample()).unwrap());
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse("grade == 7 | grade == 8 & quiz_score > 80").unwrap();
        match expr {
            Expr::Or(_, right) => assert!(matches!(*right, Expr::And(_, _))),
            other => panic!("expected Or at the root, got {other:?}"),
        }
        assert!(parse("grade == 7 | grade == 8 & quiz_score > 80")
            .unwrap()
            .eval(&sample())
            .unwrap());
    }

    #[test]
    fn parentheses_group() {
        let expr = parse("(grade == 7 | grade == 8) & quiz_score < 80").unwrap();
        assert!(!expr.eval(&sample()).unwrap());
    }

    #[test]
    fn double_ampersand_accepted() {
        let expr = parse("grade == 8 && quiz_score >= 90").unwrap();
        assert!(expr.eval(&sample()).unwrap());
    }

    #[test]
    fn numeric_string_cells_compare_numerically() {
        let row = row(json!({"quiz_score": "85"}));
        assert!(parse("quiz_score > 80").unwrap().eval(&row).unwrap());
    }

    #[test]
    fn unknown_column_is_an_error() {
        let err = parse("marks > 50").unwrap().eval(&sample()).unwrap_err();
        assert_eq!(err, ExprError::UnknownColumn("marks".to_string()));
    }

    #[test]
    fn ordering_against_text_cell_is_type_mismatch() {
        let err = parse("name > 5").unwrap().eval(&sample()).unwrap_err();
        assert!(matches!(err, ExprError::TypeMismatch { .. }));
    }

    #[test]
    fn mixed_type_equality_is_false_not_error() {
        assert!(!parse("name == 5").unwrap().eval(&sample()).unwrap());
        assert!(parse("name != 5").unwrap().eval(&sample()).unwrap());
    }

    #[test]
    fn null_cells_compare_false() {
        let row = row(json!({"quiz_score": null}));
        assert!(!parse("quiz_score > 0").unwrap().eval(&row).unwrap());
    }

    #[test]
    fn garbage_fails_to_parse() {
        assert!(parse("grade === 8").is_err());
        assert!(parse("SELECT * FROM students").is_err());
        assert!(parse("grade == ").is_err());
    }

    #[test]
    fn rewrite_columns_replaces_matching_comparisons() {
        let mut expr = parse("class == 8 & class == 'A'").unwrap();
        expr.rewrite_columns(&|column, value| {
            (column == "class" && matches!(value, Literal::Number(_)))
                .then(|| "grade".to_string())
        });
        let rendered = format!("{expr:?}");
        assert!(rendered.contains("grade"));
        assert!(expr.eval(&sample()).unwrap());
    }
}
