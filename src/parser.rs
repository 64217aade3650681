//! Filter and sort expressions for the command line, parsed with nom.
//!
//! # Syntax Overview
//!
//! ```text
//! name=Ann              equality
//! age>=30               >= <= != > < =
//! name~'An%'            LIKE
//! city=null             IS NULL
//! id=[1, 2, 3]          IN
//! name=Ann|name=Bo      OR group (bracketed)
//! age>18&age<65         AND group (one connective per expression)
//!
//! ^name                 ascending sort
//! ^!age                 descending sort
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{map, opt, recognize, value},
    multi::separated_list0,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::error::{CriteriaError, CriteriaResult};
use crate::field::DynField;
use crate::query::{Dynamic, Query, SortOrder};
use crate::value::Value;

/// Comparison operator of one condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// One `--filter` argument: conditions joined by a single connective.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
    pub logical_op: LogicalOp,
}

/// One `--order` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

/// Parse a complete filter expression.
pub fn parse_filter(input: &str) -> CriteriaResult<Filter> {
    let input = input.trim();
    if let Ok((remaining, _)) = parse_conditions(input) {
        if remaining.trim_start().starts_with(['|', '&']) {
            return Err(CriteriaError::parse(
                input.len() - remaining.trim_start().len(),
                "'&' and '|' cannot be mixed in one filter, pass separate --filter arguments",
            ));
        }
    }
    finish(input, parse_conditions(input))
}

/// Parse a complete sort expression.
pub fn parse_sort(input: &str) -> CriteriaResult<Sort> {
    let input = input.trim();
    finish(input, parse_sort_expr(input))
}

fn finish<T>(input: &str, result: IResult<&str, T>) -> CriteriaResult<T> {
    match result {
        Ok(("", out)) => Ok(out),
        Ok((remaining, _)) => Err(CriteriaError::parse(
            input.len() - remaining.len(),
            format!("Unexpected trailing content: '{}'", remaining),
        )),
        Err(e) => Err(CriteriaError::parse(0, format!("Parse failed: {:?}", e))),
    }
}

impl Filter {
    /// Add this filter to a query over `entity`. A group of more than one
    /// OR-ed condition is bracketed.
    pub fn apply(&self, entity: &str, query: &mut Query<'_, Dynamic>) {
        let grouped = self.logical_op == LogicalOp::Or && self.conditions.len() > 1;
        if grouped {
            query.brackets(|q| self.apply_conditions(entity, q));
        } else {
            self.apply_conditions(entity, query);
        }
    }

    fn apply_conditions(&self, entity: &str, query: &mut Query<'_, Dynamic>) {
        for cond in &self.conditions {
            if self.logical_op == LogicalOp::Or {
                query.or();
            }
            let field = DynField::new(entity, cond.field.as_str());
            let value = cond.value.clone();
            match (cond.op, value) {
                (FilterOp::Eq, Value::List(items)) => query.in_(field, items),
                (FilterOp::Ne, Value::List(items)) => query.not_in(field, items),
                (FilterOp::Eq, value) => query.eq(field, value),
                (FilterOp::Ne, value) => query.ne(field, value),
                (FilterOp::Gt, value) => query.gt(field, value),
                (FilterOp::Ge, value) => query.ge(field, value),
                (FilterOp::Lt, value) => query.lt(field, value),
                (FilterOp::Le, value) => query.le(field, value),
                (FilterOp::Like, value) => query.like(field, pattern(&value)),
            };
        }
    }
}

impl Sort {
    pub fn apply(&self, entity: &str, query: &mut Query<'_, Dynamic>) {
        query.order_by(DynField::new(entity, self.field.as_str()), self.order);
    }
}

/// Text of a value used as a LIKE pattern.
fn pattern(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse an identifier (field name).
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

/// Parse conditions joined by one connective. Parsing stops before a
/// connective that differs from the first one.
fn parse_conditions(input: &str) -> IResult<&str, Filter> {
    let (input, first) = parse_condition(input)?;
    let mut conditions = vec![first];
    let mut joined_by = None;

    let mut remaining = input;
    loop {
        let (input, _) = multispace0(remaining)?;
        let (input, op) = match input.chars().next() {
            Some('|') => (&input[1..], LogicalOp::Or),
            Some('&') => (&input[1..], LogicalOp::And),
            _ => break,
        };
        if *joined_by.get_or_insert(op) != op {
            break;
        }
        let (input, _) = multispace0(input)?;
        let (input, cond) = parse_condition(input)?;
        conditions.push(cond);
        remaining = input;
    }

    Ok((
        remaining,
        Filter {
            conditions,
            logical_op: joined_by.unwrap_or(LogicalOp::And),
        },
    ))
}

/// Parse a single condition.
fn parse_condition(input: &str) -> IResult<&str, Condition> {
    let (input, field) = parse_identifier(input)?;
    let (input, _) = multispace0(input)?;
    let (input, (op, value)) = parse_operator_and_value(input)?;

    Ok((
        input,
        Condition {
            field: field.to_string(),
            op,
            value,
        },
    ))
}

/// Parse operator and value together.
fn parse_operator_and_value(input: &str) -> IResult<&str, (FilterOp, Value)> {
    alt((
        map(preceded(char('~'), parse_value), |v| (FilterOp::Like, v)),
        map(preceded(tag(">="), parse_value), |v| (FilterOp::Ge, v)),
        map(preceded(tag("<="), parse_value), |v| (FilterOp::Le, v)),
        map(preceded(tag("!="), parse_value), |v| (FilterOp::Ne, v)),
        map(preceded(char('>'), parse_value), |v| (FilterOp::Gt, v)),
        map(preceded(char('<'), parse_value), |v| (FilterOp::Lt, v)),
        map(preceded(char('='), parse_value), |v| (FilterOp::Eq, v)),
    ))(input)
}

/// Parse a value.
fn parse_value(input: &str) -> IResult<&str, Value> {
    let (input, _) = multispace0(input)?;

    alt((
        parse_list,
        value(Value::Null, tag("null")),
        value(Value::Bool(true), tag("true")),
        value(Value::Bool(false), tag("false")),
        parse_number,
        parse_quoted_string,
        // Bare word (treated as string)
        map(
            take_while1(|c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '%' | ':')),
            |s: &str| Value::String(s.to_string()),
        ),
    ))(input)
}

/// Parse a list value `[a, b]`.
fn parse_list(input: &str) -> IResult<&str, Value> {
    map(
        delimited(
            char('['),
            separated_list0(delimited(multispace0, char(','), multispace0), parse_value),
            preceded(multispace0, char(']')),
        ),
        Value::List,
    )(input)
}

/// Parse a number (integer or float). Must not run into a word.
fn parse_number(input: &str) -> IResult<&str, Value> {
    let (rest, num_str) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)?;

    if rest.starts_with(|c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        )));
    }

    let parsed = if num_str.contains('.') {
        num_str.parse().map(Value::Float).ok()
    } else {
        num_str.parse().map(Value::Int).ok()
    };
    match parsed {
        Some(v) => Ok((rest, v)),
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        ))),
    }
}

/// Parse a quoted string.
fn parse_quoted_string(input: &str) -> IResult<&str, Value> {
    let (input, _) = char('\'')(input)?;
    let (input, content) = take_while(|c| c != '\'')(input)?;
    let (input, _) = char('\'')(input)?;

    Ok((input, Value::String(content.to_string())))
}

/// Parse a sort expression `^field` or `^!field`.
fn parse_sort_expr(input: &str) -> IResult<&str, Sort> {
    let (input, _) = opt(char('^'))(input)?;
    let (input, desc) = opt(char('!'))(input)?;
    let (input, field) = parse_identifier(input)?;

    let order = if desc.is_some() {
        SortOrder::Desc
    } else {
        SortOrder::Asc
    };

    Ok((
        input,
        Sort {
            field: field.to_string(),
            order,
        },
    ))
}
