use bson::{Bson, Document};
use regex::Regex;

use crate::expression::Expression;

/// Parse error for filter documents.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterParseError(pub String);

impl std::fmt::Display for FilterParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "filter parse error: {}", self.0)
    }
}

impl std::error::Error for FilterParseError {}

/// Parse a BSON filter document into an Expression tree.
///
/// Follows MongoDB query semantics:
/// - Top-level document is an implicit AND of all entries
/// - `{ "field": value }` is implicit `$eq`
/// - `{ "field": { "$gt": v } }` uses operator sub-documents
/// - `{ "$or": [...] }` / `{ "$and": [...] }` for explicit logical ops
/// - `{ "field": { "$regex": "pattern", "$options": "i" } }` for regex
/// - `{ "field": { "$exists": true } }` for field existence checks
/// - an empty document matches every document
pub fn parse_filter(doc: &Document) -> Result<Expression, FilterParseError> {
    let mut children = Vec::new();

    for (key, value) in doc.iter() {
        let key: &str = key.as_ref();
        match key {
            "$and" => children.push(parse_logical_array(value, Expression::And)?),
            "$or" => children.push(parse_logical_array(value, Expression::Or)?),
            k if k.starts_with('$') => {
                return Err(FilterParseError(format!("unknown top-level operator: {k}")));
            }
            _ => children.push(parse_field_condition(key, value)?),
        }
    }

    if children.len() == 1 {
        Ok(children.pop().unwrap())
    } else {
        // Zero children is the match-everything filter.
        Ok(Expression::And(children))
    }
}

/// Parse a `$and` or `$or` array value into a logical expression.
fn parse_logical_array(
    value: &Bson,
    make: fn(Vec<Expression>) -> Expression,
) -> Result<Expression, FilterParseError> {
    let arr = match value {
        Bson::Array(a) => a,
        _ => return Err(FilterParseError("$and/$or value must be an array".into())),
    };

    let mut children = Vec::new();
    for elem in arr {
        match elem {
            Bson::Document(sub_doc) => children.push(parse_filter(sub_doc)?),
            _ => {
                return Err(FilterParseError(
                    "$and/$or array elements must be documents".into(),
                ));
            }
        }
    }

    if children.is_empty() {
        return Err(FilterParseError("$and/$or array must not be empty".into()));
    }

    Ok(make(children))
}

/// Parse a field condition: either implicit $eq or an operator sub-document.
fn parse_field_condition(field: &str, value: &Bson) -> Result<Expression, FilterParseError> {
    // If value is a document whose first key starts with $, it's an operator doc
    if let Bson::Document(sub_doc) = value {
        if let Some((first_key, _)) = sub_doc.iter().next() {
            let first_key: &str = first_key.as_ref();
            if first_key.starts_with('$') {
                return parse_operator_doc(field, sub_doc);
            }
        }
    }

    // Otherwise: implicit $eq
    Ok(Expression::Eq(field.to_string(), value.clone()))
}

/// Parse an operator sub-document like `{ "$gt": 21, "$lte": 100 }`.
fn parse_operator_doc(field: &str, doc: &Document) -> Result<Expression, FilterParseError> {
    let mut conditions: Vec<Expression> = Vec::new();

    for (op_key, op_value) in doc.iter() {
        let op_key: &str = op_key.as_ref();

        // $regex needs special handling (consumes $options sibling)
        if op_key == "$regex" {
            return parse_regex(field, doc);
        }

        let expr = match op_key {
            "$eq" => Expression::Eq(field.to_string(), op_value.clone()),
            "$ne" => Expression::Ne(field.to_string(), op_value.clone()),
            "$gt" => Expression::Gt(field.to_string(), op_value.clone()),
            "$gte" => Expression::Gte(field.to_string(), op_value.clone()),
            "$lt" => Expression::Lt(field.to_string(), op_value.clone()),
            "$lte" => Expression::Lte(field.to_string(), op_value.clone()),
            "$in" => match op_value {
                Bson::Array(items) => Expression::In(field.to_string(), items.clone()),
                _ => return Err(FilterParseError("$in value must be an array".into())),
            },
            "$exists" => match op_value {
                Bson::Boolean(b) => Expression::Exists(field.to_string(), *b),
                _ => return Err(FilterParseError("$exists value must be a boolean".into())),
            },
            "$options" => {
                return Err(FilterParseError("$options without $regex".into()));
            }
            k => return Err(FilterParseError(format!("unknown field operator: {k}"))),
        };
        conditions.push(expr);
    }

    match conditions.len() {
        0 => Err(FilterParseError("empty operator document".into())),
        1 => Ok(conditions.pop().unwrap()),
        _ => Ok(Expression::And(conditions)),
    }
}

/// Parse a `$regex` + optional `$options` sub-document.
fn parse_regex(field: &str, doc: &Document) -> Result<Expression, FilterParseError> {
    let mut pattern: Option<&str> = None;
    let mut options: Option<&str> = None;

    for (key, value) in doc.iter() {
        let key: &str = key.as_ref();
        match key {
            "$regex" => match value {
                Bson::String(s) => pattern = Some(s),
                _ => return Err(FilterParseError("$regex value must be a string".into())),
            },
            "$options" => match value {
                Bson::String(s) => options = Some(s),
                _ => return Err(FilterParseError("$options value must be a string".into())),
            },
            k => {
                return Err(FilterParseError(format!(
                    "unexpected key alongside $regex: {k}"
                )));
            }
        }
    }

    let pat = pattern.ok_or_else(|| FilterParseError("missing $regex pattern".into()))?;

    // Build final pattern with flags
    let full_pattern = if let Some(opts) = options {
        let mut prefix = String::with_capacity(4 + opts.len() + pat.len());
        prefix.push_str("(?");
        for ch in opts.chars() {
            match ch {
                'i' | 's' | 'm' | 'x' => prefix.push(ch),
                c => return Err(FilterParseError(format!("unknown regex option: {c}"))),
            }
        }
        prefix.push(')');
        prefix.push_str(pat);
        prefix
    } else {
        pat.to_string()
    };

    let re = Regex::new(&full_pattern)
        .map_err(|e| FilterParseError(format!("invalid regex pattern: {e}")))?;

    Ok(Expression::Regex(field.to_string(), re))
}
