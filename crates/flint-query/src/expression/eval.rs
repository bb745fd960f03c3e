use std::cmp::Ordering;

use bson::{Bson, Document};

use super::Expression;

/// Root of a path resolution: a whole document, or a standalone value
/// (an array element handed to `$elemMatch`, for instance).
#[derive(Clone, Copy)]
pub(crate) enum Target<'a> {
    Doc(&'a Document),
    Value(&'a Bson),
}

/// Evaluate an expression against a target.
pub(crate) fn matches(expr: &Expression, target: Target<'_>) -> bool {
    match expr {
        Expression::And(children) => children.iter().all(|c| matches(c, target)),
        Expression::Or(children) => children.iter().any(|c| matches(c, target)),
        Expression::Eq(path, operand) => eq_matches(&resolve(target, path), operand),
        Expression::Ne(path, operand) => !eq_matches(&resolve(target, path), operand),
        Expression::Gt(..) | Expression::Gte(..) | Expression::Lt(..) | Expression::Lte(..) => {
            let (path, operand, accept) = ordering_parts(expr);
            resolve(target, path)
                .into_iter()
                .any(|c| cmp_matches(c, operand, accept))
        }
        Expression::In(path, operands) => {
            let candidates = resolve(target, path);
            operands.iter().any(|op| eq_matches(&candidates, op))
        }
        Expression::Regex(path, re) => resolve(target, path)
            .into_iter()
            .any(|c| regex_matches(c, re)),
        Expression::Exists(path, expected) => {
            // $exists checks physical presence — a null value still counts
            *expected == !resolve(target, path).is_empty()
        }
    }
}

/// Evaluate leaf operators against a value that was already resolved by the
/// caller's own traversal.
pub(crate) fn matches_resolved(expr: &Expression, value: &Bson) -> bool {
    match expr {
        Expression::And(children) => children.iter().all(|c| matches_resolved(c, value)),
        Expression::Or(children) => children.iter().any(|c| matches_resolved(c, value)),
        Expression::Eq(_, operand) => value_or_elements_eq(value, operand),
        Expression::Ne(_, operand) => !value_or_elements_eq(value, operand),
        Expression::Gt(..) | Expression::Gte(..) | Expression::Lt(..) | Expression::Lte(..) => {
            let (_, operand, accept) = ordering_parts(expr);
            cmp_matches(value, operand, accept)
        }
        Expression::In(_, operands) => operands.iter().any(|op| value_or_elements_eq(value, op)),
        Expression::Regex(_, re) => regex_matches(value, re),
        Expression::Exists(_, expected) => *expected,
    }
}

fn ordering_parts(expr: &Expression) -> (&str, &Bson, fn(Ordering) -> bool) {
    match expr {
        Expression::Gt(path, operand) => (path, operand, |o| o == Ordering::Greater),
        Expression::Gte(path, operand) => (path, operand, |o| o != Ordering::Less),
        Expression::Lt(path, operand) => (path, operand, |o| o == Ordering::Less),
        Expression::Lte(path, operand) => (path, operand, |o| o != Ordering::Greater),
        _ => unreachable!("not an ordering operator"),
    }
}

// ── Path resolution ─────────────────────────────────────────────

/// Every value present at `path` inside the target.
///
/// Documents descend by key, arrays of sub-documents fan out (one candidate
/// per sub-document carrying the field), and an all-digit segment addresses
/// an array element in addition to any sub-document field literally named
/// by the digits.
fn resolve<'a>(target: Target<'a>, path: &str) -> Vec<&'a Bson> {
    let mut segments = path.split('.');
    let first = match segments.next() {
        Some(s) => s,
        None => return Vec::new(),
    };

    let mut candidates = match target {
        Target::Doc(doc) => doc.get(first).map(|v| vec![v]).unwrap_or_default(),
        Target::Value(value) => step(value, first),
    };

    for segment in segments {
        if candidates.is_empty() {
            break;
        }
        candidates = candidates.iter().flat_map(|c| step(c, segment)).collect();
    }
    candidates
}

fn step<'a>(value: &'a Bson, segment: &str) -> Vec<&'a Bson> {
    match value {
        Bson::Document(doc) => doc.get(segment).map(|v| vec![v]).unwrap_or_default(),
        Bson::Array(items) => {
            let mut found = Vec::new();
            if let Some(index) = parse_index(segment) {
                if let Some(elem) = items.get(index) {
                    found.push(elem);
                }
            }
            for elem in items {
                if let Bson::Document(doc) = elem {
                    if let Some(v) = doc.get(segment) {
                        found.push(v);
                    }
                }
            }
            found
        }
        _ => Vec::new(),
    }
}

fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

// ── Leaf semantics ──────────────────────────────────────────────

/// `$eq` over a candidate set. A null operand also matches a missing field.
fn eq_matches(candidates: &[&Bson], operand: &Bson) -> bool {
    if matches!(operand, Bson::Null) && candidates.is_empty() {
        return true;
    }
    candidates.iter().any(|&c| value_or_elements_eq(c, operand))
}

/// Equality against the value itself or, for array fields, any element.
fn value_or_elements_eq(value: &Bson, operand: &Bson) -> bool {
    if value_eq(value, operand) {
        return true;
    }
    match value {
        Bson::Array(items) => items.iter().any(|e| value_eq(e, operand)),
        _ => false,
    }
}

fn cmp_matches(value: &Bson, operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
    if let Some(ordering) = value_cmp(value, operand) {
        if accept(ordering) {
            return true;
        }
    }
    match value {
        Bson::Array(items) => items
            .iter()
            .any(|e| value_cmp(e, operand).is_some_and(accept)),
        _ => false,
    }
}

fn regex_matches(value: &Bson, re: &regex::Regex) -> bool {
    match value {
        Bson::String(s) => re.is_match(s),
        Bson::Array(items) => items
            .iter()
            .any(|e| matches!(e, Bson::String(s) if re.is_match(s))),
        _ => false,
    }
}

/// Equality with numeric cross-type comparison (i32/i64/f64); everything
/// else falls back to structural equality.
fn value_eq(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Int32(x), Bson::Int64(y)) => i64::from(*x) == *y,
        (Bson::Int64(x), Bson::Int32(y)) => *x == i64::from(*y),
        (Bson::Int32(x), Bson::Double(y)) => f64::from(*x) == *y,
        (Bson::Double(x), Bson::Int32(y)) => *x == f64::from(*y),
        (Bson::Int64(x), Bson::Double(y)) => (*x as f64) == *y,
        (Bson::Double(x), Bson::Int64(y)) => *x == (*y as f64),
        _ => a == b,
    }
}

/// Ordering for comparable pairs; incompatible types are silently excluded.
fn value_cmp(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => Some(x.cmp(y)),
        (Bson::Int64(x), Bson::Int64(y)) => Some(x.cmp(y)),
        (Bson::Int32(x), Bson::Int64(y)) => Some(i64::from(*x).cmp(y)),
        (Bson::Int64(x), Bson::Int32(y)) => Some(x.cmp(&i64::from(*y))),
        (Bson::Double(x), Bson::Double(y)) => x.partial_cmp(y),
        (Bson::Int32(x), Bson::Double(y)) => f64::from(*x).partial_cmp(y),
        (Bson::Double(x), Bson::Int32(y)) => x.partial_cmp(&f64::from(*y)),
        (Bson::Int64(x), Bson::Double(y)) => (*x as f64).partial_cmp(y),
        (Bson::Double(x), Bson::Int64(y)) => x.partial_cmp(&(*y as f64)),
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            Some(x.timestamp_millis().cmp(&y.timestamp_millis()))
        }
        _ => None,
    }
}
