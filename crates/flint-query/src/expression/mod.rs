mod eval;

use bson::{Bson, Document};
use regex::Regex;

/// A recursive filter expression tree.
///
/// Owns field paths and operand values so the expression can outlive the
/// filter document it was parsed from. Leaf nodes carry a dotted field path
/// (`"address.city"`, `"items.0.sku"`); logical nodes carry children.
#[derive(Debug, Clone)]
pub enum Expression {
    // Logical
    And(Vec<Expression>),
    Or(Vec<Expression>),
    // Comparison — field path + operand, owned
    Eq(String, Bson),
    Ne(String, Bson),
    Gt(String, Bson),
    Gte(String, Bson),
    Lt(String, Bson),
    Lte(String, Bson),
    // Membership
    In(String, Vec<Bson>),
    // Pattern — regex is compiled, not borrowed
    Regex(String, Regex),
    // Existence
    Exists(String, bool),
}

impl Expression {
    /// Returns `true` if the document satisfies this expression.
    pub fn matches(&self, doc: &Document) -> bool {
        eval::matches(self, eval::Target::Doc(doc))
    }

    /// Returns `true` if a standalone value satisfies this expression,
    /// resolving field paths into the value when it is a document.
    ///
    /// Non-document values have no fields, so field conditions behave as
    /// they do for a missing field (`$eq null` matches, `$exists` is false).
    pub fn matches_element(&self, value: &Bson) -> bool {
        eval::matches(self, eval::Target::Value(value))
    }

    /// Apply leaf operators directly to an already-resolved value, skipping
    /// path resolution. Logical nodes recurse; an `Exists` leaf reports its
    /// expectation against a value that is, by construction, present.
    pub fn matches_value(&self, value: &Bson) -> bool {
        eval::matches_resolved(self, value)
    }

    /// Every leaf field path in the tree, in tree order.
    pub fn field_paths(&self) -> Vec<&str> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expression::And(children) | Expression::Or(children) => {
                for child in children {
                    child.collect_paths(out);
                }
            }
            Expression::Eq(path, _)
            | Expression::Ne(path, _)
            | Expression::Gt(path, _)
            | Expression::Gte(path, _)
            | Expression::Lt(path, _)
            | Expression::Lte(path, _)
            | Expression::In(path, _)
            | Expression::Regex(path, _)
            | Expression::Exists(path, _) => out.push(path),
        }
    }
}
