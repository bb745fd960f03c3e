use bson::{Bson, Document};

use crate::expression::Expression;
use crate::parse_filter::{FilterParseError, parse_filter};

/// A compiled query predicate.
///
/// Wraps the parsed condition tree and applies it to whole documents or to
/// standalone values (array elements during `$elemMatch` projection).
#[derive(Debug, Clone)]
pub struct QueryFilter {
    conditions: Expression,
}

impl QueryFilter {
    pub fn new(spec: &Document) -> Result<Self, FilterParseError> {
        Ok(Self {
            conditions: parse_filter(spec)?,
        })
    }

    /// The parsed condition tree.
    pub fn conditions(&self) -> &Expression {
        &self.conditions
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.matches(doc)
    }

    pub fn matches_element(&self, value: &Bson) -> bool {
        self.conditions.matches_element(value)
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn compiled_filter_matches_documents() {
        let filter = QueryFilter::new(&doc! { "x": { "$gt": 1_i32 } }).unwrap();
        assert!(!filter.matches(&doc! { "x": 1_i32 }));
        assert!(filter.matches(&doc! { "x": 2_i32 }));
        assert!(!filter.matches(&doc! { "y": 2_i32 }));
    }

    #[test]
    fn compiled_filter_matches_elements() {
        let filter = QueryFilter::new(&doc! { "x": { "$gt": 1_i32 } }).unwrap();
        assert!(filter.matches_element(&doc! { "x": 2_i32 }.into()));
        assert!(!filter.matches_element(&bson::Bson::Int32(5)));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = QueryFilter::new(&doc! {}).unwrap();
        assert!(filter.matches(&doc! { "x": 1_i32 }));
        assert!(filter.matches(&doc! {}));
    }
}
