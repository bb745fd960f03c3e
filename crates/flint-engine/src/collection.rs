use bson::{Bson, Document};
use flint_query::QueryFilter;

use crate::error::OperationFailure;
use crate::project::Projector;

/// A minimal in-memory collection: enough surface to run a filter and a
/// projection over locally held documents.
#[derive(Debug, Default)]
pub struct Collection {
    docs: Vec<Document>,
    next_id: i64,
}

impl Collection {
    pub fn new() -> Self {
        Collection::default()
    }

    /// Insert documents in order, assigning an integer `_id` to any that
    /// lack one.
    pub fn insert_many(&mut self, docs: impl IntoIterator<Item = Document>) {
        for mut doc in docs {
            if !doc.contains_key("_id") {
                doc.insert("_id", Bson::Int64(self.next_id));
            }
            self.next_id += 1;
            self.docs.push(doc);
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Filter the collection and reshape each match with the projection, if
    /// one is given.
    pub fn find(
        &self,
        filter: &Document,
        projection: Option<&Document>,
    ) -> Result<Vec<Document>, OperationFailure> {
        let query = QueryFilter::new(filter)?;
        let projector = match projection {
            Some(spec) => Some(Projector::new(spec, &query)?),
            None => None,
        };

        let mut results = Vec::new();
        for doc in &self.docs {
            if !query.matches(doc) {
                continue;
            }
            let mut doc = doc.clone();
            if let Some(projector) = &projector {
                projector.apply(&mut doc)?;
            }
            results.push(doc);
        }
        Ok(results)
    }
}
