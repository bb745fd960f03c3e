use bson::Document;
use flint_engine::{Collection, OperationFailure};

pub fn seeded(docs: impl IntoIterator<Item = Document>) -> Collection {
    let mut col = Collection::new();
    col.insert_many(docs);
    col
}

pub fn insert_and_find(
    docs: impl IntoIterator<Item = Document>,
    filter: Document,
) -> Result<Vec<Document>, OperationFailure> {
    seeded(docs).find(&filter, None)
}

pub fn insert_and_project(
    docs: impl IntoIterator<Item = Document>,
    filter: Document,
    projection: Document,
) -> Result<Vec<Document>, OperationFailure> {
    seeded(docs).find(&filter, Some(&projection))
}
