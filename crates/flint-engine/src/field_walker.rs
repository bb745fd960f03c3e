use std::collections::{HashMap, VecDeque};

use bson::{Bson, Document};

/// The values collected by one walk.
///
/// Two ordered sequences: `elements` holds scalar and document values (plus
/// array values that were flattened in as leaves), `arrays` holds array
/// values encountered as leaf values. The merged view — `elements` followed
/// by `arrays` — is the iteration order consumers see.
#[derive(Debug, Clone)]
pub struct FieldValues {
    pub elements: Vec<Bson>,
    pub arrays: Vec<Vec<Bson>>,
    iter_queue: VecDeque<Bson>,
    iter_times: usize,
}

impl FieldValues {
    pub fn new() -> Self {
        FieldValues {
            elements: Vec::new(),
            arrays: Vec::new(),
            iter_queue: VecDeque::new(),
            iter_times: 1,
        }
    }

    /// A snapshot of the merged view. Does not advance the consumption
    /// counter; use [`FieldValues::consume`] for counted iteration.
    pub fn merged(&self) -> Vec<Bson> {
        let mut out = self.elements.clone();
        out.extend(self.arrays.iter().cloned().map(Bson::Array));
        out
    }

    pub fn len(&self) -> usize {
        self.elements.len() + self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.arrays.is_empty()
    }

    /// Route a value into the bag: arrays into `arrays`, everything else
    /// into `elements`.
    pub fn append(&mut self, value: Bson) {
        match value {
            Bson::Array(items) => self.arrays.push(items),
            other => self.elements.push(other),
        }
    }

    /// Flatten one array level into `elements`.
    pub fn extend(&mut self, values: Vec<Bson>) {
        self.elements.extend(values);
    }

    /// Concatenate another bag's sequences onto this one.
    pub fn merge(&mut self, other: FieldValues) {
        self.elements.extend(other.elements);
        self.arrays.extend(other.arrays);
    }

    /// Project the `index`-th element out of each collected array, dropping
    /// arrays too short to have one. `elements` is replaced; `arrays` is
    /// emptied.
    pub fn positional(&mut self, index: usize) {
        self.elements = self
            .arrays
            .iter()
            .filter(|a| a.len() > index)
            .map(|a| a[index].clone())
            .collect();
        self.arrays.clear();
    }

    /// Yield the merged view once, counting each item taken. The count feeds
    /// the matched-index computation on scope exit.
    pub fn consume(&mut self) -> Consume<'_> {
        self.iter_times = 0;
        self.iter_queue = self.merged().into();
        Consume { bag: self }
    }
}

impl Default for FieldValues {
    fn default() -> Self {
        FieldValues::new()
    }
}

/// Counting iterator over a bag's merged view.
pub struct Consume<'a> {
    bag: &'a mut FieldValues,
}

impl Iterator for Consume<'_> {
    type Item = Bson;

    fn next(&mut self) -> Option<Bson> {
        let value = self.bag.iter_queue.pop_front()?;
        self.bag.iter_times += 1;
        Some(value)
    }
}

/// `true` when a path segment can address an array position.
pub(crate) fn is_index_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Parse an all-digit segment; out-of-range magnitudes read as `None` and
/// behave like an index past any array's end.
pub(crate) fn parse_index_segment(segment: &str) -> Option<usize> {
    if !is_index_segment(segment) {
        return None;
    }
    segment.parse().ok()
}

/// The value under the walker's feet mid-traversal.
enum Cursor<'d> {
    /// The root document being walked.
    Root(&'d Document),
    /// A value cloned out of the document.
    Value(Bson),
    /// Values gathered from sub-documents of an array.
    Bag(FieldValues),
    /// A gathered bag still keyed by the field that produced it.
    Keyed(String, FieldValues),
    /// A failed or empty lookup.
    Missing,
}

impl Cursor<'_> {
    fn is_array_like(&self) -> bool {
        matches!(self, Cursor::Value(Bson::Array(_)) | Cursor::Bag(_))
    }

    fn array_len(&self) -> usize {
        match self {
            Cursor::Value(Bson::Array(items)) => items.len(),
            Cursor::Bag(bag) => bag.len(),
            _ => 0,
        }
    }

    /// The iterable view of an array-like cursor (bags merge `elements`
    /// before `arrays`).
    fn items(&self) -> Vec<Bson> {
        match self {
            Cursor::Value(Bson::Array(items)) => items.clone(),
            Cursor::Bag(bag) => bag.merged(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupFailure {
    /// No such key in a document.
    MissingKey,
    /// Numeric index past an array's end.
    OutOfRange,
    /// The value cannot be descended into at all.
    NotIndexable,
}

fn lookup<'d>(
    cursor: Cursor<'d>,
    field: &str,
    by_index: bool,
) -> Result<Cursor<'d>, LookupFailure> {
    match cursor {
        Cursor::Root(doc) => doc
            .get(field)
            .cloned()
            .map(Cursor::Value)
            .ok_or(LookupFailure::MissingKey),
        Cursor::Value(Bson::Document(doc)) => doc
            .get(field)
            .cloned()
            .map(Cursor::Value)
            .ok_or(LookupFailure::MissingKey),
        Cursor::Value(Bson::Array(items)) if by_index => parse_index_segment(field)
            .and_then(|i| items.get(i).cloned())
            .map(Cursor::Value)
            .ok_or(LookupFailure::OutOfRange),
        Cursor::Value(_) => Err(LookupFailure::NotIndexable),
        Cursor::Bag(bag) if by_index => parse_index_segment(field)
            .and_then(|i| bag.elements.get(i).cloned())
            .map(Cursor::Value)
            .ok_or(LookupFailure::OutOfRange),
        Cursor::Bag(_) => Err(LookupFailure::NotIndexable),
        Cursor::Keyed(key, bag) => {
            if key == field {
                Ok(Cursor::Bag(bag))
            } else {
                Err(LookupFailure::MissingKey)
            }
        }
        Cursor::Missing => Err(LookupFailure::NotIndexable),
    }
}

/// Document traversal context.
///
/// Resolves dotted field paths against a document that may nest arrays of
/// sub-documents, collecting results into a [`FieldValues`] bag and raising
/// the diagnostic flags that let callers reproduce the server's null-query
/// semantics. One walker serves one document; it may walk many paths.
pub struct FieldWalker<'d> {
    doc: &'d Document,
    matched_indexes: HashMap<String, Option<usize>>,

    value: FieldValues,
    exists: bool,
    embedded_in_array: bool,
    index_posed: bool,
    been_in_array: bool,

    docs_field_missing_in_array: bool,
    array_field_not_exists_in_all_elements: bool,
    out_of_array_index: bool,
    no_docs_in_array: bool,

    elem_iter_map: Vec<(String, Vec<(usize, usize)>)>,
    query_path: String,
}

impl<'d> FieldWalker<'d> {
    pub fn new(doc: &'d Document) -> Self {
        FieldWalker {
            doc,
            matched_indexes: HashMap::new(),
            value: FieldValues::new(),
            exists: false,
            embedded_in_array: false,
            index_posed: false,
            been_in_array: false,
            docs_field_missing_in_array: false,
            array_field_not_exists_in_all_elements: false,
            out_of_array_index: false,
            no_docs_in_array: false,
            elem_iter_map: Vec::new(),
            query_path: String::new(),
        }
    }

    /// Walk through the document and collect the values at `path`.
    pub fn walk(&mut self, path: &str) -> &mut Self {
        self.reset();
        self.query_path = path.to_string();

        let mut cursor = Cursor::Root(self.doc);
        let mut index_lookup = false;

        'walking: for field in path.split('.') {
            index_lookup = false;
            let mut array_has_doc = false;
            let mut items: Vec<Bson> = Vec::new();

            if cursor.is_array_like() {
                if cursor.array_len() == 0 {
                    self.exists = false;
                    break 'walking;
                }

                self.been_in_array = true;
                items = cursor.items();
                array_has_doc = items.iter().any(|v| matches!(v, Bson::Document(_)));
                index_lookup = is_index_segment(field);

                if index_lookup {
                    if self.index_posed && self.embedded_in_array {
                        index_lookup = items.iter().any(|v| matches!(v, Bson::Array(_)));
                    }
                } else {
                    cursor = match self.walk_array(&items, field) {
                        Some((key, bag)) => Cursor::Keyed(key, bag),
                        None => Cursor::Missing,
                    };
                }
            }

            // Does the path end at an index position so far?
            self.index_posed = index_lookup;

            // An array of documents can hold numeric string keys, e.g.
            // [{"1": value}, ...], so an index segment is also tried as a
            // field name and the positional result merged into it.
            if index_lookup && array_has_doc {
                if let Some((key, mut bag)) = self.walk_array(&items, field) {
                    if let Some(index) = parse_index_segment(field) {
                        if cursor.array_len() > index {
                            match &cursor {
                                Cursor::Bag(source) => {
                                    let mut picked = source.clone();
                                    picked.positional(index);
                                    bag.merge(picked);
                                }
                                Cursor::Value(Bson::Array(source)) => {
                                    bag.append(source[index].clone());
                                }
                                _ => {}
                            }
                        }
                    }
                    cursor = Cursor::Keyed(key, bag);
                    index_lookup = false;
                }
            }

            if index_lookup && self.embedded_in_array {
                cursor = match cursor {
                    Cursor::Bag(mut bag) => {
                        bag.positional(parse_index_segment(field).unwrap_or(usize::MAX));
                        index_lookup = false;
                        Cursor::Keyed(field.to_string(), bag)
                    }
                    other => other,
                };
            }

            match lookup(cursor, field, index_lookup) {
                Ok(next) => {
                    cursor = next;
                    self.exists = true;
                }
                Err(failure) => {
                    self.out_of_array_index = failure == LookupFailure::OutOfRange;
                    if failure == LookupFailure::NotIndexable && self.been_in_array {
                        self.no_docs_in_array = !self.docs_field_missing_in_array;
                    }
                    cursor = Cursor::Missing;
                    self.reset_partial();
                    break 'walking;
                }
            }
        }

        // Collect: a terminal array-like value flattens one level into
        // `elements` before the value itself is routed into the bag.
        if !index_lookup {
            match &cursor {
                Cursor::Value(Bson::Array(items)) => self.value.extend(items.clone()),
                Cursor::Bag(bag) => self.value.elements.extend_from_slice(&bag.elements),
                _ => {}
            }
        }
        match cursor {
            Cursor::Value(value) => self.value.append(value),
            Cursor::Bag(bag) => self.value.arrays.extend(bag.arrays),
            Cursor::Missing => self.value.elements.push(Bson::Null),
            // Every iteration routes the cursor through lookup(), which
            // consumes Root on the first segment and unwraps Keyed to Bag.
            Cursor::Root(_) | Cursor::Keyed(..) => unreachable!(),
        }

        // The sub-document count mismatch raised in walk_array is a false
        // positive when every collected element resolved to a value.
        if !self.value.elements.iter().any(|v| matches!(v, Bson::Null))
            && !self.array_field_not_exists_in_all_elements
        {
            self.docs_field_missing_in_array = false;
        }

        self
    }

    /// Walk into an array's sub-documents for `field`, gathering each
    /// matching child bag and the per-element contribution counts the
    /// matched-index computation needs.
    fn walk_array(&mut self, items: &[Bson], field: &str) -> Option<(String, FieldValues)> {
        let mut field_values = FieldValues::new();
        let mut num_of_emb_doc = 0usize;
        self.map_entry_reset(field);

        for (i, item) in items.iter().enumerate() {
            let Bson::Document(emb_doc) = item else {
                continue;
            };
            num_of_emb_doc += 1;

            let mut emb_walker = FieldWalker::new(emb_doc);
            emb_walker.walk(field);
            if emb_walker.exists {
                self.map_entry_push(field, i, emb_walker.value.elements.len());
                field_values.merge(emb_walker.value);
            } else {
                self.array_field_not_exists_in_all_elements = true;
            }
        }

        if field_values.arrays.len() != num_of_emb_doc {
            // Comparing against the array count over-reports missing fields;
            // corrected after collection when no element came back null.
            self.docs_field_missing_in_array = true;
        }

        if field_values.is_empty() {
            None
        } else {
            self.embedded_in_array = true;
            Some((field.to_string(), field_values))
        }
    }

    fn map_entry_reset(&mut self, field: &str) {
        match self.elem_iter_map.iter_mut().find(|(k, _)| k == field) {
            Some(entry) => entry.1.clear(),
            None => self.elem_iter_map.push((field.to_string(), Vec::new())),
        }
    }

    fn map_entry_push(&mut self, field: &str, index: usize, count: usize) {
        if let Some(entry) = self.elem_iter_map.iter_mut().find(|(k, _)| k == field) {
            entry.1.push((index, count));
        }
    }

    /// Reset all walk state, flags included.
    pub fn reset(&mut self) {
        self.reset_partial();
        self.been_in_array = false;
        self.docs_field_missing_in_array = false;
        self.array_field_not_exists_in_all_elements = false;
        self.out_of_array_index = false;
        self.no_docs_in_array = false;
    }

    /// Reset the per-walk state but keep the null-query flags for callers
    /// that read diagnostics after the walk concluded.
    fn reset_partial(&mut self) {
        self.value = FieldValues::new();
        self.exists = false;
        self.embedded_in_array = false;
        self.index_posed = false;
        self.elem_iter_map.clear();
        self.query_path.clear();
    }

    /// Walk `path`, run `f`, then close the scope: the matched index for the
    /// path's root field is recorded and the per-walk state cleared.
    pub fn scoped<R>(&mut self, path: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        self.walk(path);
        let out = f(self);
        self.close_scope();
        out
    }

    /// Record `matched_indexes[root]` from the consumption counter and
    /// partially reset. Scopes are strictly LIFO.
    pub fn close_scope(&mut self) {
        let root = self
            .query_path
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string();
        let matched = self.compute_matched_index();
        self.matched_indexes.insert(root, matched);
        self.reset_partial();
    }

    /// Translate "how many merged items the consumer took" into the 0-based
    /// position, inside the outermost traversed array, of the sub-document
    /// that produced the last item taken.
    ///
    /// Entries are popped newest-first: each level converts a consumption
    /// count into an element position that becomes the count for the level
    /// above it.
    fn compute_matched_index(&mut self) -> Option<usize> {
        let mut times = self.value.iter_times;
        if self.elem_iter_map.is_empty() {
            return if self.value.elements.is_empty() {
                None
            } else {
                times.checked_sub(1)
            };
        }
        while let Some((_, entries)) = self.elem_iter_map.pop() {
            for (index, count) in entries {
                if times > count {
                    times -= count;
                } else {
                    times = index + 1;
                    break;
                }
            }
        }
        times.checked_sub(1)
    }

    // ── Introspection ───────────────────────────────────────────

    /// The collected value bag.
    pub fn value(&self) -> &FieldValues {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut FieldValues {
        &mut self.value
    }

    /// Did the final path segment resolve on at least one route?
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Did the walk descend through an array of sub-documents?
    pub fn embedded_in_array(&self) -> bool {
        self.embedded_in_array
    }

    /// Is the final path segment a numeric index?
    pub fn index_posed(&self) -> bool {
        self.index_posed
    }

    /// Some sub-document in an array lacked the field (possibly all of
    /// them).
    pub fn array_field_missing(&self) -> bool {
        self.docs_field_missing_in_array
    }

    /// The path failed without any field being missing: an index past an
    /// array's end, or an array holding no sub-documents at all. Documents
    /// in this state do not match a `{field: null}` query.
    pub fn array_status_normal(&self) -> bool {
        self.out_of_array_index || self.no_docs_in_array
    }

    /// The matched index recorded for the root field of `path` by the last
    /// closed scope that walked under it.
    pub fn matched_index(&self, path: &str) -> Option<usize> {
        let root = path.split('.').next().unwrap_or_default();
        self.matched_indexes.get(root).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn walk_new<'d>(doc: &'d Document, path: &str) -> FieldWalker<'d> {
        let mut walker = FieldWalker::new(doc);
        walker.walk(path);
        walker
    }

    #[test]
    fn scalar_field() {
        let doc = doc! { "a": 1_i32 };
        let walker = walk_new(&doc, "a");
        assert!(walker.exists());
        assert_eq!(walker.value().elements, vec![Bson::Int32(1)]);
        assert!(walker.value().arrays.is_empty());
    }

    #[test]
    fn nested_document_path() {
        let doc = doc! { "a": { "b": { "c": "deep" } } };
        let walker = walk_new(&doc, "a.b.c");
        assert!(walker.exists());
        assert_eq!(walker.value().elements, vec![Bson::String("deep".into())]);
    }

    #[test]
    fn missing_field_collects_null() {
        let doc = doc! { "a": 1_i32 };
        let walker = walk_new(&doc, "b");
        assert!(!walker.exists());
        assert_eq!(walker.value().elements, vec![Bson::Null]);
        assert!(!walker.array_status_normal());
    }

    #[test]
    fn scalar_mid_path_fails_quietly() {
        let doc = doc! { "a": 5_i32 };
        let walker = walk_new(&doc, "a.b");
        assert!(!walker.exists());
        assert_eq!(walker.value().elements, vec![Bson::Null]);
        assert!(!walker.array_status_normal());
    }

    #[test]
    fn leaf_array_flattens_and_keeps_whole() {
        let doc = doc! { "a": [1_i32, 2_i32] };
        let walker = walk_new(&doc, "a");
        assert!(walker.exists());
        assert_eq!(
            walker.value().elements,
            vec![Bson::Int32(1), Bson::Int32(2)]
        );
        assert_eq!(
            walker.value().arrays,
            vec![vec![Bson::Int32(1), Bson::Int32(2)]]
        );
    }

    #[test]
    fn index_segment_into_array() {
        let doc = doc! { "a": [10_i32, 20_i32] };
        let walker = walk_new(&doc, "a.0");
        assert!(walker.exists());
        assert!(walker.index_posed());
        assert_eq!(walker.value().elements, vec![Bson::Int32(10)]);
        assert!(walker.value().arrays.is_empty());
    }

    #[test]
    fn index_segment_selecting_inner_array() {
        let doc = doc! { "a": [[1_i32, 2_i32], [3_i32]] };
        let walker = walk_new(&doc, "a.0");
        assert!(walker.exists());
        // An indexed array is not flattened into elements.
        assert!(walker.value().elements.is_empty());
        assert_eq!(
            walker.value().arrays,
            vec![vec![Bson::Int32(1), Bson::Int32(2)]]
        );
    }

    #[test]
    fn array_of_documents_scalar_field() {
        let doc = doc! { "a": [ { "b": 1_i32 }, { "b": 2_i32 }, { "c": 3_i32 } ] };
        let walker = walk_new(&doc, "a.b");
        assert!(walker.exists());
        assert!(walker.embedded_in_array());
        assert_eq!(
            walker.value().elements,
            vec![Bson::Int32(1), Bson::Int32(2)]
        );
        // One sub-document misses `b`: missing stays raised, and so does the
        // per-element non-existence marker.
        assert!(walker.array_field_missing());
        assert!(walker.array_field_not_exists_in_all_elements);
    }

    #[test]
    fn array_of_documents_field_everywhere() {
        let doc = doc! { "a": [ { "b": 1_i32 }, { "b": 2_i32 }, { "b": 3_i32 } ] };
        let walker = walk_new(&doc, "a.b");
        assert!(walker.exists());
        assert_eq!(
            walker.value().elements,
            vec![Bson::Int32(1), Bson::Int32(2), Bson::Int32(3)]
        );
        // The count mismatch is corrected once every element resolved.
        assert!(!walker.array_field_missing());
        assert!(!walker.array_field_not_exists_in_all_elements);
    }

    #[test]
    fn numeric_key_merges_index_and_field_results() {
        let doc = doc! { "a": [ { "1": "x" }, { "1": "y" } ] };
        let walker = walk_new(&doc, "a.1");
        assert!(walker.exists());
        let elements = &walker.value().elements;
        assert!(elements.contains(&Bson::String("x".into())));
        assert!(elements.contains(&Bson::String("y".into())));
        // The index-1 element itself rides along as a document value.
        assert!(elements.contains(&Bson::Document(doc! { "1": "y" })));
        assert_eq!(elements.len(), 3);
    }

    #[test]
    fn out_of_range_index() {
        let doc = doc! { "a": [10_i32, 20_i32] };
        let walker = walk_new(&doc, "a.5");
        assert!(!walker.exists());
        assert!(walker.out_of_array_index);
        assert!(walker.array_status_normal());
        assert_eq!(walker.value().elements, vec![Bson::Null]);
    }

    #[test]
    fn array_without_documents() {
        let doc = doc! { "a": [1_i32, 2_i32] };
        let walker = walk_new(&doc, "a.b");
        assert!(!walker.exists());
        assert!(walker.no_docs_in_array);
        assert!(walker.array_status_normal());
        assert!(!walker.array_field_missing());
    }

    #[test]
    fn empty_array_stops_the_walk() {
        let doc = doc! { "a": [] };
        let walker = walk_new(&doc, "a.b");
        assert!(!walker.exists());
        assert!(walker.value().elements.is_empty());
        assert_eq!(walker.value().arrays, vec![Vec::<Bson>::new()]);
    }

    #[test]
    fn embedded_arrays_with_index_segment() {
        let doc = doc! { "a": [ { "b": [1_i32, 2_i32] }, { "b": [3_i32, 4_i32] } ] };
        let walker = walk_new(&doc, "a.b.1");
        assert!(walker.exists());
        assert_eq!(
            walker.value().elements,
            vec![Bson::Int32(2), Bson::Int32(4)]
        );
        assert!(walker.value().arrays.is_empty());
    }

    #[test]
    fn embedded_array_leaves() {
        let doc = doc! { "a": [ { "b": [1_i32, 2_i32] }, { "b": [3_i32] } ] };
        let walker = walk_new(&doc, "a.b");
        assert!(walker.exists());
        assert_eq!(
            walker.value().elements,
            vec![Bson::Int32(1), Bson::Int32(2), Bson::Int32(3)]
        );
        assert_eq!(
            walker.value().arrays,
            vec![
                vec![Bson::Int32(1), Bson::Int32(2)],
                vec![Bson::Int32(3)]
            ]
        );
        assert!(!walker.array_field_missing());
    }

    #[test]
    fn matched_index_for_direct_array() {
        let doc = doc! { "a": [1_i32, 2_i32, 3_i32] };
        let mut walker = FieldWalker::new(&doc);
        walker.scoped("a", |w| {
            for value in w.value_mut().consume() {
                if value == Bson::Int32(2) {
                    break;
                }
            }
        });
        assert_eq!(walker.matched_index("a"), Some(1));
    }

    #[test]
    fn matched_index_through_sub_documents() {
        let doc = doc! { "a": [ { "b": 1_i32 }, { "b": 2_i32 } ] };
        let mut walker = FieldWalker::new(&doc);
        walker.scoped("a.b", |w| {
            for value in w.value_mut().consume() {
                if value == Bson::Int32(2) {
                    break;
                }
            }
        });
        assert_eq!(walker.matched_index("a.b"), Some(1));
    }

    #[test]
    fn matched_index_through_two_array_levels() {
        let doc = doc! {
            "a": [
                { "b": [ { "c": 1_i32 } ] },
                { "b": [ { "c": 2_i32 }, { "c": 3_i32 } ] }
            ]
        };
        let mut walker = FieldWalker::new(&doc);
        walker.scoped("a.b.c", |w| {
            for value in w.value_mut().consume() {
                if value == Bson::Int32(3) {
                    break;
                }
            }
        });
        assert_eq!(walker.matched_index("a.b.c"), Some(1));
    }

    #[test]
    fn matched_index_none_when_nothing_collected() {
        let doc = doc! { "a": [[1_i32, 2_i32]] };
        let mut walker = FieldWalker::new(&doc);
        // Indexing leaves only `arrays` populated; the bag has no elements
        // and no array map, so no index can be recorded.
        walker.scoped("a.0", |w| {
            for _ in w.value_mut().consume() {}
        });
        assert_eq!(walker.matched_index("a.0"), None);
    }

    #[test]
    fn flags_survive_scope_exit() {
        let doc = doc! { "a": [10_i32, 20_i32] };
        let mut walker = FieldWalker::new(&doc);
        walker.scoped("a.5", |_| {});
        assert!(walker.array_status_normal());
        assert!(walker.out_of_array_index);
        // The next walk starts clean.
        walker.walk("a");
        assert!(!walker.array_status_normal());
    }

    #[test]
    fn positional_projection_is_deterministic() {
        let doc = doc! { "a": [ { "b": [1_i32, 2_i32] }, { "b": [3_i32] } ] };
        let mut first = walk_new(&doc, "a.b");
        let mut second = walk_new(&doc, "a.b");
        first.value_mut().positional(1);
        second.value_mut().positional(1);
        assert_eq!(first.value().elements, vec![Bson::Int32(2)]);
        assert_eq!(first.value().elements, second.value().elements);
        assert!(first.value().arrays.is_empty());
    }

    #[test]
    fn merged_view_orders_elements_before_arrays() {
        let doc = doc! { "a": [1_i32, 2_i32] };
        let walker = walk_new(&doc, "a");
        let merged = walker.value().merged();
        assert_eq!(
            merged,
            vec![
                Bson::Int32(1),
                Bson::Int32(2),
                Bson::Array(vec![Bson::Int32(1), Bson::Int32(2)]),
            ]
        );
    }

    #[test]
    fn walker_reuse_across_paths() {
        let doc = doc! { "a": { "b": 1_i32 }, "c": 2_i32 };
        let mut walker = FieldWalker::new(&doc);
        walker.walk("a.b");
        assert_eq!(walker.value().elements, vec![Bson::Int32(1)]);
        walker.walk("c");
        assert_eq!(walker.value().elements, vec![Bson::Int32(2)]);
        walker.walk("missing");
        assert!(!walker.exists());
    }
}
