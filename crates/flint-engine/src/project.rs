use bson::{Bson, Document};
use flint_query::{Expression, QueryFilter};

use crate::error::OperationFailure;
use crate::field_walker::{FieldWalker, parse_index_segment};

/// Which array-shaping operator the projection has committed to; positional
/// `$` and `$elemMatch` are mutually exclusive and positional is single-use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayOpKind {
    Normal,
    Positional,
    ElemMatch,
}

#[derive(Debug, Clone, Copy)]
enum SliceArg {
    /// `$slice: n` — first n elements, or last n when negative.
    First(i64),
    /// `$slice: [skip, limit]` — skip may count from the end when negative.
    SkipLimit(i64, i64),
}

/// A query condition that nominates the element the positional operator
/// extracts: the first leaf of the query rooted at the projected field.
#[derive(Debug, Clone)]
struct PositionalPredicate {
    path: String,
    condition: Expression,
}

#[derive(Debug, Clone)]
enum ArrayOp {
    Slice(SliceArg),
    ElemMatch(QueryFilter),
    Positional(Option<PositionalPredicate>),
}

/// A compiled projection.
///
/// Validates the projection spec against the query at construction, then
/// rewrites documents in place: `_id` handling, array-shaping operators in
/// spec order, and a final inclusion or exclusion pass.
#[derive(Debug, Clone)]
pub struct Projector {
    proj_with_id: bool,
    include: bool,
    regular_field: Vec<String>,
    array_field: Vec<(String, ArrayOp)>,
}

impl Projector {
    pub fn new(spec: &Document, query: &QueryFilter) -> Result<Self, OperationFailure> {
        let mut proj_with_id = true;
        let mut include_flag: Option<bool> = None;
        let mut regular_field: Vec<String> = Vec::new();
        let mut array_field: Vec<(String, ArrayOp)> = Vec::new();
        let mut op_kind = ArrayOpKind::Normal;

        for (key, value) in spec.iter() {
            let key: &str = key.as_ref();

            if let Bson::Document(options) = value {
                if options.len() != 1 {
                    return Err(OperationFailure(format!(
                        ">1 field in obj: {}",
                        perr_doc(options)
                    )));
                }
                let (sub_key, sub_value) = options.iter().next().unwrap();
                let sub_key: &str = sub_key.as_ref();

                match sub_key {
                    "$slice" => {
                        let arg = parse_slice(sub_value)?;
                        set_array_field(&mut array_field, key, ArrayOp::Slice(arg));
                    }
                    "$elemMatch" => {
                        let Bson::Document(predicate) = sub_value else {
                            return Err(OperationFailure(
                                "elemMatch: Invalid argument, object required.".into(),
                            ));
                        };
                        if op_kind == ArrayOpKind::Positional {
                            return Err(OperationFailure(
                                "Cannot specify positional operator and $elemMatch.".into(),
                            ));
                        }
                        if key.contains('.') {
                            return Err(OperationFailure(
                                "Cannot use $elemMatch projection on a nested field.".into(),
                            ));
                        }
                        op_kind = ArrayOpKind::ElemMatch;
                        let filter = QueryFilter::new(predicate)?;
                        set_array_field(&mut array_field, key, ArrayOp::ElemMatch(filter));
                    }
                    "$meta" => {
                        return Err(OperationFailure(
                            "$meta projection is not supported".into(),
                        ));
                    }
                    _ => {
                        return Err(OperationFailure(format!(
                            "Unsupported projection option: {key}: {}",
                            perr_doc(options)
                        )));
                    }
                }
            } else if key == "_id" && !is_include(value) {
                proj_with_id = false;
            } else {
                // Normal field options, include or exclude.
                let flag = is_include(value);
                match include_flag {
                    None => include_flag = Some(flag),
                    Some(current) if current != flag => {
                        return Err(OperationFailure(
                            "Projection cannot have a mix of inclusion and exclusion.".into(),
                        ));
                    }
                    _ => {}
                }
                regular_field.push(key.to_string());
            }

            // Is positional ?
            const BAD_OPS: [&str; 3] = [".$ref", ".$id", ".$db"];
            if key.contains(".$") && !BAD_OPS.iter().any(|op| key.contains(op)) {
                if !is_include(value) {
                    return Err(OperationFailure(
                        "Cannot exclude array elements with the positional operator.".into(),
                    ));
                }
                if op_kind == ArrayOpKind::Positional {
                    return Err(OperationFailure(
                        "Cannot specify more than one positional proj. per query.".into(),
                    ));
                }
                if op_kind == ArrayOpKind::ElemMatch {
                    return Err(OperationFailure(
                        "Cannot specify positional operator and $elemMatch.".into(),
                    ));
                }
                let (fore, rest) = key.split_once(".$").unwrap();
                if rest.contains(".$") {
                    return Err(OperationFailure(format!(
                        "Positional projection '{key}' contains the positional operator \
                         more than once."
                    )));
                }
                let root = key.split('.').next().unwrap_or_default();
                let conditions = query.conditions();
                if !is_positional_match(conditions, root) {
                    return Err(OperationFailure(format!(
                        "Positional projection '{key}' does not match the query document."
                    )));
                }

                op_kind = ArrayOpKind::Positional;
                let field_path = match key.strip_suffix(".$") {
                    Some(path) => path.to_string(),
                    None => format!("{fore}.$"),
                };
                let predicate = positional_predicate(conditions, root);
                set_array_field(
                    &mut array_field,
                    &field_path,
                    ArrayOp::Positional(predicate),
                );
            }
        }

        Ok(Projector {
            proj_with_id,
            include: include_flag.unwrap_or(false),
            regular_field,
            array_field,
        })
    }

    /// Rewrite `doc` in place.
    pub fn apply(&self, doc: &mut Document) -> Result<(), OperationFailure> {
        if !self.proj_with_id {
            doc.remove("_id");
        }

        for (path, op) in &self.array_field {
            match op {
                ArrayOp::Slice(arg) => apply_slice(doc, path, *arg)?,
                ArrayOp::ElemMatch(filter) => self.apply_elem_match(doc, path, filter)?,
                ArrayOp::Positional(predicate) => {
                    self.apply_positional(doc, path, predicate.as_ref())?
                }
            }
        }

        if self.include {
            let mut include_field = self.regular_field.clone();
            include_field.extend(self.array_field.iter().map(|(path, _)| path.clone()));
            self.inclusion(doc, &include_field, "")
        } else {
            self.exclusion(doc, &self.regular_field)
        }
    }

    // ── $elemMatch ──────────────────────────────────────────────

    fn apply_elem_match(
        &self,
        doc: &mut Document,
        path: &str,
        filter: &QueryFilter,
    ) -> Result<(), OperationFailure> {
        let first_match = match doc.get(path) {
            Some(Bson::Array(items)) => items
                .iter()
                .find(|item| filter.matches_element(item))
                .cloned(),
            _ => None,
        };
        match first_match {
            Some(matched) => {
                doc.insert(path, Bson::Array(vec![matched]));
            }
            None => {
                doc.remove(path);
            }
        }

        // $elemMatch is an inclusion even when no other field forced
        // include mode; everything else gets stripped.
        if !self.include {
            self.inclusion(doc, &[path.to_string()], "")?;
        }
        Ok(())
    }

    // ── Positional $ ────────────────────────────────────────────

    fn apply_positional(
        &self,
        doc: &mut Document,
        path: &str,
        predicate: Option<&PositionalPredicate>,
    ) -> Result<(), OperationFailure> {
        if let Some((fore, key)) = path.rsplit_once('.') {
            let found = FieldWalker::new(doc).walk(fore).exists();
            if found {
                for_each_doc_at(doc, fore, &mut |emb_doc| {
                    match emb_doc.get(key) {
                        Some(Bson::Array(items)) => {
                            if items.is_empty() {
                                return Err(positional_empty_error(path));
                            }
                            let first = items[0].clone();
                            emb_doc.insert(key, Bson::Array(vec![first]));
                        }
                        Some(_) => {
                            emb_doc.remove(key);
                        }
                        None => {}
                    }
                    Ok(())
                })?;
            }
        } else {
            match doc.get(path).cloned() {
                Some(Bson::Array(items)) => {
                    if items.is_empty() {
                        return Err(positional_empty_error(path));
                    }
                    let matched = predicate.and_then(|p| matched_element_index(doc, p));
                    let index = matched.filter(|&i| i < items.len()).unwrap_or(0);
                    doc.insert(path, Bson::Array(vec![items[index].clone()]));
                }
                Some(_) => {
                    doc.remove(path);
                }
                None => {}
            }
        }
        Ok(())
    }

    // ── Inclusion / exclusion passes ────────────────────────────

    fn inclusion(
        &self,
        doc: &mut Document,
        include_field: &[String],
        fore_path: &str,
    ) -> Result<(), OperationFailure> {
        let mut key_list: Vec<String> = Vec::new();
        if fore_path.is_empty() {
            key_list = doc.keys().map(|k| k.to_string()).collect();
        } else {
            let parent = &fore_path[..fore_path.len() - 1];
            let mut walker = FieldWalker::new(doc);
            walker.walk(parent);
            for value in walker.value().merged() {
                if let Bson::Document(sub_doc) = value {
                    for key in sub_doc.keys() {
                        let key = key.to_string();
                        if !key_list.contains(&key) {
                            key_list.push(key);
                        }
                    }
                }
            }
        }
        key_list.retain(|k| k != "_id");

        for key in key_list {
            let current_path = format!("{fore_path}{key}");

            if include_field.iter().any(|f| f == &current_path) {
                // Included as-is; no recursion below it.
                continue;
            }

            let descend = include_field.iter().any(|f| {
                f.starts_with(&current_path) && f.as_bytes().get(current_path.len()) == Some(&b'.')
            });

            if descend {
                self.inclusion(doc, include_field, &format!("{current_path}."))?;
            } else if fore_path.is_empty() {
                doc.remove(&key);
            } else {
                let parent = &fore_path[..fore_path.len() - 1];
                for_each_doc_at(doc, parent, &mut |emb_doc| {
                    emb_doc.remove(&key);
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    fn exclusion(
        &self,
        doc: &mut Document,
        exclude_field: &[String],
    ) -> Result<(), OperationFailure> {
        for field_path in exclude_field {
            if let Some((fore, key)) = field_path.rsplit_once('.') {
                for_each_doc_at(doc, fore, &mut |emb_doc| {
                    emb_doc.remove(key);
                    Ok(())
                })?;
            } else {
                doc.remove(field_path);
            }
        }
        Ok(())
    }
}

// ── $slice ──────────────────────────────────────────────────────

fn parse_slice(value: &Bson) -> Result<SliceArg, OperationFailure> {
    match value {
        Bson::Int32(n) => Ok(SliceArg::First(i64::from(*n))),
        Bson::Int64(n) => Ok(SliceArg::First(*n)),
        Bson::Array(items) => {
            if items.len() != 2 {
                return Err(OperationFailure("$slice array wrong size".into()));
            }
            let (skip, limit) = match (&items[0], &items[1]) {
                (Bson::Int32(s), Bson::Int32(l)) => (i64::from(*s), i64::from(*l)),
                (Bson::Int32(s), Bson::Int64(l)) => (i64::from(*s), *l),
                (Bson::Int64(s), Bson::Int32(l)) => (*s, i64::from(*l)),
                (Bson::Int64(s), Bson::Int64(l)) => (*s, *l),
                _ => {
                    return Err(OperationFailure(
                        "$slice only supports numbers and [skip, limit] arrays".into(),
                    ));
                }
            };
            if limit <= 0 {
                return Err(OperationFailure("$slice limit must be positive".into()));
            }
            Ok(SliceArg::SkipLimit(skip, limit))
        }
        _ => Err(OperationFailure(
            "$slice only supports numbers and [skip, limit] arrays".into(),
        )),
    }
}

fn apply_slice(doc: &mut Document, path: &str, arg: SliceArg) -> Result<(), OperationFailure> {
    if let Some((fore, key)) = path.rsplit_once('.') {
        for_each_doc_at(doc, fore, &mut |emb_doc| {
            if let Some(Bson::Array(items)) = emb_doc.get_mut(key) {
                *items = slice_array(std::mem::take(items), arg);
            }
            Ok(())
        })
    } else {
        if let Some(Bson::Array(items)) = doc.get_mut(path) {
            *items = slice_array(std::mem::take(items), arg);
        }
        Ok(())
    }
}

fn slice_array(items: Vec<Bson>, arg: SliceArg) -> Vec<Bson> {
    match arg {
        SliceArg::First(n) if n >= 0 => items.into_iter().take(n as usize).collect(),
        SliceArg::First(n) => {
            let keep = n.unsigned_abs() as usize;
            let skip = items.len().saturating_sub(keep);
            items.into_iter().skip(skip).collect()
        }
        SliceArg::SkipLimit(skip, limit) => {
            let start = if skip < 0 {
                items.len().saturating_sub(skip.unsigned_abs() as usize)
            } else {
                (skip as usize).min(items.len())
            };
            items.into_iter().skip(start).take(limit as usize).collect()
        }
    }
}

// ── Shared pieces ───────────────────────────────────────────────

/// `[]` and `""` count as inclusion; numeric zero, `false`, and null do
/// not.
fn is_include(value: &Bson) -> bool {
    match value {
        Bson::Array(_) | Bson::String(_) => true,
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(d) => *d != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

/// Does any leaf condition's first path segment name `root_field`?
fn is_positional_match(conditions: &Expression, root_field: &str) -> bool {
    conditions
        .field_paths()
        .iter()
        .any(|path| path.split('.').next() == Some(root_field))
}

/// The first leaf condition rooted at `root_field`, kept for driving the
/// matched-index scan at apply time.
fn positional_predicate(conditions: &Expression, root_field: &str) -> Option<PositionalPredicate> {
    match conditions {
        Expression::And(children) | Expression::Or(children) => children
            .iter()
            .find_map(|child| positional_predicate(child, root_field)),
        leaf => {
            let path = *leaf.field_paths().first()?;
            if path.split('.').next() == Some(root_field) {
                Some(PositionalPredicate {
                    path: path.to_string(),
                    condition: leaf.clone(),
                })
            } else {
                None
            }
        }
    }
}

/// Walk the nominating condition's path and advance the bag until the
/// condition fires; the scope close converts the consumption count into the
/// element's position inside the root array.
fn matched_element_index(doc: &Document, predicate: &PositionalPredicate) -> Option<usize> {
    let mut walker = FieldWalker::new(doc);
    walker.walk(&predicate.path);
    if !walker.exists() {
        walker.close_scope();
        return None;
    }
    let mut matched = false;
    for candidate in walker.value_mut().consume() {
        if predicate.condition.matches_value(&candidate) {
            matched = true;
            break;
        }
    }
    walker.close_scope();
    if matched {
        walker.matched_index(&predicate.path)
    } else {
        None
    }
}

fn positional_empty_error(path: &str) -> OperationFailure {
    OperationFailure(format!(
        "Executor error during find command: BadValue: positional operator ({path}.$) \
         requires corresponding field in query specifier"
    ))
}

fn set_array_field(fields: &mut Vec<(String, ArrayOp)>, key: &str, op: ArrayOp) {
    match fields.iter_mut().find(|(k, _)| k == key) {
        Some(entry) => entry.1 = op,
        None => fields.push((key.to_string(), op)),
    }
}

/// Pretty document form used inside projection diagnostics.
fn perr_doc(doc: &Document) -> String {
    let mut parts = Vec::new();
    for (key, value) in doc.iter() {
        let key: &str = key.as_ref();
        parts.push(format!("{key}: {}", perr_value(value)));
    }
    format!("{{ {} }}", parts.join(", "))
}

fn perr_value(value: &Bson) -> String {
    match value {
        Bson::String(s) => format!("\"{s}\""),
        Bson::Document(doc) => perr_doc(doc),
        Bson::Array(items) => {
            let rendered: Vec<String> = items.iter().map(perr_value).collect();
            format!("[ {} ]", rendered.join(", "))
        }
        Bson::Boolean(b) => b.to_string(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(d) => d.to_string(),
        Bson::Null => "null".to_string(),
        other => other.to_string(),
    }
}

// ── In-place mutation at a path ─────────────────────────────────

/// Visit every document at `path`, descending documents by key and arrays
/// element-wise into their sub-documents; an all-digit segment addresses an
/// array position. This is the write-side counterpart of the walker's
/// traversal.
fn for_each_doc_at(
    doc: &mut Document,
    path: &str,
    visit: &mut dyn FnMut(&mut Document) -> Result<(), OperationFailure>,
) -> Result<(), OperationFailure> {
    let segments: Vec<&str> = path.split('.').collect();
    visit_doc(doc, &segments, visit)
}

fn visit_doc(
    doc: &mut Document,
    segments: &[&str],
    visit: &mut dyn FnMut(&mut Document) -> Result<(), OperationFailure>,
) -> Result<(), OperationFailure> {
    let Some((first, rest)) = segments.split_first() else {
        return visit(doc);
    };
    if let Some(value) = doc.get_mut(*first) {
        visit_value(value, rest, visit)?;
    }
    Ok(())
}

fn visit_value(
    value: &mut Bson,
    segments: &[&str],
    visit: &mut dyn FnMut(&mut Document) -> Result<(), OperationFailure>,
) -> Result<(), OperationFailure> {
    match value {
        Bson::Document(doc) => visit_doc(doc, segments, visit),
        Bson::Array(items) => {
            if let Some((first, rest)) = segments.split_first() {
                if let Some(index) = parse_index_segment(first) {
                    if let Some(elem) = items.get_mut(index) {
                        return visit_value(elem, rest, visit);
                    }
                    return Ok(());
                }
            }
            for elem in items.iter_mut() {
                if let Bson::Document(doc) = elem {
                    visit_doc(doc, segments, visit)?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
