mod common;
use common::*;

use bson::doc;

// ── Filtering ───────────────────────────────────────────────────

#[test]
fn find_with_eq_filter() {
    let results = insert_and_find(
        [
            doc! { "_id": 0_i32, "status": "active" },
            doc! { "_id": 1_i32, "status": "closed" },
            doc! { "_id": 2_i32, "status": "active" },
        ],
        doc! { "status": "active" },
    )
    .unwrap();
    assert_eq!(results.len(), 2);
    assert!(
        results
            .iter()
            .all(|d| d.get_str("status").ok() == Some("active"))
    );
}

#[test]
fn find_with_range_filter() {
    let results = insert_and_find(
        [
            doc! { "_id": 0_i32, "score": 10_i32 },
            doc! { "_id": 1_i32, "score": 55_i32 },
            doc! { "_id": 2_i32, "score": 90_i32 },
        ],
        doc! { "score": { "$gt": 50_i32, "$lt": 80_i32 } },
    )
    .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].get_i32("_id").ok(), Some(1));
}

#[test]
fn find_with_null_matches_missing_field() {
    let results = insert_and_find(
        [
            doc! { "_id": 0_i32, "a": 1_i32 },
            doc! { "_id": 1_i32 },
            doc! { "_id": 2_i32, "a": bson::Bson::Null },
        ],
        doc! { "a": bson::Bson::Null },
    )
    .unwrap();
    let ids: Vec<i32> = results.iter().map(|d| d.get_i32("_id").unwrap()).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn find_into_array_of_documents() {
    let results = insert_and_find(
        [
            doc! { "_id": 0_i32, "items": [ { "sku": "a" } ] },
            doc! { "_id": 1_i32, "items": [ { "sku": "b" }, { "sku": "c" } ] },
        ],
        doc! { "items.sku": "c" },
    )
    .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].get_i32("_id").ok(), Some(1));
}

#[test]
fn find_with_empty_filter_returns_everything() {
    let results = insert_and_find(
        [doc! { "_id": 0_i32 }, doc! { "_id": 1_i32 }],
        doc! {},
    )
    .unwrap();
    assert_eq!(results.len(), 2);
}

// ── Projection ──────────────────────────────────────────────────

#[test]
fn inclusion_projection_recurses() {
    let results = insert_and_project(
        [doc! { "_id": 1_i32, "a": { "b": 1_i32, "c": 2_i32 }, "d": 9_i32 }],
        doc! {},
        doc! { "a.b": 1_i32 },
    )
    .unwrap();
    assert_eq!(results, vec![doc! { "_id": 1_i32, "a": { "b": 1_i32 } }]);
}

#[test]
fn inclusion_key_set_is_paths_plus_id() {
    let results = insert_and_project(
        [doc! { "_id": 1_i32, "a": 1_i32, "b": 2_i32, "c": 3_i32 }],
        doc! {},
        doc! { "a": 1_i32, "c": 1_i32 },
    )
    .unwrap();
    let keys: Vec<&str> = results[0].keys().map(|k| k.as_ref()).collect();
    assert_eq!(keys, vec!["_id", "a", "c"]);
}

#[test]
fn exclusion_projection_drops_paths() {
    let results = insert_and_project(
        [doc! { "_id": 1_i32, "a": { "b": 1_i32, "c": 2_i32 }, "d": 9_i32 }],
        doc! {},
        doc! { "a.b": 0_i32 },
    )
    .unwrap();
    assert_eq!(
        results,
        vec![doc! { "_id": 1_i32, "a": { "c": 2_i32 }, "d": 9_i32 }]
    );
}

#[test]
fn id_can_be_excluded_alongside_inclusions() {
    let results = insert_and_project(
        [doc! { "_id": 1_i32, "a": 1_i32, "b": 2_i32 }],
        doc! {},
        doc! { "_id": 0_i32, "a": 1_i32 },
    )
    .unwrap();
    assert_eq!(results, vec![doc! { "a": 1_i32 }]);
}

#[test]
fn positional_projection_keeps_matched_element() {
    let results = insert_and_project(
        [doc! { "_id": 1_i32, "a": [1_i32, 2_i32, 3_i32] }],
        doc! { "a": 2_i32 },
        doc! { "a.$": 1_i32 },
    )
    .unwrap();
    assert_eq!(results, vec![doc! { "_id": 1_i32, "a": [2_i32] }]);
}

#[test]
fn positional_projection_through_sub_documents() {
    let results = insert_and_project(
        [doc! {
            "_id": 1_i32,
            "grades": [
                { "grade": 80_i32, "mean": 75_i32 },
                { "grade": 85_i32, "mean": 90_i32 },
                { "grade": 90_i32, "mean": 85_i32 }
            ]
        }],
        doc! { "grades.grade": { "$gte": 85_i32 } },
        doc! { "grades.$": 1_i32 },
    )
    .unwrap();
    assert_eq!(
        results,
        vec![doc! { "_id": 1_i32, "grades": [ { "grade": 85_i32, "mean": 90_i32 } ] }]
    );
}

#[test]
fn positional_on_empty_array_is_an_operation_failure() {
    let err = insert_and_project(
        [doc! { "_id": 1_i32, "a": [] }],
        doc! { "a": { "$exists": true } },
        doc! { "a.$": 1_i32 },
    )
    .unwrap_err();
    assert!(err.0.contains("positional operator (a.$)"), "{}", err.0);
}

#[test]
fn elem_match_projection() {
    let results = insert_and_project(
        [doc! { "_id": 1_i32, "arr": [ { "x": 1_i32 }, { "x": 2_i32 }, { "x": 3_i32 } ] }],
        doc! {},
        doc! { "arr": { "$elemMatch": { "x": { "$gt": 1_i32 } } } },
    )
    .unwrap();
    assert_eq!(
        results,
        vec![doc! { "_id": 1_i32, "arr": [ { "x": 2_i32 } ] }]
    );
}

#[test]
fn slice_projection_shapes_arrays() {
    let results = insert_and_project(
        [doc! { "_id": 1_i32, "a": [1_i32, 2_i32, 3_i32, 4_i32], "b": "kept" }],
        doc! {},
        doc! { "a": { "$slice": [1_i32, 2_i32] } },
    )
    .unwrap();
    assert_eq!(
        results,
        vec![doc! { "_id": 1_i32, "a": [2_i32, 3_i32], "b": "kept" }]
    );
}

#[test]
fn mixed_projection_is_rejected() {
    let err = insert_and_project(
        [doc! { "_id": 1_i32, "a": 1_i32 }],
        doc! {},
        doc! { "a": 1_i32, "b": 0_i32 },
    )
    .unwrap_err();
    assert_eq!(
        err.0,
        "Projection cannot have a mix of inclusion and exclusion."
    );
}

#[test]
fn filter_parse_errors_surface_as_operation_failures() {
    let err = insert_and_find([doc! { "_id": 1_i32 }], doc! { "a": { "$frob": 1_i32 } })
        .unwrap_err();
    assert!(err.0.contains("unknown field operator"), "{}", err.0);
}
