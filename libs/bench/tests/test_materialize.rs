//! Integration tests for random-access query materialisation

mod common;

use common::dataset_utils::write_sequential;
use proptest::prelude::*;
use shardbench::{Error, QueryMaterializer};
use tempfile::TempDir;

#[test]
fn test_rows_come_back_in_request_order() {
    let dir = TempDir::new().unwrap();
    let catalog = write_sequential(dir.path(), &[4, 4, 4], 3);

    let materializer = QueryMaterializer::new();
    let matrix = materializer.materialize(&catalog, &[5, 0, 9]).unwrap();
    assert_eq!(matrix.len(), 3);
    assert_eq!(matrix.row(0), &[5.0, 5.0, 5.0]);
    assert_eq!(matrix.row(1), &[0.0, 0.0, 0.0]);
    assert_eq!(matrix.row(2), &[9.0, 9.0, 9.0]);
    assert_eq!(materializer.map_stats().peak_open(), 1);
}

#[test]
fn test_rows_from_two_shards_open_each_once() {
    let dir = TempDir::new().unwrap();
    let catalog = write_sequential(dir.path(), &[10, 10], 4);

    let materializer = QueryMaterializer::new();
    let matrix = materializer.materialize(&catalog, &[3, 15]).unwrap();
    assert_eq!(matrix.row(0), &[3.0; 4]);
    assert_eq!(matrix.row(1), &[15.0; 4]);
    assert_eq!(materializer.map_stats().total_opened(), 2);
    assert_eq!(materializer.map_stats().open(), 0);
}

#[test]
fn test_duplicate_ids_are_materialised_twice() {
    let dir = TempDir::new().unwrap();
    let catalog = write_sequential(dir.path(), &[6], 2);

    let matrix = QueryMaterializer::new().materialize(&catalog, &[2, 2, 1]).unwrap();
    assert_eq!(matrix.row(0), matrix.row(1));
    assert_eq!(matrix.row(2), &[1.0, 1.0]);
}

#[test]
fn test_empty_request() {
    let dir = TempDir::new().unwrap();
    let catalog = write_sequential(dir.path(), &[6], 2);

    let materializer = QueryMaterializer::new();
    let matrix = materializer.materialize(&catalog, &[]).unwrap();
    assert!(matrix.is_empty());
    assert_eq!(materializer.map_stats().total_opened(), 0);
}

#[test]
fn test_out_of_range_id_fails_before_mapping() {
    let dir = TempDir::new().unwrap();
    let catalog = write_sequential(dir.path(), &[10, 10], 4);

    let materializer = QueryMaterializer::new();
    let err = materializer.materialize(&catalog, &[3, 20]).unwrap_err();
    assert!(matches!(err, Error::QueryOutOfRange { id: 20, total_rows: 20 }));
    assert_eq!(materializer.map_stats().total_opened(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_request_order_holds_for_any_partition(sizes in prop::collection::vec(1u64..6, 1..6)) {
        // pad the corpus so ids 0, 5 and 9 always exist
        let mut sizes = sizes;
        let total: u64 = sizes.iter().sum();
        if total < 10 {
            sizes.push(10 - total);
        }
        let dir = TempDir::new().unwrap();
        let catalog = write_sequential(dir.path(), &sizes, 3);

        let materializer = QueryMaterializer::new();
        let matrix = materializer.materialize(&catalog, &[5, 0, 9]).unwrap();
        prop_assert_eq!(matrix.row(0), &[5.0f32; 3][..]);
        prop_assert_eq!(matrix.row(1), &[0.0f32; 3][..]);
        prop_assert_eq!(matrix.row(2), &[9.0f32; 3][..]);
        prop_assert!(materializer.map_stats().peak_open() <= 1);
    }
}
