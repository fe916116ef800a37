//! Date-range partitioning and best-cover matching.

use reconcile_rs::crossing::crossing_distance;
use reconcile_rs::{is_crossed, split, Crossing, DateRangeCrossing, DateRangeMatcher, ReconcileError};

mod support;

use support::interval;

#[test]
fn test_split_is_a_partition() {
    let items = support::random_intervals(80, 17);
    let result = DateRangeCrossing::new(items.clone()).min_crossings();

    let mut all: Vec<_> = result.iter().copied().collect();
    let mut expected = items;
    all.sort();
    expected.sort();
    assert_eq!(all, expected);

    for (i, a) in result.disjoint.iter().enumerate() {
        for b in &result.disjoint[i + 1..] {
            assert!(!is_crossed(a, b), "{a} and {b} overlap");
        }
    }
    for item in &result.remainder {
        assert!(result.disjoint.iter().any(|d| is_crossed(d, item)));
    }
}

#[test]
fn test_crossing_is_symmetric() {
    let items = support::random_intervals(40, 23);
    for a in &items {
        for b in &items {
            assert_eq!(is_crossed(a, b), is_crossed(b, a));
        }
    }
}

#[test]
fn test_plain_split_keeps_input_order() {
    let items = support::random_intervals(30, 5);
    let result = split(items.clone());
    assert_eq!(result.disjoint[0], items[0]);
    assert_eq!(result.len(), items.len());
}

#[test]
fn test_open_end_dominates() {
    let matcher = DateRangeMatcher::new(vec![
        interval("2023-05-05", Some("2023-05-10")),
        interval("2023-05-15", None),
    ]);
    let needle = interval("2023-05-16", Some("2023-05-20"));
    let found = matcher.match_all(&[needle]);
    let found = found[0].expect("needle is covered");
    assert_eq!(found.crossing, Crossing::Include);
    assert_eq!(*found.item, interval("2023-05-15", None));
    assert_eq!(crossing_distance(found.item, &needle).1, Crossing::Include);
}

#[test]
fn test_inverted_range_is_rejected() {
    let err = DateRangeCrossing::from_pairs(&[(Some("2023-05-10"), Some("2023-05-05"))]).unwrap_err();
    assert!(matches!(err, ReconcileError::InvertedRange { .. }));
}

#[test]
fn test_haystack_members_match_themselves() {
    let items = support::random_intervals(25, 41);
    let matcher = DateRangeMatcher::new(items.clone());
    for found in matcher.match_all(&items) {
        assert_eq!(found.expect("self match").crossing, Crossing::Exact);
    }
}

#[test]
fn test_intervals_deserialize_from_json() {
    let needles: Vec<reconcile_rs::Interval> =
        serde_json::from_str(r#"[{"begin":"2023-01-01","end":"2023-01-31"},{"begin":"2023-02-01"}]"#)
            .unwrap();
    assert!(needles[0].is_finite());
    assert!(!needles[1].is_finite());
}
