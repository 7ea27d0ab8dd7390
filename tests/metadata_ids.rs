// tests/metadata_ids.rs

mod common;
use crate::common::init_tracing;

use std::collections::HashSet;

use regex::Regex;

use modulebus::metadata::{MANAGER_SOURCE_NAME, Metadata, next_transaction_id};
use modulebus::types::Priority;

#[test]
fn ids_are_distinct_and_increasing() {
    init_tracing();

    let ids: Vec<String> = (0..2_000).map(|_| next_transaction_id()).collect();

    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len(), "duplicate transaction ids");

    for pair in ids.windows(2) {
        assert!(pair[0] < pair[1], "{} not before {}", pair[0], pair[1]);
    }
}

#[test]
fn id_has_timestamp_and_counter() {
    let re = Regex::new(r"^\d{8}-\d{6}-\d{6}$").unwrap();
    let id = next_transaction_id();
    assert!(re.is_match(&id), "unexpected id format: {id}");
}

#[test]
fn counter_restarts_with_each_second() {
    let first = next_transaction_id();
    std::thread::sleep(std::time::Duration::from_millis(1_100));
    let second = next_transaction_id();

    assert_ne!(first[..15], second[..15]);
    // Another test may have drawn ids in the same second, so only check the
    // counter is small.
    let counter: u32 = second[16..].parse().unwrap();
    assert!(counter < 100_000, "counter did not restart: {second}");
}

#[test]
fn default_metadata_is_normal_priority_without_source() {
    let md = Metadata::default();
    assert_eq!(md.priority(), Priority::Normal);
    assert_eq!(md.source(), None);
    assert!(!md.transaction_id().is_empty());
}

#[test]
fn with_priority_keeps_transaction() {
    let md = Metadata::from_module("sensor");
    let urgent = md.with_priority(Priority::Highest);

    assert_eq!(urgent.transaction_id(), md.transaction_id());
    assert_eq!(urgent.priority(), Priority::Highest);
    assert_eq!(urgent.source(), Some("sensor"));
    assert!(urgent.is_from("sensor"));
    assert!(!urgent.is_from("other"));
}

#[test]
fn manager_metadata_has_no_source_module() {
    let md = Metadata::from_manager();
    assert_eq!(md.source(), None);
    assert_eq!(md.source_name(), MANAGER_SOURCE_NAME);
    assert!(!md.is_from(MANAGER_SOURCE_NAME));
}

#[test]
fn priority_parses_case_insensitively() {
    assert_eq!("HIGHEST".parse::<Priority>().unwrap(), Priority::Highest);
    assert_eq!(" low ".parse::<Priority>().unwrap(), Priority::Low);
    assert!("urgent".parse::<Priority>().is_err());
    assert!(Priority::Highest < Priority::Lowest);
}
