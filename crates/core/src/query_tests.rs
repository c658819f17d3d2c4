// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Duration;

fn query_at(offset_secs: i64, status: QueryStatus) -> Query {
    let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let mut q = Query::new(
        "user",
        "question",
        "is this safe?",
        None,
        base + Duration::seconds(offset_secs),
    );
    q.status = status;
    q
}

#[test]
fn new_query_is_pending_with_fresh_id() {
    let a = query_at(0, QueryStatus::Pending);
    let b = query_at(0, QueryStatus::Pending);
    assert_ne!(a.id, b.id);
    assert_eq!(a.status, QueryStatus::Pending);
}

#[test]
fn prune_keeps_list_under_cap() {
    let mut queries: Vec<Query> = (0..60)
        .map(|i| query_at(i, QueryStatus::Complete))
        .collect();
    prune_queries(&mut queries);
    assert_eq!(queries.len(), MAX_QUERIES);
}

#[test]
fn prune_evicts_oldest_completed_first() {
    let mut queries: Vec<Query> = (0..MAX_QUERIES as i64)
        .map(|i| query_at(i + 100, QueryStatus::Complete))
        .collect();
    // The oldest entry is pending; it must survive pruning.
    queries.insert(0, query_at(0, QueryStatus::Pending));
    prune_queries(&mut queries);
    assert_eq!(queries.len(), MAX_QUERIES);
    assert!(queries.iter().any(|q| q.status == QueryStatus::Pending));
    // The oldest completed entry (offset 100) was the victim.
    let oldest_completed = queries
        .iter()
        .filter(|q| q.status == QueryStatus::Complete)
        .map(|q| q.created_at)
        .min()
        .unwrap();
    let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    assert_eq!(oldest_completed, base + Duration::seconds(101));
}

#[test]
fn prune_is_noop_under_cap() {
    let mut queries = vec![query_at(0, QueryStatus::Complete)];
    prune_queries(&mut queries);
    assert_eq!(queries.len(), 1);
}
