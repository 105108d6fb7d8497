mod common;

use common::*;
use emm11_scout::{Progress, RecordFetcher};
use std::sync::{Arc, Mutex};

fn fetcher(portal: &FakePortal, dir: &std::path::Path) -> RecordFetcher {
    RecordFetcher::new(portal.provider(), &test_config(dir), Progress::detached())
}

#[tokio::test]
async fn only_matching_district_surfaces() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let portal = FakePortal::new()
        .with_detail("100", DetailPage::Html(detail_html("100", "O-100", "LUCKNOW")))
        .with_detail("101", DetailPage::Html(detail_html("101", "O-101", "Kanpur")))
        .with_detail("102", DetailPage::Timeout);

    let records = fetcher(&portal, dir.path()).fetch(100, 102, "Lucknow").await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, 100);
    assert_eq!(records[0].istp, "100");
    assert_eq!(records[0].ostp, "O-100");
    assert!(records[0].destination_district.eq_ignore_ascii_case("lucknow"));
    assert_eq!(records[0].unused, None);
}

#[tokio::test]
async fn range_is_inclusive_and_never_exceeded() {
    let dir = tempfile::tempdir().unwrap();
    let portal = FakePortal::new();

    fetcher(&portal, dir.path()).fetch(7, 11, "Lucknow").await;

    let mut seen = portal.ledger().detail_gotos.clone();
    seen.sort();
    assert_eq!(seen, vec!["10", "11", "7", "8", "9"]);
}

#[tokio::test]
async fn at_most_five_browsers_at_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut portal = FakePortal::new();
    for id in 1..=23 {
        portal = portal.with_detail(
            &id.to_string(),
            DetailPage::Html(detail_html(&id.to_string(), "O", "Agra")),
        );
    }

    let f = fetcher(&portal, dir.path());
    assert_eq!(f.concurrency(), 5);
    let summary = f.fetch_each(1, 23, "agra", |_| {}).await;

    assert_eq!(summary.attempted, 23);
    assert_eq!(summary.accepted, 23);
    let ledger = portal.ledger();
    assert!(ledger.max_active_browsers <= 5, "peak {}", ledger.max_active_browsers);
    assert!(ledger.max_active_browsers > 1);
    assert_eq!(ledger.launched, 23);
    assert_eq!(ledger.browsers_closed, 23);
    assert_eq!(ledger.pages_closed, 23);
}

#[tokio::test]
async fn failures_do_not_cancel_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let portal = FakePortal::new()
        .with_detail("1", DetailPage::Timeout)
        .with_detail("2", DetailPage::Html(detail_html("2", "O2", "Agra")))
        // no record at 3: the page lacks the district label
        .with_detail("4", DetailPage::Timeout)
        .with_detail("5", DetailPage::Html(detail_html("5", "O5", "Agra")));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let summary = fetcher(&portal, dir.path())
        .fetch_each(1, 5, "Agra", move |r| sink.lock().unwrap().push(r.id))
        .await;

    let mut ids = seen.lock().unwrap().clone();
    ids.sort();
    assert_eq!(ids, vec![2, 5]);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.accepted, 2);
    assert_eq!(portal.ledger().browsers_closed, 5);
}

#[tokio::test]
async fn reversed_range_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let portal = FakePortal::new();
    let summary = fetcher(&portal, dir.path()).fetch_each(10, 9, "Agra", |_| {}).await;
    assert_eq!(summary.attempted, 0);
    assert_eq!(portal.ledger().launched, 0);
}
