//! Tests for server-side refresh deduplication.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use readlist_session::provider::AuthClientError;
use readlist_session::session::RefreshDeduplicator;

fn dedup() -> RefreshDeduplicator {
    RefreshDeduplicator::new(Duration::from_secs(5))
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_call() {
    let client = Arc::new(MockAuthClient::new().with_delay(Duration::from_millis(200)));
    let dedup = dedup();

    let calls = (0..16).map(|_| dedup.refresh(&client, "refresh-1"));
    let results = futures::future::join_all(calls).await;

    assert_eq!(client.refresh_calls(), 1);
    let first = results[0].clone().unwrap();
    assert!(results.iter().all(|r| r.as_ref() == Ok(&first)));
}

#[tokio::test(start_paused = true)]
async fn test_distinct_tokens_refresh_independently() {
    let client = Arc::new(MockAuthClient::new());
    let dedup = dedup();

    let (a, b) = tokio::join!(
        dedup.refresh(&client, "refresh-a"),
        dedup.refresh(&client, "refresh-b")
    );

    assert_eq!(client.refresh_calls(), 2);
    assert_ne!(a.unwrap().refresh_token, b.unwrap().refresh_token);
}

#[tokio::test(start_paused = true)]
async fn test_success_served_within_window() {
    let client = Arc::new(MockAuthClient::new());
    let dedup = dedup();

    let first = dedup.refresh(&client, "refresh-1").await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    let second = dedup.refresh(&client, "refresh-1").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(client.refresh_calls(), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    dedup.refresh(&client, "refresh-1").await.unwrap();
    assert_eq!(client.refresh_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retryable_failure_is_evicted() {
    let client = Arc::new(MockAuthClient::new());
    client.push_error(AuthClientError::Network("reset".into()));
    let dedup = dedup();

    assert!(dedup.refresh(&client, "refresh-1").await.is_err());
    assert!(dedup.refresh(&client, "refresh-1").await.is_ok());
    assert_eq!(client.refresh_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_cached_within_window() {
    let client = Arc::new(MockAuthClient::new());
    client.push_error(AuthClientError::InvalidGrant("already used".into()));
    let dedup = dedup();

    let first = dedup.refresh(&client, "refresh-1").await;
    let second = dedup.refresh(&client, "refresh-1").await;
    assert!(matches!(first, Err(AuthClientError::InvalidGrant(_))));
    assert_eq!(first, second);
    assert_eq!(client.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_caller_does_not_strand_others() {
    let client = Arc::new(MockAuthClient::new().with_delay(Duration::from_secs(1)));
    let dedup = dedup();

    let abandoned =
        tokio::time::timeout(Duration::from_millis(100), dedup.refresh(&client, "refresh-1")).await;
    assert!(abandoned.is_err());

    let session = dedup.refresh(&client, "refresh-1").await.unwrap();
    assert_eq!(session.refresh_token, "refresh-1-r1");
    assert_eq!(client.refresh_calls(), 1);
    assert_eq!(dedup.tracked(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_refresh_is_evicted_after_window() {
    let client = Arc::new(MockAuthClient::new().with_delay(Duration::from_secs(1)));
    let dedup = dedup();

    let abandoned =
        tokio::time::timeout(Duration::from_millis(100), dedup.refresh(&client, "refresh-1")).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_secs(3600)).await;
    dedup.refresh(&client, "refresh-other").await.unwrap();

    assert_eq!(dedup.tracked(), 1);
    assert_eq!(client.refresh_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_window_starts_when_slow_refresh_completes() {
    let client = Arc::new(MockAuthClient::new().with_delay(Duration::from_secs(6)));
    let dedup = dedup();

    let first = dedup.refresh(&client, "refresh-1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let duplicate = dedup.refresh(&client, "refresh-1").await.unwrap();

    assert_eq!(first, duplicate);
    assert_eq!(client.refresh_calls(), 1);
}
