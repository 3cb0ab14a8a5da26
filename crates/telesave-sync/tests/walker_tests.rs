// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! History walker paging, rate-limit and retry behavior against the mock service.

use std::sync::Arc;
use std::time::Duration;

use telesave_core::{Chat, ChatId, ChatKind, MessageId, MessagingService, TelesaveError};
use telesave_sync::{HistoryWalker, RetryPolicy};
use telesave_test_utils::{Failure, MockService, history};
use tokio_util::sync::CancellationToken;

const CHAT: ChatId = ChatId(11);

fn chat() -> Chat {
    Chat::new(CHAT, "walk me", ChatKind::Group)
}

fn walker(service: &Arc<MockService>, cursor: i64, policy: RetryPolicy) -> HistoryWalker {
    let service: Arc<dyn MessagingService> = service.clone();
    HistoryWalker::new(
        service,
        chat(),
        MessageId(cursor),
        2,
        Duration::from_secs(5),
        policy,
        CancellationToken::new(),
    )
}

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(100), Duration::from_secs(1)).without_jitter()
}

async fn drain(walker: &mut HistoryWalker) -> Result<Vec<i64>, TelesaveError> {
    let mut ids = Vec::new();
    while let Some(message) = walker.next().await? {
        ids.push(message.id.0);
    }
    Ok(ids)
}

#[tokio::test]
async fn yields_messages_after_cursor_in_ascending_order() {
    let service = Arc::new(MockService::new().with_chat(chat(), history(CHAT, 5)));
    let mut walker = walker(&service, 2, policy(3));

    assert_eq!(walker.probe_latest().await.unwrap(), Some(MessageId(5)));
    assert_eq!(drain(&mut walker).await.unwrap(), vec![3, 4, 5]);
    assert_eq!(walker.cursor(), MessageId(5));
    // probe + [3, 4] + [5]
    assert_eq!(walker.pages_fetched(), 3);
    assert_eq!(service.page_requests(CHAT).await, 3);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_on_third_page_pauses_and_resumes_without_gaps() {
    let service = Arc::new(
        MockService::new()
            .with_chat(chat(), history(CHAT, 7))
            .fail_page(CHAT, 3, Failure::RateLimited(Duration::from_secs(10))),
    );
    let mut walker = walker(&service, 0, policy(1));
    let started = tokio::time::Instant::now();

    walker.probe_latest().await.unwrap();
    let ids = drain(&mut walker).await.unwrap();

    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);
    assert!(started.elapsed() >= Duration::from_secs(10));
    // The rate-limited call is repeated, not skipped.
    assert_eq!(service.page_requests(CHAT).await, 6);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_is_retried_with_backoff() {
    let service = Arc::new(
        MockService::new()
            .with_chat(chat(), history(CHAT, 3))
            .fail_page(CHAT, 1, Failure::Transient)
            .fail_page(CHAT, 2, Failure::Timeout),
    );
    let mut walker = walker(&service, 0, policy(3));

    let ids = drain(&mut walker).await.unwrap();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retry_budget_surfaces_walker_exhausted() {
    let service = Arc::new(
        MockService::new()
            .with_chat(chat(), history(CHAT, 3))
            .fail_page(CHAT, 1, Failure::Transient)
            .fail_page(CHAT, 2, Failure::Transient)
            .fail_page(CHAT, 3, Failure::Transient),
    );
    let mut walker = walker(&service, 0, policy(3));

    match walker.next().await {
        Err(TelesaveError::WalkerExhausted {
            chat_id, attempts, ..
        }) => {
            assert_eq!(chat_id, CHAT);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected WalkerExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn non_retryable_errors_pass_through() {
    let service = Arc::new(
        MockService::new()
            .with_chat(chat(), history(CHAT, 3))
            .fail_page(CHAT, 1, Failure::Authentication),
    );
    let mut walker = walker(&service, 0, policy(3));
    let err = walker.next().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(service.page_requests(CHAT).await, 1);
}

#[tokio::test]
async fn restarting_from_the_same_cursor_reproduces_the_rest() {
    let service = Arc::new(MockService::new().with_chat(chat(), history(CHAT, 5)));

    let mut first = walker(&service, 0, policy(3));
    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(first.next().await.unwrap().unwrap().id.0);
    }
    drop(first);
    assert_eq!(seen, vec![1, 2, 3]);

    let mut resumed = walker(&service, 3, policy(3));
    assert_eq!(drain(&mut resumed).await.unwrap(), vec![4, 5]);
}

#[tokio::test]
async fn empty_chat_is_exhausted_immediately() {
    let service = Arc::new(MockService::new().with_chat(chat(), vec![]));
    let mut walker = walker(&service, 0, policy(3));
    assert_eq!(walker.probe_latest().await.unwrap(), None);
    assert!(walker.next().await.unwrap().is_none());
    assert_eq!(walker.latest_known(), None);
}

#[tokio::test]
async fn cancellation_stops_the_walk() {
    let service = Arc::new(MockService::new().with_chat(chat(), history(CHAT, 5)));
    let dyn_service: Arc<dyn MessagingService> = service.clone();
    let cancel = CancellationToken::new();
    let mut walker = HistoryWalker::new(
        dyn_service,
        chat(),
        MessageId(0),
        2,
        Duration::from_secs(5),
        policy(3),
        cancel.clone(),
    );
    cancel.cancel();
    assert!(matches!(walker.next().await, Err(TelesaveError::Cancelled)));
}
