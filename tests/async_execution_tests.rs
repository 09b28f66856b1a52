//! Async surface: retries, transactional commits, cancellation and nesting.

use memodb_resilience::memory::{FaultPlan, MemorySession, MemoryStore, StoreError};
use memodb_resilience::{
    CancellationToken, ErrorKindDetector, ExecutionError, ExecutionResult, ExecutionStrategy,
    IsolationLevel, RetryConfig, TransactionOptions,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn strategy(max_retry_count: u32) -> ExecutionStrategy<ErrorKindDetector> {
    let config = RetryConfig::new()
        .max_retry_count(max_retry_count)
        .base_delay(Duration::ZERO)
        .max_retry_delay(Duration::ZERO);
    ExecutionStrategy::new(config, MemoryStore::transient_detector())
}

fn timeout(detail: &str) -> StoreError {
    StoreError::Timeout(detail.to_string())
}

#[tokio::test]
async fn test_execute_async_retries_transient_faults() {
    let store = MemoryStore::with_faults(FaultPlan::new().fail_operations(2, timeout("busy")));
    let mut session = store.session();
    let calls = Arc::new(AtomicU32::new(0));
    let token = CancellationToken::new();

    let result = strategy(3)
        .execute_async(
            &mut session,
            ("greeting".to_string(), Arc::clone(&calls)),
            |session, (key, calls), _token| {
                Box::pin(async move {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    session.put(key.as_str(), json!("hello"))?;
                    Ok::<_, StoreError>(attempt)
                })
            },
            &token,
        )
        .await;

    assert_eq!(result.unwrap(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.get("greeting"), Some(json!("hello")));
}

#[tokio::test]
async fn test_verified_commit_async() {
    let store = MemoryStore::with_faults(FaultPlan::new().lose_commit_acks(1));
    let mut session = store.session();
    let calls = Arc::new(AtomicU32::new(0));
    let token = CancellationToken::new();

    let result = strategy(3)
        .execute_in_transaction_async(
            &mut session,
            ("invoice:1".to_string(), Arc::clone(&calls)),
            |session, (key, calls), _token| {
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    session.insert(key.as_str(), json!({ "paid": true }))?;
                    Ok::<_, StoreError>("issued")
                })
            },
            |session, (key, _), _token| {
                Box::pin(async move { Ok::<_, StoreError>(session.get(key)?.is_some()) })
            },
            &token,
        )
        .await;

    assert_eq!(result.unwrap(), "issued");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.stats().begins, 1);
    assert_eq!(store.stats().commits, 1);
}

#[tokio::test]
async fn test_unverified_commit_async_runs_again() {
    let plan = FaultPlan::new().fail_commits(1, StoreError::ConnectionLost("reset".into()));
    let store = MemoryStore::with_faults(plan);
    let mut session = store.session();
    let token = CancellationToken::new();
    let options = TransactionOptions::new().isolation_level(IsolationLevel::RepeatableRead);

    let result = strategy(3)
        .execute_in_transaction_with_async(
            &mut session,
            options,
            Arc::new(AtomicU32::new(0)),
            |session, calls, _token| {
                Box::pin(async move {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    session.put("k", json!(attempt))?;
                    Ok::<_, StoreError>(attempt)
                })
            },
            |session, _, _token| Box::pin(async move { Ok::<_, StoreError>(session.get("k")?.is_some()) }),
            &token,
        )
        .await;

    assert_eq!(result.unwrap(), 2);
    assert_eq!(store.get("k"), Some(json!(2)));
    assert_eq!(store.stats().begins, 2);
    assert_eq!(session.isolation_level(), Some(IsolationLevel::RepeatableRead));
}

#[tokio::test]
async fn test_unverified_async_transaction_rolls_back_failed_attempts() {
    let store = MemoryStore::with_faults(FaultPlan::new().fail_operations(1, timeout("lock")));
    let mut session = store.session();
    let token = CancellationToken::new();

    let result = strategy(2)
        .execute_in_transaction_unverified_async(
            &mut session,
            (),
            |session, _, _token| {
                Box::pin(async move {
                    session.put("a", json!(1))?;
                    Ok::<_, StoreError>(())
                })
            },
            &token,
        )
        .await;

    assert_ok!(result);
    assert_eq!(store.stats().rollbacks, 1);
    assert_eq!(store.stats().commits, 1);
    assert!(!session.is_in_transaction());
}

#[tokio::test]
async fn test_verification_async() {
    let token = CancellationToken::new();
    let verified = Arc::new(AtomicU32::new(0));

    let result = strategy(3)
        .execute_with_verification_async(
            &mut (),
            Arc::clone(&verified),
            |_, _, _token| Box::pin(async { Err::<u32, _>(StoreError::CommitAckLost) }),
            |_, verified, _token| {
                Box::pin(async move {
                    verified.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, StoreError>(ExecutionResult::Succeeded(11u32))
                })
            },
            &token,
        )
        .await;

    assert_eq!(result.unwrap(), 11);
    assert_eq!(verified.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancelled_before_first_attempt() {
    let calls = Arc::new(AtomicU32::new(0));
    let token = CancellationToken::new();
    token.cancel();

    let counter = Arc::clone(&calls);
    let err = strategy(3)
        .retry_async(
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, StoreError>(())
                }
            },
            &token,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::Cancelled { attempts: 0 }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancelled_during_backoff() {
    let config = RetryConfig::new()
        .max_retry_count(5)
        .base_delay(Duration::from_secs(60))
        .max_retry_delay(Duration::from_secs(60));
    let strategy = ExecutionStrategy::new(config, MemoryStore::transient_detector());
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        strategy.retry_async(|| async { Err::<(), _>(timeout("busy")) }, &token),
    )
    .await
    .expect("cancellation should interrupt the backoff");

    // Attempt 1 retries immediately, attempt 2 waits a minute and is cancelled.
    let err = assert_err!(outcome);
    assert!(matches!(err, ExecutionError::Cancelled { attempts: 2 }));
}

#[tokio::test]
async fn test_operation_observes_token() {
    let token = CancellationToken::new();

    let err = strategy(3)
        .run_async(
            &mut (),
            |_, token| {
                Box::pin(async move {
                    token.cancel();
                    Err::<(), _>(timeout("shutting down"))
                })
            },
            &token,
        )
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_retry_limit_async() {
    let token = CancellationToken::new();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let err = strategy(2)
        .retry_async(
            move || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err::<(), _>(timeout(&format!("attempt {attempt}"))) }
            },
            &token,
        )
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match err {
        ExecutionError::RetryLimitExceeded { attempts, source, .. } => {
            assert_eq!(attempts, 3);
            assert_eq!(source, timeout("attempt 3"));
        }
        other => panic!("expected retry limit, got {other:?}"),
    }
}

#[tokio::test]
async fn test_run_in_transaction_async_adapter() {
    let store = MemoryStore::new();
    let mut session = store.session();
    let token = CancellationToken::new();

    let value = strategy(1)
        .run_in_transaction_async(
            &mut session,
            |session, _token| {
                Box::pin(async move {
                    session.put("x", json!(10))?;
                    Ok::<_, StoreError>(10)
                })
            },
            |session, _token| Box::pin(async move { Ok::<_, StoreError>(session.get("x")?.is_some()) }),
            &token,
        )
        .await
        .unwrap();

    assert_eq!(value, 10);
    assert_eq!(store.get("x"), Some(json!(10)));
}

#[tokio::test]
async fn test_user_transaction_is_rejected_async() {
    let store = MemoryStore::new();
    let mut session = store.session();
    session.begin(&TransactionOptions::default()).unwrap();
    let token = CancellationToken::new();

    let err = strategy(3)
        .run_in_transaction_async(
            &mut session,
            |_, _| Box::pin(async { Ok::<_, StoreError>(()) }),
            |_, _| Box::pin(async { Ok::<_, StoreError>(true) }),
            &token,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::ExistingTransaction));
}

#[tokio::test]
async fn test_nested_async_execution_runs_once() {
    let store = MemoryStore::with_faults(FaultPlan::new().fail_operations(1, timeout("inner")));
    let mut session = store.session();
    let strategy = Arc::new(strategy(3));
    let token = CancellationToken::new();

    let outer = Arc::clone(&strategy);
    let result = strategy
        .execute_async(
            &mut session,
            outer,
            |session, strategy, token| {
                Box::pin(async move {
                    strategy
                        .run_async(
                            session,
                            |session, _| {
                                Box::pin(async move {
                                    session.put("nested", json!(true))?;
                                    Ok::<_, StoreError>(())
                                })
                            },
                            token,
                        )
                        .await
                        .map_err(|err| err.into_inner().unwrap_or(StoreError::SessionClosed))
                })
            },
            &token,
        )
        .await;

    assert_ok!(result);
    assert_eq!(store.stats().operations, 2);
    assert_eq!(store.get("nested"), Some(json!(true)));
}

#[tokio::test]
async fn test_strategy_shared_across_tasks() {
    let store = MemoryStore::with_faults(FaultPlan::new().fail_operations(3, timeout("busy")));
    let strategy = Arc::new(strategy(6));
    let token = CancellationToken::new();

    let mut handles = Vec::new();
    for worker in 0..4u32 {
        let strategy = Arc::clone(&strategy);
        let token = token.clone();
        let mut session: MemorySession = store.session();
        handles.push(tokio::spawn(async move {
            strategy
                .execute_async(
                    &mut session,
                    format!("worker:{worker}"),
                    move |session, key, _token| {
                        Box::pin(async move {
                            session.put(key.as_str(), json!(worker))?;
                            Ok::<_, StoreError>(())
                        })
                    },
                    &token,
                )
                .await
        }));
    }

    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }
    assert_eq!(store.len(), 4);
}

#[tokio::test]
async fn test_dropped_call_rolls_back_its_transaction() {
    let store = MemoryStore::new();
    let mut session = store.session();
    let strategy = strategy(3);
    let token = CancellationToken::new();

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        strategy.execute_in_transaction_async(
            &mut session,
            (),
            |session, _, _token| {
                Box::pin(async move {
                    session.put("slow", json!(1))?;
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<_, StoreError>(())
                })
            },
            |session, _, _token| {
                Box::pin(async move { Ok::<_, StoreError>(session.get("slow")?.is_some()) })
            },
            &token,
        ),
    )
    .await;

    assert!(outcome.is_err());
    assert!(!session.is_in_transaction());
    assert_eq!(store.get("slow"), None);
    assert_eq!(store.stats().rollbacks, 1);

    let next = strategy
        .run_in_transaction_async(
            &mut session,
            |session, _token| {
                Box::pin(async move {
                    session.put("fast", json!(2))?;
                    Ok::<_, StoreError>(2)
                })
            },
            |session, _token| {
                Box::pin(async move { Ok::<_, StoreError>(session.get("fast")?.is_some()) })
            },
            &token,
        )
        .await;

    assert_eq!(next.unwrap(), 2);
    assert_eq!(store.get("fast"), Some(json!(2)));
}

#[tokio::test]
async fn test_cancellation_does_not_interrupt_commit() {
    let store = MemoryStore::new();
    let mut session = store.session();
    let token = CancellationToken::new();

    let result = strategy(3)
        .execute_in_transaction_async(
            &mut session,
            (),
            |session, _, token| {
                Box::pin(async move {
                    session.put("order", json!(7))?;
                    token.cancel();
                    Ok::<_, StoreError>(7)
                })
            },
            |session, _, _token| {
                Box::pin(async move { Ok::<_, StoreError>(session.get("order")?.is_some()) })
            },
            &token,
        )
        .await;

    assert!(token.is_cancelled());
    assert_eq!(result.unwrap(), 7);
    assert_eq!(store.get("order"), Some(json!(7)));
    assert_eq!(store.stats().commits, 1);
}

#[tokio::test]
async fn test_verifier_error_is_final_async() {
    let store = MemoryStore::with_faults(FaultPlan::new().lose_commit_acks(1));
    let mut session = store.session();
    let calls = Arc::new(AtomicU32::new(0));
    let token = CancellationToken::new();

    let err = strategy(3)
        .execute_in_transaction_async(
            &mut session,
            Arc::clone(&calls),
            |session, calls, _token| {
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    session.put("receipt", json!(1))?;
                    Ok::<_, StoreError>(())
                })
            },
            |_, _, _token| Box::pin(async { Err::<bool, _>(timeout("verify")) }),
            &token,
        )
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(err, ExecutionError::Operation(ref e) if *e == timeout("verify")));
    assert_eq!(store.stats().commits, 1);
}
