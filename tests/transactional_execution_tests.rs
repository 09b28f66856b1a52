//! Transaction-per-attempt execution against the in-memory store, including
//! commits whose outcome is ambiguous.

use memodb_resilience::memory::{FaultPlan, MemorySession, MemoryStore, StoreError, StoreStats};
use memodb_resilience::{
    ErrorKindDetector, ExecutionError, ExecutionStrategy, IsolationLevel, RecordingSleeper,
    RetryConfig, TransactionOptions,
};
use serde_json::{Value, json};
use std::time::Duration;

fn strategy(max_retry_count: u32) -> ExecutionStrategy<ErrorKindDetector> {
    let config = RetryConfig::new()
        .max_retry_count(max_retry_count)
        .base_delay(Duration::ZERO)
        .max_retry_delay(Duration::ZERO);
    ExecutionStrategy::new(config, MemoryStore::transient_detector())
        .with_sleeper(RecordingSleeper::new())
}

fn exists(session: &mut MemorySession, key: &String) -> Result<bool, StoreError> {
    Ok(session.get(key)?.is_some())
}

#[test]
fn test_commit_once_on_success() {
    let store = MemoryStore::new();
    let mut session = store.session();

    let result = strategy(3).execute_in_transaction(
        &mut session,
        "user:1".to_string(),
        |session, key| -> Result<&'static str, StoreError> {
            session.insert(key.as_str(), json!({ "name": "Alice" }))?;
            Ok("created")
        },
        exists,
    );

    assert_eq!(result.unwrap(), "created");
    assert_eq!(
        store.stats(),
        StoreStats {
            begins: 1,
            commits: 1,
            rollbacks: 0,
            operations: 1,
        }
    );
    assert!(!session.is_in_transaction());
}

#[test]
fn test_verified_commit_is_not_replayed() {
    let store = MemoryStore::with_faults(FaultPlan::new().lose_commit_acks(1));
    let mut session = store.session();
    let mut calls = 0;
    let mut verifications = 0;

    let result = strategy(3).execute_in_transaction(
        &mut session,
        "order:9".to_string(),
        |session, key| -> Result<u32, StoreError> {
            calls += 1;
            session.insert(key.as_str(), json!({ "total": 30 }))?;
            Ok(calls * 100)
        },
        |session, key| {
            verifications += 1;
            exists(session, key)
        },
    );

    // The value computed before the failed commit is handed back.
    assert_eq!(result.unwrap(), 100);
    assert_eq!(calls, 1);
    assert_eq!(verifications, 1);
    assert_eq!(store.stats().begins, 1);
    assert_eq!(store.stats().commits, 1);
    assert_eq!(store.get("order:9"), Some(json!({ "total": 30 })));
}

#[test]
fn test_unverified_commit_runs_again() {
    let plan = FaultPlan::new().fail_commits(1, StoreError::ConnectionLost("reset".into()));
    let store = MemoryStore::with_faults(plan);
    let mut session = store.session();
    let mut calls = 0;
    let mut verifications = 0;

    let result = strategy(3).execute_in_transaction(
        &mut session,
        "order:10".to_string(),
        |session, key| -> Result<u32, StoreError> {
            calls += 1;
            session.insert(key.as_str(), json!(calls))?;
            Ok(calls)
        },
        |session, key| {
            verifications += 1;
            exists(session, key)
        },
    );

    assert_eq!(result.unwrap(), 2);
    assert_eq!(calls, 2);
    assert_eq!(verifications, 1);
    assert_eq!(store.stats().begins, 2);
    assert_eq!(store.stats().commits, 1);
    assert_eq!(store.get("order:10"), Some(json!(2)));
}

#[test]
fn test_verifier_skipped_for_failures_before_commit() {
    let store = MemoryStore::with_faults(
        FaultPlan::new().fail_operations(2, StoreError::Timeout("lock wait".into())),
    );
    let mut session = store.session();
    let mut verifications = 0;

    let result = strategy(3).execute_in_transaction(
        &mut session,
        (),
        |session, _| -> Result<(), StoreError> { session.put("k", json!(true)) },
        |_, _| {
            verifications += 1;
            Ok(true)
        },
    );

    assert!(result.is_ok());
    assert_eq!(verifications, 0);

    // One scope per attempt, each failed one rolled back.
    let stats = store.stats();
    assert_eq!(stats.begins, 3);
    assert_eq!(stats.rollbacks, 2);
    assert_eq!(stats.commits, 1);
}

#[test]
fn test_fatal_operation_error_rolls_back() {
    let store = MemoryStore::new();
    store.session().put("user:1", json!("taken")).unwrap();
    let mut session = store.session();
    let mut calls = 0;

    let err = strategy(3)
        .execute_in_transaction(
            &mut session,
            (),
            |session, _| -> Result<(), StoreError> {
                calls += 1;
                session.put("audit", json!("attempt"))?;
                session.insert("user:1", json!("again"))
            },
            |_, _| Ok(false),
        )
        .unwrap_err();

    assert_eq!(calls, 1);
    assert!(matches!(err, ExecutionError::Operation(StoreError::DuplicateKey(_))));
    assert_eq!(store.get("audit"), None);
    assert_eq!(store.stats().rollbacks, 1);
    assert!(!session.is_in_transaction());
}

#[test]
fn test_commit_failures_exhaust_budget() {
    let plan = FaultPlan::new().fail_commits(5, StoreError::ConnectionLost("reset".into()));
    let store = MemoryStore::with_faults(plan);
    let mut session = store.session();
    let mut verifications = 0;

    let err = strategy(2)
        .execute_in_transaction(
            &mut session,
            "k".to_string(),
            |session, key| -> Result<(), StoreError> { session.put(key.as_str(), json!(1)) },
            |session, key| {
                verifications += 1;
                exists(session, key)
            },
        )
        .unwrap_err();

    assert_eq!(verifications, 3);
    assert_eq!(store.stats().begins, 3);
    assert!(store.is_empty());
    match err {
        ExecutionError::RetryLimitExceeded { attempts, source, .. } => {
            assert_eq!(attempts, 3);
            assert_eq!(source, StoreError::ConnectionLost("reset".into()));
        }
        other => panic!("expected retry limit, got {other:?}"),
    }
}

#[test]
fn test_unverified_transaction_replays_after_lost_ack() {
    let store = MemoryStore::with_faults(FaultPlan::new().lose_commit_acks(1));
    let mut session = store.session();
    let mut calls = 0;

    let result = strategy(3).execute_in_transaction_unverified(
        &mut session,
        (),
        |session, _| -> Result<u32, StoreError> {
            calls += 1;
            session.put("counter", json!(calls))?;
            Ok(calls)
        },
    );

    // Without a verifier the lost acknowledgement looks like a failure.
    assert_eq!(result.unwrap(), 2);
    assert_eq!(store.stats().commits, 2);
    assert_eq!(store.get("counter"), Some(json!(2)));
}

#[test]
fn test_user_transaction_is_rejected() {
    let store = MemoryStore::new();
    let mut session = store.session();
    session.begin(&TransactionOptions::default()).unwrap();
    let mut calls = 0;

    let err = strategy(3)
        .execute_in_transaction(
            &mut session,
            (),
            |_, _| -> Result<(), StoreError> {
                calls += 1;
                Ok(())
            },
            |_, _| Ok(true),
        )
        .unwrap_err();

    assert!(matches!(err, ExecutionError::ExistingTransaction));
    assert_eq!(calls, 0);
    assert!(session.is_in_transaction());
}

#[test]
fn test_isolation_level_is_passed_through() {
    let store = MemoryStore::new();
    let mut session = store.session();
    let options = TransactionOptions::new().isolation_level(IsolationLevel::Serializable);

    strategy(1)
        .execute_in_transaction_with(
            &mut session,
            options,
            (),
            |session, _| -> Result<(), StoreError> { session.put("k", Value::Null) },
            |_, _| Ok(false),
        )
        .unwrap();

    assert_eq!(session.isolation_level(), Some(IsolationLevel::Serializable));
}

#[test]
fn test_run_in_transaction_adapter() {
    let store = MemoryStore::new();
    let mut session = store.session();

    let total = strategy(1)
        .run_in_transaction(
            &mut session,
            |session| -> Result<i64, StoreError> {
                session.put("a", json!(2))?;
                session.put("b", json!(3))?;
                let a = session.get("a")?.and_then(|v| v.as_i64()).unwrap_or(0);
                let b = session.get("b")?.and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(a + b)
            },
            |session| Ok(session.get("b")?.is_some()),
        )
        .unwrap();

    assert_eq!(total, 5);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_nested_execution_inside_transaction() {
    let store = MemoryStore::with_faults(
        FaultPlan::new().fail_operations(1, StoreError::Timeout("inner".into())),
    );
    let mut session = store.session();
    let strategy = strategy(3);
    let mut attempts = 0;

    let result = strategy.execute_in_transaction(
        &mut session,
        (),
        |session, _| -> Result<u32, StoreError> {
            attempts += 1;
            // The nested call runs once; its failure fails the outer attempt.
            strategy
                .run(session, |session| session.put("nested", json!(attempts)))
                .map_err(|err| err.into_inner().unwrap_or(StoreError::SessionClosed))?;
            Ok(attempts)
        },
        |_, _| Ok(false),
    );

    assert_eq!(result.unwrap(), 2);
    assert_eq!(store.get("nested"), Some(json!(2)));
    assert_eq!(store.stats().begins, 2);
}
