//! The licensing flows against a real SQLite file.

use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::Barrier;

use license_server::store::SqliteStore;

#[path = "../common/mod.rs"]
mod common;
use common::*;

const BUYER: &str = "buyer@example.com";

fn sqlite_context(dir: &TempDir) -> TestContext {
    let path = dir.path().join("licenses.db");
    let store = SqliteStore::open(path.to_str().unwrap()).expect("Failed to open SQLite store");
    test_context_with(Arc::new(store), test_policy())
}

#[tokio::test]
async fn test_documents_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let codes = {
        let ctx = sqlite_context(&dir);
        ctx.payments.add_intent(paid_intent("pi_1", BUYER, 2));
        ctx.licensor().lookup_trial(&TrialRequest {
            machine_id: machine_id(1),
            machine_info: String::new(),
        })
        .unwrap();
        ctx.licensor().finish_purchase("pi_1").await.unwrap().license_codes
    };

    let ctx = sqlite_context(&dir);
    assert_eq!(ctx.licenses_for(BUYER).unwrap().codes(), codes);
    assert_eq!(ctx.trial_for(&machine_id(1)).unwrap().machine.issue_count, 1);

    // The reopened store still knows the payment was finished.
    ctx.payments.add_intent(paid_intent("pi_1", BUYER, 2));
    let again = ctx.licensor().finish_purchase("pi_1").await.unwrap();
    assert_eq!(again.license_codes, codes);
    assert_eq!(ctx.mailer.count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_finish_over_sqlite_creates_once() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Arc::new(sqlite_context(&dir));
    ctx.payments.add_intent(paid_intent("pi_race", BUYER, 2));

    let tasks = 6;
    let barrier = Arc::new(Barrier::new(tasks));
    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let ctx = ctx.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                ctx.licensor().finish_purchase("pi_race").await
            })
        })
        .collect();

    let mut replies = Vec::new();
    for handle in handles {
        replies.push(handle.await.unwrap().expect("finish should succeed"));
    }

    assert!(replies.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(ctx.licenses_for(BUYER).unwrap().licenses.len(), 2);
    assert_eq!(ctx.mailer.count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bindings_over_sqlite_respect_limit() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Arc::new(sqlite_context(&dir));
    ctx.payments.add_intent(paid_intent("pi_1", BUYER, 1));
    let code = ctx.licensor().finish_purchase("pi_1").await.unwrap().license_codes[0].clone();
    let max = ctx.licensor().policy().machine_count_max;

    let tasks = 6;
    let barrier = Arc::new(Barrier::new(tasks));
    let handles: Vec<_> = (0..tasks)
        .map(|n| {
            let ctx = ctx.clone();
            let barrier = barrier.clone();
            let code = code.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                ctx.licensor().lookup_license(&LicenseRequest {
                    email: BUYER.to_string(),
                    license_code: code.to_string(),
                    machine_id: machine_id(n as u8 + 1),
                    machine_info: String::new(),
                })
            })
        })
        .collect();

    let mut bound = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => bound += 1,
            Err(e) => assert_eq!(e, LicenseError::MachineLimitReached),
        }
    }

    assert_eq!(bound, max);
    assert_eq!(ctx.licenses_for(BUYER).unwrap().licenses[&code].machines.len(), max);
}
