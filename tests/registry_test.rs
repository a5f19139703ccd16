// tests/registry_test.rs — Integration tests for the session registry

use std::sync::Arc;

use genbot::dispatch::command::Command;
use genbot::infra::errors::GenBotError;
use genbot::session::{BackendKind, JobId, SessionRegistry};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

#[test]
fn test_add_then_cancel_restores_count() {
    let reg = SessionRegistry::new();
    reg.add_session(1, "alice").unwrap();
    let before = reg.count_jobs(1, BackendKind::ChatGpt).unwrap();

    let token = CancellationToken::new();
    reg.add_job(1, BackendKind::ChatGpt, JobId::new(123456), token.clone())
        .unwrap();
    assert_eq!(reg.count_jobs(1, BackendKind::ChatGpt).unwrap(), before + 1);

    reg.cancel_job(1, BackendKind::ChatGpt, JobId::new(123456))
        .unwrap();
    assert_eq!(reg.count_jobs(1, BackendKind::ChatGpt).unwrap(), before);
    assert!(token.is_cancelled());
}

#[test]
fn test_duplicate_job_keeps_first_registration() {
    let reg = SessionRegistry::new();
    reg.add_session(1, "alice").unwrap();
    let first = CancellationToken::new();
    let second = CancellationToken::new();
    let id = JobId::new(500000);

    reg.add_job(1, BackendKind::DreamBooth, id, first.clone())
        .unwrap();
    let err = reg
        .add_job(1, BackendKind::DreamBooth, id, second.clone())
        .unwrap_err();
    assert!(matches!(err, GenBotError::AlreadyUsed { .. }));

    reg.cancel_job(1, BackendKind::DreamBooth, id).unwrap();
    assert!(first.is_cancelled());
    assert!(!second.is_cancelled());
}

#[test]
fn test_stop_without_jobs_and_double_delete() {
    let reg = SessionRegistry::new();
    reg.add_session(1, "alice").unwrap();
    assert_eq!(reg.stop_session(1).unwrap(), 0);

    reg.add_session(2, "bob").unwrap();
    reg.delete_session(2).unwrap();
    assert!(matches!(
        reg.delete_session(2),
        Err(GenBotError::SessionNotFound(2))
    ));
}

#[test]
fn test_closed_session_refuses_jobs() {
    let reg = SessionRegistry::new();
    reg.add_session(1, "alice").unwrap();
    reg.stop_session(1).unwrap();
    let err = reg
        .add_job(1, BackendKind::ChatGpt, JobId::new(111111), CancellationToken::new())
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_mode_selection_survives_job_churn() {
    let reg = SessionRegistry::new();
    reg.add_session(1, "alice").unwrap();
    reg.set_command(1, Command::FusionBrain).unwrap();
    for i in 0..10 {
        let id = JobId::new(100000 + i);
        reg.add_job(1, BackendKind::FusionBrain, id, CancellationToken::new())
            .unwrap();
        reg.cancel_job(1, BackendKind::FusionBrain, id).unwrap();
    }
    assert_eq!(reg.command(1).unwrap(), Command::FusionBrain);
}

/// A stop racing registrations must never leave a live token behind: every
/// registration either lands before the teardown (and is cancelled) or is
/// refused.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_racing_add_job_leaves_no_live_token() {
    for round in 0..50 {
        let reg = Arc::new(SessionRegistry::new());
        reg.add_session(1, "alice").unwrap();

        let mut handles = Vec::new();
        for i in 0..8u32 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move {
                let token = CancellationToken::new();
                let id = JobId::new(100000 + round * 100 + i);
                let registered = reg
                    .add_job(1, BackendKind::DreamBooth, id, token.clone())
                    .is_ok();
                (registered, token)
            }));
        }

        let stopper = {
            let reg = reg.clone();
            tokio::spawn(async move { reg.stop_session(1) })
        };

        let stopped = stopper.await.unwrap();
        assert!(stopped.is_ok());

        for handle in handles {
            let (registered, token) = handle.await.unwrap();
            if registered {
                assert!(
                    token.is_cancelled(),
                    "registered job survived session teardown"
                );
            }
        }
        assert!(reg.is_empty());
    }
}

#[test]
fn test_sessions_are_independent() {
    let reg = SessionRegistry::new();
    reg.add_session(1, "alice").unwrap();
    reg.add_session(2, "bob").unwrap();
    let token = CancellationToken::new();
    reg.add_job(2, BackendKind::OpenAi, JobId::new(222222), token.clone())
        .unwrap();

    reg.stop_session(1).unwrap();
    assert!(!token.is_cancelled());
    assert_eq!(reg.count_jobs(2, BackendKind::OpenAi).unwrap(), 1);
    assert_eq!(reg.len(), 1);
}
