mod common;

use common::*;
use emm11_scout::{Authenticator, Credentials, PortalError, PortalSession, Progress, SessionState};

fn credentials() -> Credentials {
    Credentials {
        login_id: "operator".into(),
        password: "secret".into(),
    }
}

#[tokio::test]
async fn unreadable_captcha_never_submits() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let portal = FakePortal::new().accept_login_on(1);
    let recognizer = ScriptedRecognizer::new(&["a8c", "", "12 3", "O0O", "??"]);
    let auth = Authenticator::new(&test_config(dir.path()), recognizer.clone(), Progress::detached());

    let mut session = PortalSession::open(portal.provider().as_ref()).await.unwrap();
    let err = auth.login(&mut session, &credentials()).await.unwrap_err();
    session.close().await;

    match err {
        PortalError::AuthenticationExhausted {
            attempts,
            unreadable,
            rejected,
            errored,
        } => assert_eq!((attempts, unreadable, rejected, errored), (5, 5, 0, 0)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(recognizer.calls(), 5);
    let ledger = portal.ledger();
    assert_eq!(ledger.login_submits, 0);
    assert_eq!(ledger.captcha_shots, 5);
    assert_eq!(ledger.browsers_closed, 1);
}

#[tokio::test]
async fn accepted_on_third_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let portal = FakePortal::new().accept_login_on(3);
    let recognizer = ScriptedRecognizer::new(&["48213"]);
    let auth = Authenticator::new(&test_config(dir.path()), recognizer, Progress::detached());

    let mut session = PortalSession::open(portal.provider().as_ref()).await.unwrap();
    auth.login(&mut session, &credentials()).await.unwrap();
    assert_eq!(session.state(), SessionState::Authenticated);
    session.close().await;

    let ledger = portal.ledger();
    assert_eq!(ledger.login_submits, 3);
    // one reload between each failed attempt
    assert_eq!(ledger.reloads, 2);
}

#[tokio::test]
async fn mixed_reads_still_capped_at_five() {
    let dir = tempfile::tempdir().unwrap();
    let portal = FakePortal::new();
    let recognizer = ScriptedRecognizer::new(&["x1", "1111", "zz", "2222", "3333", "4444"]);
    let auth = Authenticator::new(&test_config(dir.path()), recognizer.clone(), Progress::detached());

    let mut session = PortalSession::open(portal.provider().as_ref()).await.unwrap();
    let err = auth.login(&mut session, &credentials()).await.unwrap_err();
    session.close().await;

    assert!(matches!(
        err,
        PortalError::AuthenticationExhausted {
            attempts: 5,
            unreadable: 2,
            rejected: 3,
            errored: 0
        }
    ));
    assert_eq!(recognizer.calls(), 5);
    assert_eq!(portal.ledger().login_submits, 3);
}

#[tokio::test]
async fn already_authenticated_session_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let portal = FakePortal::new().accept_login_on(1);
    let recognizer = ScriptedRecognizer::new(&["1"]);
    let auth = Authenticator::new(&test_config(dir.path()), recognizer.clone(), Progress::detached());

    let mut session = PortalSession::open(portal.provider().as_ref()).await.unwrap();
    auth.login(&mut session, &credentials()).await.unwrap();
    auth.login(&mut session, &credentials()).await.unwrap();
    session.close().await;

    assert_eq!(recognizer.calls(), 1);
    assert_eq!(portal.ledger().login_submits, 1);
}

#[tokio::test]
async fn login_page_timeout_aborts_without_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let portal = FakePortal::new().accept_login_on(1).with_login_page_timeout();
    let recognizer = ScriptedRecognizer::new(&["1234"]);
    let auth = Authenticator::new(&test_config(dir.path()), recognizer.clone(), Progress::detached());

    let mut session = PortalSession::open(portal.provider().as_ref()).await.unwrap();
    let err = auth.login(&mut session, &credentials()).await.unwrap_err();
    assert_eq!(session.state(), SessionState::Unauthenticated);
    session.close().await;

    assert!(err.is_timeout(), "unexpected {err:?}");
    assert_eq!(recognizer.calls(), 0);
    let ledger = portal.ledger();
    assert_eq!(ledger.captcha_shots, 0);
    assert_eq!(ledger.login_submits, 0);
    assert_eq!(ledger.reloads, 0);
}

#[tokio::test]
async fn driver_error_reloads_and_moves_to_next_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let portal = FakePortal::new().accept_login_on(1).with_failing_captcha_shots(1);
    let recognizer = ScriptedRecognizer::new(&["5512"]);
    let auth = Authenticator::new(&test_config(dir.path()), recognizer.clone(), Progress::detached());

    let mut session = PortalSession::open(portal.provider().as_ref()).await.unwrap();
    auth.login(&mut session, &credentials()).await.unwrap();
    assert_eq!(session.state(), SessionState::Authenticated);
    session.close().await;

    // failed screenshot never reaches the recognizer
    assert_eq!(recognizer.calls(), 1);
    let ledger = portal.ledger();
    assert_eq!(ledger.failed_captcha_shots, 1);
    assert_eq!(ledger.captcha_shots, 1);
    assert_eq!(ledger.reloads, 1);
    assert_eq!(ledger.login_submits, 1);
}

#[tokio::test]
async fn persistent_fill_errors_are_tallied_as_errored() {
    let dir = tempfile::tempdir().unwrap();
    let portal = FakePortal::new().accept_login_on(1).with_failing_login_fills(usize::MAX);
    let recognizer = ScriptedRecognizer::new(&["5512"]);
    let auth = Authenticator::new(&test_config(dir.path()), recognizer.clone(), Progress::detached());

    let mut session = PortalSession::open(portal.provider().as_ref()).await.unwrap();
    let err = auth.login(&mut session, &credentials()).await.unwrap_err();
    session.close().await;

    assert!(matches!(
        err,
        PortalError::AuthenticationExhausted {
            attempts: 5,
            unreadable: 0,
            rejected: 0,
            errored: 5
        }
    ));
    assert_eq!(recognizer.calls(), 0);
    let ledger = portal.ledger();
    assert_eq!(ledger.failed_fills, 5);
    assert_eq!(ledger.login_submits, 0);
    // no reload after the final attempt
    assert_eq!(ledger.reloads, 4);
}
