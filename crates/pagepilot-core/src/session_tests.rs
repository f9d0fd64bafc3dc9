use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pagepilot_config::LoginCheck;
use pagepilot_protocols::{PageError, SelectorSet};

use super::*;
use crate::fake::{FakeConnector, FakeElement, FakePage};

const HOME: &str = "https://app.example.com/";

fn options() -> SessionOptions {
    SessionOptions {
        endpoint: "http://localhost:9222".to_string(),
        goto_url: Some(HOME.to_string()),
        login: LoginCheck::default(),
        settle: Duration::from_millis(500),
        element_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(100),
    }
}

fn manager(connector: FakeConnector) -> (SessionManager, Arc<FakeConnector>) {
    let connector = Arc::new(connector);
    (SessionManager::new(connector.clone(), options()), connector)
}

#[tokio::test(start_paused = true)]
async fn test_ensure_live_connects_and_navigates() {
    let page = FakePage::blank();
    let (mut session, connector) = manager(FakeConnector::new(vec![page.clone()]));

    assert_eq!(session.state(), SessionState::Disconnected);
    session.ensure_live().await.unwrap();

    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(connector.connect_count(), 1);
    assert_eq!(page.navigations(), vec![HOME.to_string()]);
    assert_eq!(session.reconnect_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_ensure_live_is_idempotent() {
    let page = FakePage::blank();
    let (mut session, connector) = manager(FakeConnector::new(vec![page.clone()]));

    session.ensure_live().await.unwrap();
    session.ensure_live().await.unwrap();
    session.ensure_live().await.unwrap();

    assert_eq!(connector.connect_count(), 1);
    assert_eq!(page.navigations().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ensure_live_replaces_closed_page() {
    let first = FakePage::blank();
    let second = FakePage::blank();
    let (mut session, connector) =
        manager(FakeConnector::new(vec![first.clone(), second.clone()]));

    session.ensure_live().await.unwrap();
    first.with_dom(|dom| dom.closed = true);
    session.ensure_live().await.unwrap();

    assert_eq!(connector.connect_count(), 2);
    assert_eq!(session.reconnect_count(), 1);
    assert_eq!(second.navigations(), vec![HOME.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_with_retry_reconnects_once_on_disconnect() {
    let first = FakePage::blank();
    let second = FakePage::new(HOME);
    let (mut session, connector) =
        manager(FakeConnector::new(vec![first.clone(), second.clone()]));

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let value = session
        .with_retry(3, move |page| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(AutomationError::Page(PageError::TargetClosed(
                        "Target page, context or browser has been closed".to_string(),
                    )))
                } else {
                    Ok(page.current_url().await?)
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(value, HOME);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(session.reconnect_count(), 1);
    assert_eq!(connector.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_with_retry_propagates_other_errors_unchanged() {
    let page = FakePage::blank();
    let (mut session, connector) = manager(FakeConnector::new(vec![page]));

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let err = session
        .with_retry(3, move |_page| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(AutomationError::Application("quota exceeded".to_string())) }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AutomationError::Application(ref m) if m == "quota exceeded"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.reconnect_count(), 0);
    assert_eq!(connector.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_with_retry_gives_up_after_max_attempts() {
    let pages = (0..3).map(|_| FakePage::blank()).collect();
    let (mut session, _connector) = manager(FakeConnector::new(pages));

    let err = session
        .with_retry(2, |_page| async {
            Err::<(), _>(AutomationError::TransientSession("Browser disconnected".to_string()))
        })
        .await
        .unwrap_err();

    assert!(err.is_disconnect());
    assert_eq!(session.reconnect_count(), 1);
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_login_redirect_fails_precondition() {
    let page = FakePage::blank();
    page.with_dom(|dom| {
        dom.redirect = Some("https://accounts.google.com/signin/v2".to_string());
    });
    let (mut session, _connector) = manager(FakeConnector::new(vec![page]));

    let err = session.ensure_live().await.unwrap_err();
    assert!(matches!(err, AutomationError::Precondition(_)));
    assert!(!err.is_retryable());
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_required_element_precondition() {
    let page = FakePage::blank();
    let connector = Arc::new(FakeConnector::new(vec![page.clone()]));
    let mut opts = options();
    opts.login.required = Some(SelectorSet::single("#prompt-textarea"));
    let mut session = SessionManager::new(connector, opts);

    let err = session.ensure_live().await.unwrap_err();
    assert!(err.to_string().contains("signed-in marker not visible"));
}

#[tokio::test(start_paused = true)]
async fn test_precondition_rechecked_after_reconnect() {
    let first = FakePage::blank();
    let second = FakePage::blank();
    second.with_dom(|dom| dom.redirect = Some("https://example.com/login".to_string()));
    let (mut session, _connector) =
        manager(FakeConnector::new(vec![first.clone(), second]));

    session.ensure_live().await.unwrap();
    first.with_dom(|dom| dom.closed = true);

    let err = session.ensure_live().await.unwrap_err();
    assert!(matches!(err, AutomationError::Precondition(_)));
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_browser() {
    let (mut session, _connector) = manager(FakeConnector::unreachable());
    let err = session.ensure_live().await.unwrap_err();
    assert!(matches!(err, AutomationError::Page(PageError::ConnectionFailed(_))));
    assert!(!err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_goto_with_retry() {
    let first = FakePage::blank();
    first.add(FakeElement::new("#anything"));
    let (mut session, _connector) = manager(FakeConnector::new(vec![first.clone()]));

    session
        .goto_with_retry("https://app.example.com/project/1", 3)
        .await
        .unwrap();
    assert_eq!(
        first.navigations(),
        vec![HOME.to_string(), "https://app.example.com/project/1".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_close_keeps_existing_context() {
    let page = FakePage::blank();
    let (mut session, connector) = manager(FakeConnector::new(vec![page.clone()]));

    session.ensure_live().await.unwrap();
    session.close().await;

    assert!(page.is_closed());
    assert!(connector.created_contexts.lock().is_empty());
    assert!(connector.closed_contexts.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_close_removes_created_context() {
    let page = FakePage::blank();
    let (mut session, connector) =
        manager(FakeConnector::new(vec![page.clone()]).without_contexts());

    session.ensure_live().await.unwrap();
    session.close().await;

    assert_eq!(*connector.created_contexts.lock(), vec!["ctx-1".to_string()]);
    assert_eq!(*connector.closed_contexts.lock(), vec!["ctx-1".to_string()]);
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_reuses_created_context() {
    let first = FakePage::blank();
    let second = FakePage::blank();
    let (mut session, connector) =
        manager(FakeConnector::new(vec![first.clone(), second.clone()]).without_contexts());

    session.ensure_live().await.unwrap();
    first.with_dom(|dom| dom.closed = true);
    session.ensure_live().await.unwrap();
    session.close().await;

    assert_eq!(*connector.created_contexts.lock(), vec!["ctx-1".to_string()]);
    assert_eq!(*connector.closed_contexts.lock(), vec!["ctx-1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_releases_vanished_context() {
    let first = FakePage::blank();
    let second = FakePage::blank();
    let (mut session, connector) = manager(
        FakeConnector::new(vec![first.clone(), second.clone()])
            .without_contexts()
            .forgets_created(),
    );

    session.ensure_live().await.unwrap();
    first.with_dom(|dom| dom.closed = true);
    session.ensure_live().await.unwrap();

    assert_eq!(
        *connector.created_contexts.lock(),
        vec!["ctx-1".to_string(), "ctx-2".to_string()]
    );
    assert_eq!(*connector.closed_contexts.lock(), vec!["ctx-1".to_string()]);

    session.close().await;
    assert_eq!(
        *connector.closed_contexts.lock(),
        vec!["ctx-1".to_string(), "ctx-2".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_screenshot_best_effort() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("failure.png");

    let page = FakePage::blank();
    let (mut session, _connector) = manager(FakeConnector::new(vec![page.clone()]));
    assert_eq!(session.screenshot_best_effort(&path).await, None);

    session.ensure_live().await.unwrap();
    assert_eq!(session.screenshot_best_effort(&path).await, Some(path.clone()));
    assert!(path.exists());

    page.with_dom(|dom| dom.closed = true);
    let other = dir.path().join("after-close.png");
    assert_eq!(session.screenshot_best_effort(&other).await, None);
}
