mod support;

use std::sync::Arc;
use std::time::Duration;

use tradelink_auth::{
    AuthErrorKind, ProviderError, Role, can_access, can_edit_record, resolve_landing_path,
};
use tradelink_session::{
    ActivityEvent, AuthEvent, BootStatus, GuardDecision, RouteGuard, SessionConfig, SignIn,
};

use support::{
    FakeProvider, FakeResolver, Harness, PREFERENCES_KEY, Scripted, identity, seeded_store,
    session_for,
};

const WINDOW: Duration = Duration::from_secs(3 * 60 * 60);

fn signed_in(role: Role) -> (Harness, tradelink_auth::Identity) {
    let who = identity(role);
    let harness = Harness::with_parts(
        FakeProvider::new(),
        FakeResolver::with_profile(&who),
        seeded_store(),
        SessionConfig::default().with_inactivity_window(WINDOW),
    );
    harness.provider.queue_sign_in(Scripted::now(Ok(SignIn {
        session: session_for(&who),
        identity: who.clone(),
    })));
    (harness, who)
}

#[tokio::test(start_paused = true)]
async fn sales_login_lands_on_sales_dashboard_and_is_kept_out_of_admin() {
    let (harness, sales) = signed_in(Role::Sales);

    let identity = harness.facade.login(&sales.email, "hunter2").await.unwrap();

    assert_eq!(resolve_landing_path(Some(identity.role)), "/sales/dashboard");
    assert_eq!(
        harness.facade.evaluate(&RouteGuard::new([Role::Admin])),
        GuardDecision::Forbidden {
            redirect: "/sales/dashboard"
        }
    );
    assert_eq!(
        harness.facade.evaluate(&RouteGuard::new([Role::Sales])),
        GuardDecision::Authorized
    );

    let snapshot = harness.facade.snapshot();
    assert!(snapshot.is_authenticated());
    assert!(can_access(snapshot.identity.as_ref(), "orders.create"));
    assert!(!can_access(snapshot.identity.as_ref(), "users.manage"));
    assert!(can_edit_record(snapshot.identity.as_ref(), &sales.email));
    assert!(!can_edit_record(snapshot.identity.as_ref(), "other@tradelink.test"));
}

#[tokio::test(start_paused = true)]
async fn inactive_admin_is_forbidden_despite_role_match() {
    let admin = identity(Role::Admin).deactivated();
    let harness = Harness::new(SessionConfig::default());
    harness.provider.queue_sign_in(Scripted::now(Ok(SignIn {
        session: session_for(&admin),
        identity: admin.clone(),
    })));

    harness.facade.login(&admin.email, "pw").await.unwrap();

    assert_eq!(
        harness.facade.evaluate(&RouteGuard::new([Role::Admin])),
        GuardDecision::Forbidden { redirect: "/login" }
    );
}

#[tokio::test(start_paused = true)]
async fn invalid_credentials_are_returned_and_published() {
    let harness = Harness::new(SessionConfig::default());
    harness
        .provider
        .queue_sign_in(Scripted::now(Err(ProviderError::invalid_credentials())));

    let error = harness.facade.login("nobody@tradelink.test", "wrong").await.unwrap_err();

    assert_eq!(error.kind(), AuthErrorKind::InvalidCredentials);
    assert!(!error.retryable());
    let snapshot = harness.facade.snapshot();
    assert_eq!(snapshot.error.as_ref(), Some(&error));
    assert!(snapshot.has_error());
    assert!(snapshot.identity.is_none());
}

#[tokio::test(start_paused = true)]
async fn logout_clears_local_state_before_remote_sign_out_finishes() {
    let (harness, sales) = signed_in(Role::Sales);
    harness.facade.login(&sales.email, "pw").await.unwrap();
    harness
        .provider
        .sign_out_answer(Scripted::after(Duration::from_secs(60), Ok(())));

    let facade = harness.facade.clone();
    let logout = tokio::spawn(async move { facade.logout().await });
    tokio::time::sleep(Duration::from_secs(1)).await;

    let snapshot = harness.facade.snapshot();
    assert_eq!(snapshot.status, BootStatus::Ready);
    assert!(snapshot.identity.is_none());
    assert!(snapshot.session.is_none());
    assert!(!harness.token_present());
    assert_eq!(harness.store.peek("auth-user-storage"), None);
    assert!(!logout.is_finished());

    logout.await.unwrap();
    assert_eq!(harness.provider.sign_out_calls(), 1);
    assert_eq!(
        harness.facade.evaluate(&RouteGuard::any_role()),
        GuardDecision::Unauthenticated
    );
}

#[tokio::test(start_paused = true)]
async fn failed_remote_sign_out_still_logs_out() {
    let (harness, admin) = signed_in(Role::Admin);
    harness.facade.login(&admin.email, "pw").await.unwrap();
    harness
        .provider
        .sign_out_answer(Scripted::now(Err(ProviderError::network("network down"))));

    harness.facade.logout().await;

    assert!(harness.facade.snapshot().identity.is_none());
    assert!(!harness.facade.snapshot().has_error());
}

#[tokio::test(start_paused = true)]
async fn idle_window_forces_logout() {
    let (harness, delivery) = signed_in(Role::Delivery);
    harness.facade.login(&delivery.email, "pw").await.unwrap();

    tokio::time::sleep(WINDOW - Duration::from_secs(1)).await;
    assert!(harness.facade.snapshot().is_authenticated());

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(harness.facade.snapshot().identity.is_none());
    assert_eq!(harness.provider.sign_out_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn activity_keeps_the_session_alive() {
    let (harness, finance) = signed_in(Role::Finance);
    harness.facade.login(&finance.email, "pw").await.unwrap();

    for event in [ActivityEvent::Pointer, ActivityEvent::Scroll, ActivityEvent::Touch] {
        tokio::time::sleep(WINDOW - Duration::from_secs(600)).await;
        harness.facade.record_activity(event);
    }
    tokio::time::sleep(WINDOW - Duration::from_secs(600)).await;

    assert!(harness.facade.snapshot().is_authenticated());
    assert_eq!(harness.provider.sign_out_calls(), 0);

    tokio::time::sleep(Duration::from_secs(601)).await;
    assert!(harness.facade.snapshot().identity.is_none());
}

#[tokio::test(start_paused = true)]
async fn no_idle_logout_while_signed_out() {
    let harness = Harness::new(SessionConfig::default().with_inactivity_window(WINDOW));
    harness.facade.start().await;

    tokio::time::sleep(WINDOW * 2).await;

    assert_eq!(harness.provider.sign_out_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn refresh_failure_logs_out_and_reports() {
    let (harness, sales) = signed_in(Role::Sales);
    harness.facade.login(&sales.email, "pw").await.unwrap();
    harness
        .provider
        .queue_refresh(Scripted::now(Err(ProviderError::session_expired())));

    let error = harness.facade.refresh_session().await.unwrap_err();

    assert_eq!(error.kind(), AuthErrorKind::SessionExpired);
    let snapshot = harness.facade.snapshot();
    assert!(snapshot.identity.is_none());
    assert_eq!(snapshot.error.map(|e| e.kind()), Some(AuthErrorKind::SessionExpired));
    assert_eq!(harness.provider.sign_out_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_success_rehydrates_from_the_new_session() {
    let (harness, admin) = signed_in(Role::Admin);
    harness.facade.login(&admin.email, "pw").await.unwrap();
    let refreshed = session_for(&admin).with_refresh_token("rotated");
    harness
        .provider
        .queue_refresh(Scripted::now(Ok(Some(refreshed.clone()))));
    harness
        .provider
        .always_session(Scripted::now(Ok(Some(refreshed.clone()))));

    harness.facade.refresh_session().await.unwrap();

    let snapshot = harness.facade.snapshot();
    assert_eq!(snapshot.identity.as_ref(), Some(&admin));
    assert_eq!(snapshot.session, Some(refreshed));
    assert_eq!(harness.resolver.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn signed_out_event_resets_to_unauthenticated() {
    let (harness, sales) = signed_in(Role::Sales);
    harness.facade.login(&sales.email, "pw").await.unwrap();

    harness.facade.handle_auth_event(AuthEvent::SignedOut).await;

    let snapshot = harness.facade.snapshot();
    assert_eq!(snapshot.status, BootStatus::Ready);
    assert!(snapshot.identity.is_none());
    assert!(!harness.token_present());
    assert!(harness.store.peek(PREFERENCES_KEY).is_some());
    assert_eq!(
        harness.facade.evaluate(&RouteGuard::any_role()),
        GuardDecision::Unauthenticated
    );
}

#[tokio::test(start_paused = true)]
async fn signed_in_event_rehydrates() {
    let delivery = identity(Role::Delivery);
    let harness = Harness::with_parts(
        FakeProvider::new(),
        FakeResolver::with_profile(&delivery),
        seeded_store(),
        SessionConfig::default(),
    );
    harness.facade.start().await;
    assert!(harness.facade.snapshot().identity.is_none());

    harness
        .provider
        .always_session(Scripted::now(Ok(Some(session_for(&delivery)))));
    harness.facade.handle_auth_event(AuthEvent::SignedIn).await;

    assert_eq!(harness.facade.snapshot().user_role(), Some(Role::Delivery));
}

#[tokio::test(start_paused = true)]
async fn boot_failure_offers_retry_and_retry_recovers() {
    let admin = identity(Role::Admin);
    let harness = Harness::with_parts(
        FakeProvider::new(),
        FakeResolver::with_profile(&admin),
        seeded_store(),
        SessionConfig::default(),
    );
    harness
        .provider
        .queue_session(Scripted::after(Duration::from_secs(11), Ok(None)));
    harness
        .provider
        .always_session(Scripted::now(Ok(Some(session_for(&admin)))));

    harness.facade.start().await;
    match harness.facade.evaluate(&RouteGuard::any_role()) {
        GuardDecision::BootFailed(error) => assert!(error.retryable()),
        other => panic!("expected BootFailed, got {other:?}"),
    }

    harness.facade.retry_boot().await;
    assert_eq!(
        harness.facade.evaluate(&RouteGuard::new([Role::Admin])),
        GuardDecision::Authorized
    );
}

#[tokio::test(start_paused = true)]
async fn logout_during_login_cache_write_leaves_no_identity_cached() {
    let who = identity(Role::Sales);
    let harness = Harness::with_slow_writes(
        FakeProvider::new(),
        FakeResolver::with_profile(&who),
        Duration::from_secs(1),
        SessionConfig::default().with_inactivity_window(WINDOW),
    );
    harness.provider.queue_sign_in(Scripted::now(Ok(SignIn {
        session: session_for(&who),
        identity: who.clone(),
    })));

    let facade = Arc::clone(&harness.facade);
    let email = who.email.clone();
    let login = tokio::spawn(async move { facade.login(&email, "hunter2").await });
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(harness.facade.snapshot().is_authenticated());

    harness.facade.logout().await;
    assert!(login.await.unwrap().is_ok());

    assert!(harness.facade.snapshot().identity.is_none());
    assert_eq!(harness.store.peek("auth-user-storage"), None);
    assert!(!harness.token_present());
    assert!(harness.store.peek(PREFERENCES_KEY).is_some());
}
