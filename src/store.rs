//! The session store.
//!
//! [`SessionStore`] owns the one authoritative [`AuthState`] of the client.
//! It restores a persisted token at startup, runs the two login flows, arms a
//! single expiry timer per session and tears everything down on logout or
//! expiry, including realtime channels opened on behalf of the session.
//!
//! Operations that change the session are serialized: a login racing a
//! logout settles in call order and never leaves a half-installed session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::AuthBackend;
use crate::config::PortalConfig;
use crate::error::{AuthError, TokenError};
use crate::realtime::{ChannelHandle, ChannelOptions, Connector, EventStream, RealtimeChannel};
use crate::session::{AuthorizationGrant, Permissions, RoleModel, Session};
use crate::storage::TokenStorage;
use crate::token::decode_claims;

const NOTICE_CAPACITY: usize = 16;

/// Authentication state as seen by the rest of the client.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// The persisted token has not been examined yet.
    Initializing,
    /// No session.
    Unauthenticated,
    Authenticated(Arc<Session>),
    /// Restoring the session failed for a reason other than a refused token.
    /// Treated as unauthenticated; the persisted token is kept for a retry.
    Failed(AuthError),
}

impl AuthState {
    pub fn session(&self) -> Option<&Arc<Session>> {
        match self {
            AuthState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }
}

/// Out-of-band events for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// The session reached its token expiry and was cleared.
    Expired { subject_id: String },
}

struct ExpiryTimer {
    generation: u64,
    deadline: OffsetDateTime,
    task: JoinHandle<()>,
}

struct Inner<B, S> {
    backend: B,
    storage: S,
    config: PortalConfig,
    roles: RoleModel,
    state: watch::Sender<AuthState>,
    notices: broadcast::Sender<SessionNotice>,
    // held for the whole of every state-changing operation
    ops: tokio::sync::Mutex<()>,
    expiry: parking_lot::Mutex<Option<ExpiryTimer>>,
    generation: AtomicU64,
    channels: parking_lot::Mutex<Vec<ChannelHandle>>,
    initialized: AtomicBool,
}

/// Client-side session and authorization store.
///
/// Cheap to clone; clones share the same state.
///
/// ```no_run
/// use portal_session::{HttpBackend, MemoryTokenStorage, PortalConfig, SessionStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PortalConfig::from_env()?;
/// let store = SessionStore::new(&config, HttpBackend::new(&config)?, MemoryTokenStorage::new());
///
/// store.initialize().await;
/// let session = store.login("EMP-0042", "hunter2").await?;
/// println!("signed in as {}", session.display_name());
/// # Ok(())
/// # }
/// ```
pub struct SessionStore<B, S> {
    inner: Arc<Inner<B, S>>,
}

impl<B, S> Clone for SessionStore<B, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: AuthBackend, S: TokenStorage> SessionStore<B, S> {
    /// Creates a store in the [`AuthState::Initializing`] state.
    pub fn new(config: &PortalConfig, backend: B, storage: S) -> Self {
        let (state, _) = watch::channel(AuthState::Initializing);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                backend,
                storage,
                config: config.clone(),
                roles: config.roles().clone(),
                state,
                notices,
                ops: tokio::sync::Mutex::new(()),
                expiry: parking_lot::Mutex::new(None),
                generation: AtomicU64::new(0),
                channels: parking_lot::Mutex::new(Vec::new()),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    pub fn storage(&self) -> &S {
        &self.inner.storage
    }

    /// Restores the session from the persisted token.
    ///
    /// Runs once; later calls, or calls after a login or logout already
    /// settled the state, return the current state untouched.
    pub async fn initialize(&self) -> AuthState {
        let inner = &self.inner;
        let _op = inner.ops.lock().await;
        if inner.initialized.swap(true, Ordering::AcqRel) {
            return self.state();
        }

        match inner.restore().await {
            Ok(Some(session)) => {
                let session = inner.install(session);
                info!(subject = %session.subject_id(), role = %session.role(), "session restored");
            }
            Ok(None) => {
                inner.state.send_replace(AuthState::Unauthenticated);
            }
            Err(e) => {
                warn!(error = %e, "could not restore session");
                inner.state.send_replace(AuthState::Failed(e));
            }
        }
        self.state()
    }

    /// Logs in with credentials.
    ///
    /// On failure the state is left as it was and the backend's error
    /// payload is returned unchanged.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<Arc<Session>, AuthError> {
        let inner = &self.inner;
        let _op = inner.ops.lock().await;

        let response = inner.backend.login(identifier, secret).await?;
        let identity = decode_claims(&response.token, &inner.roles)?;
        if identity.is_expired() {
            return Err(TokenError::Expired.into());
        }

        let session = match response.menus {
            Some(grants) => {
                let session = Session::new(identity, response.token, grants);
                match &response.user {
                    Some(profile) => session.with_profile(profile),
                    None => session,
                }
            }
            None if inner.roles.is_elevated(&identity.role) => {
                debug!(role = %identity.role, "elevated token without grants, fetching them");
                let grants = inner.backend.fetch_grants(&response.token).await?;
                Session::new(identity, response.token, grants)
            }
            None => Session::new(identity, response.token, Vec::new()),
        };

        inner.storage.save(session.token(), session.expires_at()).await?;
        let session = inner.install(session);
        info!(
            subject = %session.subject_id(),
            role = %session.role(),
            grants = session.grants().len(),
            "logged in"
        );
        Ok(session)
    }

    /// Signs in by employee id number and email.
    ///
    /// Returns `None` on any failure, including network errors; the state is
    /// left untouched in that case. A verified session carries no grants.
    pub async fn verify_identity(&self, id_number: &str, email: &str) -> Option<Arc<Session>> {
        let inner = &self.inner;
        let _op = inner.ops.lock().await;

        let token = match inner.backend.verify_identity(id_number, email).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                info!("identity verification found no match");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "identity verification failed");
                return None;
            }
        };

        let identity = match decode_claims(&token, &inner.roles) {
            Ok(identity) if !identity.is_expired() => identity,
            Ok(_) => {
                warn!("identity verification returned an expired token");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "identity verification returned an unreadable token");
                return None;
            }
        };

        let session = Session::new(identity, token, Vec::new());
        if let Err(e) = inner.storage.save(session.token(), session.expires_at()).await {
            warn!(error = %e, "could not persist verified token");
            return None;
        }
        let session = inner.install(session);
        info!(subject = %session.subject_id(), "identity verified");
        Some(session)
    }

    /// Ends the session.
    ///
    /// Elevated sessions are reported to the backend first; a failure there
    /// is logged and local teardown proceeds regardless. Calling this with no
    /// session is a no-op apart from clearing the persisted slot.
    pub async fn logout(&self) {
        let inner = &self.inner;
        let _op = inner.ops.lock().await;

        let current = inner.current();
        if let Some(session) = current.as_ref().filter(|s| inner.roles.is_elevated(s.role())) {
            if let Err(e) = inner.backend.logout(session.token()).await {
                warn!(error = %e, "backend logout failed");
            }
        }
        inner.clear_local().await;
        if let Some(session) = current {
            info!(subject = %session.subject_id(), "logged out");
        }
    }

    /// Current state. A session whose expiry has passed is reported as
    /// [`AuthState::Unauthenticated`] even before the timer has fired.
    pub fn state(&self) -> AuthState {
        let state = self.inner.state.borrow().clone();
        match &state {
            AuthState::Authenticated(s) if s.is_expired_at(OffsetDateTime::now_utc()) => {
                AuthState::Unauthenticated
            }
            _ => state,
        }
    }

    /// Receiver observing every state transition.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Receiver for [`SessionNotice`]s emitted after subscribing.
    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.inner.notices.subscribe()
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.state().session().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Grants of the current session; empty when there is none.
    pub fn grants(&self) -> Vec<AuthorizationGrant> {
        self.session().map(|s| s.grants().to_vec()).unwrap_or_default()
    }

    /// Capabilities on `path` for the current session, all false without one.
    pub fn permissions(&self, path: &str) -> Permissions {
        self.session().map(|s| s.permissions(path)).unwrap_or_default()
    }

    /// Time left until the armed expiry timer fires.
    pub fn expiry_remaining(&self) -> Option<Duration> {
        let expiry = self.inner.expiry.lock();
        let timer = expiry.as_ref()?;
        let remaining = timer.deadline - OffsetDateTime::now_utc();
        Some(if remaining.is_positive() {
            remaining.unsigned_abs()
        } else {
            Duration::ZERO
        })
    }

    pub fn timer_armed(&self) -> bool {
        self.inner.expiry.lock().is_some()
    }

    #[cfg(test)]
    fn expiry_task(&self) -> Option<tokio::task::AbortHandle> {
        self.inner.expiry.lock().as_ref().map(|t| t.task.abort_handle())
    }

    /// Opens a realtime channel for the current session.
    ///
    /// The channel joins the subject's group and is closed automatically
    /// when the session ends.
    pub fn open_channel<C: Connector>(
        &self,
        connector: C,
    ) -> Result<(ChannelHandle, EventStream), AuthError> {
        let session = self.session().ok_or(AuthError::Unauthorized)?;
        let config = &self.inner.config;
        let url = config
            .hub_url(session.token())
            .map_err(|e| AuthError::Protocol(e.to_string()))?;
        let options = ChannelOptions::new(url, session.subject_id())
            .with_join_method(config.join_method())
            .with_reconnect(config.reconnect().clone());

        let (handle, events) = RealtimeChannel::open(connector, options);
        self.attach_channel(handle.clone());
        Ok((handle, events))
    }

    /// Ties an externally opened channel to the session's lifetime. Without
    /// a session the channel is closed immediately.
    pub fn attach_channel(&self, handle: ChannelHandle) {
        let mut channels = self.inner.channels.lock();
        if !self.inner.state.borrow().is_authenticated() {
            handle.close();
            return;
        }
        channels.retain(|h| !h.is_closed());
        channels.push(handle);
    }
}

impl<B: AuthBackend, S: TokenStorage> Inner<B, S> {
    fn current(&self) -> Option<Arc<Session>> {
        self.state.borrow().session().cloned()
    }

    async fn restore(&self) -> Result<Option<Session>, AuthError> {
        let Some(token) = self.storage.load().await? else {
            debug!("no persisted token");
            return Ok(None);
        };

        let identity = match decode_claims(&token, &self.roles) {
            Ok(identity) if !identity.is_expired() => identity,
            Ok(_) => {
                info!("persisted token has expired");
                self.discard_token().await;
                return Ok(None);
            }
            Err(e) => {
                warn!(error = %e, "discarding unreadable persisted token");
                self.discard_token().await;
                return Ok(None);
            }
        };

        let grants = if self.roles.is_elevated(&identity.role) {
            match self.backend.fetch_grants(&token).await {
                Ok(grants) => grants,
                Err(AuthError::Unauthorized) => {
                    info!("persisted token refused by backend");
                    self.discard_token().await;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        } else {
            Vec::new()
        };

        Ok(Some(Session::new(identity, token, grants)))
    }

    async fn discard_token(&self) {
        if let Err(e) = self.storage.clear().await {
            warn!(error = %e, "failed to clear persisted token");
        }
    }

    /// Publishes `session` and arms its expiry timer. Caller holds `ops`.
    fn install(self: &Arc<Self>, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.initialized.store(true, Ordering::Release);
        let previous = self.state.send_replace(AuthState::Authenticated(Arc::clone(&session)));
        if previous.is_authenticated() {
            self.close_channels();
        }
        self.arm(&session);
        session
    }

    /// Replaces any armed timer with one firing at the session's expiry.
    fn arm(self: &Arc<Self>, session: &Session) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let deadline = session.expires_at();
        let remaining = deadline - OffsetDateTime::now_utc();
        let delay = if remaining.is_positive() {
            remaining.unsigned_abs()
        } else {
            Duration::ZERO
        };

        let mut slot = self.expiry.lock();
        if let Some(previous) = slot.take() {
            previous.task.abort();
        }

        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(generation).await;
            }
        });
        *slot = Some(ExpiryTimer {
            generation,
            deadline,
            task,
        });
        drop(slot);
        debug!(generation, ?delay, "expiry timer armed");
    }

    async fn expire(&self, generation: u64) {
        let _op = self.ops.lock().await;
        {
            let mut expiry = self.expiry.lock();
            match expiry.as_ref() {
                Some(timer) if timer.generation == generation => {
                    expiry.take();
                }
                _ => return,
            }
        }

        let subject_id = self
            .current()
            .map(|s| s.subject_id().to_string())
            .unwrap_or_default();
        info!(subject = %subject_id, "session expired");
        self.clear_local().await;
        // no subscribers is fine
        let _ = self.notices.send(SessionNotice::Expired { subject_id });
    }

    /// Drops the session without contacting the backend. Caller holds `ops`.
    async fn clear_local(&self) {
        if let Some(timer) = self.expiry.lock().take() {
            timer.task.abort();
        }
        self.initialized.store(true, Ordering::Release);
        self.state.send_replace(AuthState::Unauthenticated);
        self.close_channels();
        self.discard_token().await;
    }

    fn close_channels(&self) {
        let channels = std::mem::take(&mut *self.channels.lock());
        for channel in channels {
            channel.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::ScriptedBackend;
    use crate::backend::LoginResponse;
    use crate::realtime::testing::MockConnector;
    use crate::storage::MemoryTokenStorage;
    use crate::token::testing::token_for;
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;

    type TestStore = SessionStore<Arc<ScriptedBackend>, Arc<MemoryTokenStorage>>;
    type Fixture = (TestStore, Arc<ScriptedBackend>, Arc<MemoryTokenStorage>);

    fn store_with(storage: MemoryTokenStorage) -> Fixture {
        let backend = Arc::new(ScriptedBackend::default());
        let storage = Arc::new(storage);
        let store = SessionStore::new(&PortalConfig::default(), backend.clone(), storage.clone());
        (store, backend, storage)
    }

    fn grants() -> Vec<AuthorizationGrant> {
        serde_json::from_value(json!([
            { "resourcePath": "/admin/dashboard", "canView": true },
            { "resourcePath": "/admin/tickets", "canView": true, "canEdit": true },
        ]))
        .unwrap()
    }

    fn standard_login(token: String) -> Result<LoginResponse, AuthError> {
        Ok(LoginResponse {
            token,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn starts_initializing() {
        let (store, _, _) = store_with(MemoryTokenStorage::new());
        assert_eq!(store.state(), AuthState::Initializing);
        assert!(store.session().is_none());
    }

    #[tokio::test]
    async fn empty_slot_initializes_unauthenticated() {
        let (store, backend, _) = store_with(MemoryTokenStorage::new());

        assert_eq!(store.initialize().await, AuthState::Unauthenticated);
        assert!(backend.calls().is_empty());
        assert!(!store.timer_armed());
    }

    #[tokio::test]
    async fn unreadable_tokens_never_authenticate() {
        for bad in ["", "garbage", "a.b.c", "header.%%%.sig", "e30.e30.sig"] {
            let (store, backend, storage) = store_with(MemoryTokenStorage::with_token(bad));

            assert_eq!(store.initialize().await, AuthState::Unauthenticated, "token {bad:?}");
            assert_eq!(storage.peek(), None, "token {bad:?} should be discarded");
            assert!(backend.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn expired_token_is_discarded_at_startup() {
        let expired = MemoryTokenStorage::with_token(token_for("E1", "employee", -60));
        let (store, _, storage) = store_with(expired);

        assert_eq!(store.initialize().await, AuthState::Unauthenticated);
        assert_eq!(storage.peek(), None);
    }

    #[tokio::test]
    async fn standard_token_restores_without_network() {
        let token = token_for("E1", "employee", 3600);
        let (store, backend, storage) = store_with(MemoryTokenStorage::with_token(token.clone()));

        let state = store.initialize().await;
        let session = state.session().unwrap();
        assert_eq!(session.subject_id(), "E1");
        assert!(session.grants().is_empty());
        assert!(backend.calls().is_empty());
        assert_eq!(storage.peek(), Some(token));
        assert!(store.timer_armed());
    }

    #[tokio::test]
    async fn elevated_token_restores_with_fresh_grants() {
        let saved = MemoryTokenStorage::with_token(token_for("A1", "Admin", 3600));
        let (store, backend, _) = store_with(saved);
        backend.on_grants(Ok(grants()));

        let state = store.initialize().await;
        assert_eq!(state.session().unwrap().grants().len(), 2);
        assert_eq!(backend.calls(), vec!["grants"]);
        assert!(store.permissions("/admin/tickets").can_edit);
    }

    #[tokio::test]
    async fn refused_token_is_cleared_at_startup() {
        let saved = MemoryTokenStorage::with_token(token_for("A1", "admin", 3600));
        let (store, backend, storage) = store_with(saved);
        backend.on_grants(Err(AuthError::Unauthorized));

        assert_eq!(store.initialize().await, AuthState::Unauthenticated);
        assert_eq!(storage.peek(), None);
    }

    #[tokio::test]
    async fn grant_fetch_outage_keeps_token() {
        let token = token_for("A1", "admin", 3600);
        let (store, backend, storage) = store_with(MemoryTokenStorage::with_token(token.clone()));
        backend.on_grants(Err(AuthError::Network("connection refused".into())));

        let state = store.initialize().await;
        assert!(matches!(state, AuthState::Failed(AuthError::Network(_))));
        assert!(!store.is_authenticated());
        assert_eq!(storage.peek(), Some(token));
    }

    #[tokio::test]
    async fn initialize_runs_once() {
        let (store, _, _) = store_with(MemoryTokenStorage::new());
        store.initialize().await;

        store
            .storage()
            .save(&token_for("E1", "employee", 3600), OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert_eq!(store.initialize().await, AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn standard_login_installs_session() {
        let (store, backend, storage) = store_with(MemoryTokenStorage::new());
        store.initialize().await;
        let token = token_for("E7", "employee", 3600);
        backend.on_login(standard_login(token.clone()));

        let session = store.login("E7", "secret").await.unwrap();

        assert_eq!(session.subject_id(), "E7");
        assert_eq!(session.display_name(), "E7 name");
        assert!(session.grants().is_empty());
        assert_eq!(storage.peek(), Some(token));
        assert_eq!(backend.calls(), vec!["login"]);

        let remaining = store.expiry_remaining().unwrap();
        assert!(remaining <= Duration::from_secs(3600));
        assert!(remaining > Duration::from_secs(3590));
    }

    #[tokio::test]
    async fn elevated_login_uses_returned_grants_and_profile() {
        let (store, backend, _) = store_with(MemoryTokenStorage::new());
        backend.on_login(Ok(LoginResponse {
            token: token_for("A1", "admin", 3600),
            user: Some(
                serde_json::from_value(json!({
                    "fullName": "Ana Admin",
                    "email": "ana@school.test"
                }))
                .unwrap(),
            ),
            menus: Some(grants()),
        }));

        let session = store.login("ana", "pw").await.unwrap();

        assert_eq!(session.display_name(), "Ana Admin");
        assert_eq!(session.grants().len(), 2);
        assert_eq!(backend.calls(), vec!["login"]);
    }

    #[tokio::test]
    async fn elevated_token_from_standard_login_fetches_grants() {
        let (store, backend, _) = store_with(MemoryTokenStorage::new());
        backend
            .on_login(standard_login(token_for("A1", "admin", 3600)))
            .on_grants(Ok(grants()));

        let session = store.login("A1", "pw").await.unwrap();
        assert_eq!(session.grants().len(), 2);
        assert_eq!(backend.calls(), vec!["login", "grants"]);
    }

    #[tokio::test]
    async fn rejected_login_keeps_state_and_payload() {
        let (store, backend, storage) = store_with(MemoryTokenStorage::new());
        store.initialize().await;
        let payload = json!({ "message": "Invalid credentials", "attemptsLeft": 2 });
        backend.on_login(Err(AuthError::Rejected {
            status: 400,
            payload: payload.clone(),
        }));

        let err = store.login("E7", "wrong").await.unwrap_err();

        assert_eq!(err, AuthError::Rejected { status: 400, payload });
        assert_eq!(store.state(), AuthState::Unauthenticated);
        assert_eq!(storage.peek(), None);
    }

    #[tokio::test]
    async fn login_with_expired_token_is_refused() {
        let (store, backend, storage) = store_with(MemoryTokenStorage::new());
        backend.on_login(standard_login(token_for("E7", "employee", -5)));

        let err = store.login("E7", "pw").await.unwrap_err();
        assert_eq!(err, AuthError::InvalidToken(TokenError::Expired));
        assert_eq!(storage.peek(), None);
    }

    #[tokio::test]
    async fn verify_identity_installs_session_without_grants() {
        let (store, backend, storage) = store_with(MemoryTokenStorage::new());
        let token = token_for("E9", "employee", 3600);
        backend.on_verify(Ok(Some(token.clone())));

        let session = store.verify_identity("2020-0001", "e9@school.test").await.unwrap();

        assert_eq!(session.subject_id(), "E9");
        assert!(session.grants().is_empty());
        assert_eq!(storage.peek(), Some(token));
    }

    #[tokio::test]
    async fn verify_identity_failures_return_none() {
        let (store, backend, storage) = store_with(MemoryTokenStorage::new());
        store.initialize().await;
        backend
            .on_verify(Ok(None))
            .on_verify(Err(AuthError::Network("timeout".into())))
            .on_verify(Ok(Some("not-a-token".into())));

        for _ in 0..3 {
            assert!(store.verify_identity("x", "y").await.is_none());
        }
        assert_eq!(store.state(), AuthState::Unauthenticated);
        assert_eq!(storage.peek(), None);
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let (store, backend, storage) = store_with(MemoryTokenStorage::new());
        backend.on_login(standard_login(token_for("E1", "employee", 3600)));
        store.login("E1", "pw").await.unwrap();

        store.logout().await;
        let after_first = (store.state(), storage.peek(), store.timer_armed());
        store.logout().await;
        let after_second = (store.state(), storage.peek(), store.timer_armed());

        assert_eq!(after_first, (AuthState::Unauthenticated, None, false));
        assert_eq!(after_first, after_second);
        assert_eq!(backend.calls(), vec!["login"]);
    }

    #[tokio::test]
    async fn elevated_logout_notifies_backend() {
        let (store, backend, _) = store_with(MemoryTokenStorage::new());
        backend.on_login(Ok(LoginResponse {
            token: token_for("A1", "admin", 3600),
            user: None,
            menus: Some(Vec::new()),
        }));
        store.login("A1", "pw").await.unwrap();

        store.logout().await;
        assert_eq!(backend.calls(), vec!["login", "logout"]);
    }

    #[tokio::test(start_paused = true)]
    async fn session_expires_on_schedule() {
        let (store, backend, storage) = store_with(MemoryTokenStorage::new());
        let mut notices = store.notices();
        backend.on_login(standard_login(token_for("E1", "employee", 3600)));
        store.login("E1", "pw").await.unwrap();

        let started = tokio::time::Instant::now();
        let notice = notices.recv().await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(3590));
        assert_eq!(notice, SessionNotice::Expired { subject_id: "E1".into() });
        assert_eq!(store.state(), AuthState::Unauthenticated);
        assert_eq!(storage.peek(), None);
        assert!(!store.timer_armed());

        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(notices.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn relogin_replaces_timer() {
        let (store, backend, _) = store_with(MemoryTokenStorage::new());
        let mut notices = store.notices();
        backend
            .on_login(standard_login(token_for("E1", "employee", 60)))
            .on_login(standard_login(token_for("E2", "employee", 600)));
        store.login("E1", "pw").await.unwrap();
        store.login("E2", "pw").await.unwrap();

        let started = tokio::time::Instant::now();
        let notice = notices.recv().await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(590));
        assert_eq!(notice, SessionNotice::Expired { subject_id: "E2".into() });
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(notices.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn relogin_aborts_previous_timer() {
        let (store, backend, _) = store_with(MemoryTokenStorage::new());
        backend
            .on_login(standard_login(token_for("E1", "employee", 60)))
            .on_login(standard_login(token_for("E1", "employee", 120)));
        store.login("E1", "pw").await.unwrap();
        let first = store.expiry_task().unwrap();

        store.login("E1", "pw").await.unwrap();
        let second = store.expiry_task().unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(first.is_finished());
        assert!(!second.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn logout_cancels_timer() {
        let (store, backend, _) = store_with(MemoryTokenStorage::new());
        let mut notices = store.notices();
        backend
            .on_login(standard_login(token_for("E1", "employee", 60)))
            .on_login(standard_login(token_for("E1", "employee", 120)));
        store.login("E1", "pw").await.unwrap();
        store.login("E1", "pw").await.unwrap();
        store.logout().await;

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(notices.try_recv(), Err(TryRecvError::Empty));
        assert!(!store.timer_armed());
    }

    #[tokio::test]
    async fn logout_closes_session_channels() {
        let (store, backend, _) = store_with(MemoryTokenStorage::new());
        backend.on_login(standard_login(token_for("E1", "employee", 3600)));
        store.login("E1", "pw").await.unwrap();
        let (connector, _servers) = MockConnector::new(0);

        let (handle, _events) = store.open_channel(connector).unwrap();
        assert!(!handle.is_closed());

        store.logout().await;
        assert!(handle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_closes_session_channels() {
        let (store, backend, _) = store_with(MemoryTokenStorage::new());
        let mut notices = store.notices();
        backend.on_login(standard_login(token_for("E1", "employee", 60)));
        store.login("E1", "pw").await.unwrap();
        let (connector, _servers) = MockConnector::new(0);

        let (handle, mut events) = store.open_channel(connector).unwrap();
        assert!(!handle.is_closed());

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice, SessionNotice::Expired { subject_id: "E1".into() });
        assert!(handle.is_closed());
        assert_eq!(events.recv().await, None);
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn channels_need_a_session() {
        let (store, _, _) = store_with(MemoryTokenStorage::new());
        store.initialize().await;
        let (connector, _servers) = MockConnector::new(0);

        let err = store.open_channel(connector).unwrap_err();
        assert_eq!(err, AuthError::Unauthorized);
    }
}
