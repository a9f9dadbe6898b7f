//! Client session state machine
//!
//! ```text
//! Anonymous -> Authenticating -> MfaRequired -> VerifyingMfa -> Authenticated
//!                             \____________________________/        |
//!                                                      TokenRefreshing | SessionExpiring
//!                                                                     |
//!                                                                 Anonymous
//! ```
//!
//! The machine owns the current [`Session`], the pending [`MfaChallenge`],
//! and the two timers that keep a session alive: the refresh scheduler and
//! the idle checker. Both timers only hold a weak reference back to the
//! machine.
//!
//! Every session carries a generation number. Anything that ends a session
//! (logout, idle timeout, refresh failure, a new sign-in) bumps it, and every
//! network completion re-checks it before touching state, so a response that
//! arrives after the session it belonged to is dropped on the floor.

use crate::api::AuthApi;
use crate::clock::{Clock, SystemClock};
use crate::events::{EventBus, SessionEvent, SignOutReason, Subscription};
use crate::store::{TokenStorage, TokenStore};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tollgate_core::wire::{LoginRequest, MfaVerifyRequest, RegisterRequest, RegisterResponse};
use tollgate_core::{
    AuthError, AuthFailure, AuthResult, MfaChallenge, MfaMethod, Session, SessionConfig,
    UserProfile,
};
use tracing::{debug, info, warn};

pub const IDLE_TIMEOUT_MESSAGE: &str =
    "Your session timed out due to inactivity. Please log back in.";
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired";

/// Used when the server omits a challenge expiry
const DEFAULT_CHALLENGE_TTL_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthState {
    Anonymous,
    Authenticating,
    MfaRequired,
    VerifyingMfa,
    Authenticated,
    TokenRefreshing,
    SessionExpiring,
}

#[derive(Default)]
struct Timers {
    refresh: Option<JoinHandle<()>>,
    activity: Option<JoinHandle<()>>,
}

impl Timers {
    fn abort_all(&mut self) {
        if let Some(handle) = self.refresh.take() {
            handle.abort();
        }
        if let Some(handle) = self.activity.take() {
            handle.abort();
        }
    }

    fn is_running(&self) -> bool {
        let running = |h: &Option<JoinHandle<()>>| h.as_ref().is_some_and(|h| !h.is_finished());
        running(&self.refresh) || running(&self.activity)
    }
}

struct Shared {
    state: AuthState,
    session: Option<Session>,
    user: Option<UserProfile>,
    challenge: Option<MfaChallenge>,
    last_error: Option<AuthFailure>,
    generation: u64,
    timers: Timers,
}

struct Inner {
    api: Arc<dyn AuthApi>,
    store: TokenStore,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    events: EventBus<SessionEvent>,
    shared: Mutex<Shared>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        match self.shared.get_mut() {
            Ok(shared) => shared.timers.abort_all(),
            Err(poisoned) => poisoned.into_inner().timers.abort_all(),
        }
    }
}

/// Cheap to clone; clones drive the same session
#[derive(Clone)]
pub struct AuthSessionMachine {
    inner: Arc<Inner>,
}

impl AuthSessionMachine {
    pub fn new(
        api: Arc<dyn AuthApi>,
        storage: Arc<dyn TokenStorage>,
        config: SessionConfig,
    ) -> Self {
        Self::with_clock(api, storage, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        api: Arc<dyn AuthApi>,
        storage: Arc<dyn TokenStorage>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        let store = TokenStore::new(storage, clock.clone());
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                clock,
                config,
                events: EventBus::new(),
                shared: Mutex::new(Shared {
                    state: AuthState::Anonymous,
                    session: None,
                    user: None,
                    challenge: None,
                    last_error: None,
                    generation: 0,
                    timers: Timers::default(),
                }),
            }),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    pub fn state(&self) -> AuthState {
        self.shared().state
    }

    /// Current session, if it has not expired
    pub fn session(&self) -> Option<Session> {
        let now = self.inner.clock.now();
        self.shared()
            .session
            .clone()
            .filter(|session| session.is_valid_at(now))
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.shared().user.clone()
    }

    /// Method and expiry of the pending second-factor challenge
    pub fn pending_mfa(&self) -> Option<(MfaMethod, DateTime<Utc>)> {
        self.shared()
            .challenge
            .as_ref()
            .map(|c| (c.method, c.expires_at))
    }

    pub fn last_error(&self) -> Option<AuthFailure> {
        self.shared().last_error.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.store.get()
    }

    /// Record user activity for the idle checker
    pub fn touch_activity(&self) {
        self.inner.store.touch_activity();
    }

    /// Sign in with email and password
    ///
    /// An existing session is signed out first. When the account has a second
    /// factor the machine parks in `MfaRequired` and the returned token is the
    /// challenge token, not an access token.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult {
        let (busy, has_session) = {
            let s = self.shared();
            (
                matches!(s.state, AuthState::Authenticating | AuthState::VerifyingMfa),
                s.session.is_some(),
            )
        };
        if busy {
            return AuthResult::failure(AuthError::BadRequest(
                "A sign-in is already in progress".to_string(),
            ));
        }
        if has_session {
            self.sign_out(SignOutReason::Replaced).await;
        }

        let generation = {
            let mut s = self.shared();
            s.generation += 1;
            s.state = AuthState::Authenticating;
            s.challenge = None;
            s.last_error = None;
            s.generation
        };

        info!(email, "Signing in");
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let outcome = self.inner.api.login(&request).await;

        let mut events = Vec::new();
        let result = {
            let mut s = self.shared();
            if s.generation != generation {
                debug!("Discarding superseded sign-in result");
                return AuthResult::failure(AuthError::Cancelled);
            }

            match outcome {
                Ok(resp) if resp.requires_mfa => {
                    let now = self.inner.clock.now();
                    let method = resp.mfa_method.unwrap_or(MfaMethod::Totp);
                    let expires_at = resp.expires_at.unwrap_or_else(|| {
                        now + chrono::Duration::seconds(DEFAULT_CHALLENGE_TTL_SECS)
                    });
                    s.challenge = Some(MfaChallenge {
                        temp_token: resp.token.clone(),
                        method,
                        expires_at,
                    });
                    s.state = AuthState::MfaRequired;
                    info!(user_id = %resp.user.id, %method, "Second factor required");
                    events.push(SessionEvent::MfaRequired { method, expires_at });
                    AuthResult::Success {
                        user: resp.user,
                        token: resp.token,
                        requires_mfa: true,
                    }
                }
                Ok(resp) => match resp.expires_at {
                    Some(expires_at) => self.establish(
                        &mut s,
                        resp.user,
                        resp.token,
                        resp.refresh_token,
                        expires_at,
                        &mut events,
                    ),
                    None => self.fail(
                        &mut s,
                        AuthError::Internal("Sign-in response carried no token expiry".to_string()),
                        &mut events,
                    ),
                },
                Err(err) => self.fail(&mut s, err, &mut events),
            }
        };

        self.emit_all(events);
        result
    }

    /// Answer the pending second-factor challenge
    ///
    /// A wrong code keeps the challenge so the user can try again. An expired
    /// or rejected challenge drops back to `Anonymous`.
    pub async fn verify_mfa(&self, code: &str, is_backup_code: bool) -> AuthResult {
        let (challenge, generation) = {
            let mut s = self.shared();
            let pending = match (&s.state, &s.challenge) {
                (AuthState::MfaRequired, Some(challenge)) => challenge.clone(),
                _ => {
                    return AuthResult::failure(AuthError::BadRequest(
                        "No verification challenge is pending".to_string(),
                    ))
                }
            };

            if pending.is_expired_at(self.inner.clock.now()) {
                let mut events = Vec::new();
                let result = self.fail(&mut s, AuthError::MfaChallengeExpired, &mut events);
                drop(s);
                self.emit_all(events);
                return result;
            }

            s.state = AuthState::VerifyingMfa;
            (pending, s.generation)
        };

        let request = MfaVerifyRequest {
            method: challenge.method,
            code: code.trim().to_string(),
            is_backup_code,
        };
        let outcome = self
            .inner
            .api
            .verify_mfa(&challenge.temp_token, &request)
            .await;

        let mut events = Vec::new();
        let result = {
            let mut s = self.shared();
            if s.generation != generation {
                debug!("Discarding verification result for an abandoned challenge");
                return AuthResult::failure(AuthError::Cancelled);
            }

            match outcome {
                Ok(resp) => {
                    if let Some(left) = resp.backup_codes_remaining {
                        info!(backup_codes_remaining = left, "Backup code consumed");
                    }
                    self.establish(
                        &mut s,
                        resp.user,
                        resp.token,
                        resp.refresh_token,
                        resp.expires_at,
                        &mut events,
                    )
                }
                Err(AuthError::MfaChallengeExpired) | Err(AuthError::InvalidToken(_)) => {
                    self.fail(&mut s, AuthError::MfaChallengeExpired, &mut events)
                }
                Err(err) => {
                    warn!(error = %err, "Second-factor verification failed");
                    let failure = AuthFailure::from(err);
                    s.state = AuthState::MfaRequired;
                    s.last_error = Some(failure.clone());
                    events.push(SessionEvent::AuthFailed(failure.clone()));
                    AuthResult::Failure(failure)
                }
            }
        };

        self.emit_all(events);
        result
    }

    /// Abandon the pending challenge; an in-flight verification is discarded
    pub fn cancel_mfa(&self) {
        let mut s = self.shared();
        if matches!(s.state, AuthState::MfaRequired | AuthState::VerifyingMfa) {
            s.generation += 1;
            s.challenge = None;
            s.state = AuthState::Anonymous;
            debug!("Second-factor challenge cancelled");
        }
    }

    /// Sign out; always ends in `Anonymous`, backend failures are only logged
    pub async fn logout(&self) {
        {
            let mut s = self.shared();
            s.last_error = None;
        }
        self.sign_out(SignOutReason::UserInitiated).await;
    }

    /// Refresh the access token now instead of waiting for the scheduler
    pub async fn refresh_now(&self) -> AuthResult {
        let generation = self.shared().generation;
        self.refresh_generation(generation).await
    }

    /// Create an unconfirmed account; no session is started
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<String>,
    ) -> Result<RegisterResponse, AuthError> {
        let request = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            name,
        };
        let response = self.inner.api.register(&request).await?;
        info!(user_id = %response.user.id, "Account registered, awaiting email verification");
        Ok(response)
    }

    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        self.inner.api.resend_verification(email).await
    }

    /// Resume timers, or restore a persisted session
    ///
    /// A stored token is restored only if it has not expired and the idle
    /// ceiling has not passed; the server then confirms it by returning the
    /// current user. Returns whether a session is active afterwards.
    pub async fn start(&self) -> bool {
        let now = self.inner.clock.now();
        let (stored, generation) = {
            let mut s = self.shared();
            match s.state {
                AuthState::Anonymous => {}
                AuthState::Authenticated
                | AuthState::TokenRefreshing
                | AuthState::SessionExpiring => {
                    if !s.timers.is_running() {
                        self.start_timers(&mut s);
                    }
                    return s.session.is_some();
                }
                _ => return false,
            }

            let Some(stored) = self.inner.store.snapshot() else {
                return false;
            };
            let idle_exceeded = stored
                .last_activity
                .is_some_and(|at| now - at > self.idle_ceiling());
            if stored.expires_at <= now || idle_exceeded {
                debug!(idle_exceeded, "Persisted session is stale, discarding it");
                self.inner.store.clear();
                return false;
            }

            s.generation += 1;
            s.state = AuthState::Authenticating;
            (stored, s.generation)
        };

        let outcome = self.inner.api.current_user(&stored.access_token).await;

        let mut events = Vec::new();
        let restored = {
            let mut s = self.shared();
            if s.generation != generation {
                return false;
            }

            let session = outcome.and_then(|user| {
                Session::new(
                    &user,
                    stored.access_token.clone(),
                    stored.refresh_token.clone(),
                    self.inner.clock.now(),
                    stored.expires_at,
                )
                .map(|session| (user, session))
            });

            match session {
                Ok((user, session)) => {
                    info!(user_id = %user.id, "Restored persisted session");
                    events.push(SessionEvent::SignedIn {
                        user_id: user.id.clone(),
                        expires_at: session.expires_at(),
                    });
                    s.user = Some(user);
                    s.session = Some(session);
                    s.state = AuthState::Authenticated;
                    self.start_timers(&mut s);
                    true
                }
                Err(err) => {
                    warn!(error = %err, "Persisted session rejected, discarding it");
                    s.state = AuthState::Anonymous;
                    self.inner.store.clear();
                    false
                }
            }
        };

        self.emit_all(events);
        restored
    }

    /// Stop the timers; the session itself is kept
    pub fn stop(&self) {
        self.shared().timers.abort_all();
    }

    async fn sign_out(&self, reason: SignOutReason) {
        let mut events = Vec::new();
        let token = {
            let mut s = self.shared();
            self.end_locked(&mut s, reason, &mut events)
        };
        self.emit_all(events);

        if let Some(token) = token {
            match self.inner.api.logout(&token).await {
                Ok(()) => debug!("Backend session revoked"),
                Err(err) => warn!(error = %err, "Backend sign-out failed; local session already cleared"),
            }
        }
        info!(?reason, "Signed out");
    }

    async fn refresh_generation(&self, generation: u64) -> AuthResult {
        let (access_token, refresh_token) = {
            let mut s = self.shared();
            if s.generation != generation {
                return AuthResult::failure(AuthError::Cancelled);
            }
            if s.state == AuthState::SessionExpiring {
                return AuthResult::failure(AuthError::Cancelled);
            }
            if s.state == AuthState::TokenRefreshing {
                return AuthResult::failure(AuthError::BadRequest(
                    "A token refresh is already in progress".to_string(),
                ));
            }
            let Some(session) = s.session.as_ref() else {
                return AuthResult::failure(AuthError::SessionExpired(
                    "No active session".to_string(),
                ));
            };
            let tokens = (
                session.access_token().to_string(),
                session.refresh_token().map(str::to_string),
            );
            s.state = AuthState::TokenRefreshing;
            tokens
        };

        debug!("Refreshing access token");
        let outcome = self
            .inner
            .api
            .refresh(&access_token, refresh_token.as_deref())
            .await;

        let mut events = Vec::new();
        let result = {
            let mut s = self.shared();
            if s.generation != generation {
                debug!("Discarding refresh result for a session that already ended");
                return AuthResult::failure(AuthError::Cancelled);
            }
            if s.state == AuthState::SessionExpiring {
                debug!("Discarding refresh result for a session being signed out");
                return AuthResult::failure(AuthError::Cancelled);
            }

            let now = self.inner.clock.now();
            let renewed = outcome.and_then(|resp| {
                let session = s
                    .session
                    .as_ref()
                    .ok_or_else(|| AuthError::SessionExpired(SESSION_EXPIRED_MESSAGE.to_string()))?
                    .with_token(
                        resp.token.clone(),
                        resp.refresh_token.clone(),
                        now,
                        resp.expires_at,
                    )?;
                Ok((resp, session))
            });

            match renewed {
                Ok((resp, session)) => {
                    self.inner.store.set(resp.token.clone(), resp.expires_at);
                    if resp.refresh_token.is_some() {
                        self.inner.store.set_refresh_token(resp.refresh_token);
                    }
                    s.session = Some(session);
                    s.state = AuthState::Authenticated;
                    let next = self.spawn_refresh(resp.expires_at, generation);
                    if let Some(previous) = s.timers.refresh.replace(next) {
                        previous.abort();
                    }
                    info!(expires_at = %resp.expires_at, "Access token refreshed");
                    events.push(SessionEvent::Refreshed {
                        expires_at: resp.expires_at,
                    });
                    match s.user.clone() {
                        Some(user) => AuthResult::Success {
                            user,
                            token: resp.token,
                            requires_mfa: false,
                        },
                        None => self.expire(
                            &mut s,
                            AuthError::Internal("Session has no user profile".to_string()),
                            SignOutReason::SessionExpired,
                            SESSION_EXPIRED_MESSAGE,
                            &mut events,
                        ),
                    }
                }
                Err(err) => self.expire(
                    &mut s,
                    err,
                    SignOutReason::SessionExpired,
                    SESSION_EXPIRED_MESSAGE,
                    &mut events,
                ),
            }
        };

        self.emit_all(events);
        result
    }

    /// One idle-checker tick; returns whether the checker should keep running
    ///
    /// An idle session sits in `SessionExpiring` while the backend revokes
    /// it, then drops to `Anonymous`.
    async fn check_activity(&self, generation: u64) -> bool {
        let mut events = Vec::new();
        let idle_token = {
            let mut s = self.shared();
            if s.generation != generation || s.session.is_none() {
                return false;
            }

            let now = self.inner.clock.now();
            let idle = self.inner.store.last_activity().map(|at| now - at);

            if idle.is_some_and(|idle| idle > self.idle_ceiling()) {
                info!(
                    idle_secs = idle.map(|d| d.num_seconds()).unwrap_or_default(),
                    "Session idle past the ceiling, signing out"
                );
                s.state = AuthState::SessionExpiring;
                if let Some(handle) = s.timers.refresh.take() {
                    handle.abort();
                }
                s.session.as_ref().map(|x| x.access_token().to_string())
            } else if s
                .session
                .as_ref()
                .is_some_and(|session| !session.is_valid_at(now))
            {
                self.expire(
                    &mut s,
                    AuthError::SessionExpired(SESSION_EXPIRED_MESSAGE.to_string()),
                    SignOutReason::SessionExpired,
                    SESSION_EXPIRED_MESSAGE,
                    &mut events,
                );
                None
            } else {
                return true;
            }
        };
        self.emit_all(events);

        let Some(token) = idle_token else {
            return false;
        };
        if let Err(err) = self.inner.api.logout(&token).await {
            warn!(error = %err, "Backend sign-out failed after session timeout");
        }

        let mut events = Vec::new();
        {
            let mut s = self.shared();
            // A logout or new sign-in during the backend call already moved on
            if s.generation == generation {
                self.expire(
                    &mut s,
                    AuthError::SessionExpired(IDLE_TIMEOUT_MESSAGE.to_string()),
                    SignOutReason::IdleTimeout,
                    IDLE_TIMEOUT_MESSAGE,
                    &mut events,
                );
            }
        }
        self.emit_all(events);
        false
    }

    fn establish(
        &self,
        s: &mut Shared,
        user: UserProfile,
        token: String,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
        events: &mut Vec<SessionEvent>,
    ) -> AuthResult {
        let now = self.inner.clock.now();
        let session = match Session::new(&user, token.clone(), refresh_token.clone(), now, expires_at)
        {
            Ok(session) => session,
            Err(err) => return self.fail(s, err, events),
        };

        self.inner.store.clear();
        self.inner.store.set(token.clone(), expires_at);
        self.inner.store.set_refresh_token(refresh_token);

        s.challenge = None;
        s.last_error = None;
        s.session = Some(session);
        s.user = Some(user.clone());
        s.state = AuthState::Authenticated;
        self.start_timers(s);

        info!(user_id = %user.id, %expires_at, "Signed in");
        events.push(SessionEvent::SignedIn {
            user_id: user.id.clone(),
            expires_at,
        });
        AuthResult::Success {
            user,
            token,
            requires_mfa: false,
        }
    }

    fn fail(&self, s: &mut Shared, err: AuthError, events: &mut Vec<SessionEvent>) -> AuthResult {
        warn!(code = %err.code(), error = %err, "Authentication failed");
        let failure = AuthFailure::from(err);
        s.state = AuthState::Anonymous;
        s.challenge = None;
        s.last_error = Some(failure.clone());
        events.push(SessionEvent::AuthFailed(failure.clone()));
        AuthResult::Failure(failure)
    }

    /// End the session because it can no longer be kept alive
    fn expire(
        &self,
        s: &mut Shared,
        cause: AuthError,
        reason: SignOutReason,
        message: &str,
        events: &mut Vec<SessionEvent>,
    ) -> AuthResult {
        warn!(error = %cause, ?reason, "Ending session");
        self.end_locked(s, reason, events);
        let failure = AuthFailure::from(AuthError::SessionExpired(message.to_string()));
        s.last_error = Some(failure.clone());
        events.push(SessionEvent::AuthFailed(failure.clone()));
        AuthResult::Failure(failure)
    }

    /// Drop to `Anonymous`, clearing the token store and every timer
    ///
    /// Returns the access token of the session that ended, if there was one.
    fn end_locked(
        &self,
        s: &mut Shared,
        reason: SignOutReason,
        events: &mut Vec<SessionEvent>,
    ) -> Option<String> {
        s.generation += 1;
        s.timers.abort_all();
        s.challenge = None;
        s.user = None;
        s.state = AuthState::Anonymous;
        self.inner.store.clear();

        let session = s.session.take()?;
        events.push(SessionEvent::SignedOut { reason });
        Some(session.access_token().to_string())
    }

    fn start_timers(&self, s: &mut Shared) {
        s.timers.abort_all();
        let Some(expires_at) = s.session.as_ref().map(Session::expires_at) else {
            return;
        };
        s.timers.refresh = Some(self.spawn_refresh(expires_at, s.generation));
        s.timers.activity = Some(self.spawn_activity_checker(s.generation));
    }

    fn spawn_refresh(&self, expires_at: DateTime<Utc>, generation: u64) -> JoinHandle<()> {
        let lead = chrono::Duration::from_std(self.inner.config.refresh_threshold())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let delay = (expires_at - self.inner.clock.now() - lead)
            .to_std()
            .unwrap_or(Duration::ZERO);
        debug!(delay_secs = delay.as_secs(), "Scheduling token refresh");

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                let machine = AuthSessionMachine { inner };
                machine.refresh_generation(generation).await;
            }
        })
    }

    fn spawn_activity_checker(&self, generation: u64) -> JoinHandle<()> {
        let period = self
            .inner
            .config
            .activity_check_interval()
            .max(Duration::from_millis(1));

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let machine = AuthSessionMachine { inner };
                if !machine.check_activity(generation).await {
                    break;
                }
            }
        })
    }

    fn idle_ceiling(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.inner.config.idle_timeout())
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
    }

    fn emit_all(&self, events: Vec<SessionEvent>) {
        for event in &events {
            self.inner.events.emit(event);
        }
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.inner.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for AuthSessionMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.shared();
        f.debug_struct("AuthSessionMachine")
            .field("state", &s.state)
            .field("generation", &s.generation)
            .finish()
    }
}
