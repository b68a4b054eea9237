use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use bearer_issuer::{decode_unsafe, ClaimSet, Clock, SystemClock, BEARER_PREFIX};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::HolderConfig;
use crate::registry::{SubscriberRegistry, Subscription};
use crate::store::TokenStore;

/// What `set_token` did with the value it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetTokenOutcome {
    /// Installed with an expiry in the future.
    Installed,
    /// Installed, but already expired; the expiry timer fires immediately.
    InstalledExpired,
    /// Installed, but the payload could not be decoded; treated as expired.
    InstalledUndecodable,
    /// Not a bearer token. State was left untouched.
    Rejected,
}

impl SetTokenOutcome {
    pub fn is_installed(self) -> bool {
        !matches!(self, SetTokenOutcome::Rejected)
    }
}

/// Result of [`TokenHolder::current`].
#[derive(Debug, Clone, PartialEq)]
pub enum Current {
    Token(String),
    Claims(ClaimSet),
}

/// Derived view for UI bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthSnapshot {
    pub has_auth: bool,
    pub user: Option<ClaimSet>,
    pub expires_at: Option<i64>,
}

#[derive(Default)]
struct Lifecycle {
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl Lifecycle {
    /// Cancel the pending timer and invalidate any timer already firing.
    fn disarm(&mut self) -> u64 {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation += 1;
        self.generation
    }
}

/// Transitions waiting to be announced, in the order the state changed.
#[derive(Default)]
struct Delivery {
    queue: VecDeque<Option<ClaimSet>>,
    draining: bool,
}

struct HolderInner {
    config: HolderConfig,
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    subscribers: Arc<SubscriberRegistry>,
    lifecycle: Mutex<Lifecycle>,
    delivery: Mutex<Delivery>,
}

impl HolderInner {
    fn key(&self) -> &str {
        &self.config.storage_key
    }

    fn read_token(&self) -> Option<String> {
        match self.store.read(self.key()) {
            Ok(token) => token,
            Err(err) => {
                error!(storage_key = self.key(), error = %err, "failed to read token");
                None
            }
        }
    }

    fn write_token(&self, token: &str) {
        if let Err(err) = self.store.write(self.key(), token) {
            error!(storage_key = self.key(), error = %err, "failed to persist token");
        }
    }

    fn delete_token(&self) {
        if let Err(err) = self.store.delete(self.key()) {
            error!(storage_key = self.key(), error = %err, "failed to clear token");
        }
    }

    fn lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn delivery(&self) -> std::sync::MutexGuard<'_, Delivery> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a transition for announcement. Call with the lifecycle lock
    /// held so the queue order matches the order of state changes.
    fn enqueue(&self, claims: Option<ClaimSet>) {
        self.delivery().queue.push_back(claims);
    }

    /// Announce queued transitions in order. One caller drains at a time;
    /// anyone arriving during a drain, including a subscriber calling back
    /// into the holder, leaves its transition to the active drainer.
    fn drain(&self) {
        {
            let mut delivery = self.delivery();
            if delivery.draining {
                return;
            }
            delivery.draining = true;
        }

        loop {
            let next = {
                let mut delivery = self.delivery();
                match delivery.queue.pop_front() {
                    Some(claims) => claims,
                    None => {
                        delivery.draining = false;
                        return;
                    }
                }
            };
            self.subscribers.notify(next.as_ref());
        }
    }

    /// Timer callback. Ignored unless `generation` is still current.
    fn expire(&self, generation: u64) {
        {
            let mut lifecycle = self.lifecycle();
            if lifecycle.generation != generation {
                return;
            }
            // the running task is the one stored here; detaching is enough
            lifecycle.timer = None;
            lifecycle.generation += 1;
            self.delete_token();
            self.enqueue(None);
        }
        debug!(storage_key = self.key(), "token expired");
        self.drain();
    }
}

impl Drop for HolderInner {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = lifecycle.timer.take() {
            timer.abort();
        }
    }
}

/// Client-side owner of the current bearer token.
///
/// Clones share state. The holder arms a single timer for the expiry of the
/// token it holds; the timer needs a tokio runtime, and without one the
/// holder still answers `is_authenticated` correctly but cannot push the
/// expiry notification.
#[derive(Clone)]
pub struct TokenHolder {
    inner: Arc<HolderInner>,
}

impl TokenHolder {
    pub fn new(config: HolderConfig, store: Arc<dyn TokenStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Build a holder and silently restore any persisted, unexpired token.
    pub fn with_clock(
        config: HolderConfig,
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        if cfg!(debug_assertions) && config.uses_placeholder_key() {
            warn!(
                storage_key = %config.storage_key,
                "token holder is using the placeholder storage key; choose one for your application"
            );
        }

        let holder = Self {
            inner: Arc::new(HolderInner {
                config,
                store,
                clock,
                subscribers: Arc::new(SubscriberRegistry::new()),
                lifecycle: Mutex::new(Lifecycle::default()),
                delivery: Mutex::new(Delivery::default()),
            }),
        };
        holder.restore();
        holder
    }

    fn restore(&self) {
        let Some(token) = self.inner.read_token() else {
            return;
        };
        let now = self.inner.clock.now_seconds();
        match decode_unsafe(&token) {
            Ok(claims) if !claims.is_expired_at(now) => {
                let mut lifecycle = self.inner.lifecycle();
                self.arm(&mut lifecycle, claims.remaining_seconds(now));
                debug!(expires_at = claims.expires_at(), "restored persisted token");
            }
            Ok(_) | Err(_) => {
                debug!(storage_key = self.inner.key(), "discarding stale persisted token");
                self.inner.delete_token();
            }
        }
    }

    fn arm(&self, lifecycle: &mut Lifecycle, delay_seconds: i64) {
        let generation = lifecycle.disarm();
        let Ok(runtime) = Handle::try_current() else {
            warn!("no tokio runtime; token expiry will not be announced");
            return;
        };

        let delay = Duration::from_secs(u64::try_from(delay_seconds).unwrap_or(0));
        let inner: Weak<HolderInner> = Arc::downgrade(&self.inner);
        lifecycle.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.expire(generation);
            }
        }));
    }

    pub fn config(&self) -> &HolderConfig {
        &self.inner.config
    }

    /// Install a token received from the server, replacing any pending
    /// expiry timer, then notify subscribers with its claims. When another
    /// thread is mid-announcement, that thread delivers this notification
    /// after its own.
    pub fn set_token(&self, token: &str) -> SetTokenOutcome {
        if !token.starts_with(BEARER_PREFIX) {
            if cfg!(debug_assertions) {
                warn!("set_token called with a value lacking the bearer prefix; ignoring");
            }
            return SetTokenOutcome::Rejected;
        }

        let now = self.inner.clock.now_seconds();
        let (claims, outcome, delay) = match decode_unsafe(token) {
            Ok(claims) if claims.is_expired_at(now) => {
                if cfg!(debug_assertions) {
                    warn!(expires_at = claims.expires_at(), "set_token received an expired token");
                }
                (Some(claims), SetTokenOutcome::InstalledExpired, 0)
            }
            Ok(claims) => {
                let delay = claims.remaining_seconds(now);
                (Some(claims), SetTokenOutcome::Installed, delay)
            }
            Err(reason) => {
                if cfg!(debug_assertions) {
                    warn!(%reason, "set_token received a token that does not decode");
                }
                (None, SetTokenOutcome::InstalledUndecodable, 0)
            }
        };

        {
            let mut lifecycle = self.inner.lifecycle();
            self.inner.write_token(token);
            self.arm(&mut lifecycle, delay);
            self.inner.enqueue(claims);
        }
        self.inner.drain();
        outcome
    }

    /// Drop the token and cancel its timer. Always notifies, even when
    /// nothing was held.
    pub fn logout(&self) {
        {
            let mut lifecycle = self.inner.lifecycle();
            lifecycle.disarm();
            self.inner.delete_token();
            self.inner.enqueue(None);
        }
        debug!(storage_key = self.inner.key(), "logged out");
        self.inner.drain();
    }

    /// Recomputed against the clock on every call.
    pub fn is_authenticated(&self) -> bool {
        let now = self.inner.clock.now_seconds();
        self.current_claims()
            .is_some_and(|claims| !claims.is_expired_at(now))
    }

    pub fn current_token(&self) -> Option<String> {
        self.inner.read_token()
    }

    /// Claims of the held token, decoded without verification.
    pub fn current_claims(&self) -> Option<ClaimSet> {
        self.current_token()
            .and_then(|token| decode_unsafe(&token).ok())
    }

    pub fn current(&self, decode: bool) -> Option<Current> {
        if decode {
            self.current_claims().map(Current::Claims)
        } else {
            self.current_token().map(Current::Token)
        }
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        let now = self.inner.clock.now_seconds();
        match self.current_claims() {
            Some(claims) => AuthSnapshot {
                has_auth: !claims.is_expired_at(now),
                expires_at: Some(claims.expires_at()),
                user: Some(claims),
            },
            None => AuthSnapshot::default(),
        }
    }

    /// Register a callback for every subsequent transition. It is not
    /// called with the current state.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<&ClaimSet>) + Send + Sync + 'static,
    {
        let handle = self.inner.subscribers.register(Arc::new(callback));
        Subscription::new(&self.inner.subscribers, handle)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    pub(crate) fn has_pending_expiry(&self) -> bool {
        self.inner
            .lifecycle()
            .timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}

impl fmt::Debug for TokenHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenHolder")
            .field("config", &self.inner.config)
            .field("subscribers", &self.inner.subscribers.len())
            .finish_non_exhaustive()
    }
}
