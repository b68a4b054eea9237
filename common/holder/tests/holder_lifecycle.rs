use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bearer_holder::{
    ClaimSet, Current, FileTokenStore, HolderConfig, MemoryTokenStore, SetTokenOutcome,
    TokenHolder, TokenStore,
};
use bearer_issuer::{BearerToken, IssuerConfig, ManualClock, TokenIssuer};
use serde_json::{json, Value};

const START: i64 = 1_700_000_000;
const KEY: &str = "lifecycle.session";

type Log = Arc<Mutex<Vec<Option<Value>>>>;

struct Fixture {
    holder: TokenHolder,
    issuer: TokenIssuer,
    clock: ManualClock,
    store: MemoryTokenStore,
}

impl Fixture {
    fn new(lifetime: u64) -> Self {
        let clock = ManualClock::at(START);
        let store = MemoryTokenStore::new();
        let holder = holder_over(&store, &clock);
        let issuer = TokenIssuer::with_clock(
            IssuerConfig::new("lifecycle-secret").with_lifetime(lifetime),
            Arc::new(clock.clone()),
        )
        .expect("issuer");
        Self {
            holder,
            issuer,
            clock,
            store,
        }
    }

    fn token(&self, sub: &str) -> BearerToken {
        self.issuer.issue(&json!({ "sub": sub })).expect("issue")
    }

    fn record(&self) -> Log {
        let log: Log = Arc::default();
        let sink = Arc::clone(&log);
        self.holder.subscribe(move |claims: Option<&ClaimSet>| {
            sink.lock().unwrap().push(claims.and_then(|c| c.get("sub")).cloned());
        });
        log
    }

    /// Move wall clock and tokio time forward together.
    async fn elapse(&self, seconds: u64) {
        self.clock.advance(seconds as i64);
        tokio::time::sleep(Duration::from_secs(seconds)).await;
    }
}

fn holder_over(store: &MemoryTokenStore, clock: &ManualClock) -> TokenHolder {
    TokenHolder::with_clock(
        HolderConfig::new(KEY),
        Arc::new(store.clone()),
        Arc::new(clock.clone()),
    )
}

fn entries(log: &Log) -> Vec<Option<Value>> {
    log.lock().unwrap().clone()
}

#[tokio::test(start_paused = true)]
async fn expiry_notifies_every_subscriber_once_with_none() {
    let fx = Fixture::new(10);
    let first = fx.record();
    let second = fx.record();

    assert_eq!(fx.holder.set_token(fx.token("admin").as_str()), SetTokenOutcome::Installed);
    assert!(fx.holder.is_authenticated());

    fx.elapse(11).await;

    assert!(!fx.holder.is_authenticated());
    assert_eq!(fx.holder.current(false), None);
    assert!(!fx.store.contains(KEY));
    for log in [&first, &second] {
        assert_eq!(entries(log), vec![Some(json!("admin")), None]);
    }

    fx.elapse(60).await;
    assert_eq!(entries(&first).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn logout_is_idempotent_and_always_notifies() {
    let fx = Fixture::new(60);
    let log = fx.record();
    fx.holder.set_token(fx.token("u").as_str());

    fx.holder.logout();
    assert_eq!(fx.holder.current(false), None);
    fx.holder.logout();
    assert_eq!(fx.holder.current(true), None);

    assert_eq!(entries(&log), vec![Some(json!("u")), None, None]);

    fx.elapse(120).await;
    assert_eq!(entries(&log).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_handle_stops_receiving() {
    let fx = Fixture::new(60);
    let a = fx.record();
    let b_log: Log = Arc::default();
    let sink = Arc::clone(&b_log);
    let b = fx.holder.subscribe(move |claims: Option<&ClaimSet>| {
        sink.lock().unwrap().push(claims.and_then(|c| c.get("sub")).cloned());
    });
    let c = fx.record();

    assert!(b.unsubscribe());
    fx.holder.set_token(fx.token("u").as_str());

    assert_eq!(entries(&a), vec![Some(json!("u"))]);
    assert!(entries(&b_log).is_empty());
    assert_eq!(entries(&c), vec![Some(json!("u"))]);
    assert_eq!(fx.holder.subscriber_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn value_without_bearer_marker_is_ignored() {
    let fx = Fixture::new(60);
    let log = fx.record();
    let token = fx.token("u");

    assert_eq!(fx.holder.set_token(token.raw()), SetTokenOutcome::Rejected);
    assert!(!fx.holder.is_authenticated());
    assert!(entries(&log).is_empty());
    assert!(!fx.store.contains(KEY));
}

#[tokio::test(start_paused = true)]
async fn expired_token_flashes_authenticated_then_clears() {
    let fx = Fixture::new(10);
    let log = fx.record();
    let stale = fx.token("late");
    fx.clock.advance(30);

    assert_eq!(
        fx.holder.set_token(stale.as_str()),
        SetTokenOutcome::InstalledExpired
    );
    assert!(!fx.holder.is_authenticated());
    assert_eq!(entries(&log), vec![Some(json!("late"))]);

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(entries(&log), vec![Some(json!("late")), None]);
    assert_eq!(fx.holder.current_token(), None);
}

#[tokio::test(start_paused = true)]
async fn undecodable_token_is_installed_then_cleared() {
    let fx = Fixture::new(10);
    let log = fx.record();

    assert_eq!(
        fx.holder.set_token("Bearer not-a-jwt"),
        SetTokenOutcome::InstalledUndecodable
    );
    assert_eq!(
        fx.holder.current(false),
        Some(Current::Token("Bearer not-a-jwt".to_string()))
    );
    assert_eq!(fx.holder.current(true), None);

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(entries(&log), vec![None, None]);
    assert_eq!(fx.holder.current_token(), None);
}

#[tokio::test(start_paused = true)]
async fn newest_token_governs_expiry() {
    let fx = Fixture::new(10);
    let log = fx.record();

    fx.holder.set_token(fx.token("first").as_str());
    fx.elapse(5).await;
    fx.holder.set_token(fx.token("second").as_str());

    // the first token's timer would have fired at 10s
    fx.elapse(6).await;
    assert!(fx.holder.is_authenticated());
    assert_eq!(
        entries(&log),
        vec![Some(json!("first")), Some(json!("second"))]
    );

    fx.elapse(5).await;
    assert!(!fx.holder.is_authenticated());
    assert_eq!(
        entries(&log),
        vec![Some(json!("first")), Some(json!("second")), None]
    );
}

#[tokio::test(start_paused = true)]
async fn subscriber_added_during_fan_out_waits_for_next_event() {
    let fx = Fixture::new(60);
    let late: Log = Arc::default();
    let added = Arc::new(AtomicBool::new(false));

    let holder = fx.holder.clone();
    let late_sink = Arc::clone(&late);
    fx.holder.subscribe(move |_claims: Option<&ClaimSet>| {
        if !added.swap(true, Ordering::SeqCst) {
            let sink = Arc::clone(&late_sink);
            holder.subscribe(move |claims: Option<&ClaimSet>| {
                sink.lock().unwrap().push(claims.and_then(|c| c.get("sub")).cloned());
            });
        }
    });

    fx.holder.set_token(fx.token("u").as_str());
    assert!(entries(&late).is_empty());

    fx.holder.logout();
    assert_eq!(entries(&late), vec![None]);
}

#[tokio::test(start_paused = true)]
async fn subscriber_calling_back_sees_events_in_order() {
    let fx = Fixture::new(60);
    let holder = fx.holder.clone();
    fx.holder.subscribe(move |claims: Option<&ClaimSet>| {
        if claims.is_some() {
            holder.logout();
        }
    });
    let log = fx.record();

    fx.holder.set_token(fx.token("u").as_str());

    assert_eq!(entries(&log), vec![Some(json!("u")), None]);
    assert!(!fx.holder.is_authenticated());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expiry_announced_late_never_overrides_a_newer_token() {
    let fx = Fixture::new(1);

    // hold up the expiry announcement past the next set_token
    fx.holder.subscribe(|claims: Option<&ClaimSet>| {
        if claims.is_none() {
            std::thread::sleep(Duration::from_millis(300));
        }
    });
    let seen: Arc<Mutex<Vec<bool>>> = Arc::default();
    let sink = Arc::clone(&seen);
    fx.holder.subscribe(move |claims: Option<&ClaimSet>| {
        sink.lock().unwrap().push(claims.is_some());
    });

    fx.holder.set_token(fx.token("short").as_str());

    let holder = fx.holder.clone();
    let long = fx
        .issuer
        .issue_with_lifetime(&json!({ "sub": "long" }), 3_600)
        .expect("issue");
    tokio::task::spawn_blocking(move || {
        std::thread::sleep(Duration::from_millis(1_150));
        holder.set_token(long.as_str())
    })
    .await
    .expect("setter thread");

    tokio::time::sleep(Duration::from_millis(800)).await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, vec![true, false, true]);
    assert!(fx.holder.is_authenticated());
    assert_eq!(seen.last().copied(), Some(fx.holder.is_authenticated()));
}

#[tokio::test(start_paused = true)]
async fn panicking_subscriber_is_isolated() {
    let fx = Fixture::new(60);
    fx.holder
        .subscribe(|_claims: Option<&ClaimSet>| panic!("broken widget"));
    let log = fx.record();

    fx.holder.set_token(fx.token("u").as_str());
    fx.holder.logout();

    assert_eq!(entries(&log), vec![Some(json!("u")), None]);
}

#[tokio::test(start_paused = true)]
async fn persisted_token_is_restored_silently() {
    let fx = Fixture::new(10);
    fx.store.write(KEY, fx.token("saved").as_str()).expect("seed");

    let restored = holder_over(&fx.store, &fx.clock);
    let log: Log = Arc::default();
    let sink = Arc::clone(&log);
    restored.subscribe(move |claims: Option<&ClaimSet>| {
        sink.lock().unwrap().push(claims.and_then(|c| c.get("sub")).cloned());
    });

    assert!(restored.is_authenticated());
    assert_eq!(restored.snapshot().expires_at, Some(START + 10));
    assert!(entries(&log).is_empty());

    fx.elapse(11).await;
    assert_eq!(entries(&log), vec![None]);
    assert!(!restored.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn expired_persisted_token_is_discarded_on_start() {
    let fx = Fixture::new(10);
    fx.store.write(KEY, fx.token("old").as_str()).expect("seed");
    fx.clock.advance(10);

    let restored = holder_over(&fx.store, &fx.clock);
    assert!(!restored.is_authenticated());
    assert!(!fx.store.contains(KEY));
}

#[tokio::test(start_paused = true)]
async fn holders_are_independent() {
    let fx = Fixture::new(60);
    let other_store = MemoryTokenStore::new();
    let other = holder_over(&other_store, &fx.clock);

    fx.holder.set_token(fx.token("u").as_str());
    assert!(fx.holder.is_authenticated());
    assert!(!other.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn file_store_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::at(START);
    let issuer = TokenIssuer::with_clock(
        IssuerConfig::new("file-secret").with_lifetime(600),
        Arc::new(clock.clone()),
    )
    .expect("issuer");

    let open = || {
        TokenHolder::with_clock(
            HolderConfig::new(KEY),
            Arc::new(FileTokenStore::new(dir.path()).expect("store")),
            Arc::new(clock.clone()),
        )
    };

    let first = open();
    first.set_token(issuer.issue(&json!({ "sub": "disk" })).expect("issue").as_str());
    drop(first);

    let second = open();
    let snapshot = second.snapshot();
    assert!(snapshot.has_auth);
    assert_eq!(
        snapshot.user.and_then(|claims| claims.get("sub").cloned()),
        Some(json!("disk"))
    );
}
