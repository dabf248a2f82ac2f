// raidwall/src/state/triggers.rs
//
// Trigger cooldown store: TTL map of "space is inside a raid incident".
//
// Each record carries the trigger timestamp and an optional completion
// callback. The callback fires exactly once, on a spawned tokio task, when
// the record expires, whether that is noticed by the background sweep or by
// a `get` that finds the record past its deadline. Removal from the map is
// the single point that claims the callback, so racing sweeps and lookups can
// never fire it twice.
//
// Overwriting a live record with `set` restarts its timer; the replaced
// callback is dropped without firing.
//
// `reap` is the synchronous variant of lazy expiry: it hands the callback's
// future back to the caller instead of spawning it, so a join handler can
// finish the old incident's flush before it starts a new one.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, error};

/// Deadline used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

pub type ExpiryFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Completion callback: receives the space id and the trigger timestamp.
pub type OnExpire = Box<dyn FnOnce(String, DateTime<Utc>) -> ExpiryFuture + Send + Sync + 'static>;

struct TriggerRecord {
    triggered_at: DateTime<Utc>,
    expires_at:   Instant,
    on_expire:    Option<OnExpire>,
}

impl TriggerRecord {
    fn new(triggered_at: DateTime<Utc>, now: Instant, ttl: Duration, on_expire: Option<OnExpire>) -> Self {
        Self { triggered_at, expires_at: deadline(now, ttl), on_expire }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Default)]
pub struct TriggerStore {
    records: DashMap<String, TriggerRecord>,
}

impl TriggerStore {
    pub fn new() -> Self {
        Self { records: DashMap::new() }
    }

    /// Trigger timestamp of the space's live record, if any.
    pub fn get(&self, space_id: &str) -> Option<DateTime<Utc>> {
        let now = Instant::now();
        match self.records.get(space_id) {
            None => return None,
            Some(rec) if rec.is_live(now) => return Some(rec.triggered_at),
            Some(_) => {}
        }
        self.expire(space_id, now);
        None
    }

    /// Removes the space's record if it has expired and returns its pending
    /// callback future for the caller to await. Live or absent records are
    /// left alone.
    pub fn reap(&self, space_id: &str) -> Option<ExpiryFuture> {
        let now = Instant::now();
        let (key, rec) = self.records.remove_if(space_id, |_, rec| !rec.is_live(now))?;
        let callback = rec.on_expire?;
        Some(callback(key, rec.triggered_at))
    }

    /// Inserts or overwrites the space's record.
    pub fn set(&self, space_id: &str, triggered_at: DateTime<Utc>, ttl: Duration, on_expire: Option<OnExpire>) {
        let rec = TriggerRecord::new(triggered_at, Instant::now(), ttl, on_expire);
        self.records.insert(space_id.to_string(), rec);
    }

    /// Inserts a record only if the space has no live one. Returns whether
    /// this call armed the trigger. Check and insert happen under the same
    /// shard lock, so of several concurrent callers exactly one wins.
    pub fn arm(&self, space_id: &str, triggered_at: DateTime<Utc>, ttl: Duration, on_expire: Option<OnExpire>) -> bool {
        let now = Instant::now();
        let rec = TriggerRecord::new(triggered_at, now, ttl, on_expire);

        let stale = match self.records.entry(space_id.to_string()) {
            Entry::Vacant(v) => {
                v.insert(rec);
                None
            }
            Entry::Occupied(mut o) => {
                if o.get().is_live(now) {
                    return false;
                }
                Some(o.insert(rec))
            }
        };

        // An expired record nobody swept yet still owes its callback.
        if let Some(old) = stale {
            fire(space_id.to_string(), old);
        }
        true
    }

    /// Expires every record past its deadline. Returns how many expired.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let due: Vec<String> = self.records.iter()
            .filter(|r| !r.value().is_live(now))
            .map(|r| r.key().clone())
            .collect();

        due.iter().filter(|space_id| self.expire(space_id, now)).count()
    }

    /// Background sweep, decoupled from event handling.
    pub async fn sweep_loop(self: Arc<Self>, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let expired = self.sweep();
            if expired > 0 {
                debug!(expired, live = self.len(), "trigger sweep");
            }
        }
    }

    pub fn len(&self) -> usize { self.records.len() }
    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    fn expire(&self, space_id: &str, now: Instant) -> bool {
        match self.records.remove_if(space_id, |_, rec| !rec.is_live(now)) {
            Some((key, rec)) => {
                fire(key, rec);
                true
            }
            None => false,
        }
    }
}

fn deadline(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

fn fire(space_id: String, rec: TriggerRecord) {
    let Some(callback) = rec.on_expire else { return };
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(callback(space_id, rec.triggered_at));
        }
        Err(_) => error!(space = %space_id, "trigger expired outside a tokio runtime; callback dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> Option<OnExpire> {
        let counter = Arc::clone(counter);
        Some(Box::new(move |_space: String, _ts: DateTime<Utc>| -> ExpiryFuture {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }))
    }

    #[tokio::test]
    async fn live_record_is_visible() {
        let store = TriggerStore::new();
        let ts = Utc::now();
        store.set("g1", ts, Duration::from_secs(60), None);
        assert_eq!(store.get("g1"), Some(ts));
        assert_eq!(store.get("g2"), None);
    }

    #[tokio::test]
    async fn arm_is_exclusive_while_live() {
        let store = TriggerStore::new();
        assert!(store.arm("g1", Utc::now(), Duration::from_secs(60), None));
        assert!(!store.arm("g1", Utc::now(), Duration::from_secs(60), None));
        assert!(store.arm("g2", Utc::now(), Duration::from_secs(60), None));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn sweep_fires_callback_once_without_traffic() {
        let fired = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(TriggerStore::new());
        store.set("g1", Utc::now(), Duration::from_millis(40), counting(&fired));

        tokio::spawn(Arc::clone(&store).sweep_loop(Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(store.is_empty());
        assert_eq!(store.get("g1"), None);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_expires_lazily_and_fires_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let store = TriggerStore::new();
        store.set("g1", Utc::now(), Duration::from_millis(10), counting(&fired));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("g1"), None);
        assert_eq!(store.get("g1"), None);
        assert_eq!(store.sweep(), 0);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn overwrite_restarts_timer_and_drops_old_callback() {
        let first  = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let store = TriggerStore::new();

        store.set("g1", Utc::now(), Duration::from_millis(30), counting(&first));
        store.set("g1", Utc::now(), Duration::from_secs(60), counting(&second));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.sweep(), 0);
        assert!(store.get("g1").is_some());
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn arm_over_stale_record_fires_its_callback() {
        let stale = Arc::new(AtomicUsize::new(0));
        let store = TriggerStore::new();
        store.set("g1", Utc::now(), Duration::from_millis(5), counting(&stale));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.arm("g1", Utc::now(), Duration::from_secs(60), None));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(stale.load(Ordering::SeqCst), 1);
        assert!(store.get("g1").is_some());
    }

    #[tokio::test]
    async fn reap_hands_back_the_flush_instead_of_spawning() {
        let fired = Arc::new(AtomicUsize::new(0));
        let store = TriggerStore::new();
        store.set("g1", Utc::now(), Duration::from_millis(5), counting(&fired));
        assert!(store.reap("g1").is_none(), "still live");

        tokio::time::sleep(Duration::from_millis(20)).await;
        let pending = store.reap("g1").expect("expired record yields its callback");
        assert!(store.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        pending.await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(store.reap("g1").is_none());
        assert_eq!(store.sweep(), 0);
    }

    #[tokio::test]
    async fn reap_leaves_live_records() {
        let store = TriggerStore::new();
        store.set("g1", Utc::now(), Duration::from_secs(60), None);
        assert!(store.reap("g1").is_none());
        assert!(store.get("g1").is_some());
    }

    #[tokio::test]
    async fn huge_ttl_does_not_overflow() {
        let store = TriggerStore::new();
        assert!(store.arm("g1", Utc::now(), Duration::MAX, None));
        store.set("g2", Utc::now(), Duration::from_secs(u64::MAX / 2), None);

        assert!(store.get("g1").is_some());
        assert!(store.get("g2").is_some());
        assert_eq!(store.sweep(), 0);
    }

    #[tokio::test]
    async fn concurrent_arm_has_one_winner() {
        let store = Arc::new(TriggerStore::new());
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.arm("g1", Utc::now(), Duration::from_secs(60), None) })
            })
            .collect();

        let mut winners = 0;
        for t in tasks {
            if t.await.unwrap() { winners += 1; }
        }
        assert_eq!(winners, 1);
    }
}
