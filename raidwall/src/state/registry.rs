// raidwall/src/state/registry.rs
//
// Guild state registry: space id → (burst limiter, dedup buffer).
//
// DashMap shards the map so the lookup/create step never blocks unrelated
// spaces; each GuildState sits behind its own mutex which serializes the
// dedup-check → push → allow sequence for one space. Neither lock is ever held
// across an await.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use super::dedup::DedupBuffer;
use super::limiter::BurstLimiter;
use super::MonitorParams;

/// Result of pushing one join through a space's dedup buffer and limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Actor was seen recently; nothing consumed.
    Duplicate,
    /// Within the burst budget.
    Allowed,
    /// Burst budget exhausted.
    Overflow,
}

#[derive(Debug)]
pub struct GuildState {
    pub limiter: BurstLimiter,
    pub dedup:   DedupBuffer,
}

impl GuildState {
    pub fn new(params: MonitorParams, dedup_capacity: usize) -> Self {
        Self {
            limiter: BurstLimiter::new(params.regeneration, params.burst),
            dedup:   DedupBuffer::new(dedup_capacity),
        }
    }

    pub fn admit(&mut self, actor_id: &str) -> Admission {
        if self.dedup.contains(actor_id) {
            return Admission::Duplicate;
        }
        self.dedup.push(actor_id);
        if self.limiter.allow() { Admission::Allowed } else { Admission::Overflow }
    }

    /// Applies changed settings in place without resetting the bucket.
    pub fn reconfigure(&self, params: MonitorParams) {
        if self.limiter.burst() != params.burst {
            self.limiter.set_burst(params.burst);
        }
        if self.limiter.limit() != params.regeneration {
            self.limiter.set_limit(params.regeneration);
        }
    }
}

pub type GuildHandle = Arc<Mutex<GuildState>>;

pub struct GuildRegistry {
    guilds:         DashMap<String, GuildHandle>,
    dedup_capacity: usize,
}

impl GuildRegistry {
    pub fn new(dedup_capacity: usize) -> Self {
        Self { guilds: DashMap::new(), dedup_capacity }
    }

    /// Returns the space's state, creating it from `params` on first use and
    /// updating live limiter parameters otherwise.
    pub fn get_or_create(&self, space_id: &str, params: MonitorParams) -> GuildHandle {
        if let Some(existing) = self.guilds.get(space_id) {
            let handle = Arc::clone(existing.value());
            drop(existing);
            handle.lock().reconfigure(params);
            return handle;
        }

        let handle = self.guilds
            .entry(space_id.to_string())
            .or_insert_with(|| {
                debug!(space = space_id, burst = params.burst,
                       regeneration_secs = params.regeneration.as_secs(), "guild state created");
                Arc::new(Mutex::new(GuildState::new(params, self.dedup_capacity)))
            })
            .clone();
        // A concurrent creator may have won the race with older parameters.
        handle.lock().reconfigure(params);
        handle
    }

    /// Drops the space's runtime state. Returns whether anything was removed.
    pub fn remove(&self, space_id: &str) -> bool {
        self.guilds.remove(space_id).is_some()
    }

    #[cfg(test)]
    pub fn contains(&self, space_id: &str) -> bool { self.guilds.contains_key(space_id) }
    pub fn len(&self) -> usize { self.guilds.len() }
    pub fn is_empty(&self) -> bool { self.guilds.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn params(secs: u64, burst: u32) -> MonitorParams {
        MonitorParams { regeneration: Duration::from_secs(secs), burst }
    }

    #[test]
    fn creates_lazily_and_reuses() {
        let reg = GuildRegistry::new(50);
        assert!(reg.is_empty());

        let a = reg.get_or_create("g1", params(60, 3));
        let b = reg.get_or_create("g1", params(60, 3));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn admit_dedups_before_consuming() {
        let reg = GuildRegistry::new(50);
        let g = reg.get_or_create("g1", params(60, 2));
        let mut g = g.lock();

        assert_eq!(g.admit("a"), Admission::Allowed);
        assert_eq!(g.admit("a"), Admission::Duplicate);
        assert_eq!(g.admit("a"), Admission::Duplicate);
        assert_eq!(g.admit("b"), Admission::Allowed);
        assert_eq!(g.admit("c"), Admission::Overflow);
        // Overflowing actors are remembered too.
        assert_eq!(g.admit("c"), Admission::Duplicate);
    }

    #[test]
    fn changed_settings_update_in_place() {
        let reg = GuildRegistry::new(50);
        let g = reg.get_or_create("g1", params(60, 3));
        assert_eq!(g.lock().admit("a"), Admission::Allowed);

        let again = reg.get_or_create("g1", params(30, 10));
        assert!(Arc::ptr_eq(&g, &again));

        let mut state = again.lock();
        assert_eq!(state.limiter.burst(), 10);
        assert_eq!(state.limiter.limit(), Duration::from_secs(30));
        // Two tokens carried over from the first bucket.
        assert_eq!(state.admit("b"), Admission::Allowed);
        assert_eq!(state.admit("c"), Admission::Allowed);
        assert_eq!(state.admit("d"), Admission::Overflow);
    }

    #[test]
    fn remove_evicts() {
        let reg = GuildRegistry::new(50);
        reg.get_or_create("g1", params(60, 3));
        assert!(reg.remove("g1"));
        assert!(!reg.remove("g1"));
        assert!(!reg.contains("g1"));
    }

    #[test]
    fn spaces_are_isolated() {
        let reg = GuildRegistry::new(50);
        let g1 = reg.get_or_create("g1", params(60, 1));
        let g2 = reg.get_or_create("g2", params(60, 1));
        assert_eq!(g1.lock().admit("a"), Admission::Allowed);
        assert_eq!(g1.lock().admit("b"), Admission::Overflow);
        assert_eq!(g2.lock().admit("a"), Admission::Allowed);
    }
}
