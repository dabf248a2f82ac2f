// raidwall/src/engine/antiraid.rs
//
// Per-join raid detection handler.
//
// Flow for one join:
//
//   expired trigger record? ──yes──▶ await its join log flush
//          │
//   live trigger record? ──yes──▶ append to join log (within record lifetime)
//          │ no
//   resolve settings ──inactive──▶ evict guild state
//          │
//   dedup buffer ──seen──▶ done
//          │
//   burst limiter ──allowed──▶ done
//          │ overflow
//   arm trigger (atomic claim) ──lost──▶ treat as incident join
//          │ won
//   escalation protocol, then record the triggering actor
//
// `on_member_join` is the error boundary: it never fails, every collaborator
// error is reported and degrades only its own step.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::escalation::{AlertTemplate, Escalation, EscalationReport};
use super::settings::SettingsResolver;
use super::Reporter;
use crate::clock::Clock;
use crate::collab::{Collaborators, JoinAuditLog};
use crate::config::AntiraidConfig;
use crate::error::CollabError;
use crate::events::{JoinLogEntry, MemberJoin};
use crate::metrics::RaidMetrics;
use crate::state::registry::{Admission, GuildRegistry};
use crate::state::triggers::{ExpiryFuture, OnExpire, TriggerStore};

/// How a single join was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Monitoring is off for the space.
    Inactive,
    /// Settings could not be read; the join was not evaluated.
    SettingsUnavailable,
    /// Actor was seen recently.
    Duplicate,
    /// Within the burst budget.
    Allowed,
    /// Join landed inside a live incident. `logged` is false when the join
    /// fell outside the record lifetime or the append failed.
    IncidentJoin { logged: bool },
    /// This join triggered a raid incident.
    Escalated(EscalationReport),
}

pub struct Antiraid {
    config:     AntiraidConfig,
    resolver:   SettingsResolver,
    registry:   GuildRegistry,
    triggers:   Arc<TriggerStore>,
    escalation: Escalation,
    join_log:   Arc<dyn JoinAuditLog>,
    reporter:   Reporter,
    clock:      Arc<dyn Clock>,
    metrics:    Arc<RaidMetrics>,
}

impl Antiraid {
    pub fn new(config: AntiraidConfig, collab: Collaborators, clock: Arc<dyn Clock>) -> Arc<Self> {
        let reporter = Reporter::new(Arc::clone(&collab.guild_log));
        let escalation = Escalation::new(&collab, AlertTemplate::from_config(&config), reporter.clone());

        Arc::new(Self {
            resolver:  SettingsResolver::new(Arc::clone(&collab.settings)),
            registry:  GuildRegistry::new(config.dedup_capacity),
            triggers:  Arc::new(TriggerStore::new()),
            join_log:  Arc::clone(&collab.join_log),
            metrics:   RaidMetrics::new(),
            escalation,
            reporter,
            clock,
            config,
        })
    }

    /// Starts the background trigger expiry sweep.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.triggers).sweep_loop(self.config.sweep_interval))
    }

    pub async fn on_member_join(&self, join: &MemberJoin) -> JoinOutcome {
        let outcome = self.handle(join).await;
        self.metrics.record_outcome(&outcome);
        outcome
    }

    pub fn tracked_spaces(&self) -> usize { self.registry.len() }
    pub fn live_incidents(&self) -> usize { self.triggers.len() }
    pub fn metrics(&self) -> &Arc<RaidMetrics> { &self.metrics }
    pub fn config(&self) -> &AntiraidConfig { &self.config }

    async fn handle(&self, join: &MemberJoin) -> JoinOutcome {
        let space_id = join.space_id.as_str();

        // An incident that ran out before this join is flushed here, in line,
        // so the flush cannot land after a new incident's first append.
        if let Some(flush) = self.triggers.reap(space_id) {
            flush.await;
        }

        if let Some(triggered_at) = self.triggers.get(space_id) {
            let logged = self.record_incident_join(join, triggered_at).await;
            return JoinOutcome::IncidentJoin { logged };
        }

        let params = match self.resolver.resolve(space_id).await {
            Ok(Some(params)) => params,
            Ok(None) => {
                if self.registry.remove(space_id) {
                    debug!(space = space_id, "monitoring off; guild state evicted");
                }
                return JoinOutcome::Inactive;
            }
            Err(e) => {
                self.reporter.error(space_id, Some(&join.actor_id), &e.to_string()).await;
                return JoinOutcome::SettingsUnavailable;
            }
        };

        let guild = self.registry.get_or_create(space_id, params);
        let admission = guild.lock().admit(&join.actor_id);
        match admission {
            Admission::Duplicate => return JoinOutcome::Duplicate,
            Admission::Allowed   => return JoinOutcome::Allowed,
            Admission::Overflow  => {}
        }

        let now = self.clock.now();
        let armed = self.triggers.arm(
            space_id, now, self.config.trigger_lifetime, Some(self.flush_callback()),
        );
        if !armed {
            // Another join overflowed first and owns the escalation.
            let triggered_at = self.triggers.get(space_id).unwrap_or(now);
            let logged = self.record_incident_join(join, triggered_at).await;
            return JoinOutcome::IncidentJoin { logged };
        }

        warn!(space = space_id, actor = %join.actor_id, burst = params.burst,
              regeneration_secs = params.regeneration.as_secs(), "raid detected; escalating");
        let report = self.escalation.run(join).await;
        self.append_join_log(join, now).await;
        JoinOutcome::Escalated(report)
    }

    async fn record_incident_join(&self, join: &MemberJoin, triggered_at: DateTime<Utc>) -> bool {
        let now = self.clock.now();
        if now - triggered_at >= self.config.record_lifetime() {
            debug!(space = %join.space_id, actor = %join.actor_id, "incident join past record lifetime");
            return false;
        }
        self.append_join_log(join, now).await
    }

    async fn append_join_log(&self, join: &MemberJoin, joined_at: DateTime<Utc>) -> bool {
        match self.join_log.append(&JoinLogEntry::from_join(join, joined_at)).await {
            Ok(()) => true,
            Err(e) => {
                self.reporter
                    .error(&join.space_id, Some(&join.actor_id), &format!("Failed adding member to joinlog: {e}"))
                    .await;
                false
            }
        }
    }

    fn flush_callback(&self) -> OnExpire {
        let join_log = Arc::clone(&self.join_log);
        let reporter = self.reporter.clone();
        let metrics  = Arc::clone(&self.metrics);

        Box::new(move |space_id: String, triggered_at: DateTime<Utc>| -> ExpiryFuture {
            Box::pin(async move {
                match join_log.flush(&space_id).await {
                    Ok(()) => {
                        metrics.record_flush();
                        info!(space = %space_id, %triggered_at, "raid incident over; join log flushed");
                    }
                    Err(CollabError::NotFound) => {
                        debug!(space = %space_id, "raid incident over; join log already empty");
                    }
                    Err(e) => {
                        reporter.error(&space_id, None, &format!("Failed flushing joinlog: {e}")).await;
                    }
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collab::memory::*;
    use crate::events::{MemberInfo, SpaceInfo};
    use std::sync::atomic::Ordering;

    struct Rig {
        antiraid: Arc<Antiraid>,
        settings: Arc<MemorySettings>,
        join_log: Arc<MemoryJoinLog>,
        notifier: Arc<RecordingNotifier>,
        clock:    Arc<ManualClock>,
    }

    fn rig() -> Rig {
        let settings  = Arc::new(MemorySettings::new());
        let join_log  = Arc::new(MemoryJoinLog::new());
        let directory = Arc::new(MemoryDirectory::new());
        let notifier  = Arc::new(RecordingNotifier::new());
        let clock     = Arc::new(ManualClock::default());

        directory.insert(
            SpaceInfo { id: "g1".into(), name: "Guild".into(), owner_id: "owner".into() },
            vec![MemberInfo { user_id: "owner".into(), display_name: "Owner".into(), administrator: false }],
        );
        settings.set("g1", SettingsRecord::active(60, 2));

        let collab = Collaborators {
            settings:     settings.clone(),
            join_log:     join_log.clone(),
            directory,
            admission:    Arc::new(RecordingAdmission::new()),
            notifier:     notifier.clone(),
            verification: Arc::new(RecordingGate::new()),
            guild_log:    Arc::new(MemoryGuildLog::new()),
        };
        let antiraid = Antiraid::new(AntiraidConfig::default(), collab, clock.clone());
        Rig { antiraid, settings, join_log, notifier, clock }
    }

    fn join(actor: &str) -> MemberJoin {
        MemberJoin::new("g1", actor, actor, Utc::now())
    }

    #[tokio::test]
    async fn overflow_escalates_then_absorbs() {
        let r = rig();
        assert_eq!(r.antiraid.on_member_join(&join("a")).await, JoinOutcome::Allowed);
        assert_eq!(r.antiraid.on_member_join(&join("b")).await, JoinOutcome::Allowed);

        let JoinOutcome::Escalated(report) = r.antiraid.on_member_join(&join("c")).await else {
            panic!("third join should escalate");
        };
        assert_eq!(report.delivered, 1);
        assert_eq!(r.antiraid.live_incidents(), 1);

        assert_eq!(r.antiraid.on_member_join(&join("d")).await, JoinOutcome::IncidentJoin { logged: true });
        assert_eq!(r.notifier.direct().len(), 1);

        let logged: Vec<_> = r.join_log.entries("g1").into_iter().map(|e| e.actor_id).collect();
        assert_eq!(logged, ["c", "d"]);
        assert_eq!(r.antiraid.metrics().escalations.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn incident_joins_past_record_lifetime_are_dropped() {
        let r = rig();
        for actor in ["a", "b", "c"] {
            r.antiraid.on_member_join(&join(actor)).await;
        }
        r.clock.advance(chrono::Duration::hours(49));

        assert_eq!(r.antiraid.on_member_join(&join("late")).await, JoinOutcome::IncidentJoin { logged: false });
        assert_eq!(r.join_log.entries("g1").len(), 1);
    }

    #[tokio::test]
    async fn disabling_evicts_state() {
        let r = rig();
        r.antiraid.on_member_join(&join("a")).await;
        assert_eq!(r.antiraid.tracked_spaces(), 1);

        r.settings.update("g1", |s| s.enabled = Some(false));
        assert_eq!(r.antiraid.on_member_join(&join("b")).await, JoinOutcome::Inactive);
        assert_eq!(r.antiraid.tracked_spaces(), 0);
    }
}
