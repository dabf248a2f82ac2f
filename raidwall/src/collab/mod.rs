// raidwall/src/collab/mod.rs
//
// Capability traits for everything the engine does not own: settings and
// join log persistence, directory lookups, admission control, notifications,
// the verification gate and the operator-visible guild log.
//
// Every call returns CollabResult; CollabError::NotFound is a condition the
// engine treats as "unset", anything else is a failure it logs and survives.
//
//   memory  in-process implementations (tests, binary-side stores)
//   jsonl   append-only JSONL effect sink used by the daemon
//   local   loads the daemon's space directory file and wires both together

pub mod jsonl;
pub mod local;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CollabResult;
use crate::events::{Alert, JoinLogEntry, MemberInfo, SpaceInfo, VerificationLevel};

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn raid_monitoring_enabled(&self, space_id: &str) -> CollabResult<bool>;
    async fn regeneration_seconds(&self, space_id: &str) -> CollabResult<i64>;
    async fn burst_allowance(&self, space_id: &str) -> CollabResult<i64>;
    async fn auto_verify_on_raid(&self, space_id: &str) -> CollabResult<bool>;
}

#[async_trait]
pub trait JoinAuditLog: Send + Sync {
    async fn append(&self, entry: &JoinLogEntry) -> CollabResult<()>;
    /// Flushing an empty log may return NotFound; that is not a failure.
    async fn flush(&self, space_id: &str) -> CollabResult<()>;
}

#[async_trait]
pub trait DirectoryCache: Send + Sync {
    async fn get_space(&self, space_id: &str, force_refresh: bool) -> CollabResult<SpaceInfo>;
    async fn list_members(&self, space_id: &str) -> CollabResult<Vec<MemberInfo>>;
}

#[async_trait]
pub trait AdmissionControl: Send + Sync {
    async fn set_verification_level(&self, space_id: &str, level: VerificationLevel) -> CollabResult<()>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_direct(&self, actor_id: &str, alert: &Alert) -> CollabResult<()>;
    async fn send_to_channel(&self, channel_id: &str, alert: &Alert) -> CollabResult<()>;
    /// NotFound when the space has no mod-log channel configured.
    async fn mod_log_channel(&self, space_id: &str) -> CollabResult<String>;
}

#[async_trait]
pub trait VerificationGate: Send + Sync {
    async fn set_enabled(&self, space_id: &str, enabled: bool) -> CollabResult<()>;
}

/// Per-space error log operators can read, split into named sections.
#[async_trait]
pub trait GuildLog: Send + Sync {
    async fn error(&self, space_id: &str, section: &str, message: &str) -> CollabResult<()>;
}

/// The full set of collaborators the engine is constructed with.
#[derive(Clone)]
pub struct Collaborators {
    pub settings:     Arc<dyn SettingsStore>,
    pub join_log:     Arc<dyn JoinAuditLog>,
    pub directory:    Arc<dyn DirectoryCache>,
    pub admission:    Arc<dyn AdmissionControl>,
    pub notifier:     Arc<dyn NotificationSink>,
    pub verification: Arc<dyn VerificationGate>,
    pub guild_log:    Arc<dyn GuildLog>,
}
