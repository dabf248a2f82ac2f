// raidwall/src/collab/memory.rs
//
// In-process collaborator implementations.
//
// The daemon keeps settings and the directory in these stores; its join log
// goes to the JSONL sink. Tests use the recording sinks to observe side
// effects and the `fail_*` switches to inject collaborator failures.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{
    AdmissionControl, DirectoryCache, GuildLog, JoinAuditLog, NotificationSink, SettingsStore,
    VerificationGate,
};
use crate::error::{CollabError, CollabResult};
use crate::events::{Alert, JoinLogEntry, MemberInfo, SpaceInfo, VerificationLevel};

fn injected(what: &str) -> CollabError {
    CollabError::backend(format!("injected {what} failure"))
}

// ── Settings ──────────────────────────────────────────────────────────────────

/// Stored antiraid settings of one space. `None` reads back as NotFound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsRecord {
    pub enabled:              Option<bool>,
    pub regeneration_seconds: Option<i64>,
    pub burst:                Option<i64>,
    pub auto_verify:          Option<bool>,
}

impl SettingsRecord {
    pub fn active(regeneration_seconds: i64, burst: i64) -> Self {
        Self {
            enabled:              Some(true),
            regeneration_seconds: Some(regeneration_seconds),
            burst:                Some(burst),
            auto_verify:          None,
        }
    }

    pub fn with_auto_verify(mut self, on: bool) -> Self {
        self.auto_verify = Some(on);
        self
    }
}

#[derive(Default)]
pub struct MemorySettings {
    records: DashMap<String, SettingsRecord>,
    failing: DashMap<String, ()>,
    reads:   AtomicU64,
}

impl MemorySettings {
    pub fn new() -> Self { Self::default() }

    pub fn set(&self, space_id: &str, record: SettingsRecord) {
        self.records.insert(space_id.to_string(), record);
    }

    pub fn update(&self, space_id: &str, f: impl FnOnce(&mut SettingsRecord)) {
        f(&mut self.records.entry(space_id.to_string()).or_default());
    }

    /// Every read for the space fails with a backend error until cleared.
    pub fn fail_space(&self, space_id: &str, failing: bool) {
        if failing {
            self.failing.insert(space_id.to_string(), ());
        } else {
            self.failing.remove(space_id);
        }
    }

    /// Total number of individual setting reads served.
    pub fn reads(&self) -> u64 { self.reads.load(Ordering::Relaxed) }

    fn read<T>(&self, space_id: &str, field: impl FnOnce(&SettingsRecord) -> Option<T>) -> CollabResult<T> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.failing.contains_key(space_id) {
            return Err(injected("settings"));
        }
        self.records.get(space_id)
            .and_then(|r| field(r.value()))
            .ok_or(CollabError::NotFound)
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn raid_monitoring_enabled(&self, space_id: &str) -> CollabResult<bool> {
        self.read(space_id, |r| r.enabled)
    }

    async fn regeneration_seconds(&self, space_id: &str) -> CollabResult<i64> {
        self.read(space_id, |r| r.regeneration_seconds)
    }

    async fn burst_allowance(&self, space_id: &str) -> CollabResult<i64> {
        self.read(space_id, |r| r.burst)
    }

    async fn auto_verify_on_raid(&self, space_id: &str) -> CollabResult<bool> {
        self.read(space_id, |r| r.auto_verify)
    }
}

// ── Join log ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryJoinLog {
    entries: DashMap<String, Vec<JoinLogEntry>>,
    flushes: AtomicU64,
    failing: AtomicBool,
}

impl MemoryJoinLog {
    pub fn new() -> Self { Self::default() }

    pub fn entries(&self, space_id: &str) -> Vec<JoinLogEntry> {
        self.entries.get(space_id).map(|e| e.clone()).unwrap_or_default()
    }

    /// Flushes that actually removed a log.
    pub fn flushes(&self) -> u64 { self.flushes.load(Ordering::Relaxed) }

    pub fn fail_appends(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

#[async_trait]
impl JoinAuditLog for MemoryJoinLog {
    async fn append(&self, entry: &JoinLogEntry) -> CollabResult<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(injected("join log"));
        }
        self.entries.entry(entry.space_id.clone()).or_default().push(entry.clone());
        Ok(())
    }

    async fn flush(&self, space_id: &str) -> CollabResult<()> {
        match self.entries.remove(space_id) {
            Some(_) => {
                self.flushes.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(CollabError::NotFound),
        }
    }
}

// ── Directory ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryDirectory {
    spaces:          DashMap<String, SpaceInfo>,
    members:         DashMap<String, Vec<MemberInfo>>,
    failing_members: DashMap<String, ()>,
}

impl MemoryDirectory {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&self, space: SpaceInfo, members: Vec<MemberInfo>) {
        self.members.insert(space.id.clone(), members);
        self.spaces.insert(space.id.clone(), space);
    }

    pub fn fail_members(&self, space_id: &str, failing: bool) {
        if failing {
            self.failing_members.insert(space_id.to_string(), ());
        } else {
            self.failing_members.remove(space_id);
        }
    }
}

#[async_trait]
impl DirectoryCache for MemoryDirectory {
    async fn get_space(&self, space_id: &str, _force_refresh: bool) -> CollabResult<SpaceInfo> {
        self.spaces.get(space_id).map(|s| s.clone()).ok_or(CollabError::NotFound)
    }

    async fn list_members(&self, space_id: &str) -> CollabResult<Vec<MemberInfo>> {
        if self.failing_members.contains_key(space_id) {
            return Err(injected("member listing"));
        }
        Ok(self.members.get(space_id).map(|m| m.clone()).unwrap_or_default())
    }
}

// ── Recording effect sinks ────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingAdmission {
    calls:   Mutex<Vec<(String, VerificationLevel)>>,
    failing: AtomicBool,
}

impl RecordingAdmission {
    pub fn new() -> Self { Self::default() }
    pub fn calls(&self) -> Vec<(String, VerificationLevel)> { self.calls.lock().clone() }
    pub fn fail(&self, failing: bool) { self.failing.store(failing, Ordering::Relaxed); }
}

#[async_trait]
impl AdmissionControl for RecordingAdmission {
    async fn set_verification_level(&self, space_id: &str, level: VerificationLevel) -> CollabResult<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(CollabError::backend("403 Forbidden: Missing Permissions"));
        }
        self.calls.lock().push((space_id.to_string(), level));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    direct:             Mutex<Vec<(String, Alert)>>,
    channel:            Mutex<Vec<(String, Alert)>>,
    mod_logs:           DashMap<String, String>,
    failing_recipients: Mutex<HashSet<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self { Self::default() }

    pub fn with_mod_logs(mod_logs: HashMap<String, String>) -> Self {
        let n = Self::default();
        for (space, channel) in mod_logs {
            n.mod_logs.insert(space, channel);
        }
        n
    }

    pub fn set_mod_log(&self, space_id: &str, channel_id: &str) {
        self.mod_logs.insert(space_id.to_string(), channel_id.to_string());
    }

    pub fn fail_recipient(&self, actor_id: &str) {
        self.failing_recipients.lock().insert(actor_id.to_string());
    }

    pub fn direct(&self) -> Vec<(String, Alert)> { self.direct.lock().clone() }
    pub fn channel(&self) -> Vec<(String, Alert)> { self.channel.lock().clone() }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn send_direct(&self, actor_id: &str, alert: &Alert) -> CollabResult<()> {
        if self.failing_recipients.lock().contains(actor_id) {
            return Err(CollabError::backend("cannot send messages to this user"));
        }
        self.direct.lock().push((actor_id.to_string(), alert.clone()));
        Ok(())
    }

    async fn send_to_channel(&self, channel_id: &str, alert: &Alert) -> CollabResult<()> {
        self.channel.lock().push((channel_id.to_string(), alert.clone()));
        Ok(())
    }

    async fn mod_log_channel(&self, space_id: &str) -> CollabResult<String> {
        self.mod_logs.get(space_id).map(|c| c.clone()).ok_or(CollabError::NotFound)
    }
}

#[derive(Default)]
pub struct RecordingGate {
    calls:   Mutex<Vec<(String, bool)>>,
    failing: AtomicBool,
}

impl RecordingGate {
    pub fn new() -> Self { Self::default() }
    pub fn calls(&self) -> Vec<(String, bool)> { self.calls.lock().clone() }
    pub fn fail(&self, failing: bool) { self.failing.store(failing, Ordering::Relaxed); }
}

#[async_trait]
impl VerificationGate for RecordingGate {
    async fn set_enabled(&self, space_id: &str, enabled: bool) -> CollabResult<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(injected("verification gate"));
        }
        self.calls.lock().push((space_id.to_string(), enabled));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildLogLine {
    pub space_id: String,
    pub section:  String,
    pub message:  String,
}

#[derive(Default)]
pub struct MemoryGuildLog {
    lines: Mutex<Vec<GuildLogLine>>,
}

impl MemoryGuildLog {
    pub fn new() -> Self { Self::default() }

    pub fn lines(&self, space_id: &str) -> Vec<GuildLogLine> {
        self.lines.lock().iter().filter(|l| l.space_id == space_id).cloned().collect()
    }
}

#[async_trait]
impl GuildLog for MemoryGuildLog {
    async fn error(&self, space_id: &str, section: &str, message: &str) -> CollabResult<()> {
        self.lines.lock().push(GuildLogLine {
            space_id: space_id.to_string(),
            section:  section.to_string(),
            message:  message.to_string(),
        });
        Ok(())
    }
}
