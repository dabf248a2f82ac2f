// raidwall/src/collab/jsonl.rs
//
// Writes every outward effect of the engine as JSON lines into an output
// directory. Wire these files to the chat platform / persistence layer in a
// real deployment.
//
//   alerts.jsonl        direct messages and channel notices
//   admission.jsonl     verification level changes
//   verification.jsonl  verification gate toggles
//   joinlog.jsonl       join log appends and flushes
//   guildlog.jsonl      operator-visible error log
//
// Mod-log channels are static per sink, handed over at construction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::{AdmissionControl, GuildLog, JoinAuditLog, NotificationSink, VerificationGate};
use crate::error::{CollabError, CollabResult};
use crate::events::{Alert, JoinLogEntry, VerificationLevel};

pub const ALERTS_FILE:       &str = "alerts.jsonl";
pub const ADMISSION_FILE:    &str = "admission.jsonl";
pub const VERIFICATION_FILE: &str = "verification.jsonl";
pub const JOINLOG_FILE:      &str = "joinlog.jsonl";
pub const GUILDLOG_FILE:     &str = "guildlog.jsonl";

pub struct JsonlSink {
    out:      PathBuf,
    mod_logs: HashMap<String, String>,
}

impl JsonlSink {
    pub fn new(output_dir: impl Into<PathBuf>, mod_logs: HashMap<String, String>) -> CollabResult<Self> {
        let out: PathBuf = output_dir.into();
        std::fs::create_dir_all(&out)?;
        Ok(Self { out, mod_logs })
    }

    pub fn dir(&self) -> &Path { &self.out }

    async fn write(&self, file: &str, record: serde_json::Value) -> CollabResult<()> {
        let line = serde_json::to_string(&record)? + "\n";
        let mut f = OpenOptions::new().create(true).append(true)
            .open(self.out.join(file)).await?;
        f.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for JsonlSink {
    async fn send_direct(&self, actor_id: &str, alert: &Alert) -> CollabResult<()> {
        self.write(ALERTS_FILE, json!({
            "ts": Utc::now(), "kind": "direct", "recipient": actor_id, "alert": alert,
        })).await
    }

    async fn send_to_channel(&self, channel_id: &str, alert: &Alert) -> CollabResult<()> {
        self.write(ALERTS_FILE, json!({
            "ts": Utc::now(), "kind": "channel", "channel": channel_id, "alert": alert,
        })).await
    }

    async fn mod_log_channel(&self, space_id: &str) -> CollabResult<String> {
        self.mod_logs.get(space_id).cloned().ok_or(CollabError::NotFound)
    }
}

#[async_trait]
impl AdmissionControl for JsonlSink {
    async fn set_verification_level(&self, space_id: &str, level: VerificationLevel) -> CollabResult<()> {
        self.write(ADMISSION_FILE, json!({
            "ts": Utc::now(), "space_id": space_id, "verification_level": level,
        })).await
    }
}

#[async_trait]
impl VerificationGate for JsonlSink {
    async fn set_enabled(&self, space_id: &str, enabled: bool) -> CollabResult<()> {
        self.write(VERIFICATION_FILE, json!({
            "ts": Utc::now(), "space_id": space_id, "enabled": enabled,
        })).await
    }
}

#[async_trait]
impl JoinAuditLog for JsonlSink {
    async fn append(&self, entry: &JoinLogEntry) -> CollabResult<()> {
        self.write(JOINLOG_FILE, json!({ "op": "append", "entry": entry })).await
    }

    async fn flush(&self, space_id: &str) -> CollabResult<()> {
        self.write(JOINLOG_FILE, json!({ "op": "flush", "space_id": space_id, "ts": Utc::now() })).await
    }
}

#[async_trait]
impl GuildLog for JsonlSink {
    async fn error(&self, space_id: &str, section: &str, message: &str) -> CollabResult<()> {
        self.write(GUILDLOG_FILE, json!({
            "ts": Utc::now(), "space_id": space_id, "section": section, "level": "error", "message": message,
        })).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(dir: &Path, file: &str) -> Vec<serde_json::Value> {
        std::fs::read_to_string(dir.join(file))
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn alerts_are_appended_as_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(tmp.path().join("out"), HashMap::new()).unwrap();
        let alert = Alert { title: "t".into(), description: "d".into(), color: 1 };

        sink.send_direct("owner", &alert).await.unwrap();
        sink.send_to_channel("modlog", &alert).await.unwrap();

        let got = lines(sink.dir(), ALERTS_FILE);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0]["kind"], "direct");
        assert_eq!(got[0]["recipient"], "owner");
        assert_eq!(got[1]["channel"], "modlog");
        assert_eq!(got[1]["alert"]["title"], "t");
    }

    #[tokio::test]
    async fn admission_and_gate_records() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(tmp.path(), HashMap::new()).unwrap();

        sink.set_verification_level("g1", VerificationLevel::VeryHigh).await.unwrap();
        sink.set_enabled("g1", true).await.unwrap();

        assert_eq!(lines(tmp.path(), ADMISSION_FILE)[0]["verification_level"], "very_high");
        assert_eq!(lines(tmp.path(), VERIFICATION_FILE)[0]["enabled"], true);
    }

    #[tokio::test]
    async fn mod_log_channel_comes_from_construction() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(tmp.path(), HashMap::from([("g1".into(), "c9".into())])).unwrap();
        assert_eq!(sink.mod_log_channel("g1").await.unwrap(), "c9");
        assert!(sink.mod_log_channel("g2").await.unwrap_err().is_not_found());
    }
}
