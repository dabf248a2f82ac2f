// raidwall/src/events.rs
//
// Domain types flowing through raidwall: inbound join records, the validated
// join handed to the engine, directory snapshots, alert payloads and join log
// entries.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Discord epoch (2015-01-01T00:00:00Z) in Unix milliseconds.
pub const SNOWFLAKE_EPOCH_MS: i64 = 1_420_070_400_000;

// ── Inbound join events ───────────────────────────────────────────────────────

/// One line of the JSONL join feed. `account_created` may be omitted when the
/// user id is a snowflake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRecord {
    pub space_id:        String,
    pub user_id:         String,
    #[serde(default)]
    pub display_name:    String,
    #[serde(default)]
    pub account_created: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub timestamp:       DateTime<Utc>,
}

/// A validated "member joined" notification, the engine's only input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberJoin {
    pub space_id:        String,
    pub actor_id:        String,
    pub display_name:    String,
    pub account_created: DateTime<Utc>,
}

impl MemberJoin {
    pub fn new(
        space_id:        impl Into<String>,
        actor_id:        impl Into<String>,
        display_name:    impl Into<String>,
        account_created: DateTime<Utc>,
    ) -> Self {
        Self {
            space_id:     space_id.into(),
            actor_id:     actor_id.into(),
            display_name: display_name.into(),
            account_created,
        }
    }
}

impl TryFrom<JoinRecord> for MemberJoin {
    type Error = IngestError;

    fn try_from(rec: JoinRecord) -> Result<Self, Self::Error> {
        if rec.space_id.is_empty() { return Err(IngestError::MissingField("space_id")); }
        if rec.user_id.is_empty()  { return Err(IngestError::MissingField("user_id")); }

        let account_created = match rec.account_created {
            Some(t) => t,
            None    => snowflake_created_at(&rec.user_id)
                .ok_or_else(|| IngestError::InvalidSnowflake(rec.user_id.clone()))?,
        };
        let display_name = if rec.display_name.is_empty() {
            rec.user_id.clone()
        } else {
            rec.display_name
        };

        Ok(Self {
            space_id: rec.space_id,
            actor_id: rec.user_id,
            display_name,
            account_created,
        })
    }
}

/// Creation time encoded in the upper 42 bits of a snowflake id.
pub fn snowflake_created_at(id: &str) -> Option<DateTime<Utc>> {
    let raw: u64 = id.trim().parse().ok()?;
    let ms = i64::try_from(raw >> 22).ok()?.checked_add(SNOWFLAKE_EPOCH_MS)?;
    Utc.timestamp_millis_opt(ms).single()
}

// ── Directory snapshots ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceInfo {
    pub id:       String,
    pub name:     String,
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub user_id:       String,
    #[serde(default)]
    pub display_name:  String,
    #[serde(default)]
    pub administrator: bool,
}

impl SpaceInfo {
    /// Owners and administrators receive raid alerts.
    pub fn is_privileged(&self, member: &MemberInfo) -> bool {
        member.administrator || member.user_id == self.owner_id
    }
}

// ── Admission barrier ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationLevel {
    None,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl VerificationLevel {
    pub const STRICTEST: Self = Self::VeryHigh;
}

impl std::fmt::Display for VerificationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None     => write!(f, "none"),
            Self::Low      => write!(f, "low"),
            Self::Medium   => write!(f, "medium"),
            Self::High     => write!(f, "high"),
            Self::VeryHigh => write!(f, "very high"),
        }
    }
}

// ── Alerts ────────────────────────────────────────────────────────────────────

/// Embed-style notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub title:       String,
    pub description: String,
    pub color:       u32,
}

// ── Join log ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinLogEntry {
    pub space_id:        String,
    pub actor_id:        String,
    pub display_name:    String,
    pub account_created: DateTime<Utc>,
    pub joined_at:       DateTime<Utc>,
}

impl JoinLogEntry {
    pub fn from_join(join: &MemberJoin, joined_at: DateTime<Utc>) -> Self {
        Self {
            space_id:        join.space_id.clone(),
            actor_id:        join.actor_id.clone(),
            display_name:    join.display_name.clone(),
            account_created: join.account_created,
            joined_at,
        }
    }
}
