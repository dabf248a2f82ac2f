// raidwall/src/collab/local.rs
//
// Local backend for the daemon: settings, rosters and mod-log channels come
// from a JSON space directory file, effects go to a JsonlSink.
//
//   {
//     "spaces": [
//       {
//         "id": "g1", "name": "Guild", "owner_id": "100",
//         "mod_log_channel": "900",
//         "settings": { "enabled": true, "regeneration_seconds": 60, "burst": 5, "auto_verify": true },
//         "members": [ { "user_id": "101", "administrator": true } ]
//       }
//     ]
//   }

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::jsonl::JsonlSink;
use super::memory::{MemoryDirectory, MemorySettings, SettingsRecord};
use super::Collaborators;
use crate::events::{MemberInfo, SpaceInfo};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceEntry {
    pub id:              String,
    #[serde(default)]
    pub name:            String,
    pub owner_id:        String,
    #[serde(default)]
    pub mod_log_channel: Option<String>,
    #[serde(default)]
    pub settings:        SettingsRecord,
    #[serde(default)]
    pub members:         Vec<MemberInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpaceDirectoryFile {
    #[serde(default)]
    pub spaces: Vec<SpaceEntry>,
}

impl SpaceDirectoryFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading space directory {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing space directory {}", path.display()))
    }
}

/// Builds the daemon's collaborator set.
pub fn build(spaces: &SpaceDirectoryFile, output_dir: &Path) -> Result<Collaborators> {
    let settings  = MemorySettings::new();
    let directory = MemoryDirectory::new();

    for s in &spaces.spaces {
        settings.set(&s.id, s.settings.clone());
        let name = if s.name.is_empty() { s.id.clone() } else { s.name.clone() };
        directory.insert(
            SpaceInfo { id: s.id.clone(), name, owner_id: s.owner_id.clone() },
            s.members.clone(),
        );
    }

    let mod_logs = spaces.spaces.iter()
        .filter_map(|s| s.mod_log_channel.clone().map(|c| (s.id.clone(), c)))
        .collect();
    let sink = Arc::new(
        JsonlSink::new(output_dir, mod_logs)
            .with_context(|| format!("creating output directory {}", output_dir.display()))?,
    );

    Ok(Collaborators {
        settings:     Arc::new(settings),
        join_log:     sink.clone(),
        directory:    Arc::new(directory),
        admission:    sink.clone(),
        notifier:     sink.clone(),
        verification: sink.clone(),
        guild_log:    sink,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIRECTORY: &str = r#"{
        "spaces": [
            {
                "id": "g1", "name": "Guild", "owner_id": "100",
                "mod_log_channel": "900",
                "settings": { "enabled": true, "regeneration_seconds": 60, "burst": 5 },
                "members": [ { "user_id": "101", "administrator": true }, { "user_id": "102" } ]
            },
            { "id": "g2", "owner_id": "200" }
        ]
    }"#;

    #[tokio::test]
    async fn directory_file_wires_collaborators() {
        let tmp = tempfile::tempdir().unwrap();
        let file: SpaceDirectoryFile = serde_json::from_str(DIRECTORY).unwrap();
        let c = build(&file, tmp.path()).unwrap();

        assert!(c.settings.raid_monitoring_enabled("g1").await.unwrap());
        assert_eq!(c.settings.burst_allowance("g1").await.unwrap(), 5);
        assert!(c.settings.raid_monitoring_enabled("g2").await.unwrap_err().is_not_found());

        let g2 = c.directory.get_space("g2", true).await.unwrap();
        assert_eq!(g2.name, "g2");
        let members = c.directory.list_members("g1").await.unwrap();
        assert_eq!(members.len(), 2);
        assert!(members[0].administrator);
        assert!(!members[1].administrator);

        assert_eq!(c.notifier.mod_log_channel("g1").await.unwrap(), "900");
        assert!(c.notifier.mod_log_channel("g2").await.unwrap_err().is_not_found());
    }
}
