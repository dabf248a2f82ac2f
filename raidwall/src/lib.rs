// raidwall/src/lib.rs
//
// Raidwall: join-burst raid detection and escalation for community spaces.
//
//   state    per-space burst limiter + dedup buffer, trigger cooldown store
//   engine   settings resolution, join handler, escalation protocol
//   collab   capability traits for settings, directory, notifications, logs
//   metrics  Prometheus counters and the /metrics endpoint

pub mod clock;
pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod metrics;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collab::Collaborators;
pub use config::AntiraidConfig;
pub use engine::antiraid::{Antiraid, JoinOutcome};
pub use engine::escalation::EscalationReport;
pub use error::{CollabError, CollabResult};
pub use events::MemberJoin;
