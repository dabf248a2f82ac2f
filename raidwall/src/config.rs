// raidwall/src/config.rs
//
// Engine configuration. Durations are written as (fractional) seconds in the
// JSON config file:
//
//   {
//     "trigger_lifetime":        86400,
//     "trigger_record_lifetime": 172800,
//     "dedup_capacity":          50,
//     "sweep_interval":          60,
//     "alert_color":             16485376
//   }
//
// Every field is optional; missing fields keep their defaults.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TRIGGER_LIFETIME:        Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_TRIGGER_RECORD_LIFETIME: Duration = Duration::from_secs(48 * 60 * 60);
pub const DEFAULT_DEDUP_CAPACITY:          usize    = 50;
pub const DEFAULT_SWEEP_INTERVAL:          Duration = Duration::from_secs(60);
pub const COLOR_ORANGE:                    u32      = 0xfb8c00;
/// Upper bound for every configured duration (ten years).
pub const MAX_DURATION:                    Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiraidConfig {
    /// How long a space stays in the incident window after a trigger. The join
    /// log is flushed when it elapses.
    #[serde(with = "duration_secs")]
    pub trigger_lifetime:        Duration,
    /// How long after the trigger joins still count as part of the incident
    /// and are appended to the join log.
    #[serde(with = "duration_secs")]
    pub trigger_record_lifetime: Duration,
    pub dedup_capacity:          usize,
    /// Period of the background trigger expiry sweep.
    #[serde(with = "duration_secs")]
    pub sweep_interval:          Duration,
    pub alert_color:             u32,
}

impl Default for AntiraidConfig {
    fn default() -> Self {
        Self {
            trigger_lifetime:        DEFAULT_TRIGGER_LIFETIME,
            trigger_record_lifetime: DEFAULT_TRIGGER_RECORD_LIFETIME,
            dedup_capacity:          DEFAULT_DEDUP_CAPACITY,
            sweep_interval:          DEFAULT_SWEEP_INTERVAL,
            alert_color:             COLOR_ORANGE,
        }
    }
}

impl AntiraidConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, d) in [
            ("trigger_lifetime",        self.trigger_lifetime),
            ("trigger_record_lifetime", self.trigger_record_lifetime),
            ("sweep_interval",          self.sweep_interval),
        ] {
            if d.is_zero()       { bail!("{name} must be positive"); }
            if d > MAX_DURATION  { bail!("{name} must not exceed {} seconds", MAX_DURATION.as_secs()); }
        }
        if self.dedup_capacity == 0 { bail!("dedup_capacity must be at least 1"); }
        Ok(())
    }

    pub fn record_lifetime(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.trigger_record_lifetime)
            .unwrap_or(chrono::Duration::MAX)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_incident_windows() {
        let cfg = AntiraidConfig::default();
        assert_eq!(cfg.trigger_lifetime, Duration::from_secs(86_400));
        assert_eq!(cfg.trigger_record_lifetime, Duration::from_secs(172_800));
        assert_eq!(cfg.dedup_capacity, 50);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: AntiraidConfig =
            serde_json::from_str(r#"{ "trigger_lifetime": 0.5, "dedup_capacity": 10 }"#).unwrap();
        assert_eq!(cfg.trigger_lifetime, Duration::from_millis(500));
        assert_eq!(cfg.dedup_capacity, 10);
        assert_eq!(cfg.trigger_record_lifetime, DEFAULT_TRIGGER_RECORD_LIFETIME);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let res = serde_json::from_str::<AntiraidConfig>(r#"{ "sweep_interval": -1 }"#);
        assert!(res.is_err());
    }

    #[test]
    fn zero_capacity_fails_validation() {
        let cfg = AntiraidConfig { dedup_capacity: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn oversized_durations_fail_validation() {
        let huge = Duration::try_from_secs_f64(1e19).unwrap();
        for cfg in [
            AntiraidConfig { trigger_lifetime: huge, ..Default::default() },
            AntiraidConfig { trigger_record_lifetime: huge, ..Default::default() },
            AntiraidConfig { sweep_interval: huge, ..Default::default() },
        ] {
            assert!(cfg.validate().is_err(), "{cfg:?}");
        }

        let at_bound = AntiraidConfig { trigger_lifetime: MAX_DURATION, ..Default::default() };
        assert!(at_bound.validate().is_ok());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "trigger_record_lifetime": 3600, "alert_color": 255 }}"#).unwrap();

        let cfg = AntiraidConfig::load(file.path()).unwrap();
        assert_eq!(cfg.trigger_record_lifetime, Duration::from_secs(3600));
        assert_eq!(cfg.alert_color, 255);
        assert_eq!(cfg.record_lifetime(), chrono::Duration::hours(1));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "trigger_lifetime": 0 }}"#).unwrap();
        assert!(AntiraidConfig::load(file.path()).is_err());
    }
}
