// raidwall/src/engine/settings.rs
//
// Resolves a space's antiraid settings into limiter parameters.
// A space is monitored only when it is enabled and both the regeneration
// interval and the burst are at least 1; NotFound counts as "unset".
// Nothing is cached: the resolver runs on every join.

use std::sync::Arc;
use std::time::Duration;

use crate::collab::SettingsStore;
use crate::error::{SettingsError, UnsetAs};
use crate::state::MonitorParams;

pub struct SettingsResolver {
    store: Arc<dyn SettingsStore>,
}

impl SettingsResolver {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// `Ok(None)` means monitoring is off for the space.
    pub async fn resolve(&self, space_id: &str) -> Result<Option<MonitorParams>, SettingsError> {
        let enabled = self.store.raid_monitoring_enabled(space_id).await
            .unset_as(false)
            .map_err(|source| SettingsError { setting: "state", source })?;
        if !enabled {
            return Ok(None);
        }

        let regeneration = self.store.regeneration_seconds(space_id).await
            .unset_as(0)
            .map_err(|source| SettingsError { setting: "regeneration", source })?;
        if regeneration < 1 {
            return Ok(None);
        }

        let burst = self.store.burst_allowance(space_id).await
            .unset_as(0)
            .map_err(|source| SettingsError { setting: "burst", source })?;
        if burst < 1 {
            return Ok(None);
        }

        Ok(Some(MonitorParams {
            regeneration: Duration::from_secs(regeneration.unsigned_abs()),
            burst:        u32::try_from(burst).unwrap_or(u32::MAX),
        }))
    }

    /// Whether the verification gate is forced on during raids.
    pub async fn auto_verify(&self, space_id: &str) -> Result<bool, SettingsError> {
        self.store.auto_verify_on_raid(space_id).await
            .unset_as(false)
            .map_err(|source| SettingsError { setting: "verification state", source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::memory::{MemorySettings, SettingsRecord};

    fn resolver(settings: &Arc<MemorySettings>) -> SettingsResolver {
        SettingsResolver::new(settings.clone())
    }

    #[tokio::test]
    async fn active_space_resolves_params() {
        let s = Arc::new(MemorySettings::new());
        s.set("g1", SettingsRecord::active(60, 3));

        let params = resolver(&s).resolve("g1").await.unwrap().unwrap();
        assert_eq!(params.regeneration, Duration::from_secs(60));
        assert_eq!(params.burst, 3);
    }

    #[tokio::test]
    async fn disabled_short_circuits() {
        let s = Arc::new(MemorySettings::new());
        s.set("g1", SettingsRecord { enabled: Some(false), ..SettingsRecord::active(60, 3) });

        assert_eq!(resolver(&s).resolve("g1").await.unwrap(), None);
        assert_eq!(s.reads(), 1, "only the enabled flag is read");
    }

    #[tokio::test]
    async fn unset_means_off() {
        let s = Arc::new(MemorySettings::new());
        assert_eq!(resolver(&s).resolve("unknown").await.unwrap(), None);

        s.set("g1", SettingsRecord { enabled: Some(true), ..Default::default() });
        assert_eq!(resolver(&s).resolve("g1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_values_resolve_inactive() {
        let s = Arc::new(MemorySettings::new());
        for (regen, burst) in [(0, 3), (-5, 3), (60, 0), (60, -1)] {
            s.set("g1", SettingsRecord::active(regen, burst));
            assert_eq!(resolver(&s).resolve("g1").await.unwrap(), None, "regen={regen} burst={burst}");
        }
    }

    #[tokio::test]
    async fn backend_failure_is_an_error() {
        let s = Arc::new(MemorySettings::new());
        s.set("g1", SettingsRecord::active(60, 3));
        s.fail_space("g1", true);

        let err = resolver(&s).resolve("g1").await.unwrap_err();
        assert_eq!(err.setting, "state");
    }

    #[tokio::test]
    async fn huge_burst_saturates() {
        let s = Arc::new(MemorySettings::new());
        s.set("g1", SettingsRecord::active(1, i64::MAX));
        let params = resolver(&s).resolve("g1").await.unwrap().unwrap();
        assert_eq!(params.burst, u32::MAX);
    }

    #[tokio::test]
    async fn auto_verify_defaults_off() {
        let s = Arc::new(MemorySettings::new());
        s.set("g1", SettingsRecord::active(60, 3));
        assert!(!resolver(&s).auto_verify("g1").await.unwrap());

        s.set("g1", SettingsRecord::active(60, 3).with_auto_verify(true));
        assert!(resolver(&s).auto_verify("g1").await.unwrap());
    }
}
