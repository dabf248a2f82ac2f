// raidwall/src/engine/escalation.rs
//
// Raid escalation side effects, run once per incident:
//
//   1. raise the admission barrier to its strictest level
//   2. resolve owner + administrators from the directory
//   3. build the alert (annotated if step 1 failed)
//   4. DM the alert to every privileged member, best effort per recipient
//   5. post a short notice to the mod-log channel, if configured
//   6. force the verification gate on, if the space asks for it
//
// Every step is error-isolated: a failure is reported and the next step runs.
// Arming the trigger and recording the joiner are the caller's job.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::settings::SettingsResolver;
use super::Reporter;
use crate::collab::{AdmissionControl, Collaborators, DirectoryCache, NotificationSink, VerificationGate};
use crate::config::AntiraidConfig;
use crate::error::CollabError;
use crate::events::{Alert, MemberJoin, SpaceInfo, VerificationLevel};

pub const ALERT_TITLE: &str = "⚠ GUILD RAID ALERT";

/// What an escalation run managed to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscalationReport {
    pub admission_raised:     bool,
    /// Privileged members found in the roster.
    pub recipients:           usize,
    /// Direct alerts actually delivered.
    pub delivered:            usize,
    pub mod_log_notified:     bool,
    pub verification_enabled: bool,
}

// ── Alert payloads ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AlertTemplate {
    pub color:          u32,
    pub log_window:     Duration,
    pub record_lifetime: Duration,
}

impl AlertTemplate {
    pub fn from_config(cfg: &AntiraidConfig) -> Self {
        Self {
            color:           cfg.alert_color,
            log_window:      cfg.trigger_lifetime,
            record_lifetime: cfg.trigger_record_lifetime,
        }
    }

    fn summary(&self) -> String {
        format!(
            "Because an atypical burst of members joined the guild, the guild's verification \
             level was raised to `{}` and all admins were informed.\n\n\
             All users joining from now on are saved in a join log for the following {}. \
             The log is kept for {} in total.",
            VerificationLevel::STRICTEST,
            human_duration(self.log_window),
            human_duration(self.record_lifetime),
        )
    }

    /// Private alert for owners and administrators.
    pub fn admin_alert(&self, space: &SpaceInfo, admission_error: Option<&str>) -> Alert {
        let mut description = format!(
            "A guild you are an admin of is currently being raided!\n\n**{} (`{}`)**\n\n{}",
            space.name, space.id, self.summary(),
        );
        if let Some(err) = admission_error {
            description.push_str(&format!(
                "\n\n**Attention:** Failed to raise the guild's verification level because \
                 the following error occurred:\n```\n{}\n```",
                err,
            ));
        }
        Alert { title: ALERT_TITLE.into(), description, color: self.color }
    }

    /// Shorter notice for the mod-log channel.
    pub fn mod_log_notice(&self) -> Alert {
        Alert { title: ALERT_TITLE.into(), description: self.summary(), color: self.color }
    }
}

/// "24 hours", "90 minutes", "1 hour", "45 seconds".
pub fn human_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (n, unit) = if secs >= 3600 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if n == 1 { format!("1 {unit}") } else { format!("{n} {unit}s") }
}

// ── Protocol ──────────────────────────────────────────────────────────────────

pub struct Escalation {
    directory:    Arc<dyn DirectoryCache>,
    admission:    Arc<dyn AdmissionControl>,
    notifier:     Arc<dyn NotificationSink>,
    verification: Arc<dyn VerificationGate>,
    settings:     SettingsResolver,
    template:     AlertTemplate,
    reporter:     Reporter,
}

impl Escalation {
    pub fn new(collab: &Collaborators, template: AlertTemplate, reporter: Reporter) -> Self {
        Self {
            directory:    Arc::clone(&collab.directory),
            admission:    Arc::clone(&collab.admission),
            notifier:     Arc::clone(&collab.notifier),
            verification: Arc::clone(&collab.verification),
            settings:     SettingsResolver::new(Arc::clone(&collab.settings)),
            template,
            reporter,
        }
    }

    pub async fn run(&self, join: &MemberJoin) -> EscalationReport {
        let space_id = join.space_id.as_str();
        let mut report = EscalationReport::default();

        let admission_error = match self.admission
            .set_verification_level(space_id, VerificationLevel::STRICTEST).await
        {
            Ok(()) => {
                report.admission_raised = true;
                None
            }
            Err(e) => {
                self.reporter.error(space_id, None, &format!("Failed setting guild verification level: {e}")).await;
                Some(e.to_string())
            }
        };

        if let Some((recipients, delivered)) = self.alert_admins(space_id, admission_error.as_deref()).await {
            report.recipients = recipients;
            report.delivered  = delivered;
        }

        report.mod_log_notified     = self.notify_mod_log(space_id).await;
        report.verification_enabled = self.force_verification(space_id).await;

        info!(
            space = space_id, actor = %join.actor_id,
            admission_raised = report.admission_raised,
            delivered = report.delivered, recipients = report.recipients,
            mod_log = report.mod_log_notified, verification = report.verification_enabled,
            "raid escalation finished"
        );
        report
    }

    /// DMs every owner/admin. `None` if the roster could not be resolved.
    async fn alert_admins(&self, space_id: &str, admission_error: Option<&str>) -> Option<(usize, usize)> {
        let space = match self.directory.get_space(space_id, true).await {
            Ok(s) => s,
            Err(e) => {
                self.reporter.error(space_id, None, &format!("Failed getting guild: {e}")).await;
                return None;
            }
        };
        let members = match self.directory.list_members(space_id).await {
            Ok(m) => m,
            Err(e) => {
                self.reporter.error(space_id, None, &format!("Failed getting guild members: {e}")).await;
                return None;
            }
        };

        let alert = self.template.admin_alert(&space, admission_error);
        let mut recipients = 0;
        let mut delivered  = 0;
        for member in members.iter().filter(|m| space.is_privileged(m)) {
            recipients += 1;
            match self.notifier.send_direct(&member.user_id, &alert).await {
                Ok(()) => delivered += 1,
                Err(e) => debug!(space = space_id, recipient = %member.user_id, error = %e, "raid alert DM failed"),
            }
        }
        Some((recipients, delivered))
    }

    async fn notify_mod_log(&self, space_id: &str) -> bool {
        let channel = match self.notifier.mod_log_channel(space_id).await {
            Ok(c) => c,
            Err(CollabError::NotFound) => return false,
            Err(e) => {
                self.reporter.error(space_id, None, &format!("Failed getting mod log channel: {e}")).await;
                return false;
            }
        };
        match self.notifier.send_to_channel(&channel, &self.template.mod_log_notice()).await {
            Ok(()) => true,
            Err(e) => {
                self.reporter.error(space_id, None, &format!("Failed sending raid notice to mod log: {e}")).await;
                false
            }
        }
    }

    async fn force_verification(&self, space_id: &str) -> bool {
        match self.settings.auto_verify(space_id).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                self.reporter.error(space_id, None, &e.to_string()).await;
                return false;
            }
        }
        match self.verification.set_enabled(space_id, true).await {
            Ok(()) => true,
            Err(e) => {
                self.reporter.error(space_id, None, &format!("Failed enabling verification: {e}")).await;
                false
            }
        }
    }
}
