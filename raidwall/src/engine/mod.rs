pub mod antiraid;
pub mod escalation;
pub mod settings;

use std::sync::Arc;

use tracing::{error, warn};

use crate::collab::GuildLog;

/// Guild log section all engine errors are filed under.
pub const LOG_SECTION: &str = "antiraid";

/// Sends collaborator failures to both the process log and the space's
/// operator-visible guild log.
#[derive(Clone)]
pub struct Reporter {
    guild_log: Arc<dyn GuildLog>,
}

impl Reporter {
    pub fn new(guild_log: Arc<dyn GuildLog>) -> Self {
        Self { guild_log }
    }

    pub async fn error(&self, space_id: &str, actor_id: Option<&str>, message: &str) {
        error!(space = space_id, actor = actor_id.unwrap_or("-"), "{}", message);
        if let Err(e) = self.guild_log.error(space_id, LOG_SECTION, message).await {
            warn!(space = space_id, error = %e, "guild log write failed");
        }
    }
}
