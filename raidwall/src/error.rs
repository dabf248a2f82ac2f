// raidwall/src/error.rs
//
// Error taxonomy shared by the collaborator traits and the engine.
//
//   CollabError::NotFound  "unset" / "nothing there"; callers treat it as
//                          absent state and never log it as a failure
//   CollabError::*         real collaborator failures, logged with context
//   SettingsError          a settings read failed; monitoring is treated as
//                          inactive for the current event only
//   IngestError            a raw join record could not be turned into a join

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollabError {
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Backend(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl CollabError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

pub type CollabResult<T> = Result<T, CollabError>;

/// Maps `NotFound` to a fallback value and keeps every other error.
pub trait UnsetAs<T> {
    fn unset_as(self, fallback: T) -> CollabResult<T>;
}

impl<T> UnsetAs<T> for CollabResult<T> {
    fn unset_as(self, fallback: T) -> CollabResult<T> {
        match self {
            Err(CollabError::NotFound) => Ok(fallback),
            other => other,
        }
    }
}

#[derive(Debug, Error)]
#[error("failed getting antiraid {setting}: {source}")]
pub struct SettingsError {
    pub setting: &'static str,
    #[source]
    pub source: CollabError,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("user id {0:?} is not a valid snowflake and no creation time was given")]
    InvalidSnowflake(String),

    #[error("join record has an empty {0}")]
    MissingField(&'static str),
}
