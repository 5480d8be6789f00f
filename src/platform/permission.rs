//! Microphone permission adapter.

use async_trait::async_trait;
use serde::Serialize;

/// Last known microphone permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// Not queried yet.
    #[default]
    Unknown,
    /// The user has not decided; a request will prompt.
    Prompt,
    Granted,
    Denied,
}

impl PermissionState {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionState::Granted)
    }
}

/// Async interface to the platform permission API.
///
/// Implementors must be `Send + Sync` so they can be shared behind an
/// `Arc<dyn MicrophoneAccess>` and called from spawned tasks.
#[async_trait]
pub trait MicrophoneAccess: Send + Sync {
    /// Current permission without prompting.
    async fn query(&self) -> PermissionState;

    /// Ask the user for access.  Resolves to `Granted` or `Denied`.
    async fn request(&self) -> PermissionState;
}
