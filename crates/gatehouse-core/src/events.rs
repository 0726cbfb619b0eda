//! Change notifications emitted by settings documents.
//!
//! Every successful write produces exactly one event carrying the same
//! change list that was handed to the provider.

use crate::settings::SettingsChange;

/// Settings lifecycle events.
#[derive(Debug, Clone)]
pub enum SettingsEvent {
    /// A document was written for the first time (provider `create`).
    Created {
        gateway: String,
        id: String,
        changes: Vec<SettingsChange>,
    },

    /// An existing document was changed (provider `update`).
    Updated {
        gateway: String,
        id: String,
        changes: Vec<SettingsChange>,
    },

    /// A document was synchronized with its provider.
    Synced {
        gateway: String,
        id: String,
        exists: bool,
    },

    /// A document was destroyed and reset to defaults.
    Deleted { gateway: String, id: String },
}

impl SettingsEvent {
    /// Name of the gateway the document belongs to.
    pub fn gateway(&self) -> &str {
        match self {
            Self::Created { gateway, .. }
            | Self::Updated { gateway, .. }
            | Self::Synced { gateway, .. }
            | Self::Deleted { gateway, .. } => gateway,
        }
    }

    /// Id of the document.
    pub fn id(&self) -> &str {
        match self {
            Self::Created { id, .. }
            | Self::Updated { id, .. }
            | Self::Synced { id, .. }
            | Self::Deleted { id, .. } => id,
        }
    }

    /// Changes carried by the event (empty for sync/delete).
    pub fn changes(&self) -> &[SettingsChange] {
        match self {
            Self::Created { changes, .. } | Self::Updated { changes, .. } => changes,
            Self::Synced { .. } | Self::Deleted { .. } => &[],
        }
    }
}
