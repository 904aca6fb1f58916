/// Shared configuration constants and types used by the board engine and the backend.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{PaletteColor, Role, TeamMember};

/// Interval between unread-notification polls.
pub const UNREAD_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Message carried by watcher notifications.
pub const WATCHER_MESSAGE: &str = "Card updated";

/// Assignment history label when nobody holds the card.
pub const UNASSIGNED_LABEL: &str = "Unassigned";

/// A stage created for pipelines that have none yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultStage {
    pub name: String,
    pub color: PaletteColor,
}

pub fn default_stage_set() -> Vec<DefaultStage> {
    [
        ("New", PaletteColor::Blue),
        ("Called", PaletteColor::Yellow),
        ("Onboard", PaletteColor::Purple),
        ("Live", PaletteColor::Green),
        ("Lost", PaletteColor::Red),
    ]
    .into_iter()
    .map(|(name, color)| DefaultStage {
        name: name.to_string(),
        color,
    })
    .collect()
}

/// Tiers offered when the pipeline has not configured its own.
pub fn default_subscription_tiers() -> Vec<String> {
    ["basic", "pro", "enterprise"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Acting user identity as stored on disk by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub manager: bool,
}

impl UserIdentity {
    pub fn member(&self) -> TeamMember {
        TeamMember {
            id: self.id.clone(),
            name: self.name.clone(),
            avatar: None,
            role: if self.manager { Role::Manager } else { Role::Staff },
            email: self.email.clone(),
        }
    }
}
