use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Fixed palette tokens shared by stages and sections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteColor {
    #[default]
    Gray,
    Blue,
    Green,
    Yellow,
    Orange,
    Red,
    Purple,
    Pink,
    Teal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Slug, unique within a pipeline. Doubles as the lane key.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: PaletteColor,
    /// Display sequence. Not required to be contiguous.
    #[serde(default)]
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: PaletteColor,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub card_ids: Vec<String>,
}

/// Per-stage view. `card_ids` holds only the cards with no section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lane {
    pub id: String,
    pub stage: Stage,
    #[serde(default)]
    pub card_ids: Vec<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Lane {
    pub fn from_stage(stage: Stage) -> Self {
        Self {
            id: stage.id.clone(),
            stage,
            card_ids: Vec::new(),
            sections: Vec::new(),
        }
    }

    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == section_id)
    }

    pub fn section_mut(&mut self, section_id: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.id == section_id)
    }

    /// All card ids of the stage: unsectioned first, then section by section.
    pub fn all_card_ids(&self) -> Vec<&str> {
        self.card_ids
            .iter()
            .chain(self.sections.iter().flat_map(|s| s.card_ids.iter()))
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    #[default]
    Staff,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl TeamMember {
    /// Up to two initials, used when no avatar is set.
    pub fn initials(&self) -> String {
        self.name
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .take(2)
            .flat_map(char::to_uppercase)
            .collect()
    }

    pub fn email_local_part(&self) -> Option<&str> {
        self.email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .filter(|local| !local.is_empty())
    }

    /// Case-insensitive match of a mention token against name or email local part.
    pub fn answers_to(&self, token: &str) -> bool {
        let token = token.to_lowercase();
        self.name.to_lowercase() == token
            || self
                .email_local_part()
                .is_some_and(|local| local.to_lowercase() == token)
    }

    pub fn is_manager(&self) -> bool {
        self.role == Role::Manager
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialHandle {
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactChannels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<SocialHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiktok: Option<SocialHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<SocialHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube: Option<SocialHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketplace: Option<SocialHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEventType {
    StageChange,
    AssignmentChange,
    NoteAdded,
    FileAdded,
    CardCreated,
    TierChange,
    ActivityPhaseChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: HistoryEventType,
    pub timestamp: DateTime<Utc>,
    /// The actor.
    pub user: TeamMember,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl HistoryEvent {
    pub fn new(kind: HistoryEventType, user: &TeamMember, details: BTreeMap<String, String>) -> Self {
        Self {
            id: crate::ids::new_id(),
            kind,
            timestamp: Utc::now(),
            user: user.clone(),
            details,
        }
    }

    /// Event carrying a `{from, to}` pair.
    pub fn transition(
        kind: HistoryEventType,
        user: &TeamMember,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        let details = BTreeMap::from([
            ("from".to_string(), from.into()),
            ("to".to_string(), to.into()),
        ]);
        Self::new(kind, user, details)
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }

    /// One-line rendering for the activity timeline.
    pub fn summary(&self) -> String {
        let from = self.detail("from").unwrap_or_default();
        let to = self.detail("to").unwrap_or_default();
        let actor = &self.user.name;
        match self.kind {
            HistoryEventType::StageChange => format!("{actor} moved the card from {from} to {to}"),
            HistoryEventType::AssignmentChange => format!("{actor} assigned the card to {to}"),
            HistoryEventType::NoteAdded => format!("{actor} added a note"),
            HistoryEventType::FileAdded => format!(
                "{actor} attached {}",
                self.detail("fileName").unwrap_or("a file")
            ),
            HistoryEventType::CardCreated => format!("{actor} created the card"),
            HistoryEventType::TierChange => format!("{actor} changed the tier from {from} to {to}"),
            HistoryEventType::ActivityPhaseChange => format!(
                "{actor} changed the activity phase from {} to {}",
                or_none(from),
                or_none(to)
            ),
        }
    }
}

fn or_none(value: &str) -> &str {
    if value.is_empty() {
        "None"
    } else {
        value
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub text: String,
    pub author: TeamMember,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Document,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub id: String,
    pub name: String,
    pub url: String,
    pub mime_type: String,
    pub kind: FileKind,
    pub uploaded_by: TeamMember,
    pub uploaded_at: DateTime<Utc>,
}

/// An uploaded file handed to `add_note`. Storage of the bytes happens elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadCard {
    pub id: String,
    pub client_name: String,
    pub stage_id: String,
    pub subscription_tier: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub contacts: ContactChannels,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<TeamMember>,
    #[serde(default)]
    pub collaborators: Vec<TeamMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_phase: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// User ids notified on every update.
    #[serde(default)]
    pub watchers: Vec<String>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub history: Vec<HistoryEvent>,
    #[serde(default)]
    pub files: Vec<FileAttachment>,
}

impl LeadCard {
    /// Ephemeral card for the "add card" form. Not part of any board until saved.
    pub fn draft(stage_id: impl Into<String>, subscription_tier: impl Into<String>) -> Self {
        Self {
            id: crate::ids::new_id(),
            client_name: String::new(),
            stage_id: stage_id.into(),
            subscription_tier: subscription_tier.into(),
            start_date: Utc::now().date_naive(),
            contacts: ContactChannels::default(),
            deal_value: None,
            live_url: None,
            section_id: None,
            assigned_to: None,
            collaborators: Vec::new(),
            activity_phase: None,
            tags: Vec::new(),
            watchers: Vec::new(),
            notes: Vec::new(),
            history: Vec::new(),
            files: Vec::new(),
        }
    }

    /// History, most recent first.
    pub fn timeline(&self) -> impl Iterator<Item = &HistoryEvent> {
        self.history.iter().rev()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    /// Recipient.
    pub user_id: String,
    pub card_id: String,
    pub client_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub pipeline_id: String,
    #[serde(default)]
    pub read: bool,
}

/// Root aggregate held by the board store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardState {
    pub lanes: Vec<Lane>,
    pub cards: HashMap<String, LeadCard>,
    pub stages: Vec<Stage>,
    pub team_members: Vec<TeamMember>,
    #[serde(default)]
    pub activity_phases: Vec<String>,
    #[serde(default)]
    pub subscription_tiers: Vec<String>,
}

impl BoardState {
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty() && self.cards.is_empty()
    }

    pub fn lane(&self, lane_id: &str) -> Option<&Lane> {
        self.lanes.iter().find(|l| l.id == lane_id)
    }

    pub fn lane_mut(&mut self, lane_id: &str) -> Option<&mut Lane> {
        self.lanes.iter_mut().find(|l| l.id == lane_id)
    }

    pub fn stage(&self, stage_id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }

    /// Display name of a stage, falling back to its id.
    pub fn stage_name(&self, stage_id: &str) -> String {
        self.stage(stage_id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| stage_id.to_string())
    }

    pub fn member(&self, member_id: &str) -> Option<&TeamMember> {
        self.team_members.iter().find(|m| m.id == member_id)
    }

    /// Cards of a stage in display order, each exactly once.
    pub fn cards_in_stage(&self, stage_id: &str) -> Vec<&LeadCard> {
        self.lane(stage_id)
            .map(|lane| {
                lane.all_card_ids()
                    .into_iter()
                    .filter_map(|id| self.cards.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rebuild `stages` from the lane sequence so both stay order-synchronized.
    pub fn sync_stages_from_lanes(&mut self) {
        self.stages = self.lanes.iter().map(|l| l.stage.clone()).collect();
    }

    /// Every broken membership or reference invariant, as human readable lines.
    pub fn membership_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let mut seen: HashMap<&str, usize> = HashMap::new();

        let lane_ids: Vec<&str> = self.lanes.iter().map(|l| l.id.as_str()).collect();
        let stage_ids: Vec<&str> = self.stages.iter().map(|s| s.id.as_str()).collect();
        if lane_ids != stage_ids {
            violations.push(format!(
                "lanes {:?} out of sync with stages {:?}",
                lane_ids, stage_ids
            ));
        }

        for lane in &self.lanes {
            if lane.stage.id != lane.id {
                violations.push(format!("lane {} mirrors stage {}", lane.id, lane.stage.id));
            }
            let mut lists: Vec<(Option<&str>, &Vec<String>)> = vec![(None, &lane.card_ids)];
            lists.extend(lane.sections.iter().map(|s| (Some(s.id.as_str()), &s.card_ids)));

            for (section_id, ids) in lists {
                for id in ids {
                    *seen.entry(id.as_str()).or_default() += 1;
                    let Some(card) = self.cards.get(id) else {
                        violations.push(format!("lane {} references missing card {}", lane.id, id));
                        continue;
                    };
                    if card.stage_id != lane.id {
                        violations.push(format!(
                            "card {} listed in lane {} but has stage {}",
                            id, lane.id, card.stage_id
                        ));
                    }
                    if card.section_id.as_deref() != section_id {
                        violations.push(format!(
                            "card {} listed under section {:?} but has section {:?}",
                            id, section_id, card.section_id
                        ));
                    }
                }
            }
        }

        for id in self.cards.keys() {
            match seen.get(id.as_str()).copied().unwrap_or(0) {
                1 => {}
                0 => violations.push(format!("card {} is not listed in any lane", id)),
                n => violations.push(format!("card {} is listed {} times", id, n)),
            }
        }
        violations
    }
}
