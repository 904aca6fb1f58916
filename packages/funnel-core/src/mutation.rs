/// Card mutation and history engine.
///
/// Every card edit funnels through `update_card`. The specialised helpers
/// build a `CardPatch` and delegate, so history and notification rules live
/// in one place. Functions mutate the aggregate in place and return the
/// effects the change implies; they never perform I/O.
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Deserializer};

use crate::board::membership::{detach_everywhere, place_card, CardMove, Placement};
use crate::board::BoardError;
use crate::config::{UNASSIGNED_LABEL, WATCHER_MESSAGE};
use crate::effect::Effect;
use crate::ids;
use crate::media;
use crate::notify;
use crate::types::*;

/// Tri-state field update: leave alone, clear, or replace.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Set(v),
            None => Patch::Clear,
        }
    }

    /// Write into `slot`; a no-op for `Keep`.
    fn apply_to(self, slot: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Clear => *slot = None,
            Patch::Set(v) => *slot = Some(v),
        }
    }
}

/// A JSON field that is absent stays `Keep` (via `#[serde(default)]`),
/// `null` becomes `Clear`, anything else `Set`.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Patch::from_option)
    }
}

/// Partial card update. Each present field fully replaces the prior value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CardPatch {
    pub client_name: Option<String>,
    pub stage_id: Option<String>,
    pub subscription_tier: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub contacts: Option<ContactChannels>,
    pub deal_value: Patch<f64>,
    pub live_url: Patch<String>,
    pub section_id: Patch<String>,
    pub assigned_to: Patch<TeamMember>,
    pub collaborators: Option<Vec<TeamMember>>,
    pub activity_phase: Patch<String>,
    pub tags: Option<Vec<String>>,
    pub watchers: Option<Vec<String>>,
}

impl CardPatch {
    /// Fill a draft from the form fields. Drafts have no history, so nothing
    /// is audited; `stage_id` and `section_id` only pick the target lane.
    pub fn fill_draft(self, draft: &mut LeadCard) {
        if let Some(client_name) = self.client_name {
            draft.client_name = client_name;
        }
        if let Some(stage_id) = self.stage_id {
            draft.stage_id = stage_id;
        }
        if let Some(tier) = self.subscription_tier {
            draft.subscription_tier = tier;
        }
        if let Some(start_date) = self.start_date {
            draft.start_date = start_date;
        }
        if let Some(contacts) = self.contacts {
            draft.contacts = contacts;
        }
        self.deal_value.apply_to(&mut draft.deal_value);
        self.live_url.apply_to(&mut draft.live_url);
        self.section_id.apply_to(&mut draft.section_id);
        self.assigned_to.apply_to(&mut draft.assigned_to);
        self.activity_phase.apply_to(&mut draft.activity_phase);
        if let Some(collaborators) = self.collaborators {
            draft.collaborators = collaborators;
        }
        if let Some(tags) = self.tags {
            draft.tags = tags;
        }
        if let Some(watchers) = self.watchers {
            draft.watchers = watchers;
        }
    }
}

/// Who is acting, and in which pipeline.
#[derive(Debug, Clone, Copy)]
pub struct MutationContext<'a> {
    pub actor: &'a TeamMember,
    pub pipeline_id: &'a str,
}

/// Merge `patch` into the card, reconcile lane membership when the stage or
/// section changes, and append history for stage, assignment, tier and
/// activity-phase transitions.
pub fn update_card(
    state: &mut BoardState,
    ctx: MutationContext<'_>,
    card_id: &str,
    patch: CardPatch,
) -> Vec<Effect> {
    let Some(before) = state.cards.get(card_id).cloned() else {
        log::debug!("[funnel.mutation] update_card: unknown card {}", card_id);
        return Vec::new();
    };
    let actor = ctx.actor;
    let mut events = Vec::new();

    let new_stage = patch
        .stage_id
        .as_ref()
        .filter(|stage_id| **stage_id != before.stage_id);
    let placement = match (new_stage, &patch.section_id) {
        (Some(stage_id), Patch::Set(section_id)) => Some(Placement::section(stage_id.as_str(), section_id.as_str())),
        (Some(stage_id), _) => Some(Placement::lane(stage_id.as_str())),
        (None, Patch::Set(section_id)) if before.section_id.as_ref() != Some(section_id) => {
            Some(Placement::section(before.stage_id.as_str(), section_id.as_str()))
        }
        (None, Patch::Clear) if before.section_id.is_some() => Some(Placement::lane(before.stage_id.as_str())),
        _ => None,
    };
    if let Some(placement) = placement {
        if let Some(card_move) = place_card(state, card_id, &placement) {
            events.extend(stage_change_event(state, actor, &card_move));
        }
    }

    let Some(card) = state.cards.get_mut(card_id) else {
        return Vec::new();
    };

    if let Some(client_name) = patch.client_name {
        card.client_name = client_name;
    }
    if let Some(tier) = patch.subscription_tier {
        if tier != card.subscription_tier {
            events.push(HistoryEvent::transition(
                HistoryEventType::TierChange,
                actor,
                card.subscription_tier.clone(),
                tier.clone(),
            ));
            card.subscription_tier = tier;
        }
    }
    if let Some(start_date) = patch.start_date {
        card.start_date = start_date;
    }
    if let Some(contacts) = patch.contacts {
        card.contacts = contacts;
    }
    patch.deal_value.apply_to(&mut card.deal_value);
    patch.live_url.apply_to(&mut card.live_url);

    let assignee_changed = match &patch.assigned_to {
        Patch::Keep => false,
        Patch::Clear => card.assigned_to.is_some(),
        Patch::Set(member) => card.assigned_to.as_ref().map(|m| &m.id) != Some(&member.id),
    };
    if assignee_changed {
        let to = match &patch.assigned_to {
            Patch::Set(member) => member.name.clone(),
            _ => UNASSIGNED_LABEL.to_string(),
        };
        events.push(HistoryEvent::transition(
            HistoryEventType::AssignmentChange,
            actor,
            assignee_label(card.assigned_to.as_ref()),
            to,
        ));
    }
    patch.assigned_to.apply_to(&mut card.assigned_to);

    if let Some(collaborators) = patch.collaborators {
        card.collaborators = collaborators;
    }

    if !patch.activity_phase.is_keep() {
        let old = card.activity_phase.clone().unwrap_or_default();
        let new = match &patch.activity_phase {
            Patch::Set(phase) => phase.clone(),
            _ => String::new(),
        };
        if old != new {
            events.push(HistoryEvent::transition(
                HistoryEventType::ActivityPhaseChange,
                actor,
                old,
                new.clone(),
            ));
        }
        card.activity_phase = Some(new).filter(|p| !p.is_empty());
    }

    if let Some(tags) = patch.tags {
        card.tags = tags;
    }
    if let Some(watchers) = patch.watchers {
        card.watchers = watchers;
    }
    card.history.extend(events);
    if *card == before {
        log::debug!("[funnel.mutation] update_card: nothing changed on {}", card_id);
        return Vec::new();
    }

    finish(state, ctx, card_id, &[])
}

/// Audit a membership change already made by `place_card` (a card drag)
/// and produce its effects. Only stage changes are recorded in history.
pub fn record_move(state: &mut BoardState, ctx: MutationContext<'_>, card_move: &CardMove) -> Vec<Effect> {
    let event = stage_change_event(state, ctx.actor, card_move);
    let Some(card) = state.cards.get_mut(&card_move.card_id) else {
        return Vec::new();
    };
    card.history.extend(event);
    finish(state, ctx, &card_move.card_id, &[])
}

/// Assign the card to the acting user. Always audited, even when the actor
/// already holds the card.
pub fn take_card(state: &mut BoardState, ctx: MutationContext<'_>, card_id: &str) -> Vec<Effect> {
    let Some(card) = state.cards.get_mut(card_id) else {
        return Vec::new();
    };
    let already_held = card.assigned_to.as_ref().is_some_and(|m| m.id == ctx.actor.id);
    if !already_held {
        let patch = CardPatch {
            assigned_to: Patch::Set(ctx.actor.clone()),
            ..Default::default()
        };
        return update_card(state, ctx, card_id, patch);
    }
    card.history.push(HistoryEvent::transition(
        HistoryEventType::AssignmentChange,
        ctx.actor,
        ctx.actor.name.clone(),
        ctx.actor.name.clone(),
    ));
    finish(state, ctx, card_id, &[])
}

/// Assign to a team member by id, or unassign with `None`.
/// Unknown member ids leave the card untouched.
pub fn change_assignee(
    state: &mut BoardState,
    ctx: MutationContext<'_>,
    card_id: &str,
    member_id: Option<&str>,
) -> Vec<Effect> {
    let assigned_to = match member_id {
        Some(member_id) => match state.member(member_id) {
            Some(member) => Patch::Set(member.clone()),
            None => {
                log::debug!("[funnel.mutation] change_assignee: unknown member {}", member_id);
                return Vec::new();
            }
        },
        None => Patch::Clear,
    };
    let patch = CardPatch {
        assigned_to,
        ..Default::default()
    };
    update_card(state, ctx, card_id, patch)
}

pub fn change_stage(
    state: &mut BoardState,
    ctx: MutationContext<'_>,
    card_id: &str,
    stage_id: &str,
) -> Vec<Effect> {
    let patch = CardPatch {
        stage_id: Some(stage_id.to_string()),
        ..Default::default()
    };
    update_card(state, ctx, card_id, patch)
}

pub fn change_tier(state: &mut BoardState, ctx: MutationContext<'_>, card_id: &str, tier: &str) -> Vec<Effect> {
    let patch = CardPatch {
        subscription_tier: Some(tier.to_string()),
        ..Default::default()
    };
    update_card(state, ctx, card_id, patch)
}

/// Set or clear (`None` / empty) the activity phase.
pub fn change_activity_phase(
    state: &mut BoardState,
    ctx: MutationContext<'_>,
    card_id: &str,
    phase: Option<&str>,
) -> Vec<Effect> {
    let phase = phase.map(str::trim).filter(|p| !p.is_empty());
    let patch = CardPatch {
        activity_phase: Patch::from_option(phase.map(str::to_string)),
        ..Default::default()
    };
    update_card(state, ctx, card_id, patch)
}

/// Append a note and/or attachments, audit them, and notify mentioned
/// members. Blank text with no attachments is ignored.
pub fn add_note(
    state: &mut BoardState,
    ctx: MutationContext<'_>,
    card_id: &str,
    text: &str,
    attachments: Vec<UploadedFile>,
) -> Vec<Effect> {
    let text = text.trim();
    if text.is_empty() && attachments.is_empty() {
        return Vec::new();
    }
    let mentioned: Vec<String> = notify::mentioned_members(text, &state.team_members)
        .into_iter()
        .filter(|m| m.id != ctx.actor.id)
        .map(|m| m.id.clone())
        .collect();

    let Some(card) = state.cards.get_mut(card_id) else {
        log::debug!("[funnel.mutation] add_note: unknown card {}", card_id);
        return Vec::new();
    };
    let now = Utc::now();

    if !text.is_empty() {
        card.notes.push(Note {
            id: ids::new_id(),
            text: text.to_string(),
            author: ctx.actor.clone(),
            created_at: now,
        });
        card.history.push(HistoryEvent::new(
            HistoryEventType::NoteAdded,
            ctx.actor,
            [("note".to_string(), text.to_string())].into(),
        ));
    }

    for upload in attachments {
        let mime_type = media::resolve_mime(&upload.name, &upload.mime_type);
        card.history.push(HistoryEvent::new(
            HistoryEventType::FileAdded,
            ctx.actor,
            [("fileName".to_string(), upload.name.clone())].into(),
        ));
        card.files.push(FileAttachment {
            id: ids::new_id(),
            kind: media::file_kind(&mime_type),
            name: upload.name,
            url: upload.url,
            mime_type,
            uploaded_by: ctx.actor.clone(),
            uploaded_at: now,
        });
    }

    let mention_notes = notify::fan_out(card, mentioned.clone(), text, ctx.pipeline_id);
    let mut effects = finish(state, ctx, card_id, &mentioned);
    effects.extend(mention_notes.into_iter().map(Effect::Notify));
    effects
}

/// Remove the card from the card map and from every list on the board.
pub fn delete_card(state: &mut BoardState, card_id: &str) -> Vec<Effect> {
    let existed = state.cards.remove(card_id).is_some();
    let detached = detach_everywhere(state, card_id);
    if existed || detached > 0 {
        vec![Effect::DeleteCard(card_id.to_string())]
    } else {
        Vec::new()
    }
}

/// Promote a draft into the board. Validation happens before anything is
/// touched; on success the card is listed exactly once in its lane.
pub fn promote_draft(
    state: &mut BoardState,
    ctx: MutationContext<'_>,
    mut draft: LeadCard,
) -> Result<Vec<Effect>, BoardError> {
    let client_name = draft.client_name.trim().to_string();
    if client_name.is_empty() {
        return Err(BoardError::MissingClientName);
    }
    let Some(lane) = state.lane(&draft.stage_id) else {
        return Err(BoardError::UnknownStage(draft.stage_id));
    };
    if state.cards.contains_key(&draft.id) {
        return Err(BoardError::DuplicateCard(draft.id));
    }
    let placement = match draft.section_id.take() {
        Some(section_id) if lane.section(&section_id).is_some() => {
            Placement::section(lane.id.as_str(), section_id)
        }
        _ => Placement::lane(lane.id.as_str()),
    };

    draft.client_name = client_name;
    draft.history.push(HistoryEvent::new(
        HistoryEventType::CardCreated,
        ctx.actor,
        Default::default(),
    ));
    let card_id = draft.id.clone();
    state.cards.insert(card_id.clone(), draft);
    place_card(state, &card_id, &placement);

    Ok(state
        .cards
        .get(&card_id)
        .map(|card| vec![Effect::CreateCard(Box::new(card.clone()))])
        .unwrap_or_default())
}

fn stage_change_event(state: &BoardState, actor: &TeamMember, card_move: &CardMove) -> Option<HistoryEvent> {
    card_move.stage_changed().then(|| {
        HistoryEvent::transition(
            HistoryEventType::StageChange,
            actor,
            state.stage_name(&card_move.from_stage_id),
            state.stage_name(&card_move.to_stage_id),
        )
    })
}

fn assignee_label(member: Option<&TeamMember>) -> String {
    member
        .map(|m| m.name.clone())
        .unwrap_or_else(|| UNASSIGNED_LABEL.to_string())
}

/// Save effect for the card plus watcher notifications, skipping the actor
/// and anyone in `already_notified`.
fn finish(
    state: &BoardState,
    ctx: MutationContext<'_>,
    card_id: &str,
    already_notified: &[String],
) -> Vec<Effect> {
    let Some(card) = state.cards.get(card_id) else {
        return Vec::new();
    };
    let targets = notify::watcher_targets(card, &ctx.actor.id)
        .into_iter()
        .filter(|id| !already_notified.contains(id));
    let mut effects = vec![Effect::save_card(card)];
    effects.extend(
        notify::fan_out(card, targets, WATCHER_MESSAGE, ctx.pipeline_id)
            .into_iter()
            .map(Effect::Notify),
    );
    effects
}
