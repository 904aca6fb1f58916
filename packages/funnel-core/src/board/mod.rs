/// Board state store.
///
/// `BoardStore` is the single mutable root of a pipeline's board. Every
/// operation applies to the in-memory aggregate first and returns at once;
/// the effects it produced are handed to the sync worker, which persists
/// them in the background. Only the draft save lets the caller wait for the
/// remote outcome.
pub mod membership;
#[cfg(test)]
pub(crate) mod test_support;

use std::collections::HashSet;

use tokio::sync::oneshot;

use crate::drag::{self, DragOutcome, DragResult, GestureKind};
use crate::effect::Effect;
use crate::ids;
use crate::mutation::{self, CardPatch, MutationContext};
use crate::storage::StorageError;
use crate::sync::{SyncAdapter, SyncReply};
use crate::types::*;
use membership::{place_card, Placement};

/// Errors of the blocking board actions. Incremental edits never fail.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("Client name is required")]
    MissingClientName,

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Card already exists: {0}")]
    DuplicateCard(String),

    #[error("No authenticated user")]
    Unauthenticated,

    #[error("Saved locally, remote write failed: {0}")]
    Remote(#[from] StorageError),
}

/// A draft accepted into the board whose remote write may still be in flight.
#[derive(Debug)]
pub struct PendingSave {
    pub card_id: String,
    reply: Option<SyncReply>,
}

impl PendingSave {
    /// Wait for the store. The card stays on the board whatever the outcome.
    pub async fn confirmed(self) -> Result<String, BoardError> {
        let Some(reply) = self.reply else {
            return Ok(self.card_id);
        };
        match reply.await {
            Ok(Ok(())) => Ok(self.card_id),
            Ok(Err(e)) => Err(BoardError::Remote(e)),
            Err(_) => Err(BoardError::Remote(StorageError::Unavailable(
                "sync worker stopped".into(),
            ))),
        }
    }
}

pub struct BoardStore {
    state: BoardState,
    pipeline_id: String,
    /// Acting user; `None` means read-only degraded mode for audited edits.
    actor: Option<TeamMember>,
    sync: Option<SyncAdapter>,
}

impl BoardStore {
    pub fn new(
        state: BoardState,
        pipeline_id: impl Into<String>,
        actor: Option<TeamMember>,
        sync: Option<SyncAdapter>,
    ) -> Self {
        Self {
            state,
            pipeline_id: pipeline_id.into(),
            actor,
            sync,
        }
    }

    /// A board that never leaves this process.
    pub fn local(state: BoardState, pipeline_id: impl Into<String>, actor: Option<TeamMember>) -> Self {
        Self::new(state, pipeline_id, actor, None)
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn snapshot(&self) -> BoardState {
        self.state.clone()
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn actor(&self) -> Option<&TeamMember> {
        self.actor.as_ref()
    }

    pub fn is_synced(&self) -> bool {
        self.sync.is_some()
    }

    /// Wait until every effect dispatched so far has been attempted remotely.
    pub async fn flush(&self) {
        if let Some(sync) = &self.sync {
            sync.flush().await;
        }
    }

    /// Drain pending writes and stop the sync worker.
    pub async fn dispose(self) {
        if let Some(sync) = self.sync {
            sync.shutdown().await;
        }
        log::debug!("[funnel.board] Disposed board for pipeline {}", self.pipeline_id);
    }

    // ── Stages ──────────────────────────────────────────────────────────

    pub fn add_stage(&mut self, name: &str, color: PaletteColor) -> Stage {
        let id = ids::unique_stage_id(name, self.state.stages.iter().map(|s| s.id.as_str()));
        let order = self.state.stages.iter().map(|s| s.order).max().map_or(0, |m| m + 1);
        let stage = Stage {
            id,
            name: name.trim().to_string(),
            color,
            order,
        };
        self.state.lanes.push(Lane::from_stage(stage.clone()));
        self.state.sync_stages_from_lanes();
        self.dispatch(vec![Effect::CreateStage(stage.clone())]);
        stage
    }

    pub fn rename_or_recolor_stage(
        &mut self,
        stage_id: &str,
        name: Option<&str>,
        color: Option<PaletteColor>,
    ) -> bool {
        let Some(lane) = self.state.lane_mut(stage_id) else {
            log::debug!("[funnel.board] rename_or_recolor_stage: unknown stage {}", stage_id);
            return false;
        };
        if let Some(name) = name {
            lane.stage.name = name.trim().to_string();
        }
        if let Some(color) = color {
            lane.stage.color = color;
        }
        let stage = lane.stage.clone();
        self.state.sync_stages_from_lanes();
        self.dispatch(vec![Effect::SaveStage(stage)]);
        true
    }

    /// Remove a stage and its lane. Its cards move, unsectioned, to the first
    /// remaining stage; with no stage left they are deleted.
    pub fn delete_stage(&mut self, stage_id: &str) -> bool {
        let Some(lane) = self.state.lane(stage_id) else {
            log::debug!("[funnel.board] delete_stage: unknown stage {}", stage_id);
            return false;
        };
        let section_ids: Vec<String> = lane.sections.iter().map(|s| s.id.clone()).collect();
        let mut homeless: Vec<String> = lane.all_card_ids().into_iter().map(str::to_string).collect();
        let mut stage_cards: Vec<&String> = self
            .state
            .cards
            .values()
            .filter(|c| c.stage_id == stage_id)
            .map(|c| &c.id)
            .collect();
        stage_cards.sort();
        for id in stage_cards {
            if !homeless.contains(id) {
                homeless.push(id.clone());
            }
        }
        let fallback = self
            .state
            .lanes
            .iter()
            .find(|l| l.id != stage_id)
            .map(|l| l.id.clone());

        let mut effects = Vec::new();
        for card_id in homeless {
            match &fallback {
                Some(fallback) => {
                    if place_card(&mut self.state, &card_id, &Placement::lane(fallback.as_str())).is_some() {
                        if let Some(card) = self.state.cards.get(&card_id) {
                            effects.push(Effect::save_card(card));
                        }
                    }
                }
                None => effects.extend(mutation::delete_card(&mut self.state, &card_id)),
            }
        }
        effects.extend(section_ids.into_iter().map(|section_id| Effect::DeleteSection {
            stage_id: stage_id.to_string(),
            section_id,
        }));

        self.state.lanes.retain(|l| l.id != stage_id);
        self.state.sync_stages_from_lanes();
        effects.push(Effect::DeleteStage(stage_id.to_string()));
        self.dispatch(effects);
        true
    }

    /// Reorder lanes to follow `stage_ids`. Unknown ids are skipped; lanes
    /// the sequence leaves out keep their relative order at the end.
    pub fn reorder_stages(&mut self, stage_ids: &[String]) -> bool {
        let current: Vec<&str> = self.state.lanes.iter().map(|l| l.id.as_str()).collect();
        let sequence = ordered_ids(&current, stage_ids);
        if sequence == current {
            return false;
        }
        let sequence: Vec<String> = sequence.into_iter().map(str::to_string).collect();
        let mut lanes = std::mem::take(&mut self.state.lanes);
        for id in &sequence {
            if let Some(pos) = lanes.iter().position(|l| &l.id == id) {
                self.state.lanes.push(lanes.remove(pos));
            }
        }
        let changed = drag::renumber_lanes(&mut self.state);
        self.dispatch(changed.into_iter().map(Effect::SaveStage).collect());
        true
    }

    // ── Sections ────────────────────────────────────────────────────────

    pub fn add_section(&mut self, stage_id: &str, name: &str, color: PaletteColor) -> Option<Section> {
        let Some(lane) = self.state.lane_mut(stage_id) else {
            log::debug!("[funnel.board] add_section: unknown stage {}", stage_id);
            return None;
        };
        let mut id = ids::generate_token();
        while lane.section(&id).is_some() {
            id = ids::generate_token();
        }
        let section = Section {
            id,
            name: name.trim().to_string(),
            color,
            order: lane.sections.len() as i64,
            card_ids: Vec::new(),
        };
        lane.sections.push(section.clone());
        self.dispatch(vec![Effect::CreateSection {
            stage_id: stage_id.to_string(),
            section: section.clone(),
        }]);
        Some(section)
    }

    pub fn edit_section(
        &mut self,
        stage_id: &str,
        section_id: &str,
        name: Option<&str>,
        color: Option<PaletteColor>,
    ) -> bool {
        let Some(section) = self
            .state
            .lane_mut(stage_id)
            .and_then(|lane| lane.section_mut(section_id))
        else {
            log::debug!("[funnel.board] edit_section: unknown section {}/{}", stage_id, section_id);
            return false;
        };
        if let Some(name) = name {
            section.name = name.trim().to_string();
        }
        if let Some(color) = color {
            section.color = color;
        }
        let section = section.clone();
        self.dispatch(vec![Effect::SaveSection {
            stage_id: stage_id.to_string(),
            section,
        }]);
        true
    }

    /// Move the section's cards back to the bare lane, then drop the section.
    /// Deleting a section that no longer exists is a no-op.
    pub fn delete_section(&mut self, stage_id: &str, section_id: &str) -> bool {
        let Some(section) = self.state.lane(stage_id).and_then(|l| l.section(section_id)) else {
            log::debug!("[funnel.board] delete_section: unknown section {}/{}", stage_id, section_id);
            return false;
        };
        let mut members: Vec<String> = section
            .card_ids
            .iter()
            .filter(|id| self.state.cards.get(*id).is_some_and(|c| c.stage_id == stage_id))
            .cloned()
            .collect();
        let mut assigned: Vec<&String> = self
            .state
            .cards
            .values()
            .filter(|c| c.stage_id == stage_id && c.section_id.as_deref() == Some(section_id))
            .map(|c| &c.id)
            .collect();
        assigned.sort();
        for id in assigned {
            if !members.contains(id) {
                members.push(id.clone());
            }
        }

        let mut effects = Vec::new();
        for card_id in members {
            if place_card(&mut self.state, &card_id, &Placement::lane(stage_id)).is_some() {
                if let Some(card) = self.state.cards.get(&card_id) {
                    effects.push(Effect::save_card(card));
                }
            }
        }
        if let Some(lane) = self.state.lane_mut(stage_id) {
            lane.sections.retain(|s| s.id != section_id);
        }
        effects.push(Effect::DeleteSection {
            stage_id: stage_id.to_string(),
            section_id: section_id.to_string(),
        });
        self.dispatch(effects);
        true
    }

    pub fn reorder_sections(&mut self, stage_id: &str, section_ids: &[String]) -> bool {
        let Some(lane) = self.state.lane_mut(stage_id) else {
            log::debug!("[funnel.board] reorder_sections: unknown stage {}", stage_id);
            return false;
        };
        let current: Vec<&str> = lane.sections.iter().map(|s| s.id.as_str()).collect();
        let sequence = ordered_ids(&current, section_ids);
        if sequence == current {
            return false;
        }
        let sequence: Vec<String> = sequence.into_iter().map(str::to_string).collect();
        let mut sections = std::mem::take(&mut lane.sections);
        for id in &sequence {
            if let Some(pos) = sections.iter().position(|s| &s.id == id) {
                lane.sections.push(sections.remove(pos));
            }
        }
        let changed = drag::renumber_sections(&mut lane.sections);
        self.dispatch(
            changed
                .into_iter()
                .map(|section| Effect::SaveSection {
                    stage_id: stage_id.to_string(),
                    section,
                })
                .collect(),
        );
        true
    }

    // ── Drag and drop ───────────────────────────────────────────────────

    /// Apply a drag gesture. Card moves are audited and so need an actor.
    pub fn apply_drag(&mut self, gesture: &DragResult) -> DragOutcome {
        if gesture.kind == GestureKind::Card && self.actor.is_none() {
            log::warn!(
                "[funnel.board] Ignoring card drag of {}: no authenticated user",
                gesture.item_id
            );
            return DragOutcome::NoOp;
        }
        let outcome = drag::apply(&mut self.state, gesture);
        let effects = match &outcome {
            DragOutcome::NoOp => Vec::new(),
            DragOutcome::LanesReordered { changed } => {
                changed.iter().cloned().map(Effect::SaveStage).collect()
            }
            DragOutcome::SectionsReordered { lane_id, changed } => changed
                .iter()
                .cloned()
                .map(|section| Effect::SaveSection {
                    stage_id: lane_id.clone(),
                    section,
                })
                .collect(),
            DragOutcome::CardMoved(card_move) => match self.actor.as_ref() {
                Some(actor) => {
                    let ctx = MutationContext {
                        actor,
                        pipeline_id: &self.pipeline_id,
                    };
                    mutation::record_move(&mut self.state, ctx, card_move)
                }
                None => Vec::new(),
            },
        };
        self.dispatch(effects);
        outcome
    }

    // ── Cards ───────────────────────────────────────────────────────────

    pub fn update_card(&mut self, card_id: &str, patch: CardPatch) -> bool {
        self.audited("update_card", |state, ctx| {
            mutation::update_card(state, ctx, card_id, patch)
        })
    }

    pub fn take_card(&mut self, card_id: &str) -> bool {
        self.audited("take_card", |state, ctx| mutation::take_card(state, ctx, card_id))
    }

    pub fn change_assignee(&mut self, card_id: &str, member_id: Option<&str>) -> bool {
        self.audited("change_assignee", |state, ctx| {
            mutation::change_assignee(state, ctx, card_id, member_id)
        })
    }

    pub fn change_stage(&mut self, card_id: &str, stage_id: &str) -> bool {
        self.audited("change_stage", |state, ctx| {
            mutation::change_stage(state, ctx, card_id, stage_id)
        })
    }

    pub fn change_tier(&mut self, card_id: &str, tier: &str) -> bool {
        self.audited("change_tier", |state, ctx| mutation::change_tier(state, ctx, card_id, tier))
    }

    pub fn change_activity_phase(&mut self, card_id: &str, phase: Option<&str>) -> bool {
        self.audited("change_activity_phase", |state, ctx| {
            mutation::change_activity_phase(state, ctx, card_id, phase)
        })
    }

    pub fn add_note(&mut self, card_id: &str, text: &str, attachments: Vec<UploadedFile>) -> bool {
        self.audited("add_note", |state, ctx| {
            mutation::add_note(state, ctx, card_id, text, attachments)
        })
    }

    pub fn delete_card(&mut self, card_id: &str) -> bool {
        let effects = mutation::delete_card(&mut self.state, card_id);
        let deleted = !effects.is_empty();
        self.dispatch(effects);
        deleted
    }

    /// Fresh draft for the "add card" form, not yet part of the board.
    pub fn new_draft(&self, stage_id: &str) -> LeadCard {
        let tier = self
            .state
            .subscription_tiers
            .first()
            .map(String::as_str)
            .unwrap_or("basic");
        LeadCard::draft(stage_id, tier)
    }

    /// Promote a draft into the board. Validation errors are returned before
    /// anything is touched; once accepted, the card is on the board and the
    /// returned handle reports the remote outcome.
    pub fn save_draft(&mut self, draft: LeadCard) -> Result<PendingSave, BoardError> {
        let Some(actor) = self.actor.as_ref() else {
            return Err(BoardError::Unauthenticated);
        };
        let ctx = MutationContext {
            actor,
            pipeline_id: &self.pipeline_id,
        };
        let card_id = draft.id.clone();
        let effects = mutation::promote_draft(&mut self.state, ctx, draft)?;
        log::info!("[funnel.board] Saved card {}", card_id);

        let Some(sync) = &self.sync else {
            return Ok(PendingSave { card_id, reply: None });
        };
        let mut reply = None;
        for effect in effects {
            if matches!(effect, Effect::CreateCard(_)) {
                reply = Some(sync.submit_with_reply(effect));
            } else {
                sync.submit(effect);
            }
        }
        Ok(PendingSave { card_id, reply })
    }

    /// Run an audited mutation as the acting user. Without one the call is
    /// ignored.
    fn audited(
        &mut self,
        operation: &str,
        op: impl FnOnce(&mut BoardState, MutationContext<'_>) -> Vec<Effect>,
    ) -> bool {
        let Some(actor) = self.actor.as_ref() else {
            log::warn!("[funnel.board] Ignoring {}: no authenticated user", operation);
            return false;
        };
        let ctx = MutationContext {
            actor,
            pipeline_id: &self.pipeline_id,
        };
        let effects = op(&mut self.state, ctx);
        let changed = !effects.is_empty();
        self.dispatch(effects);
        changed
    }

    fn dispatch(&self, effects: Vec<Effect>) {
        let Some(sync) = &self.sync else {
            return;
        };
        for effect in effects {
            sync.submit(effect);
        }
    }
}

/// Requested order restricted to known ids (first occurrence wins),
/// followed by the ids the request left out.
fn ordered_ids<'a>(current: &[&'a str], requested: &[String]) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut sequence = Vec::with_capacity(current.len());
    for id in requested {
        if let Some(known) = current.iter().find(|c| **c == id.as_str()) {
            if seen.insert(*known) {
                sequence.push(*known);
            }
        }
    }
    sequence.extend(current.iter().filter(|c| !seen.contains(**c)));
    sequence
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::drag::{DragLocation, DropTarget};
    use crate::storage::memory::MemoryStore;
    use crate::storage::Collection;
    use std::sync::Arc;

    fn store_with(state: BoardState) -> BoardStore {
        BoardStore::local(state, "p1", Some(actor()))
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn card_drag(card_id: &str, from: DropTarget, from_index: usize, to: DropTarget, to_index: usize) -> DragResult {
        DragResult {
            item_id: card_id.to_string(),
            kind: GestureKind::Card,
            source: DragLocation {
                target: from,
                index: from_index,
            },
            destination: Some(DragLocation {
                target: to,
                index: to_index,
            }),
        }
    }

    #[test]
    fn test_add_stage_slug_and_order() {
        let mut board = store_with(board_with_stages(&["new", "called"]));
        let stage = board.add_stage("New", PaletteColor::Teal);
        assert_eq!(stage.id, "new-2");
        assert_eq!(stage.order, 2);
        let stage = board.add_stage("Follow up!", PaletteColor::Teal);
        assert_eq!(stage.id, "follow-up");
        assert_eq!(board.state().lanes.len(), 4);
        assert!(board.state().membership_violations().is_empty());
    }

    #[test]
    fn test_rename_updates_stage_and_lane() {
        let mut board = store_with(board_with_stages(&["new"]));
        assert!(board.rename_or_recolor_stage("new", Some("Fresh"), None));
        assert_eq!(board.state().stages[0].name, "Fresh");
        assert_eq!(board.state().lanes[0].stage.name, "Fresh");
        assert_eq!(board.state().stages[0].color, PaletteColor::Blue);
        assert!(!board.rename_or_recolor_stage("ghost", Some("x"), None));
    }

    #[test]
    fn test_delete_stage_moves_cards_to_first_remaining() {
        let mut state = board_with_stages(&["new", "called", "lost"]);
        add_section(&mut state, "lost", "cold");
        add_card(&mut state, "c1", "lost", None);
        add_card(&mut state, "c2", "lost", Some("cold"));
        let mut board = store_with(state);

        assert!(board.delete_stage("lost"));
        let state = board.state();
        for id in ["c1", "c2"] {
            assert_eq!(state.cards[id].stage_id, "new");
            assert_eq!(state.cards[id].section_id, None);
        }
        assert!(state.stage("lost").is_none());
        assert!(state.lane("lost").is_none());
        assert_eq!(state.lane("new").unwrap().card_ids.len(), 2);
        assert!(state.membership_violations().is_empty());
    }

    #[test]
    fn test_delete_last_stage_deletes_cards() {
        let mut state = board_with_stages(&["new"]);
        add_card(&mut state, "c1", "new", None);
        let mut board = store_with(state);
        assert!(board.delete_stage("new"));
        assert!(board.state().cards.is_empty());
        assert!(board.state().lanes.is_empty());
    }

    #[test]
    fn test_add_then_delete_stage_round_trip() {
        let mut state = board_with_stages(&["new", "called"]);
        add_card(&mut state, "c1", "called", None);
        let mut board = store_with(state);
        let before = board.snapshot();

        let stage = board.add_stage("Trial", PaletteColor::Pink);
        board.change_stage("c1", &stage.id);
        assert_eq!(board.state().cards["c1"].stage_id, "trial");
        board.delete_stage(&stage.id);

        let after = board.state();
        assert_eq!(after.lanes.len(), before.lanes.len());
        assert_eq!(after.stages, before.stages);
        assert_eq!(after.cards["c1"].stage_id, "new");
        assert!(after.membership_violations().is_empty());
    }

    #[test]
    fn test_sections_add_edit_delete() {
        let mut state = board_with_stages(&["onboard"]);
        add_card(&mut state, "c1", "onboard", None);
        let mut board = store_with(state);

        let vip = board.add_section("onboard", "VIP", PaletteColor::Purple).unwrap();
        let std_section = board.add_section("onboard", "VIP", PaletteColor::Gray).unwrap();
        assert_ne!(vip.id, std_section.id);
        assert_eq!(std_section.order, 1);
        assert!(board.add_section("ghost", "x", PaletteColor::Gray).is_none());

        assert!(board.edit_section("onboard", &std_section.id, Some("Standard"), None));
        board.update_card(
            "c1",
            CardPatch {
                section_id: crate::mutation::Patch::Set(vip.id.clone()),
                ..Default::default()
            },
        );
        assert_eq!(board.state().lane("onboard").unwrap().section(&vip.id).unwrap().card_ids, vec!["c1"]);

        assert!(board.delete_section("onboard", &vip.id));
        let lane = board.state().lane("onboard").unwrap();
        assert_eq!(lane.card_ids, vec!["c1"]);
        assert_eq!(lane.sections.len(), 1);
        assert_eq!(lane.sections[0].name, "Standard");
        assert_eq!(board.state().cards["c1"].section_id, None);

        let snapshot = board.snapshot();
        assert!(!board.delete_section("onboard", &vip.id));
        assert_eq!(board.state(), &snapshot);
    }

    #[test]
    fn test_reorder_stages_idempotent_and_persistent() {
        let mut board = store_with(board_with_stages(&["new", "called", "onboard"]));
        let snapshot = board.snapshot();
        assert!(!board.reorder_stages(&ids(&["new", "called", "onboard"])));
        assert_eq!(board.state(), &snapshot);

        assert!(board.reorder_stages(&ids(&["onboard", "ghost", "new"])));
        let order: Vec<&str> = board.state().stages.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, vec!["onboard", "new", "called"]);
        assert_eq!(board.state().lanes[0].stage.order, 0);
        assert!(board.state().membership_violations().is_empty());
    }

    #[test]
    fn test_reorder_sections() {
        let mut state = board_with_stages(&["onboard"]);
        add_section(&mut state, "onboard", "a");
        add_section(&mut state, "onboard", "b");
        let mut board = store_with(state);
        assert!(!board.reorder_sections("onboard", &ids(&["a", "b"])));
        assert!(board.reorder_sections("onboard", &ids(&["b"])));
        let lane = board.state().lane("onboard").unwrap();
        assert_eq!(lane.sections[0].id, "b");
        assert_eq!(lane.sections[0].order, 0);
        assert_eq!(lane.sections[1].order, 1);
    }

    #[test]
    fn test_drag_across_stage_from_section_audits_once() {
        let mut state = board_with_stages(&["new", "called"]);
        add_section(&mut state, "new", "x");
        add_card(&mut state, "c1", "new", Some("x"));
        let mut board = store_with(state);

        let outcome = board.apply_drag(&card_drag(
            "c1",
            DropTarget::Section {
                lane_id: "new".into(),
                section_id: "x".into(),
            },
            0,
            DropTarget::Lane("called".into()),
            0,
        ));
        assert!(matches!(outcome, DragOutcome::CardMoved(_)));
        let card = &board.state().cards["c1"];
        assert_eq!(card.history.len(), 1);
        assert_eq!(card.history[0].detail("from"), Some("New"));
        assert_eq!(card.history[0].detail("to"), Some("Called"));
    }

    #[test]
    fn test_drag_between_sections_of_one_stage_not_audited() {
        let mut state = board_with_stages(&["onboard"]);
        add_section(&mut state, "onboard", "vip");
        add_section(&mut state, "onboard", "standard");
        add_card(&mut state, "c2", "onboard", Some("standard"));
        let mut board = store_with(state);

        board.apply_drag(&card_drag(
            "c2",
            DropTarget::Section {
                lane_id: "onboard".into(),
                section_id: "standard".into(),
            },
            0,
            DropTarget::Section {
                lane_id: "onboard".into(),
                section_id: "vip".into(),
            },
            0,
        ));
        let lane = board.state().lane("onboard").unwrap();
        assert_eq!(lane.section("vip").unwrap().card_ids, vec!["c2"]);
        assert!(lane.section("standard").unwrap().card_ids.is_empty());
        assert!(board.state().cards["c2"].history.is_empty());
    }

    #[test]
    fn test_card_drag_without_actor_is_ignored() {
        let mut state = board_with_stages(&["new", "called"]);
        add_card(&mut state, "c1", "new", None);
        let mut board = BoardStore::local(state, "p1", None);
        let outcome = board.apply_drag(&card_drag(
            "c1",
            DropTarget::Lane("new".into()),
            0,
            DropTarget::Lane("called".into()),
            0,
        ));
        assert_eq!(outcome, DragOutcome::NoOp);
        assert_eq!(board.state().cards["c1"].stage_id, "new");
        assert!(!board.take_card("c1"));
    }

    #[test]
    fn test_repeated_card_edit_reports_no_change() {
        let mut state = board_with_stages(&["new"]);
        add_card(&mut state, "c1", "new", None);
        let mut board = store_with(state);
        assert!(board.change_tier("c1", "pro"));
        assert!(!board.change_tier("c1", "pro"));
        assert!(!board.change_stage("c1", "ghost"));
    }

    #[tokio::test]
    async fn test_save_draft_validates_before_remote() {
        let remote = Arc::new(MemoryStore::new());
        let sync = SyncAdapter::spawn(remote.clone(), "p1");
        let mut board = BoardStore::new(board_with_stages(&["new"]), "p1", Some(actor()), Some(sync));

        let mut draft = board.new_draft("new");
        assert!(matches!(
            board.save_draft(draft.clone()),
            Err(BoardError::MissingClientName)
        ));
        board.flush().await;
        assert_eq!(remote.call_count(), 0);

        draft.client_name = "Acme".into();
        let pending = board.save_draft(draft.clone()).unwrap();
        assert_eq!(pending.confirmed().await.unwrap(), draft.id);
        let card = &board.state().cards[&draft.id];
        assert_eq!(card.history.len(), 1);
        assert_eq!(card.history[0].kind, HistoryEventType::CardCreated);
        assert_eq!(board.state().lane("new").unwrap().card_ids, vec![draft.id.clone()]);
        assert_eq!(remote.records(Collection::Cards).len(), 1);
        board.dispose().await;
    }

    #[tokio::test]
    async fn test_save_draft_remote_failure_keeps_local_card() {
        let remote = Arc::new(MemoryStore::new());
        remote.set_fail_writes(true);
        let sync = SyncAdapter::spawn(remote.clone(), "p1");
        let mut board = BoardStore::new(board_with_stages(&["new"]), "p1", Some(actor()), Some(sync));

        let mut draft = board.new_draft("new");
        draft.client_name = "Acme".into();
        let pending = board.save_draft(draft.clone()).unwrap();
        assert!(matches!(pending.confirmed().await, Err(BoardError::Remote(_))));
        assert!(board.state().cards.contains_key(&draft.id));
        board.dispose().await;
    }

    #[tokio::test]
    async fn test_incremental_edits_reach_remote() {
        let remote = Arc::new(MemoryStore::new());
        let sync = SyncAdapter::spawn(remote.clone(), "p1");
        let mut board = BoardStore::new(board_with_stages(&["new", "called"]), "p1", Some(actor()), Some(sync));

        let stage = board.add_stage("Live", PaletteColor::Green);
        let mut draft = board.new_draft("new");
        draft.client_name = "Acme".into();
        draft.watchers = vec!["u-jamie".into()];
        board.save_draft(draft.clone()).unwrap();
        board.change_stage(&draft.id, &stage.id);
        board.flush().await;

        let cards = remote.records(Collection::Cards);
        assert_eq!(cards[0]["stageId"], "live");
        assert_eq!(remote.records(Collection::Stages).len(), 1);
        assert_eq!(remote.records(Collection::History).len(), 2);
        let notifications = remote.records(Collection::Notifications);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0]["userId"], "u-jamie");
        board.dispose().await;
    }
}
