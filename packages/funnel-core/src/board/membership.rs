/// Lane and section membership reconciliation.
///
/// The one routine that moves a card between lists. Drag gestures, the
/// generic card updater, draft promotion and loading all go through
/// `place_card`, so every path ends in the same lane state.
///
/// A lane's flat list holds exactly the unsectioned cards of the stage; a
/// sectioned card lives only in its section's list.
use crate::types::BoardState;

/// Where a card should end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub lane_id: String,
    pub section_id: Option<String>,
    /// Insertion index in the target list, clamped. `None` appends.
    pub index: Option<usize>,
}

impl Placement {
    pub fn lane(lane_id: impl Into<String>) -> Self {
        Self {
            lane_id: lane_id.into(),
            section_id: None,
            index: None,
        }
    }

    pub fn section(lane_id: impl Into<String>, section_id: impl Into<String>) -> Self {
        Self {
            lane_id: lane_id.into(),
            section_id: Some(section_id.into()),
            index: None,
        }
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

/// Outcome of a successful placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardMove {
    pub card_id: String,
    pub from_stage_id: String,
    pub to_stage_id: String,
    pub from_section_id: Option<String>,
    pub to_section_id: Option<String>,
}

impl CardMove {
    pub fn stage_changed(&self) -> bool {
        self.from_stage_id != self.to_stage_id
    }
}

/// Move `card_id` to `placement`, keeping list membership and the card's
/// `stage_id` / `section_id` in agreement.
///
/// Returns `None` without touching the board when the card, lane or section
/// does not exist.
pub fn place_card(state: &mut BoardState, card_id: &str, placement: &Placement) -> Option<CardMove> {
    let Some(card) = state.cards.get(card_id) else {
        log::debug!("[funnel.board] place_card: unknown card {}", card_id);
        return None;
    };
    let Some(lane) = state.lane(&placement.lane_id) else {
        log::debug!("[funnel.board] place_card: unknown lane {}", placement.lane_id);
        return None;
    };
    if let Some(section_id) = &placement.section_id {
        if lane.section(section_id).is_none() {
            log::debug!(
                "[funnel.board] place_card: unknown section {} in lane {}",
                section_id,
                lane.id
            );
            return None;
        }
    }

    let card_move = CardMove {
        card_id: card_id.to_string(),
        from_stage_id: card.stage_id.clone(),
        to_stage_id: placement.lane_id.clone(),
        from_section_id: card.section_id.clone(),
        to_section_id: placement.section_id.clone(),
    };

    detach_everywhere(state, card_id);

    let lane = state.lane_mut(&placement.lane_id)?;
    let list = match &placement.section_id {
        Some(section_id) => &mut lane.section_mut(section_id)?.card_ids,
        None => &mut lane.card_ids,
    };
    let index = placement.index.unwrap_or(list.len()).min(list.len());
    list.insert(index, card_id.to_string());

    if let Some(card) = state.cards.get_mut(card_id) {
        card.stage_id = placement.lane_id.clone();
        card.section_id = placement.section_id.clone();
    }
    Some(card_move)
}

/// Remove every occurrence of `card_id` from every lane and section list on
/// the board. Returns how many entries were removed.
pub fn detach_everywhere(state: &mut BoardState, card_id: &str) -> usize {
    let mut removed = 0;
    for lane in &mut state.lanes {
        removed += retain_without(&mut lane.card_ids, card_id);
        for section in &mut lane.sections {
            removed += retain_without(&mut section.card_ids, card_id);
        }
    }
    removed
}

fn retain_without(list: &mut Vec<String>, card_id: &str) -> usize {
    let before = list.len();
    list.retain(|id| id != card_id);
    before - list.len()
}
