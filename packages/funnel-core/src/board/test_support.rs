//! Board fixtures shared by the unit tests.
use crate::types::*;

pub fn title_case(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn member(id: &str, name: &str) -> TeamMember {
    TeamMember {
        id: id.to_string(),
        name: name.to_string(),
        avatar: None,
        role: Role::Staff,
        email: None,
    }
}

pub fn actor() -> TeamMember {
    TeamMember {
        role: Role::Manager,
        ..member("me", "Morgan")
    }
}

/// Board with one empty lane per id; stage names are the title-cased ids.
pub fn board_with_stages(ids: &[&str]) -> BoardState {
    let stages: Vec<Stage> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| Stage {
            id: id.to_string(),
            name: title_case(id),
            color: PaletteColor::Blue,
            order: i as i64,
        })
        .collect();
    BoardState {
        lanes: stages.iter().cloned().map(Lane::from_stage).collect(),
        stages,
        team_members: vec![actor(), member("u-jamie", "Jamie")],
        ..Default::default()
    }
}

pub fn add_section(state: &mut BoardState, stage_id: &str, section_id: &str) {
    let lane = state.lane_mut(stage_id).expect("lane");
    let order = lane.sections.len() as i64;
    lane.sections.push(Section {
        id: section_id.to_string(),
        name: title_case(section_id),
        color: PaletteColor::Green,
        order,
        card_ids: Vec::new(),
    });
}

pub fn add_card(state: &mut BoardState, card_id: &str, stage_id: &str, section_id: Option<&str>) {
    let mut card = LeadCard::draft(stage_id, "basic");
    card.id = card_id.to_string();
    card.client_name = format!("Client {}", card_id);
    card.section_id = section_id.map(str::to_string);
    let lane = state.lane_mut(stage_id).expect("lane");
    match section_id {
        Some(sid) => lane
            .section_mut(sid)
            .expect("section")
            .card_ids
            .push(card_id.to_string()),
        None => lane.card_ids.push(card_id.to_string()),
    }
    state.cards.insert(card_id.to_string(), card);
}
