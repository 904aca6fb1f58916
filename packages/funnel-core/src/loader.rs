/// Board assembly from the remote store.
use std::collections::HashMap;

use crate::config::{default_stage_set, default_subscription_tiers};
use crate::ids;
use crate::storage::records::{decode_all, stage_record, ChildRecord, NamedRecord, SectionRecord};
use crate::storage::{Collection, Filter, RemoteStore, StorageError};
use crate::types::*;

/// A loaded board plus the stored form of every card the load had to repair.
#[derive(Debug, Default)]
pub struct LoadedBoard {
    pub state: BoardState,
    pub repaired: Vec<LeadCard>,
}

/// Fetch and assemble the board of a pipeline.
///
/// Stages are created from the default set when the pipeline has none and
/// the actor is a manager. Any read failure degrades to the empty board.
pub async fn load_board(
    remote: &dyn RemoteStore,
    pipeline_id: &str,
    actor: Option<&TeamMember>,
) -> BoardState {
    load(remote, pipeline_id, actor).await.state
}

/// Like [`load_board`], keeping the stored records of repaired cards so
/// the repair can be written back.
pub async fn load(
    remote: &dyn RemoteStore,
    pipeline_id: &str,
    actor: Option<&TeamMember>,
) -> LoadedBoard {
    match try_load(remote, pipeline_id, actor).await {
        Ok(loaded) => {
            for violation in loaded.state.membership_violations() {
                log::warn!("[funnel.loader] {}", violation);
            }
            log::info!(
                "[funnel.loader] Loaded pipeline {}: {} stages, {} cards, {} repaired",
                pipeline_id,
                loaded.state.stages.len(),
                loaded.state.cards.len(),
                loaded.repaired.len()
            );
            loaded
        }
        Err(e) => {
            log::error!("[funnel.loader] Failed to load pipeline {}: {}", pipeline_id, e);
            LoadedBoard::default()
        }
    }
}

async fn try_load(
    remote: &dyn RemoteStore,
    pipeline_id: &str,
    actor: Option<&TeamMember>,
) -> Result<LoadedBoard, StorageError> {
    let scope = Filter::pipeline(pipeline_id);

    let mut stages: Vec<Stage> = decode_all(remote.list(Collection::Stages, &scope).await?)?;
    stages.sort_by_key(|s| s.order);
    if stages.is_empty() {
        if actor.is_some_and(TeamMember::is_manager) {
            stages = create_default_stages(remote, pipeline_id).await?;
        } else {
            log::info!("[funnel.loader] Pipeline {} has no stages", pipeline_id);
        }
    }

    let team_members: Vec<TeamMember> =
        decode_all(remote.list(Collection::TeamMembers, &scope).await?)?;
    let activity_phases = named(remote, Collection::ActivityPhases, &scope).await?;
    let mut subscription_tiers = named(remote, Collection::SubscriptionTiers, &scope).await?;
    if subscription_tiers.is_empty() {
        subscription_tiers = default_subscription_tiers();
    }

    let mut sections: Vec<SectionRecord> = decode_all(remote.list(Collection::Sections, &scope).await?)?;
    sections.sort_by_key(|s| s.section.order);
    let mut lanes: Vec<Lane> = stages.into_iter().map(Lane::from_stage).collect();
    for record in sections {
        match lanes.iter_mut().find(|l| l.id == record.stage_id) {
            Some(lane) => {
                let mut section = record.section;
                section.card_ids.clear();
                lane.sections.push(section);
            }
            None => log::debug!(
                "[funnel.loader] Section {} belongs to unknown stage {}",
                record.section.id,
                record.stage_id
            ),
        }
    }

    let cards: Vec<LeadCard> = decode_all(remote.list(Collection::Cards, &scope).await?)?;
    let mut notes = children::<Note>(remote, Collection::Notes, &scope).await?;
    let mut history = children::<HistoryEvent>(remote, Collection::History, &scope).await?;
    let mut files = children::<FileAttachment>(remote, Collection::Files, &scope).await?;

    let mut state = BoardState {
        lanes,
        team_members,
        activity_phases,
        subscription_tiers,
        ..Default::default()
    };
    state.sync_stages_from_lanes();

    let mut repaired = Vec::new();
    for mut card in cards {
        card.notes = notes.remove(&card.id).unwrap_or_default();
        card.notes.sort_by_key(|n| n.created_at);
        card.history = history.remove(&card.id).unwrap_or_default();
        card.history.sort_by_key(|e| e.timestamp);
        card.files = files.remove(&card.id).unwrap_or_default();
        card.files.sort_by_key(|f| f.uploaded_at);
        let stored = card.clone();
        if seat_card(&mut state, card) {
            repaired.push(stored);
        }
    }
    Ok(LoadedBoard { state, repaired })
}

/// Put a loaded card into its lane, repairing dangling references.
/// Returns true when the seated card differs from its stored record.
fn seat_card(state: &mut BoardState, mut card: LeadCard) -> bool {
    let mut repaired = false;
    if state.lane(&card.stage_id).is_none() {
        let Some(first) = state.lanes.first() else {
            log::warn!(
                "[funnel.loader] Dropping card {}: stage {} missing and no fallback",
                card.id,
                card.stage_id
            );
            return false;
        };
        log::warn!(
            "[funnel.loader] Card {} references missing stage {}, using {}",
            card.id,
            card.stage_id,
            first.id
        );
        card.stage_id = first.id.clone();
        card.section_id = None;
        repaired = true;
    }
    let Some(lane) = state.lane_mut(&card.stage_id) else {
        return false;
    };
    let section = match card.section_id.as_deref() {
        Some(section_id) => {
            let found = lane.sections.iter_mut().find(|s| s.id == section_id);
            if found.is_none() {
                log::debug!(
                    "[funnel.loader] Card {} references missing section {}",
                    card.id,
                    section_id
                );
            }
            found
        }
        None => None,
    };
    match section {
        Some(section) => section.card_ids.push(card.id.clone()),
        None => {
            repaired |= card.section_id.take().is_some();
            lane.card_ids.push(card.id.clone());
        }
    }
    state.cards.insert(card.id.clone(), card);
    repaired
}

async fn create_default_stages(remote: &dyn RemoteStore, pipeline_id: &str) -> Result<Vec<Stage>, StorageError> {
    let mut stages: Vec<Stage> = Vec::new();
    for (position, default) in default_stage_set().into_iter().enumerate() {
        let stage = Stage {
            id: ids::unique_stage_id(&default.name, stages.iter().map(|s| s.id.as_str())),
            name: default.name,
            color: default.color,
            order: position as i64,
        };
        remote
            .create(Collection::Stages, stage_record(&stage, pipeline_id))
            .await?;
        stages.push(stage);
    }
    log::info!(
        "[funnel.loader] Created {} default stages for pipeline {}",
        stages.len(),
        pipeline_id
    );
    Ok(stages)
}

async fn named(remote: &dyn RemoteStore, collection: Collection, scope: &Filter) -> Result<Vec<String>, StorageError> {
    let mut records: Vec<NamedRecord> = decode_all(remote.list(collection, scope).await?)?;
    records.sort_by_key(|r| r.order);
    Ok(records.into_iter().map(|r| r.name).collect())
}

async fn children<T: serde::de::DeserializeOwned>(
    remote: &dyn RemoteStore,
    collection: Collection,
    scope: &Filter,
) -> Result<HashMap<String, Vec<T>>, StorageError> {
    let records: Vec<ChildRecord<T>> = decode_all(remote.list(collection, scope).await?)?;
    let mut by_card: HashMap<String, Vec<T>> = HashMap::new();
    for record in records {
        by_card.entry(record.card_id).or_default().push(record.entry);
    }
    Ok(by_card)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::test_support::{actor, member};
    use crate::storage::memory::MemoryStore;
    use crate::storage::records::{card_record, child_record, section_record};
    use serde_json::json;

    fn stage(id: &str, order: i64) -> Stage {
        Stage {
            id: id.into(),
            name: id.to_uppercase(),
            color: PaletteColor::Blue,
            order,
        }
    }

    fn card(id: &str, stage_id: &str, section_id: Option<&str>) -> LeadCard {
        let mut card = LeadCard::draft(stage_id, "basic");
        card.id = id.into();
        card.client_name = format!("Client {}", id);
        card.section_id = section_id.map(str::to_string);
        card
    }

    #[tokio::test]
    async fn test_manager_gets_default_stages() {
        let remote = MemoryStore::new();
        let state = load_board(&remote, "p1", Some(&actor())).await;
        let names: Vec<&str> = state.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["New", "Called", "Onboard", "Live", "Lost"]);
        assert_eq!(state.lanes.len(), 5);
        assert_eq!(remote.records(Collection::Stages).len(), 5);
        assert_eq!(state.subscription_tiers, default_subscription_tiers());
    }

    #[tokio::test]
    async fn test_staff_does_not_create_stages() {
        let remote = MemoryStore::new();
        let state = load_board(&remote, "p1", Some(&member("u-1", "Sam"))).await;
        assert!(state.is_empty());
        assert!(remote.records(Collection::Stages).is_empty());
    }

    #[tokio::test]
    async fn test_assembles_cards_sections_and_children() {
        let remote = MemoryStore::new();
        remote.insert(Collection::Stages, stage_record(&stage("called", 1), "p1"));
        remote.insert(Collection::Stages, stage_record(&stage("new", 0), "p1"));
        remote.insert(Collection::Stages, stage_record(&stage("other", 0), "p2"));
        let vip = Section {
            id: "vip".into(),
            name: "VIP".into(),
            color: PaletteColor::Pink,
            order: 0,
            card_ids: Vec::new(),
        };
        remote.insert(Collection::Sections, section_record("called", &vip, "p1"));
        remote.insert(Collection::Cards, card_record(&card("c1", "new", None), "p1"));
        remote.insert(Collection::Cards, card_record(&card("c2", "called", Some("vip")), "p1"));
        remote.insert(Collection::Cards, card_record(&card("c3", "ghost", Some("vip")), "p1"));
        remote.insert(Collection::Cards, card_record(&card("c4", "called", Some("gone")), "p1"));
        let event = HistoryEvent::new(HistoryEventType::CardCreated, &actor(), Default::default());
        remote.insert(Collection::History, child_record(&event, "c2", "p1"));
        remote.insert(
            Collection::ActivityPhases,
            json!({ "name": "Demo", "order": 2, "pipelineId": "p1" }),
        );
        remote.insert(
            Collection::ActivityPhases,
            json!({ "name": "Intro", "order": 1, "pipelineId": "p1" }),
        );
        remote.insert(Collection::TeamMembers, json!({ "id": "u-1", "name": "Sam", "pipelineId": "p1" }));

        let state = load_board(&remote, "p1", None).await;
        let order: Vec<&str> = state.stages.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, vec!["new", "called"]);
        assert_eq!(state.activity_phases, vec!["Intro", "Demo"]);
        assert_eq!(state.team_members.len(), 1);
        assert_eq!(state.cards["c2"].history.len(), 1);
        assert_eq!(state.lane("called").unwrap().section("vip").unwrap().card_ids, vec!["c2"]);
        // Unknown stage falls back to the first stage, unsectioned.
        assert_eq!(state.cards["c3"].stage_id, "new");
        assert_eq!(state.cards["c3"].section_id, None);
        // Unknown section is cleared.
        assert_eq!(state.cards["c4"].section_id, None);
        assert_eq!(state.lane("called").unwrap().card_ids, vec!["c4"]);
        assert!(state.membership_violations().is_empty());
    }

    #[tokio::test]
    async fn test_reports_stored_form_of_repaired_cards() {
        let remote = MemoryStore::new();
        remote.insert(Collection::Stages, stage_record(&stage("new", 0), "p1"));
        remote.insert(Collection::Cards, card_record(&card("c1", "new", None), "p1"));
        remote.insert(Collection::Cards, card_record(&card("c2", "ghost", None), "p1"));
        remote.insert(Collection::Cards, card_record(&card("c3", "new", Some("gone")), "p1"));

        let loaded = load(&remote, "p1", None).await;
        let mut repaired: Vec<(&str, &str, Option<&str>)> = loaded
            .repaired
            .iter()
            .map(|c| (c.id.as_str(), c.stage_id.as_str(), c.section_id.as_deref()))
            .collect();
        repaired.sort();
        assert_eq!(
            repaired,
            vec![("c2", "ghost", None), ("c3", "new", Some("gone"))]
        );
        assert_eq!(loaded.state.cards["c2"].stage_id, "new");
        assert_eq!(loaded.state.cards["c3"].section_id, None);
    }

    #[tokio::test]
    async fn test_read_failure_yields_empty_board() {
        let remote = MemoryStore::new();
        remote.insert(Collection::Stages, stage_record(&stage("new", 0), "p1"));
        remote.set_fail_reads(true);
        let state = load_board(&remote, "p1", Some(&actor())).await;
        assert_eq!(state, BoardState::default());
    }
}
