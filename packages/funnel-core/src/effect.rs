/// Side effects produced by board mutations.
///
/// State transitions are applied to the in-memory aggregate synchronously;
/// the persistence and notification work they imply is described here and
/// handed to the sync worker.
use crate::types::{LeadCard, Notification, Section, Stage};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CreateStage(Stage),
    SaveStage(Stage),
    DeleteStage(String),
    CreateSection { stage_id: String, section: Section },
    SaveSection { stage_id: String, section: Section },
    DeleteSection { stage_id: String, section_id: String },
    CreateCard(Box<LeadCard>),
    /// Persist whatever changed since the last confirmed snapshot of the card.
    SaveCard(Box<LeadCard>),
    DeleteCard(String),
    Notify(Notification),
}

impl Effect {
    pub fn save_card(card: &LeadCard) -> Self {
        Effect::SaveCard(Box::new(card.clone()))
    }

    pub fn notifications(effects: &[Effect]) -> impl Iterator<Item = &Notification> {
        effects.iter().filter_map(|e| match e {
            Effect::Notify(n) => Some(n),
            _ => None,
        })
    }
}
