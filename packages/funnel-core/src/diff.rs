/// Card-level diff between the last confirmed version of a card and the
/// current one.
///
/// Scalar fields are compared on their record form, so the delta can be sent
/// as-is in an update. Notes, history and files are append-only: the delta
/// carries the entries whose ids the confirmed version does not know.
use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::storage::records::card_fields;
use crate::types::{FileAttachment, HistoryEvent, LeadCard, Note};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardDelta {
    pub card_id: String,
    /// Changed scalar fields; a field the current card dropped maps to null.
    pub fields: Map<String, Value>,
    pub new_notes: Vec<Note>,
    pub new_history: Vec<HistoryEvent>,
    pub new_files: Vec<FileAttachment>,
}

impl CardDelta {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
            && self.new_notes.is_empty()
            && self.new_history.is_empty()
            && self.new_files.is_empty()
    }
}

/// Compute what changed. Without a confirmed version every field and every
/// child entry counts as new.
pub fn diff_card(confirmed: Option<&LeadCard>, current: &LeadCard) -> CardDelta {
    let new_fields = card_fields(current);
    let Some(confirmed) = confirmed else {
        return CardDelta {
            card_id: current.id.clone(),
            fields: new_fields,
            new_notes: current.notes.clone(),
            new_history: current.history.clone(),
            new_files: current.files.clone(),
        };
    };

    let old_fields = card_fields(confirmed);
    let mut fields = Map::new();
    for (key, value) in &new_fields {
        if old_fields.get(key) != Some(value) {
            fields.insert(key.clone(), value.clone());
        }
    }
    for key in old_fields.keys() {
        if !new_fields.contains_key(key) {
            fields.insert(key.clone(), Value::Null);
        }
    }

    CardDelta {
        card_id: current.id.clone(),
        fields,
        new_notes: unseen(&confirmed.notes, &current.notes, |n| &n.id),
        new_history: unseen(&confirmed.history, &current.history, |e| &e.id),
        new_files: unseen(&confirmed.files, &current.files, |f| &f.id),
    }
}

fn unseen<T: Clone>(old: &[T], new: &[T], id: impl Fn(&T) -> &String) -> Vec<T> {
    let known: HashSet<&String> = old.iter().map(&id).collect();
    new.iter().filter(|entry| !known.contains(id(entry))).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HistoryEventType, TeamMember};

    fn card() -> LeadCard {
        let mut card = LeadCard::draft("new", "basic");
        card.client_name = "Acme".into();
        card.live_url = Some("https://acme.io".into());
        card
    }

    #[test]
    fn test_diff_no_changes() {
        let c = card();
        assert!(diff_card(Some(&c), &c).is_empty());
    }

    #[test]
    fn test_diff_without_confirmed_is_full() {
        let c = card();
        let delta = diff_card(None, &c);
        assert_eq!(delta.fields["clientName"], "Acme");
        assert_eq!(delta.card_id, c.id);
    }

    #[test]
    fn test_diff_changed_and_cleared_fields() {
        let old = card();
        let mut new = old.clone();
        new.client_name = "Acme Corp".into();
        new.live_url = None;
        let delta = diff_card(Some(&old), &new);
        assert_eq!(delta.fields.len(), 2);
        assert_eq!(delta.fields["clientName"], "Acme Corp");
        assert_eq!(delta.fields["liveUrl"], Value::Null);
    }

    #[test]
    fn test_diff_appended_history_only() {
        let old = card();
        let mut new = old.clone();
        let who = TeamMember {
            id: "me".into(),
            name: "Morgan".into(),
            avatar: None,
            role: Default::default(),
            email: None,
        };
        new.history.push(HistoryEvent::new(HistoryEventType::NoteAdded, &who, Default::default()));
        let delta = diff_card(Some(&old), &new);
        assert!(delta.fields.is_empty());
        assert_eq!(delta.new_history.len(), 1);
        assert!(delta.new_notes.is_empty());
    }
}
