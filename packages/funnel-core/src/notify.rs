/// Notification fan-out.
///
/// Decides when and to whom notifications are enqueued. Delivery and read
/// state belong to the external notification store.
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;

use crate::ids;
use crate::types::{LeadCard, Notification, TeamMember};

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([\p{L}\p{N}._-]+)").unwrap());

/// Raw `@token` mentions in a note, in order of appearance.
pub fn mention_tokens(text: &str) -> Vec<&str> {
    MENTION_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Team members addressed by the mentions in `text`, each at most once.
/// A token matches a display name or email local part, ignoring case.
/// Sentence punctuation glued to a token (`@jamie.`) is tolerated.
pub fn mentioned_members<'a>(text: &str, members: &'a [TeamMember]) -> Vec<&'a TeamMember> {
    let mut found: Vec<&TeamMember> = Vec::new();
    for token in mention_tokens(text) {
        let trimmed = token.trim_end_matches(['.', '-', '_']);
        let matched = members
            .iter()
            .filter(|m| m.answers_to(token) || (!trimmed.is_empty() && m.answers_to(trimmed)));
        for member in matched {
            if !found.iter().any(|f| f.id == member.id) {
                found.push(member);
            }
        }
    }
    found
}

/// Watchers of `card` other than the acting user, deduplicated.
pub fn watcher_targets(card: &LeadCard, actor_id: &str) -> Vec<String> {
    let mut targets: Vec<String> = Vec::new();
    for watcher in &card.watchers {
        if watcher != actor_id && !watcher.is_empty() && !targets.contains(watcher) {
            targets.push(watcher.clone());
        }
    }
    targets
}

/// One notification record per target.
pub fn fan_out(
    card: &LeadCard,
    targets: impl IntoIterator<Item = String>,
    message: &str,
    pipeline_id: &str,
) -> Vec<Notification> {
    let timestamp = Utc::now();
    targets
        .into_iter()
        .map(|user_id| Notification {
            id: ids::new_id(),
            user_id,
            card_id: card.id.clone(),
            client_name: card.client_name.clone(),
            message: message.to_string(),
            timestamp,
            pipeline_id: pipeline_id.to_string(),
            read: false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn member(id: &str, name: &str, email: Option<&str>) -> TeamMember {
        TeamMember {
            id: id.to_string(),
            name: name.to_string(),
            avatar: None,
            role: Role::Staff,
            email: email.map(str::to_string),
        }
    }

    #[test]
    fn test_mention_tokens() {
        assert_eq!(
            mention_tokens("ping @jamie and @ana.silva, thanks"),
            vec!["jamie", "ana.silva"]
        );
        assert!(mention_tokens("mail me at nobody").is_empty());
    }

    #[test]
    fn test_mentioned_members_by_name_and_email() {
        let members = vec![
            member("u1", "Jamie", None),
            member("u2", "Ana Silva", Some("ana.silva@example.com")),
            member("u3", "Bo", None),
        ];
        let found = mentioned_members("@JAMIE can you loop in @ana.silva? @jamie.", &members);
        let ids: Vec<&str> = found.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u2"]);
    }

    #[test]
    fn test_mentions_fold_non_ascii_case() {
        let members = vec![
            member("u1", "Élodie", None),
            member("u2", "Søren Berg", Some("Søren@example.com")),
        ];
        let found = mentioned_members("ping @élodie and @SØREN", &members);
        let ids: Vec<&str> = found.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u2"]);
    }

    #[test]
    fn test_watcher_targets_skip_actor_and_duplicates() {
        let mut card = LeadCard::draft("new", "basic");
        card.watchers = vec!["u1".into(), "me".into(), "u1".into(), "u2".into()];
        assert_eq!(watcher_targets(&card, "me"), vec!["u1", "u2"]);
    }

    #[test]
    fn test_fan_out_builds_one_record_per_target() {
        let mut card = LeadCard::draft("new", "basic");
        card.client_name = "Acme".to_string();
        let notes = fan_out(&card, vec!["u1".to_string(), "u2".to_string()], "Card updated", "p1");
        assert_eq!(notes.len(), 2);
        assert!(notes.iter().all(|n| n.card_id == card.id && n.client_name == "Acme"));
        assert!(notes.iter().all(|n| n.pipeline_id == "p1" && !n.read));
        assert_ne!(notes[0].id, notes[1].id);
    }
}
