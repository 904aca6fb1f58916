/// Session context: the collaborators a board needs, injected once.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::board::BoardStore;
use crate::effect::Effect;
use crate::loader;
use crate::storage::records::{decode_all, PipelineRecord};
use crate::storage::{Collection, Filter, RemoteStore, StorageError};
use crate::sync::SyncAdapter;
use crate::types::{BoardState, LeadCard, TeamMember};

/// Source of the authenticated user.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_user(&self) -> Option<TeamMember>;
}

/// Maps a pipeline slug to the store's pipeline id.
#[async_trait]
pub trait PipelineResolver: Send + Sync {
    async fn resolve(&self, slug: &str) -> Result<Option<String>, StorageError>;
}

/// Fixed user, for single-user processes and tests.
pub struct StaticAuth(pub Option<TeamMember>);

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn current_user(&self) -> Option<TeamMember> {
        self.0.clone()
    }
}

/// Looks the slug up in the pipelines collection.
pub struct StorePipelineResolver {
    remote: Arc<dyn RemoteStore>,
}

impl StorePipelineResolver {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl PipelineResolver for StorePipelineResolver {
    async fn resolve(&self, slug: &str) -> Result<Option<String>, StorageError> {
        let records = self
            .remote
            .list(Collection::Pipelines, &Filter::eq("slug", slug))
            .await?;
        let pipelines: Vec<PipelineRecord> = decode_all(records)?;
        Ok(pipelines.into_iter().next().map(|p| p.id))
    }
}

/// Uses the slug itself as the pipeline id. For the in-process store,
/// where pipelines are not registered anywhere.
pub struct SlugResolver;

#[async_trait]
impl PipelineResolver for SlugResolver {
    async fn resolve(&self, slug: &str) -> Result<Option<String>, StorageError> {
        let slug = slug.trim();
        Ok((!slug.is_empty()).then(|| slug.to_string()))
    }
}

pub struct Session {
    remote: Arc<dyn RemoteStore>,
    auth: Arc<dyn AuthProvider>,
    resolver: Arc<dyn PipelineResolver>,
}

impl Session {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthProvider>,
        resolver: Arc<dyn PipelineResolver>,
    ) -> Self {
        Self { remote, auth, resolver }
    }

    pub fn remote(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(&self.remote)
    }

    pub async fn current_user(&self) -> Option<TeamMember> {
        self.auth.current_user().await
    }

    /// Open the board of the pipeline named `slug`.
    ///
    /// An unknown or unresolvable slug gives an empty local board. Without an
    /// authenticated user the board is loaded but never written back.
    pub async fn open_board(&self, slug: &str) -> BoardStore {
        let actor = self.auth.current_user().await;
        let pipeline_id = match self.resolver.resolve(slug).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                log::warn!("[funnel.session] Pipeline '{}' not found", slug);
                return BoardStore::local(BoardState::default(), slug, actor);
            }
            Err(e) => {
                log::error!("[funnel.session] Could not resolve pipeline '{}': {}", slug, e);
                return BoardStore::local(BoardState::default(), slug, actor);
            }
        };

        let loaded = loader::load(self.remote.as_ref(), &pipeline_id, actor.as_ref()).await;
        let state = loaded.state;
        if actor.is_none() {
            log::warn!(
                "[funnel.session] No authenticated user, pipeline {} opened read-only",
                pipeline_id
            );
            return BoardStore::local(state, pipeline_id, None);
        }
        let sync = SyncAdapter::spawn(Arc::clone(&self.remote), pipeline_id.clone());
        // Prime with what the store holds, then write the load repairs back.
        let mut stored: HashMap<String, LeadCard> = state.cards.clone();
        for card in &loaded.repaired {
            stored.insert(card.id.clone(), card.clone());
        }
        sync.prime(stored.into_values().collect());
        for card in loaded.repaired.iter().filter_map(|c| state.cards.get(&c.id)) {
            sync.submit(Effect::save_card(card));
        }
        BoardStore::new(state, pipeline_id, actor, Some(sync))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::test_support::actor;
    use crate::storage::memory::MemoryStore;
    use crate::storage::records::card_record;
    use serde_json::json;

    fn session(remote: Arc<MemoryStore>, user: Option<TeamMember>) -> Session {
        Session::new(
            remote.clone(),
            Arc::new(StaticAuth(user)),
            Arc::new(StorePipelineResolver::new(remote)),
        )
    }

    #[tokio::test]
    async fn test_unknown_pipeline_opens_empty_board() {
        let remote = Arc::new(MemoryStore::new());
        let board = session(remote.clone(), Some(actor())).open_board("nowhere").await;
        assert!(board.state().is_empty());
        assert!(!board.is_synced());
        assert!(remote.records(Collection::Stages).is_empty());
    }

    #[tokio::test]
    async fn test_open_board_primes_sync() {
        let remote = Arc::new(MemoryStore::new());
        remote.insert(Collection::Pipelines, json!({ "id": "p1", "slug": "sales" }));
        let session = session(remote.clone(), Some(actor()));
        let board = session.open_board("sales").await;
        assert!(board.is_synced());
        assert_eq!(board.state().stages.len(), 5);

        let mut card = LeadCard::draft("new", "basic");
        card.client_name = "Acme".into();
        remote.insert(Collection::Cards, card_record(&card, "p1"));
        board.dispose().await;

        // Reopen: the stored card is primed, so an edit updates it in place.
        let mut board = session.open_board("sales").await;
        board.change_tier(&card.id, "pro");
        board.flush().await;
        let cards = remote.records(Collection::Cards);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0]["subscriptionTier"], "pro");
        board.dispose().await;
    }

    #[tokio::test]
    async fn test_open_board_writes_back_load_repairs() {
        let remote = Arc::new(MemoryStore::new());
        remote.insert(Collection::Pipelines, json!({ "id": "p1", "slug": "sales" }));
        let mut card = LeadCard::draft("ghost", "basic");
        card.client_name = "Acme".into();
        card.section_id = Some("gone".into());
        remote.insert(Collection::Cards, card_record(&card, "p1"));

        let board = session(remote.clone(), Some(actor())).open_board("sales").await;
        assert_eq!(board.state().cards[&card.id].stage_id, "new");
        board.flush().await;

        let cards = remote.records(Collection::Cards);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0]["stageId"], "new");
        assert!(matches!(cards[0].get("sectionId"), None | Some(serde_json::Value::Null)));
        assert_eq!(cards[0]["clientName"], "Acme");
        board.dispose().await;
    }

    #[tokio::test]
    async fn test_slug_resolver() {
        assert_eq!(SlugResolver.resolve(" sales ").await.unwrap().as_deref(), Some("sales"));
        assert!(SlugResolver.resolve("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_anonymous_session_is_read_only() {
        let remote = Arc::new(MemoryStore::new());
        remote.insert(Collection::Pipelines, json!({ "id": "p1", "slug": "sales" }));
        let board = session(remote, None).open_board("sales").await;
        assert!(board.actor().is_none());
        assert!(!board.is_synced());
    }
}
