/// Remote sync worker.
///
/// Board effects are queued to a single background task that writes them to
/// the remote store one at a time, in submission order. The worker owns the
/// last confirmed version of every card, so a save only sends what changed
/// since the store last acknowledged the card. A card with no confirmed
/// version (never loaded, or its create failed) is written through the
/// create path instead.
///
/// Remote failures never roll back local state: they are logged, and
/// reported to the caller only when a reply channel was requested.
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::diff::diff_card;
use crate::effect::Effect;
use crate::storage::records::{
    card_record, child_record, section_fields, section_record, stage_fields, stage_record,
};
use crate::storage::{Collection, RemoteStore, StorageError};
use crate::types::LeadCard;

pub type SyncReply = oneshot::Receiver<Result<(), StorageError>>;

enum Command {
    Apply {
        effect: Effect,
        reply: Option<oneshot::Sender<Result<(), StorageError>>>,
    },
    Prime(Vec<LeadCard>),
    Flush(oneshot::Sender<()>),
}

pub struct SyncAdapter {
    tx: mpsc::UnboundedSender<Command>,
    worker: JoinHandle<()>,
}

impl SyncAdapter {
    /// Start the worker. Must be called inside a tokio runtime.
    pub fn spawn(remote: Arc<dyn RemoteStore>, pipeline_id: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            remote,
            pipeline_id: pipeline_id.into(),
            confirmed: HashMap::new(),
        };
        let worker = tokio::spawn(worker.run(rx));
        Self { tx, worker }
    }

    /// Record cards as already persisted, typically right after a load.
    pub fn prime(&self, cards: Vec<LeadCard>) {
        self.send(Command::Prime(cards));
    }

    pub fn submit(&self, effect: Effect) {
        self.send(Command::Apply { effect, reply: None });
    }

    /// Queue an effect and get notified once the store accepted or rejected it.
    pub fn submit_with_reply(&self, effect: Effect) -> SyncReply {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Apply {
            effect,
            reply: Some(reply),
        });
        rx
    }

    /// Wait until everything queued so far has been attempted.
    pub async fn flush(&self) {
        let (done, rx) = oneshot::channel();
        self.send(Command::Flush(done));
        let _ = rx.await;
    }

    /// Drain the queue and stop the worker.
    pub async fn shutdown(self) {
        let SyncAdapter { tx, worker } = self;
        drop(tx);
        if let Err(e) = worker.await {
            log::warn!("[funnel.sync] Worker ended abnormally: {}", e);
        }
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            log::warn!("[funnel.sync] Worker is gone, dropping command");
        }
    }
}

struct Worker {
    remote: Arc<dyn RemoteStore>,
    pipeline_id: String,
    /// card id -> last version the store acknowledged
    confirmed: HashMap<String, LeadCard>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Apply { effect, reply } => {
                    let label = describe(&effect);
                    let result = self.apply(effect).await;
                    if let Err(e) = &result {
                        log::warn!("[funnel.sync] {} failed: {}", label, e);
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                Command::Prime(cards) => {
                    for card in cards {
                        self.confirmed.insert(card.id.clone(), card);
                    }
                }
                Command::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        log::debug!("[funnel.sync] Worker for pipeline {} stopped", self.pipeline_id);
    }

    async fn apply(&mut self, effect: Effect) -> Result<(), StorageError> {
        let remote = Arc::clone(&self.remote);
        let pipeline_id = self.pipeline_id.as_str();
        match effect {
            Effect::CreateStage(stage) => {
                remote
                    .create(Collection::Stages, stage_record(&stage, pipeline_id))
                    .await?;
            }
            Effect::SaveStage(stage) => {
                remote
                    .update(Collection::Stages, &stage.id, stage_fields(&stage))
                    .await?;
            }
            Effect::DeleteStage(stage_id) => {
                remote.delete(Collection::Stages, &stage_id).await?;
            }
            Effect::CreateSection { stage_id, section } => {
                remote
                    .create(
                        Collection::Sections,
                        section_record(&stage_id, &section, pipeline_id),
                    )
                    .await?;
            }
            Effect::SaveSection { section, .. } => {
                remote
                    .update(Collection::Sections, &section.id, section_fields(&section))
                    .await?;
            }
            Effect::DeleteSection { section_id, .. } => {
                remote.delete(Collection::Sections, &section_id).await?;
            }
            Effect::CreateCard(card) => self.create_card(*card).await?,
            Effect::SaveCard(card) => self.save_card(*card).await?,
            Effect::DeleteCard(card_id) => self.delete_card(&card_id).await?,
            Effect::Notify(notification) => {
                remote
                    .create(Collection::Notifications, serde_json::to_value(&notification)?)
                    .await?;
            }
        }
        Ok(())
    }

    async fn create_card(&mut self, card: LeadCard) -> Result<(), StorageError> {
        self.remote
            .create(Collection::Cards, card_record(&card, &self.pipeline_id))
            .await?;
        let mut confirmed = card.clone();
        confirmed.notes.clear();
        confirmed.history.clear();
        confirmed.files.clear();
        self.confirmed.insert(card.id.clone(), confirmed);
        self.push_children(&card).await
    }

    async fn save_card(&mut self, card: LeadCard) -> Result<(), StorageError> {
        let Some(previous) = self.confirmed.get(&card.id) else {
            log::debug!("[funnel.sync] No confirmed version of card {}, creating it", card.id);
            return self.create_card(card).await;
        };
        let delta = diff_card(Some(previous), &card);
        if delta.is_empty() {
            return Ok(());
        }
        if !delta.fields.is_empty() {
            self.remote
                .update(Collection::Cards, &card.id, delta.fields)
                .await?;
            if let Some(confirmed) = self.confirmed.get_mut(&card.id) {
                let LeadCard {
                    notes,
                    history,
                    files,
                    ..
                } = std::mem::replace(confirmed, card.clone());
                confirmed.notes = notes;
                confirmed.history = history;
                confirmed.files = files;
            }
        }
        self.push_children(&card).await
    }

    /// Create the notes, history entries and files of `card` that the
    /// confirmed version lacks, confirming each one as it lands.
    async fn push_children(&mut self, card: &LeadCard) -> Result<(), StorageError> {
        let confirmed = self.confirmed.get(&card.id);
        let delta = diff_card(confirmed, card);
        for note in delta.new_notes {
            self.create_child(Collection::Notes, &note, &card.id).await?;
            if let Some(c) = self.confirmed.get_mut(&card.id) {
                c.notes.push(note);
            }
        }
        for event in delta.new_history {
            self.create_child(Collection::History, &event, &card.id).await?;
            if let Some(c) = self.confirmed.get_mut(&card.id) {
                c.history.push(event);
            }
        }
        for file in delta.new_files {
            self.create_child(Collection::Files, &file, &card.id).await?;
            if let Some(c) = self.confirmed.get_mut(&card.id) {
                c.files.push(file);
            }
        }
        Ok(())
    }

    async fn create_child<T: Serialize>(
        &self,
        collection: Collection,
        entry: &T,
        card_id: &str,
    ) -> Result<(), StorageError> {
        self.remote
            .create(collection, child_record(entry, card_id, &self.pipeline_id))
            .await
            .map(|_| ())
    }

    /// Delete the card record, then the child records the worker knows of.
    async fn delete_card(&mut self, card_id: &str) -> Result<(), StorageError> {
        self.remote.delete(Collection::Cards, card_id).await?;
        let Some(card) = self.confirmed.remove(card_id) else {
            return Ok(());
        };
        let children = card
            .notes
            .iter()
            .map(|n| (Collection::Notes, &n.id))
            .chain(card.history.iter().map(|e| (Collection::History, &e.id)))
            .chain(card.files.iter().map(|f| (Collection::Files, &f.id)));
        for (collection, id) in children {
            if let Err(e) = self.remote.delete(collection, id).await {
                log::warn!(
                    "[funnel.sync] Could not delete {} {} of card {}: {}",
                    collection,
                    id,
                    card_id,
                    e
                );
            }
        }
        Ok(())
    }
}

fn describe(effect: &Effect) -> String {
    match effect {
        Effect::CreateStage(s) => format!("create stage {}", s.id),
        Effect::SaveStage(s) => format!("save stage {}", s.id),
        Effect::DeleteStage(id) => format!("delete stage {}", id),
        Effect::CreateSection { section, .. } => format!("create section {}", section.id),
        Effect::SaveSection { section, .. } => format!("save section {}", section.id),
        Effect::DeleteSection { section_id, .. } => format!("delete section {}", section_id),
        Effect::CreateCard(c) => format!("create card {}", c.id),
        Effect::SaveCard(c) => format!("save card {}", c.id),
        Effect::DeleteCard(id) => format!("delete card {}", id),
        Effect::Notify(n) => format!("notify {} about card {}", n.user_id, n.card_id),
    }
}
