/// Unread notification counter.
///
/// Read state is owned by the notification store; this module only counts
/// and flips the `read` flag.
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::storage::{Collection, Filter, RemoteStore, StorageError};

fn unread_filter(user_id: &str) -> Filter {
    Filter::eq("userId", user_id).and("read", false)
}

pub async fn unread_count(remote: &dyn RemoteStore, user_id: &str) -> Result<usize, StorageError> {
    Ok(remote.list(Collection::Notifications, &unread_filter(user_id)).await?.len())
}

/// Mark every unread notification of `user_id` as read. Returns how many
/// were updated.
pub async fn mark_notifications_read(remote: &dyn RemoteStore, user_id: &str) -> Result<usize, StorageError> {
    let unread = remote
        .list(Collection::Notifications, &unread_filter(user_id))
        .await?;
    let mut updated = 0;
    for record in unread {
        let Some(id) = record.get("id").and_then(Value::as_str) else {
            continue;
        };
        let mut fields = Map::new();
        fields.insert("read".into(), Value::Bool(true));
        remote.update(Collection::Notifications, id, fields).await?;
        updated += 1;
    }
    Ok(updated)
}

/// Background task publishing the unread count of one user every interval.
/// Dropping the poller cancels it.
pub struct UnreadPoller {
    count: watch::Receiver<usize>,
    task: JoinHandle<()>,
}

impl UnreadPoller {
    pub fn spawn(remote: Arc<dyn RemoteStore>, user_id: impl Into<String>, interval: Duration) -> Self {
        let user_id = user_id.into();
        let (tx, count) = watch::channel(0);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match unread_count(remote.as_ref(), &user_id).await {
                    Ok(n) => {
                        tx.send_if_modified(|current| {
                            let changed = *current != n;
                            *current = n;
                            changed
                        });
                    }
                    Err(e) => log::warn!("[funnel.poll] Unread count for {} failed: {}", user_id, e),
                }
                if tx.is_closed() {
                    break;
                }
            }
        });
        Self { count, task }
    }

    /// Latest known count.
    pub fn current(&self) -> usize {
        *self.count.borrow()
    }

    /// A receiver that sees every published change.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count.clone()
    }

    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for UnreadPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}
