//! Debounced saving of greeting metadata.
//!
//! Bursts of edits produce one write: every `schedule` replaces the pending
//! snapshot and restarts the quiet interval, and only the latest snapshot is
//! written once the interval passes without another schedule.

use greeting_core::{GreetingStore, MetadataGateway, OwnerId};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default quiet interval before a scheduled save is written.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

enum Command {
    Schedule { owner: OwnerId, store: GreetingStore },
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the background save task.
///
/// Must be created inside a tokio runtime. Dropping the handle closes the
/// channel; the task writes whatever is still pending and exits.
pub struct DebouncedSaver {
    tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl DebouncedSaver {
    /// Spawn the save task writing through `gateway`.
    pub fn spawn<G: MetadataGateway + 'static>(gateway: G, interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(gateway, interval, rx));
        Self { tx, task }
    }

    /// Queue `store` to be written for `owner`, replacing any pending snapshot.
    pub fn schedule(&self, owner: OwnerId, store: GreetingStore) {
        if self.tx.send(Command::Schedule { owner, store }).is_err() {
            tracing::warn!("Save task stopped, dropping scheduled save");
        }
    }

    /// Write the pending snapshot now and wait for it to finish.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Flush, then stop the task.
    pub async fn shutdown(self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
        if let Err(e) = self.task.await {
            tracing::error!("Save task failed: {}", e);
        }
    }
}

async fn run<G: MetadataGateway>(
    gateway: G,
    interval: Duration,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut pending: Option<(OwnerId, GreetingStore)> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            Some(at) => {
                tokio::select! {
                    command = rx.recv() => command,
                    _ = tokio::time::sleep_until(at) => {
                        write_pending(&gateway, &mut pending).await;
                        deadline = None;
                        continue;
                    }
                }
            }
            None => rx.recv().await,
        };

        match command {
            Some(Command::Schedule { owner, store }) => {
                // Never let one owner's snapshot replace another's
                if pending.as_ref().is_some_and(|(current, _)| *current != owner) {
                    write_pending(&gateway, &mut pending).await;
                }
                pending = Some((owner, store));
                deadline = Some(Instant::now() + interval);
            }
            Some(Command::Flush(done)) => {
                write_pending(&gateway, &mut pending).await;
                deadline = None;
                let _ = done.send(());
            }
            Some(Command::Shutdown(done)) => {
                write_pending(&gateway, &mut pending).await;
                let _ = done.send(());
                break;
            }
            None => {
                write_pending(&gateway, &mut pending).await;
                break;
            }
        }
    }
    tracing::debug!("Save task stopped");
}

async fn write_pending<G: MetadataGateway>(
    gateway: &G,
    pending: &mut Option<(OwnerId, GreetingStore)>,
) {
    let Some((owner, store)) = pending.take() else {
        return;
    };
    match gateway.save(&owner, &store).await {
        Ok(()) => tracing::debug!("Saved greeting metadata for {}", owner),
        Err(e) => tracing::error!("Failed to save greeting metadata for {}: {}", owner, e),
    }
}
