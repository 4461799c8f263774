use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{ErrorKind, RestructureResult};
use crate::restructure_error;
use crate::storage::StorageDriver;

/// Capacity of the command queue; appends and rewrites beyond this apply
/// backpressure to `process` callers.
const COMMAND_QUEUE_CAPACITY: usize = 64;

enum Command {
    /// Append CSV rows to the local scratch file.
    Append(Vec<String>),
    /// Atomically replace the authoritative file with a full snapshot.
    Rewrite(String),
    /// Report the outcome of all commands processed so far.
    Flush(oneshot::Sender<RestructureResult<()>>),
}

/// A durably persisted file owned by a background writer task.
///
/// Callers enqueue mutations; the task appends rows to a scratch file for
/// in-run durability and, on a rewrite request, publishes a full snapshot
/// through the storage driver's atomic store. Consecutive queued rewrites are
/// coalesced so the authoritative file is written at most once per drain.
pub(crate) struct DurableFile {
    tx: mpsc::Sender<Command>,
    handle: Option<JoinHandle<()>>,
    target: String,
}

impl DurableFile {
    /// Spawns the writer task for `target`, using `scratch` for appends.
    pub(crate) fn spawn<S: StorageDriver>(
        storage: Arc<S>,
        target: String,
        scratch: PathBuf,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let task_target = target.clone();
        let handle = tokio::spawn(async move {
            writer_loop(storage, task_target, scratch, rx).await;
        });

        Self {
            tx,
            handle: Some(handle),
            target,
        }
    }

    /// Enqueues scratch-file appends.
    pub(crate) async fn append(&self, rows: Vec<String>) -> RestructureResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.send(Command::Append(rows)).await
    }

    /// Enqueues an atomic rewrite with the given full snapshot.
    pub(crate) async fn rewrite(&self, snapshot: String) -> RestructureResult<()> {
        self.send(Command::Rewrite(snapshot)).await
    }

    /// Waits until every previously enqueued command has been applied,
    /// returning the first failure observed since the last flush.
    pub(crate) async fn flush(&self) -> RestructureResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Flush(ack_tx)).await?;
        ack_rx.await.map_err(|_| self.gone())?
    }

    /// Flushes and stops the writer task.
    pub(crate) async fn close(mut self) -> RestructureResult<()> {
        let result = self.flush().await;
        drop(self.tx);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }

        result
    }

    async fn send(&self, command: Command) -> RestructureResult<()> {
        self.tx.send(command).await.map_err(|_| self.gone())
    }

    fn gone(&self) -> crate::error::RestructureError {
        restructure_error!(
            ErrorKind::AccountantWriteFailed,
            "durable writer task stopped",
            self.target
        )
    }
}

async fn writer_loop<S: StorageDriver>(
    storage: Arc<S>,
    target: String,
    scratch: PathBuf,
    mut rx: mpsc::Receiver<Command>,
) {
    let mut last_failure: Option<String> = None;

    while let Some(command) = rx.recv().await {
        let mut pending_rewrite = None;
        let mut pending_acks = Vec::new();

        let apply = |command: Command,
                         pending_rewrite: &mut Option<String>,
                         pending_acks: &mut Vec<oneshot::Sender<RestructureResult<()>>>,
                         last_failure: &mut Option<String>| {
            match command {
                Command::Append(rows) => {
                    if let Err(err) = append_rows(&scratch, &rows) {
                        error!(target_file = %target, error = %err, "failed to append accounting scratch rows");
                        *last_failure = Some(err.to_string());
                    }
                }
                Command::Rewrite(snapshot) => *pending_rewrite = Some(snapshot),
                Command::Flush(ack) => pending_acks.push(ack),
            }
        };

        apply(
            command,
            &mut pending_rewrite,
            &mut pending_acks,
            &mut last_failure,
        );
        // Drain whatever else is queued so consecutive rewrites coalesce.
        while let Ok(command) = rx.try_recv() {
            apply(
                command,
                &mut pending_rewrite,
                &mut pending_acks,
                &mut last_failure,
            );
        }

        if let Some(snapshot) = pending_rewrite {
            match publish_snapshot(&*storage, &target, &scratch, snapshot).await {
                Ok(()) => debug!(target_file = %target, "published accounting snapshot"),
                Err(err) => {
                    error!(target_file = %target, error = %err, "failed to publish accounting snapshot");
                    last_failure = Some(err.to_string());
                }
            }
        }

        if !pending_acks.is_empty() {
            for ack in pending_acks {
                let result = match &last_failure {
                    Some(failure) => Err(restructure_error!(
                        ErrorKind::AccountantWriteFailed,
                        "durable accounting write failed",
                        failure
                    )),
                    None => Ok(()),
                };
                let _ = ack.send(result);
            }
            // The failure has been reported; the next flush starts clean.
            last_failure = None;
        }
    }
}

fn append_rows(scratch: &PathBuf, rows: &[String]) -> std::io::Result<()> {
    use std::io::Write;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(scratch)?;
    for row in rows {
        writeln!(file, "{row}")?;
    }
    file.sync_data()
}

async fn publish_snapshot<S: StorageDriver>(
    storage: &S,
    target: &str,
    scratch: &PathBuf,
    snapshot: String,
) -> RestructureResult<()> {
    let staged = scratch.with_extension("snapshot");

    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&staged)
        .await?;
    file.write_all(snapshot.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);

    storage.store(&staged, target).await?;

    // The snapshot supersedes everything appended so far.
    match tokio::fs::File::create(scratch).await {
        Ok(file) => {
            let _ = file.sync_all().await;
        }
        Err(err) => {
            debug!(error = %err, "failed to truncate accounting scratch file");
        }
    }

    Ok(())
}
