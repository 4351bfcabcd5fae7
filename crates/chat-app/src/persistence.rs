use parley_storage::{ConversationRecord, ConversationRepository};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

enum PersistCommand {
    Save(Vec<ConversationRecord>),
    Flush(oneshot::Sender<()>),
}

/// Sending half of the persistence writer. Cloned into every store that persists.
#[derive(Debug, Clone, Default)]
pub struct PersistenceHandle {
    commands: Option<mpsc::UnboundedSender<PersistCommand>>,
}

impl PersistenceHandle {
    /// Handle that drops every snapshot. Used by in-memory sessions and tests.
    pub fn disabled() -> Self {
        Self { commands: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.commands.is_some()
    }

    /// Queues a full snapshot. Returns immediately; older queued snapshots are superseded.
    pub fn enqueue(&self, snapshot: Vec<ConversationRecord>) {
        let Some(commands) = &self.commands else {
            return;
        };

        if commands.send(PersistCommand::Save(snapshot)).is_err() {
            tracing::warn!("persistence writer is gone; snapshot dropped");
        }
    }

    /// Waits until every snapshot queued before this call has been written.
    pub async fn flush(&self) {
        let Some(commands) = &self.commands else {
            return;
        };

        let (done_tx, done_rx) = oneshot::channel();
        if commands.send(PersistCommand::Flush(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }
}

/// Starts the background writer. It exits once every handle has been dropped.
pub fn spawn_persistence_writer(
    repository: ConversationRepository,
) -> (PersistenceHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_writer(repository, commands_rx));
    (
        PersistenceHandle {
            commands: Some(commands_tx),
        },
        task,
    )
}

async fn run_writer(
    repository: ConversationRepository,
    mut commands: mpsc::UnboundedReceiver<PersistCommand>,
) {
    while let Some(command) = commands.recv().await {
        let mut latest = None;
        let mut waiters = Vec::new();
        let mut absorb = |command: PersistCommand| match command {
            PersistCommand::Save(snapshot) => latest = Some(snapshot),
            PersistCommand::Flush(waiter) => waiters.push(waiter),
        };

        absorb(command);
        while let Ok(next) = commands.try_recv() {
            absorb(next);
        }

        if let Some(snapshot) = latest {
            write_snapshot(&repository, snapshot).await;
        }

        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    tracing::debug!("persistence writer stopped");
}

async fn write_snapshot(repository: &ConversationRepository, snapshot: Vec<ConversationRecord>) {
    let count = snapshot.len();
    let repository = repository.clone();
    match tokio::task::spawn_blocking(move || repository.save(&snapshot)).await {
        Ok(Ok(())) => tracing::debug!(conversations = count, "conversation snapshot saved"),
        Ok(Err(error)) => {
            tracing::error!(error = %error, conversations = count, "failed to save conversations")
        }
        Err(error) => {
            tracing::error!(error = %error, "conversation save task did not finish")
        }
    }
}
