use std::sync::Arc;
use std::time::Duration;

use parley_llm::{LlmProvider, ProviderError, create_provider};
use parley_storage::{
    BlobStore, ConversationRepository, FileBlobStore, MemoryBlobStore, SqliteBlobStore,
    StorageError,
};
use snafu::{ResultExt, Snafu};

use crate::chat::{
    ConversationId, ConversationStore, Message, SendError, SendReport, SharedStore,
    StreamingController,
};
use crate::persistence::{PersistenceHandle, spawn_persistence_writer};
use crate::settings::{Settings, StorageBackend};
use crate::view::{SidebarEntry, Theme, run_terminal};

const SQLITE_FILE_NAME: &str = "parley.db";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("failed to create the model provider on `{stage}`: {source}"))]
    CreateProvider {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("failed to open conversation storage on `{stage}`: {source}"))]
    OpenStorage {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("failed to load saved conversations on `{stage}`: {source}"))]
    LoadConversations {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("background task failed on `{stage}`: {source}"))]
    Join {
        stage: &'static str,
        source: tokio::task::JoinError,
    },
    #[snafu(display("terminal i/o failed on `{stage}`: {source}"))]
    Terminal {
        stage: &'static str,
        source: std::io::Error,
    },
}

/// Everything the presentation layer reads and mutates.
pub struct AppState {
    store: SharedStore,
    controller: StreamingController,
    persistence: PersistenceHandle,
    theme: Theme,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        persistence: PersistenceHandle,
        idle_timeout: Duration,
        theme: Theme,
    ) -> Self {
        let store = SharedStore::new(ConversationStore::new(provider.clone(), persistence.clone()));
        let controller =
            StreamingController::new(store.clone(), provider).with_idle_timeout(idle_timeout);
        Self {
            store,
            controller,
            persistence,
            theme,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn controller(&self) -> &StreamingController {
        &self.controller
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn is_loading(&self) -> bool {
        self.controller.is_loading()
    }

    pub fn new_chat(&self) -> ConversationId {
        self.store
            .write(|store| store.create_conversation().id.clone())
    }

    /// Selects by 1-based position in the newest-first list.
    pub fn select_position(&self, position: usize) -> Option<ConversationId> {
        self.store.write(|store| {
            let conversation_id = store
                .list_newest_first()
                .get(position.checked_sub(1)?)
                .map(|conversation| conversation.id.clone())?;
            store
                .select_conversation(&conversation_id)
                .then_some(conversation_id)
        })
    }

    pub async fn send(&self, input: &str) -> Result<SendReport, SendError> {
        self.controller.send(input).await
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.theme
    }

    pub fn sidebar_entries(&self) -> Vec<SidebarEntry> {
        self.store.read(|store| {
            SidebarEntry::from_conversations(
                store.list_newest_first(),
                store.active_conversation_id(),
            )
        })
    }

    pub fn active_conversation_id(&self) -> Option<ConversationId> {
        self.store
            .read(|store| store.active_conversation_id().cloned())
    }

    pub fn active_messages(&self) -> Vec<Message> {
        self.store.read(|store| {
            store
                .active_conversation()
                .map(|conversation| conversation.messages.clone())
                .unwrap_or_default()
        })
    }

    /// Waits for queued snapshots to reach storage.
    pub async fn shutdown(&self) {
        self.persistence.flush().await;
    }
}

/// Builds the provider, opens storage, and restores saved conversations.
pub async fn bootstrap(settings: &Settings) -> Result<AppState, AppError> {
    let provider = create_provider(settings.provider_config()).context(CreateProviderSnafu {
        stage: "bootstrap-create-provider",
    })?;
    tracing::info!(provider = provider.id(), model = %provider.session_config().model_id, "provider ready");

    let repository = open_repository(settings).await?;
    let records = {
        let repository = repository.clone();
        tokio::task::spawn_blocking(move || repository.load())
            .await
            .context(JoinSnafu {
                stage: "bootstrap-load-conversations",
            })?
            .context(LoadConversationsSnafu {
                stage: "bootstrap-load-conversations",
            })?
    };

    let (persistence, _writer) = spawn_persistence_writer(repository);
    let app = AppState::new(
        provider,
        persistence,
        settings.stream_idle_timeout(),
        settings.theme,
    );
    app.store.write(|store| store.restore(records));
    Ok(app)
}

/// Boots the application and runs the terminal loop until the user quits.
pub async fn run(settings: &Settings) -> Result<(), AppError> {
    let app = bootstrap(settings).await?;
    run_terminal(app).await.context(TerminalSnafu {
        stage: "terminal-loop",
    })
}

async fn open_repository(settings: &Settings) -> Result<ConversationRepository, AppError> {
    let store: Arc<dyn BlobStore> = match settings.storage {
        StorageBackend::File => Arc::new(FileBlobStore::new(settings.data_dir())),
        StorageBackend::Sqlite => {
            let location = settings.data_dir().join(SQLITE_FILE_NAME);
            Arc::new(
                SqliteBlobStore::open(&location.to_string_lossy())
                    .await
                    .context(OpenStorageSnafu {
                        stage: "bootstrap-open-sqlite",
                    })?,
            )
        }
        StorageBackend::Memory => Arc::new(MemoryBlobStore::new()),
    };
    tracing::info!(backend = ?settings.storage, data_dir = ?settings.data_dir(), "conversation storage ready");
    Ok(ConversationRepository::new(store))
}
