//! Gateway state
//!
//! Everything a node shares between its sockets, handlers and background tasks.

use crate::broadcast::{listener, Dispatcher, Message};
use crate::connection::{ClientRegistry, SessionRegistry};
use crate::handlers::{self, HandlerManager, HandlerResult};
use crate::room::RoomRegistry;
use crate::tasks::TaskPool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use watch_cache::{KeyValueStore, PubSubChannel, PubSubResult, PubSubTransport, SubscriptionManager};
use watch_common::{CorsConfig, SessionConfig, TokenVerifier, WorkerConfig};
use watch_core::{MediaInfoProvider, MediaItem, RoleRepository, RoomId, RoomRepository, UserRepository};

/// Database collaborators
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub rooms: Arc<dyn RoomRepository>,
    pub roles: Arc<dyn RoleRepository>,
}

/// What a node is built from
pub struct GatewayParts {
    pub node_id: String,
    pub store: Arc<dyn KeyValueStore>,
    pub transport: Arc<dyn PubSubTransport>,
    pub repositories: Repositories,
    pub verifier: Arc<dyn TokenVerifier>,
    pub media: Arc<dyn MediaInfoProvider>,
    pub session: SessionConfig,
    pub cors: CorsConfig,
    pub workers: WorkerConfig,
}

/// Gateway application state
#[derive(Clone)]
pub struct GatewayState {
    node_id: Arc<str>,
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn PubSubTransport>,
    subscriptions: Arc<SubscriptionManager>,
    clients: Arc<ClientRegistry>,
    sessions: Arc<SessionRegistry>,
    rooms: Arc<RoomRegistry>,
    dispatcher: Arc<Dispatcher>,
    handlers: Arc<HandlerManager>,
    repositories: Repositories,
    verifier: Arc<dyn TokenVerifier>,
    media: Arc<dyn MediaInfoProvider>,
    session_config: Arc<SessionConfig>,
    cors: Arc<CorsConfig>,
    tasks: TaskPool,
    shutdown: CancellationToken,
}

impl GatewayState {
    /// Start a node with the built-in handlers
    pub async fn start(parts: GatewayParts) -> PubSubResult<Self> {
        Self::start_with_handlers(parts, HandlerManager::with_defaults()).await
    }

    /// Start a node: subscribe its node and broadcast channels and spawn the
    /// pub/sub listener and the server message worker
    pub async fn start_with_handlers(parts: GatewayParts, handlers: HandlerManager) -> PubSubResult<Self> {
        let GatewayParts {
            node_id,
            store,
            transport,
            repositories,
            verifier,
            media,
            session,
            cors,
            workers,
        } = parts;

        // Take the receiver before subscribing so nothing published in between is lost
        let receiver = transport.receiver();
        let subscriptions = Arc::new(SubscriptionManager::new(transport.clone()));
        let clients = Arc::new(ClientRegistry::new());
        let sessions = Arc::new(SessionRegistry::new());
        let rooms = Arc::new(RoomRegistry::new(subscriptions.clone()));
        let (inbox, inbox_rx) = mpsc::unbounded_channel();

        let dispatcher = Arc::new(Dispatcher::new(
            node_id.clone(),
            store.clone(),
            transport.clone(),
            clients.clone(),
            sessions.clone(),
            rooms.clone(),
            inbox,
        ));

        let state = Self {
            node_id: node_id.into(),
            store,
            transport,
            subscriptions,
            clients,
            sessions,
            rooms,
            dispatcher,
            handlers: Arc::new(handlers),
            repositories,
            verifier,
            media,
            session_config: Arc::new(session),
            cors: Arc::new(cors),
            tasks: TaskPool::new(workers.pool_size),
            shutdown: CancellationToken::new(),
        };

        state
            .subscriptions
            .add_many(&[PubSubChannel::node(state.node_id()), PubSubChannel::broadcast()])
            .await?;

        let lagging = state.clone();
        tokio::spawn(listener::run(
            state.dispatcher.clone(),
            receiver,
            state.shutdown.child_token(),
            move |_| {
                let state = lagging.clone();
                tokio::spawn(async move { handlers::resync_local_rooms(&state).await });
            },
        ));
        tokio::spawn(run_inbox(state.clone(), inbox_rx));

        tracing::info!(node_id = %state.node_id, workers = state.tasks.size(), "Gateway node started");
        Ok(state)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn transport(&self) -> &Arc<dyn PubSubTransport> {
        &self.transport
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn handlers(&self) -> &HandlerManager {
        &self.handlers
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    pub fn verifier(&self) -> &dyn TokenVerifier {
        self.verifier.as_ref()
    }

    pub fn media(&self) -> &dyn MediaInfoProvider {
        self.media.as_ref()
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    pub fn cors(&self) -> &CorsConfig {
        &self.cors
    }

    pub fn tasks(&self) -> &TaskPool {
        &self.tasks
    }

    /// Gateway-wide scope; every connection token is a child of it
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Replace the playing item of a room, or clear it with `None`
    pub async fn set_current_item(&self, room_id: RoomId, item: Option<MediaItem>) -> HandlerResult<()> {
        handlers::set_current_item(self, room_id, item).await
    }

    /// Close every socket and stop the background tasks
    pub fn shutdown(&self) {
        tracing::info!(node_id = %self.node_id, connections = self.clients.len(), "Shutting down gateway node");
        self.shutdown.cancel();
        self.tasks.close();
    }
}

/// Runs server messages delivered to this node on the task pool
async fn run_inbox(state: GatewayState, mut inbox: mpsc::UnboundedReceiver<Message>) {
    let cancel = state.shutdown.clone();
    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => break,
            message = inbox.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let task_state = state.clone();
        let spawned = state
            .tasks
            .spawn(async move {
                let handlers = task_state.handlers.clone();
                handlers.handle_server(&task_state, &message).await;
            })
            .await;
        if spawned.is_none() {
            break;
        }
    }
    tracing::debug!(node_id = %state.node_id, "Server message worker stopped");
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("node_id", &self.node_id)
            .field("clients", &self.clients.len())
            .field("sessions", &self.sessions.len())
            .field("rooms", &self.rooms.len())
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}
