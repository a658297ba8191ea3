use std::collections::HashMap;
use std::sync::Arc;
use std::sync::MutexGuard;

use arc_swap::ArcSwap;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::ToIntegrationSender;
use super::message::CommandError;
use super::message::CommandReply;
use super::message::FromIntegrationMessage;
use super::message::ImageData;
use super::message::Route;
use super::message::ToIntegrationMessage;
use super::state::CalendarEvent;
use super::state::State;
use super::state::TodoItemStatus;
use crate::engine::IntegrationContext;

/// Errors raised while routing a command to an integration
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no integration found for entity: {0}")]
    UnknownEntity(String),

    #[error("service not registered: {domain}.{service}")]
    UnknownService { domain: String, service: String },

    #[error("integration channel closed: {0}")]
    IntegrationGone(String),

    #[error("integration dropped the command without replying")]
    NoReply,

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// mealied engine
///
/// This structure handles the flow of events, sending commands to the correct
/// integration, and maintaining a view of the world with State.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Map of entity_id -> integration name for routing messages
    entity_integration_map: std::sync::Mutex<HashMap<String, String>>,

    /// Map of (domain, service) -> integration name for service calls
    services: std::sync::Mutex<HashMap<(String, String), String>>,

    /// Communication channels to integrations (for commands)
    integration_channels: std::sync::Mutex<HashMap<String, ToIntegrationSender>>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Handles for integration tasks
    integration_handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

/// Lock a std mutex, recovering the data if a previous holder panicked
fn lock<T>(mutex: &std::sync::Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            entity_integration_map: std::sync::Mutex::new(HashMap::new()),
            services: std::sync::Mutex::new(HashMap::new()),
            integration_channels: std::sync::Mutex::new(HashMap::new()),
            message_rx: Mutex::new(message_rx),
            message_tx,
            integration_handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Register integrations from configuration
    ///
    /// Runs every factory in the integration registry; factories return
    /// `Ok(None)` when their config section is absent.
    pub fn register_integrations_from_config(&mut self, cfg: &crate::config::Config) {
        let ctx = IntegrationContext { config: cfg };
        for constr in super::integration::REGISTRY {
            let integration = match constr(&ctx) {
                Ok(Some(i)) => i,
                Err(e) => {
                    error!("failed to setup integration: {:#}", e);
                    continue;
                }
                Ok(None) => continue,
            };
            let name = integration.name().to_string();
            self.register_integration(name, integration);
        }
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&mut self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        lock(&self.integration_channels).insert(name.clone(), to_integration_tx);

        // Spawn integration task
        let handle = tokio::spawn(async move {
            // Setup integration (gives it the sender for events)
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        lock(&self.integration_handles).push(handle);
    }

    /// Send a command to an integration
    ///
    /// Entity commands are routed to the integration that discovered the
    /// entity; service calls to the integration that registered the service.
    pub fn send_command(&self, msg: ToIntegrationMessage) -> Result<(), EngineError> {
        let integration_name = match msg.route() {
            Route::Entity(entity_id) => lock(&self.entity_integration_map)
                .get(entity_id)
                .cloned()
                .ok_or_else(|| EngineError::UnknownEntity(entity_id.to_string()))?,
            Route::Domain(domain) => {
                let service = match &msg {
                    ToIntegrationMessage::CallService { service, .. } => service.as_str(),
                    _ => "",
                };
                lock(&self.services)
                    .get(&(domain.to_string(), service.to_string()))
                    .cloned()
                    .ok_or_else(|| EngineError::UnknownService {
                        domain: domain.to_string(),
                        service: service.to_string(),
                    })?
            }
        };

        let channels = lock(&self.integration_channels);
        let tx = channels
            .get(&integration_name)
            .ok_or_else(|| EngineError::IntegrationGone(integration_name.clone()))?;

        tx.send(msg)
            .map_err(|_| EngineError::IntegrationGone(integration_name.clone()))
    }

    /// Send a command built around a fresh reply channel and wait for the answer
    async fn request<T>(
        &self,
        build: impl FnOnce(CommandReply<T>) -> ToIntegrationMessage,
    ) -> Result<T, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(build(reply))?;
        Ok(rx.await.map_err(|_| EngineError::NoReply)??)
    }

    pub async fn create_todo_item(
        &self,
        entity_id: &str,
        summary: &str,
    ) -> Result<(), EngineError> {
        self.request(|reply| ToIntegrationMessage::CreateTodoItem {
            entity_id: entity_id.to_string(),
            summary: summary.to_string(),
            reply,
        })
        .await
    }

    pub async fn update_todo_item(
        &self,
        entity_id: &str,
        uid: &str,
        summary: &str,
        status: TodoItemStatus,
    ) -> Result<(), EngineError> {
        self.request(|reply| ToIntegrationMessage::UpdateTodoItem {
            entity_id: entity_id.to_string(),
            uid: uid.to_string(),
            summary: summary.to_string(),
            status,
            reply,
        })
        .await
    }

    pub async fn delete_todo_items(
        &self,
        entity_id: &str,
        uids: Vec<String>,
    ) -> Result<(), EngineError> {
        self.request(|reply| ToIntegrationMessage::DeleteTodoItems {
            entity_id: entity_id.to_string(),
            uids,
            reply,
        })
        .await
    }

    pub async fn move_todo_item(
        &self,
        entity_id: &str,
        uid: &str,
        previous_uid: Option<&str>,
    ) -> Result<(), EngineError> {
        self.request(|reply| ToIntegrationMessage::MoveTodoItem {
            entity_id: entity_id.to_string(),
            uid: uid.to_string(),
            previous_uid: previous_uid.map(str::to_string),
            reply,
        })
        .await
    }

    pub async fn calendar_events(
        &self,
        entity_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CalendarEvent>, EngineError> {
        self.request(|reply| ToIntegrationMessage::GetCalendarEvents {
            entity_id: entity_id.to_string(),
            start,
            end,
            reply,
        })
        .await
    }

    pub async fn image(&self, entity_id: &str) -> Result<ImageData, EngineError> {
        self.request(|reply| ToIntegrationMessage::GetImage {
            entity_id: entity_id.to_string(),
            reply,
        })
        .await
    }

    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: serde_json::Value,
    ) -> Result<(), EngineError> {
        self.request(|reply| ToIntegrationMessage::CallService {
            domain: domain.to_string(),
            service: service.to_string(),
            data,
            reply,
        })
        .await
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) {
        info!("Engine starting");

        // Main event loop - only receives FromIntegration messages
        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
    }

    /// Close every command channel and wait for the integration tasks to finish
    pub async fn shutdown(&self) {
        lock(&self.integration_channels).clear();

        let handles: Vec<_> = lock(&self.integration_handles).drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Integration task ended abnormally: {}", e);
            }
        }
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Apply a change to a copy of the state and publish it
    fn update_state(&self, f: impl FnOnce(&mut State)) {
        let mut state = State::clone(&self.state.load());
        f(&mut state);
        self.state.store(Arc::new(state));
    }

    /// Handle an event from an integration
    fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                platform,
                integration_name,
            } => {
                info!(
                    "Entity discovered: {} ({} from {})",
                    entity_id, platform, integration_name
                );

                // Record which integration owns this entity for command routing.
                // State is not populated until the first state-change message arrives.
                lock(&self.entity_integration_map).insert(entity_id, integration_name);
            }
            FromIntegrationMessage::ServiceRegistered {
                domain,
                service,
                integration_name,
            } => {
                info!("Service registered: {}.{} ({})", domain, service, integration_name);
                lock(&self.services).insert((domain, service), integration_name);
            }
            FromIntegrationMessage::IntegrationStatusChanged {
                integration_name,
                status,
            } => {
                info!("Integration '{}' status: {:?}", integration_name, status);
                self.update_state(|state| {
                    state.integrations.insert(integration_name, status);
                });
            }
            FromIntegrationMessage::TodoListChanged { entity_id, state } => {
                debug!("Todo list changed: {} ({} items)", entity_id, state.items.len());
                self.update_state(|s| {
                    s.todo_lists.insert(entity_id, state);
                });
            }
            FromIntegrationMessage::CalendarChanged { entity_id, state } => {
                debug!("Calendar changed: {} -> on={}", entity_id, state.on);
                self.update_state(|s| {
                    s.calendars.insert(entity_id, state);
                });
            }
            FromIntegrationMessage::SensorChanged { entity_id, state } => {
                debug!("Sensor changed: {} -> {:?}", entity_id, state.value);
                self.update_state(|s| {
                    s.sensors.insert(entity_id, state);
                });
            }
            FromIntegrationMessage::ImageChanged { entity_id, state } => {
                debug!("Image changed: {} -> {:?}", entity_id, state.image_url);
                self.update_state(|s| {
                    s.images.insert(entity_id, state);
                });
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
