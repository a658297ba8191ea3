//! Type-safe message system for mealied
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations
//!
//! Commands carry a oneshot reply channel so callers (the HTTP API) can wait
//! for the integration's answer.

use chrono::NaiveDate;
use tokio::sync::oneshot;

use super::entity::Platform;
use super::state::CalendarEvent;
use super::state::CalendarState;
use super::state::ImageState;
use super::state::IntegrationStatus;
use super::state::SensorState;
use super::state::TodoItemStatus;
use super::state::TodoListState;

/// Errors an integration reports back for a command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),

    /// The upstream service rejected or failed the request
    #[error("upstream request failed: {0}")]
    Failed(String),

    #[error("unsupported command for {0}")]
    Unsupported(String),
}

pub type CommandReply<T> = oneshot::Sender<Result<T, CommandError>>;

/// Raw image bytes served by an image entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug)]
pub enum FromIntegrationMessage {
    /// An entity was discovered and registered
    EntityDiscovered {
        entity_id: String,
        platform: Platform,
        integration_name: String,
    },

    /// An integration made a service callable as `domain.service`
    ServiceRegistered {
        domain: String,
        service: String,
        integration_name: String,
    },

    /// An integration's health changed
    IntegrationStatusChanged {
        integration_name: String,
        status: IntegrationStatus,
    },

    TodoListChanged {
        entity_id: String,
        state: TodoListState,
    },

    CalendarChanged {
        entity_id: String,
        state: CalendarState,
    },

    SensorChanged {
        entity_id: String,
        state: SensorState,
    },

    ImageChanged {
        entity_id: String,
        state: ImageState,
    },
}

/// Where the engine should deliver a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<'a> {
    Entity(&'a str),
    Domain(&'a str),
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug)]
pub enum ToIntegrationMessage {
    CreateTodoItem {
        entity_id: String,
        summary: String,
        reply: CommandReply<()>,
    },

    UpdateTodoItem {
        entity_id: String,
        uid: String,
        summary: String,
        status: TodoItemStatus,
        reply: CommandReply<()>,
    },

    DeleteTodoItems {
        entity_id: String,
        uids: Vec<String>,
        reply: CommandReply<()>,
    },

    /// Move `uid` directly after `previous_uid`, or to the head when `None`
    MoveTodoItem {
        entity_id: String,
        uid: String,
        previous_uid: Option<String>,
        reply: CommandReply<()>,
    },

    /// Calendar events between two dates (inclusive)
    GetCalendarEvents {
        entity_id: String,
        start: NaiveDate,
        end: NaiveDate,
        reply: CommandReply<Vec<CalendarEvent>>,
    },

    GetImage {
        entity_id: String,
        reply: CommandReply<ImageData>,
    },

    CallService {
        domain: String,
        service: String,
        data: serde_json::Value,
        reply: CommandReply<()>,
    },
}

impl ToIntegrationMessage {
    /// Routing key for this command
    pub fn route(&self) -> Route<'_> {
        match self {
            ToIntegrationMessage::CreateTodoItem { entity_id, .. }
            | ToIntegrationMessage::UpdateTodoItem { entity_id, .. }
            | ToIntegrationMessage::DeleteTodoItems { entity_id, .. }
            | ToIntegrationMessage::MoveTodoItem { entity_id, .. }
            | ToIntegrationMessage::GetCalendarEvents { entity_id, .. }
            | ToIntegrationMessage::GetImage { entity_id, .. } => Route::Entity(entity_id),
            ToIntegrationMessage::CallService { domain, .. } => Route::Domain(domain),
        }
    }
}
