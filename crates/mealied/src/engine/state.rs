use std::collections::HashMap;

use chrono::DateTime;
use chrono::Local;
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde::Serialize;

/// Completion status of a todo item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoItemStatus {
    #[default]
    NeedsAction,
    Completed,
}

/// A single item on a todo list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub uid: String,
    pub summary: String,
    pub status: TodoItemStatus,
}

/// State of a todo list entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TodoListState {
    pub name: String,

    /// Items in display order.
    pub items: Vec<TodoItem>,
}

/// A calendar event with local start and end times.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarEvent {
    pub summary: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// State of a calendar entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CalendarState {
    pub name: String,

    /// Whether an event is in progress right now.
    pub on: bool,

    /// The event currently shown by the calendar, if any.
    pub event: Option<CalendarEvent>,
}

/// State of a text sensor entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SensorState {
    pub name: String,
    pub value: Option<String>,
    pub attributes: HashMap<String, String>,
}

/// State of an image entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ImageState {
    pub name: String,
    pub image_url: Option<String>,

    /// When `image_url` last changed.
    pub last_updated: Option<DateTime<Local>>,
}

/// Health of an integration as last reported to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IntegrationStatus {
    Loaded,

    /// The last refresh failed; entities show their last good state.
    Unavailable { reason: String },

    /// Credentials were rejected and must be replaced in the config.
    ReauthRequired { reason: String },
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub todo_lists: HashMap<String, TodoListState>,
    pub calendars: HashMap<String, CalendarState>,
    pub sensors: HashMap<String, SensorState>,
    pub images: HashMap<String, ImageState>,
    pub integrations: HashMap<String, IntegrationStatus>,
}

impl State {
    /// Serialize the state of a single entity, looking it up across platforms.
    pub fn entity_json(&self, entity_id: &str) -> Option<serde_json::Value> {
        let value = if let Some(s) = self.todo_lists.get(entity_id) {
            serde_json::to_value(s)
        } else if let Some(s) = self.calendars.get(entity_id) {
            serde_json::to_value(s)
        } else if let Some(s) = self.sensors.get(entity_id) {
            serde_json::to_value(s)
        } else if let Some(s) = self.images.get(entity_id) {
            serde_json::to_value(s)
        } else {
            return None;
        };
        value.ok()
    }
}
