/// Entity abstraction for mealied
///
/// All entities (todo lists, calendars, sensors, images) implement the Entity trait.
use serde::Serialize;
use strum::Display;

/// Platform an entity belongs to. Also the prefix of its entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    Todo,
    Calendar,
    Sensor,
    Image,
}

/// Base trait that all entities must implement
pub trait Entity: Send + Sync {
    /// Entity id, e.g. "sensor.mealie_todays_lunch"
    fn entity_id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Return the platform type of this entity
    fn platform(&self) -> Platform;
}
