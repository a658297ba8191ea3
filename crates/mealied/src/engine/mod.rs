mod engine;
mod entity;
mod integration;
mod message;
pub mod state;

pub use engine::Engine;
pub use engine::EngineError;
pub use entity::Entity;
pub use entity::Platform;
pub use integration::FromIntegrationSender;
pub use integration::Integration;
pub use integration::IntegrationContext;
pub use integration::IntegrationFactoryResult;
pub use integration::REGISTRY as INTEGRATION_REGISTRY;
pub use message::CommandError;
pub use message::CommandReply;
pub use message::FromIntegrationMessage;
pub use message::ImageData;
pub use message::ToIntegrationMessage;
pub use state::CalendarEvent;
pub use state::State;

#[cfg(test)]
pub(crate) use engine::tests::running_engine;
