//! Mealie integration
//!
//! Exposes a Mealie server's shopping lists as todo lists, its meal plan as a
//! calendar, and today's meals as sensors and images.

mod calendar;
pub mod client;
mod config;
pub mod coordinator;
mod entity;
pub mod error;
mod image;
// Private module - allowed by clippy.toml allow-private-module-inception
#[allow(clippy::module_inception)]
mod mealie;
pub mod reorder;
mod sensor;
mod todo;
pub mod types;
mod url;
mod windows;

use anyhow::Context;
pub use client::MealieApi;
pub use client::MealieClient;
pub use config::Config as MealieConfig;
pub use config::PartialConfig as PartialMealieConfig;
use linkme::distributed_slice;
pub use mealie::MealieIntegration;
pub use mealie::ADD_SHOPPING_LIST_ITEM;
pub use mealie::DOMAIN;
pub use url::build_url;
pub use windows::MealWindow;
pub use windows::MealWindows;

use crate::engine;

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_mealie(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let mealie_config = if let Some(c) = &ctx.config.integrations.mealie {
        c
    } else {
        return Ok(None);
    };

    let client = MealieClient::new(mealie_config).context("Failed to create Mealie client")?;
    Ok(Some(Box::new(MealieIntegration::new(client, mealie_config))))
}
