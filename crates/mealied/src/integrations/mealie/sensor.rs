use std::collections::HashMap;

use super::client::MealieApi;
use super::coordinator::Coordinator;
use super::entity::MealEntityDescription;
use crate::engine::Entity;
use crate::engine::Platform;
use crate::engine::state::SensorState;

pub const RECIPE_URL_ATTRIBUTE: &str = "recipe_url";

/// Text sensor showing the name of today's meal of one type
#[derive(Debug, Clone)]
pub struct MealSensor {
    description: MealEntityDescription,
    entity_id: String,
}

impl MealSensor {
    pub fn new(description: MealEntityDescription) -> Self {
        Self {
            entity_id: format!("sensor.mealie_{}", description.key),
            description,
        }
    }

    pub fn state<C: MealieApi>(&self, coordinator: &Coordinator<C>) -> SensorState {
        let meal = self.description.meal;
        let mut attributes = HashMap::new();
        if let Some(url) = coordinator.todays_recipe_url(meal) {
            attributes.insert(RECIPE_URL_ATTRIBUTE.to_string(), url);
        }

        SensorState {
            name: self.description.name.to_string(),
            value: coordinator.todays_meal_name(meal),
            attributes,
        }
    }
}

impl Entity for MealSensor {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn name(&self) -> &str {
        self.description.name
    }

    fn platform(&self) -> Platform {
        Platform::Sensor
    }
}
