use tracing::warn;

use super::client::MealieApi;
use super::coordinator::Coordinator;
use super::entity::MealEntityDescription;
use crate::engine::Entity;
use crate::engine::ImageData;
use crate::engine::Platform;
use crate::engine::state::ImageState;

const PLACEHOLDER_PNG: &[u8] = include_bytes!("../../../assets/placeholder.png");

/// Image served when a meal has no recipe image or it can't be fetched
pub fn placeholder() -> ImageData {
    ImageData {
        content_type: "image/png".to_string(),
        content: PLACEHOLDER_PNG.to_vec(),
    }
}

/// Recipe image of today's meal of one type
#[derive(Debug, Clone)]
pub struct MealImage {
    description: MealEntityDescription,
    entity_id: String,

    /// Last successfully fetched image and the URL it came from
    cache: Option<(String, ImageData)>,
}

impl MealImage {
    pub fn new(description: MealEntityDescription) -> Self {
        Self {
            entity_id: format!("image.mealie_{}", description.key),
            description,
            cache: None,
        }
    }

    pub fn state<C: MealieApi>(&self, coordinator: &Coordinator<C>) -> ImageState {
        let meal = self.description.meal;
        ImageState {
            name: self.description.name.to_string(),
            image_url: coordinator.todays_image_url(meal),
            last_updated: coordinator.image_last_updated(meal),
        }
    }

    /// Image bytes for the current URL, falling back to the placeholder
    pub async fn image<C: MealieApi>(&mut self, coordinator: &Coordinator<C>) -> ImageData {
        let Some(url) = coordinator.todays_image_url(self.description.meal) else {
            return placeholder();
        };

        if let Some((cached_url, data)) = &self.cache {
            if *cached_url == url {
                return data.clone();
            }
        }

        match coordinator.api().fetch_image(&url).await {
            Ok(data) => {
                self.cache = Some((url, data.clone()));
                data
            }
            Err(e) => {
                warn!(
                    "[mealie] failed to fetch image for {}: {}",
                    self.entity_id, e
                );
                placeholder()
            }
        }
    }
}

impl Entity for MealImage {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn name(&self) -> &str {
        self.description.name
    }

    fn platform(&self) -> Platform {
        Platform::Image
    }
}
