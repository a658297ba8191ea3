use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::warn;

use super::MealieConfig;
use super::error::ApiError;
use super::error::error_detail;
use super::types::Group;
use super::types::MealPlanEntry;
use super::types::NewShoppingListItem;
use super::types::Page;
use super::types::ShoppingList;
use super::types::ShoppingListItem;
use super::url::build_url;
use crate::engine::ImageData;

/// Every request gives up after this long
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_IMAGE_CONTENT_TYPE: &str = "image/webp";

/// Operations against the Mealie REST API
///
/// This trait allows for mocking the Mealie client for testing purposes
#[async_trait]
pub trait MealieApi: Send + Sync {
    /// The group the token belongs to (also validates the token)
    async fn group_self(&self) -> Result<Group, ApiError>;

    async fn shopping_lists(&self) -> Result<Vec<ShoppingList>, ApiError>;

    /// Items of one list, ordered by position
    async fn shopping_list_items(&self, list_id: &str) -> Result<Vec<ShoppingListItem>, ApiError>;

    async fn add_shopping_list_item(&self, item: &NewShoppingListItem) -> Result<(), ApiError>;

    /// Replace an item with the given full representation
    async fn update_shopping_list_item(&self, item: &ShoppingListItem) -> Result<(), ApiError>;

    async fn delete_shopping_list_item(&self, item_id: &str) -> Result<(), ApiError>;

    /// Meal plan entries between two dates, inclusive
    async fn meal_plans(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MealPlanEntry>, ApiError>;

    async fn meal_plans_today(&self) -> Result<Vec<MealPlanEntry>, ApiError>;

    /// Download an image from an absolute URL
    async fn fetch_image(&self, url: &str) -> Result<ImageData, ApiError>;

    /// URL of a recipe's image (no request is made)
    fn recipe_image_url(&self, recipe_id: &str) -> String;

    /// URL of a recipe's page in the Mealie web UI (no request is made)
    fn recipe_url(&self, group_slug: &str, recipe_slug: &str) -> String;
}

fn recipe_image_path(recipe_id: &str) -> String {
    format!("/api/media/recipes/{}/images/min-original.webp", recipe_id)
}

fn recipe_page_path(group_slug: &str, recipe_slug: &str) -> String {
    format!("/g/{}/r/{}", group_slug, recipe_slug)
}

/// Body and content type of a successful response
struct RawResponse {
    content_type: Option<String>,
    body: Vec<u8>,
}

/// Mealie client implementation using reqwest
pub struct MealieClient {
    http: reqwest::Client,
    host: String,
    token: String,
}

impl MealieClient {
    /// Create a new MealieClient from configuration
    pub fn new(config: &MealieConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            host: config.host.clone(),
            token: config.token.clone(),
        })
    }

    async fn send(
        &self,
        method: Method,
        url: String,
        body: Option<serde_json::Value>,
    ) -> Result<RawResponse, ApiError> {
        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let result = Self::read(request, &url).await;
        match &result {
            Ok(_) => debug!("[mealie] {} {} ok", method, url),
            Err(e) => warn!("[mealie] {} {} failed ({})", method, url, e.code()),
        }
        result
    }

    async fn read(request: reqwest::RequestBuilder, url: &str) -> Result<RawResponse, ApiError> {
        let no_connection = |e: reqwest::Error| ApiError::NoConnection {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = request.send().await.map_err(no_connection)?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(no_connection)?.to_vec();

        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        Ok(RawResponse { content_type, body })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = build_url(&self.host, path);
        let response = self.send(Method::GET, url.clone(), None).await?;
        serde_json::from_slice(&response.body).map_err(|e| {
            warn!("[mealie] GET {} returned an unexpected body: {}", url, e);
            ApiError::Decode {
                url,
                message: e.to_string(),
            }
        })
    }

    async fn write(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(), ApiError> {
        let url = build_url(&self.host, path);
        self.send(method, url, body).await.map(|_| ())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Option<serde_json::Value> {
    serde_json::to_value(value).ok()
}

#[async_trait]
impl MealieApi for MealieClient {
    async fn group_self(&self) -> Result<Group, ApiError> {
        self.get("/api/groups/self").await
    }

    async fn shopping_lists(&self) -> Result<Vec<ShoppingList>, ApiError> {
        let page: Page<ShoppingList> = self
            .get("/api/groups/shopping/lists?page=1&perPage=-1")
            .await?;
        Ok(page.items)
    }

    async fn shopping_list_items(&self, list_id: &str) -> Result<Vec<ShoppingListItem>, ApiError> {
        let page: Page<ShoppingListItem> = self
            .get(&format!(
                "/api/groups/shopping/items?queryFilter=shoppingListId={}\
                 &orderBy=position&orderDirection=asc&page=1&perPage=-1",
                list_id
            ))
            .await?;
        Ok(page.items)
    }

    async fn add_shopping_list_item(&self, item: &NewShoppingListItem) -> Result<(), ApiError> {
        self.write(Method::POST, "/api/groups/shopping/items", to_json(item))
            .await
    }

    async fn update_shopping_list_item(&self, item: &ShoppingListItem) -> Result<(), ApiError> {
        self.write(
            Method::PUT,
            &format!("/api/groups/shopping/items/{}", item.id),
            to_json(item),
        )
        .await
    }

    async fn delete_shopping_list_item(&self, item_id: &str) -> Result<(), ApiError> {
        self.write(
            Method::DELETE,
            &format!("/api/groups/shopping/items/{}", item_id),
            None,
        )
        .await
    }

    async fn meal_plans(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MealPlanEntry>, ApiError> {
        let page: Page<MealPlanEntry> = self
            .get(&format!(
                "/api/groups/mealplans?start_date={}&end_date={}&page=1&perPage=-1",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            ))
            .await?;
        Ok(page.items)
    }

    async fn meal_plans_today(&self) -> Result<Vec<MealPlanEntry>, ApiError> {
        self.get("/api/groups/mealplans/today").await
    }

    async fn fetch_image(&self, url: &str) -> Result<ImageData, ApiError> {
        let response = self.send(Method::GET, url.to_string(), None).await?;
        Ok(ImageData {
            content_type: response
                .content_type
                .filter(|ct| ct.starts_with("image/"))
                .unwrap_or_else(|| DEFAULT_IMAGE_CONTENT_TYPE.to_string()),
            content: response.body,
        })
    }

    fn recipe_image_url(&self, recipe_id: &str) -> String {
        build_url(&self.host, &recipe_image_path(recipe_id))
    }

    fn recipe_url(&self, group_slug: &str, recipe_slug: &str) -> String {
        build_url(&self.host, &recipe_page_path(group_slug, recipe_slug))
    }
}

/// Mock Mealie server state for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockState {
    pub group: Option<Group>,
    pub lists: Vec<ShoppingList>,
    pub items: std::collections::HashMap<String, Vec<ShoppingListItem>>,
    pub meal_plan_today: Vec<MealPlanEntry>,
    pub meal_plans: Vec<MealPlanEntry>,
    pub images: std::collections::HashMap<String, ImageData>,

    /// Returned by every call while set
    pub fail_with: Option<ApiError>,

    /// Fail only calls starting with this, with a 500
    pub fail_on: Option<String>,

    /// Method and path of every call, in order
    pub calls: Vec<String>,

    next_id: u32,
}

/// Mock Mealie client for testing
///
/// Clones share the same state, so a test can keep one handle and give the
/// other to the code under test.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MockMealieApi {
    state: std::sync::Arc<std::sync::Mutex<MockState>>,
}

#[cfg(test)]
pub const MOCK_HOST: &str = "http://mealie.test";

#[cfg(test)]
impl MockMealieApi {
    /// Create a new mock client with one group and no data
    pub fn new() -> Self {
        let mock = Self::default();
        mock.state().group = Some(Group {
            id: "g1".to_string(),
            name: "Home".to_string(),
            slug: "home".to_string(),
        });
        mock
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Add a list with items named after `notes`, positioned in order
    pub fn add_list(&self, id: &str, name: &str, notes: &[&str]) {
        let mut state = self.state();
        state.lists.push(ShoppingList {
            id: id.to_string(),
            name: name.to_string(),
        });
        let items = notes
            .iter()
            .enumerate()
            .map(|(i, note)| mock_item(&format!("{id}-{i}"), id, note, i as i64))
            .collect();
        state.items.insert(id.to_string(), items);
    }

    /// Item ids of a list in position order
    pub fn item_ids(&self, list_id: &str) -> Vec<String> {
        let mut items = self.state().items.get(list_id).cloned().unwrap_or_default();
        items.sort_by_key(|i| i.position);
        items.into_iter().map(|i| i.id).collect()
    }

    fn call(&self, call: String) -> Result<std::sync::MutexGuard<'_, MockState>, ApiError> {
        let mut state = self.state();
        state.calls.push(call.clone());
        if let Some(e) = &state.fail_with {
            return Err(e.clone());
        }
        if let Some(prefix) = &state.fail_on {
            if call.starts_with(prefix.as_str()) {
                return Err(ApiError::Status {
                    url: format!("{MOCK_HOST}{}", call.split(' ').nth(1).unwrap_or_default()),
                    status: 500,
                    detail: Some("Internal Server Error".to_string()),
                });
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
pub fn mock_item(id: &str, list_id: &str, note: &str, position: i64) -> ShoppingListItem {
    ShoppingListItem {
        id: id.to_string(),
        shopping_list_id: list_id.to_string(),
        display: Some(note.to_string()),
        note: Some(note.to_string()),
        checked: false,
        position,
        food_id: None,
        unit_id: None,
        label_id: None,
        quantity: 1.0,
        is_food: false,
        extra: serde_json::Map::new(),
    }
}

#[cfg(test)]
#[async_trait]
impl MealieApi for MockMealieApi {
    async fn group_self(&self) -> Result<Group, ApiError> {
        let state = self.call("GET /api/groups/self".to_string())?;
        state.group.clone().ok_or_else(|| ApiError::Status {
            url: format!("{MOCK_HOST}/api/groups/self"),
            status: 404,
            detail: None,
        })
    }

    async fn shopping_lists(&self) -> Result<Vec<ShoppingList>, ApiError> {
        let state = self.call("GET /api/groups/shopping/lists".to_string())?;
        Ok(state.lists.clone())
    }

    async fn shopping_list_items(&self, list_id: &str) -> Result<Vec<ShoppingListItem>, ApiError> {
        let state = self.call(format!("GET /api/groups/shopping/items?list={list_id}"))?;
        let mut items = state.items.get(list_id).cloned().unwrap_or_default();
        items.sort_by_key(|i| i.position);
        Ok(items)
    }

    async fn add_shopping_list_item(&self, item: &NewShoppingListItem) -> Result<(), ApiError> {
        let mut state = self.call(format!("POST /api/groups/shopping/items {}", item.note))?;
        state.next_id += 1;
        let id = format!("new-{}", state.next_id);
        let created = mock_item(&id, &item.shopping_list_id, &item.note, item.position);
        state
            .items
            .entry(item.shopping_list_id.clone())
            .or_default()
            .push(created);
        Ok(())
    }

    async fn update_shopping_list_item(&self, item: &ShoppingListItem) -> Result<(), ApiError> {
        let mut state = self.call(format!(
            "PUT /api/groups/shopping/items/{} position={}",
            item.id, item.position
        ))?;
        let stored = state
            .items
            .get_mut(&item.shopping_list_id)
            .and_then(|items| items.iter_mut().find(|i| i.id == item.id));
        match stored {
            Some(stored) => {
                *stored = item.clone();
                Ok(())
            }
            None => Err(ApiError::Status {
                url: format!("{MOCK_HOST}/api/groups/shopping/items/{}", item.id),
                status: 404,
                detail: Some("No Entry Found".to_string()),
            }),
        }
    }

    async fn delete_shopping_list_item(&self, item_id: &str) -> Result<(), ApiError> {
        let mut state = self.call(format!("DELETE /api/groups/shopping/items/{item_id}"))?;
        for items in state.items.values_mut() {
            items.retain(|i| i.id != item_id);
        }
        Ok(())
    }

    async fn meal_plans(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MealPlanEntry>, ApiError> {
        let state = self.call(format!("GET /api/groups/mealplans {start}..{end}"))?;
        Ok(state
            .meal_plans
            .iter()
            .filter(|e| e.date >= start && e.date <= end)
            .cloned()
            .collect())
    }

    async fn meal_plans_today(&self) -> Result<Vec<MealPlanEntry>, ApiError> {
        let state = self.call("GET /api/groups/mealplans/today".to_string())?;
        Ok(state.meal_plan_today.clone())
    }

    async fn fetch_image(&self, url: &str) -> Result<ImageData, ApiError> {
        let state = self.call(format!("GET {url}"))?;
        state.images.get(url).cloned().ok_or_else(|| ApiError::Status {
            url: url.to_string(),
            status: 404,
            detail: None,
        })
    }

    fn recipe_image_url(&self, recipe_id: &str) -> String {
        build_url(MOCK_HOST, &recipe_image_path(recipe_id))
    }

    fn recipe_url(&self, group_slug: &str, recipe_slug: &str) -> String {
        build_url(MOCK_HOST, &recipe_page_path(group_slug, recipe_slug))
    }
}
