use std::collections::HashMap;

use chrono::DateTime;
use chrono::Local;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::MealieApi;
use super::error::ApiError;
use super::reorder;
use super::reorder::ReorderError;
use super::types::Group;
use super::types::MealPlanEntry;
use super::types::MealType;
use super::types::NewShoppingListItem;
use super::types::ShoppingList;
use super::types::ShoppingListItem;
use super::types::first_of_type;

/// Why a refresh did not update the snapshot
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("unable to log in, please re-login: {0}")]
    AuthFailed(ApiError),

    #[error("error communicating with Mealie: {0}")]
    UpdateFailed(ApiError),
}

impl From<ApiError> for RefreshError {
    fn from(e: ApiError) -> Self {
        if e.is_auth_failure() {
            RefreshError::AuthFailed(e)
        } else {
            RefreshError::UpdateFailed(e)
        }
    }
}

/// Why a shopping-list write did not happen
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemError {
    #[error("unknown shopping list: {0}")]
    UnknownList(String),

    #[error("item '{0}' is not on the list")]
    UnknownItem(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl From<ReorderError> for ItemError {
    fn from(e: ReorderError) -> Self {
        match e {
            ReorderError::ItemNotFound(uid) => ItemError::UnknownItem(uid),
        }
    }
}

/// Remote state as of the last successful refresh
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Today's meal plan entries, in server order
    pub meal_plan: Vec<MealPlanEntry>,

    /// Items per shopping list id, ordered by position
    pub shopping_list_items: HashMap<String, Vec<ShoppingListItem>>,

    pub last_refreshed: Option<DateTime<Local>>,
}

/// Current image URL of a meal slot and when it last changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ImageTrack {
    url: Option<String>,
    updated: Option<DateTime<Local>>,
}

/// Polls Mealie and caches what it returns
pub struct Coordinator<C: MealieApi> {
    api: C,
    configured_group_id: Option<String>,
    group: Option<Group>,

    /// Fetched once; re-fetched only while empty
    shopping_lists: Option<Vec<ShoppingList>>,

    snapshot: Snapshot,
    images: HashMap<MealType, ImageTrack>,
}

impl<C: MealieApi> Coordinator<C> {
    pub fn new(api: C, group_id: Option<String>) -> Self {
        Self {
            api,
            configured_group_id: group_id,
            group: None,
            shopping_lists: None,
            snapshot: Snapshot::default(),
            images: HashMap::new(),
        }
    }

    pub fn api(&self) -> &C {
        &self.api
    }

    pub fn group(&self) -> Option<&Group> {
        self.group.as_ref()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Validate credentials, resolve the group, discover lists and run the
    /// first refresh
    pub async fn setup(&mut self) -> Result<(), RefreshError> {
        let group = self.api.group_self().await?;
        if let Some(configured) = &self.configured_group_id {
            if *configured != group.id {
                warn!(
                    "[mealie] configured group '{}' differs from the token's group '{}' ({}), \
                     using the token's",
                    configured, group.id, group.slug
                );
            }
        }
        info!("[mealie] connected to group '{}'", group.name);
        self.group = Some(group);

        self.shopping_lists().await?;
        self.refresh().await
    }

    /// Shopping lists, fetched on first use and cached
    pub async fn shopping_lists(&mut self) -> Result<&[ShoppingList], RefreshError> {
        let cached = match self.shopping_lists.take() {
            Some(lists) if !lists.is_empty() => lists,
            _ => {
                let lists = self.api.shopping_lists().await?;
                debug!("[mealie] discovered {} shopping list(s)", lists.len());
                lists
            }
        };
        let lists: &[ShoppingList] = self.shopping_lists.insert(cached);
        Ok(lists)
    }

    /// Lists known without making a request
    pub fn cached_shopping_lists(&self) -> &[ShoppingList] {
        self.shopping_lists.as_deref().unwrap_or_default()
    }

    /// Re-fetch today's meal plan and every known list's items
    ///
    /// The snapshot is replaced only if every request succeeds.
    pub async fn refresh(&mut self) -> Result<(), RefreshError> {
        let meal_plan = self.api.meal_plans_today().await?;

        let mut shopping_list_items = HashMap::new();
        for list in self.cached_shopping_lists() {
            let items = self.api.shopping_list_items(&list.id).await?;
            shopping_list_items.insert(list.id.clone(), items);
        }

        let now = Local::now();
        self.snapshot = Snapshot {
            meal_plan,
            shopping_list_items,
            last_refreshed: Some(now),
        };
        self.track_images(now);

        debug!(
            "[mealie] refreshed: {} meal(s) today, {} list(s)",
            self.snapshot.meal_plan.len(),
            self.snapshot.shopping_list_items.len()
        );
        Ok(())
    }

    fn track_images(&mut self, now: DateTime<Local>) {
        for meal in MealType::ALL {
            let url = self.todays_image_url(meal);
            let track = self.images.entry(meal).or_default();
            if track.url != url {
                track.url = url;
                track.updated = Some(now);
            }
        }
    }

    pub fn todays_meal(&self, meal: MealType) -> Option<&MealPlanEntry> {
        first_of_type(&self.snapshot.meal_plan, meal)
    }

    /// Display name of today's meal of this type
    pub fn todays_meal_name(&self, meal: MealType) -> Option<String> {
        self.todays_meal(meal).map(MealPlanEntry::display_name)
    }

    /// Web UI link to today's recipe of this type
    pub fn todays_recipe_url(&self, meal: MealType) -> Option<String> {
        let recipe = self.todays_meal(meal)?.linked_recipe()?;
        let slug = recipe.slug.as_deref().filter(|s| !s.is_empty())?;
        let group = self.group.as_ref()?;
        Some(self.api.recipe_url(&group.slug, slug))
    }

    pub fn todays_image_url(&self, meal: MealType) -> Option<String> {
        let recipe_id = self.todays_meal(meal)?.recipe_id.as_deref()?;
        if recipe_id.is_empty() {
            return None;
        }
        Some(self.api.recipe_image_url(recipe_id))
    }

    /// When today's image URL of this type last changed
    pub fn image_last_updated(&self, meal: MealType) -> Option<DateTime<Local>> {
        self.images.get(&meal).and_then(|track| track.updated)
    }

    pub fn items(&self, list_id: &str) -> Option<&[ShoppingListItem]> {
        self.snapshot
            .shopping_list_items
            .get(list_id)
            .map(Vec::as_slice)
    }

    fn list_items(&self, list_id: &str) -> Result<&[ShoppingListItem], ItemError> {
        self.items(list_id)
            .ok_or_else(|| ItemError::UnknownList(list_id.to_string()))
    }

    /// Append an item after the last one on the list
    pub async fn add_item(&self, list_id: &str, note: &str) -> Result<(), ItemError> {
        let position = self
            .list_items(list_id)?
            .iter()
            .map(|item| item.position)
            .max()
            .map_or(0, |last| last + 1);

        let item = NewShoppingListItem::new(list_id, note, position);
        self.api.add_shopping_list_item(&item).await?;
        Ok(())
    }

    pub async fn update_item(
        &self,
        list_id: &str,
        uid: &str,
        summary: &str,
        checked: bool,
    ) -> Result<(), ItemError> {
        let mut item = self
            .list_items(list_id)?
            .iter()
            .find(|item| item.id == uid)
            .cloned()
            .ok_or_else(|| ItemError::UnknownItem(uid.to_string()))?;

        // Unchanged text keeps the parsed food, unit and quantity
        if summary != item.summary() {
            item.note = Some(summary.to_string());
            item.display = Some(summary.to_string());
            item.is_food = false;
            item.food_id = None;
            item.unit_id = None;
            item.quantity = 1.0;
            item.extra.remove("food");
            item.extra.remove("unit");
        }
        item.checked = checked;

        self.api.update_shopping_list_item(&item).await?;
        Ok(())
    }

    /// Delete items one at a time, stopping at the first failure
    ///
    /// Every uid must be on the list; otherwise nothing is deleted.
    pub async fn delete_items(&self, list_id: &str, uids: &[String]) -> Result<(), ItemError> {
        let items = self.list_items(list_id)?;
        if let Some(stray) = uids.iter().find(|uid| !items.iter().any(|i| &i.id == *uid)) {
            return Err(ItemError::UnknownItem(stray.clone()));
        }

        for uid in uids {
            self.api.delete_shopping_list_item(uid).await?;
        }
        Ok(())
    }

    /// Reorder an item and persist every item's new position, in list order
    pub async fn move_item(
        &mut self,
        list_id: &str,
        uid: &str,
        previous_uid: Option<&str>,
    ) -> Result<(), ItemError> {
        let mut items = self.list_items(list_id)?.to_vec();
        reorder::move_item(&mut items, uid, previous_uid, |item| item.id.as_str())?;
        reorder::renumber(&mut items);

        for item in &items {
            self.api.update_shopping_list_item(item).await?;
        }

        self.snapshot
            .shopping_list_items
            .insert(list_id.to_string(), items);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::integrations::mealie::client::MockMealieApi;

    pub(crate) fn meal(meal: &str, recipe: Option<(&str, &str)>, title: &str) -> MealPlanEntry {
        serde_json::from_value(serde_json::json!({
            "id": format!("{meal}-1"),
            "date": "2024-05-01",
            "entryType": meal,
            "recipeId": recipe.map(|(id, _)| id),
            "recipe": recipe.map(|(id, name)| serde_json::json!({
                "id": id,
                "name": name,
                "slug": name.to_lowercase(),
            })),
            "title": title,
        }))
        .unwrap()
    }

    async fn ready() -> (MockMealieApi, Coordinator<MockMealieApi>) {
        let mock = MockMealieApi::new();
        mock.add_list("l1", "Groceries", &["eggs", "milk", "bread"]);
        mock.state().meal_plan_today = vec![
            meal("lunch", None, "Leftovers"),
            meal("dinner", Some(("r1", "Lasagne")), ""),
        ];

        let mut coordinator = Coordinator::new(mock.clone(), None);
        coordinator.setup().await.unwrap();
        (mock, coordinator)
    }

    fn unauthorized() -> ApiError {
        ApiError::Status {
            url: "http://mealie.test/api/groups/mealplans/today".to_string(),
            status: 401,
            detail: Some("Not authenticated".to_string()),
        }
    }

    #[tokio::test]
    async fn test_setup_populates_snapshot() {
        let (_mock, coordinator) = ready().await;

        assert_eq!(coordinator.group().unwrap().slug, "home");
        assert_eq!(coordinator.cached_shopping_lists().len(), 1);
        assert_eq!(coordinator.items("l1").unwrap().len(), 3);
        assert!(coordinator.snapshot().last_refreshed.is_some());

        assert_eq!(
            coordinator.todays_meal_name(MealType::Lunch).as_deref(),
            Some("Leftovers")
        );
        assert_eq!(
            coordinator.todays_meal_name(MealType::Dinner).as_deref(),
            Some("Lasagne")
        );
        assert_eq!(coordinator.todays_meal_name(MealType::Breakfast), None);
        assert_eq!(
            coordinator.todays_recipe_url(MealType::Dinner).as_deref(),
            Some("http://mealie.test/g/home/r/lasagne")
        );
        assert_eq!(coordinator.todays_recipe_url(MealType::Lunch), None);
        assert_eq!(
            coordinator.todays_image_url(MealType::Dinner).as_deref(),
            Some("http://mealie.test/api/media/recipes/r1/images/min-original.webp")
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_snapshot() {
        let (mock, mut coordinator) = ready().await;
        let before = coordinator.snapshot().last_refreshed;

        mock.state().meal_plan_today.clear();
        mock.state().fail_with = Some(ApiError::NoConnection {
            url: "http://mealie.test".to_string(),
            message: "connection refused".to_string(),
        });

        let err = coordinator.refresh().await.unwrap_err();
        assert!(matches!(err, RefreshError::UpdateFailed(_)));
        assert_eq!(coordinator.snapshot().meal_plan.len(), 2);
        assert_eq!(coordinator.snapshot().last_refreshed, before);
    }

    #[tokio::test]
    async fn test_unauthorized_is_auth_failure() {
        let (mock, mut coordinator) = ready().await;
        mock.state().fail_with = Some(unauthorized());

        let err = coordinator.refresh().await.unwrap_err();
        assert!(matches!(err, RefreshError::AuthFailed(_)));

        let mut fresh = Coordinator::new(mock.clone(), None);
        assert!(matches!(
            fresh.setup().await.unwrap_err(),
            RefreshError::AuthFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_shopping_lists_fetched_once() {
        let (mock, mut coordinator) = ready().await;
        coordinator.shopping_lists().await.unwrap();
        coordinator.refresh().await.unwrap();

        let list_fetches = mock
            .state()
            .calls
            .iter()
            .filter(|c| c.as_str() == "GET /api/groups/shopping/lists")
            .count();
        assert_eq!(list_fetches, 1);
    }

    #[tokio::test]
    async fn test_image_last_updated_tracks_changes() {
        let (mock, mut coordinator) = ready().await;
        let first = coordinator.image_last_updated(MealType::Dinner);
        assert!(first.is_some());

        coordinator.refresh().await.unwrap();
        assert_eq!(coordinator.image_last_updated(MealType::Dinner), first);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        mock.state().meal_plan_today = vec![meal("dinner", Some(("r2", "Curry")), "")];
        coordinator.refresh().await.unwrap();
        let second = coordinator.image_last_updated(MealType::Dinner);
        assert!(second.is_some());
        assert_ne!(second, first);
    }

    #[tokio::test]
    async fn test_add_item_appends() {
        let (mock, coordinator) = ready().await;
        coordinator.add_item("l1", "butter").await.unwrap();

        let state = mock.state();
        let added = state.items["l1"].iter().find(|i| i.note.as_deref() == Some("butter"));
        assert_eq!(added.unwrap().position, 3);
    }

    #[tokio::test]
    async fn test_add_to_empty_list_starts_at_zero() {
        let mock = MockMealieApi::new();
        mock.add_list("l2", "Hardware", &[]);
        let mut coordinator = Coordinator::new(mock.clone(), None);
        coordinator.setup().await.unwrap();

        coordinator.add_item("l2", "nails").await.unwrap();
        assert_eq!(mock.state().items["l2"][0].position, 0);
    }

    #[tokio::test]
    async fn test_unknown_list_makes_no_request() {
        let (mock, coordinator) = ready().await;
        let calls = mock.state().calls.len();

        let err = coordinator.add_item("nope", "butter").await.unwrap_err();
        assert_eq!(err, ItemError::UnknownList("nope".to_string()));
        assert_eq!(mock.state().calls.len(), calls);
    }

    #[tokio::test]
    async fn test_update_item() {
        let (mock, coordinator) = ready().await;
        coordinator
            .update_item("l1", "l1-1", "oat milk", true)
            .await
            .unwrap();

        let state = mock.state();
        let item = state.items["l1"].iter().find(|i| i.id == "l1-1").unwrap();
        assert!(item.checked);
        assert_eq!(item.summary(), "oat milk");

        drop(state);
        let err = coordinator
            .update_item("l1", "missing", "x", false)
            .await
            .unwrap_err();
        assert_eq!(err, ItemError::UnknownItem("missing".to_string()));
    }

    #[tokio::test]
    async fn test_check_off_keeps_parsed_food() {
        let (mock, mut coordinator) = ready().await;
        {
            let mut state = mock.state();
            let item = state
                .items
                .get_mut("l1")
                .and_then(|items| items.iter_mut().find(|i| i.id == "l1-0"))
                .unwrap();
            item.display = Some("2 eggs".to_string());
            item.note = Some(String::new());
            item.is_food = true;
            item.food_id = Some("food-eggs".to_string());
            item.quantity = 2.0;
        }
        coordinator.refresh().await.unwrap();

        coordinator
            .update_item("l1", "l1-0", "2 eggs", true)
            .await
            .unwrap();

        let state = mock.state();
        let item = state.items["l1"].iter().find(|i| i.id == "l1-0").unwrap();
        assert!(item.checked);
        assert!(item.is_food);
        assert_eq!(item.food_id.as_deref(), Some("food-eggs"));
        assert_eq!(item.note.as_deref(), Some(""));
        assert_eq!(item.quantity, 2.0);
    }

    #[tokio::test]
    async fn test_rename_drops_parsed_food() {
        let (mock, mut coordinator) = ready().await;
        {
            let mut state = mock.state();
            let item = state
                .items
                .get_mut("l1")
                .and_then(|items| items.iter_mut().find(|i| i.id == "l1-0"))
                .unwrap();
            item.display = Some("2 eggs".to_string());
            item.is_food = true;
            item.food_id = Some("food-eggs".to_string());
            item.quantity = 2.0;
        }
        coordinator.refresh().await.unwrap();

        coordinator
            .update_item("l1", "l1-0", "6 duck eggs", false)
            .await
            .unwrap();

        let state = mock.state();
        let item = state.items["l1"].iter().find(|i| i.id == "l1-0").unwrap();
        assert_eq!(item.summary(), "6 duck eggs");
        assert_eq!(item.note.as_deref(), Some("6 duck eggs"));
        assert!(!item.is_food);
        assert_eq!(item.food_id, None);
        assert_eq!(item.quantity, 1.0);
    }

    #[tokio::test]
    async fn test_delete_items() {
        let (mock, coordinator) = ready().await;
        coordinator
            .delete_items("l1", &["l1-0".to_string(), "l1-2".to_string()])
            .await
            .unwrap();
        assert_eq!(mock.item_ids("l1"), ["l1-1"]);
    }

    #[tokio::test]
    async fn test_delete_rejects_item_from_another_list() {
        let mock = MockMealieApi::new();
        mock.add_list("l1", "Groceries", &["eggs", "milk", "bread"]);
        mock.add_list("l2", "Hardware", &["nails"]);
        let mut coordinator = Coordinator::new(mock.clone(), None);
        coordinator.setup().await.unwrap();
        mock.state().calls.clear();

        let err = coordinator
            .delete_items("l1", &["l1-0".to_string(), "l2-0".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err, ItemError::UnknownItem("l2-0".to_string()));
        assert!(mock.state().calls.is_empty());
        assert_eq!(mock.item_ids("l1"), ["l1-0", "l1-1", "l1-2"]);
        assert_eq!(mock.item_ids("l2"), ["l2-0"]);
    }

    #[tokio::test]
    async fn test_move_persists_every_position_in_order() {
        let (mock, mut coordinator) = ready().await;
        mock.state().calls.clear();

        coordinator.move_item("l1", "l1-2", None).await.unwrap();

        assert_eq!(mock.item_ids("l1"), ["l1-2", "l1-0", "l1-1"]);
        assert_eq!(
            mock.state().calls,
            [
                "PUT /api/groups/shopping/items/l1-2 position=0",
                "PUT /api/groups/shopping/items/l1-0 position=1",
                "PUT /api/groups/shopping/items/l1-1 position=2",
            ]
        );

        let positions: Vec<_> = coordinator
            .items("l1")
            .unwrap()
            .iter()
            .map(|i| i.position)
            .collect();
        assert_eq!(positions, [0, 1, 2]);
    }

    #[tokio::test]
    async fn test_move_unknown_item_writes_nothing() {
        let (mock, mut coordinator) = ready().await;
        mock.state().calls.clear();

        let err = coordinator
            .move_item("l1", "missing", Some("l1-0"))
            .await
            .unwrap_err();
        assert_eq!(err, ItemError::UnknownItem("missing".to_string()));
        assert!(mock.state().calls.is_empty());
    }
}
