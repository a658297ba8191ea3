//! Mealie API payloads

use std::fmt;

use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;

/// The group the API token belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub slug: String,
}

/// Pagination envelope used by Mealie list endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub per_page: i64,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub total_pages: i64,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingList {
    pub id: String,
    pub name: String,
}

/// One entry on a shopping list
///
/// Fields this crate doesn't model are kept in `extra` so an update can send
/// the whole item back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingListItem {
    pub id: String,
    pub shopping_list_id: String,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub food_id: Option<String>,
    #[serde(default)]
    pub unit_id: Option<String>,
    #[serde(default)]
    pub label_id: Option<String>,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub is_food: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ShoppingListItem {
    /// Text shown for the item: `display`, falling back to `note`
    pub fn summary(&self) -> &str {
        self.display
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.note.as_deref())
            .unwrap_or_default()
    }
}

/// Body for creating a shopping list item
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShoppingListItem {
    pub shopping_list_id: String,
    pub note: String,
    pub position: i64,
    pub is_food: bool,
    pub quantity: f64,
}

impl NewShoppingListItem {
    pub fn new(shopping_list_id: &str, note: &str, position: i64) -> Self {
        Self {
            shopping_list_id: shopping_list_id.to_string(),
            note: note.to_string(),
            position,
            is_food: false,
            quantity: 1.0,
        }
    }
}

/// Meal slot of a meal-plan entry
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Side,
    #[serde(other)]
    Other,
}

impl MealType {
    /// The slots exposed as entities, in calendar order
    pub const ALL: [MealType; 4] = [
        MealType::Breakfast,
        MealType::Lunch,
        MealType::Dinner,
        MealType::Side,
    ];
}

/// Mealie uses integer ids for meal plans on older servers and strings on newer ones
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EntryId {
    Int(i64),
    Str(String),
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryId::Int(id) => write!(f, "{}", id),
            EntryId::Str(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecipeSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

/// A planned meal on a given day
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealPlanEntry {
    pub id: EntryId,
    pub date: NaiveDate,
    pub entry_type: MealType,
    #[serde(default)]
    pub recipe_id: Option<String>,
    #[serde(default)]
    pub recipe: Option<RecipeSummary>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl MealPlanEntry {
    /// The linked recipe, if `recipeId` is set
    pub fn linked_recipe(&self) -> Option<&RecipeSummary> {
        self.recipe_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .and(self.recipe.as_ref())
    }

    /// Recipe name when a recipe is linked, the freeform title otherwise
    pub fn display_name(&self) -> String {
        match self.linked_recipe() {
            Some(recipe) => recipe.name.clone(),
            None => self.title.clone().unwrap_or_default(),
        }
    }
}

/// First entry of the given meal type, in plan order
pub fn first_of_type(entries: &[MealPlanEntry], meal: MealType) -> Option<&MealPlanEntry> {
    entries.iter().find(|entry| entry.entry_type == meal)
}
