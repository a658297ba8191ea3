use super::client::MealieApi;
use super::coordinator::Coordinator;
use super::types::ShoppingList;
use super::types::ShoppingListItem;
use crate::engine::Entity;
use crate::engine::Platform;
use crate::engine::state::TodoItem;
use crate::engine::state::TodoItemStatus;
use crate::engine::state::TodoListState;

/// A Mealie shopping list exposed as a todo list
#[derive(Debug, Clone)]
pub struct ShoppingTodoList {
    list_id: String,
    name: String,
    entity_id: String,
}

impl ShoppingTodoList {
    pub fn new(list: &ShoppingList, entity_id: String) -> Self {
        Self {
            list_id: list.id.clone(),
            name: list.name.clone(),
            entity_id,
        }
    }

    pub fn list_id(&self) -> &str {
        &self.list_id
    }

    /// Items in list order; empty until the list's items have been fetched
    pub fn state<C: MealieApi>(&self, coordinator: &Coordinator<C>) -> TodoListState {
        TodoListState {
            name: self.name.clone(),
            items: coordinator
                .items(&self.list_id)
                .unwrap_or_default()
                .iter()
                .map(todo_item)
                .collect(),
        }
    }
}

fn todo_item(item: &ShoppingListItem) -> TodoItem {
    TodoItem {
        uid: item.id.clone(),
        summary: item.summary().to_string(),
        status: if item.checked {
            TodoItemStatus::Completed
        } else {
            TodoItemStatus::NeedsAction
        },
    }
}

impl Entity for ShoppingTodoList {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        Platform::Todo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::mealie::client::MockMealieApi;

    #[tokio::test]
    async fn test_items_in_order_with_status() {
        let mock = MockMealieApi::new();
        mock.add_list("l1", "Groceries", &["eggs", "milk"]);
        if let Some(items) = mock.state().items.get_mut("l1") {
            items[1].checked = true;
            items[1].display = None;
        }

        let mut coordinator = Coordinator::new(mock.clone(), None);
        coordinator.setup().await.unwrap();

        let list = ShoppingTodoList::new(
            &coordinator.cached_shopping_lists()[0],
            "todo.mealie_groceries".to_string(),
        );
        assert_eq!(list.entity_id(), "todo.mealie_groceries");
        assert_eq!(list.list_id(), "l1");

        let state = list.state(&coordinator);
        assert_eq!(state.name, "Groceries");
        assert_eq!(
            state.items,
            [
                TodoItem {
                    uid: "l1-0".to_string(),
                    summary: "eggs".to_string(),
                    status: TodoItemStatus::NeedsAction,
                },
                TodoItem {
                    uid: "l1-1".to_string(),
                    summary: "milk".to_string(),
                    status: TodoItemStatus::Completed,
                },
            ]
        );
    }
}
