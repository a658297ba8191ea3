//! Shopping-list item reordering

use tracing::warn;

use super::types::ShoppingListItem;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReorderError {
    #[error("item '{0}' is not on the list")]
    ItemNotFound(String),
}

/// Move the item `uid` to directly after `previous_uid`, or to the head of
/// the list when there is no anchor.
///
/// An anchor that isn't on the list also moves the item to the head. Using
/// the item as its own anchor leaves the order unchanged.
pub fn move_item<T>(
    items: &mut Vec<T>,
    uid: &str,
    previous_uid: Option<&str>,
    id_of: impl Fn(&T) -> &str,
) -> Result<(), ReorderError> {
    let from = items
        .iter()
        .position(|item| id_of(item) == uid)
        .ok_or_else(|| ReorderError::ItemNotFound(uid.to_string()))?;

    let anchor = match previous_uid {
        None => None,
        Some(previous) if previous == uid => return Ok(()),
        Some(previous) => {
            let anchor = items.iter().position(|item| id_of(item) == previous);
            if anchor.is_none() {
                warn!(
                    "[mealie] anchor item '{}' not found, moving '{}' to the top",
                    previous, uid
                );
            }
            anchor
        }
    };

    let item = items.remove(from);
    let to = match anchor {
        None => 0,
        // The removal shifted the anchor one place to the left
        Some(anchor) if anchor > from => anchor,
        Some(anchor) => anchor + 1,
    };
    items.insert(to, item);

    Ok(())
}

/// Rewrite positions as 0..n-1 in list order
pub fn renumber(items: &mut [ShoppingListItem]) {
    for (position, item) in items.iter_mut().enumerate() {
        item.position = position as i64;
    }
}
