use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::MealieConfig;
use super::calendar::CALENDAR_ENTITY_ID;
use super::calendar::MealCalendar;
use super::client::MealieApi;
use super::coordinator::Coordinator;
use super::coordinator::ItemError;
use super::coordinator::RefreshError;
use super::entity::TODAYS_MEALS;
use super::entity::slugify;
use super::image::MealImage;
use super::sensor::MealSensor;
use super::todo::ShoppingTodoList;
use crate::engine::CommandError;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::ToIntegrationMessage;
use crate::engine::state::IntegrationStatus;
use crate::engine::state::TodoItemStatus;

const NAME: &str = "mealie";

pub const DOMAIN: &str = "mealie";
pub const ADD_SHOPPING_LIST_ITEM: &str = "add_shopping_list_item";

/// Body of the `mealie.add_shopping_list_item` service
#[derive(Debug, Deserialize)]
struct AddShoppingListItem {
    shopping_list_id: String,
    item: String,
}

/// Coordinator plus every entity built on it, behind one lock
struct Inner<C: MealieApi> {
    coordinator: Coordinator<C>,
    todo_lists: Vec<ShoppingTodoList>,
    calendar: MealCalendar,
    sensors: Vec<MealSensor>,
    images: Vec<MealImage>,

    /// Whether the coordinator's setup has succeeded
    ready: bool,

    /// Last status sent to the engine
    status: Option<IntegrationStatus>,
}

type Shared<C> = Arc<Mutex<Inner<C>>>;

fn send_error(e: impl Error + Send + 'static) -> Box<dyn Error + Send> {
    Box::new(e)
}

fn command_error(e: ItemError) -> CommandError {
    match e {
        ItemError::UnknownList(list_id) => {
            CommandError::Validation(format!("unknown shopping list: {}", list_id))
        }
        ItemError::UnknownItem(uid) => CommandError::NotFound(uid),
        ItemError::Api(e) => CommandError::Failed(format!("{} ({})", e, e.code())),
    }
}

impl<C: MealieApi> Inner<C> {
    async fn announce(entity: &dyn Entity, to_engine: &FromIntegrationSender) {
        let msg = FromIntegrationMessage::EntityDiscovered {
            entity_id: entity.entity_id().to_string(),
            platform: entity.platform(),
            integration_name: NAME.to_string(),
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("[mealie] failed to send EntityDiscovered message: {}", e);
        } else {
            info!("[mealie] registered entity: {} ({})", entity.entity_id(), entity.name());
        }
    }

    /// Register the entities that exist regardless of server data
    async fn announce_static(&self, to_engine: &FromIntegrationSender) {
        Self::announce(&self.calendar, to_engine).await;
        for sensor in &self.sensors {
            Self::announce(sensor, to_engine).await;
        }
        for image in &self.images {
            Self::announce(image, to_engine).await;
        }
    }

    /// Create and register one todo list per discovered shopping list
    async fn announce_todo_lists(&mut self, to_engine: &FromIntegrationSender) {
        let mut taken: HashSet<String> = HashSet::new();
        let mut lists = Vec::new();
        for list in self.coordinator.cached_shopping_lists() {
            let mut slug = slugify(&list.name);
            if slug.is_empty() {
                slug = slugify(&list.id);
            }
            let mut entity_id = format!("todo.mealie_{}", slug);
            let mut n = 2;
            while taken.contains(&entity_id) {
                entity_id = format!("todo.mealie_{}_{}", slug, n);
                n += 1;
            }
            taken.insert(entity_id.clone());
            lists.push(ShoppingTodoList::new(list, entity_id));
        }

        for list in &lists {
            Self::announce(list, to_engine).await;
        }
        self.todo_lists = lists;
    }

    /// Push every entity's current state to the engine
    async fn publish(&self, to_engine: &FromIntegrationSender) {
        let now = Local::now().naive_local();
        let meal_plan = &self.coordinator.snapshot().meal_plan;

        let mut msgs = vec![FromIntegrationMessage::CalendarChanged {
            entity_id: CALENDAR_ENTITY_ID.to_string(),
            state: self.calendar.state(meal_plan, now),
        }];
        msgs.extend(self.todo_lists.iter().map(|list| {
            FromIntegrationMessage::TodoListChanged {
                entity_id: list.entity_id().to_string(),
                state: list.state(&self.coordinator),
            }
        }));
        msgs.extend(self.sensors.iter().map(|sensor| FromIntegrationMessage::SensorChanged {
            entity_id: sensor.entity_id().to_string(),
            state: sensor.state(&self.coordinator),
        }));
        msgs.extend(self.images.iter().map(|image| FromIntegrationMessage::ImageChanged {
            entity_id: image.entity_id().to_string(),
            state: image.state(&self.coordinator),
        }));

        for msg in msgs {
            if let Err(e) = to_engine.send(msg).await {
                warn!("[mealie] failed to send state update: {}", e);
                return;
            }
        }
    }

    async fn set_status(&mut self, status: IntegrationStatus, to_engine: &FromIntegrationSender) {
        if self.status.as_ref() == Some(&status) {
            return;
        }
        self.status = Some(status.clone());

        let msg = FromIntegrationMessage::IntegrationStatusChanged {
            integration_name: NAME.to_string(),
            status,
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("[mealie] failed to send IntegrationStatusChanged message: {}", e);
        }
    }

    /// Set up the coordinator if that hasn't succeeded yet, refresh otherwise,
    /// then report the outcome
    async fn sync(&mut self, to_engine: &FromIntegrationSender) -> Result<(), RefreshError> {
        let result = if self.ready {
            self.coordinator.refresh().await
        } else {
            self.coordinator.setup().await
        };

        match &result {
            Ok(()) => {
                if !self.ready {
                    self.ready = true;
                    self.announce_todo_lists(to_engine).await;
                }
                self.set_status(IntegrationStatus::Loaded, to_engine).await;
                self.publish(to_engine).await;
            }
            Err(e @ RefreshError::AuthFailed(_)) => {
                warn!("[mealie] {}", e);
                let reason = e.to_string();
                self.set_status(IntegrationStatus::ReauthRequired { reason }, to_engine)
                    .await;
            }
            Err(e @ RefreshError::UpdateFailed(_)) => {
                warn!("[mealie] {}", e);
                let reason = e.to_string();
                self.set_status(IntegrationStatus::Unavailable { reason }, to_engine)
                    .await;
            }
        }

        result
    }

    /// Refresh after any write that reached the server, so a partial
    /// failure does not leave the entities on stale data
    async fn resync_after(
        &mut self,
        result: &Result<(), CommandError>,
        to_engine: &FromIntegrationSender,
    ) {
        if matches!(result, Ok(()) | Err(CommandError::Failed(_))) {
            let _ = self.sync(to_engine).await;
        }
    }

    fn list_id(&self, entity_id: &str) -> Result<String, CommandError> {
        self.todo_lists
            .iter()
            .find(|list| list.entity_id() == entity_id)
            .map(|list| list.list_id().to_string())
            .ok_or_else(|| CommandError::NotFound(entity_id.to_string()))
    }

    async fn handle(&mut self, msg: ToIntegrationMessage, to_engine: &FromIntegrationSender) {
        match msg {
            ToIntegrationMessage::CreateTodoItem {
                entity_id,
                summary,
                reply,
            } => {
                let result = match self.list_id(&entity_id) {
                    Ok(list_id) => self
                        .coordinator
                        .add_item(&list_id, &summary)
                        .await
                        .map_err(command_error),
                    Err(e) => Err(e),
                };
                self.resync_after(&result, to_engine).await;
                let _ = reply.send(result);
            }
            ToIntegrationMessage::UpdateTodoItem {
                entity_id,
                uid,
                summary,
                status,
                reply,
            } => {
                let result = match self.list_id(&entity_id) {
                    Ok(list_id) => self
                        .coordinator
                        .update_item(&list_id, &uid, &summary, status == TodoItemStatus::Completed)
                        .await
                        .map_err(command_error),
                    Err(e) => Err(e),
                };
                self.resync_after(&result, to_engine).await;
                let _ = reply.send(result);
            }
            ToIntegrationMessage::DeleteTodoItems {
                entity_id,
                uids,
                reply,
            } => {
                let result = match self.list_id(&entity_id) {
                    Ok(list_id) => self
                        .coordinator
                        .delete_items(&list_id, &uids)
                        .await
                        .map_err(command_error),
                    Err(e) => Err(e),
                };
                self.resync_after(&result, to_engine).await;
                let _ = reply.send(result);
            }
            ToIntegrationMessage::MoveTodoItem {
                entity_id,
                uid,
                previous_uid,
                reply,
            } => {
                let result = match self.list_id(&entity_id) {
                    Ok(list_id) => self
                        .coordinator
                        .move_item(&list_id, &uid, previous_uid.as_deref())
                        .await
                        .map_err(command_error),
                    Err(e) => Err(e),
                };
                self.resync_after(&result, to_engine).await;
                let _ = reply.send(result);
            }
            ToIntegrationMessage::GetCalendarEvents {
                entity_id,
                start,
                end,
                reply,
            } => {
                let result = if entity_id != CALENDAR_ENTITY_ID {
                    Err(CommandError::NotFound(entity_id))
                } else if end < start {
                    Err(CommandError::Validation(
                        "end date is before start date".to_string(),
                    ))
                } else {
                    self.coordinator
                        .api()
                        .meal_plans(start, end)
                        .await
                        .map(|entries| self.calendar.events(&entries))
                        .map_err(|e| command_error(e.into()))
                };
                let _ = reply.send(result);
            }
            ToIntegrationMessage::GetImage { entity_id, reply } => {
                let Inner {
                    coordinator,
                    images,
                    ..
                } = self;
                let result = match images.iter_mut().find(|i| i.entity_id() == entity_id) {
                    Some(image) => Ok(image.image(coordinator).await),
                    None => Err(CommandError::NotFound(entity_id)),
                };
                let _ = reply.send(result);
            }
            ToIntegrationMessage::CallService {
                domain,
                service,
                data,
                reply,
            } => {
                let result = if domain == DOMAIN && service == ADD_SHOPPING_LIST_ITEM {
                    match serde_json::from_value::<AddShoppingListItem>(data) {
                        Ok(req) => self
                            .coordinator
                            .add_item(&req.shopping_list_id, &req.item)
                            .await
                            .map_err(command_error),
                        Err(e) => Err(CommandError::Validation(e.to_string())),
                    }
                } else {
                    Err(CommandError::Unsupported(format!("{}.{}", domain, service)))
                };
                self.resync_after(&result, to_engine).await;
                let _ = reply.send(result);
            }
        }
    }
}

/// Mealie integration for mealied
///
/// Polls a Mealie server and exposes its shopping lists, meal plan calendar,
/// today's meals as sensors, and their recipe images.
pub struct MealieIntegration<C: MealieApi> {
    inner: Shared<C>,
    config: MealieConfig,
    to_engine: Option<FromIntegrationSender>,
    /// Handle to the background polling task
    _poll_task: Option<JoinHandle<()>>,
}

impl<C: MealieApi + 'static> MealieIntegration<C> {
    /// Create a new Mealie integration
    pub fn new(client: C, config: &MealieConfig) -> Self {
        let inner = Inner {
            coordinator: Coordinator::new(client, config.group_id.clone()),
            todo_lists: Vec::new(),
            calendar: MealCalendar::new(config.meal_windows.clone()),
            sensors: TODAYS_MEALS.into_iter().map(MealSensor::new).collect(),
            images: TODAYS_MEALS.into_iter().map(MealImage::new).collect(),
            ready: false,
            status: None,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
            config: config.clone(),
            to_engine: None,
            _poll_task: None,
        }
    }

    /// Refresh on a fixed interval until aborted
    ///
    /// A failed refresh doesn't stop the loop; the next tick tries again.
    async fn poll_task(inner: Shared<C>, interval: Duration, to_engine: FromIntegrationSender) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick fires immediately; setup already did that refresh
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let mut inner = inner.lock().await;
            if let Err(e) = inner.sync(&to_engine).await {
                debug!("[mealie] poll failed, retrying in {:?}: {}", interval, e);
            }
        }
    }
}

#[async_trait]
impl<C: MealieApi + 'static> Integration for MealieIntegration<C> {
    fn name(&self) -> &str {
        NAME
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        self.to_engine = Some(tx.clone());
        info!("[mealie] connecting to {}", self.config.host);

        {
            let mut inner = self.inner.lock().await;
            inner.announce_static(&tx).await;

            let registered = FromIntegrationMessage::ServiceRegistered {
                domain: DOMAIN.to_string(),
                service: ADD_SHOPPING_LIST_ITEM.to_string(),
                integration_name: NAME.to_string(),
            };
            tx.send(registered).await.map_err(send_error)?;

            match inner.sync(&tx).await {
                Ok(()) => info!("[mealie] setup complete"),
                // The token comes from the config file, so retrying can't help
                Err(e @ RefreshError::AuthFailed(_)) => {
                    error!("[mealie] setup failed: {}", e);
                    return Err(send_error(e));
                }
                Err(e) => warn!("[mealie] setup incomplete, will retry: {}", e),
            }
        }

        let inner = self.inner.clone();
        let interval = self.config.poll_interval;
        let task = tokio::spawn(async move {
            Self::poll_task(inner, interval, tx).await;
        });
        self._poll_task = Some(task);

        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        let to_engine = self.to_engine.clone().ok_or_else(|| {
            send_error(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "Mealie integration not set up. Call setup() first.",
            ))
        })?;

        let mut inner = self.inner.lock().await;
        inner.handle(msg, &to_engine).await;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("[mealie] shutting down");
        if let Some(task) = self._poll_task.take() {
            task.abort();
        }
        Ok(())
    }
}

impl<C: MealieApi> Drop for MealieIntegration<C> {
    fn drop(&mut self) {
        if let Some(task) = self._poll_task.take() {
            task.abort();
        }
    }
}
