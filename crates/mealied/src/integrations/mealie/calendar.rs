use chrono::NaiveDateTime;

use super::types::MealPlanEntry;
use super::types::MealType;
use super::types::first_of_type;
use super::windows::MealWindows;
use crate::engine::CalendarEvent;
use crate::engine::Entity;
use crate::engine::Platform;
use crate::engine::state::CalendarState;

pub const CALENDAR_ENTITY_ID: &str = "calendar.mealie";

/// Calendar of planned meals, one event per meal at its time window
#[derive(Debug, Clone)]
pub struct MealCalendar {
    windows: MealWindows,
}

impl MealCalendar {
    pub fn new(windows: MealWindows) -> Self {
        Self { windows }
    }

    /// The meal whose window contains `now`, from today's plan
    ///
    /// Meal types are checked in order (breakfast, lunch, dinner, side);
    /// a meal without a name doesn't produce an event.
    pub fn current_event(
        &self,
        todays_plan: &[MealPlanEntry],
        now: NaiveDateTime,
    ) -> Option<CalendarEvent> {
        MealType::ALL.into_iter().find_map(|meal| {
            let window = self.windows.for_meal(meal);
            if !window.contains(now.time()) {
                return None;
            }

            let entry = first_of_type(todays_plan, meal)?;
            let summary = entry.display_name();
            if summary.is_empty() {
                return None;
            }

            let (start, end) = window.on(now.date());
            Some(CalendarEvent {
                summary,
                start,
                end,
                uid: Some(entry.id.to_string()),
            })
        })
    }

    pub fn state(&self, todays_plan: &[MealPlanEntry], now: NaiveDateTime) -> CalendarState {
        let event = self.current_event(todays_plan, now);
        let on = event
            .as_ref()
            .is_some_and(|event| event.start <= now && now < event.end);

        CalendarState {
            name: self.name().to_string(),
            on,
            event,
        }
    }

    /// One event per entry on the entry's own date, sorted by start
    pub fn events(&self, entries: &[MealPlanEntry]) -> Vec<CalendarEvent> {
        let mut events: Vec<_> = entries
            .iter()
            .map(|entry| {
                let (start, end) = self.windows.for_meal(entry.entry_type).on(entry.date);
                CalendarEvent {
                    summary: entry.display_name(),
                    start,
                    end,
                    uid: Some(entry.id.to_string()),
                }
            })
            .collect();
        events.sort_by_key(|event| event.start);
        events
    }
}

impl Entity for MealCalendar {
    fn entity_id(&self) -> &str {
        CALENDAR_ENTITY_ID
    }

    fn name(&self) -> &str {
        "Mealie"
    }

    fn platform(&self) -> Platform {
        Platform::Calendar
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::integrations::mealie::coordinator::tests::meal;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn entry(id: u32, date: &str, meal_type: &str, title: &str) -> MealPlanEntry {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "date": date,
            "entryType": meal_type,
            "recipeId": null,
            "title": title,
        }))
        .unwrap()
    }

    fn render(events: &[CalendarEvent]) -> String {
        events
            .iter()
            .map(|e| {
                format!(
                    "{} .. {} {} ({})",
                    e.start,
                    e.end.time(),
                    e.summary,
                    e.uid.as_deref().unwrap_or("-")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_leftovers_at_noon() {
        let calendar = MealCalendar::new(MealWindows::default());
        let plan = [meal("lunch", None, "Leftovers")];

        let state = calendar.state(&plan, at(12, 0));
        assert!(state.on);
        let event = state.event.unwrap();
        assert_eq!(event.summary, "Leftovers");
        assert_eq!(event.start, at(11, 30));
        assert_eq!(event.end, at(14, 30));
    }

    #[test]
    fn test_outside_windows_is_off() {
        let calendar = MealCalendar::new(MealWindows::default());
        let plan = [meal("lunch", None, "Leftovers")];

        let state = calendar.state(&plan, at(15, 0));
        assert!(!state.on);
        assert_eq!(state.event, None);
    }

    #[test]
    fn test_window_end_shows_event_but_is_off() {
        let calendar = MealCalendar::new(MealWindows::default());
        let plan = [meal("lunch", None, "Leftovers")];

        let state = calendar.state(&plan, at(14, 30));
        assert!(state.event.is_some());
        assert!(!state.on);
    }

    #[test]
    fn test_side_only_when_no_dinner() {
        let calendar = MealCalendar::new(MealWindows::default());

        let plan = [meal("side", None, "Salad"), meal("dinner", None, "Curry")];
        let event = calendar.current_event(&plan, at(18, 0)).unwrap();
        assert_eq!(event.summary, "Curry");

        let plan = [meal("side", None, "Salad")];
        let event = calendar.current_event(&plan, at(18, 0)).unwrap();
        assert_eq!(event.summary, "Salad");
    }

    #[test]
    fn test_unnamed_meal_has_no_event() {
        let calendar = MealCalendar::new(MealWindows::default());
        let plan = [meal("breakfast", None, "")];
        assert_eq!(calendar.current_event(&plan, at(8, 0)), None);
    }

    #[test]
    fn test_range_events_sorted() {
        let calendar = MealCalendar::new(MealWindows::default());
        let entries = [
            entry(3, "2024-05-02", "breakfast", "Pancakes"),
            entry(1, "2024-05-01", "dinner", "Curry"),
            entry(4, "2024-05-01", "snack", "Crisps"),
            entry(2, "2024-05-01", "lunch", "Leftovers"),
        ];

        insta::assert_snapshot!(render(&calendar.events(&entries)), @r"
        2024-05-01 11:30:00 .. 14:30:00 Leftovers (2)
        2024-05-01 16:00:00 .. 21:00:00 Curry (1)
        2024-05-01 16:00:00 .. 21:00:00 Crisps (4)
        2024-05-02 07:00:00 .. 11:00:00 Pancakes (3)
        ");
    }
}
