use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;

use super::types::MealType;

/// Time of day during which a meal is considered "on"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MealWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl MealWindow {
    /// Whether `time` falls inside the window, bounds included
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }

    /// Start and end of the window on `date`
    pub fn on(&self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        (date.and_time(self.start), date.and_time(self.end))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MealWindows {
    pub breakfast: MealWindow,
    pub lunch: MealWindow,
    pub dinner: MealWindow,
}

fn clock(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

impl Default for MealWindows {
    fn default() -> Self {
        Self {
            breakfast: MealWindow {
                start: clock(7, 0),
                end: clock(11, 0),
            },
            lunch: MealWindow {
                start: clock(11, 30),
                end: clock(14, 30),
            },
            dinner: MealWindow {
                start: clock(16, 0),
                end: clock(21, 0),
            },
        }
    }
}

impl MealWindows {
    /// Window for a meal type; sides share the dinner window
    pub fn for_meal(&self, meal: MealType) -> MealWindow {
        match meal {
            MealType::Breakfast => self.breakfast,
            MealType::Lunch => self.lunch,
            MealType::Dinner | MealType::Side | MealType::Other => self.dinner,
        }
    }
}

/// Parse an `HH:MM` (or `HH:MM:SS`) clock time
pub fn parse_clock(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}
