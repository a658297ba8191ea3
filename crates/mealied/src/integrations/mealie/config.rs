use std::collections::HashMap;
use std::time::Duration;

use toml::Spanned;

use super::windows::MealWindow;
use super::windows::MealWindows;
use super::windows::parse_clock;
use crate::config::partial_section;
use crate::config::SourceLocation;
use crate::config::ValidationError;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Configuration for the Mealie integration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Mealie server, e.g. `http://mealie.local:9000`
    pub host: String,

    /// API token sent as a bearer token
    pub token: String,

    /// Group to use; resolved from the token when absent
    pub group_id: Option<String>,

    pub poll_interval: Duration,

    pub meal_windows: MealWindows,
}

partial_section! {
    pub struct PartialConfig {
        host: String,
        token: String,
        group_id: String,
        poll_interval_secs: u64,
    }
    sections {
        meal_windows: PartialMealWindows,
    }
}

partial_section! {
    pub struct PartialMealWindows {
        breakfast_start: String,
        breakfast_end: String,
        lunch_start: String,
        lunch_end: String,
        dinner_start: String,
        dinner_end: String,
    }
}

const PREFIX: &str = "integrations.mealie";

/// Collects validation errors with the location of the offending value
struct Validator<'a> {
    origins: &'a HashMap<String, SourceLocation>,
    errors: Vec<ValidationError>,
}

impl Validator<'_> {
    fn error(&mut self, field: &str, message: impl Into<String>) {
        let field_path = format!("{PREFIX}.{field}");
        let location = self.origins.get(&field_path).cloned();
        self.errors.push(ValidationError {
            field_path,
            message: message.into(),
            location,
        });
    }

    fn required(&mut self, field: &str, value: Option<Spanned<String>>) -> String {
        match value.map(Spanned::into_inner) {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            Some(_) => {
                self.error(field, format!("{field} must not be empty"));
                String::new()
            }
            None => {
                self.error(field, format!("{field} is required"));
                String::new()
            }
        }
    }

    fn window(
        &mut self,
        meal: &str,
        start: Option<Spanned<String>>,
        end: Option<Spanned<String>>,
        default: MealWindow,
    ) -> MealWindow {
        let start = self.clock(&format!("meal_windows.{meal}_start"), start, default.start);
        let end = self.clock(&format!("meal_windows.{meal}_end"), end, default.end);
        if start >= end {
            self.error(
                &format!("meal_windows.{meal}_start"),
                format!("{meal} window must start before it ends"),
            );
        }
        MealWindow { start, end }
    }

    fn clock(
        &mut self,
        field: &str,
        value: Option<Spanned<String>>,
        default: chrono::NaiveTime,
    ) -> chrono::NaiveTime {
        let Some(value) = value else {
            return default;
        };
        match parse_clock(value.get_ref()) {
            Some(time) => time,
            None => {
                self.error(
                    field,
                    format!("'{}' is not a valid HH:MM time", value.get_ref()),
                );
                default
            }
        }
    }
}

impl Config {
    /// Validate a merged partial config, reporting every problem at once
    pub fn from_partial(
        partial: PartialConfig,
        origins: &HashMap<String, SourceLocation>,
    ) -> Result<Self, Vec<ValidationError>> {
        let mut v = Validator {
            origins,
            errors: Vec::new(),
        };

        let host = v.required("host", partial.host);
        let token = v.required("token", partial.token);
        let group_id = partial
            .group_id
            .map(Spanned::into_inner)
            .filter(|id| !id.trim().is_empty());

        let poll_interval_secs = partial
            .poll_interval_secs
            .map(Spanned::into_inner)
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        if poll_interval_secs == 0 {
            v.error("poll_interval_secs", "poll_interval_secs must be greater than 0");
        }

        let defaults = MealWindows::default();
        let windows = partial.meal_windows.unwrap_or_default();
        let meal_windows = MealWindows {
            breakfast: v.window(
                "breakfast",
                windows.breakfast_start,
                windows.breakfast_end,
                defaults.breakfast,
            ),
            lunch: v.window("lunch", windows.lunch_start, windows.lunch_end, defaults.lunch),
            dinner: v.window(
                "dinner",
                windows.dinner_start,
                windows.dinner_end,
                defaults.dinner,
            ),
        };

        if !v.errors.is_empty() {
            return Err(v.errors);
        }

        Ok(Self {
            host,
            token,
            group_id,
            poll_interval: Duration::from_secs(poll_interval_secs),
            meal_windows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(content: &str) -> PartialConfig {
        toml::from_str(content).unwrap()
    }

    #[test]
    fn test_defaults_apply() {
        let config = Config::from_partial(
            partial("host = \"http://mealie.local\"\ntoken = \"t\"\n"),
            &HashMap::new(),
        )
        .unwrap();

        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.meal_windows, MealWindows::default());
        assert_eq!(config.group_id, None);
    }

    #[test]
    fn test_window_overrides() {
        let config = Config::from_partial(
            partial(
                r#"
host = "http://mealie.local"
token = "t"
group_id = "g1"

[meal_windows]
breakfast_start = "06:30"
dinner_end = "22:00"
"#,
            ),
            &HashMap::new(),
        )
        .unwrap();

        assert_eq!(config.group_id.as_deref(), Some("g1"));
        assert_eq!(config.meal_windows.breakfast.start.to_string(), "06:30:00");
        assert_eq!(config.meal_windows.breakfast.end.to_string(), "11:00:00");
        assert_eq!(config.meal_windows.dinner.end.to_string(), "22:00:00");
    }

    #[test]
    fn test_invalid_windows_are_reported() {
        let errors = Config::from_partial(
            partial(
                r#"
host = "http://mealie.local"
token = "t"

[meal_windows]
lunch_start = "half past eleven"
dinner_start = "22:00"
dinner_end = "21:00"
"#,
            ),
            &HashMap::new(),
        )
        .unwrap_err();

        let fields: Vec<_> = errors.iter().map(|e| e.field_path.as_str()).collect();
        assert_eq!(
            fields,
            [
                "integrations.mealie.meal_windows.lunch_start",
                "integrations.mealie.meal_windows.dinner_start",
            ]
        );
    }

    #[test]
    fn test_required_fields() {
        let errors = Config::from_partial(partial("host = \"  \"\n"), &HashMap::new()).unwrap_err();
        let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["host must not be empty", "token is required"]);
    }
}
