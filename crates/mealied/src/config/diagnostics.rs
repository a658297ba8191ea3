use std::ops::Range;
use std::path::PathBuf;

/// Source information for where a diagnostic came from
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub file_path: PathBuf,
    pub content: String,
}

/// Where a config value was defined
#[derive(Debug, Clone)]
pub struct SourceLocation {
    pub file_path: PathBuf,
    pub span: Range<usize>,
    pub content: String,
}

/// A diagnostic message that can be either a warning or an error
#[derive(Debug, Clone)]
pub enum Diagnostic {
    Warning(Warning),
    Error(Error),
}

/// Warning messages that don't prevent config loading
#[derive(Debug, Clone)]
pub enum Warning {
    EmptyConfig { file_path: PathBuf },
}

/// Error messages that indicate problems with the config
#[derive(Debug, Clone)]
pub enum Error {
    Merge(MergeError),
    Validation(ValidationError),
}

/// Error type for merge conflicts
#[derive(Debug, Clone)]
pub struct MergeError {
    pub field_path: String,
    pub message: String,
    pub conflicts: Vec<SourceLocation>,
}

/// Error type for validation failures
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,

    /// Definition of the offending value, when it was present in a file
    pub location: Option<SourceLocation>,
}

/// Error type for config loading failures (parse errors, IO errors, etc.)
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read '{}': {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Failed to parse '{}': {error}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        error: toml::de::Error,
    },

    #[error("Import cycle detected at '{}': involves {} file(s)", path.display(), cycle.len())]
    ImportCycle { path: PathBuf, cycle: Vec<PathBuf> },
}

impl Diagnostic {
    /// Returns true if this diagnostic is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Error(_))
    }

    /// Returns true if this diagnostic is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::Warning(_))
    }
}

/// Format all diagnostics for display using Ariadne
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let mut output = Vec::new();

    for diagnostic in diagnostics {
        match diagnostic {
            Diagnostic::Warning(Warning::EmptyConfig { file_path }) => {
                let warning_msg = format!(
                    "Warning: Config file '{}' is empty and has no effect\n",
                    file_path.display()
                );
                output.extend_from_slice(warning_msg.as_bytes());
            }
            Diagnostic::Error(Error::Merge(merge_error)) => {
                // Build a report with the first conflict's span
                let first_conflict = &merge_error.conflicts[0];
                let mut report = Report::build(
                    ReportKind::Error,
                    (
                        first_conflict.file_path.to_string_lossy().to_string(),
                        first_conflict.span.clone(),
                    ),
                )
                .with_message(format!("Merge conflict in field '{}'", merge_error.field_path))
                .with_note(&merge_error.message);

                // Add labels for each conflict location
                for (idx, conflict) in merge_error.conflicts.iter().enumerate() {
                    let label_msg = if idx == 0 {
                        "first definition here"
                    } else {
                        "conflicts with this definition"
                    };

                    report = report.with_label(
                        Label::new((
                            conflict.file_path.to_string_lossy().to_string(),
                            conflict.span.clone(),
                        ))
                        .with_message(label_msg)
                        .with_color(if idx == 0 { Color::Red } else { Color::Yellow }),
                    );
                }

                let finished_report = report.finish();

                // Write to each unique source file
                let mut written_files = std::collections::HashSet::new();
                for conflict in &merge_error.conflicts {
                    let file_id = conflict.file_path.to_string_lossy().to_string();
                    if written_files.insert(file_id.clone()) {
                        let source = Source::from(&conflict.content);
                        finished_report.write((file_id, source), &mut output).ok();
                    }
                }
            }
            Diagnostic::Error(Error::Validation(validation_error)) => {
                let Some(location) = &validation_error.location else {
                    let error_msg = format!(
                        "Validation error in '{}': {}\n",
                        validation_error.field_path, validation_error.message
                    );
                    output.extend_from_slice(error_msg.as_bytes());
                    continue;
                };

                // The value exists in a file, so point at it
                let file_id = location.file_path.to_string_lossy().to_string();
                Report::build(ReportKind::Error, (file_id.clone(), location.span.clone()))
                    .with_message(format!(
                        "Validation error in '{}'",
                        validation_error.field_path
                    ))
                    .with_label(
                        Label::new((file_id.clone(), location.span.clone()))
                            .with_message(&validation_error.message)
                            .with_color(Color::Red),
                    )
                    .finish()
                    .write((file_id, Source::from(&location.content)), &mut output)
                    .ok();
            }
        }
    }

    String::from_utf8_lossy(&output).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_without_location_is_plain() {
        let diagnostics = vec![Diagnostic::Error(Error::Validation(ValidationError {
            field_path: "integrations.mealie.token".to_string(),
            message: "token is required".to_string(),
            location: None,
        }))];

        insta::assert_snapshot!(
            format_diagnostics(&diagnostics),
            @"Validation error in 'integrations.mealie.token': token is required"
        );
    }

    #[test]
    fn test_validation_with_location_names_field() {
        let content = "[integrations.mealie]\nhost = \"\"\n".to_string();
        let start = content.find("\"\"").unwrap();
        let diagnostics = vec![Diagnostic::Error(Error::Validation(ValidationError {
            field_path: "integrations.mealie.host".to_string(),
            message: "host must not be empty".to_string(),
            location: Some(SourceLocation {
                file_path: PathBuf::from("mealied.toml"),
                span: start..start + 2,
                content,
            }),
        }))];

        let output = format_diagnostics(&diagnostics);
        assert!(output.contains("integrations.mealie.host"));
        assert!(output.contains("host must not be empty"));
        assert!(output.contains("mealied.toml"));
    }

    #[test]
    fn test_load_error_mentions_path() {
        let err = LoadError::Io {
            path: PathBuf::from("/nonexistent/mealied.toml"),
            error: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read"));
        assert!(msg.contains("/nonexistent/mealied.toml"));
    }
}
