#[allow(clippy::module_inception)]
mod config;
mod diagnostics;
mod partial;

pub use config::*;
pub use diagnostics::{format_diagnostics, Diagnostic, LoadError, SourceLocation, ValidationError};
pub(crate) use partial::FieldMerger;
pub(crate) use partial::partial_section;
