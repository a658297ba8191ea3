use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::diagnostics::{
    Diagnostic, Error, LoadError, MergeError, SourceInfo, SourceLocation, Warning,
};
use super::LogLevel;
#[cfg(feature = "integration_mealie")]
use crate::integrations::mealie::PartialMealieConfig;

#[derive(Debug, Default, Deserialize)]
pub struct PartialConfig {
    #[serde(default)]
    pub imports: Vec<String>,

    pub logging: Option<PartialLoggingConfig>,
    pub api: Option<PartialApiConfig>,
    pub integrations: Option<PartialIntegrationsConfig>,

    /// Source information for error reporting (not serialized)
    #[serde(skip)]
    pub source: Option<SourceInfo>,

    /// Where each merged field was first defined, keyed by dotted path
    #[serde(skip)]
    pub origins: HashMap<String, SourceLocation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialLoggingConfig {
    pub level: Option<toml::Spanned<LogLevel>>,
    pub overrides: Option<HashMap<String, toml::Spanned<LogLevel>>>,
}

/// Declare a config section of spanned fields along with its first-wins merge
///
/// Each field merges at `<prefix>.<field>`. Sections listed after the struct
/// must themselves be declared with this macro and merge at `<prefix>.<section>`.
macro_rules! partial_section {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$field_meta:meta])* $field:ident : $ty:ty ),* $(,)?
        }
        $( sections { $( $section:ident : $section_ty:ty ),* $(,)? } )?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, ::serde::Deserialize)]
        $vis struct $name {
            $( $(#[$field_meta])* pub $field: Option<::toml::Spanned<$ty>>, )*
            $( $( pub $section: Option<$section_ty>, )* )?
        }

        impl $name {
            pub(crate) fn merge_from(
                &mut self,
                other: Self,
                prefix: &str,
                merger: &mut $crate::config::FieldMerger,
            ) {
                $(
                    merger.field(
                        &format!("{}.{}", prefix, stringify!($field)),
                        &mut self.$field,
                        other.$field,
                    );
                )*
                $( $(
                    if let Some(section) = other.$section {
                        self.$section.get_or_insert_with(Default::default).merge_from(
                            section,
                            &format!("{}.{}", prefix, stringify!($section)),
                            merger,
                        );
                    }
                )* )?
            }
        }
    };
}
pub(crate) use partial_section;

partial_section! {
    pub struct PartialApiConfig {
        listen: String,
        port: u16,
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialIntegrationsConfig {
    #[cfg(feature = "integration_mealie")]
    pub mealie: Option<PartialMealieConfig>,
}

impl PartialIntegrationsConfig {
    #[cfg_attr(not(feature = "integration_mealie"), allow(unused_variables))]
    fn merge_from(&mut self, other: Self, merger: &mut FieldMerger) {
        #[cfg(feature = "integration_mealie")]
        if let Some(mealie) = other.mealie {
            self.mealie
                .get_or_insert_with(Default::default)
                .merge_from(mealie, "integrations.mealie", merger);
        }
    }
}

/// First-wins merging of single fields, recording conflicts as diagnostics
pub(crate) struct FieldMerger<'a> {
    source: &'a SourceInfo,
    origins: &'a mut HashMap<String, SourceLocation>,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl FieldMerger<'_> {
    /// Keep `incoming` in `target` unless `path` was already set by an earlier file
    pub(crate) fn field<T>(
        &mut self,
        path: &str,
        target: &mut Option<toml::Spanned<T>>,
        incoming: Option<toml::Spanned<T>>,
    ) {
        let Some(value) = incoming else {
            return;
        };

        let location = SourceLocation {
            file_path: self.source.file_path.clone(),
            span: value.span(),
            content: self.source.content.clone(),
        };

        if let Some(first) = self.origins.get(path) {
            // Conflict: keep first value, record error
            self.diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                field_path: path.to_string(),
                message: format!("'{}' defined in multiple config files", path),
                conflicts: vec![first.clone(), location],
            })));
        } else {
            *target = Some(value);
            self.origins.insert(path.to_string(), location);
        }
    }
}

impl PartialConfig {
    /// Load a single config file without processing imports
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            error: e,
        })?;

        let mut config: PartialConfig = toml::from_str(&content).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            error: e,
        })?;

        config.source = Some(SourceInfo {
            file_path: path.to_path_buf(),
            content,
        });

        Ok(config)
    }

    /// Load config files with import resolution
    ///
    /// Each config file is loaded, then its imports are recursively processed.
    /// Cycle detection prevents infinite loops.
    ///
    /// Returns a Vec of all loaded configs in order (imports first, then parent)
    pub fn load_with_imports(paths: &[PathBuf]) -> Result<Vec<Self>, LoadError> {
        let mut visited = HashSet::new();
        let mut all_configs = Vec::new();

        for path in paths {
            Self::load_recursive(path, &mut visited, &mut all_configs)?;
        }

        Ok(all_configs)
    }

    fn load_recursive(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        configs: &mut Vec<Self>,
    ) -> Result<(), LoadError> {
        // Canonicalize the path to detect cycles reliably
        let canonical_path = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        if visited.contains(&canonical_path) {
            return Err(LoadError::ImportCycle {
                path: canonical_path.clone(),
                cycle: visited.iter().cloned().collect(),
            });
        }

        visited.insert(canonical_path.clone());

        let config = Self::from_file(path)?;

        // Imports first (depth-first), relative to the importing file
        for import_path in &config.imports {
            let import_path_buf = PathBuf::from(import_path);
            let resolved_path = if import_path_buf.is_absolute() {
                import_path_buf
            } else {
                let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
                parent_dir.join(import_path_buf)
            };

            Self::load_recursive(&resolved_path, visited, configs)?;
        }

        configs.push(config);

        // Sibling branches may import the same file
        visited.remove(&canonical_path);

        Ok(())
    }

    /// Merge multiple partial configs together
    ///
    /// Uses first-wins semantics: the first occurrence of a field is kept.
    /// Conflicts are collected as errors but merging continues so every
    /// conflict is reported at once.
    pub fn merge<I>(configs: I) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = Self>,
    {
        let mut result = PartialConfig::default();
        let mut diagnostics = Vec::new();
        let mut imports = Vec::new();

        for config in configs {
            imports.extend(config.imports.clone());

            let source_info = config.source.clone().unwrap_or_else(|| SourceInfo {
                file_path: PathBuf::from("<unknown>"),
                content: String::new(),
            });

            let is_empty = config.logging.is_none()
                && config.api.is_none()
                && config.integrations.is_none()
                && config.imports.is_empty();

            if is_empty {
                diagnostics.push(Diagnostic::Warning(Warning::EmptyConfig {
                    file_path: source_info.file_path.clone(),
                }));
            }

            let mut merger = FieldMerger {
                source: &source_info,
                origins: &mut result.origins,
                diagnostics: &mut diagnostics,
            };

            if let Some(logging) = config.logging {
                let result_logging = result.logging.get_or_insert_with(Default::default);
                merger.field("logging.level", &mut result_logging.level, logging.level);

                if let Some(overrides) = logging.overrides {
                    let result_overrides =
                        result_logging.overrides.get_or_insert_with(HashMap::new);
                    for (key, value) in overrides {
                        let mut slot = None;
                        let path = format!("logging.overrides.{}", key);
                        merger.field(&path, &mut slot, Some(value));
                        if let Some(value) = slot {
                            result_overrides.insert(key, value);
                        }
                    }
                }
            }

            if let Some(api) = config.api {
                result
                    .api
                    .get_or_insert_with(Default::default)
                    .merge_from(api, "api", &mut merger);
            }

            if let Some(integrations) = config.integrations {
                result
                    .integrations
                    .get_or_insert_with(Default::default)
                    .merge_from(integrations, &mut merger);
            }
        }

        result.imports = imports;

        (result, diagnostics)
    }
}
