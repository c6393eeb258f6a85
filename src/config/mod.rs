//! Settings documents and the setup structs loaded from them.
//!
//! Settings are TOML files with named sections; nested sections are nested
//! tables (`[texgen.band0]`). Setup loaders only use the two lookups of
//! [`SettingsSection`], so any block-structured key/value source can back
//! them.

pub mod range_types;
pub mod setups;

pub use setups::{
    ErosionSetup, PrefabCategory, TerraGenAlgorithm, TerraGenSetup, TextureBand, TextureGeneratorSetup,
    TextureSource,
};

use crate::errors::{MapEditError, MapEditResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Read access to one section of a settings document
pub trait SettingsSection {
    /// Nested section by name
    fn section(&self, name: &str) -> Option<&Self>;

    /// Raw value of a key in this section
    fn key_value(&self, name: &str) -> Option<String>;

    /// Names of the nested sections
    fn section_names(&self) -> Vec<String>;
}

impl SettingsSection for toml::Table {
    fn section(&self, name: &str) -> Option<&Self> {
        self.get(name).and_then(toml::Value::as_table)
    }

    fn key_value(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Table(_) => None,
            other => Some(other.to_string()),
        }
    }

    fn section_names(&self) -> Vec<String> {
        self.iter()
            .filter(|(_, value)| value.is_table())
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// Look up a required section
pub fn require_section<'a, S: SettingsSection>(parent: &'a S, name: &str) -> MapEditResult<&'a S> {
    parent
        .section(name)
        .ok_or_else(|| MapEditError::config_missing(name, "<section>"))
}

/// Look up and parse a required key
pub fn require_key<T: FromStr, S: SettingsSection>(
    section: &S,
    section_name: &str,
    key: &str,
) -> MapEditResult<T> {
    let raw = section
        .key_value(key)
        .ok_or_else(|| MapEditError::config_missing(section_name, key))?;
    raw.trim().parse().map_err(|_| MapEditError::InvalidSettings {
        reason: format!("[{section_name}] {key} = '{raw}' could not be parsed"),
    })
}

/// Look up and parse an optional key, falling back to `default`
pub fn optional_key<T: FromStr, S: SettingsSection>(
    section: &S,
    section_name: &str,
    key: &str,
    default: T,
) -> MapEditResult<T> {
    match section.key_value(key) {
        Some(_) => require_key(section, section_name, key),
        None => Ok(default),
    }
}

/// Format validator errors into one line
pub fn validation_reason(errors: &validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .iter()
        .map(|(field, errors)| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            format!("{field}: {}", messages.join(", "))
        })
        .collect::<Vec<String>>()
        .join("; ")
}

/// A parsed settings file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsDocument {
    root: toml::Table,
}

impl SettingsDocument {
    pub fn parse(contents: &str) -> MapEditResult<Self> {
        Ok(Self {
            root: contents.parse::<toml::Table>()?,
        })
    }

    pub fn load(path: &Path) -> MapEditResult<Self> {
        debug!("Loading settings from {}", path.display());
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn root(&self) -> &toml::Table {
        &self.root
    }
}

impl FromStr for SettingsDocument {
    type Err = MapEditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Per-user settings directory, created on demand
pub fn settings_dir() -> Option<PathBuf> {
    let mut path = dirs::config_dir()?;
    path.push("mapedit");
    fs::create_dir_all(&path).ok()?;
    Some(path)
}

/// Resolve a settings file: existing paths are used as given, bare names
/// are looked up in the settings directory.
pub fn resolve_settings_path(name: &Path) -> Option<PathBuf> {
    if name.exists() {
        return Some(name.to_path_buf());
    }
    if name.components().count() == 1 {
        let candidate = settings_dir()?.join(name);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

/// Load a settings file by path or by name in the settings directory
pub fn load_settings_file(name: &Path) -> MapEditResult<SettingsDocument> {
    let path = resolve_settings_path(name).ok_or_else(|| {
        MapEditError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Settings file {} not found", name.display()),
        ))
    })?;
    SettingsDocument::load(&path)
}
