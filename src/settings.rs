use std::path::Path;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub generator: GeneratorSettings,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GeneratorSettings {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub normalize_body: NormalizeBody,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
            normalize_body: NormalizeBody::default(),
        }
    }
}

/// Which tests compare bodies with all whitespace removed.
///
/// Written either as `normalize_body = true` or as a list of test names.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum NormalizeBody {
    All(bool),
    Tests(Vec<String>),
}

impl Default for NormalizeBody {
    fn default() -> Self {
        NormalizeBody::Tests(Vec::new())
    }
}

impl NormalizeBody {
    pub fn applies_to(&self, test: &str) -> bool {
        match self {
            NormalizeBody::All(all) => *all,
            NormalizeBody::Tests(names) => names.iter().any(|n| n == test),
        }
    }

    pub fn extend(&mut self, tests: impl IntoIterator<Item = String>) {
        match self {
            NormalizeBody::All(true) => {}
            NormalizeBody::All(false) => *self = NormalizeBody::Tests(tests.into_iter().collect()),
            NormalizeBody::Tests(names) => names.extend(tests),
        }
    }
}

#[derive(Error, Debug, Diagnostic)]
pub enum SettingsError {
    #[error("Failed to read settings file `{path}`")]
    #[diagnostic(code(testlang::settings::read))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file `{path}`")]
    #[diagnostic(code(testlang::settings::parse))]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl Settings {
    /// Loads settings from a TOML file, or returns the defaults when no file
    /// is given.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let Some(path) = path else {
            return Ok(Settings::default());
        };

        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: display.clone(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| SettingsError::Toml {
            path: display,
            source,
        })
    }
}
