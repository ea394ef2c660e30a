use std::collections::BTreeMap;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::error::ConfigError;
use crate::request::{PersonGeneration, DEFAULT_ASPECT_RATIO, DEFAULT_IMAGE_SIZE};
use crate::safety::DEFAULT_SAFETY_FILTER_LEVEL;

pub const APP_DIR_NAME: &str = "lumina";
pub const ENV_FILE_NAME: &str = ".env";
pub const DEFAULT_LOCATION: &str = "us-central1";
pub const DEFAULT_MODEL_NAME: &str = "gemini-3-pro-image-preview";

const SETTINGS_KEYS: [&str; 10] = [
    "API_KEY",
    "PROJECT_ID",
    "LOCATION",
    "MODEL_NAME",
    "OUTPUT_DIR",
    "ASPECT_RATIO",
    "IMAGE_SIZE",
    "SAFETY_FILTER_LEVEL",
    "PERSON_GENERATION",
    "ADD_WATERMARK",
];

/// Defaults loaded from env files and the process environment.
///
/// Built once at startup and handed to the resolver; nothing reads it globally.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub location: String,
    pub model_name: String,
    pub output_dir: PathBuf,
    pub aspect_ratio: String,
    pub image_size: String,
    pub safety_filter_level: String,
    pub person_generation: PersonGeneration,
    pub add_watermark: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            project_id: None,
            location: DEFAULT_LOCATION.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            output_dir: default_output_dir(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            image_size: DEFAULT_IMAGE_SIZE.to_string(),
            safety_filter_level: DEFAULT_SAFETY_FILTER_LEVEL.to_string(),
            person_generation: PersonGeneration::default(),
            add_watermark: true,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&default_env_files(), |key| env::var(key).ok())
    }

    /// Later env files override earlier ones; `lookup` overrides every file.
    pub fn load_from<F>(env_files: &[PathBuf], lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut values = BTreeMap::new();
        for path in env_files {
            if !path.is_file() {
                continue;
            }
            debug!(path = %path.display(), "reading settings file");
            read_env_file(path, &mut values)?;
        }
        for key in SETTINGS_KEYS {
            let value = lookup(key).or_else(|| lookup(&key.to_ascii_lowercase()));
            if let Some(value) = value {
                values.insert(key.to_string(), value);
            }
        }
        Self::from_values(&values)
    }

    fn from_values(values: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let text = |key: &str| {
            values
                .get(key)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let person_generation = match text("PERSON_GENERATION") {
            Some(raw) => raw.parse()?,
            None => defaults.person_generation,
        };
        let add_watermark = match text("ADD_WATERMARK") {
            Some(raw) => parse_bool("ADD_WATERMARK", &raw)?,
            None => defaults.add_watermark,
        };

        Ok(Self {
            api_key: text("API_KEY"),
            project_id: text("PROJECT_ID"),
            location: text("LOCATION").unwrap_or(defaults.location),
            model_name: text("MODEL_NAME").unwrap_or(defaults.model_name),
            output_dir: text("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            aspect_ratio: text("ASPECT_RATIO").unwrap_or(defaults.aspect_ratio),
            image_size: text("IMAGE_SIZE").unwrap_or(defaults.image_size),
            safety_filter_level: text("SAFETY_FILTER_LEVEL")
                .unwrap_or(defaults.safety_filter_level),
            person_generation,
            add_watermark,
        })
    }
}

fn read_env_file(path: &Path, values: &mut BTreeMap<String, String>) -> Result<(), ConfigError> {
    let to_error = |err: dotenvy::Error| ConfigError::EnvFile {
        path: path.to_path_buf(),
        message: err.to_string(),
    };
    for item in dotenvy::from_path_iter(path).map_err(to_error)? {
        let (key, value) = item.map_err(to_error)?;
        let key = key.to_ascii_uppercase();
        if SETTINGS_KEYS.contains(&key.as_str()) {
            values.insert(key, value);
        }
    }
    Ok(())
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

pub fn user_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join(APP_DIR_NAME))
}

pub fn user_env_file() -> Option<PathBuf> {
    user_config_dir().map(|dir| dir.join(ENV_FILE_NAME))
}

pub fn default_env_files() -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Some(user) = user_env_file() {
        files.push(user);
    }
    files.push(PathBuf::from(ENV_FILE_NAME));
    files
}

pub fn default_output_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("Pictures").join("Lumina_Generated"))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_config_template(output_dir: &Path) -> String {
    format!(
        "# Secure Configuration for Lumina\n\
         # Permissions set to 600 (User Read/Write Only)\n\n\
         # AUTHENTICATION (Choose One)\n\
         API_KEY=\n\
         PROJECT_ID=\n\n\
         LOCATION={DEFAULT_LOCATION}\n\
         MODEL_NAME={DEFAULT_MODEL_NAME}\n\
         OUTPUT_DIR={}\n\
         ASPECT_RATIO={DEFAULT_ASPECT_RATIO}\n\
         IMAGE_SIZE={DEFAULT_IMAGE_SIZE}\n\
         SAFETY_FILTER_LEVEL={DEFAULT_SAFETY_FILTER_LEVEL}\n\
         PERSON_GENERATION=allow_all\n\
         ADD_WATERMARK=true\n",
        output_dir.display()
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Created(PathBuf),
    AlreadyExists(PathBuf),
}

/// Writes the default settings file, owner read/write only.
///
/// An existing file is left untouched.
pub fn init_config(env_file: &Path, output_dir: &Path) -> anyhow::Result<InitOutcome> {
    if env_file.exists() {
        return Ok(InitOutcome::AlreadyExists(env_file.to_path_buf()));
    }
    if let Some(parent) = env_file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = match options.open(env_file) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            return Ok(InitOutcome::AlreadyExists(env_file.to_path_buf()));
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to create {}", env_file.display()));
        }
    };
    file.write_all(default_config_template(output_dir).as_bytes())
        .with_context(|| format!("failed to write {}", env_file.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(env_file, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict {}", env_file.display()))?;
    }

    Ok(InitOutcome::Created(env_file.to_path_buf()))
}
