use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use crate::ambient::ProjectDiscovery;
use crate::error::ConfigError;
use crate::settings::Settings;

/// How the generator authenticates. Exactly one mode per generator.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthConfig {
    Studio { api_key: String },
    Cloud { project_id: String, location: String },
}

// Keeps API keys out of logs and panic messages.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Studio { .. } => f
                .debug_struct("Studio")
                .field("api_key", &"<redacted>")
                .finish(),
            Self::Cloud {
                project_id,
                location,
            } => f
                .debug_struct("Cloud")
                .field("project_id", project_id)
                .field("location", location)
                .finish(),
        }
    }
}

impl fmt::Display for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Studio { .. } => f.write_str("API Key"),
            Self::Cloud { project_id, .. } => write!(f, "Vertex AI (Project: {project_id})"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub location: Option<String>,
    pub model_name: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub aspect_ratio: Option<String>,
    pub image_size: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub auth: AuthConfig,
    pub location: String,
    pub model_name: String,
    pub output_dir: PathBuf,
    pub aspect_ratio: String,
    pub image_size: String,
}

/// Merges CLI flags over settings, consulting ambient discovery for the
/// project id only when no API key resolved.
pub fn resolve_config(
    overrides: &CliOverrides,
    settings: &Settings,
    discovery: &dyn ProjectDiscovery,
) -> Result<ResolvedConfig, ConfigError> {
    let location = first_non_empty([
        overrides.location.as_deref(),
        Some(settings.location.as_str()),
    ])
    .unwrap_or_else(|| settings.location.clone());

    let api_key = first_non_empty([overrides.api_key.as_deref(), settings.api_key.as_deref()]);
    let auth = match api_key {
        Some(api_key) => AuthConfig::Studio { api_key },
        None => {
            let project_id = first_non_empty([
                overrides.project_id.as_deref(),
                settings.project_id.as_deref(),
            ])
            .or_else(|| {
                debug!("no project id configured; trying ambient discovery");
                discovery
                    .discover_project_id()
                    .filter(|value| !value.trim().is_empty())
            })
            .ok_or(ConfigError::MissingAuth)?;
            AuthConfig::Cloud {
                project_id,
                location: location.clone(),
            }
        }
    };

    let output_dir = overrides
        .output_dir
        .clone()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| settings.output_dir.clone());

    Ok(ResolvedConfig {
        auth,
        location,
        model_name: first_non_empty([
            overrides.model_name.as_deref(),
            Some(settings.model_name.as_str()),
        ])
        .unwrap_or_else(|| settings.model_name.clone()),
        output_dir,
        aspect_ratio: first_non_empty([
            overrides.aspect_ratio.as_deref(),
            Some(settings.aspect_ratio.as_str()),
        ])
        .unwrap_or_else(|| settings.aspect_ratio.clone()),
        image_size: first_non_empty([
            overrides.image_size.as_deref(),
            Some(settings.image_size.as_str()),
        ])
        .unwrap_or_else(|| settings.image_size.clone()),
    })
}

fn first_non_empty<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::path::PathBuf;

    use super::*;

    struct FixedDiscovery {
        project: Option<&'static str>,
        calls: Cell<u32>,
    }

    impl FixedDiscovery {
        fn new(project: Option<&'static str>) -> Self {
            Self {
                project,
                calls: Cell::new(0),
            }
        }
    }

    impl ProjectDiscovery for FixedDiscovery {
        fn discover_project_id(&self) -> Option<String> {
            self.calls.set(self.calls.get() + 1);
            self.project.map(str::to_string)
        }
    }

    fn base_settings() -> Settings {
        Settings {
            output_dir: PathBuf::from("/tmp/lumina-out"),
            ..Settings::default()
        }
    }

    #[test]
    fn api_key_selects_studio_without_discovery() -> anyhow::Result<()> {
        let discovery = FixedDiscovery::new(Some("ambient"));
        let mut settings = base_settings();
        settings.project_id = Some("configured".to_string());
        let overrides = CliOverrides {
            api_key: Some("cli-key".to_string()),
            ..CliOverrides::default()
        };

        let resolved = resolve_config(&overrides, &settings, &discovery)?;
        assert_eq!(
            resolved.auth,
            AuthConfig::Studio {
                api_key: "cli-key".to_string()
            }
        );
        assert_eq!(discovery.calls.get(), 0);
        Ok(())
    }

    #[test]
    fn settings_api_key_used_when_flag_blank() -> anyhow::Result<()> {
        let discovery = FixedDiscovery::new(None);
        let mut settings = base_settings();
        settings.api_key = Some("env-key".to_string());
        let overrides = CliOverrides {
            api_key: Some("  ".to_string()),
            ..CliOverrides::default()
        };
        let resolved = resolve_config(&overrides, &settings, &discovery)?;
        assert_eq!(
            resolved.auth,
            AuthConfig::Studio {
                api_key: "env-key".to_string()
            }
        );
        Ok(())
    }

    #[test]
    fn project_precedence_is_flag_then_settings_then_ambient() -> anyhow::Result<()> {
        let discovery = FixedDiscovery::new(Some("ambient"));
        let mut settings = base_settings();
        settings.project_id = Some("configured".to_string());
        settings.location = "europe-west4".to_string();

        let flagged = CliOverrides {
            project_id: Some("flag".to_string()),
            location: Some("asia-east1".to_string()),
            ..CliOverrides::default()
        };
        let resolved = resolve_config(&flagged, &settings, &discovery)?;
        assert_eq!(
            resolved.auth,
            AuthConfig::Cloud {
                project_id: "flag".to_string(),
                location: "asia-east1".to_string(),
            }
        );

        let resolved = resolve_config(&CliOverrides::default(), &settings, &discovery)?;
        assert_eq!(
            resolved.auth,
            AuthConfig::Cloud {
                project_id: "configured".to_string(),
                location: "europe-west4".to_string(),
            }
        );
        assert_eq!(resolved.location, "europe-west4");
        assert_eq!(discovery.calls.get(), 0);

        settings.project_id = None;
        let resolved = resolve_config(&CliOverrides::default(), &settings, &discovery)?;
        assert_eq!(
            resolved.auth,
            AuthConfig::Cloud {
                project_id: "ambient".to_string(),
                location: "europe-west4".to_string(),
            }
        );
        assert_eq!(discovery.calls.get(), 1);
        Ok(())
    }

    #[test]
    fn missing_auth_is_an_error() {
        let discovery = FixedDiscovery::new(None);
        let err = resolve_config(&CliOverrides::default(), &base_settings(), &discovery).err();
        assert!(matches!(err, Some(ConfigError::MissingAuth)));
    }

    #[test]
    fn flags_override_settings_per_field() -> anyhow::Result<()> {
        let discovery = FixedDiscovery::new(Some("demo"));
        let settings = base_settings();
        let overrides = CliOverrides {
            model_name: Some("gemini-2.5-flash-image".to_string()),
            output_dir: Some(PathBuf::from("renders")),
            aspect_ratio: Some("16:9".to_string()),
            image_size: Some("".to_string()),
            ..CliOverrides::default()
        };
        let resolved = resolve_config(&overrides, &settings, &discovery)?;
        assert_eq!(resolved.model_name, "gemini-2.5-flash-image");
        assert_eq!(resolved.output_dir, PathBuf::from("renders"));
        assert_eq!(resolved.aspect_ratio, "16:9");
        assert_eq!(resolved.image_size, "1K");
        assert_eq!(resolved.location, "us-central1");
        Ok(())
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let auth = AuthConfig::Studio {
            api_key: "secret-key".to_string(),
        };
        let text = format!("{auth:?}");
        assert!(!text.contains("secret-key"));
        assert_eq!(auth.to_string(), "API Key");
    }
}
