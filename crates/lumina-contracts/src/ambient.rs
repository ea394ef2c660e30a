use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;
use tracing::debug;

const PROJECT_ENV_VARS: [&str; 3] = [
    "GOOGLE_CLOUD_PROJECT",
    "GCLOUD_PROJECT",
    "CLOUDSDK_CORE_PROJECT",
];

pub trait ProjectDiscovery {
    fn discover_project_id(&self) -> Option<String>;
}

/// Looks for a project the way Google client libraries do: environment,
/// application default credentials, then the gcloud CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmbientProjectDiscovery;

impl AmbientProjectDiscovery {
    fn from_env() -> Option<String> {
        PROJECT_ENV_VARS.iter().find_map(|key| non_empty_env(key))
    }

    fn credentials_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(explicit) = non_empty_env("GOOGLE_APPLICATION_CREDENTIALS") {
            paths.push(PathBuf::from(explicit));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(
                home.join(".config")
                    .join("gcloud")
                    .join("application_default_credentials.json"),
            );
        }
        paths
    }

    fn from_gcloud() -> Option<String> {
        gcloud_output(&["config", "get-value", "project"])
            .filter(|value| value != "(unset)")
    }
}

impl ProjectDiscovery for AmbientProjectDiscovery {
    fn discover_project_id(&self) -> Option<String> {
        if let Some(project) = Self::from_env() {
            debug!("project id discovered from environment");
            return Some(project);
        }
        for path in Self::credentials_paths() {
            if let Some(project) = project_from_credentials_file(&path) {
                debug!(path = %path.display(), "project id discovered from credentials");
                return Some(project);
            }
        }
        let project = Self::from_gcloud();
        if project.is_some() {
            debug!("project id discovered from gcloud config");
        }
        project
    }
}

/// Reads `quota_project_id` (or `project_id`) from a credentials JSON file.
pub fn project_from_credentials_file(path: &Path) -> Option<String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            debug!(path = %path.display(), "credentials file unreadable: {err}");
            return None;
        }
    };
    let payload: Value = match serde_json::from_str(&raw) {
        Ok(payload) => payload,
        Err(err) => {
            debug!(path = %path.display(), "credentials file is not JSON: {err}");
            return None;
        }
    };
    ["quota_project_id", "project_id"].iter().find_map(|key| {
        payload
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}

pub fn gcloud_output(args: &[&str]) -> Option<String> {
    let output = match Command::new("gcloud").args(args).output() {
        Ok(output) => output,
        Err(err) => {
            debug!("gcloud unavailable: {err}");
            return None;
        }
    };
    if !output.status.success() {
        debug!(status = %output.status, "gcloud {} failed", args.join(" "));
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_prefer_quota_project() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("adc.json");
        fs::write(
            &path,
            r#"{"type":"authorized_user","quota_project_id":"quota-demo","project_id":"other"}"#,
        )?;
        assert_eq!(
            project_from_credentials_file(&path).as_deref(),
            Some("quota-demo")
        );

        fs::write(&path, r#"{"type":"service_account","project_id":"sa-demo"}"#)?;
        assert_eq!(project_from_credentials_file(&path).as_deref(), Some("sa-demo"));
        Ok(())
    }

    #[test]
    fn unusable_credentials_yield_none() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("adc.json");
        assert_eq!(project_from_credentials_file(&path), None);

        fs::write(&path, "not json")?;
        assert_eq!(project_from_credentials_file(&path), None);

        fs::write(&path, r#"{"quota_project_id":"  "}"#)?;
        assert_eq!(project_from_credentials_file(&path), None);
        Ok(())
    }
}
