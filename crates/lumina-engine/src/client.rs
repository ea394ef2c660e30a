use std::time::Duration;

use lumina_contracts::ambient::{gcloud_output, non_empty_env};
use lumina_contracts::resolve::AuthConfig;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use tracing::debug;

use crate::error::{GenerationError, Result};
use crate::wire::{GenerateContentRequest, GenerateContentResponse};

const STUDIO_API_BASE: &str = "https://generativelanguage.googleapis.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
const ERROR_BODY_MAX_CHARS: usize = 512;

pub trait GenAiClient: Send + Sync {
    fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;
}

pub trait ClientFactory: Send + Sync {
    fn build(&self, auth: &AuthConfig) -> Result<Box<dyn GenAiClient>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HttpClientFactory;

impl ClientFactory for HttpClientFactory {
    fn build(&self, auth: &AuthConfig) -> Result<Box<dyn GenAiClient>> {
        match auth {
            AuthConfig::Studio { api_key } => {
                Ok(Box::new(StudioClient::new(api_key.clone())?))
            }
            AuthConfig::Cloud {
                project_id,
                location,
            } => Ok(Box::new(VertexClient::new(
                project_id.clone(),
                location.clone(),
            )?)),
        }
    }
}

pub struct StudioClient {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl StudioClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_api_base(api_key, STUDIO_API_BASE)
    }

    pub fn with_api_base(api_key: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http: build_http_client()?,
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/v1beta/{}:generateContent", self.api_base, model_path)
    }
}

impl GenAiClient for StudioClient {
    fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let endpoint = self.endpoint_for_model(model);
        debug!(endpoint = %endpoint, "sending generateContent request");
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()?;
        decode_response(response)
    }
}

pub struct VertexClient {
    project_id: String,
    location: String,
    api_base: String,
    access_token: String,
    http: HttpClient,
}

impl VertexClient {
    /// Resolves an access token from the environment or the gcloud CLI.
    pub fn new(project_id: impl Into<String>, location: impl Into<String>) -> Result<Self> {
        let access_token = resolve_access_token()?;
        let location = location.into();
        let api_base = vertex_api_base(&location);
        Self::with_token(project_id, location, access_token, api_base)
    }

    pub fn with_token(
        project_id: impl Into<String>,
        location: impl Into<String>,
        access_token: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            project_id: project_id.into(),
            location: location.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            http: build_http_client()?,
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let model = model.trim();
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.api_base, self.project_id, self.location, model
        )
    }
}

impl GenAiClient for VertexClient {
    fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let endpoint = self.endpoint_for_model(model);
        debug!(endpoint = %endpoint, "sending generateContent request");
        let response = self
            .http
            .post(&endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .json(request)
            .send()?;
        decode_response(response)
    }
}

pub fn vertex_api_base(location: &str) -> String {
    let location = location.trim();
    if location.is_empty() || location == "global" {
        "https://aiplatform.googleapis.com".to_string()
    } else {
        format!("https://{location}-aiplatform.googleapis.com")
    }
}

fn resolve_access_token() -> Result<String> {
    non_empty_env("GOOGLE_OAUTH_ACCESS_TOKEN")
        .or_else(|| gcloud_output(&["auth", "application-default", "print-access-token"]))
        .or_else(|| gcloud_output(&["auth", "print-access-token"]))
        .ok_or_else(|| {
            GenerationError::Credentials(
                "no access token; set GOOGLE_OAUTH_ACCESS_TOKEN or run \
                 `gcloud auth application-default login`"
                    .to_string(),
            )
        })
}

fn build_http_client() -> Result<HttpClient> {
    Ok(HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?)
}

fn decode_response(response: HttpResponse) -> Result<GenerateContentResponse> {
    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        return Err(GenerationError::Api {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }
    Ok(serde_json::from_str(&body)?)
}

/// Prefers the structured `error.message` (plus status) over the raw body.
fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let error = parsed.as_ref().and_then(|value| value.get("error"));
    let message = error
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str);
    let status = error
        .and_then(|error| error.get("status"))
        .and_then(Value::as_str);
    match (message, status) {
        (Some(message), Some(status)) => format!("{status}: {message}"),
        (Some(message), None) => message.to_string(),
        _ => truncate_text(body.trim(), ERROR_BODY_MAX_CHARS),
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
