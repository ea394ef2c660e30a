use std::env;
use std::path::{Path, PathBuf};

use anyhow::Result;
use lumina_contracts::naming::{ensure_directory, OutputNamer};
use lumina_contracts::request::GenerationRequest;
use lumina_contracts::resolve::AuthConfig;
use lumina_contracts::safety::normalize_safety_level;
use lumina_contracts::settings::DEFAULT_LOCATION;
use tracing::{debug, error, info, warn};

use crate::client::{truncate_text, ClientFactory, GenAiClient, HttpClientFactory};
use crate::error::{looks_not_found, GenerationError};
use crate::media::{load_reference_parts, save_image};
use crate::wire::{GenerateContentRequest, GenerateContentResponse, Part};

const TEXT_LOG_MAX_CHARS: usize = 200;

pub struct ImageGenerator {
    model_name: String,
    api_key: Option<String>,
    project_id: Option<String>,
    location: String,
    factory: Box<dyn ClientFactory>,
    client: Option<Box<dyn GenAiClient>>,
}

#[derive(Debug)]
pub struct IterationFailure {
    pub index: u32,
    pub error: anyhow::Error,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub requested: u32,
    pub saved: Vec<PathBuf>,
    pub failures: Vec<IterationFailure>,
}

impl BatchOutcome {
    fn new(requested: u32) -> Self {
        Self {
            requested,
            saved: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn last_iteration_failed(&self) -> bool {
        self.failures
            .last()
            .map(|failure| failure.index + 1 == self.requested)
            .unwrap_or(false)
    }

    /// A batch only fails outright when its final iteration failed and no
    /// image was saved by any iteration.
    pub fn should_propagate(&self) -> bool {
        self.saved.is_empty() && self.last_iteration_failed()
    }

    pub fn into_result(mut self) -> Result<Vec<PathBuf>> {
        if self.should_propagate() {
            if let Some(failure) = self.failures.pop() {
                return Err(failure.error);
            }
        }
        Ok(self.saved)
    }
}

impl ImageGenerator {
    pub fn new(
        model_name: impl Into<String>,
        api_key: Option<String>,
        project_id: Option<String>,
        location: impl Into<String>,
    ) -> Self {
        Self::with_factory(
            model_name,
            api_key,
            project_id,
            location,
            Box::new(HttpClientFactory),
        )
    }

    pub fn from_auth(
        model_name: impl Into<String>,
        auth: &AuthConfig,
        factory: Box<dyn ClientFactory>,
    ) -> Self {
        match auth {
            AuthConfig::Studio { api_key } => Self::with_factory(
                model_name,
                Some(api_key.clone()),
                None,
                DEFAULT_LOCATION,
                factory,
            ),
            AuthConfig::Cloud {
                project_id,
                location,
            } => Self::with_factory(
                model_name,
                None,
                Some(project_id.clone()),
                location.clone(),
                factory,
            ),
        }
    }

    /// In cloud mode this also exports the project, location and backend flag
    /// to the process environment so ambient tooling agrees with the client.
    pub fn with_factory(
        model_name: impl Into<String>,
        api_key: Option<String>,
        project_id: Option<String>,
        location: impl Into<String>,
        factory: Box<dyn ClientFactory>,
    ) -> Self {
        let api_key = api_key.filter(|value| !value.trim().is_empty());
        let project_id = project_id.filter(|value| !value.trim().is_empty());
        let location = location.into();

        if api_key.is_none() {
            if let Some(project) = project_id.as_deref() {
                env::set_var("GOOGLE_CLOUD_PROJECT", project);
                env::set_var("GOOGLE_CLOUD_LOCATION", &location);
                env::set_var("GOOGLE_GENAI_USE_VERTEXAI", "True");
            }
        }

        Self {
            model_name: model_name.into(),
            api_key,
            project_id,
            location,
            factory,
            client: None,
        }
    }

    pub fn auth_config(&self) -> std::result::Result<AuthConfig, GenerationError> {
        if let Some(api_key) = self.api_key.as_ref() {
            return Ok(AuthConfig::Studio {
                api_key: api_key.clone(),
            });
        }
        match self.project_id.as_ref() {
            Some(project_id) => Ok(AuthConfig::Cloud {
                project_id: project_id.clone(),
                location: self.location.clone(),
            }),
            None => Err(GenerationError::Config(
                "Project ID is required for Vertex AI.".to_string(),
            )),
        }
    }

    pub fn client(&mut self) -> Result<&dyn GenAiClient> {
        let client = match self.client.take() {
            Some(client) => client,
            None => self.build_client()?,
        };
        Ok(&**self.client.insert(client))
    }

    fn build_client(&self) -> Result<Box<dyn GenAiClient>> {
        let auth = self.auth_config().inspect_err(|err| {
            error!("Failed to initialize GenAI client: {err}");
        })?;
        match &auth {
            AuthConfig::Studio { .. } => {
                debug!("Initializing client with API key (Google AI Studio)")
            }
            AuthConfig::Cloud { .. } => debug!("Initializing client with Vertex AI (GCP)"),
        }
        let client = self.factory.build(&auth).inspect_err(|err| {
            error!("Failed to initialize GenAI client: {err}");
        })?;
        Ok(client)
    }

    /// Generates `request.count` images and returns the saved paths.
    ///
    /// Failed iterations are logged and skipped. The call only fails when the
    /// final iteration failed and nothing was saved.
    pub fn generate(&mut self, request: &GenerationRequest) -> Result<Vec<PathBuf>> {
        self.generate_batch(request)?.into_result()
    }

    pub fn generate_batch(&mut self, request: &GenerationRequest) -> Result<BatchOutcome> {
        request.validate()?;

        let prompt = request.effective_prompt();
        if let Some(negative) = request
            .negative_prompt
            .as_deref()
            .filter(|value| !value.trim().is_empty())
        {
            info!("Appended negative prompt: {negative}");
        }
        debug!("Generating image with prompt: '{prompt}'");
        debug!(
            "Model: {} | Size: {} | Ratio: {}",
            self.model_name, request.image_size, request.aspect_ratio
        );

        let mut parts = vec![Part::text(prompt)];
        if !request.reference_images.is_empty() {
            info!(
                "Using {} reference image(s).",
                request.reference_images.len()
            );
            parts.extend(load_reference_parts(&request.reference_images));
        }

        ensure_directory(&request.output_dir)?;

        let threshold = request
            .safety_filter_level
            .as_deref()
            .filter(|level| !level.trim().is_empty())
            .map(normalize_safety_level);
        if let (Some(raw), Some(resolved)) = (&request.safety_filter_level, &threshold) {
            debug!("Resolved safety threshold: {raw} -> {resolved}");
        }
        if let Some(seed) = request.seed {
            debug!(seed, "seed is not forwarded to the provider");
        }

        let payload = GenerateContentRequest::new(
            parts,
            &request.aspect_ratio,
            &request.image_size,
            threshold.as_deref(),
        );
        let namer = OutputNamer::new(&request.prompt, request.filename.as_deref());
        let mut outcome = BatchOutcome::new(request.count);

        for index in 0..request.count {
            let result = self.request_once(&payload).and_then(|response| {
                save_response_images(
                    &response,
                    &namer,
                    index,
                    request.count,
                    &request.output_dir,
                    &mut outcome.saved,
                )
            });
            if let Err(error) = result {
                self.log_iteration_failure(index, &error);
                outcome.failures.push(IterationFailure { index, error });
            }
        }

        if outcome.saved.len() < request.count as usize && !outcome.should_propagate() {
            warn!(
                "Generated {} of {} requested image(s).",
                outcome.saved.len(),
                request.count
            );
        }
        Ok(outcome)
    }

    fn request_once(
        &mut self,
        payload: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let model = self.model_name.clone();
        let client = self.client()?;
        Ok(client.generate_content(&model, payload)?)
    }

    fn log_iteration_failure(&self, index: u32, err: &anyhow::Error) {
        error!("Image generation failed for iteration {}: {err:#}", index + 1);
        if looks_not_found(err) {
            error!(
                "TIP: Ensure model '{}' is enabled in project '{}' and available in region '{}'. \
                 You may need to request access.",
                self.model_name,
                self.project_id.as_deref().unwrap_or("<none>"),
                self.location
            );
        }
    }
}

fn save_response_images(
    response: &GenerateContentResponse,
    namer: &OutputNamer,
    index: u32,
    count: u32,
    output_dir: &Path,
    saved: &mut Vec<PathBuf>,
) -> Result<()> {
    let parts = response
        .parts()
        .ok_or_else(|| GenerationError::EmptyResponse(response.missing_content_reason()))?;
    let disambiguate = count > 1 || parts.len() > 1;
    let mut images = 0usize;

    for part in parts {
        if let Some(text) = part.text.as_deref().filter(|text| !text.is_empty()) {
            debug!("Thinking/Text: {}...", truncate_text(text, TEXT_LOG_MAX_CHARS));
        }
        if let Some(bytes) = part.image_bytes()? {
            let path = output_dir.join(namer.name_for(index, disambiguate));
            save_image(&bytes, &path)?;
            info!("Saved: {}", path.display());
            saved.push(path);
            images += 1;
        }
    }

    if images == 0 {
        warn!("Iteration {} returned no image data.", index + 1);
    }
    Ok(())
}
