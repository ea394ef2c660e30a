use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::safety::DEFAULT_SAFETY_FILTER_LEVEL;

pub const DEFAULT_ASPECT_RATIO: &str = "1:1";
pub const DEFAULT_IMAGE_SIZE: &str = "1K";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersonGeneration {
    #[default]
    AllowAll,
    AllowAdult,
    DontAllow,
}

impl PersonGeneration {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllowAll => "allow_all",
            Self::AllowAdult => "allow_adult",
            Self::DontAllow => "dont_allow",
        }
    }

    pub fn prompt_clause(&self) -> Option<&'static str> {
        match self {
            Self::AllowAll => None,
            Self::AllowAdult => Some(" \n(If people are included, they must be adults.)"),
            Self::DontAllow => Some(" \n(Do not include people in this image.)"),
        }
    }
}

impl fmt::Display for PersonGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonGeneration {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "allow_all" => Ok(Self::AllowAll),
            "allow_adult" => Ok(Self::AllowAdult),
            "dont_allow" => Ok(Self::DontAllow),
            _ => Err(ConfigError::InvalidValue {
                key: "PERSON_GENERATION".to_string(),
                value: raw.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub reference_images: Vec<PathBuf>,
    pub count: u32,
    pub aspect_ratio: String,
    pub image_size: String,
    pub negative_prompt: Option<String>,
    pub person_generation: PersonGeneration,
    pub safety_filter_level: Option<String>,
    pub add_watermark: bool,
    /// Accepted but not sent to the provider.
    pub seed: Option<i64>,
    pub output_dir: PathBuf,
    pub filename: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reference_images: Vec::new(),
            count: 1,
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            image_size: DEFAULT_IMAGE_SIZE.to_string(),
            negative_prompt: None,
            person_generation: PersonGeneration::default(),
            safety_filter_level: Some(DEFAULT_SAFETY_FILTER_LEVEL.to_string()),
            add_watermark: true,
            seed: None,
            output_dir: PathBuf::from("."),
            filename: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prompt.trim().is_empty() {
            return Err(ConfigError::InvalidRequest("prompt is empty".to_string()));
        }
        if self.count == 0 {
            return Err(ConfigError::InvalidRequest(
                "count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Prompt text sent to the model: base prompt, exclusion clause, then the
    /// person-policy clause.
    pub fn effective_prompt(&self) -> String {
        let mut prompt = self.prompt.clone();
        if let Some(negative) = self
            .negative_prompt
            .as_deref()
            .filter(|value| !value.trim().is_empty())
        {
            prompt.push_str(&format!(" \n(Exclude: {negative})"));
        }
        if let Some(clause) = self.person_generation.prompt_clause() {
            prompt.push_str(clause);
        }
        prompt
    }
}

pub fn apply_prompt_modifiers(prompt: &str, styles: &[String], variations: &[String]) -> String {
    let mut full = prompt.to_string();
    if !styles.is_empty() {
        full.push_str(", in the style of ");
        full.push_str(&styles.join(", "));
    }
    if !variations.is_empty() {
        full.push_str(", with variations in ");
        full.push_str(&variations.join(", "));
    }
    full
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_generation_parses_case_insensitively() {
        assert_eq!(
            "DONT_ALLOW".parse::<PersonGeneration>().ok(),
            Some(PersonGeneration::DontAllow)
        );
        assert_eq!(
            " allow_adult ".parse::<PersonGeneration>().ok(),
            Some(PersonGeneration::AllowAdult)
        );
        assert!("everyone".parse::<PersonGeneration>().is_err());
        assert_eq!(PersonGeneration::AllowAll.to_string(), "allow_all");
    }

    #[test]
    fn effective_prompt_appends_clauses_in_order() {
        let mut request = GenerationRequest::new("a red fox");
        assert_eq!(request.effective_prompt(), "a red fox");

        request.negative_prompt = Some("blur, text".to_string());
        request.person_generation = PersonGeneration::DontAllow;
        assert_eq!(
            request.effective_prompt(),
            "a red fox \n(Exclude: blur, text) \n(Do not include people in this image.)"
        );

        request.negative_prompt = Some("  ".to_string());
        request.person_generation = PersonGeneration::AllowAdult;
        assert_eq!(
            request.effective_prompt(),
            "a red fox \n(If people are included, they must be adults.)"
        );
    }

    #[test]
    fn validate_rejects_empty_prompt_and_zero_count() {
        assert!(GenerationRequest::new("ok").validate().is_ok());
        assert!(GenerationRequest::new("   ").validate().is_err());

        let mut request = GenerationRequest::new("ok");
        request.count = 0;
        let err = request.validate().err().map(|err| err.to_string());
        assert_eq!(
            err.as_deref(),
            Some("invalid request: count must be at least 1")
        );
    }

    #[test]
    fn prompt_modifiers_join_with_commas() {
        let styles = vec!["Cyberpunk".to_string(), "Neon".to_string()];
        let variations = vec!["Rainy".to_string()];
        assert_eq!(
            apply_prompt_modifiers("A city street", &styles, &variations),
            "A city street, in the style of Cyberpunk, Neon, with variations in Rainy"
        );
        assert_eq!(apply_prompt_modifiers("plain", &[], &[]), "plain");
        assert_eq!(
            apply_prompt_modifiers("plain", &[], &variations),
            "plain, with variations in Rainy"
        );
    }
}
