use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub const DEFAULT_EXTENSION: &str = ".png";

const MAX_STEM_CHARS: usize = 50;
const FALLBACK_STEM: &str = "image";
const SALT_TOKEN: &str = "img";
const SALT_CHARS: usize = 6;

/// Turns free text into a lowercase, underscore-separated filename with the
/// default extension.
pub fn sanitize_filename(text: &str) -> String {
    let mut stem = String::new();
    let mut pending_separator = false;
    for ch in text.chars() {
        if !ch.is_ascii_alphanumeric() {
            pending_separator = true;
            continue;
        }
        if pending_separator && !stem.is_empty() {
            stem.push('_');
        }
        pending_separator = false;
        stem.push(ch.to_ascii_lowercase());
        if stem.len() >= MAX_STEM_CHARS {
            break;
        }
    }
    // Only ASCII is pushed, so byte truncation is safe.
    stem.truncate(MAX_STEM_CHARS);
    while stem.ends_with('_') {
        stem.pop();
    }
    if stem.is_empty() {
        stem.push_str(FALLBACK_STEM);
    }
    format!("{stem}{DEFAULT_EXTENSION}")
}

pub fn name_salt() -> String {
    let token = sanitize_filename(SALT_TOKEN);
    let stem = file_stem_text(&token);
    let skip = stem.chars().count().saturating_sub(SALT_CHARS);
    stem.chars().skip(skip).collect()
}

pub fn ensure_directory(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNamer {
    base: String,
    explicit: bool,
}

impl OutputNamer {
    /// `prompt` must be the prompt before negative/person augmentation.
    pub fn new(prompt: &str, filename_override: Option<&str>) -> Self {
        match filename_override.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => Self {
                base: name.to_string(),
                explicit: true,
            },
            None => Self {
                base: sanitize_filename(prompt),
                explicit: false,
            },
        }
    }

    /// `loop_index` is the zero-based request iteration, not a running image count.
    pub fn name_for(&self, loop_index: u32, disambiguate: bool) -> String {
        let base_path = Path::new(&self.base);
        if !disambiguate {
            if base_path.extension().is_some() {
                return self.base.clone();
            }
            return format!("{}{DEFAULT_EXTENSION}", self.base);
        }

        let stem = file_stem_text(&self.base);
        let suffix = base_path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        if self.explicit {
            format!("{stem}_{loop_index}{suffix}")
        } else {
            format!("{stem}_{loop_index}_{}{suffix}", name_salt())
        }
    }
}

fn file_stem_text(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_punctuation_and_case() {
        assert_eq!(sanitize_filename("a red fox"), "a_red_fox.png");
        assert_eq!(
            sanitize_filename("  A City Skyline -- at DUSK!  "),
            "a_city_skyline_at_dusk.png"
        );
        assert_eq!(sanitize_filename("???"), "image.png");
        assert_eq!(sanitize_filename("café au lait"), "caf_au_lait.png");
    }

    #[test]
    fn sanitize_truncates_long_prompts() {
        let long = "word ".repeat(40);
        let name = sanitize_filename(&long);
        let stem = name.trim_end_matches(DEFAULT_EXTENSION);
        assert!(stem.len() <= MAX_STEM_CHARS);
        assert!(!stem.ends_with('_'));
    }

    #[test]
    fn salt_is_stable() {
        assert_eq!(name_salt(), "img");
        assert_eq!(name_salt(), name_salt());
    }

    #[test]
    fn single_output_uses_base_name() {
        let namer = OutputNamer::new("a red fox", None);
        assert_eq!(namer.name_for(0, false), "a_red_fox.png");

        let explicit = OutputNamer::new("ignored", Some("result"));
        assert_eq!(explicit.name_for(0, false), "result.png");

        let with_ext = OutputNamer::new("ignored", Some("result.jpg"));
        assert_eq!(with_ext.name_for(0, false), "result.jpg");
    }

    #[test]
    fn batch_outputs_carry_loop_index() {
        let namer = OutputNamer::new("a city skyline", None);
        let names: Vec<String> = (0..3).map(|idx| namer.name_for(idx, true)).collect();
        assert_eq!(
            names,
            vec![
                "a_city_skyline_0_img.png",
                "a_city_skyline_1_img.png",
                "a_city_skyline_2_img.png",
            ]
        );

        let explicit = OutputNamer::new("a city skyline", Some("result.webp"));
        assert_eq!(explicit.name_for(2, true), "result_2.webp");
        let bare = OutputNamer::new("a city skyline", Some("result"));
        assert_eq!(bare.name_for(1, true), "result_1.png");
    }

    #[test]
    fn blank_override_falls_back_to_prompt() {
        let namer = OutputNamer::new("a red fox", Some("   "));
        assert!(!namer.explicit);
        assert_eq!(namer.base, "a_red_fox.png");
        assert_eq!(namer.name_for(1, true), "a_red_fox_1_img.png");
    }

    #[test]
    fn ensure_directory_is_idempotent() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let nested = temp.path().join("a").join("b");
        ensure_directory(&nested)?;
        ensure_directory(&nested)?;
        assert!(nested.is_dir());
        Ok(())
    }
}
