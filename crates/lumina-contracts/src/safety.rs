pub const DEFAULT_SAFETY_FILTER_LEVEL: &str = "BLOCK_ONLY_HIGH";

pub const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Maps friendly or legacy safety levels onto the provider's threshold names.
///
/// Matching is case-insensitive. Unknown levels are returned upper-cased and
/// otherwise untouched so canonical thresholds pass straight through.
pub fn normalize_safety_level(level: &str) -> String {
    let upper = level.to_ascii_uppercase();
    let mapped = match upper.as_str() {
        "BLOCK_SOME" => "BLOCK_ONLY_HIGH",
        "BLOCK_MOST" => "BLOCK_LOW_AND_ABOVE",
        "BLOCK_FEW" => "BLOCK_ONLY_HIGH",
        "BLOCK_NONE" => "BLOCK_NONE",
        _ => return upper,
    };
    mapped.to_string()
}
