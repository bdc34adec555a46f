//! Prompt validation and rewriting.

use shared_types::StylePreset;

use super::error::{ApiError, ApiResult};

/// Reject empty prompts and prompts longer than `max_chars` characters.
pub fn validate_prompt(prompt: &str, max_chars: usize) -> ApiResult<()> {
    if prompt.trim().is_empty() {
        return Err(ApiError::invalid_prompt("Please enter a prompt"));
    }
    if prompt.chars().count() > max_chars {
        return Err(ApiError::invalid_prompt(format!(
            "Prompt is too long. Please keep it under {max_chars} characters."
        )));
    }
    Ok(())
}

/// The prompt actually sent to the generator.
pub fn apply_style(prompt: &str, preset: Option<&StylePreset>) -> String {
    match preset {
        Some(style) => format!("{prompt}{}", style.prompt_addition),
        None => prompt.to_string(),
    }
}

/// Cut an enhanced prompt so it still fits the prompt limit.
///
/// Longer text keeps its first `max_chars - 3` characters followed by `...`.
pub fn truncate_enhanced(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Instruction sent to the language model for one enhancement.
pub fn enhancement_instruction(prompt: &str) -> String {
    format!(
        "Enhance the following image generation prompt for better results, making it more \
         descriptive and creative, suitable for a text-to-image model. Add artistic details, \
         lighting, composition, and quality terms. Do not include any conversational text, \
         just the enhanced prompt itself. Example: \"A cat\" -> \"A fluffy orange cat sitting \
         on a windowsill, with bright green eyes, in a cozy sunlit room, highly detailed, \
         photorealistic, professional photography, soft natural lighting, 8k resolution.\"\
         \n\nOriginal prompt: \"{prompt}\""
    )
}

/// Shorten a prompt for log fields.
pub(crate) fn preview(prompt: &str) -> String {
    const PREVIEW_CHARS: usize = 60;
    if prompt.chars().count() <= PREVIEW_CHARS {
        prompt.to_string()
    } else {
        let head: String = prompt.chars().take(PREVIEW_CHARS).collect();
        format!("{head}…")
    }
}
