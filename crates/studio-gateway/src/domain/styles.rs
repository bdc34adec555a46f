//! Built-in style catalog.

use std::sync::OnceLock;

use shared_types::StylePreset;

use super::error::{ApiError, ApiResult};

const CATALOG: [(&str, &str, &str, &str); 8] = [
    (
        "1",
        "Photorealistic",
        ", photorealistic, high quality, detailed, 8k resolution",
        "Ultra-realistic photography style",
    ),
    (
        "2",
        "Digital Art",
        ", digital art, vibrant colors, artistic, concept art style",
        "Modern digital artwork style",
    ),
    (
        "3",
        "Oil Painting",
        ", oil painting style, classical art, painterly, artistic brushstrokes",
        "Classic oil painting aesthetic",
    ),
    (
        "4",
        "Minimalist",
        ", minimalist style, clean, simple, modern, geometric",
        "Clean and simple design",
    ),
    (
        "5",
        "Cyberpunk",
        ", cyberpunk style, neon lights, futuristic, dark atmosphere",
        "Futuristic cyberpunk aesthetic",
    ),
    (
        "6",
        "Watercolor",
        ", watercolor painting, soft colors, flowing, artistic",
        "Soft watercolor painting style",
    ),
    (
        "7",
        "Cartoon",
        ", cartoon style, animated, colorful, fun, playful",
        "Animated cartoon style",
    ),
    (
        "8",
        "Vintage",
        ", vintage style, retro, aged, classic, nostalgic",
        "Classic vintage aesthetic",
    ),
];

/// All presets in display order.
pub fn all() -> &'static [StylePreset] {
    static PRESETS: OnceLock<Vec<StylePreset>> = OnceLock::new();
    PRESETS.get_or_init(|| {
        CATALOG
            .iter()
            .map(|(id, name, addition, description)| StylePreset {
                id: (*id).to_string(),
                name: (*name).to_string(),
                prompt_addition: (*addition).to_string(),
                description: (*description).to_string(),
            })
            .collect()
    })
}

pub fn find(id: &str) -> Option<&'static StylePreset> {
    all().iter().find(|preset| preset.id == id)
}

/// Resolve an optional style id from a request. Blank ids mean "no style".
pub fn resolve(id: Option<&str>) -> ApiResult<Option<&'static StylePreset>> {
    match id.map(str::trim) {
        None | Some("") => Ok(None),
        Some(id) => find(id)
            .map(Some)
            .ok_or_else(|| ApiError::invalid_request(format!("Unknown style: {id}"))),
    }
}
