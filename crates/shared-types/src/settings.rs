//! # Generation Settings
//!
//! The knobs a user can turn on a generation request. The string forms are
//! the ones the generation provider accepts and the ones stored in the
//! `generated_images` table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ParseSettingError;

/// Output aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "3:4")]
    Tall,
}

impl AspectRatio {
    /// All supported ratios, in catalog order.
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Standard,
        AspectRatio::Tall,
    ];

    /// Wire string (`"16:9"` etc).
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Standard => "4:3",
            AspectRatio::Tall => "3:4",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = ParseSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AspectRatio::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ParseSettingError::new("aspect ratio", s))
    }
}

/// Encoded image format requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpg,
    Webp,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Png, OutputFormat::Jpg, OutputFormat::Webp];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }

    /// File extension used for stored objects.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// MIME type sent with uploads when the download did not report one.
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ParseSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| ParseSettingError::new("output format", s))
    }
}

/// Provider-side content safety threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyFilterLevel {
    /// Strictest: blocks anything rated low risk or above.
    BlockLowAndAbove,
    #[default]
    BlockMediumAndAbove,
    /// Most permissive: only blocks high-risk content.
    BlockOnlyHigh,
}

impl SafetyFilterLevel {
    pub const ALL: [SafetyFilterLevel; 3] = [
        SafetyFilterLevel::BlockLowAndAbove,
        SafetyFilterLevel::BlockMediumAndAbove,
        SafetyFilterLevel::BlockOnlyHigh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyFilterLevel::BlockLowAndAbove => "block_low_and_above",
            SafetyFilterLevel::BlockMediumAndAbove => "block_medium_and_above",
            SafetyFilterLevel::BlockOnlyHigh => "block_only_high",
        }
    }
}

impl fmt::Display for SafetyFilterLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SafetyFilterLevel {
    type Err = ParseSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SafetyFilterLevel::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| ParseSettingError::new("safety filter level", s))
    }
}

/// Settings attached to one generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub aspect_ratio: AspectRatio,
    pub output_format: OutputFormat,
    pub safety_filter_level: SafetyFilterLevel,
}

/// A named suffix appended to the user's prompt before generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylePreset {
    pub id: String,
    pub name: String,
    /// Appended verbatim, including its leading comma.
    pub prompt_addition: String,
    pub description: String,
}
