//! # Core Domain Entities
//!
//! Identity and stored-image records.
//!
//! Rows read back from the `generated_images` table keep their settings as
//! plain strings: older rows may carry values that predate the current
//! enums, and a gallery listing must never fail on them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::GenerationSettings;

// =============================================================================
// IDENTITY
// =============================================================================

/// Opaque user identifier issued by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    /// Display name chosen at sign-up (or taken from the OAuth profile).
    pub username: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// STORED IMAGES
// =============================================================================

/// Identifier of a stored image row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub String);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A row of the `generated_images` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub id: ImageId,
    pub user_id: UserId,
    /// The prompt as the user typed it, without any style suffix.
    pub prompt: String,
    /// Public storage URL, or the provider URL when storage failed.
    pub image_url: String,
    /// Style preset name, empty when none was selected.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub style: String,
    pub aspect_ratio: String,
    pub output_format: String,
    pub safety_filter_level: String,
    pub created_at: DateTime<Utc>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A row about to be inserted. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewImage {
    pub user_id: UserId,
    pub prompt: String,
    pub image_url: String,
    pub style: String,
    pub aspect_ratio: String,
    pub output_format: String,
    pub safety_filter_level: String,
}

impl NewImage {
    pub fn new(
        user_id: UserId,
        prompt: impl Into<String>,
        image_url: impl Into<String>,
        style: impl Into<String>,
        settings: &GenerationSettings,
    ) -> Self {
        Self {
            user_id,
            prompt: prompt.into(),
            image_url: image_url.into(),
            style: style.into(),
            aspect_ratio: settings.aspect_ratio.to_string(),
            output_format: settings.output_format.to_string(),
            safety_filter_level: settings.safety_filter_level.to_string(),
        }
    }

    /// Materialize the row with store-assigned fields.
    pub fn into_stored(self, id: ImageId, created_at: DateTime<Utc>) -> GeneratedImage {
        GeneratedImage {
            id,
            user_id: self.user_id,
            prompt: self.prompt,
            image_url: self.image_url,
            style: self.style,
            aspect_ratio: self.aspect_ratio,
            output_format: self.output_format,
            safety_filter_level: self.safety_filter_level,
            created_at,
        }
    }
}
