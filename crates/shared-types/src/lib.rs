//! # Shared Types Crate
//!
//! Records shared by every crate in the Prompt Studio workspace.
//!
//! ## Clusters
//!
//! - **Identity**: `UserId`, `User`
//! - **Generation**: `AspectRatio`, `OutputFormat`, `SafetyFilterLevel`,
//!   `GenerationSettings`, `StylePreset`
//! - **Gallery**: `ImageId`, `GeneratedImage`, `NewImage`, `Page`
//! - **Quota**: `QuotaStatus`
//!
//! ## Design Principles
//!
//! - **Wire-exact enums**: every enum serializes to the exact string the
//!   external providers and the stored rows use. Unknown strings are
//!   rejected at deserialization.
//! - **No I/O**: this crate never touches the network or the filesystem.

pub mod entities;
pub mod errors;
pub mod gallery;
pub mod settings;

pub use entities::*;
pub use errors::*;
pub use gallery::*;
pub use settings::*;
