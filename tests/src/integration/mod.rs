//! Cross-crate flows through the full router.

pub mod live_providers;
pub mod offline_flows;
