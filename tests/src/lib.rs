//! # Prompt Studio Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── support.rs        # Fake provider cloud and gateway harness
//! └── integration/
//!     ├── live_providers.rs   # HTTP adapters against the fake cloud
//!     └── offline_flows.rs    # In-memory providers, middleware behaviour
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p studio-tests
//! cargo test -p studio-tests integration::live_providers::
//! cargo bench -p studio-tests
//! ```

#![allow(dead_code)]

pub mod integration;
pub mod support;
