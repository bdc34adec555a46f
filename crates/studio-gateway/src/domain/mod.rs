//! Domain logic for the studio gateway.
//!
//! Configuration, the error taxonomy, and the pure rules (prompt checks,
//! styles, quota policy, pagination, credential checks). Nothing in here
//! performs I/O.

pub mod config;
pub mod credentials;
pub mod error;
pub mod pagination;
pub mod prompt;
pub mod quota;
pub mod styles;

// Re-exports for convenience
pub use config::{GatewayConfig, LimitsConfig};
pub use error::{ApiError, ApiResult, ErrorKind, GatewayError, ProviderError};
pub use pagination::paginate;
pub use quota::{DailyQuota, DailyUsage, QuotaReservation};
