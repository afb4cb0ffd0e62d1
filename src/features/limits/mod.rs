pub mod commands;
pub mod guard;
pub mod models;
pub mod service;
pub mod usage;

pub use commands::{check_all_limits, check_limit, enforce_limit};
pub use guard::{require_user, QuotaGate};
pub use models::LimitCheckResult;
pub use service::{check, enforce, resolve_tier};
