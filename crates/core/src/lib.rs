//! Pulse Core Library
//!
//! This crate provides the foundational pieces shared by every Pulse crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management and per-tenant resolution
//! - Authenticated principal and request context
//! - The generic provider registry

pub mod config;
pub mod error;
pub mod logging;
pub mod principal;
pub mod registry;
pub mod tenant;

// Re-export commonly used types
pub use config::{AppConfig, TenantOverrides};
pub use error::{AppError, AppResult};
pub use principal::{Principal, RequestContext};
pub use registry::{ProviderRegistry, SHARED_SCOPE};
pub use tenant::{TenantConfig, TenantDirectory};
