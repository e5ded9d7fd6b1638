//! API middleware.

pub mod rate_limit;
pub mod security_headers;

pub use rate_limit::{IpRateLimiter, RateLimitConfig, rate_limit};
pub use security_headers::security_headers;
