//! In-memory repository implementations.

mod rate_limit;
mod security_event;
mod session;
mod user;

pub use rate_limit::InMemoryRateLimitRepository;
pub use security_event::InMemorySecurityEventRepository;
pub use session::InMemorySessionRepository;
pub use user::{InMemoryUserRepository, hash_password};
