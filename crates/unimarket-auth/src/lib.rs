//! UniMarket Auth: login orchestration, rate limiting, second factors
//! (TOTP and emailed codes), sessions and security events.

pub mod account;
pub mod config;
pub mod error;
pub mod events;
pub mod notify;
pub mod password;
pub mod rate_limit;
pub mod service;
pub mod session;
pub mod token;
pub mod totp;
pub mod verifier;

pub use account::{SignupInput, TotpSetup};
pub use config::AuthConfig;
pub use error::AuthError;
pub use notify::{Notifier, RecordingNotifier, TracingNotifier};
pub use service::{AuthRepositories, AuthService, LoginInput, LoginOutput};
pub use token::SessionTokenClaims;
pub use verifier::SecondFactorOutcome;
