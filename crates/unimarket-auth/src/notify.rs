//! Out-of-band notifications (mail delivery is someone else's job).
//!
//! Every call is fire-and-forget: implementations must not block the
//! authentication decision and have no way to fail it.

use std::sync::Mutex;

use tracing::{info, warn};

pub trait Notifier: Send + Sync {
    /// A failed password or second-factor check for `email`.
    fn suspicious_activity(&self, email: &str, ip: Option<&str>, reason: &str);
    /// Deliver a one-time login code.
    fn login_code(&self, email: &str, code: &str);
    /// Deliver an email verification token.
    fn verification(&self, email: &str, token: &str);
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn suspicious_activity(&self, email: &str, ip: Option<&str>, reason: &str) {
        warn!(email, ip, reason, "suspicious activity");
    }

    fn login_code(&self, email: &str, _code: &str) {
        info!(email, "login code ready for delivery");
    }

    fn verification(&self, email: &str, _token: &str) {
        info!(email, "verification email ready for delivery");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    SuspiciousActivity {
        email: String,
        ip: Option<String>,
        reason: String,
    },
    LoginCode {
        email: String,
        code: String,
    },
    Verification {
        email: String,
        token: String,
    },
}

/// Keeps every notification in memory. Useful in tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// The most recent login code sent to `email`.
    pub fn last_login_code(&self, email: &str) -> Option<String> {
        self.sent().into_iter().rev().find_map(|n| match n {
            Notification::LoginCode { email: to, code } if to == email => Some(code),
            _ => None,
        })
    }

    fn push(&self, notification: Notification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
    }
}

impl Notifier for RecordingNotifier {
    fn suspicious_activity(&self, email: &str, ip: Option<&str>, reason: &str) {
        self.push(Notification::SuspiciousActivity {
            email: email.into(),
            ip: ip.map(str::to_string),
            reason: reason.into(),
        });
    }

    fn login_code(&self, email: &str, code: &str) {
        self.push(Notification::LoginCode {
            email: email.into(),
            code: code.into(),
        });
    }

    fn verification(&self, email: &str, token: &str) {
        self.push(Notification::Verification {
            email: email.into(),
            token: token.into(),
        });
    }
}
