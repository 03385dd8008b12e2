//! Authentication service: login orchestration, sign-out, session
//! tokens and emailed login codes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};
use unimarket_core::models::security_event::{EventContext, SecurityEventKind};
use unimarket_core::models::user::{EmailCode, UpdateUser, User, UserRole};
use unimarket_core::repository::{
    RateLimitRepository, SecurityEventRepository, SessionRepository, UserRepository,
};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::events::SecurityEventLog;
use crate::notify::{Notifier, TracingNotifier};
use crate::password;
use crate::rate_limit::{LoginGate, RateLimiter};
use crate::session::SessionManager;
use crate::token::{self, SessionTokenClaims};
use crate::verifier::{self, CredentialVerifier, SecondFactorOutcome};

/// Credentials submitted for a login attempt.
#[derive(Debug, Clone, Default)]
pub struct LoginInput {
    /// Email address, matched exactly as stored.
    pub identifier: String,
    pub secret: String,
    pub totp_code: Option<String>,
    pub email_code: Option<String>,
    pub ip_address: Option<String>,
}

/// Successful login result.
#[derive(Debug, Clone)]
pub struct LoginOutput {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    /// Raw session id (return to the client, never stored).
    pub session_id: String,
}

/// The stores the service works against.
///
/// The two rate-limit stores are independent keyspaces.
pub struct AuthRepositories<U, S, L, E> {
    pub users: U,
    pub sessions: S,
    pub ip_limits: L,
    pub identity_limits: L,
    pub events: E,
}

/// Authentication service.
///
/// Generic over repository implementations so that the auth layer
/// has no dependency on the storage crate.
pub struct AuthService<U, S, L, E>
where
    U: UserRepository,
    S: SessionRepository,
    L: RateLimitRepository,
    E: SecurityEventRepository,
{
    pub(crate) users: U,
    pub(crate) sessions: SessionManager<S>,
    pub(crate) gate: LoginGate<L>,
    pub(crate) verifier: CredentialVerifier,
    pub(crate) events: SecurityEventLog<E>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) config: AuthConfig,
}

impl<U, S, L, E> AuthService<U, S, L, E>
where
    U: UserRepository,
    S: SessionRepository,
    L: RateLimitRepository,
    E: SecurityEventRepository,
{
    pub fn new(repos: AuthRepositories<U, S, L, E>, config: AuthConfig) -> Self {
        Self::with_notifier(repos, config, Arc::new(TracingNotifier))
    }

    pub fn with_notifier(
        repos: AuthRepositories<U, S, L, E>,
        config: AuthConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            users: repos.users,
            sessions: SessionManager::new(repos.sessions, config.session_ttl()),
            gate: LoginGate::new(
                RateLimiter::new(repos.ip_limits, config.ip_rate_limit),
                RateLimiter::new(repos.identity_limits, config.identity_rate_limit),
            ),
            verifier: CredentialVerifier::new(&config),
            events: SecurityEventLog::new(repos.events),
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn users(&self) -> &U {
        &self.users
    }

    pub fn sessions(&self) -> &SessionManager<S> {
        &self.sessions
    }

    pub fn gate(&self) -> &LoginGate<L> {
        &self.gate
    }

    pub fn events(&self) -> &SecurityEventLog<E> {
        &self.events
    }

    /// Authenticate with email + password (+ second factor) and open a
    /// session.
    pub async fn login(&self, input: LoginInput) -> Result<LoginOutput, AuthError> {
        self.login_at(input, Utc::now()).await
    }

    /// Run the login state machine at `now`.
    ///
    /// Every outcome records exactly one security event.
    pub async fn login_at(
        &self,
        input: LoginInput,
        now: DateTime<Utc>,
    ) -> Result<LoginOutput, AuthError> {
        let mut context = EventContext::new()
            .email(input.identifier.as_str())
            .ip(input.ip_address.as_deref());

        match self.attempt_login(&input, now, &mut context).await {
            Ok(output) => {
                info!(user_id = %output.user_id, "login succeeded");
                self.events
                    .record(SecurityEventKind::LoginSuccess, context)
                    .await;
                Ok(output)
            }
            Err(err) => {
                self.reject(&err, &input, context, now).await;
                Err(err)
            }
        }
    }

    async fn attempt_login(
        &self,
        input: &LoginInput,
        now: DateTime<Utc>,
        context: &mut EventContext,
    ) -> Result<LoginOutput, AuthError> {
        let ip = input.ip_address.as_deref();
        let identifier = input.identifier.as_str();

        // 1. Both credentials must be present.
        if identifier.trim().is_empty() || input.secret.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        // 2, 3. IP and identity gates.
        let gate = self.gate.check_at(ip, identifier, now).await?;
        if !gate.allowed {
            let locked_until = gate.locked_until.unwrap_or(now);
            return Err(AuthError::RateLimited { locked_until });
        }

        // 4. Look up the identity.
        let user = match self.users.get_by_email(identifier).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                password::burn_verification(&input.secret);
                return Err(AuthError::UserNotFound);
            }
            Err(e) => return Err(e.into()),
        };
        context.user_id = Some(user.id);
        context.role = Some(user.role);

        // 5. Password.
        if !self.verifier.verify_password(&input.secret, &user)? {
            return Err(AuthError::InvalidPassword);
        }

        // 6. Second factor, when one applies.
        let submitted = if user.has_totp() {
            input.totp_code.as_deref()
        } else {
            input.email_code.as_deref()
        };
        match self
            .verifier
            .verify_second_factor_at(&self.users, &user, submitted, now)
            .await?
        {
            SecondFactorOutcome::Required => return Err(AuthError::SecondFactorRequired),
            SecondFactorOutcome::Invalid => return Err(AuthError::InvalidSecondFactor),
            SecondFactorOutcome::Valid | SecondFactorOutcome::NotConfigured => {}
        }

        // 7. Forgive earlier failures and open the session.
        self.gate.reset(ip, identifier).await?;
        let session_id = self.sessions.create_session_at(user.id, now).await?;

        Ok(LoginOutput {
            user_id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            session_id,
        })
    }

    /// Record the failure event and fire side effects for a rejected
    /// login.
    async fn reject(
        &self,
        err: &AuthError,
        input: &LoginInput,
        context: EventContext,
        now: DateTime<Utc>,
    ) {
        let ip = input.ip_address.as_deref();
        let (kind, context) = match err {
            AuthError::MissingCredentials => {
                (SecurityEventKind::LoginAttemptMissingCredentials, context)
            }
            AuthError::RateLimited { locked_until } => {
                let minutes = (*locked_until - now).num_minutes().max(0);
                (
                    SecurityEventKind::RateLimitExceeded,
                    context.lockout_minutes(minutes),
                )
            }
            AuthError::UserNotFound => (SecurityEventKind::LoginAttemptUserNotFound, context),
            AuthError::InvalidPassword => {
                self.notifier
                    .suspicious_activity(&input.identifier, ip, "invalid password");
                (SecurityEventKind::LoginAttemptInvalidPassword, context)
            }
            AuthError::SecondFactorRequired => {
                (SecurityEventKind::LoginAttemptSecondFactorRequired, context)
            }
            AuthError::InvalidSecondFactor => {
                self.notifier
                    .suspicious_activity(&input.identifier, ip, "invalid second factor");
                (SecurityEventKind::LoginAttemptInvalidSecondFactor, context)
            }
            other => {
                error!(error = %other, "login failed with an internal error");
                (
                    SecurityEventKind::LoginError,
                    context.reason(other.to_string()),
                )
            }
        };
        debug!(event = kind.as_str(), "login rejected");
        self.events.record(kind, context).await;
    }

    /// End a session. Unknown sessions are not an error.
    pub async fn sign_out(&self, session_id: &str, ip: Option<&str>) -> Result<(), AuthError> {
        let mut context = EventContext::new().ip(ip);
        match self.sessions.live_session_at(session_id, Utc::now()).await {
            Ok(session) => context = context.user_id(session.user_id),
            Err(AuthError::SessionNotFound) => debug!("sign-out without a live session"),
            Err(e) => return Err(e),
        }
        self.sessions.delete_session(session_id).await?;

        self.events
            .record(SecurityEventKind::UserSignout, context)
            .await;
        Ok(())
    }

    /// Sign a session token for a completed login.
    pub fn issue_token_for(&self, login: &LoginOutput) -> Result<String, AuthError> {
        token::issue_session_token(
            login.user_id,
            &login.email,
            login.role,
            &login.session_id,
            &self.config,
        )
    }

    /// Sign a session token and record the sign-in.
    ///
    /// If signing fails the session opened by the login is deleted, so a
    /// failed sign-in leaves nothing behind.
    pub async fn issue_token(
        &self,
        login: &LoginOutput,
        ip: Option<&str>,
    ) -> Result<String, AuthError> {
        let token = match self.issue_token_for(login) {
            Ok(token) => token,
            Err(err) => {
                error!(error = %err, user_id = %login.user_id, "session token could not be signed");
                if let Err(cleanup) = self.sessions.delete_session(&login.session_id).await {
                    error!(error = %cleanup, "orphaned session could not be deleted");
                }
                return Err(err);
            }
        };
        self.events
            .record(
                SecurityEventKind::UserSignin,
                EventContext::new()
                    .email(login.email.as_str())
                    .ip(ip)
                    .user(login.user_id, login.role),
            )
            .await;
        Ok(token)
    }

    /// Validate a session token and slide its session forward.
    ///
    /// A token whose session has gone is still accepted; only the
    /// signature and expiry are binding.
    pub async fn authenticate(&self, token: &str) -> Result<SessionTokenClaims, AuthError> {
        let claims = token::decode_session_token(token, &self.config)?;
        self.sessions.refresh_session(&claims.sid).await?;
        Ok(claims)
    }

    /// Email a one-time login code to the identity.
    ///
    /// Counts against the identity rate limit. Unknown identities get
    /// the same `Ok(())` as known ones.
    pub async fn request_email_code(
        &self,
        identifier: &str,
        ip: Option<&str>,
    ) -> Result<(), AuthError> {
        self.request_email_code_at(identifier, ip, Utc::now()).await
    }

    pub async fn request_email_code_at(
        &self,
        identifier: &str,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        if identifier.trim().is_empty() {
            return Err(AuthError::MissingField("email"));
        }
        let context = EventContext::new().email(identifier).ip(ip);

        let decision = self.gate.identity().check_at(identifier, now).await?;
        if !decision.allowed {
            let locked_until = decision.locked_until.unwrap_or(now);
            self.events
                .record(
                    SecurityEventKind::RateLimitExceeded,
                    context.lockout_minutes((locked_until - now).num_minutes().max(0)),
                )
                .await;
            return Err(AuthError::RateLimited { locked_until });
        }

        let user = match self.users.get_by_email(identifier).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                debug!("login code requested for unknown identity");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let code = verifier::generate_email_code();
        self.users
            .update(
                user.id,
                UpdateUser {
                    email_code: Some(Some(EmailCode {
                        code: code.clone(),
                        expires_at: now + self.config.email_code_lifetime(),
                    })),
                    ..Default::default()
                },
            )
            .await?;

        self.notifier.login_code(&user.email, &code);
        self.events
            .record(
                SecurityEventKind::EmailCodeIssued,
                context.user(user.id, user.role),
            )
            .await;
        Ok(())
    }

    pub(crate) async fn load_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        Ok(self.users.get_by_id(user_id).await?)
    }
}
