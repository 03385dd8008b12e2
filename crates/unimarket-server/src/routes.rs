//! HTTP routes for the authentication flows.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Extension};
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;
use unimarket_auth::{AuthError, AuthService, LoginInput, SessionTokenClaims, SignupInput};
use unimarket_core::models::user::UserRole;
use unimarket_store::repository::{
    InMemoryRateLimitRepository, InMemorySecurityEventRepository, InMemorySessionRepository,
    InMemoryUserRepository,
};
use uuid::Uuid;

use crate::error::ApiError;

pub type Auth = AuthService<
    InMemoryUserRepository,
    InMemorySessionRepository,
    InMemoryRateLimitRepository,
    InMemorySecurityEventRepository,
>;

const SESSION_COOKIE_NAME: &str = "unimarket_session";

/// Peers whose `X-Forwarded-For` is believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies(Arc<Vec<IpAddr>>);

impl TrustedProxies {
    pub fn new(proxies: Vec<IpAddr>) -> Self {
        Self(Arc::new(proxies))
    }

    fn contains(&self, ip: &IpAddr) -> bool {
        self.0.contains(ip)
    }
}

pub fn router(auth: Arc<Auth>, proxies: TrustedProxies) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/signup", post(signup))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/login", post(login))
        .route("/auth/email-code", post(request_email_code))
        .route("/auth/session", get(session))
        .route("/auth/logout", post(logout))
        .route("/auth/password", post(change_password))
        .route("/auth/2fa/totp/start", post(totp_start))
        .route("/auth/2fa/totp/finish", post(totp_finish))
        .route("/auth/2fa", delete(disable_two_factor))
        .layer(Extension(auth))
        .layer(Extension(proxies))
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub totp_code: Option<String>,
    pub email_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailCodeRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct TotpFinishRequest {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotpStartResponse {
    pub secret: String,
    pub otpauth_uri: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> &'static str {
    "ok"
}

async fn signup(
    Extension(auth): Extension<Arc<Auth>>,
    Json(body): Json<SignupRequest>,
) -> Result<Response, ApiError> {
    let user = auth
        .signup(SignupInput {
            name: body.name,
            email: body.email,
            password: body.password,
        })
        .await?;
    let response = UserResponse {
        id: user.id,
        name: user.name,
        email: user.email,
        role: user.role,
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

async fn verify_email(
    Extension(auth): Extension<Arc<Auth>>,
    Json(body): Json<VerifyEmailRequest>,
) -> Result<StatusCode, ApiError> {
    auth.verify_email(&body.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn login(
    Extension(auth): Extension<Arc<Auth>>,
    Extension(proxies): Extension<TrustedProxies>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let ip = client_ip(&headers, connect_info.as_ref(), &proxies);
    let output = auth
        .login(LoginInput {
            identifier: body.email,
            secret: body.password,
            totp_code: body.totp_code,
            email_code: body.email_code,
            ip_address: ip.clone(),
        })
        .await?;
    let token = auth.issue_token(&output, ip.as_deref()).await?;

    let mut response_headers = HeaderMap::new();
    match session_cookie(&token, auth.config().token_lifetime_secs) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => warn!("failed to build session cookie: {err}"),
    }

    let response = LoginResponse {
        token,
        user: UserResponse {
            id: output.user_id,
            name: output.name,
            email: output.email,
            role: output.role,
        },
    };
    Ok((StatusCode::OK, response_headers, Json(response)).into_response())
}

async fn request_email_code(
    Extension(auth): Extension<Arc<Auth>>,
    Extension(proxies): Extension<TrustedProxies>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<EmailCodeRequest>,
) -> Result<StatusCode, ApiError> {
    let ip = client_ip(&headers, connect_info.as_ref(), &proxies);
    auth.request_email_code(&body.email, ip.as_deref()).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn session(
    Extension(auth): Extension<Arc<Auth>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    // No token means no session; nothing to reject.
    let Some(token) = extract_token(&headers) else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    let claims = auth.authenticate(&token).await?;
    let response = SessionResponse {
        user_id: claims.user_id()?,
        email: claims.email,
        role: claims.role,
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

async fn logout(
    Extension(auth): Extension<Arc<Auth>>,
    Extension(proxies): Extension<TrustedProxies>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let ip = client_ip(&headers, connect_info.as_ref(), &proxies);
    if let Some(token) = extract_token(&headers) {
        match unimarket_auth::token::decode_session_token(&token, auth.config()) {
            Ok(claims) => auth.sign_out(&claims.sid, ip.as_deref()).await?,
            Err(err) => warn!("logout with unusable token: {err}"),
        }
    }

    // Always clear the cookie, even if the session was already gone.
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, clear_session_cookie());
    Ok((StatusCode::NO_CONTENT, response_headers).into_response())
}

async fn change_password(
    Extension(auth): Extension<Arc<Auth>>,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let claims = require_claims(&auth, &headers).await?;
    auth.change_password(claims.user_id()?, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn totp_start(
    Extension(auth): Extension<Arc<Auth>>,
    headers: HeaderMap,
) -> Result<Json<TotpStartResponse>, ApiError> {
    let claims = require_claims(&auth, &headers).await?;
    let setup = auth.begin_totp_enrollment(claims.user_id()?).await?;
    Ok(Json(TotpStartResponse {
        secret: setup.secret,
        otpauth_uri: setup.otpauth_uri,
    }))
}

async fn totp_finish(
    Extension(auth): Extension<Arc<Auth>>,
    headers: HeaderMap,
    Json(body): Json<TotpFinishRequest>,
) -> Result<StatusCode, ApiError> {
    let claims = require_claims(&auth, &headers).await?;
    auth.confirm_totp_enrollment(claims.user_id()?, &body.code)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn disable_two_factor(
    Extension(auth): Extension<Arc<Auth>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let claims = require_claims(&auth, &headers).await?;
    auth.disable_two_factor(claims.user_id()?).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn require_claims(
    auth: &Auth,
    headers: &HeaderMap,
) -> Result<SessionTokenClaims, ApiError> {
    let token =
        extract_token(headers).ok_or_else(|| AuthError::TokenInvalid("missing token".into()))?;
    Ok(auth.authenticate(&token).await?)
}

/// Bearer header first, then the session cookie.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(bearer) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(bearer.trim().to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// The address the rate limiter keys on.
///
/// The socket peer is the client unless it is a trusted proxy. Behind
/// trusted proxies the client is the right-most `X-Forwarded-For` hop that
/// is not itself a trusted proxy; hops further left were written by the
/// client and are ignored.
fn client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    proxies: &TrustedProxies,
) -> Option<String> {
    let peer = connect_info.map(|ConnectInfo(addr)| addr.ip())?;
    if !proxies.contains(&peer) {
        return Some(peer.to_string());
    }

    let mut client = peer;
    let hops = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .collect::<Vec<_>>();
    for hop in hops.into_iter().rev() {
        match hop.parse::<IpAddr>() {
            Ok(ip) if proxies.contains(&ip) => client = ip,
            Ok(ip) => return Some(ip.to_string()),
            Err(_) => break,
        }
    }
    Some(client.to_string())
}

fn session_cookie(
    token: &str,
    max_age_secs: u64,
) -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}"
    ))
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("unimarket_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}
