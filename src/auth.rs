//! Authentication: API keys, config from env, dev bypass.
//!
//! When `DISABLE_AUTH=true` or `API_KEYS` is unset, all requests are accepted as an admin
//! (local development). Otherwise, validate `Authorization: Bearer <key>` or
//! `X-API-Key: <key>` and look up the key in `API_KEYS` (format: `key1:role1,key2:role2`;
//! roles: patient, donor, center, admin). Audit events name the caller by role and key
//! fingerprint, never by the key itself.

use axum::{
    body::Body,
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Hex characters of the SHA-256 digest kept in a key fingerprint.
const FINGERPRINT_LEN: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Patient,
    Donor,
    Center,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Some(Role::Patient),
            "donor" => Some(Role::Donor),
            "center" => Some(Role::Center),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Donor => "donor",
            Role::Center => "center",
            Role::Admin => "admin",
        }
    }
}

/// Short, non-reversible identifier for an API key: `key-` plus a SHA-256 hex prefix.
pub fn key_fingerprint(key: &str) -> String {
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    format!("key-{}", &digest[..FINGERPRINT_LEN])
}

/// Authenticated caller (key fingerprint + role). Injected by the auth middleware.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub key_fingerprint: Option<String>,
    pub role: Role,
}

impl AuthUser {
    /// Dev-bypass user when auth is disabled.
    pub fn anonymous_admin() -> Self {
        Self {
            key_fingerprint: None,
            role: Role::Admin,
        }
    }

    /// Caller authenticated with `key`. Only the key's fingerprint is kept.
    pub fn from_key(key: &str, role: Role) -> Self {
        Self {
            key_fingerprint: Some(key_fingerprint(key)),
            role,
        }
    }

    /// Actor string for audit events: `role:key-<fingerprint>`, or "anonymous".
    pub fn actor(&self) -> String {
        match &self.key_fingerprint {
            Some(fp) => format!("{}:{}", self.role.as_str(), fp),
            None => "anonymous".into(),
        }
    }
}

/// Returns `Ok(())` if `user.role` is one of `allowed`; otherwise a 403 Response.
/// Admins are always allowed.
pub fn require_role(user: &AuthUser, allowed: &[Role]) -> Result<(), Response> {
    if user.role == Role::Admin || allowed.contains(&user.role) {
        return Ok(());
    }
    Err((
        StatusCode::FORBIDDEN,
        format!("role {:?} not permitted", user.role),
    )
        .into_response())
}

/// Admin-only handlers: `require_admin(&auth)?`.
pub fn require_admin(user: &AuthUser) -> Result<(), Response> {
    require_role(user, &[])
}

/// Auth configuration: disable flag and key → role map. Built from env.
#[derive(Clone)]
pub struct AuthConfig {
    pub disable: bool,
    keys: Arc<HashMap<String, Role>>,
}

fn parse_keys(spec: &str) -> HashMap<String, Role> {
    spec.split(',')
        .filter_map(|part| {
            let mut split = part.trim().splitn(2, ':');
            let key = split.next()?.trim().to_string();
            let role = Role::parse(split.next()?)?;
            if key.is_empty() {
                return None;
            }
            Some((key, role))
        })
        .collect()
}

impl AuthConfig {
    /// Auth disabled: all requests accepted as admin.
    pub fn disabled() -> Self {
        Self {
            disable: true,
            keys: Arc::new(HashMap::new()),
        }
    }

    /// Build from key:role string (e.g. "key1:patient,key2:admin").
    pub fn from_keys(keys: &str) -> Self {
        let map = parse_keys(keys);
        Self {
            disable: map.is_empty(),
            keys: Arc::new(map),
        }
    }

    /// Load from env: `DISABLE_AUTH=true` or unset `API_KEYS` => auth disabled.
    pub fn from_env() -> Self {
        let disable = std::env::var("DISABLE_AUTH")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let keys = std::env::var("API_KEYS")
            .map(|s| parse_keys(&s))
            .unwrap_or_default();
        Self {
            disable: disable || keys.is_empty(),
            keys: Arc::new(keys),
        }
    }

    pub fn lookup(&self, key: &str) -> Option<Role> {
        self.keys.get(key).copied()
    }
}

/// Returns the API key from `Authorization: Bearer <key>` or `X-API-Key: <key>`.
fn get_api_key_from_request(req: &Request) -> Option<String> {
    if let Some(v) = req.headers().get(header::AUTHORIZATION) {
        if let Ok(s) = v.to_str() {
            let s = s.trim();
            if s.get(..7).map(|p| p.eq_ignore_ascii_case("bearer ")).unwrap_or(false) {
                return Some(s.get(7..).unwrap_or("").trim().to_string());
            }
        }
    }
    if let Some(v) = req.headers().get("X-API-Key") {
        if let Ok(s) = v.to_str() {
            return Some(s.trim().to_string());
        }
    }
    None
}

/// Auth middleware: when auth is disabled, injects the anonymous admin and continues.
/// Otherwise requires a valid API key and injects its `AuthUser`; 401 if
/// missing or unknown.
pub async fn require_api_key_or_anonymous(
    mut req: Request<Body>,
    next: Next,
    config: AuthConfig,
) -> Response {
    if config.disable {
        req.extensions_mut().insert(AuthUser::anonymous_admin());
        return next.run(req).await;
    }

    let key = match get_api_key_from_request(&req) {
        Some(k) if !k.is_empty() => k,
        _ => {
            return (StatusCode::UNAUTHORIZED, "missing or invalid Authorization or X-API-Key")
                .into_response();
        }
    };

    match config.lookup(&key) {
        Some(role) => {
            req.extensions_mut().insert(AuthUser::from_key(&key, role));
            next.run(req).await
        }
        None => (StatusCode::UNAUTHORIZED, "invalid API key").into_response(),
    }
}
