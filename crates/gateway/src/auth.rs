//! Principal Resolver (C1) — verifies the bearer credential and produces
//! a [`Principal`] (`spec.md` §4.1).
//!
//! The credential is a compact HMAC-signed token, not a shared static
//! secret (contrast the teacher's single-token `api/auth.rs` comparison):
//! `user_id|tier|email_verified|is_admin|exp_unix.signature`, where
//! `signature` is the hex-encoded HMAC-SHA256 of the payload under the
//! `SECRET_KEY`-derived signing key. Verification is O(1) — one HMAC
//! computation and a constant-time comparison, no I/O.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use cg_domain::error::{Error, Result};
use cg_domain::model::{Principal, Tier};

use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

const COOKIE_NAME: &str = "cg_session";

/// Mint a signed token. Used by the `cg-gateway token` CLI subcommand to
/// issue test/operator credentials — there is no interactive login flow
/// in scope (`spec.md` §1 Non-goals).
pub fn sign_token(
    secret: &[u8],
    user_id: &str,
    tier: Tier,
    email_verified: bool,
    is_admin: bool,
    ttl_secs: i64,
) -> String {
    let exp = chrono::Utc::now().timestamp() + ttl_secs;
    let payload = format!(
        "{user_id}|{tier}|{}|{}|{exp}",
        email_verified as u8, is_admin as u8
    );
    let signature = hmac_hex(secret, payload.as_bytes());
    format!("{payload}.{signature}")
}

/// Resolve the bearer credential from the `Authorization` header, falling
/// back to the `cg_session` cookie, and verify it into a [`Principal`].
pub fn resolve_principal(secret: &[u8], headers: &HeaderMap) -> Result<Principal> {
    let token = extract_token(headers).ok_or(Error::Unauthorized)?;
    verify_token(secret, &token)
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        let s = value.to_str().ok()?;
        if let Some(tok) = s.strip_prefix("Bearer ") {
            return Some(tok.to_string());
        }
    }
    if let Some(value) = headers.get(axum::http::header::COOKIE) {
        let s = value.to_str().ok()?;
        for part in s.split(';') {
            let part = part.trim();
            if let Some(tok) = part.strip_prefix(&format!("{COOKIE_NAME}=")) {
                return Some(tok.to_string());
            }
        }
    }
    None
}

fn verify_token(secret: &[u8], token: &str) -> Result<Principal> {
    let (payload, signature) = token.rsplit_once('.').ok_or(Error::InvalidToken)?;
    let expected = hmac_hex(secret, payload.as_bytes());
    if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
        return Err(Error::InvalidToken);
    }

    let mut fields = payload.split('|');
    let user_id = fields.next().ok_or(Error::InvalidToken)?;
    let tier = fields
        .next()
        .and_then(|s| s.parse::<Tier>().ok())
        .ok_or(Error::InvalidToken)?;
    let email_verified = fields.next().ok_or(Error::InvalidToken)? == "1";
    let is_admin = fields.next().ok_or(Error::InvalidToken)? == "1";
    let exp: i64 = fields
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::InvalidToken)?;
    if fields.next().is_some() {
        return Err(Error::InvalidToken);
    }

    if chrono::Utc::now().timestamp() >= exp {
        return Err(Error::Expired);
    }

    Ok(Principal {
        user_id: user_id.to_string(),
        tier,
        email_verified,
        is_admin,
    })
}

fn hmac_hex(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Lets handlers take `principal: Principal` directly as an extractor
/// argument instead of threading it through a middleware layer — every
/// protected route needs the resolved identity for tier/ownership
/// decisions anyway, so there's no separate "apply auth" layer here
/// (contrast the teacher's blanket `route_layer` over a static token).
#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = crate::api::error::ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        resolve_principal(&state.secret_key, &parts.headers).map_err(crate::api::error::ApiError)
    }
}

/// Admin-plane guard (`spec.md` §6.1 `/api/admin/*`): a static bearer
/// token read once at startup, same SHA-256 + constant-time pattern as
/// the teacher's `AdminGuard`. Independent of the signed `Principal`
/// token — an operator token is not a user tier credential.
pub struct AdminGuard;

#[async_trait]
impl FromRequestParts<AppState> for AdminGuard {
    type Rejection = crate::api::error::ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let expected = match state.admin_token.as_ref() {
            Some(t) => t,
            None => return Err(crate::api::error::ApiError(Error::Unauthorized)),
        };
        let expected_hash = Sha256::digest(expected.as_bytes());

        let provided = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or("");
        let provided_hash = Sha256::digest(provided.as_bytes());

        if !bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
            return Err(crate::api::error::ApiError(Error::Unauthorized));
        }
        Ok(AdminGuard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-signing-key-at-least-32-bytes-long!";

    #[test]
    fn round_trips_a_valid_token() {
        let token = sign_token(SECRET, "u1", Tier::Pro, true, false, 3600);
        let principal = verify_token(SECRET, &token).unwrap();
        assert_eq!(principal.user_id, "u1");
        assert_eq!(principal.tier, Tier::Pro);
        assert!(principal.email_verified);
        assert!(!principal.is_admin);
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = sign_token(SECRET, "u1", Tier::Free, false, false, -1);
        assert!(matches!(verify_token(SECRET, &token), Err(Error::Expired)));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let token = sign_token(SECRET, "u1", Tier::Free, false, false, 3600);
        let tampered = token.replacen("u1", "u2", 1);
        assert!(matches!(verify_token(SECRET, &tampered), Err(Error::InvalidToken)));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let token = sign_token(SECRET, "u1", Tier::Free, false, false, 3600);
        assert!(matches!(verify_token(b"a-completely-different-key!!", &token), Err(Error::InvalidToken)));
    }

    #[test]
    fn missing_bearer_header_is_unauthorized() {
        let headers = HeaderMap::new();
        assert!(matches!(resolve_principal(SECRET, &headers), Err(Error::Unauthorized)));
    }

    #[test]
    fn extracts_token_from_cookie_when_header_absent() {
        let token = sign_token(SECRET, "u1", Tier::Basic, true, false, 3600);
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            format!("other=1; {COOKIE_NAME}={token}").parse().unwrap(),
        );
        let principal = resolve_principal(SECRET, &headers).unwrap();
        assert_eq!(principal.user_id, "u1");
    }

    #[test]
    fn malformed_token_is_invalid_not_a_panic() {
        let headers_token = "not-a-valid-token-at-all";
        assert!(matches!(verify_token(SECRET, headers_token), Err(Error::InvalidToken)));
    }
}
