// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication middleware for the gateway.
//!
//! Supports two auth methods (checked in order):
//! 1. Bearer token (`Authorization: Bearer <token>`)
//! 2. Webhook signature (`X-Signature`: hex HMAC-SHA256 of the raw body)
//!
//! When no auth method is configured, all requests are rejected (fail-closed).

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Largest request body the signature check buffers.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

type HmacSha256 = Hmac<Sha256>;

/// Authentication configuration for the gateway.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Expected bearer token. If `Some`, bearer auth is enabled.
    pub bearer_token: Option<String>,
    /// Shared secret for webhook signatures. If `Some`, signature auth is enabled.
    pub webhook_secret: Option<String>,
}

impl AuthConfig {
    pub fn is_configured(&self) -> bool {
        self.bearer_token.is_some() || self.webhook_secret.is_some()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks a hex signature in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Middleware that validates authentication via bearer token or webhook signature.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if !auth.is_configured() {
        tracing::error!("gateway has no auth configured -- rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    }

    // Priority 1: bearer token.
    if let Some(ref expected_token) = auth.bearer_token {
        let token = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if token == Some(expected_token.as_str()) {
            return Ok(next.run(request).await);
        }
    }

    // Priority 2: body signature. The body is buffered and handed on intact.
    if let Some(ref secret) = auth.webhook_secret {
        let signature = request
            .headers()
            .get("x-signature")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(signature) = signature {
            let (parts, body) = request.into_parts();
            let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
                .await
                .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;
            if verify_signature(secret, &bytes, &signature) {
                return Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await);
            }
            tracing::debug!("webhook signature mismatch");
        }
    }

    Err(StatusCode::UNAUTHORIZED)
}
