// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token issuing and verification.

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde_json::Value;

use super::claims::{JwtPayload, JwtTokens, TokenClaims, TokenKind};
use super::error::{TokenError, TokenVerificationError};
use crate::config::JwtConfig;

/// Creates and verifies access/refresh token pairs.
pub trait TokenManager: Send + Sync {
    fn create_tokens(&self, payload: &JwtPayload) -> Result<JwtTokens, TokenError>;

    /// Verify signature, time claims, payload shape and token kind, in that
    /// order.
    fn verify_token(
        &self,
        raw_token: &str,
        expected: TokenKind,
    ) -> Result<JwtPayload, TokenVerificationError>;
}

/// [`TokenManager`] backed by the `jsonwebtoken` crate.
pub struct JsonWebTokenManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

fn load_keys(config: &JwtConfig) -> Result<(EncodingKey, DecodingKey), jsonwebtoken::errors::Error> {
    let private = config.private_key.as_bytes();
    let public = config.public_key.as_bytes();

    match config.algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok((
            EncodingKey::from_secret(private),
            DecodingKey::from_secret(public),
        )),
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => Ok((
            EncodingKey::from_rsa_pem(private)?,
            DecodingKey::from_rsa_pem(public)?,
        )),
        Algorithm::ES256 | Algorithm::ES384 => Ok((
            EncodingKey::from_ec_pem(private)?,
            DecodingKey::from_ec_pem(public)?,
        )),
        Algorithm::EdDSA => Ok((
            EncodingKey::from_ed_pem(private)?,
            DecodingKey::from_ed_pem(public)?,
        )),
    }
}

/// Check the decoded claims have the shape this service issues and return
/// the token kind with its payload.
fn verify_payload(claims: &Value) -> Option<(TokenKind, JwtPayload)> {
    let claims = claims.as_object()?;
    let kind = TokenKind::parse(claims.get("tokenType")?.as_str()?)?;
    let payload = claims.get("payload")?.as_object()?;

    let user_id = payload.get("userId")?.as_str()?.to_string();
    let employee_id = match payload.get("employeeId") {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) => Some(id.clone()),
        Some(_) => return None,
    };

    Some((kind, JwtPayload { user_id, employee_id }))
}

impl JsonWebTokenManager {
    pub fn new(config: JwtConfig) -> Result<Self, TokenError> {
        let (encoding_key, decoding_key) = load_keys(&config).map_err(TokenError::Key)?;

        let mut validation = Validation::new(config.algorithm);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.validate_aud = false;

        Ok(Self {
            config,
            encoding_key,
            decoding_key,
            validation,
        })
    }

    fn sign(&self, kind: TokenKind, payload: &JwtPayload) -> Result<String, TokenError> {
        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        let ttl_ms = self.config.expires_in(kind).as_millis() as u64;

        let claims = TokenClaims {
            token_type: kind,
            payload: payload.clone(),
            iat: now_ms / 1000,
            exp: now_ms.saturating_add(ttl_ms) / 1000,
            nbf: None,
        };

        encode(&Header::new(self.config.algorithm), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)
    }
}

impl TokenManager for JsonWebTokenManager {
    fn create_tokens(&self, payload: &JwtPayload) -> Result<JwtTokens, TokenError> {
        Ok(JwtTokens {
            access_token: self.sign(TokenKind::Access, payload)?,
            refresh_token: self.sign(TokenKind::Refresh, payload)?,
        })
    }

    fn verify_token(
        &self,
        raw_token: &str,
        expected: TokenKind,
    ) -> Result<JwtPayload, TokenVerificationError> {
        let data = decode::<Value>(raw_token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenVerificationError::Expired,
                ErrorKind::ImmatureSignature => TokenVerificationError::NotYetValid,
                _ => TokenVerificationError::Malformed,
            },
        )?;

        let (given, payload) =
            verify_payload(&data.claims).ok_or(TokenVerificationError::InvalidPayload)?;

        if given != expected {
            return Err(TokenVerificationError::WrongKind { given, expected });
        }
        Ok(payload)
    }
}
