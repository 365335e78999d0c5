//! Token payload and wire form.
//!
//! Wire form: `base64url(payload-json) "." base64url(signature)` with
//! no padding, where the signature is HMAC-SHA256 over the
//! base64url-encoded payload bytes. Any structural deviation verifies
//! as an invalid signature.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{CapabilityError, CapabilityResult};
use crate::secret::LedgerSecret;

type HmacSha256 = Hmac<Sha256>;

/// Context constraints carried inside a token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenContext {
    /// The task the token is bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Tools the token may be used for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    /// Servers the token may be used against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_servers: Option<Vec<String>>,
}

impl TokenContext {
    /// Whether no constraint is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.task_id.is_none() && self.allowed_tools.is_none() && self.allowed_servers.is_none()
    }

    /// Merge a child context over this one; child fields win on
    /// conflict.
    #[must_use]
    pub fn merged_with(&self, child: &Self) -> Self {
        Self {
            task_id: child.task_id.clone().or_else(|| self.task_id.clone()),
            allowed_tools: child
                .allowed_tools
                .clone()
                .or_else(|| self.allowed_tools.clone()),
            allowed_servers: child
                .allowed_servers
                .clone()
                .or_else(|| self.allowed_servers.clone()),
        }
    }
}

/// The signed token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    /// Issuer (skill id).
    pub iss: String,
    /// Subject (agent identity).
    pub sub: String,
    /// Scope in `type:level` form.
    pub scope: String,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Not-before, seconds since epoch.
    pub nbf: i64,
    /// Expiry, seconds since epoch.
    pub exp: i64,
    /// Random 128-bit token id, hex.
    pub jti: String,
    /// Remaining use budget, when bounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses_left: Option<u32>,
    /// The parent token this one was attenuated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_jti: Option<String>,
    /// Whether further attenuation is permitted.
    #[serde(default = "default_attenuation_allowed")]
    pub attenuation_allowed: bool,
    /// Optional context constraints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<TokenContext>,
}

fn default_attenuation_allowed() -> bool {
    true
}

/// Sign a payload into its wire form.
///
/// # Errors
///
/// Returns a serialization error when the payload cannot be encoded.
pub fn encode_token(payload: &TokenPayload, secret: &LedgerSecret) -> CapabilityResult<String> {
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload)?);
    let signature = sign(payload_b64.as_bytes(), secret);
    let signature_b64 = URL_SAFE_NO_PAD.encode(signature);
    Ok(format!("{payload_b64}.{signature_b64}"))
}

/// Verify a wire token's signature and decode its payload.
///
/// Time bounds, revocation, and scope are the ledger's concern; this
/// checks only structure and signature.
///
/// # Errors
///
/// Returns [`CapabilityError::InvalidSignature`] for any structural or
/// cryptographic deviation.
pub fn decode_token(wire: &str, secret: &LedgerSecret) -> CapabilityResult<TokenPayload> {
    let Some((payload_b64, signature_b64)) = wire.split_once('.') else {
        return Err(CapabilityError::InvalidSignature);
    };
    let presented = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| CapabilityError::InvalidSignature)?;
    let expected = sign(payload_b64.as_bytes(), secret);
    if expected.ct_eq(&presented).unwrap_u8() != 1 {
        return Err(CapabilityError::InvalidSignature);
    }
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| CapabilityError::InvalidSignature)?;
    serde_json::from_slice(&payload_bytes).map_err(|_| CapabilityError::InvalidSignature)
}

fn sign(data: &[u8], secret: &LedgerSecret) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> TokenPayload {
        TokenPayload {
            iss: "deploy".to_string(),
            sub: "agent-1".to_string(),
            scope: "db:admin".to_string(),
            iat: 1_700_000_000,
            nbf: 1_700_000_000,
            exp: 1_700_000_300,
            jti: "00112233445566778899aabbccddeeff".to_string(),
            uses_left: Some(10),
            parent_jti: None,
            attenuation_allowed: true,
            context: None,
        }
    }

    #[test]
    fn test_round_trip() {
        let secret = LedgerSecret::generate();
        let wire = encode_token(&payload(), &secret).unwrap();
        let decoded = decode_token(&wire, &secret).unwrap();
        assert_eq!(decoded.jti, payload().jti);
        assert_eq!(decoded.scope, "db:admin");
        assert_eq!(decoded.uses_left, Some(10));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let wire = encode_token(&payload(), &LedgerSecret::generate()).unwrap();
        assert!(matches!(
            decode_token(&wire, &LedgerSecret::generate()),
            Err(CapabilityError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let secret = LedgerSecret::generate();
        let wire = encode_token(&payload(), &secret).unwrap();
        let (_, signature) = wire.split_once('.').unwrap();

        let mut forged = payload();
        forged.scope = "db:read-only".to_string();
        let forged_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let forged_wire = format!("{forged_b64}.{signature}");
        assert!(matches!(
            decode_token(&forged_wire, &secret),
            Err(CapabilityError::InvalidSignature)
        ));
    }

    #[test]
    fn test_structural_deviation_rejected() {
        let secret = LedgerSecret::generate();
        assert!(decode_token("nodot", &secret).is_err());
        assert!(decode_token("a.b.c", &secret).is_err());
        assert!(decode_token("!!!.###", &secret).is_err());
        assert!(decode_token("", &secret).is_err());
    }

    #[test]
    fn test_attenuation_allowed_defaults_true() {
        let json = serde_json::json!({
            "iss": "s", "sub": "a", "scope": "db:write",
            "iat": 0, "nbf": 0, "exp": 1, "jti": "x"
        });
        let parsed: TokenPayload = serde_json::from_value(json).unwrap();
        assert!(parsed.attenuation_allowed);
    }

    #[test]
    fn test_context_merge_child_overrides() {
        let parent = TokenContext {
            task_id: Some("t-1".to_string()),
            allowed_tools: Some(vec!["db__query".to_string()]),
            allowed_servers: None,
        };
        let child = TokenContext {
            task_id: Some("t-2".to_string()),
            allowed_tools: None,
            allowed_servers: Some(vec!["db".to_string()]),
        };
        let merged = parent.merged_with(&child);
        assert_eq!(merged.task_id.as_deref(), Some("t-2"));
        assert_eq!(merged.allowed_tools.unwrap(), vec!["db__query"]);
        assert_eq!(merged.allowed_servers.unwrap(), vec!["db"]);
    }
}
