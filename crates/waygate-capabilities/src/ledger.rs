//! The capability ledger: issuance, verification, attenuation,
//! revocation, and cleanup.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rand::RngCore;
use tracing::debug;

use crate::error::{CapabilityError, CapabilityResult};
use crate::scope::Scope;
use crate::secret::LedgerSecret;
use crate::token::{TokenContext, TokenPayload, decode_token, encode_token};

/// Default token lifetime in seconds.
const DEFAULT_TTL_SECS: i64 = 300;

/// Tracked tokens older than this are eligible for cleanup once
/// exhausted or revoked.
const CLEANUP_AGE_SECS: i64 = 24 * 60 * 60;

/// Default bound on the tracked-token table.
const DEFAULT_MAX_TRACKED: usize = 10_000;

/// A request to mint a fresh token.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// Issuer (skill id).
    pub issuer: String,
    /// Subject (agent identity).
    pub subject: String,
    /// Scope to grant.
    pub scope: Scope,
    /// Lifetime in seconds; the default is five minutes.
    pub expires_in: Option<i64>,
    /// Bounded use budget.
    pub max_uses: Option<u32>,
    /// Whether the holder may attenuate further.
    pub attenuation_allowed: bool,
    /// Context constraints.
    pub context: Option<TokenContext>,
}

impl IssueRequest {
    /// A minimal request with defaults (five minutes, unbounded uses,
    /// attenuable).
    #[must_use]
    pub fn new(issuer: impl Into<String>, subject: impl Into<String>, scope: Scope) -> Self {
        Self {
            issuer: issuer.into(),
            subject: subject.into(),
            scope,
            expires_in: None,
            max_uses: None,
            attenuation_allowed: true,
            context: None,
        }
    }
}

/// A request to attenuate an existing token.
#[derive(Debug, Clone)]
pub struct AttenuateRequest {
    /// The narrower scope; must be a subset of the parent's.
    pub scope: Scope,
    /// Lifetime in seconds; clamped so the child never outlives the
    /// parent.
    pub expires_in: Option<i64>,
    /// Use budget; clamped to the parent's remaining budget.
    pub uses: Option<u32>,
    /// Whether the child may be attenuated again.
    pub attenuation_allowed: bool,
    /// Context constraints; merged over the parent's, child wins.
    pub context: Option<TokenContext>,
}

impl AttenuateRequest {
    /// A minimal attenuation to a scope.
    #[must_use]
    pub fn to_scope(scope: Scope) -> Self {
        Self {
            scope,
            expires_in: None,
            uses: None,
            attenuation_allowed: true,
            context: None,
        }
    }
}

/// The call site a token is being presented at.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// The task id of the current call.
    pub task_id: Option<String>,
    /// The fully-qualified tool being called.
    pub tool_name: Option<String>,
    /// The server being targeted.
    pub server_name: Option<String>,
}

#[derive(Debug, Clone)]
struct TrackedToken {
    uses_remaining: Option<u32>,
    revoked: bool,
    issued_at: DateTime<Utc>,
}

/// Issues and verifies signed capability tokens.
pub struct CapabilityLedger {
    secret: LedgerSecret,
    tracked: RwLock<HashMap<String, TrackedToken>>,
    max_tracked: usize,
}

impl CapabilityLedger {
    /// Create a ledger with the given secret.
    #[must_use]
    pub fn new(secret: LedgerSecret) -> Self {
        Self {
            secret,
            tracked: RwLock::new(HashMap::new()),
            max_tracked: DEFAULT_MAX_TRACKED,
        }
    }

    /// Create a ledger with a freshly generated secret.
    #[must_use]
    pub fn with_generated_secret() -> Self {
        Self::new(LedgerSecret::generate())
    }

    /// Override the tracked-table bound.
    #[must_use]
    pub fn with_max_tracked(mut self, max: usize) -> Self {
        self.max_tracked = max;
        self
    }

    /// Issue a token now.
    ///
    /// # Errors
    ///
    /// Returns a serialization error when the payload cannot be
    /// encoded.
    pub fn issue(&self, request: &IssueRequest) -> CapabilityResult<String> {
        self.issue_at(request, Utc::now())
    }

    /// Issue a token with an explicit clock (tests).
    ///
    /// # Errors
    ///
    /// Returns a serialization error when the payload cannot be
    /// encoded.
    pub fn issue_at(&self, request: &IssueRequest, now: DateTime<Utc>) -> CapabilityResult<String> {
        let issued = now.timestamp();
        let ttl = request.expires_in.unwrap_or(DEFAULT_TTL_SECS);
        let payload = TokenPayload {
            iss: request.issuer.clone(),
            sub: request.subject.clone(),
            scope: request.scope.to_string(),
            iat: issued,
            nbf: issued,
            exp: issued.saturating_add(ttl),
            jti: fresh_jti(),
            uses_left: request.max_uses,
            parent_jti: None,
            attenuation_allowed: request.attenuation_allowed,
            context: request.context.clone(),
        };

        if request.max_uses.is_some() {
            self.track(&payload.jti, request.max_uses, now);
        }
        debug!(jti = %payload.jti, scope = %payload.scope, "issued capability token");
        encode_token(&payload, &self.secret)
    }

    /// Attenuate a parent token into a strictly-narrower child.
    ///
    /// # Errors
    ///
    /// Fails when the parent does not verify, forbids attenuation, or
    /// the requested scope is not a subset of the parent's.
    pub fn attenuate(&self, parent_wire: &str, request: &AttenuateRequest) -> CapabilityResult<String> {
        self.attenuate_at(parent_wire, request, Utc::now())
    }

    /// Attenuate with an explicit clock (tests).
    ///
    /// # Errors
    ///
    /// Fails when the parent does not verify, forbids attenuation, or
    /// the requested scope is not a subset of the parent's.
    pub fn attenuate_at(
        &self,
        parent_wire: &str,
        request: &AttenuateRequest,
        now: DateTime<Utc>,
    ) -> CapabilityResult<String> {
        let parent = self.verify_at(parent_wire, None, now)?;
        if !parent.attenuation_allowed {
            return Err(CapabilityError::AttenuationNotAllowed {
                jti: parent.jti.clone(),
            });
        }

        let parent_scope =
            Scope::parse(&parent.scope).ok_or(CapabilityError::InvalidSignature)?;
        if !request.scope.is_subset_of(&parent_scope) {
            return Err(CapabilityError::OutOfScope {
                required: request.scope.to_string(),
                granted: parent.scope.clone(),
            });
        }

        let issued = now.timestamp();
        let ttl = request.expires_in.unwrap_or(DEFAULT_TTL_SECS);
        // The child never outlives the parent.
        let exp = issued.saturating_add(ttl).min(parent.exp);

        let parent_remaining = self.remaining_uses(&parent.jti).or(parent.uses_left);
        let uses_left = match (parent_remaining, request.uses) {
            (Some(parent_uses), Some(requested)) => Some(parent_uses.min(requested)),
            (Some(parent_uses), None) => Some(parent_uses),
            (None, requested) => requested,
        };

        let context = match (&parent.context, &request.context) {
            (Some(parent_ctx), Some(child_ctx)) => Some(parent_ctx.merged_with(child_ctx)),
            (Some(parent_ctx), None) => Some(parent_ctx.clone()),
            (None, child_ctx) => child_ctx.clone(),
        };

        let payload = TokenPayload {
            iss: parent.iss.clone(),
            sub: parent.sub.clone(),
            scope: request.scope.to_string(),
            iat: issued,
            nbf: issued,
            exp,
            jti: fresh_jti(),
            uses_left,
            parent_jti: Some(parent.jti.clone()),
            attenuation_allowed: request.attenuation_allowed,
            context,
        };

        if uses_left.is_some() {
            self.track(&payload.jti, uses_left, now);
        }
        debug!(jti = %payload.jti, parent = %parent.jti, scope = %payload.scope, "attenuated capability token");
        encode_token(&payload, &self.secret)
    }

    /// Verify a token now, optionally against a required scope.
    ///
    /// # Errors
    ///
    /// Returns the specific [`CapabilityError`] for signature, time
    /// bound, revocation, use budget, or scope failures.
    pub fn verify(&self, wire: &str, required: Option<&Scope>) -> CapabilityResult<TokenPayload> {
        self.verify_at(wire, required, Utc::now())
    }

    /// Verify a token with an explicit clock (tests).
    ///
    /// # Errors
    ///
    /// Returns the specific [`CapabilityError`] for signature, time
    /// bound, revocation, use budget, or scope failures.
    pub fn verify_at(
        &self,
        wire: &str,
        required: Option<&Scope>,
        now: DateTime<Utc>,
    ) -> CapabilityResult<TokenPayload> {
        let payload = decode_token(wire, &self.secret)?;
        let ts = now.timestamp();

        if ts < payload.nbf {
            return Err(CapabilityError::NotYetValid {
                jti: payload.jti.clone(),
            });
        }
        if ts >= payload.exp {
            return Err(CapabilityError::Expired {
                jti: payload.jti.clone(),
            });
        }

        if let Ok(tracked) = self.tracked.read() {
            if let Some(entry) = tracked.get(&payload.jti) {
                if entry.revoked {
                    return Err(CapabilityError::Revoked {
                        jti: payload.jti.clone(),
                    });
                }
                if entry.uses_remaining == Some(0) {
                    return Err(CapabilityError::NoUsesRemaining {
                        jti: payload.jti.clone(),
                    });
                }
            }
        }

        if let Some(required) = required {
            let granted =
                Scope::parse(&payload.scope).ok_or(CapabilityError::InvalidSignature)?;
            if !required.is_subset_of(&granted) {
                return Err(CapabilityError::OutOfScope {
                    required: required.to_string(),
                    granted: granted.to_string(),
                });
            }
        }

        Ok(payload)
    }

    /// Verify a token and enforce its context constraints against the
    /// call site.
    ///
    /// # Errors
    ///
    /// Everything [`CapabilityLedger::verify`] returns, plus
    /// [`CapabilityError::ContextMismatch`] when a constraint fails.
    pub fn verify_with_context(
        &self,
        wire: &str,
        required: Option<&Scope>,
        call: &CallContext,
    ) -> CapabilityResult<TokenPayload> {
        self.verify_with_context_at(wire, required, call, Utc::now())
    }

    /// Context-aware verification with an explicit clock (tests).
    ///
    /// # Errors
    ///
    /// Everything [`CapabilityLedger::verify_at`] returns, plus
    /// [`CapabilityError::ContextMismatch`] when a constraint fails.
    pub fn verify_with_context_at(
        &self,
        wire: &str,
        required: Option<&Scope>,
        call: &CallContext,
        now: DateTime<Utc>,
    ) -> CapabilityResult<TokenPayload> {
        let payload = self.verify_at(wire, required, now)?;
        let Some(context) = &payload.context else {
            return Ok(payload);
        };

        if let (Some(bound), Some(actual)) = (&context.task_id, &call.task_id) {
            if bound != actual {
                return Err(CapabilityError::ContextMismatch {
                    reason: format!("token is bound to task {bound}, call is for {actual}"),
                });
            }
        }
        if let (Some(allowed), Some(tool)) = (&context.allowed_tools, &call.tool_name) {
            if !allowed.contains(tool) {
                return Err(CapabilityError::ContextMismatch {
                    reason: format!("tool {tool} is not in the token's allow list"),
                });
            }
        }
        if let (Some(allowed), Some(server)) = (&context.allowed_servers, &call.server_name) {
            if !allowed.contains(server) {
                return Err(CapabilityError::ContextMismatch {
                    reason: format!("server {server} is not in the token's allow list"),
                });
            }
        }
        Ok(payload)
    }

    /// Consume one use of a tracked token.
    ///
    /// Untracked tokens have no use budget and always succeed.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::NoUsesRemaining`] when the budget is
    /// exhausted and [`CapabilityError::Revoked`] for revoked tokens.
    pub fn consume(&self, jti: &str) -> CapabilityResult<()> {
        let Ok(mut tracked) = self.tracked.write() else {
            return Ok(());
        };
        let Some(entry) = tracked.get_mut(jti) else {
            return Ok(());
        };
        if entry.revoked {
            return Err(CapabilityError::Revoked {
                jti: jti.to_string(),
            });
        }
        match entry.uses_remaining {
            Some(0) => Err(CapabilityError::NoUsesRemaining {
                jti: jti.to_string(),
            }),
            Some(n) => {
                entry.uses_remaining = Some(n.saturating_sub(1));
                Ok(())
            },
            None => Ok(()),
        }
    }

    /// Revoke a token by id.
    pub fn revoke(&self, jti: &str) {
        self.revoke_at(jti, Utc::now());
    }

    fn revoke_at(&self, jti: &str, now: DateTime<Utc>) {
        if let Ok(mut tracked) = self.tracked.write() {
            tracked
                .entry(jti.to_string())
                .and_modify(|entry| entry.revoked = true)
                .or_insert(TrackedToken {
                    uses_remaining: None,
                    revoked: true,
                    issued_at: now,
                });
        }
        debug!(jti = %jti, "revoked capability token");
    }

    /// Remaining uses of a tracked token.
    #[must_use]
    pub fn remaining_uses(&self, jti: &str) -> Option<u32> {
        self.tracked
            .read()
            .ok()
            .and_then(|tracked| tracked.get(jti).and_then(|entry| entry.uses_remaining))
    }

    /// Drop tracked entries older than 24 hours that are exhausted or
    /// revoked. Returns how many entries were removed.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now())
    }

    /// Cleanup with an explicit clock (tests).
    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let Ok(mut tracked) = self.tracked.write() else {
            return 0;
        };
        let before = tracked.len();
        tracked.retain(|_, entry| {
            let age = now
                .signed_duration_since(entry.issued_at)
                .num_seconds();
            let spent = entry.revoked || entry.uses_remaining == Some(0);
            !(spent && age > CLEANUP_AGE_SECS)
        });
        before.saturating_sub(tracked.len())
    }

    /// Number of tracked tokens.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracked.read().map(|t| t.len()).unwrap_or(0)
    }

    fn track(&self, jti: &str, uses: Option<u32>, now: DateTime<Utc>) {
        let Ok(mut tracked) = self.tracked.write() else {
            return;
        };
        // Keep the table bounded: evict the oldest entries first.
        while tracked.len() >= self.max_tracked {
            let oldest = tracked
                .iter()
                .min_by_key(|(_, entry)| entry.issued_at)
                .map(|(jti, _)| jti.clone());
            match oldest {
                Some(key) => {
                    tracked.remove(&key);
                },
                None => break,
            }
        }
        tracked.insert(
            jti.to_string(),
            TrackedToken {
                uses_remaining: uses,
                revoked: false,
                issued_at: now,
            },
        );
    }
}

impl std::fmt::Debug for CapabilityLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityLedger")
            .field("tracked", &self.tracked_count())
            .field("max_tracked", &self.max_tracked)
            .finish_non_exhaustive()
    }
}

/// Mint a random 128-bit token id in hex.
fn fresh_jti() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ledger() -> CapabilityLedger {
        CapabilityLedger::with_generated_secret()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    #[test]
    fn test_issue_and_verify() {
        let ledger = ledger();
        let now = at(1_700_000_000);
        let wire = ledger
            .issue_at(
                &IssueRequest::new("deploy", "agent-1", Scope::parse("db:write").unwrap()),
                now,
            )
            .unwrap();

        let payload = ledger.verify_at(&wire, None, now).unwrap();
        assert_eq!(payload.iss, "deploy");
        assert_eq!(payload.exp, now.timestamp().saturating_add(DEFAULT_TTL_SECS));
    }

    #[test]
    fn test_expired_token() {
        let ledger = ledger();
        let now = at(1_700_000_000);
        let wire = ledger
            .issue_at(
                &IssueRequest::new("s", "a", Scope::parse("db:write").unwrap()),
                now,
            )
            .unwrap();
        assert!(matches!(
            ledger.verify_at(&wire, None, at(1_700_000_301)),
            Err(CapabilityError::Expired { .. })
        ));
    }

    #[test]
    fn test_not_yet_valid() {
        let ledger = ledger();
        let now = at(1_700_000_000);
        let wire = ledger
            .issue_at(
                &IssueRequest::new("s", "a", Scope::parse("db:write").unwrap()),
                now,
            )
            .unwrap();
        assert!(matches!(
            ledger.verify_at(&wire, None, at(1_699_999_999)),
            Err(CapabilityError::NotYetValid { .. })
        ));
    }

    #[test]
    fn test_attenuation_chain() {
        // The S4 shape: db:admin/300s/10 uses -> db:read-only/60s/3 uses.
        let ledger = ledger();
        let now = at(1_700_000_000);
        let mut request =
            IssueRequest::new("deploy", "agent-1", Scope::parse("db:admin").unwrap());
        request.max_uses = Some(10);
        let parent = ledger.issue_at(&request, now).unwrap();

        let mut narrow = AttenuateRequest::to_scope(Scope::parse("db:read-only").unwrap());
        narrow.expires_in = Some(60);
        narrow.uses = Some(3);
        let child = ledger.attenuate_at(&parent, &narrow, now).unwrap();

        // Required scope read-only passes; admin fails "not a subset".
        assert!(
            ledger
                .verify_at(&child, Some(&Scope::parse("db:read-only").unwrap()), now)
                .is_ok()
        );
        assert!(matches!(
            ledger.verify_at(&child, Some(&Scope::parse("db:admin").unwrap()), now),
            Err(CapabilityError::OutOfScope { .. })
        ));

        let payload = ledger.verify_at(&child, None, now).unwrap();
        assert_eq!(payload.uses_left, Some(3));
        assert!(payload.parent_jti.is_some());
        assert!(payload.exp <= now.timestamp().saturating_add(60));

        // After three uses the token denies.
        for _ in 0..3 {
            ledger.consume(&payload.jti).unwrap();
        }
        assert!(matches!(
            ledger.consume(&payload.jti),
            Err(CapabilityError::NoUsesRemaining { .. })
        ));
        assert!(matches!(
            ledger.verify_at(&child, None, now),
            Err(CapabilityError::NoUsesRemaining { .. })
        ));
    }

    #[test]
    fn test_attenuation_never_extends_expiry() {
        let ledger = ledger();
        let now = at(1_700_000_000);
        let mut request = IssueRequest::new("s", "a", Scope::parse("db:admin").unwrap());
        request.expires_in = Some(30);
        let parent = ledger.issue_at(&request, now).unwrap();

        let mut wide = AttenuateRequest::to_scope(Scope::parse("db:read-only").unwrap());
        wide.expires_in = Some(3_600);
        let child = ledger.attenuate_at(&parent, &wide, now).unwrap();
        let payload = ledger.verify_at(&child, None, now).unwrap();
        assert_eq!(payload.exp, now.timestamp().saturating_add(30));
    }

    #[test]
    fn test_attenuation_scope_widening_rejected() {
        let ledger = ledger();
        let now = at(1_700_000_000);
        let parent = ledger
            .issue_at(
                &IssueRequest::new("s", "a", Scope::parse("db:read-only").unwrap()),
                now,
            )
            .unwrap();
        assert!(matches!(
            ledger.attenuate_at(
                &parent,
                &AttenuateRequest::to_scope(Scope::parse("db:admin").unwrap()),
                now,
            ),
            Err(CapabilityError::OutOfScope { .. })
        ));
    }

    #[test]
    fn test_attenuation_forbidden() {
        let ledger = ledger();
        let now = at(1_700_000_000);
        let mut request = IssueRequest::new("s", "a", Scope::parse("db:admin").unwrap());
        request.attenuation_allowed = false;
        let parent = ledger.issue_at(&request, now).unwrap();
        assert!(matches!(
            ledger.attenuate_at(
                &parent,
                &AttenuateRequest::to_scope(Scope::parse("db:read-only").unwrap()),
                now,
            ),
            Err(CapabilityError::AttenuationNotAllowed { .. })
        ));
    }

    #[test]
    fn test_revocation() {
        let ledger = ledger();
        let now = at(1_700_000_000);
        let wire = ledger
            .issue_at(
                &IssueRequest::new("s", "a", Scope::parse("fs:write").unwrap()),
                now,
            )
            .unwrap();
        let payload = ledger.verify_at(&wire, None, now).unwrap();

        ledger.revoke(&payload.jti);
        assert!(matches!(
            ledger.verify_at(&wire, None, now),
            Err(CapabilityError::Revoked { .. })
        ));
        assert!(matches!(
            ledger.consume(&payload.jti),
            Err(CapabilityError::Revoked { .. })
        ));
    }

    #[test]
    fn test_context_constraints() {
        let ledger = ledger();
        let now = at(1_700_000_000);
        let mut request = IssueRequest::new("s", "a", Scope::parse("db:write").unwrap());
        request.context = Some(TokenContext {
            task_id: Some("t-1".to_string()),
            allowed_tools: Some(vec!["db__query".to_string()]),
            allowed_servers: Some(vec!["db".to_string()]),
        });
        let wire = ledger.issue_at(&request, now).unwrap();

        let good = CallContext {
            task_id: Some("t-1".to_string()),
            tool_name: Some("db__query".to_string()),
            server_name: Some("db".to_string()),
        };
        assert!(ledger.verify_with_context_at(&wire, None, &good, now).is_ok());

        let wrong_task = CallContext {
            task_id: Some("t-2".to_string()),
            ..good.clone()
        };
        assert!(matches!(
            ledger.verify_with_context_at(&wire, None, &wrong_task, now),
            Err(CapabilityError::ContextMismatch { .. })
        ));

        let wrong_tool = CallContext {
            tool_name: Some("db__drop".to_string()),
            ..good
        };
        assert!(matches!(
            ledger.verify_with_context_at(&wire, None, &wrong_tool, now),
            Err(CapabilityError::ContextMismatch { .. })
        ));
    }

    #[test]
    fn test_cleanup_drops_spent_old_tokens() {
        let ledger = ledger();
        let issued = at(1_700_000_000);
        let mut request = IssueRequest::new("s", "a", Scope::parse("db:write").unwrap());
        request.max_uses = Some(1);
        let wire = ledger.issue_at(&request, issued).unwrap();
        let payload = decode_token(&wire, &ledger.secret).unwrap();
        ledger.consume(&payload.jti).unwrap();

        // Too young: survives.
        assert_eq!(ledger.cleanup_at(at(1_700_000_100)), 0);
        // A day later: gone.
        assert_eq!(ledger.cleanup_at(at(1_700_090_000)), 1);
        assert_eq!(ledger.tracked_count(), 0);
    }

    #[test]
    fn test_tracked_table_is_bounded() {
        let ledger = CapabilityLedger::with_generated_secret().with_max_tracked(4);
        for i in 0..10i64 {
            let mut request = IssueRequest::new("s", "a", Scope::parse("db:write").unwrap());
            request.max_uses = Some(5);
            ledger
                .issue_at(&request, at(1_700_000_000i64.saturating_add(i)))
                .unwrap();
        }
        assert!(ledger.tracked_count() <= 4);
    }
}
