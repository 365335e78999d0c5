//! Waygate Capabilities - short-lived signed authorization tokens.
//!
//! A capability token is a bearer credential: `base64url(payload) "."
//! base64url(hmac-sha256(payload))`, signed with the ledger's shared
//! secret. Tokens are monotonically attenuable - a child token's scope
//! is always a subset of its parent's, its expiry never later, its use
//! budget never larger - so a holder can safely delegate a weaker
//! credential without consulting the ledger.
//!
//! The ledger tracks per-token state (uses remaining, revocation) only
//! for tokens that need it; everything else is verified statelessly
//! from the signature and the payload's time bounds.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod ledger;
mod scope;
mod secret;
mod token;

pub use error::{CapabilityError, CapabilityResult};
pub use ledger::{AttenuateRequest, CallContext, CapabilityLedger, IssueRequest};
pub use scope::{Scope, ScopeLevel};
pub use secret::LedgerSecret;
pub use token::{TokenContext, TokenPayload, decode_token, encode_token};
