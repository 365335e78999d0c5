//! Waygate OpenAPI - virtual HTTP backends.
//!
//! An orthogonal way to bring tools into the gateway: given an OpenAPI 3
//! document and a server configuration, the adapter synthesizes one tool
//! per operation (`<prefix>__<operationid>`) with an input schema
//! derived from the operation's parameters and JSON request body, and
//! executes calls over an injected [`HttpClient`].
//!
//! The adapter registers the same [`waygate_mcp::ToolDispatcher`] seam
//! as process backends, so the router treats both identically.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod adapter;
mod client;
mod config;
mod document;
mod error;

pub use adapter::VirtualHttpServer;
pub use client::{HttpCall, HttpClient, HttpResponse};
pub use config::{AuthSpec, VirtualServerConfig};
pub use document::{OpenApiDocument, Operation, Parameter, ParameterLocation};
pub use error::{OpenApiError, OpenApiResult};

#[cfg(feature = "reqwest")]
pub use client::ReqwestClient;
