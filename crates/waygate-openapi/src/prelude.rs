//! Prelude module - commonly used types for convenient import.
//!
//! Use `use waygate_openapi::prelude::*;` to import all essential
//! types.

// Errors
pub use crate::{OpenApiError, OpenApiResult};

// Adapter
pub use crate::VirtualHttpServer;

// Configuration
pub use crate::{AuthSpec, VirtualServerConfig};

// Client seam
pub use crate::{HttpCall, HttpClient, HttpResponse};

// Document model
pub use crate::{OpenApiDocument, Operation, Parameter, ParameterLocation};

#[cfg(feature = "reqwest")]
pub use crate::ReqwestClient;
