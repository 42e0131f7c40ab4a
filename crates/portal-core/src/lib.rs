//! Shared kernel for the portal gateway
//!
//! Holds the principal/bypass authorization kernel, the scope engine, the
//! unified request/response/stream model shared by every transformer, the
//! per-request context, header discipline, and the `HttpError` trait that
//! every feature crate's error type implements.

pub mod bypass;
pub mod context;
pub mod credential;
pub mod error;
pub mod headers;
pub mod model;
pub mod principal;
pub mod scope;
pub mod transport;

pub use bypass::{BypassMarker, get_bypass_info, is_bypass_active, run_with_bypass, set_test_mode, with_bypass};
pub use context::RequestContext;
pub use credential::{CredentialProvider, RandomCredentialProvider, StaticCredentialProvider};
pub use error::{HttpError, KernelError};
pub use principal::{Principal, get_principal, require_principal, require_system, with_principal};
pub use scope::{ScopeContext, ScopeDecision, has_scope, require_scope, run_with_scope_decision, with_scope_decision};
pub use transport::{ByteChunkStream, DecoderFactory, DecoderRegistry, EventStream, Executor, HttpRequest, HttpResponse};
