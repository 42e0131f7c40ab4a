//! Process-wide registry of Inbound/Outbound transformers, keyed by
//! [`ApiFormat`]
//!
//! A small, built-once-at-startup lookup table handed to every request.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::TransformError;
use crate::inbound::Inbound;
use crate::outbound::{ApiFormat, Outbound};

/// Holds one `Inbound` and one `Outbound` per supported wire format
#[derive(Default)]
pub struct TransformerRegistry {
    inbounds: HashMap<ApiFormat, Arc<dyn Inbound>>,
    outbounds: HashMap<ApiFormat, Arc<dyn Outbound>>,
}

impl TransformerRegistry {
    /// Build an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an inbound transformer, keyed by its own `api_format()`
    pub fn register_inbound(&mut self, inbound: Arc<dyn Inbound>) {
        self.inbounds.insert(inbound.api_format(), inbound);
    }

    /// Register an outbound transformer, keyed by its own `api_format()`
    pub fn register_outbound(&mut self, outbound: Arc<dyn Outbound>) {
        self.outbounds.insert(outbound.api_format(), outbound);
    }

    /// Look up the inbound registered for `format`
    ///
    /// # Errors
    /// Returns [`TransformError::UnsupportedFormat`] if none is registered.
    pub fn inbound(&self, format: ApiFormat) -> Result<Arc<dyn Inbound>, TransformError> {
        self.inbounds
            .get(&format)
            .cloned()
            .ok_or_else(|| TransformError::UnsupportedFormat { format: format!("{format:?}") })
    }

    /// Look up the outbound registered for `format`
    ///
    /// # Errors
    /// Returns [`TransformError::UnsupportedFormat`] if none is registered.
    pub fn outbound(&self, format: ApiFormat) -> Result<Arc<dyn Outbound>, TransformError> {
        self.outbounds
            .get(&format)
            .cloned()
            .ok_or_else(|| TransformError::UnsupportedFormat { format: format!("{format:?}") })
    }
}
