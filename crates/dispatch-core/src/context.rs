//! Per-call dispatch context.
//!
//! Carries the verify code and the authorized licence of the node being
//! executed. It is passed by reference into handlers, which hand it on to
//! any outbound client call so the verify code reaches downstream services.
//! Nothing outlives the call that created it.

use crate::correlation::CorrelationId;
use crate::document::Document;

#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    request_id: CorrelationId,
    verify_code: Option<String>,
    licence: Option<String>,
}

impl DispatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verify_code(mut self, code: impl Into<String>) -> Self {
        let code = code.into();
        self.verify_code = (!code.is_empty()).then_some(code);
        self
    }

    /// Root context for an inbound document.
    pub fn from_document(doc: &Document) -> Self {
        Self::new().for_node(doc)
    }

    /// Identifier shared by a document and all of its nested dispatchings.
    pub fn request_id(&self) -> CorrelationId {
        self.request_id
    }

    pub fn verify_code(&self) -> Option<&str> {
        self.verify_code.as_deref()
    }

    /// Licence token, set once the licence check passed.
    pub fn licence(&self) -> Option<&str> {
        self.licence.as_deref()
    }

    /// Context for executing `doc` beneath this one. The document's own verify
    /// code wins; otherwise the parent's is inherited. Authorization is not.
    pub(crate) fn for_node(&self, doc: &Document) -> Self {
        Self {
            request_id: self.request_id,
            verify_code: doc
                .verify_code()
                .map(str::to_string)
                .or_else(|| self.verify_code.clone()),
            licence: None,
        }
    }

    pub(crate) fn authorize(&mut self, licence: &str) {
        self.licence = Some(licence.to_string());
    }
}
