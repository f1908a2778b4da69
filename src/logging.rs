use std::fmt;

use crate::request::RequestId;
use crate::session::SessionId;

/// Request-scoped structured logger for one site key check.
///
/// Every event carries the `request_id` and `session` fields so a check can
/// be followed across the interception thread and the strategy threads.
///
/// Key material must never be passed in; log lengths or verdicts instead.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExtractionLog {
    request_id: RequestId,
    session: SessionId,
}

impl ExtractionLog {
    pub(crate) fn new(request_id: RequestId, session: SessionId) -> Self {
        Self {
            request_id,
            session,
        }
    }

    /// Logs an info-level message.
    pub(crate) fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(request_id = %self.request_id, session = %self.session, "{}", args);
    }

    /// Logs a warning-level message.
    pub(crate) fn warn(&self, args: fmt::Arguments<'_>) {
        tracing::warn!(request_id = %self.request_id, session = %self.session, "{}", args);
    }

    /// Logs a debug-level message.
    pub(crate) fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(request_id = %self.request_id, session = %self.session, "{}", args);
    }
}
