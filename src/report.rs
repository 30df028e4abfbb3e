//! Where the errors hidden from clients end up.

use std::error;

/// A sink for errors which are never sent to the client.
pub trait Report: Send + Sync + 'static {
    /// An error the [`Classify`](crate::classify::Classify) collaborator did not consider safe.
    fn unsafe_error(&self, err: &(dyn error::Error + 'static));

    /// A response or error envelope could not be serialised.
    ///
    /// Reported instead of [`unsafe_error`](Report::unsafe_error).
    fn encode_error(&self, err: &serde_json::Error);
}

/// Reports through [`tracing`] at the `error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReport;

impl Report for TracingReport {
    fn unsafe_error(&self, err: &(dyn error::Error + 'static)) {
        tracing::error!(error = %err, source = ?err.source().map(ToString::to_string), "rpc: unsafe error");
    }

    fn encode_error(&self, err: &serde_json::Error) {
        tracing::error!(error = %err, "rpc: json encoder error");
    }
}
