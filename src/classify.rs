//! Deciding which errors the client is allowed to see.

use std::error;

use crate::{Error, ErrorEnvelope};

/// Turns an error returned from a procedure into the envelope sent to the client.
///
/// Returning `None` marks the error as unsafe: the client receives a generic internal error and the
/// original error goes to the [`Report`](crate::report::Report) sink.
pub trait Classify: Send + Sync + 'static {
    fn classify(&self, err: &(dyn error::Error + 'static)) -> Option<ErrorEnvelope>;
}

impl<F> Classify for F
where
    F: Fn(&(dyn error::Error + 'static)) -> Option<ErrorEnvelope> + Send + Sync + 'static,
{
    fn classify(&self, err: &(dyn error::Error + 'static)) -> Option<ErrorEnvelope> {
        (self)(err)
    }
}

/// The default classifier.
///
/// Walks the error and its [`source`](error::Error::source) chain up to the first [`Error`]. That
/// error is rendered if it is safe. A private one hides everything it wraps.
#[derive(Debug, Default, Clone, Copy)]
pub struct RichErrors;

impl Classify for RichErrors {
    fn classify(&self, err: &(dyn error::Error + 'static)) -> Option<ErrorEnvelope> {
        let mut current = Some(err);
        while let Some(err) = current {
            if let Some(rich) = err.downcast_ref::<Error>() {
                return rich.is_safe().then(|| rich.envelope());
            }
            current = err.source();
        }
        None
    }
}
