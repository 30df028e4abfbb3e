//! HTTP middleware wrapped around a procedure.
//!
//! Middleware are registered through [`ProcedureOption`](crate::procedure::ProcedureOption)s and
//! run in registration order, each one deciding when to hand the request to the [`Next`].

use std::{fmt, future::Future, sync::Arc};

use axum::{extract::Request, response::Response};
use futures::{future::BoxFuture, FutureExt};

mod compression;
mod next;

pub use compression::content_encoding;
pub use next::Next;

type MiddlewareFn = dyn Fn(Request, Next) -> BoxFuture<'static, Response> + Send + Sync;

/// A function run around every request to a procedure.
///
/// ```rust,ignore
/// let no_store = Middleware::new(|req: Request, next: Next| async move {
///     let mut response = next.run(req).await;
///     response
///         .headers_mut()
///         .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
///     response
/// });
/// ```
#[derive(Clone)]
pub struct Middleware(Arc<MiddlewareFn>);

impl Middleware {
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self(Arc::new(move |req, next| func(req, next).boxed()))
    }

    pub(crate) fn run(&self, req: Request, next: Next) -> BoxFuture<'static, Response> {
        (self.0)(req, next)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").finish()
    }
}
