use std::{
    fmt,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
};

use axum::{
    extract::ConnectInfo,
    http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Method, Uri},
};
use tokio_util::sync::CancellationToken;

use crate::Procedure;

/// The first argument of every procedure.
///
/// Holds the [`Procedure`] being served along with the head of the HTTP request that invoked it.
/// Cloning is cheap and every clone refers to the same request.
#[derive(Clone)]
pub struct RequestContext(Arc<Inner>);

struct Inner {
    procedure: Procedure,
    request: Parts,
    cancel: CancellationToken,
    response_headers: Mutex<HeaderMap>,
}

impl RequestContext {
    pub fn new(procedure: Procedure, request: Parts) -> Self {
        Self(Arc::new(Inner {
            procedure,
            request,
            cancel: CancellationToken::new(),
            response_headers: Mutex::new(HeaderMap::new()),
        }))
    }

    /// The procedure this request is being served by.
    pub fn procedure(&self) -> &Procedure {
        &self.0.procedure
    }

    /// The address of the peer, if the server was started with
    /// [`into_make_service_with_connect_info`](axum::Router::into_make_service_with_connect_info).
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.0
            .request
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0)
    }

    pub fn request(&self) -> &Parts {
        &self.0.request
    }

    pub fn method(&self) -> &Method {
        &self.0.request.method
    }

    pub fn uri(&self) -> &Uri {
        &self.0.request.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.0.request.headers
    }

    /// Cancelled once the request finishes or the client goes away.
    ///
    /// Work spawned off the request should select on this.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.0.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.0.cancel.cancelled().await
    }

    /// Add a header to the response.
    ///
    /// `Content-Type` is overridden for JSON results and error envelopes.
    pub fn append_response_header(&self, name: HeaderName, value: HeaderValue) {
        self.0
            .response_headers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(name, value);
    }

    pub(crate) fn take_response_headers(&self) -> HeaderMap {
        std::mem::take(
            &mut *self
                .0
                .response_headers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", self.method())
            .field("uri", self.uri())
            .field("remote_addr", &self.remote_addr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{header, Request};

    use super::*;

    fn procedure() -> Procedure {
        Procedure::new(|_: RequestContext| async { Ok::<_, crate::Error>(()) }).unwrap()
    }

    #[test]
    fn exposes_request_head() {
        let mut request = Request::post("/?a=1")
            .header(header::USER_AGENT, "test")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        let (parts, _) = request.into_parts();

        let ctx = RequestContext::new(procedure(), parts);
        assert_eq!(ctx.method(), Method::POST);
        assert_eq!(ctx.uri().query(), Some("a=1"));
        assert_eq!(ctx.headers()[header::USER_AGENT], "test");
        assert_eq!(
            ctx.remote_addr(),
            Some(SocketAddr::from(([127, 0, 0, 1], 4000)))
        );
        assert!(ctx.procedure().input_shape().is_none());
    }

    #[test]
    fn response_headers_are_taken_once() {
        let (parts, _) = Request::get("/").body(()).unwrap().into_parts();
        let ctx = RequestContext::new(procedure(), parts);
        ctx.clone().append_response_header(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        );

        assert_eq!(ctx.take_response_headers()[header::CACHE_CONTROL], "no-store");
        assert!(ctx.take_response_headers().is_empty());
    }

    #[test]
    fn cancellation() {
        let (parts, _) = Request::get("/").body(()).unwrap().into_parts();
        let ctx = RequestContext::new(procedure(), parts);
        assert!(!ctx.is_cancelled());
        drop(ctx.cancellation_token().clone().drop_guard());
        assert!(ctx.is_cancelled());
    }
}
