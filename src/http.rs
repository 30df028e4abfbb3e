use std::{
    convert::Infallible,
    error, mem,
    task::{Context, Poll},
};

use axum::{
    body::Body,
    extract::Request,
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION, X_CONTENT_TYPE_OPTIONS},
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    response::Response,
    Router,
};
use futures::future::BoxFuture;

use crate::{
    cors, middleware::Next, procedure::Output, BoxError, EncodeError, Error, ErrorEnvelope,
    Procedure, Redirect, RequestContext,
};

fn application_json() -> HeaderValue {
    HeaderValue::from_static("application/json")
}

fn nosniff() -> HeaderValue {
    HeaderValue::from_static("nosniff")
}

impl Procedure {
    /// Serve a request through the procedure's middleware.
    pub async fn handle(&self, req: Request) -> Response {
        Next::new(self.clone()).run(req).await
    }

    /// The innermost handler, run once every middleware has passed the request on.
    pub(crate) async fn serve(&self, req: Request) -> Response {
        if *req.method() == Method::OPTIONS {
            let mut response = Response::new(Body::empty());
            cors::merge_allow_headers(
                req.headers(),
                response.headers_mut(),
                self.config().allow_headers(),
            );
            return response;
        }
        if *req.method() == Method::HEAD {
            return Response::new(Body::empty());
        }
        if !matches!(req.uri().path(), "/" | "") {
            return not_found();
        }

        let (parts, body) = req.into_parts();
        let input = match self.decode(&parts, body).await {
            Ok(input) => input,
            Err(err) => {
                tracing::debug!(error = %err, "rpc: can not decode request");
                return self.serve_error(Box::new(Error::from(err)));
            }
        };

        let ctx = RequestContext::new(self.clone(), parts);
        // Cancels the context once the response is ready or the request is dropped.
        let _cancel = ctx.cancellation_token().clone().drop_guard();

        let mut response = match self.call(ctx.clone(), input).await {
            Ok(output) => self.serve_output(output),
            Err(err) => self.serve_error(err),
        };

        let extra = ctx.take_response_headers();
        if !extra.is_empty() {
            let own = mem::replace(response.headers_mut(), extra);
            override_headers(response.headers_mut(), own);
        }
        response
    }

    fn serve_output(&self, output: Option<Output>) -> Response {
        match output {
            None => Response::new(Body::empty()),
            Some(Output::Text(text)) => Response::new(Body::from(text)),
            Some(Output::Json(value)) => match serde_json::to_vec(&value) {
                Ok(body) => {
                    let mut response = Response::new(Body::from(body));
                    response.headers_mut().insert(CONTENT_TYPE, application_json());
                    response
                }
                Err(err) => self.serve_error(Box::new(EncodeError(err))),
            },
        }
    }

    fn serve_error(&self, err: BoxError) -> Response {
        if let Some(response) = redirect(&*err) {
            return response;
        }

        let mut response = self.render_error(&*err);
        response.headers_mut().insert(X_CONTENT_TYPE_OPTIONS, nosniff());
        response
    }

    fn render_error(&self, err: &(dyn error::Error + 'static)) -> Response {
        let config = self.config();
        match config.classifier().classify(err) {
            Some(envelope) => self.serve_json(envelope.status(), &envelope),
            None => {
                match err.downcast_ref::<EncodeError>() {
                    Some(EncodeError(err)) => config.reporter().encode_error(err),
                    None => config.reporter().unsafe_error(err),
                }
                self.serve_json(StatusCode::INTERNAL_SERVER_ERROR, &ErrorEnvelope::internal())
            }
        }
    }

    fn serve_json(&self, status: StatusCode, envelope: &ErrorEnvelope) -> Response {
        let mut body = match serde_json::to_vec(envelope) {
            Ok(body) => body,
            Err(err) => return self.render_error(&EncodeError(err)),
        };
        body.push(b'\n');

        let mut response = Response::new(Body::empty());
        *response.status_mut() = status;
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, application_json());
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        *response.body_mut() = Body::from(body);
        response
    }
}

/// Answer with a redirect if `err`, or any error it wraps, is a [`Redirect`].
fn redirect(err: &(dyn error::Error + 'static)) -> Option<Response> {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(redirect) = err.downcast_ref::<Redirect>() {
            // A location that isn't a valid header is rendered as an ordinary error.
            let location = HeaderValue::from_str(redirect.location()).ok()?;
            let mut response = Response::new(Body::empty());
            *response.status_mut() = redirect.status();
            response.headers_mut().insert(LOCATION, location);
            return Some(response);
        }
        current = err.source();
    }
    None
}

fn not_found() -> Response {
    let mut response = Response::new(Body::from("404 page not found\n"));
    *response.status_mut() = StatusCode::NOT_FOUND;
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, nosniff());
    response
}

/// Replace every header of `base` that also appears in `own`.
fn override_headers(base: &mut HeaderMap, own: HeaderMap) {
    let mut current = None;
    for (name, value) in own {
        if let Some(name) = name {
            base.remove(&name);
            current = Some(name);
        }
        if let Some(name) = &current {
            base.append(name, value);
        }
    }
}

impl tower::Service<Request> for Procedure {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let procedure = self.clone();
        Box::pin(async move { Ok(procedure.handle(req).await) })
    }
}

/// A router serving `procedure` on every path it is mounted at.
///
/// ```rust,ignore
/// let app = axum::Router::new().nest("/users/get", rspc_http::endpoint(get_user));
/// ```
pub fn endpoint<S>(procedure: Procedure) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().fallback_service(procedure)
}

#[cfg(test)]
mod tests {
    use axum::http::header::{CACHE_CONTROL, SET_COOKIE};

    use super::*;

    #[test]
    fn own_headers_take_precedence() {
        let mut base = HeaderMap::new();
        base.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        base.append(SET_COOKIE, HeaderValue::from_static("a=1"));

        let mut own = HeaderMap::new();
        own.insert(CONTENT_TYPE, application_json());
        own.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        own.append(CACHE_CONTROL, HeaderValue::from_static("private"));

        override_headers(&mut base, own);
        assert_eq!(base[CONTENT_TYPE], "application/json");
        assert_eq!(base[SET_COOKIE], "a=1");
        assert_eq!(
            base.get_all(CACHE_CONTROL).iter().collect::<Vec<_>>(),
            ["no-store", "private"]
        );
    }

    #[test]
    fn redirects_through_sources() {
        let err = Error::unauthorized("login required").with_cause(Redirect::found("/login"));
        let response = redirect(&err).unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/login");

        assert!(redirect(&Redirect::found("/bad\nlocation")).is_none());
        assert!(redirect(&Error::not_found("gone")).is_none());
    }
}
