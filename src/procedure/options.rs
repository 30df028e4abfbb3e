use std::{borrow::Cow, fmt, sync::Arc};

use axum::http::HeaderName;

use crate::{
    classify::{Classify, RichErrors},
    middleware::{self, Middleware},
    report::{Report, TracingReport},
    BoxError,
};

const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Settings the HTTP pipeline reads while serving a procedure.
#[derive(Clone)]
pub struct Config {
    classifier: Arc<dyn Classify>,
    reporter: Arc<dyn Report>,
    allow_headers: Vec<Cow<'static, str>>,
    body_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            classifier: Arc::new(RichErrors),
            reporter: Arc::new(TracingReport),
            allow_headers: vec![Cow::Borrowed("Content-Type")],
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl Config {
    pub fn classifier(&self) -> &dyn Classify {
        &*self.classifier
    }

    pub fn reporter(&self) -> &dyn Report {
        &*self.reporter
    }

    /// Appended to `Access-Control-Allow-Headers` when answering a preflight request.
    pub fn allow_headers(&self) -> &[Cow<'static, str>] {
        &self.allow_headers
    }

    /// The largest JSON body read before decoding fails.
    pub fn body_limit(&self) -> usize {
        self.body_limit
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("allow_headers", &self.allow_headers)
            .field("body_limit", &self.body_limit)
            .finish_non_exhaustive()
    }
}

/// The state options are applied to while a procedure is being built.
#[derive(Debug, Default)]
pub struct Setup {
    pub(crate) middleware: Vec<Middleware>,
    pub(crate) config: Config,
}

impl Setup {
    /// Wrap the procedure in `middleware`. Earlier middleware run first.
    pub fn middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    pub fn classifier(&mut self, classifier: Arc<dyn Classify>) -> &mut Self {
        self.config.classifier = classifier;
        self
    }

    pub fn reporter(&mut self, reporter: Arc<dyn Report>) -> &mut Self {
        self.config.reporter = reporter;
        self
    }

    pub fn allow_header(&mut self, name: impl Into<Cow<'static, str>>) -> &mut Self {
        self.config.allow_headers.push(name.into());
        self
    }

    pub fn body_limit(&mut self, limit: usize) -> &mut Self {
        self.config.body_limit = limit;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// A configuration step applied when a procedure is built.
///
/// Returning an error aborts construction with [`BuildError::Option`](crate::BuildError::Option).
pub trait ProcedureOption: Send + Sync + 'static {
    fn apply(&self, setup: &mut Setup) -> Result<(), BoxError>;
}

impl<T: ProcedureOption> ProcedureOption for Option<T> {
    fn apply(&self, setup: &mut Setup) -> Result<(), BoxError> {
        match self {
            Some(option) => option.apply(setup),
            None => Ok(()),
        }
    }
}

impl ProcedureOption for Middleware {
    fn apply(&self, setup: &mut Setup) -> Result<(), BoxError> {
        setup.middleware(self.clone());
        Ok(())
    }
}

/// Compress response bodies with `gzip` or `deflate` when the client accepts it.
///
/// Enabled by [`Procedure::new`](crate::Procedure::new).
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentEncoding;

impl ProcedureOption for ContentEncoding {
    fn apply(&self, setup: &mut Setup) -> Result<(), BoxError> {
        setup.middleware(middleware::content_encoding());
        Ok(())
    }
}

/// Extra headers to allow in CORS preflight responses.
#[derive(Debug, Clone)]
pub struct AllowHeaders(Vec<Cow<'static, str>>);

impl AllowHeaders {
    pub fn new<I, H>(headers: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<Cow<'static, str>>,
    {
        Self(headers.into_iter().map(Into::into).collect())
    }
}

impl ProcedureOption for AllowHeaders {
    fn apply(&self, setup: &mut Setup) -> Result<(), BoxError> {
        for header in &self.0 {
            HeaderName::from_bytes(header.as_bytes())?;
            setup.allow_header(header.clone());
        }
        Ok(())
    }
}

/// Limit the size of JSON request bodies.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimit(pub usize);

impl ProcedureOption for BodyLimit {
    fn apply(&self, setup: &mut Setup) -> Result<(), BoxError> {
        setup.body_limit(self.0);
        Ok(())
    }
}

/// Replace the default [`RichErrors`] classifier.
#[derive(Clone)]
pub struct Classifier(Arc<dyn Classify>);

impl Classifier {
    pub fn new(classifier: impl Classify) -> Self {
        Self(Arc::new(classifier))
    }
}

impl ProcedureOption for Classifier {
    fn apply(&self, setup: &mut Setup) -> Result<(), BoxError> {
        setup.classifier(self.0.clone());
        Ok(())
    }
}

/// Replace the default [`TracingReport`] sink.
#[derive(Clone)]
pub struct Reporter(Arc<dyn Report>);

impl Reporter {
    pub fn new(reporter: impl Report) -> Self {
        Self(Arc::new(reporter))
    }
}

impl ProcedureOption for Reporter {
    fn apply(&self, setup: &mut Setup) -> Result<(), BoxError> {
        setup.reporter(self.0.clone());
        Ok(())
    }
}

/// The ordered options a procedure is built with.
pub struct Options(Vec<Box<dyn ProcedureOption>>);

impl Default for Options {
    /// Content encoding negotiation only.
    fn default() -> Self {
        Self::none().with(ContentEncoding)
    }
}

impl Options {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn with(mut self, option: impl ProcedureOption) -> Self {
        self.0.push(Box::new(option));
        self
    }

    pub(crate) fn apply(&self) -> Result<Setup, BoxError> {
        let mut setup = Setup::default();
        for option in &self.0 {
            option.apply(&mut setup)?;
        }
        Ok(setup)
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Options").field(&self.0.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let setup = Options::default().apply().unwrap();
        assert_eq!(setup.middleware.len(), 1);
        assert_eq!(setup.config().allow_headers(), ["Content-Type"]);
        assert_eq!(setup.config().body_limit(), DEFAULT_BODY_LIMIT);

        assert!(Options::none().apply().unwrap().middleware.is_empty());
    }

    #[test]
    fn options_apply_in_order() {
        let setup = Options::none()
            .with(BodyLimit(16))
            .with(AllowHeaders::new(["Authorization", "X-Request-Id"]))
            .with(None::<ContentEncoding>)
            .with(BodyLimit(32))
            .apply()
            .unwrap();

        assert!(setup.middleware.is_empty());
        assert_eq!(setup.config().body_limit(), 32);
        assert_eq!(
            setup.config().allow_headers(),
            ["Content-Type", "Authorization", "X-Request-Id"]
        );
    }

    #[test]
    fn invalid_allow_header() {
        let result = Options::none()
            .with(AllowHeaders::new(["not a header"]))
            .apply();
        assert!(result.is_err());
    }
}
