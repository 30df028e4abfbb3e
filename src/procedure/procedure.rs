use std::{fmt, sync::Arc};

use axum::{body::Body, http::request::Parts};

use crate::{
    decode::decode_request, middleware::Middleware, BoxError, BuildError, DecodeError,
    RequestContext,
};

use super::{Callable, Config, DynInput, Handler, Kind, Options, Output, Setup, Shape};

/// A function exposed over HTTP.
///
/// Built once with [`Procedure::new`] and shared between requests. Cloning is cheap.
#[derive(Clone)]
pub struct Procedure(Arc<Inner>);

struct Inner {
    kind: Kind,
    input: Option<Shape>,
    output: Option<Shape>,
    callable: Arc<dyn Callable>,
    middleware: Vec<Middleware>,
    config: Config,
}

impl Procedure {
    /// Build a procedure with the default [`Options`].
    pub fn new<M>(handler: impl Handler<M>) -> Result<Self, BuildError> {
        Self::with_options(handler, Options::default())
    }

    pub fn with_options<M>(handler: impl Handler<M>, options: Options) -> Result<Self, BuildError> {
        Self::build(handler.into_callable(), options)
    }

    /// Build a procedure from a function whose signature is only known at runtime.
    pub fn from_callable(callable: impl Callable, options: Options) -> Result<Self, BuildError> {
        Self::build(Arc::new(callable), options)
    }

    /// Like [`Procedure::with_options`] but panics if the procedure can't be built.
    ///
    /// Intended for procedures declared at startup.
    #[track_caller]
    #[allow(clippy::panic)]
    pub fn must<M>(handler: impl Handler<M>, options: Options) -> Self {
        match Self::with_options(handler, options) {
            Ok(procedure) => procedure,
            Err(err) => panic!("rpc: {err}"),
        }
    }

    fn build(callable: Arc<dyn Callable>, options: Options) -> Result<Self, BuildError> {
        let (kind, input, output) = callable.signature().validate().map_err(|err| {
            tracing::debug!(error = %err, "rpc: invalid procedure signature");
            err
        })?;

        // Options are applied to a fresh `Setup` so a failure leaves nothing behind.
        let Setup { middleware, config } = options.apply().map_err(|err| {
            tracing::debug!(error = %err, "rpc: procedure option failed");
            BuildError::Option(err)
        })?;

        tracing::debug!(
            ?kind,
            input = input.as_ref().map(Shape::type_name),
            output = output.as_ref().map(Shape::type_name),
            middleware = middleware.len(),
            "rpc: built procedure"
        );

        Ok(Self(Arc::new(Inner {
            kind,
            input,
            output,
            callable,
            middleware,
            config,
        })))
    }

    pub fn kind(&self) -> Kind {
        self.0.kind
    }

    /// The type of the decoded input, if the function takes one.
    pub fn input_shape(&self) -> Option<&Shape> {
        self.0.input.as_ref()
    }

    /// The type of the output, if the function returns one.
    pub fn output_shape(&self) -> Option<&Shape> {
        self.0.output.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    pub(crate) fn middleware(&self) -> &[Middleware] {
        &self.0.middleware
    }

    /// Decode the request into the procedure's input.
    ///
    /// Returns `None` without touching the request if the function takes no input.
    pub async fn decode(&self, parts: &Parts, body: Body) -> Result<Option<DynInput>, DecodeError> {
        if self.0.input.is_none() {
            return Ok(None);
        }

        let raw = decode_request(parts, body, self.0.config.body_limit()).await?;
        self.0.callable.decode(raw).map(Some)
    }

    /// Invoke the function.
    ///
    /// `input` is only passed on if the function takes one, and an output is only returned if the
    /// function declares one.
    pub async fn call(
        &self,
        ctx: RequestContext,
        input: Option<DynInput>,
    ) -> Result<Option<Output>, BoxError> {
        let input = input.filter(|_| self.0.input.is_some());
        let output = self.0.callable.call(ctx, input).await?;
        Ok(output.filter(|_| self.0.output.is_some()))
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("kind", &self.0.kind)
            .field("input", &self.input_shape().map(Shape::type_name))
            .field("output", &self.output_shape().map(Shape::type_name))
            .field("config", &self.0.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use futures::future::BoxFuture;
    use serde::Deserialize;
    use specta::Type;

    use super::*;
    use crate::{
        procedure::{Signature, Slot},
        Error,
    };

    #[derive(Deserialize, Type)]
    struct Greet {
        name: String,
    }

    fn ctx(procedure: &Procedure) -> RequestContext {
        let (parts, _) = Request::get("/").body(()).unwrap().into_parts();
        RequestContext::new(procedure.clone(), parts)
    }

    #[test]
    fn infers_kind_and_shapes() {
        let p = Procedure::new(|_: RequestContext| async { Ok::<_, Error>(()) }).unwrap();
        assert_eq!(p.kind(), Kind::Context);
        assert!(p.input_shape().is_none() && p.output_shape().is_none());

        let p = Procedure::new(|_: RequestContext, _: Greet| async { Ok::<_, Error>(()) }).unwrap();
        assert_eq!(p.kind(), Kind::ContextInput);
        assert!(p.input_shape().unwrap().type_name().ends_with("Greet"));

        let p = Procedure::new(|_: RequestContext| async { Ok::<_, Error>(42u32) }).unwrap();
        assert_eq!(p.kind(), Kind::ContextOutput);
        assert_eq!(p.output_shape().unwrap().type_name(), "u32");

        let p = Procedure::new(|_: RequestContext, input: Greet| async move {
            Ok::<_, Error>(format!("hello {}", input.name))
        })
        .unwrap();
        assert_eq!(p.kind(), Kind::ContextInputOutput);
        assert_eq!(p.middleware().len(), 1);
    }

    #[tokio::test]
    async fn calls_with_input() {
        let p = Procedure::with_options(
            |_: RequestContext, input: Greet| async move {
                Ok::<_, Error>(format!("hello {}", input.name))
            },
            Options::none(),
        )
        .unwrap();
        assert!(p.middleware().is_empty());

        let input = DynInput::new(Greet { name: "bob".into() });
        let output = p.call(ctx(&p), Some(input)).await.unwrap();
        assert!(matches!(output, Some(Output::Text(text)) if text == "hello bob"));

        let err = p.call(ctx(&p), None).await.unwrap_err();
        assert!(err.downcast_ref::<crate::InputMismatch>().is_some());
    }

    #[tokio::test]
    async fn errors_are_returned() {
        let p = Procedure::new(|_: RequestContext| async {
            Err::<(), _>(Error::conflict("already exists"))
        })
        .unwrap();

        let err = p.call(ctx(&p), None).await.unwrap_err();
        assert_eq!(err.downcast_ref::<Error>().map(Error::code), Some(409));
    }

    struct Dynamic(Signature);

    impl Callable for Dynamic {
        fn signature(&self) -> Signature {
            self.0.clone()
        }

        fn call(
            &self,
            _ctx: RequestContext,
            input: Option<DynInput>,
        ) -> BoxFuture<'static, Result<Option<Output>, BoxError>> {
            let echoed = input
                .and_then(|input| input.downcast::<serde_json::Value>().ok())
                .map(Output::json);
            Box::pin(async move { Ok(echoed) })
        }
    }

    #[tokio::test]
    async fn dynamic_callables() {
        let p = Procedure::from_callable(
            Dynamic(Signature::new(
                vec![Slot::Context, Slot::Value(Shape::of::<serde_json::Value>())],
                vec![Slot::Value(Shape::of::<serde_json::Value>()), Slot::Error],
            )),
            Options::none(),
        )
        .unwrap();
        assert_eq!(p.kind(), Kind::ContextInputOutput);

        let (parts, body) = Request::post("/?a=1")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let input = p.decode(&parts, body).await.unwrap();
        let Some(Output::Json(value)) = p.call(ctx(&p), input).await.unwrap() else {
            panic!("expected json output");
        };
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"a":"1"}"#);

        let err = Procedure::from_callable(
            Dynamic(Signature::new(vec![Slot::Context], vec![])),
            Options::none(),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::Signature(_)));
    }

    #[test]
    fn failing_options_abort() {
        let err = Procedure::with_options(
            |_: RequestContext| async { Ok::<_, Error>(()) },
            Options::none().with(crate::procedure::AllowHeaders::new(["bad header"])),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::Option(_)));
    }

    #[test]
    #[should_panic(expected = "rpc: ")]
    fn must_panics() {
        Procedure::must(
            |_: RequestContext, _: Greet| async { Ok::<_, Error>(()) },
            Options::default().with(crate::procedure::AllowHeaders::new(["\n"])),
        );
    }
}
