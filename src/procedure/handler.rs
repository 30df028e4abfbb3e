use std::{
    any::{type_name, TypeId},
    future::Future,
    marker::PhantomData,
    sync::Arc,
};

use futures::{future::BoxFuture, FutureExt, TryFutureExt};
use serde::{de::DeserializeOwned, Serialize};
use specta::Type;

use crate::{decode::RawInput, BoxError, DecodeError, InputMismatch, RequestContext};

use super::{Callable, DynInput, Output, Shape, Signature, Slot};

/// A typed function which can be turned into a [`Procedure`](super::Procedure).
///
/// Implemented for `Fn(RequestContext) -> impl Future<Output = Result<O, E>>` and
/// `Fn(RequestContext, I) -> impl Future<Output = Result<O, E>>`. Returning `Ok(())` means the
/// procedure has no output.
///
/// The `TMarker` generic only exists to keep the implementations apart. Closure arguments must be
/// annotated so the compiler can pick one.
pub trait Handler<TMarker>: Send + Sync + Sized + 'static {
    #[doc(hidden)]
    fn into_callable(self) -> Arc<dyn Callable>;
}

fn results<O: Type + 'static>() -> Vec<Slot> {
    if TypeId::of::<O>() == TypeId::of::<()>() {
        vec![Slot::Error]
    } else {
        vec![Slot::Value(Shape::of::<O>()), Slot::Error]
    }
}

/// A [`Callable`] around a function taking only the context.
pub struct ContextHandler<F, O, E> {
    handler: F,
    phantom: PhantomData<fn() -> (O, E)>,
}

impl<F, Fut, O, E> Handler<ContextHandler<F, O, E>> for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Serialize + Type + Send + 'static,
    E: Into<BoxError> + 'static,
{
    fn into_callable(self) -> Arc<dyn Callable> {
        Arc::new(ContextHandler {
            handler: self,
            phantom: PhantomData,
        })
    }
}

impl<F, Fut, O, E> Callable for ContextHandler<F, O, E>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Serialize + Type + Send + 'static,
    E: Into<BoxError> + 'static,
{
    fn signature(&self) -> Signature {
        Signature::new(vec![Slot::Context], results::<O>())
    }

    fn call(
        &self,
        ctx: RequestContext,
        _input: Option<DynInput>,
    ) -> BoxFuture<'static, Result<Option<Output>, BoxError>> {
        (self.handler)(ctx)
            .map_ok(Output::from_value)
            .map_err(Into::into)
            .boxed()
    }
}

/// A [`Callable`] around a function taking the context and a decoded input.
pub struct InputHandler<F, I, O, E> {
    handler: F,
    phantom: PhantomData<fn(I) -> (O, E)>,
}

impl<F, Fut, I, O, E> Handler<InputHandler<F, I, O, E>> for F
where
    F: Fn(RequestContext, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    I: DeserializeOwned + Type + Send + 'static,
    O: Serialize + Type + Send + 'static,
    E: Into<BoxError> + 'static,
{
    fn into_callable(self) -> Arc<dyn Callable> {
        Arc::new(InputHandler {
            handler: self,
            phantom: PhantomData,
        })
    }
}

impl<F, Fut, I, O, E> Callable for InputHandler<F, I, O, E>
where
    F: Fn(RequestContext, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    I: DeserializeOwned + Type + Send + 'static,
    O: Serialize + Type + Send + 'static,
    E: Into<BoxError> + 'static,
{
    fn signature(&self) -> Signature {
        Signature::new(
            vec![Slot::Context, Slot::Value(Shape::of::<I>())],
            results::<O>(),
        )
    }

    fn decode(&self, input: RawInput) -> Result<DynInput, DecodeError> {
        input
            .deserialize::<I>()
            .map(DynInput::new)
            .map_err(DecodeError::Input)
    }

    fn call(
        &self,
        ctx: RequestContext,
        input: Option<DynInput>,
    ) -> BoxFuture<'static, Result<Option<Output>, BoxError>> {
        match input.map(DynInput::downcast::<I>) {
            Some(Ok(input)) => (self.handler)(ctx, input)
                .map_ok(Output::from_value)
                .map_err(Into::into)
                .boxed(),
            _ => {
                let err: BoxError = Box::new(InputMismatch {
                    expected: type_name::<I>(),
                });
                futures::future::ready(Err(err)).boxed()
            }
        }
    }
}
