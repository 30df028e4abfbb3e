use std::{
    any::{type_name, Any},
    fmt,
};

use futures::future::BoxFuture;
use serde::Serialize;

use crate::{decode::RawInput, BoxError, DecodeError, RequestContext};

use super::Signature;

/// A function a [`Procedure`](super::Procedure) can dispatch to.
///
/// Implemented for typed closures through [`Handler`](super::Handler). Implement it by hand to
/// expose functions whose types are only known at runtime. The [`Signature`] is validated once when
/// the procedure is built.
pub trait Callable: Send + Sync + 'static {
    fn signature(&self) -> Signature;

    /// Convert the merged request values into the value given to [`Callable::call`].
    ///
    /// Only called when the signature declares an input. Defaults to a [`serde_json::Value`].
    fn decode(&self, input: RawInput) -> Result<DynInput, DecodeError> {
        input
            .deserialize::<serde_json::Value>()
            .map(DynInput::new)
            .map_err(DecodeError::Input)
    }

    fn call(
        &self,
        ctx: RequestContext,
        input: Option<DynInput>,
    ) -> BoxFuture<'static, Result<Option<Output>, BoxError>>;
}

/// A decoded input on its way to the callable.
pub struct DynInput {
    type_name: &'static str,
    value: Box<dyn Any + Send>,
}

impl DynInput {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            type_name: type_name::<T>(),
            value: Box::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Take the value out, giving it back if it is not a `T`.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self {
                type_name: self.type_name,
                value,
            }),
        }
    }
}

impl fmt::Debug for DynInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynInput")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// The successful result of a callable.
pub enum Output {
    /// Written to the response verbatim.
    Text(String),
    /// Serialised as JSON.
    Json(Box<dyn erased_serde::Serialize + Send>),
}

impl Output {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn json<T: Serialize + Send + 'static>(value: T) -> Self {
        Self::Json(Box::new(value))
    }

    /// `()` produces no output and strings are sent as text.
    pub(crate) fn from_value<T: Serialize + Send + 'static>(value: T) -> Option<Self> {
        let mut value = Some(value);
        // Downcasting `Option<T>` lets us take the value out by-value.
        let any = &mut value as &mut dyn Any;
        if any.is::<Option<()>>() {
            return None;
        }
        if let Some(text) = any.downcast_mut::<Option<String>>() {
            return text.take().map(Output::Text);
        }
        if let Some(text) = any.downcast_mut::<Option<&'static str>>() {
            return text.take().map(Output::text);
        }

        value.map(Output::json)
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Json(_) => f.debug_tuple("Json").field(&"..").finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_from_value() {
        assert!(Output::from_value(()).is_none());
        assert!(matches!(Output::from_value(String::from("hi")), Some(Output::Text(t)) if t == "hi"));
        assert!(matches!(Output::from_value("hi"), Some(Output::Text(t)) if t == "hi"));

        let Some(Output::Json(value)) = Output::from_value(vec![1, 2, 3]) else {
            panic!("expected json output");
        };
        assert_eq!(serde_json::to_string(&value).unwrap(), "[1,2,3]");
    }

    #[test]
    fn dyn_input_downcast() {
        let input = DynInput::new(42u8);
        assert_eq!(input.type_name(), "u8");

        let input = input.downcast::<String>().unwrap_err();
        assert_eq!(input.downcast::<u8>().unwrap(), 42);
    }
}
