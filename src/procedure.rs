//! Building procedures from plain functions.
//!
//! A procedure wraps a function with one of four calling conventions:
//!
//! | [`Kind`]                       | function                                    |
//! |--------------------------------|---------------------------------------------|
//! | [`Kind::Context`]              | `async fn(RequestContext) -> Result<(), E>` |
//! | [`Kind::ContextInput`]         | `async fn(RequestContext, I) -> Result<(), E>` |
//! | [`Kind::ContextOutput`]        | `async fn(RequestContext) -> Result<O, E>`  |
//! | [`Kind::ContextInputOutput`]   | `async fn(RequestContext, I) -> Result<O, E>` |
//!
//! Typed functions are accepted through [`Handler`]. Functions whose types are only known at
//! runtime implement [`Callable`] directly and have their [`Signature`] validated when the
//! procedure is built.

mod callable;
mod handler;
mod options;
mod procedure;
mod signature;

pub use callable::{Callable, DynInput, Output};
pub use handler::{ContextHandler, Handler, InputHandler};
pub use options::{
    AllowHeaders, BodyLimit, Classifier, Config, ContentEncoding, Options, ProcedureOption,
    Reporter, Setup,
};
pub use procedure::Procedure;
pub use signature::{Kind, Shape, Signature, Slot};
