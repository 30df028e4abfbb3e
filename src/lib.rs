//! rspc-http: expose plain async functions as HTTP procedures.
//!
//! A [`Procedure`] is built once from a function taking a [`RequestContext`] and an optional
//! input and returning `Result<Output, Error>`. It is then served as a [`tower::Service`] so it
//! can be mounted on any [Axum](https://docs.rs/axum) router.
//!
//! ```rust,ignore
//! #[derive(serde::Deserialize, specta::Type)]
//! struct Add { a: i32, b: i32 }
//!
//! let add = Procedure::new(|_ctx: RequestContext, input: Add| async move {
//!     Ok::<_, rspc_http::Error>(input.a + input.b)
//! })?;
//!
//! let app = axum::Router::new().nest_service("/add", add);
//! ```
#![warn(
    clippy::all,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::panic,
    clippy::todo,
    clippy::panic_in_result_fn,
    // missing_docs
)]
#![forbid(unsafe_code)]
#![allow(clippy::module_inception)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod classify;
pub mod cors;
pub mod decode;
pub mod middleware;
pub mod procedure;
pub mod report;

mod context;
mod error;
mod http;

pub use context::RequestContext;
pub use error::{
    reduce_status, BoxError, BuildError, DecodeError, EncodeError, Error, ErrorEnvelope,
    InputMismatch, Redirect, SignatureError,
};
pub use http::endpoint;
pub use procedure::{Options, Procedure};
