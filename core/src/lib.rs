//! Minimal HTTP/1.1 request helper.
//!
//! # Overview
//! `RequestRunner` issues one request described by `RequestOptions`. The
//! request body can come from a stream, a file path, a buffer, or an inline
//! `Body` (JSON-serialized when structured). The response is either buffered
//! into `RequestResult::body` or routed to a `ByteSink` (a stream or a file
//! path). An optional idle timeout fails the call with a 408
//! "Request Timeout" when the connection goes quiet.
//!
//! # Design
//! - `send` is the call as a single future; `run` spawns it and delivers the
//!   outcome to a callback through a one-shot `Completion` latch.
//! - Sources and sinks are closed enums; path variants are opened right
//!   before dispatch.
//! - hyper's HTTP/1.1 client connection does the protocol work. There is no
//!   pooling, retrying or redirect handling.

pub mod client;
pub mod completion;
pub mod error;
pub mod http;
mod idle;
pub mod types;

pub use crate::client::RequestRunner;
pub use crate::completion::{Completion, Outcome};
pub use crate::error::Error;
pub use crate::http::{HttpMethod, RequestOptions, RequestResult};
pub use crate::types::{Body, ByteSink, ByteSource};
