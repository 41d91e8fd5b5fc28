//! Request-body sources, inline bodies and response sinks.
//!
//! # Design
//! Each polymorphic option is a closed enum. A `Path` variant is resolved into
//! an opened file stream by the runner right before dispatch, so there is no
//! runtime type inspection and no "unusable destination" case to fall into.

use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Error;

/// Where request-body bytes come from. Takes priority over `Body`.
pub enum ByteSource {
    /// Piped into the request as a chunked body.
    Stream(Box<dyn AsyncRead + Send + Unpin>),
    /// Stat'ed for `content-length`, then streamed from disk.
    Path(PathBuf),
    /// Sent as the complete body.
    Buffer(Bytes),
}

impl ByteSource {
    pub fn stream<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        ByteSource::Stream(Box::new(reader))
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        ByteSource::Path(path.into())
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteSource::Stream(_) => f.write_str("Stream(..)"),
            ByteSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            ByteSource::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
        }
    }
}

impl From<Bytes> for ByteSource {
    fn from(bytes: Bytes) -> Self {
        ByteSource::Buffer(bytes)
    }
}

impl From<Vec<u8>> for ByteSource {
    fn from(bytes: Vec<u8>) -> Self {
        ByteSource::Buffer(Bytes::from(bytes))
    }
}

/// An inline request body, used only when no `ByteSource` is given.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Bytes(Bytes),
    Text(String),
    /// Serialized to JSON text at dispatch time.
    Json(serde_json::Value),
}

impl Body {
    /// Capture any serializable value as a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        serde_json::to_value(value)
            .map(Body::Json)
            .map_err(Error::Serialization)
    }

    /// The wire bytes of this body.
    pub(crate) fn into_bytes(self) -> Result<Bytes, Error> {
        match self {
            Body::Bytes(bytes) => Ok(bytes),
            Body::Text(text) => Ok(Bytes::from(text)),
            Body::Json(value) => serde_json::to_vec(&value)
                .map(Bytes::from)
                .map_err(Error::Serialization),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

/// Where response bytes go instead of being buffered into the result.
pub enum ByteSink {
    /// Written, flushed and shut down; the call finishes after shutdown.
    Stream(Box<dyn AsyncWrite + Send + Unpin>),
    /// Created (or truncated) when the response arrives.
    Path(PathBuf),
}

impl ByteSink {
    pub fn stream<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        ByteSink::Stream(Box::new(writer))
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        ByteSink::Path(path.into())
    }
}

impl fmt::Debug for ByteSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteSink::Stream(_) => f.write_str("Stream(..)"),
            ByteSink::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}
