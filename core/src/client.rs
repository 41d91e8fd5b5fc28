//! The request runner: one HTTP/1.1 exchange from options to outcome.
//!
//! # Design
//! `RequestRunner::send` is the whole lifecycle as one future, so the first
//! terminal event (transport error, idle timeout, sink error, or normal
//! completion) is the only one that can produce a value. `run` wraps that
//! future in a spawned task and a `Completion` latch for callers that want a
//! callback instead.
//!
//! Suspension points are connect, request-body write, response head,
//! response body, sink finish, and the idle watchdog. The request body is
//! prepared before connecting, so a missing source file fails without
//! touching the network.

use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::TryStreamExt;
use http::header::{CONTENT_LENGTH, HOST};
use http::Request;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, trace};

use crate::completion::{Completion, Outcome};
use crate::error::Error;
use crate::http::{RequestOptions, RequestResult};
use crate::idle::{idle, Activity, Tracked};
use crate::types::{Body, ByteSink, ByteSource};

type OutgoingBody = UnsyncBoxBody<Bytes, io::Error>;

/// Drives a single request described by `RequestOptions`.
#[derive(Debug)]
pub struct RequestRunner {
    options: RequestOptions,
}

impl RequestRunner {
    pub fn new(options: RequestOptions) -> Self {
        Self { options }
    }

    /// Spawn the call and hand its outcome to `callback` exactly once.
    ///
    /// Must be called from within a tokio runtime. The callback runs on the
    /// spawned task, never inside `run`.
    pub fn run<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        let mut completion = Completion::new(callback);
        tokio::spawn(async move {
            let outcome = self.send().await;
            completion.fire(outcome);
        })
    }

    /// Perform the call and resolve with its outcome.
    pub async fn send(self) -> Result<RequestResult, Error> {
        let mut options = self.options;
        let source = options.source.take();
        let body = options.body.take();
        let dest = options.dest.take();

        let (outgoing, content_length) = prepare_body(source, body).await?;
        let request = build_request(&options, outgoing, content_length)?;

        debug!(
            method = options.method.as_str(),
            host = %options.host,
            port = options.port,
            path = %options.path,
            "sending request"
        );

        let activity = Activity::new();
        let exchange = exchange(
            options.host.clone(),
            options.port,
            request,
            dest,
            activity.clone(),
        );

        let outcome = match options.idle_timeout() {
            Some(limit) => {
                tokio::select! {
                    outcome = exchange => outcome,
                    _ = idle(activity, limit) => {
                        debug!(?limit, "connection idle, giving up");
                        Err(Error::Timeout)
                    }
                }
            }
            None => exchange.await,
        };

        match &outcome {
            Ok(result) => debug!(status = result.status, "request complete"),
            Err(err) => debug!(error = %err, "request failed"),
        }
        outcome
    }
}

/// Turn the source or inline body into an outgoing body. The second value is
/// an explicit `content-length` for bodies whose size the stream can't report.
async fn prepare_body(
    source: Option<ByteSource>,
    body: Option<Body>,
) -> Result<(OutgoingBody, Option<u64>), Error> {
    match (source, body) {
        (Some(ByteSource::Stream(reader)), _) => Ok((streamed(reader), None)),
        (Some(ByteSource::Path(path)), _) => {
            let meta = tokio::fs::metadata(&path).await.map_err(Error::Source)?;
            let file = tokio::fs::File::open(&path).await.map_err(Error::Source)?;
            trace!(path = %path.display(), size = meta.len(), "streaming source file");
            Ok((streamed(file), Some(meta.len())))
        }
        (Some(ByteSource::Buffer(bytes)), _) => Ok((full(bytes), None)),
        (None, Some(body)) => Ok((full(body.into_bytes()?), None)),
        (None, None) => {
            let empty = Empty::<Bytes>::new().map_err(|never| match never {});
            Ok((empty.boxed_unsync(), None))
        }
    }
}

fn streamed<R>(reader: R) -> OutgoingBody
where
    R: AsyncRead + Send + Unpin + 'static,
{
    StreamBody::new(ReaderStream::new(reader).map_ok(Frame::data)).boxed_unsync()
}

fn full(bytes: Bytes) -> OutgoingBody {
    Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
}

fn build_request(
    options: &RequestOptions,
    body: OutgoingBody,
    content_length: Option<u64>,
) -> Result<Request<OutgoingBody>, Error> {
    let mut builder = Request::builder()
        .method(http::Method::from(options.method))
        .uri(options.path.as_str());

    if !options.has_header(HOST.as_str()) {
        builder = builder.header(HOST, options.authority());
    }
    for (name, value) in &options.headers {
        // A path source's stat size replaces any caller-supplied length.
        if content_length.is_some() && name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str()) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(len) = content_length {
        builder = builder.header(CONTENT_LENGTH, len);
    }

    builder.body(body).map_err(Error::InvalidRequest)
}

/// Connect, send, and route the response. The socket is wrapped in `Tracked`
/// so the idle watchdog sees its traffic.
async fn exchange(
    host: String,
    port: u16,
    request: Request<OutgoingBody>,
    dest: Option<ByteSink>,
    activity: Arc<Activity>,
) -> Result<RequestResult, Error> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let stream = TcpStream::connect((bare, port))
        .await
        .map_err(Error::Connect)?;
    activity.touch();

    let io = TokioIo::new(Tracked::new(stream, activity));
    let (mut sender, conn) = http1::handshake(io).await.map_err(Error::Transport)?;
    let driver = ConnectionDriver(tokio::spawn(async move {
        if let Err(err) = conn.await {
            trace!(error = %err, "connection closed with error");
        }
    }));

    let mut response = sender.send_request(request).await.map_err(Error::Transport)?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    debug!(status, "response received");

    let body = match dest {
        Some(dest) => {
            let sink = open_sink(dest).await?;
            pipe_to_sink(response.body_mut(), sink).await?;
            None
        }
        None => Some(collect_chunks(response.body_mut()).await?),
    };

    drop(driver);
    Ok(RequestResult {
        status,
        headers,
        body,
    })
}

async fn open_sink(dest: ByteSink) -> Result<Box<dyn AsyncWrite + Send + Unpin>, Error> {
    match dest {
        ByteSink::Stream(writer) => Ok(writer),
        ByteSink::Path(path) => {
            let file = tokio::fs::File::create(&path)
                .await
                .map_err(Error::Destination)?;
            Ok(Box::new(file))
        }
    }
}

/// Copy the response into `sink`; the sink is finished once flushed and
/// shut down.
async fn pipe_to_sink(
    body: &mut Incoming,
    mut sink: Box<dyn AsyncWrite + Send + Unpin>,
) -> Result<(), Error> {
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(Error::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            sink.write_all(chunk).await.map_err(Error::Destination)?;
        }
    }
    sink.flush().await.map_err(Error::Destination)?;
    sink.shutdown().await.map_err(Error::Destination)?;
    Ok(())
}

/// Buffer the response in arrival order.
async fn collect_chunks(body: &mut Incoming) -> Result<Bytes, Error> {
    let mut chunks = Vec::new();
    let mut size = 0;
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(Error::Transport)?;
        if let Ok(chunk) = frame.into_data() {
            size += chunk.len();
            chunks.push(chunk);
        }
    }
    let mut buf = BytesMut::with_capacity(size);
    for chunk in chunks {
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Aborts the spawned connection task when the exchange settles either way.
struct ConnectionDriver(JoinHandle<()>);

impl Drop for ConnectionDriver {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use serde_json::json;

    async fn body_bytes(body: OutgoingBody) -> Bytes {
        body.collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn source_wins_over_body() {
        let (body, len) = prepare_body(
            Some(ByteSource::from(b"from source".to_vec())),
            Some(Body::from("from body")),
        )
        .await
        .unwrap();
        assert!(len.is_none());
        assert_eq!(&body_bytes(body).await[..], b"from source");
    }

    #[tokio::test]
    async fn json_body_is_serialized() {
        let (body, _) = prepare_body(None, Some(Body::from(json!({ "name": "test" }))))
            .await
            .unwrap();
        let back: serde_json::Value = serde_json::from_slice(&body_bytes(body).await).unwrap();
        assert_eq!(back, json!({ "name": "test" }));
    }

    #[tokio::test]
    async fn no_payload_sends_empty_body() {
        let (body, len) = prepare_body(None, None).await.unwrap();
        assert!(len.is_none());
        assert!(body_bytes(body).await.is_empty());
    }

    #[tokio::test]
    async fn missing_source_file_is_not_found() {
        let err = prepare_body(Some(ByteSource::path("/definitely/not/here.bin")), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Source(_)));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn source_file_sets_content_length() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");
        let expected = tokio::fs::read(path).await.unwrap();
        let (body, len) = prepare_body(Some(ByteSource::path(path)), None).await.unwrap();
        assert_eq!(len, Some(expected.len() as u64));
        assert_eq!(&body_bytes(body).await[..], &expected[..]);
    }

    #[test]
    fn request_gets_host_unless_given() {
        let opts = RequestOptions::new("localhost", 3000)
            .with_method(HttpMethod::Post)
            .with_path("/upload/file");
        let req = build_request(&opts, full(Bytes::new()), Some(12)).unwrap();
        assert_eq!(req.method(), http::Method::POST);
        assert_eq!(req.uri().path(), "/upload/file");
        assert_eq!(req.headers()[HOST], "localhost:3000");
        assert_eq!(req.headers()[CONTENT_LENGTH], "12");

        let opts = RequestOptions::new("localhost", 3000).header("Host", "api.internal");
        let req = build_request(&opts, full(Bytes::new()), None).unwrap();
        assert_eq!(req.headers().get_all(HOST).iter().count(), 1);
        assert_eq!(req.headers()[HOST], "api.internal");
    }

    #[test]
    fn source_file_length_replaces_caller_length() {
        let opts = RequestOptions::new("localhost", 3000)
            .with_method(HttpMethod::Post)
            .header("Content-Length", "5");
        let req = build_request(&opts, full(Bytes::new()), Some(11874)).unwrap();
        assert_eq!(req.headers().get_all(CONTENT_LENGTH).iter().count(), 1);
        assert_eq!(req.headers()[CONTENT_LENGTH], "11874");

        let req = build_request(&opts, full(Bytes::new()), None).unwrap();
        assert_eq!(req.headers()[CONTENT_LENGTH], "5");
    }

    #[test]
    fn bad_header_is_an_invalid_request() {
        let opts = RequestOptions::new("localhost", 3000).header("bad header", "x");
        let err = build_request(&opts, full(Bytes::new()), None).err().unwrap();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
