use std::{
    convert::Infallible,
    path::{Component, Path as FsPath, PathBuf},
    sync::Arc,
    time::Duration,
};

use axum::{
    body::Body,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::{stream, StreamExt, TryStreamExt};
use serde_json::{json, Value};
use tokio::{fs::File, io::AsyncWriteExt, net::TcpListener};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Pieces served, in order and with a pause between them, by `GET /chunks`.
pub const CHUNKS: [&str; 3] = ["alpha-", "beta-", "gamma"];

#[derive(Clone, Debug)]
pub struct Config {
    /// Where `POST /upload/*` persists request bodies.
    pub upload_dir: PathBuf,
    /// The file streamed back by `GET /dest/*`.
    pub fixture: PathBuf,
    /// How long `GET /timeout` stays silent.
    pub slow_delay: Duration,
}

impl Config {
    pub fn new(upload_dir: impl Into<PathBuf>, fixture: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            fixture: fixture.into(),
            slow_delay: Duration::from_secs(10),
        }
    }

    pub fn with_slow_delay(mut self, delay: Duration) -> Self {
        self.slow_delay = delay;
        self
    }

    /// Read `UPLOAD_DIR`, `FIXTURE` and `SLOW_DELAY_MS`, falling back to
    /// `./upload`, this crate's manifest and ten seconds.
    pub fn from_env() -> Self {
        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "upload".to_string());
        let fixture = std::env::var("FIXTURE")
            .unwrap_or_else(|_| concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml").to_string());
        let config = Self::new(upload_dir, fixture);
        match std::env::var("SLOW_DELAY_MS").ok().and_then(|v| v.parse().ok()) {
            Some(ms) => config.with_slow_delay(Duration::from_millis(ms)),
            None => config,
        }
    }
}

pub type Shared = Arc<Config>;

pub fn app(config: Config) -> Router {
    Router::new()
        .route("/json", post(echo_json))
        .route("/string", post(json_as_text))
        .route("/dest/{*rest}", get(serve_fixture))
        .route("/timeout", get(stay_silent))
        .route("/upload/{*name}", post(upload))
        .route("/echo", post(echo))
        .route("/chunks", get(chunks))
        .route("/broken", get(broken))
        .with_state(Arc::new(config))
}

pub async fn run(listener: TcpListener, config: Config) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(&config.upload_dir).await?;
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, upload_dir = %config.upload_dir.display(), "mock server listening");
    }
    axum::serve(listener, app(config)).await
}

async fn echo_json(Json(value): Json<Value>) -> Json<Value> {
    Json(value)
}

async fn json_as_text(Json(value): Json<Value>) -> String {
    value.to_string()
}

async fn serve_fixture(State(config): State<Shared>) -> Result<Body, StatusCode> {
    let file = File::open(&config.fixture).await.map_err(|e| {
        warn!(fixture = %config.fixture.display(), error = %e, "fixture unavailable");
        StatusCode::NOT_FOUND
    })?;
    Ok(Body::from_stream(ReaderStream::new(file)))
}

async fn stay_silent(State(config): State<Shared>) -> StatusCode {
    tokio::time::sleep(config.slow_delay).await;
    StatusCode::OK
}

async fn upload(
    State(config): State<Shared>,
    Path(name): Path<String>,
    body: Body,
) -> Result<Json<Value>, StatusCode> {
    let target = upload_target(&config.upload_dir, &name).ok_or(StatusCode::BAD_REQUEST)?;
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    }

    let mut file = File::create(&target)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let mut data = body.into_data_stream();
    let mut written = 0;
    while let Some(chunk) = data.try_next().await.map_err(|_| StatusCode::BAD_REQUEST)? {
        file.write_all(&chunk)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        written += chunk.len();
    }
    file.flush().await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    debug!(path = %target.display(), written, "upload saved");
    Ok(Json(json!({ "filepath": target })))
}

/// `<upload_dir>/<name>.temp`, or `None` if `name` tries to leave the directory.
fn upload_target(upload_dir: &FsPath, name: &str) -> Option<PathBuf> {
    let relative = FsPath::new(name);
    let plain = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if name.is_empty() || !plain {
        return None;
    }
    Some(upload_dir.join(format!("{name}.temp")))
}

async fn echo(body: Body) -> Body {
    Body::from_stream(body.into_data_stream())
}

async fn chunks() -> Body {
    let pieces = stream::iter(CHUNKS).then(|piece| async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        Ok::<_, Infallible>(Bytes::from_static(piece.as_bytes()))
    });
    Body::from_stream(pieces)
}

/// Sends the first chunk, then fails the body so the connection is cut
/// mid-response.
async fn broken() -> Body {
    let pieces = stream::iter([
        Ok(Bytes::from_static(CHUNKS[0].as_bytes())),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "body cut short")),
    ]);
    Body::from_stream(pieces)
}
