//! Socket-inactivity timeout.
//!
//! # Design
//! The connection is wrapped in `Tracked`, which stamps a shared `Activity`
//! every time a read or write moves bytes. The `idle` watchdog sleeps until
//! the last stamp plus the limit and re-arms itself whenever traffic pushed
//! the deadline out. A slow but steady transfer therefore never times out; a
//! silent connection does, no matter how long the call has been running.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep_until, Instant};

/// Last time bytes moved on a connection.
#[derive(Debug)]
pub(crate) struct Activity {
    origin: Instant,
    last_nanos: AtomicU64,
}

impl Activity {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            last_nanos: AtomicU64::new(0),
        })
    }

    pub(crate) fn touch(&self) {
        let nanos = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.last_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    pub(crate) fn last(&self) -> Instant {
        self.origin + Duration::from_nanos(self.last_nanos.load(Ordering::Relaxed))
    }
}

/// Resolves once nothing moved on the connection for `limit`.
pub(crate) async fn idle(activity: Arc<Activity>, limit: Duration) {
    loop {
        let deadline = activity.last() + limit;
        if Instant::now() >= deadline {
            return;
        }
        sleep_until(deadline).await;
    }
}

/// I/O wrapper that reports traffic to an `Activity`.
#[derive(Debug)]
pub(crate) struct Tracked<S> {
    inner: S,
    activity: Arc<Activity>,
}

impl<S> Tracked<S> {
    pub(crate) fn new(inner: S, activity: Arc<Activity>) -> Self {
        Self { inner, activity }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Tracked<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let polled = Pin::new(&mut self.inner).poll_read(cx, buf);
        if matches!(polled, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            self.activity.touch();
        }
        polled
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Tracked<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let polled = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = polled {
            if n > 0 {
                self.activity.touch();
            }
        }
        polled
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let polled = Pin::new(&mut self.inner).poll_write_vectored(cx, bufs);
        if let Poll::Ready(Ok(n)) = polled {
            if n > 0 {
                self.activity.touch();
            }
        }
        polled
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test(start_paused = true)]
    async fn silent_connection_goes_idle() {
        let activity = Activity::new();
        let started = Instant::now();
        idle(activity, Duration::from_millis(100)).await;
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn traffic_pushes_the_deadline_out() {
        let activity = Activity::new();
        let (client, mut server) = duplex(64);
        let mut tracked = Tracked::new(client, activity.clone());

        let started = Instant::now();
        let watchdog = tokio::spawn(idle(activity.clone(), Duration::from_millis(100)));

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(60)).await;
            tracked.write_all(b"ping").await.unwrap();
            let mut buf = [0u8; 4];
            server.read_exact(&mut buf).await.unwrap();
        }

        watchdog.await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(280));
    }

    #[tokio::test]
    async fn reads_are_stamped() {
        let activity = Activity::new();
        let (client, mut server) = duplex(64);
        let mut tracked = Tracked::new(client, activity.clone());
        let before = activity.last();

        tokio::time::sleep(Duration::from_millis(5)).await;
        server.write_all(b"pong").await.unwrap();
        let mut buf = [0u8; 4];
        tracked.read_exact(&mut buf).await.unwrap();

        assert_eq!(&buf, b"pong");
        assert!(activity.last() > before);
    }
}
