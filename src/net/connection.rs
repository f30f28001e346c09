//! In-flight request tracking.
//!
//! # Responsibilities
//! - Count requests currently being served by one listener
//! - Let a draining listener wait until the count reaches zero
//! - Keep a request counted while its response body streams
//!
//! # Design Decisions
//! - RAII guard: the count drops even if the handler is cancelled or panics
//! - Watch channel instead of polling so waiters wake exactly on change

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes, HttpBody};
use hyper::body::{Frame, SizeHint};
use tokio::sync::watch;

/// Tracks in-flight requests for one listener.
#[derive(Debug, Clone)]
pub struct RequestTracker {
    count: Arc<watch::Sender<usize>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            count: Arc::new(tx),
        }
    }

    /// Record a new in-flight request. Returns a guard that decrements on drop.
    pub fn track(&self) -> RequestGuard {
        self.count.send_modify(|c| *c += 1);
        RequestGuard {
            count: Arc::clone(&self.count),
        }
    }

    /// Current in-flight request count.
    pub fn in_flight(&self) -> usize {
        *self.count.borrow()
    }

    /// Wait until no request is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|c| *c == 0).await;
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a request's lifetime.
#[derive(Debug)]
pub struct RequestGuard {
    count: Arc<watch::Sender<usize>>,
}

impl RequestGuard {
    /// Keep the request counted until `body` is finished or dropped.
    pub fn attach(self, body: Body) -> Body {
        Body::new(TrackedBody {
            inner: body,
            _guard: self,
        })
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.count.send_modify(|c| *c = c.saturating_sub(1));
    }
}

/// Response body that holds a [`RequestGuard`] while it streams.
struct TrackedBody {
    inner: Body,
    _guard: RequestGuard,
}

impl HttpBody for TrackedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
