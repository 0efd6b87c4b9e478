// ── Change event streams ──
//
// Async consumption of change bus events for callers that would rather
// `.next().await` than register a callback.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::bus::ChangeEvent;

/// A subscription to the change events of one entity type.
pub struct EventStream<E> {
    inner: UnboundedReceiverStream<ChangeEvent<E>>,
}

impl<E> EventStream<E> {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<ChangeEvent<E>>) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(receiver),
        }
    }

    /// Take an already-delivered event without waiting.
    pub fn try_next(&mut self) -> Option<ChangeEvent<E>> {
        self.inner.as_mut().try_recv().ok()
    }
}

impl<E> Stream for EventStream<E> {
    type Item = ChangeEvent<E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // UnboundedReceiverStream is Unpin, so re-pinning the field is fine.
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
