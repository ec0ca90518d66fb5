//! Byte-budget enforcement for request bodies.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;
use pin_project_lite::pin_project;

use super::BodyError;

pin_project! {
    /// A stream that errors once more than `limit` bytes have passed
    /// through it.
    ///
    /// The error is an [`io::Error`] wrapping
    /// [`BodyError::PayloadTooLarge`]; the server adapter turns it into a
    /// `413` and closes the connection.
    pub struct LimitedStream<S> {
        #[pin]
        inner: S,
        limit: u64,
        consumed: u64,
        tripped: bool,
    }
}

impl<S> LimitedStream<S> {
    /// Wrap `inner` with a byte budget.
    pub fn new(inner: S, limit: u64) -> Self {
        LimitedStream {
            inner,
            limit,
            consumed: 0,
            tripped: false,
        }
    }
}

impl<S> Stream for LimitedStream<S>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.tripped {
            return Poll::Ready(None);
        }
        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                *this.consumed += chunk.len() as u64;
                if *this.consumed > *this.limit {
                    *this.tripped = true;
                    Poll::Ready(Some(Err(io::Error::other(BodyError::PayloadTooLarge {
                        limit: *this.limit,
                    }))))
                } else {
                    Poll::Ready(Some(Ok(chunk)))
                }
            }
            other => other,
        }
    }
}

/// Whether an [`io::Error`] carries a [`BodyError::PayloadTooLarge`].
pub(crate) fn is_payload_too_large(err: &io::Error) -> bool {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<BodyError>())
        .is_some_and(|inner| matches!(inner, BodyError::PayloadTooLarge { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn chunks(chunks: Vec<&'static [u8]>) -> impl Stream<Item = io::Result<Bytes>> {
        futures_util::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn under_the_limit_passes_through() {
        let mut stream = LimitedStream::new(chunks(vec![b"ab", b"cd"]), 10);
        let mut total = 0;
        while let Some(chunk) = stream.next().await {
            total += chunk.unwrap().len();
        }
        assert_eq!(total, 4);
    }

    #[tokio::test]
    async fn crossing_the_limit_errors() {
        let mut stream = LimitedStream::new(chunks(vec![b"abcd", b"efgh"]), 6);
        assert!(stream.next().await.unwrap().is_ok());
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(is_payload_too_large(&err));
        // the stream is fused after tripping
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn limit_error_converts_to_body_error() {
        let body = crate::body::Body::from_stream(
            LimitedStream::new(chunks(vec![b"abcdefgh"]), 4),
            None,
            None,
        );
        match body.read_bytes().await {
            Err(BodyError::PayloadTooLarge { limit }) => assert_eq!(limit, 4),
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }
}
