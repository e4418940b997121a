//! The response body type.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::stream::Stream;
use http_body::{Frame, SizeHint};
use tokio_util::io::ReaderStream;

// Matches the body-write chunk bound of the handlers.
const CHUNK_SIZE: usize = 32 * 1024;

/// Body is returned by the webdav handler, and implements both `Stream`
/// and `http_body::Body`.
pub struct Body {
    inner: BodyType,
}

enum BodyType {
    Empty,
    Bytes(Option<Bytes>),
    File(ReaderStream<tokio::fs::File>),
}

impl Body {
    /// Return an empty body.
    pub fn empty() -> Body {
        Body { inner: BodyType::Empty }
    }

    /// Stream a file's content in bounded chunks.
    pub(crate) fn file(file: tokio::fs::File) -> Body {
        Body {
            inner: BodyType::File(ReaderStream::with_capacity(file, CHUNK_SIZE)),
        }
    }
}

impl Stream for Body {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner {
            BodyType::Empty => Poll::Ready(None),
            BodyType::Bytes(ref mut b) => Poll::Ready(b.take().map(Ok)),
            BodyType::File(ref mut strm) => Pin::new(strm).poll_next(cx),
        }
    }
}

impl http_body::Body for Body {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.poll_next(cx)
            .map(|opt| opt.map(|res| res.map(Frame::data)))
    }

    fn is_end_stream(&self) -> bool {
        match self.inner {
            BodyType::Empty => true,
            BodyType::Bytes(ref b) => b.is_none(),
            BodyType::File(_) => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self.inner {
            BodyType::Empty => SizeHint::with_exact(0),
            BodyType::Bytes(Some(ref b)) => SizeHint::with_exact(b.len() as u64),
            BodyType::Bytes(None) => SizeHint::with_exact(0),
            BodyType::File(_) => SizeHint::default(),
        }
    }
}

impl From<String> for Body {
    fn from(t: String) -> Body {
        Body {
            inner: BodyType::Bytes(Some(Bytes::from(t))),
        }
    }
}

impl From<&str> for Body {
    fn from(t: &str) -> Body {
        Body {
            inner: BodyType::Bytes(Some(Bytes::from(t.to_string()))),
        }
    }
}

impl From<Bytes> for Body {
    fn from(t: Bytes) -> Body {
        Body {
            inner: BodyType::Bytes(Some(t)),
        }
    }
}
