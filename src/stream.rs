use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use std::fmt;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::s3::ObjectBody;

/// Content of a stored file, read lazily chunk by chunk
///
/// The stream owns the response body of a GET request. The body (and with it
/// the network connection) is released exactly once: when the end of the
/// object is reached, when an empty chunk arrives, after the first error, or
/// when the stream is dropped before being exhausted.
pub struct FileStream {
    key: String,
    body: Option<ObjectBody>,
}

impl FileStream {
    pub(crate) fn new(key: impl Into<String>, body: ObjectBody) -> Self {
        Self {
            key: key.into(),
            body: Some(body),
        }
    }

    /// Key of the object being read
    pub fn key(&self) -> &str {
        &self.key
    }

    /// True once the underlying response has been released
    pub fn is_released(&self) -> bool {
        self.body.is_none()
    }

    /// Read the remaining content into memory
    pub async fn read_to_end(mut self) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        while let Some(chunk) = self.try_next().await? {
            content.extend_from_slice(&chunk);
        }
        Ok(content)
    }

    fn release(&mut self, reason: &str) {
        if self.body.take().is_some() {
            debug!("Released response for {} ({})", self.key, reason);
        }
    }
}

impl Stream for FileStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(body) = this.body.as_mut() else {
            return Poll::Ready(None);
        };

        match ready!(body.poll_next_unpin(cx)) {
            Some(Ok(chunk)) if !chunk.is_empty() => Poll::Ready(Some(Ok(chunk))),
            Some(Ok(_)) | None => {
                this.release("exhausted");
                Poll::Ready(None)
            }
            Some(Err(e)) => {
                this.release("failed");
                Poll::Ready(Some(Err(StorageError::from(e))))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.body {
            Some(body) => (0, body.size_hint().1),
            None => (0, Some(0)),
        }
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        self.release("dropped before the end");
    }
}

impl fmt::Debug for FileStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStream")
            .field("key", &self.key)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::S3Error;
    use futures::stream;

    fn body(chunks: Vec<std::result::Result<&'static str, S3Error>>) -> ObjectBody {
        stream::iter(
            chunks
                .into_iter()
                .map(|c| c.map(|s| Bytes::from_static(s.as_bytes()))),
        )
        .boxed()
    }

    #[tokio::test]
    async fn test_reads_all_chunks_then_releases() {
        let mut stream = FileStream::new("k", body(vec![Ok("ab"), Ok("cd")]));
        assert_eq!(stream.key(), "k");

        assert_eq!(stream.next().await.unwrap().unwrap(), "ab");
        assert!(!stream.is_released());
        assert_eq!(stream.next().await.unwrap().unwrap(), "cd");
        assert!(stream.next().await.is_none());
        assert!(stream.is_released());

        // Polling after the end stays finished
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_chunk_ends_stream() {
        let mut stream = FileStream::new("k", body(vec![Ok("ab"), Ok(""), Ok("never")]));

        assert_eq!(stream.next().await.unwrap().unwrap(), "ab");
        assert!(stream.next().await.is_none());
        assert!(stream.is_released());
    }

    #[tokio::test]
    async fn test_error_releases_body() {
        let mut stream = FileStream::new(
            "k",
            body(vec![Ok("ab"), Err(S3Error::other("connection reset")), Ok("cd")]),
        );

        assert!(stream.next().await.unwrap().is_ok());
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StorageError::S3(_)));
        assert!(stream.is_released());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_read_to_end() {
        let stream = FileStream::new("k", body(vec![Ok("hello "), Ok("world")]));
        assert_eq!(stream.read_to_end().await.unwrap(), b"hello world");
    }
}
