use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::anyhow;
use bytes::Bytes;
use futures_core::{ready, Stream};
use hyper::Body;
use pin_project_lite::pin_project;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::trace;

/// A checksum announced by the server for a download
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExpectedChecksum {
    Sha1([u8; 20]),
    Md5([u8; 16]),
}

#[derive(Debug, Error)]
#[error("{algorithm} mismatch: expected {expected}, got {actual}")]
pub struct ChecksumMismatch {
    pub algorithm: &'static str,
    pub expected: String,
    pub actual: String,
}

enum RunningChecksum {
    Sha1(Sha1, [u8; 20]),
    Md5(md5::Context, [u8; 16]),
}
impl RunningChecksum {
    fn start(expected: ExpectedChecksum) -> RunningChecksum {
        match expected {
            ExpectedChecksum::Sha1(hash) => RunningChecksum::Sha1(Sha1::new(), hash),
            ExpectedChecksum::Md5(hash) => RunningChecksum::Md5(md5::Context::new(), hash),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            RunningChecksum::Sha1(hasher, _) => hasher.update(data),
            RunningChecksum::Md5(context, _) => context.consume(data),
        }
    }

    fn verify(&self) -> Result<(), ChecksumMismatch> {
        let (algorithm, actual, expected) = match self {
            RunningChecksum::Sha1(hasher, expected) => {
                ("SHA1", hex::encode(hasher.clone().finalize()), hex::encode(expected))
            }
            RunningChecksum::Md5(context, expected) => {
                ("MD5", hex::encode(context.clone().compute().0), hex::encode(expected))
            }
        };
        trace!("verifying {} checksum", algorithm);
        if actual == expected {
            Ok(())
        }
        else {
            Err(ChecksumMismatch { algorithm, expected, actual })
        }
    }
}

pin_project! {
    /// Wraps an HTTP body so it can be streamed to its destination while its checksums are
    ///  computed on the fly.
    ///
    /// A checksum mismatch is reported as an error item after the last data chunk, so a consumer
    ///  that writes the stream to a temporary file sees the failure before committing it. After an
    ///  error item the stream does not poll the wrapped body again.
    pub struct ValidatingHttpBody {
        #[pin]
        http_body: Body,
        checksums: Vec<RunningChecksum>,
        is_failed: bool,
    }
}
impl ValidatingHttpBody {
    pub fn new(http_body: Body, expected: impl IntoIterator<Item = ExpectedChecksum>) -> ValidatingHttpBody {
        ValidatingHttpBody {
            http_body,
            checksums: expected.into_iter().map(RunningChecksum::start).collect(),
            is_failed: false,
        }
    }
}

impl Stream for ValidatingHttpBody {
    type Item = anyhow::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.is_failed {
            return Poll::Ready(Some(Err(anyhow!("download already failed"))));
        }

        let this = self.project();
        match ready!(this.http_body.poll_next(cx)) {
            Some(Ok(data)) => {
                this.checksums.iter_mut().for_each(|c| c.update(&data));
                Poll::Ready(Some(Ok(data)))
            }
            Some(Err(e)) => {
                *this.is_failed = true;
                Poll::Ready(Some(Err(e.into())))
            }
            None => match this.checksums.iter().try_for_each(RunningChecksum::verify) {
                Ok(()) => Poll::Ready(None),
                Err(mismatch) => {
                    *this.is_failed = true;
                    Poll::Ready(Some(Err(mismatch.into())))
                }
            },
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.http_body.size_hint()
    }
}
