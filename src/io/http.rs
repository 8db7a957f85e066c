use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, RANGE};
use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{Connection, Opener};
use anyhow::{Result, bail};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP Range opener for remote blobs
///
/// Every [`open`](Opener::open) issues a fresh `GET` with `Range: bytes=<offset>-`.
pub struct HttpOpener {
    client: Client,
    url: String,
    size: Option<u64>,
    transferred_bytes: Arc<AtomicU64>,
}

impl HttpOpener {
    /// Create a new HTTP Range opener
    ///
    /// This will send a HEAD request to learn the blob size and Range support
    pub fn new(url: String) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        let resp = client.head(&url).send()?;

        if !resp.status().is_success() {
            bail!("HTTP request failed with status: {}", resp.status());
        }

        let accepts_ranges = resp
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("bytes"));

        if !accepts_ranges {
            log::warn!("{url}: server does not advertise Range support, resuming re-downloads skipped bytes");
        }

        // HEAD responses carry no body, so read the header rather than the body hint.
        let size = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());

        log::debug!("{url}: size {size:?}, ranges {accepts_ranges}");

        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Blob size from `Content-Length`, if the server sent one
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Total bytes transferred from network; stays readable after the
    /// opener has moved into a reader
    pub fn transfer_counter(&self) -> Arc<AtomicU64> {
        self.transferred_bytes.clone()
    }
}

impl Opener for HttpOpener {
    fn open(&self, offset: u64) -> io::Result<Box<dyn Connection>> {
        let resp = self
            .client
            .get(&self.url)
            .header(RANGE, format!("bytes={offset}-"))
            .send()
            .map_err(request_error)?;

        let skip = match resp.status() {
            StatusCode::PARTIAL_CONTENT => 0,
            StatusCode::OK => offset,
            StatusCode::RANGE_NOT_SATISFIABLE if self.size.is_some_and(|s| offset >= s) => {
                return Ok(Box::new(io::empty()));
            }
            status => {
                return Err(io::Error::other(format!(
                    "HTTP request for bytes={offset}- failed with status: {status}"
                )));
            }
        };

        let mut body = Body::new(resp, self.transferred_bytes.clone());
        if skip > 0 {
            log::warn!("{}: server ignored Range, discarding {skip} bytes", self.url);
            let discarded = io::copy(&mut (&mut body).take(skip), &mut io::sink())?;
            if discarded < skip {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("body ended after {discarded} of {skip} skipped bytes"),
                ));
            }
        }
        Ok(Box::new(body))
    }
}

fn request_error(err: reqwest::Error) -> io::Error {
    let kind = if err.is_timeout() {
        io::ErrorKind::TimedOut
    } else if err.is_connect() {
        io::ErrorKind::ConnectionRefused
    } else {
        io::ErrorKind::Other
    };
    io::Error::new(kind, err)
}

/// Response body that reports a short or severed transfer as `UnexpectedEof`
struct Body<R> {
    inner: R,
    remaining: Option<u64>,
    transferred_bytes: Arc<AtomicU64>,
}

impl Body<Response> {
    fn new(resp: Response, transferred_bytes: Arc<AtomicU64>) -> Self {
        let remaining = resp.content_length();
        Body {
            inner: resp,
            remaining,
            transferred_bytes,
        }
    }
}

impl<R> Body<R> {
    fn expecting_more(&self) -> bool {
        self.remaining.is_some_and(|r| r > 0)
    }
}

impl<R: Read> Read for Body<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(0) if !buf.is_empty() && self.expecting_more() => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("body ended with {} bytes outstanding", self.remaining.unwrap_or(0)),
            )),
            Ok(n) => {
                if let Some(r) = self.remaining.as_mut() {
                    *r = r.saturating_sub(n as u64);
                }
                self.transferred_bytes.fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            Err(e) if self.expecting_more() && severed(e.kind()) => {
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, e))
            }
            Err(e) => Err(e),
        }
    }
}

impl<R: Read + Send> Connection for Body<R> {}

fn severed(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::Other
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn body(data: &'static [u8], remaining: Option<u64>) -> Body<Cursor<&'static [u8]>> {
        Body {
            inner: Cursor::new(data),
            remaining,
            transferred_bytes: Arc::new(AtomicU64::new(0)),
        }
    }

    #[test]
    fn complete_body_ends_cleanly() {
        let mut b = body(b"hello", Some(5));
        let mut out = Vec::new();
        b.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
        assert_eq!(b.transferred_bytes.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn short_body_is_truncation() {
        let mut b = body(b"hel", Some(5));
        let mut buf = [0u8; 8];
        assert_eq!(b.read(&mut buf).unwrap(), 3);
        let err = b.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn unknown_length_ends_on_eof() {
        let mut b = body(b"abc", None);
        let mut out = Vec::new();
        b.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
    }

    struct Reset;

    impl Read for Reset {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::ConnectionReset.into())
        }
    }

    #[test]
    fn reset_mid_body_is_truncation() {
        let mut b = Body {
            inner: Reset,
            remaining: Some(10),
            transferred_bytes: Arc::new(AtomicU64::new(0)),
        };
        let err = b.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        b.remaining = None;
        let err = b.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }
}
