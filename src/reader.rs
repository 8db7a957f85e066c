//! Resumable, seekable reader over a remote blob.
//!
//! [`ResumableReader`] turns an [`Opener`] into a `Read + Seek` stream. It
//! holds at most one live [`Connection`], opens it lazily at the current
//! offset, and replaces it after a seek to a new position or after the
//! connection dies mid-body.
//!
//! ## Reconnect policy
//!
//! A connection that fails with `UnexpectedEof` is treated as dropped: the
//! reader closes it and opens a fresh one at the current offset. Every such
//! failure that produced no bytes counts as a stall; any progress resets the
//! count. Once [`MAX_STALLS`] is exceeded the truncation is reported as
//! [`RemoteError::Truncated`]. A reconnect that fails ends the read the same
//! way.
//!
//! ## End of a known size
//!
//! When the offset has reached a known size the reader does not ask the
//! opener for a zero-length range, which many servers reject. It substitutes
//! [`io::Empty`] instead, so reading exactly up to the declared size always
//! finishes with a clean end of stream.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Mutex, PoisonError};

use crate::error::RemoteError;
use crate::io::{Connection, Opener, ReadAt};

/// Consecutive zero-progress truncations tolerated before a read gives up.
pub const MAX_STALLS: u32 = 3;

pub struct ResumableReader {
    size: Option<u64>,
    offset: u64,
    // Only touched through `&mut self`, via `get_mut`. The mutex makes the
    // reader `Sync` so `read_at` can be shared across threads.
    conn: Mutex<Option<Box<dyn Connection>>>,
    opener: Option<Box<dyn Opener>>,
    closed: bool,
    stalls: u32,
}

impl ResumableReader {
    /// Create a reader over a blob of `size` bytes (`None` if unknown).
    ///
    /// Nothing is opened until the first read.
    pub fn new(size: Option<u64>, opener: impl Opener + 'static) -> Self {
        Self::with_opener(size, Some(Box::new(opener)))
    }

    /// Create a reader that has no way to connect. Every operation that
    /// needs a connection fails with [`RemoteError::NotImplemented`].
    pub fn without_opener(size: Option<u64>) -> Self {
        Self::with_opener(size, None)
    }

    fn with_opener(size: Option<u64>, opener: Option<Box<dyn Opener>>) -> Self {
        Self {
            size,
            offset: 0,
            conn: Mutex::new(None),
            opener,
            closed: false,
            stalls: 0,
        }
    }

    /// Current logical read position.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether a connection (real or the empty tail stand-in) is held.
    pub fn has_connection(&self) -> bool {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Release the held connection and mark the reader closed.
    ///
    /// Only the first call does anything; its result is the connection's
    /// close result. Later reads report end of stream.
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.slot().take() {
            Some(conn) => conn.close(),
            None => Ok(()),
        }
    }

    fn slot(&mut self) -> &mut Option<Box<dyn Connection>> {
        self.conn.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close and forget the held connection. Close failures are logged only.
    fn release(&mut self, context: &str) {
        if let Some(conn) = self.slot().take() {
            log::trace!("{context}: releasing connection at offset {}", self.offset);
            if let Err(err) = conn.close() {
                log::error!("{context}: failed to close connection: {err}");
            }
        }
    }

    /// The held connection, opening one at the current offset if needed.
    fn connection(&mut self) -> io::Result<&mut Box<dyn Connection>> {
        if self.slot().is_none() {
            let conn = self.dial()?;
            *self.slot() = Some(conn);
        }
        self.slot()
            .as_mut()
            .ok_or_else(|| io::Error::other("connection slot empty after dial"))
    }

    fn dial(&self) -> io::Result<Box<dyn Connection>> {
        let offset = self.offset;
        if self.size.is_some_and(|size| offset >= size) {
            log::trace!("offset {offset} at end of blob, using empty stream");
            return Ok(Box::new(io::empty()));
        }

        let opener = self
            .opener
            .as_deref()
            .ok_or(RemoteError::NotImplemented { op: "read" })?;
        log::debug!("opening connection at offset {offset}");
        opener
            .open(offset)
            .map_err(|source| RemoteError::Open { op: "read", offset, source }.into())
    }
}

impl Read for ResumableReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed || buf.is_empty() {
            return Ok(0);
        }

        loop {
            let result = self.connection()?.read(buf);
            match result {
                Ok(0) => {
                    // Clean end: drop the connection now so whoever watches
                    // it sees the transfer finish.
                    self.release("read: end of stream");
                    return Ok(0);
                }
                Ok(n) => {
                    self.offset += n as u64;
                    self.stalls = 0;
                    return Ok(n);
                }
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    self.stalls += 1;
                    if self.stalls > MAX_STALLS {
                        return Err(RemoteError::Truncated {
                            offset: self.offset,
                            source: err,
                        }
                        .into());
                    }

                    self.release("read: connection dropped");
                    log::warn!(
                        "connection dropped at offset {}, reconnecting ({}/{MAX_STALLS})",
                        self.offset,
                        self.stalls
                    );
                    if let Err(reopen) = self.connection() {
                        log::debug!("reconnect at offset {} failed: {reopen}", self.offset);
                        return Err(RemoteError::Truncated {
                            offset: self.offset,
                            source: err,
                        }
                        .into());
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Seek for ResumableReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if self.closed {
            return Err(RemoteError::Unavailable {
                op: "seek",
                reason: "reader is closed",
            }
            .into());
        }

        let abs = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(delta) => i128::from(self.offset) + i128::from(delta),
            SeekFrom::End(delta) => match self.size {
                Some(size) => i128::from(size) + i128::from(delta),
                None => {
                    return Err(RemoteError::Unavailable {
                        op: "seek",
                        reason: "unknown size, cannot seek from end",
                    }
                    .into());
                }
            },
        };

        let abs = u64::try_from(abs).map_err(|_| RemoteError::InvalidArgument {
            op: "seek",
            reason: format!("position {abs} out of range"),
        })?;

        if abs != self.offset {
            self.release("seek");
            self.offset = abs;
        }

        Ok(self.offset)
    }
}

impl ReadAt for ResumableReader {
    /// Read exactly `buf.len()` bytes at `offset` over a private connection.
    ///
    /// The cursor and the held connection are left alone. The private
    /// connection is closed before returning, whatever the outcome.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(RemoteError::Unavailable {
                op: "read_at",
                reason: "reader is closed",
            }
            .into());
        }

        if self.size.is_some_and(|size| offset >= size) {
            return Ok(0);
        }

        let opener = self
            .opener
            .as_deref()
            .ok_or(RemoteError::NotImplemented { op: "read_at" })?;

        if buf.is_empty() {
            return Ok(0);
        }

        let mut conn = opener
            .open(offset)
            .map_err(|source| RemoteError::Open { op: "read_at", offset, source })?;

        let result = conn.read_exact(buf);
        if let Err(err) = conn.close() {
            log::error!("read_at: failed to close connection: {err}");
        }
        result.map(|()| buf.len())
    }

    fn size(&self) -> Option<u64> {
        self.size
    }
}

impl Drop for ResumableReader {
    fn drop(&mut self) {
        self.release("drop");
    }
}

impl fmt::Debug for ResumableReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumableReader")
            .field("size", &self.size)
            .field("offset", &self.offset)
            .field("connected", &self.has_connection())
            .field("closed", &self.closed)
            .field("stalls", &self.stalls)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn blob(n: usize) -> Vec<u8> {
        (0..n).map(|i| i as u8).collect()
    }

    fn cursor_reader(data: Vec<u8>) -> ResumableReader {
        let size = data.len() as u64;
        ResumableReader::new(Some(size), move |offset: u64| -> io::Result<Box<dyn Connection>> {
            let mut cur = Cursor::new(data.clone());
            cur.set_position(offset);
            Ok(Box::new(cur) as Box<dyn Connection>)
        })
    }

    #[test]
    fn seek_read_and_tail() {
        let mut r = cursor_reader(blob(100));

        assert_eq!(r.seek(SeekFrom::Start(50)).unwrap(), 50);
        let mut buf = [0u8; 10];
        assert_eq!(r.read(&mut buf).unwrap(), 10);
        assert_eq!(buf.to_vec(), (50..60).collect::<Vec<u8>>());
        assert_eq!(r.offset(), 60);

        assert_eq!(r.seek(SeekFrom::End(0)).unwrap(), 100);
        assert!(!r.has_connection());
        assert_eq!(r.read(&mut buf).unwrap(), 0);
        assert!(!r.has_connection());
    }

    #[test]
    fn truncation_counts_only_without_progress() {
        let mut r = ResumableReader::new(Some(10), |_offset: u64| -> io::Result<Box<dyn Connection>> {
            Err(io::ErrorKind::ConnectionRefused.into())
        });
        *r.slot() = Some(Box::new(Failing));

        let err = r.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(matches!(
            RemoteError::from_io(&err),
            Some(RemoteError::Truncated { offset: 0, .. })
        ));
        assert_eq!(r.stalls, 1);
        assert!(!r.has_connection());
    }

    struct Failing;

    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::UnexpectedEof.into())
        }
    }

    impl Connection for Failing {}

    #[test]
    fn stall_count_resets_on_progress() {
        let mut r = cursor_reader(blob(8));
        r.stalls = 2;
        let mut buf = [0u8; 4];
        assert_eq!(r.read(&mut buf).unwrap(), 4);
        assert_eq!(r.stalls, 0);
    }

    #[test]
    fn unknown_size_always_dials() {
        let mut r = ResumableReader::without_opener(None);
        let err = r.read(&mut [0u8; 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);

        // A known size that is already reached never needs the opener.
        let mut r = ResumableReader::without_opener(Some(0));
        assert_eq!(r.read(&mut [0u8; 1]).unwrap(), 0);
    }

    #[test]
    fn seek_rejects_out_of_range_positions() {
        let mut r = cursor_reader(blob(10));
        let err = r.seek(SeekFrom::Current(-1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(r.offset(), 0);

        r.seek(SeekFrom::Start(u64::MAX)).unwrap();
        let err = r.seek(SeekFrom::Current(1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
