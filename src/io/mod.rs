//! Byte sources the resumable reader pulls from.
//!
//! A [`Connection`] is one live byte stream positioned somewhere inside the
//! remote blob. An [`Opener`] creates a fresh connection at any offset; the
//! reader calls it lazily and again after every seek or dropped connection.

mod http;
mod local;

pub use http::HttpOpener;
pub use local::FileOpener;

use std::io::{self, Cursor, Read};

/// A live, readable connection owned by exactly one reader.
pub trait Connection: Read + Send {
    /// Release the connection. Dropping it releases it as well, but without
    /// a chance to report a failure.
    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for io::Empty {}

impl Connection for std::fs::File {}

impl<T: AsRef<[u8]> + Send> Connection for Cursor<T> {}

/// Capability that establishes a connection starting at an absolute offset.
pub trait Opener: Send + Sync {
    fn open(&self, offset: u64) -> io::Result<Box<dyn Connection>>;
}

impl<F> Opener for F
where
    F: Fn(u64) -> io::Result<Box<dyn Connection>> + Send + Sync,
{
    fn open(&self, offset: u64) -> io::Result<Box<dyn Connection>> {
        self(offset)
    }
}

/// Trait for random access reading from a data source
pub trait ReadAt: Send + Sync {
    /// Fill `buf` from `offset`, or fail. Returns `Ok(0)` at or past the end.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Total size of the data source, if known
    fn size(&self) -> Option<u64>;
}
