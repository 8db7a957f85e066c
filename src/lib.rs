//! # rfetch
//!
//! Resumable, seekable reads of remote blobs.
//!
//! [`ResumableReader`] presents a remote, immutable blob as a standard
//! `Read + Seek` stream. Connections come from an injected [`Opener`], are
//! opened lazily at the current offset and are transparently re-established
//! when they drop mid-body, with a bounded number of attempts that make no
//! progress. [`ReadAt`] offers stateless random access over one-off
//! connections.
//!
//! ## Features
//!
//! - `std::io::Read` / `Seek` over any opener, so hashing, decompression and
//!   copy loops work unchanged
//! - Reconnect on truncated bodies, giving up after repeated stalls
//! - HTTP Range opener ([`HttpOpener`]) and local file opener ([`FileOpener`])
//!
//! ## Example
//!
//! ```no_run
//! use std::io::{Read, Seek, SeekFrom};
//! use rfetch::{HttpOpener, ResumableReader};
//!
//! fn main() -> anyhow::Result<()> {
//!     let opener = HttpOpener::new("https://example.com/blob".to_string())?;
//!     let mut reader = ResumableReader::new(opener.size(), opener);
//!
//!     reader.seek(SeekFrom::Start(1024))?;
//!     let mut buf = [0u8; 512];
//!     reader.read_exact(&mut buf)?;
//!     reader.close()?;
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod reader;

pub use cli::Cli;
pub use error::RemoteError;
pub use io::{Connection, FileOpener, HttpOpener, Opener, ReadAt};
pub use reader::{MAX_STALLS, ResumableReader};
