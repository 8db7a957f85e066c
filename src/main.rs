//! Main entry point for the rfetch CLI application.
//!
//! This binary copies a blob, or a slice of it, from a remote HTTP URL or a
//! local file to a file or stdout through a [`ResumableReader`].

use anyhow::{Context, Result};
use clap::Parser;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use rfetch::{Cli, FileOpener, HttpOpener, ReadAt, ResumableReader};

/// Size of each one-off read in `--at` mode.
const READ_AT_CHUNK: u64 = 4 * 1024 * 1024;

/// Application entry point.
///
/// Parses command-line arguments, installs logging and dispatches to
/// streaming or random-access mode.
fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    let (reader, counter) = if cli.is_http_url() {
        let opener = HttpOpener::with_timeout(cli.source.clone(), cli.timeout())
            .with_context(|| format!("probing {}", cli.source))?;
        let counter = opener.transfer_counter();
        (ResumableReader::new(opener.size(), opener), Some(counter))
    } else {
        let opener = FileOpener::new(Path::new(&cli.source))
            .with_context(|| format!("opening {}", cli.source))?;
        (ResumableReader::new(Some(opener.size()), opener), None)
    };

    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    let copied = match cli.length {
        Some(length) if cli.at => read_range_at(&reader, cli.offset, length, &mut out)?,
        _ => stream(reader, &cli, &mut out)?,
    };
    out.flush()?;

    // Display network transfer statistics for HTTP sources
    if !cli.is_quiet() {
        eprintln!("Copied: {}", format_size(copied));
        if let Some(counter) = counter {
            let transferred = counter.load(std::sync::atomic::Ordering::Relaxed);
            eprintln!("Total bytes transferred: {}", format_size(transferred));
        }
    }

    Ok(())
}

/// Stream from `--offset` through the resumable reader.
///
/// Honors `--length` and `--gunzip`. The reader reconnects on its own when
/// the transfer drops, so this is a plain copy loop.
fn stream(mut reader: ResumableReader, cli: &Cli, out: &mut dyn Write) -> Result<u64> {
    reader.seek(SeekFrom::Start(cli.offset))?;

    let result = {
        let mut input: Box<dyn Read + '_> = match cli.length {
            Some(length) => Box::new((&mut reader).take(length)),
            None => Box::new(&mut reader),
        };

        if cli.gunzip {
            io::copy(&mut GzDecoder::new(input), out)
        } else {
            io::copy(&mut input, out)
        }
    };
    let copied = result
        .with_context(|| format!("reading {} at offset {}", cli.source, reader.offset()))?;

    log::debug!("stream finished at offset {}", reader.offset());
    reader.close().context("closing connection")?;
    Ok(copied)
}

/// Copy `length` bytes starting at `offset` using independent reads.
///
/// The range is clamped to the known size. Each chunk is read over its own
/// short-lived connection and the reader's cursor is never touched.
fn read_range_at<R: ReadAt>(reader: &R, offset: u64, length: u64, out: &mut dyn Write) -> Result<u64> {
    let end = match reader.size() {
        Some(size) => size.min(offset.saturating_add(length)),
        None => offset.saturating_add(length),
    };

    let mut pos = offset;
    let mut buf = Vec::new();
    while pos < end {
        let want = (end - pos).min(READ_AT_CHUNK) as usize;
        buf.resize(want, 0);
        let n = reader
            .read_at(pos, &mut buf)
            .with_context(|| format!("reading {want} bytes at offset {pos}"))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        pos += n as u64;
    }

    Ok(pos - offset)
}

/// Format a byte size into a human-readable string.
///
/// Automatically selects the appropriate unit (bytes, KB, MB, GB)
/// based on the size magnitude.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sizes() {
        assert_eq!(format_size(500), "500 bytes");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
    }

    #[test]
    fn range_at_is_clamped_to_size() {
        let reader = ResumableReader::new(Some(6), |offset: u64| -> io::Result<Box<dyn rfetch::Connection>> {
            let mut cur = io::Cursor::new(b"abcdef".to_vec());
            cur.set_position(offset);
            Ok(Box::new(cur))
        });

        let mut out = Vec::new();
        assert_eq!(read_range_at(&reader, 2, 100, &mut out).unwrap(), 4);
        assert_eq!(out, b"cdef");

        out.clear();
        assert_eq!(read_range_at(&reader, 9, 3, &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }
}
