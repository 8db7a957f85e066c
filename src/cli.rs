use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "rfetch")]
#[command(version)]
#[command(about = "Fetch a remote blob with resumable, seekable HTTP Range reads", long_about = None)]
#[command(after_help = "Examples:\n  \
  rfetch https://example.com/layer.tar.gz -z -o layer.tar   fetch and decompress a blob\n  \
  rfetch --offset 1024 --length 512 https://example.com/blob   stream a slice to stdout\n  \
  rfetch --at --offset 0 --length 4 archive.bin | xxd      one-off random-access read")]
pub struct Cli {
    /// Blob URL or local file path
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Write to FILE instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Start reading at this byte offset
    #[arg(long, default_value_t = 0)]
    pub offset: u64,

    /// Read at most this many bytes
    #[arg(long, value_name = "BYTES")]
    pub length: Option<u64>,

    /// Read exactly --length bytes with one-off connections instead of streaming
    #[arg(long, requires = "length")]
    pub at: bool,

    /// Decompress gzip content while streaming
    #[arg(short = 'z', long, conflicts_with = "at")]
    pub gunzip: bool,

    /// HTTP request timeout
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Verbose logging (-vv => debug, -vvv => trace)
    #[arg(short = 'v', action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.source.starts_with("http://") || self.source.starts_with("https://")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Log level before `RUST_LOG` is applied
    pub fn log_level(&self) -> LevelFilter {
        match (self.quiet, self.verbose) {
            (0, 0) => LevelFilter::Warn,
            (1, _) => LevelFilter::Error,
            (_, 0) => LevelFilter::Off,
            (_, 1) => LevelFilter::Info,
            (_, 2) => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        let cli = Cli::parse_from(["rfetch", "blob"]);
        assert_eq!(cli.log_level(), LevelFilter::Warn);
        assert!(!cli.is_http_url());

        let cli = Cli::parse_from(["rfetch", "-qq", "https://example.com/blob"]);
        assert_eq!(cli.log_level(), LevelFilter::Off);
        assert!(cli.is_http_url());

        let cli = Cli::parse_from(["rfetch", "-vv", "blob"]);
        assert_eq!(cli.log_level(), LevelFilter::Debug);
    }

    #[test]
    fn random_access_needs_length() {
        assert!(Cli::try_parse_from(["rfetch", "--at", "blob"]).is_err());
        let cli = Cli::try_parse_from(["rfetch", "--at", "--length", "4", "blob"]).unwrap();
        assert_eq!(cli.length, Some(4));
    }
}
