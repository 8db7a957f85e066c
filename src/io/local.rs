use super::{Connection, Opener};
use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Local file opener; every connection is an independent handle
pub struct FileOpener {
    path: PathBuf,
    size: u64,
}

impl FileOpener {
    pub fn new(path: &Path) -> io::Result<Self> {
        let size = std::fs::metadata(path)?.len();
        Ok(Self {
            path: path.to_path_buf(),
            size,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Opener for FileOpener {
    fn open(&self, offset: u64) -> io::Result<Box<dyn Connection>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn opens_at_offset() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();

        let opener = FileOpener::new(tmp.path()).unwrap();
        assert_eq!(opener.size(), 10);

        let mut conn = opener.open(4).unwrap();
        let mut out = String::new();
        conn.read_to_string(&mut out).unwrap();
        assert_eq!(out, "456789");
        conn.close().unwrap();
    }
}
