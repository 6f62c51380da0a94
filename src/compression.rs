//! Optional supplemental compression of files that have finished rotating
//! out of active use. Never applied to the file currently being written.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionKind {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl CompressionKind {
    pub fn extension(self) -> &'static str {
        match self {
            CompressionKind::None => "",
            CompressionKind::Gzip => ".gz",
            CompressionKind::Zstd => ".zst",
        }
    }
}

/// Compresses `path` into a sibling file with the matching extension and
/// removes the original. Returns the path unchanged for `CompressionKind::None`.
pub fn compress_in_place(path: &Path, kind: CompressionKind) -> io::Result<PathBuf> {
    match kind {
        CompressionKind::None => Ok(path.to_path_buf()),
        CompressionKind::Gzip => {
            let dest = append_extension(path, kind.extension());
            let input = BufReader::new(File::open(path)?);
            let output = BufWriter::new(File::create(&dest)?);
            let mut encoder = flate2::write::GzEncoder::new(output, flate2::Compression::default());
            copy_and_finish(input, &mut encoder)?;
            fs::remove_file(path)?;
            Ok(dest)
        }
        CompressionKind::Zstd => {
            let dest = append_extension(path, kind.extension());
            let mut input = BufReader::new(File::open(path)?);
            let output = BufWriter::new(File::create(&dest)?);
            let mut encoder = zstd::stream::Encoder::new(output, 0)?;
            io::copy(&mut input, &mut encoder)?;
            encoder.finish()?;
            fs::remove_file(path)?;
            Ok(dest)
        }
    }
}

fn copy_and_finish<W: io::Write>(mut input: impl io::Read, encoder: &mut flate2::write::GzEncoder<W>) -> io::Result<()> {
    io::copy(&mut input, encoder)?;
    encoder.try_finish()
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(ext);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn none_leaves_the_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, b"hello").unwrap();
        let result = compress_in_place(&path, CompressionKind::None).unwrap();
        assert_eq!(result, path);
        assert!(path.exists());
    }

    #[test]
    fn gzip_round_trips_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, b"hello world").unwrap();
        let dest = compress_in_place(&path, CompressionKind::Gzip).unwrap();
        assert!(!path.exists());
        assert_eq!(dest.extension().unwrap(), "gz");
        let file = File::open(&dest).unwrap();
        let mut decoder = flate2::read::GzDecoder::new(file);
        let mut buf = Vec::new();
        io::Read::read_to_end(&mut decoder, &mut buf).unwrap();
        assert_eq!(buf, b"hello world");
    }

    #[test]
    fn zstd_round_trips_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.log");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"zstandard payload").unwrap();
        drop(f);
        let dest = compress_in_place(&path, CompressionKind::Zstd).unwrap();
        assert!(!path.exists());
        let bytes = fs::read(&dest).unwrap();
        let decoded = zstd::stream::decode_all(&bytes[..]).unwrap();
        assert_eq!(decoded, b"zstandard payload");
    }
}
