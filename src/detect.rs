//! Content sniffing: classify a byte source as text or binary variant data,
//! plain or block-compressed, from its leading bytes alone.

use crate::bgzf;
use crate::error::{Error, Result};
use crate::header::Version;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

/// Enough bytes to cover one maximal BGZF block plus framing, so the first
/// block of a compressed source can be inflated and classified.
const SNIFF_LEN: usize = 0x11000;

/// Broad content class. Only variant data is handled; the variant exists so
/// the classification triple reads the same way downstream tools report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Variants,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        "VARIANTS"
    }
}

/// Record encoding of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// Tab-separated text
    Vcf,
    /// Length-prefixed binary
    Bcf,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Vcf => "VCF",
            DataFormat::Bcf => "BCF",
        }
    }
}

/// Outer framing of the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Bgzf,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "NONE",
            Compression::Bgzf => "BGZF",
        }
    }
}

/// The classification triple for an opened source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSignature {
    pub category: Category,
    pub format: DataFormat,
    pub compression: Compression,
}

impl FileSignature {
    /// Human-readable summary, completed with the header's declared version.
    pub fn describe(&self, version: Version) -> String {
        match (self.format, self.compression) {
            (DataFormat::Bcf, _) => {
                "BCF version 2.2 compressed variant calling binary data (BGZF)".to_string()
            }
            (DataFormat::Vcf, Compression::None) => format!(
                "VCF version {}.{} variant calling text",
                version.major, version.minor
            ),
            (DataFormat::Vcf, Compression::Bgzf) => format!(
                "VCF version {}.{} BGZF-compressed variant calling text",
                version.major, version.minor
            ),
        }
    }
}

/// Classifies a file by reading at most [`SNIFF_LEN`] leading bytes.
pub fn sniff_path(path: &Path) -> Result<FileSignature> {
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Error::Io(e)
        }
    })?;
    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    file.by_ref()
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut prefix)?;
    sniff_prefix(&prefix).map_err(|e| match e {
        Error::Format { msg } => Error::format(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Classifies a leading byte slice. Empty input and unrecognized prefixes are
/// format errors; nothing is ever guessed from a zero-length source.
pub fn sniff_prefix(prefix: &[u8]) -> Result<FileSignature> {
    if prefix.is_empty() {
        return Err(Error::format("empty file"));
    }

    if bgzf::is_bgzf(prefix) {
        // classify the decompressed payload; a lone terminator block
        // decompresses to nothing and stays an error
        // the prefix may cut the stream mid-block; whatever inflated before
        // the cut is enough to classify
        let mut inner = Vec::new();
        let mut reader = bgzf::Reader::new(Cursor::new(prefix), 1, None, true);
        let outcome = reader.by_ref().take(4096).read_to_end(&mut inner);
        if inner.is_empty() {
            return Err(match outcome {
                Ok(_) => Error::format("empty file"),
                Err(_) => Error::format("unreadable leading BGZF block"),
            });
        }
        let mut sig = sniff_plain(&inner)?;
        sig.compression = Compression::Bgzf;
        return Ok(sig);
    }

    if prefix.len() >= 2 && prefix[0] == 0x1f && prefix[1] == 0x8b {
        return Err(Error::format(
            "plain gzip member without BGZF block framing",
        ));
    }

    sniff_plain(prefix)
}

fn sniff_plain(prefix: &[u8]) -> Result<FileSignature> {
    if prefix.starts_with(b"BCF\x02") {
        return Ok(FileSignature {
            category: Category::Variants,
            format: DataFormat::Bcf,
            compression: Compression::None,
        });
    }
    let first_line = prefix
        .split(|&b| b == b'\n')
        .next()
        .unwrap_or(prefix);
    let looks_like_text = first_line.iter().all(|&b| b == b'\t' || b == b'\r' || (0x20..0x7f).contains(&b));
    if looks_like_text
        && (first_line.starts_with(b"#")
            || first_line.split(|&b| b == b'\t').count() >= 8)
    {
        return Ok(FileSignature {
            category: Category::Variants,
            format: DataFormat::Vcf,
            compression: Compression::None,
        });
    }
    Err(Error::format("unrecognized leading bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn classifies_plain_text() {
        let sig = sniff_prefix(b"##fileformat=VCFv4.0\n").unwrap();
        assert_eq!(sig.format, DataFormat::Vcf);
        assert_eq!(sig.compression, Compression::None);
        assert_eq!(sig.category.as_str(), "VARIANTS");
    }

    #[test]
    fn classifies_compressed_text() {
        let compressed = bgzf::compress_to_vec(b"##fileformat=VCFv4.0\n#CHROM\t...").unwrap();
        let sig = sniff_prefix(&compressed).unwrap();
        assert_eq!(sig.format, DataFormat::Vcf);
        assert_eq!(sig.compression, Compression::Bgzf);
    }

    #[test]
    fn classifies_binary() {
        let compressed = bgzf::compress_to_vec(b"BCF\x02\x02rest-of-header").unwrap();
        let sig = sniff_prefix(&compressed).unwrap();
        assert_eq!(sig.format, DataFormat::Bcf);
        assert_eq!(sig.compression, Compression::Bgzf);
        assert_eq!(sig.format.as_str(), "BCF");
        assert_eq!(sig.compression.as_str(), "BGZF");
    }

    #[test]
    fn empty_input_is_a_format_error() {
        assert!(matches!(sniff_prefix(b""), Err(Error::Format { .. })));
        // compressed-but-empty is still empty
        let compressed = bgzf::compress_to_vec(b"").unwrap();
        assert!(matches!(
            sniff_prefix(&compressed),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn plain_gzip_is_rejected() {
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(b"##fileformat=VCFv4.0\n").unwrap();
        let bytes = gz.finish().unwrap();
        assert!(matches!(sniff_prefix(&bytes), Err(Error::Format { .. })));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            sniff_prefix(&[0u8, 1, 2, 3, 4]),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn descriptions_name_format_and_framing() {
        let version = Version { major: 4, minor: 0 };
        let vcf = FileSignature {
            category: Category::Variants,
            format: DataFormat::Vcf,
            compression: Compression::None,
        };
        assert_eq!(vcf.describe(version), "VCF version 4.0 variant calling text");
        let vcfgz = FileSignature {
            compression: Compression::Bgzf,
            ..vcf
        };
        assert_eq!(
            vcfgz.describe(version),
            "VCF version 4.0 BGZF-compressed variant calling text"
        );
    }
}
