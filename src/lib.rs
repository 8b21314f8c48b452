//! # varfile
//! A small, lightweight, pure-Rust library for reading, writing, and
//! region-indexing variant call data, in its text form (VCF), its
//! block-compressed text form, and its binary form (BCF).
//!
//! The heavy-dependency crates in this space pull in support for dozens of
//! formats; this one sticks to variant data and keeps the dependency list
//! short. Records decode lazily: a scan that only looks at positions never
//! pays for genotype parsing, and touching one sample leaves the others
//! undecoded. Block (de)compression can run on a per-file worker pool, with
//! output order always matching input order.
//!
//! ## Reading
//! ```no_run
//! use varfile::VariantFile;
//!
//! let mut vf = VariantFile::open("calls.vcf.gz", "r")?;
//! for rec in vf.records() {
//!     let mut rec = rec?;
//!     println!("{}\t{}", rec.chrom()?, rec.pos()?);
//! }
//! # Ok::<(), varfile::Error>(())
//! ```
//!
//! ## Region queries
//! ```no_run
//! use varfile::{build_index, IndexKind, VariantFile};
//!
//! build_index("calls.vcf.gz", IndexKind::Tbi)?;
//! let mut vf = VariantFile::open("calls.vcf.gz", "r")?;
//! for rec in vf.fetch("20", 1_000_000, 2_000_000)? {
//!     let mut rec = rec?;
//!     println!("{}", rec.to_vcf_line()?);
//! }
//! # Ok::<(), varfile::Error>(())
//! ```
//!
//! ## Writing
//! ```no_run
//! use varfile::{Header, VariantFile};
//!
//! let mut header = Header::new();
//! header.add_contig("20", Some(62_435_964))?;
//! header.add_sample("NA00001")?;
//! let mut out = VariantFile::options()
//!     .header(header)
//!     .threads(2)
//!     .open("calls.bcf", "wb")?;
//! // ... out.write(&mut record)? ...
//! out.close()?;
//! # Ok::<(), varfile::Error>(())
//! ```

pub mod bgzf;
pub mod detect;
mod error;
pub mod header;
pub mod index;
pub mod record;
mod variant_file;

pub use detect::{Category, Compression, DataFormat, FileSignature};
pub use error::{Error, Result};
pub use header::{Header, HeaderRecord, Number, ValueType, Version};
pub use index::{Index, IndexBuilder, IndexKind};
pub use record::{Genotype, Record, SampleData, Value};
pub use variant_file::{build_index, Fetch, OpenOptions, Records, VariantFile};
