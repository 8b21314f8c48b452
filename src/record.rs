//! Lazy record model.
//!
//! A [`Record`] keeps the bytes it was read as (one text line, or the
//! shared/per-sample halves of a binary record) and decodes on demand:
//! touching the core columns decodes only those, INFO and FORMAT decode
//! independently of each other, and each sample decodes by itself without
//! pulling in its neighbors. Every decode is memoized, so repeated access is
//! a cache hit, not a reparse.
//!
//! Scalar mutators invalidate only the serialized form; previously decoded
//! caches stay valid.

use crate::error::{Error, Result};
use crate::header::{FieldDef, Header, Number, ValueType};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use std::ops::Range;
use std::sync::Arc;

// Binary type codes and the reserved integer/float bit patterns.
const BT_NULL: u8 = 0;
const BT_INT8: u8 = 1;
const BT_INT16: u8 = 2;
const BT_INT32: u8 = 3;
const BT_FLOAT: u8 = 5;
const BT_CHAR: u8 = 7;

const MISSING_I8: i8 = i8::MIN;
const EOV_I8: i8 = i8::MIN + 1;
const MISSING_I16: i16 = i16::MIN;
const EOV_I16: i16 = i16::MIN + 1;
const MISSING_I32: i32 = i32::MIN;
const EOV_I32: i32 = i32::MIN + 1;
const MISSING_F32_BITS: u32 = 0x7F80_0001;
const EOV_F32_BITS: u32 = 0x7F80_0002;

/// A decoded INFO or per-sample field value.
///
/// `Missing` is a value that was present as `.`; it is distinct from the key
/// being absent, which surfaces as `None` from the lookup. Fields declared
/// with a single fixed value decode to scalars; fields declared multi-valued
/// decode to vectors even when they carry one value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Char(char),
    Str(String),
    Flag,
    IntVec(Vec<Option<i32>>),
    FloatVec(Vec<Option<f32>>),
    StrVec(Vec<Option<String>>),
    Missing,
}

/// One sample's genotype call. `None` entries are uncalled alleles (`.`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genotype {
    pub allele_indices: Vec<Option<i32>>,
    pub phased: bool,
}

impl std::fmt::Display for Genotype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sep = if self.phased { '|' } else { '/' };
        for (i, allele) in self.allele_indices.iter().enumerate() {
            if i > 0 {
                f.write_str(&sep.to_string())?;
            }
            match allele {
                Some(a) => write!(f, "{a}")?,
                None => f.write_str(".")?,
            }
        }
        Ok(())
    }
}

/// Decoded per-sample block: the values present for this sample, in FORMAT
/// key order, plus the genotype when a `GT` field was present.
#[derive(Debug, Clone, Default)]
pub struct SampleData {
    values: Vec<(String, Value)>,
    genotype: Option<Genotype>,
}

impl SampleData {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn genotype(&self) -> Option<&Genotype> {
        self.genotype.as_ref()
    }

    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }
}

/// Bytes a record was materialized from.
#[derive(Debug, Clone)]
enum Raw {
    /// One data line, tab-separated, no trailing newline.
    Text(String),
    /// Binary halves, without the `l_shared`/`l_indiv` length prefix.
    Bcf { shared: Vec<u8>, indiv: Vec<u8> },
}

/// Decoded core columns.
#[derive(Debug, Clone)]
struct Core {
    chrom: String,
    /// 1-based position as printed in text form.
    pos: i64,
    id: Option<String>,
    ref_allele: String,
    alts: Vec<String>,
    qual: Option<f32>,
    /// `None` for `.`; `Some(["PASS"])` for a passing record.
    filters: Option<Vec<String>>,
    /// Reference span used by the binary encoding and the region index.
    rlen: i64,
}

/// Where the lazily-decoded pieces live inside the raw bytes.
#[derive(Debug, Clone)]
enum Layout {
    Text {
        /// Byte range of every tab-separated column.
        cols: Vec<Range<usize>>,
    },
    Bcf {
        n_info: usize,
        n_fmt: usize,
        n_sample: usize,
        /// Offset of the first INFO entry inside `shared`.
        info_start: usize,
    },
}

/// Location of one binary FORMAT block, sized so any single sample's slice
/// can be cut out without touching the others.
#[derive(Debug, Clone)]
struct FmtBlock {
    key: String,
    kind: u8,
    /// Values per sample.
    n: usize,
    /// Offset of sample 0's data inside `indiv`.
    data_start: usize,
    /// Bytes per sample.
    stride: usize,
}

/// One variant call, lazily decoded from its raw text or binary form.
pub struct Record {
    header: Arc<Header>,
    raw: Raw,
    layout: Option<Layout>,
    core: Option<Core>,
    info: Option<Vec<(String, Value)>>,
    format_keys: Option<Vec<String>>,
    fmt_blocks: Option<Vec<FmtBlock>>,
    samples: Vec<Option<SampleData>>,
    /// Set by mutators; a dirty record re-serializes from its caches.
    dirty: bool,
}

impl Record {
    /// Wraps a text data line without parsing any of it.
    pub fn from_text_line(header: Arc<Header>, line: String) -> Record {
        Record {
            header,
            raw: Raw::Text(line),
            layout: None,
            core: None,
            info: None,
            format_keys: None,
            fmt_blocks: None,
            samples: Vec::new(),
            dirty: false,
        }
    }

    /// Wraps the two binary halves without parsing them.
    pub fn from_bcf_parts(header: Arc<Header>, shared: Vec<u8>, indiv: Vec<u8>) -> Record {
        Record {
            header,
            raw: Raw::Bcf { shared, indiv },
            layout: None,
            core: None,
            info: None,
            format_keys: None,
            fmt_blocks: None,
            samples: Vec::new(),
            dirty: false,
        }
    }

    pub fn header(&self) -> &Arc<Header> {
        &self.header
    }

    // --- core accessors ---

    pub fn chrom(&mut self) -> Result<String> {
        self.ensure_core()?;
        Ok(self.core.as_ref().unwrap().chrom.clone())
    }

    /// 1-based position, as printed in the text form.
    pub fn pos(&mut self) -> Result<i64> {
        self.ensure_core()?;
        Ok(self.core.as_ref().unwrap().pos)
    }

    /// 0-based start, as used by region queries.
    pub fn start(&mut self) -> Result<i64> {
        Ok(self.pos()? - 1)
    }

    /// 0-based exclusive end of the reference span.
    pub fn end(&mut self) -> Result<i64> {
        self.ensure_core()?;
        let core = self.core.as_ref().unwrap();
        Ok(core.pos - 1 + core.rlen)
    }

    pub fn id(&mut self) -> Result<Option<String>> {
        self.ensure_core()?;
        Ok(self.core.as_ref().unwrap().id.clone())
    }

    pub fn ref_allele(&mut self) -> Result<String> {
        self.ensure_core()?;
        Ok(self.core.as_ref().unwrap().ref_allele.clone())
    }

    pub fn alts(&mut self) -> Result<Vec<String>> {
        self.ensure_core()?;
        Ok(self.core.as_ref().unwrap().alts.clone())
    }

    /// Reference allele followed by the alternates.
    pub fn alleles(&mut self) -> Result<Vec<String>> {
        self.ensure_core()?;
        let core = self.core.as_ref().unwrap();
        let mut out = Vec::with_capacity(1 + core.alts.len());
        out.push(core.ref_allele.clone());
        out.extend(core.alts.iter().cloned());
        Ok(out)
    }

    pub fn qual(&mut self) -> Result<Option<f32>> {
        self.ensure_core()?;
        Ok(self.core.as_ref().unwrap().qual)
    }

    /// `None` when the FILTER column is `.`.
    pub fn filters(&mut self) -> Result<Option<Vec<String>>> {
        self.ensure_core()?;
        Ok(self.core.as_ref().unwrap().filters.clone())
    }

    // --- mutators: caches stay valid, only the serialized form is stale ---

    pub fn set_qual(&mut self, qual: Option<f32>) -> Result<()> {
        self.ensure_core()?;
        self.core.as_mut().unwrap().qual = qual;
        self.dirty = true;
        Ok(())
    }

    pub fn set_id(&mut self, id: Option<&str>) -> Result<()> {
        self.ensure_core()?;
        self.core.as_mut().unwrap().id = id.map(str::to_string);
        self.dirty = true;
        Ok(())
    }

    pub fn set_pos(&mut self, pos: i64) -> Result<()> {
        self.ensure_core()?;
        self.core.as_mut().unwrap().pos = pos;
        self.dirty = true;
        Ok(())
    }

    // --- info ---

    /// Keys present in the INFO column, in file order.
    pub fn info_keys(&mut self) -> Result<Vec<String>> {
        self.ensure_info()?;
        Ok(self
            .info
            .as_ref()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect())
    }

    /// `None` when the key is absent; [`Value::Missing`] when present as `.`.
    pub fn info_value(&mut self, key: &str) -> Result<Option<Value>> {
        self.ensure_info()?;
        Ok(self
            .info
            .as_ref()
            .unwrap()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone()))
    }

    // --- format / samples ---

    /// Keys of the FORMAT column, in file order. Empty for sites-only rows.
    pub fn format_keys(&mut self) -> Result<Vec<String>> {
        self.ensure_format()?;
        Ok(self.format_keys.as_ref().unwrap().clone())
    }

    pub fn n_samples(&self) -> usize {
        self.header.samples().len()
    }

    /// Decodes sample `i` only. Other samples stay raw.
    pub fn sample(&mut self, i: usize) -> Result<SampleData> {
        self.ensure_sample(i)?;
        Ok(self.samples[i].as_ref().unwrap().clone())
    }

    // --- decode gates ---

    fn ensure_core(&mut self) -> Result<()> {
        if self.core.is_some() {
            return Ok(());
        }
        match &self.raw {
            Raw::Text(line) => {
                let cols = split_columns(line);
                if cols.len() < 8 {
                    return Err(Error::format(format!(
                        "data line has {} columns, expected at least 8: '{line}'",
                        cols.len()
                    )));
                }
                let col = |i: usize| &line[cols[i].clone()];
                let pos: i64 = col(1)
                    .parse()
                    .map_err(|_| Error::format(format!("bad POS value '{}'", col(1))))?;
                let id = match col(2) {
                    "." => None,
                    other => Some(other.to_string()),
                };
                let ref_allele = col(3).to_string();
                let alts: Vec<String> = match col(4) {
                    "." => Vec::new(),
                    other => other.split(',').map(str::to_string).collect(),
                };
                let qual = match col(5) {
                    "." => None,
                    other => Some(other.parse().map_err(|_| {
                        Error::format(format!("bad QUAL value '{other}'"))
                    })?),
                };
                let filters = match col(6) {
                    "." => None,
                    other => Some(other.split(';').map(str::to_string).collect()),
                };
                let rlen = ref_allele.len() as i64;
                self.core = Some(Core {
                    chrom: col(0).to_string(),
                    pos,
                    id,
                    ref_allele,
                    alts,
                    qual,
                    filters,
                    rlen,
                });
                self.layout = Some(Layout::Text { cols });
            }
            Raw::Bcf { shared, .. } => {
                let mut cur = Cursor::new(shared.as_slice());
                let tid = cur.read_i32::<LittleEndian>()?;
                let pos0 = cur.read_i32::<LittleEndian>()?;
                let rlen = cur.read_i32::<LittleEndian>()?;
                let qual_bits = cur.read_u32::<LittleEndian>()?;
                let n_allele_info = cur.read_u32::<LittleEndian>()?;
                let n_info = (n_allele_info & 0xffff) as usize;
                let n_allele = (n_allele_info >> 16) as usize;
                let n_fmt_sample = cur.read_u32::<LittleEndian>()?;
                let n_sample = (n_fmt_sample & 0x00ff_ffff) as usize;
                let n_fmt = (n_fmt_sample >> 24) as usize;

                let chrom = self
                    .header
                    .contig_name(tid as usize)
                    .ok_or_else(|| {
                        Error::format(format!("record names undeclared contig id {tid}"))
                    })?
                    .to_string();
                let qual = if qual_bits == MISSING_F32_BITS {
                    None
                } else {
                    Some(f32::from_bits(qual_bits))
                };

                let id_raw = read_typed_string(&mut cur)?;
                let id = match id_raw.as_str() {
                    "" | "." => None,
                    _ => Some(id_raw),
                };
                if n_allele == 0 {
                    return Err(Error::format("record has no reference allele"));
                }
                let ref_allele = read_typed_string(&mut cur)?;
                let mut alts = Vec::with_capacity(n_allele - 1);
                for _ in 1..n_allele {
                    alts.push(read_typed_string(&mut cur)?);
                }
                let filter_offsets = read_typed_ints(&mut cur)?;
                let filters = if filter_offsets.is_empty() {
                    None
                } else {
                    let mut names = Vec::with_capacity(filter_offsets.len());
                    for off in filter_offsets {
                        let off = off.ok_or_else(|| {
                            Error::format("missing value inside the FILTER vector")
                        })?;
                        names.push(
                            self.header
                                .dict_id(off as usize)
                                .ok_or_else(|| {
                                    Error::format(format!(
                                        "record names undeclared FILTER offset {off}"
                                    ))
                                })?
                                .to_string(),
                        );
                    }
                    Some(names)
                };

                self.core = Some(Core {
                    chrom,
                    pos: pos0 as i64 + 1,
                    id,
                    ref_allele,
                    alts,
                    qual,
                    filters,
                    rlen: rlen as i64,
                });
                self.layout = Some(Layout::Bcf {
                    n_info,
                    n_fmt,
                    n_sample,
                    info_start: cur.position() as usize,
                });
            }
        }
        Ok(())
    }

    fn ensure_info(&mut self) -> Result<()> {
        if self.info.is_some() {
            return Ok(());
        }
        self.ensure_core()?;
        let header = Arc::clone(&self.header);
        let info = match (&self.raw, self.layout.as_ref().unwrap()) {
            (Raw::Text(line), Layout::Text { cols }) => {
                let text = &line[cols[7].clone()];
                let mut out = Vec::new();
                if text != "." {
                    for item in text.split(';') {
                        let (key, value) = match item.split_once('=') {
                            Some((k, v)) => (k, Some(v)),
                            None => (item, None),
                        };
                        let def = header.info_def(key);
                        let value = match value {
                            None => Value::Flag,
                            Some(v) => decode_text_value(v, def)
                                .map_err(|_| bad_field("INFO", key, v))?,
                        };
                        out.push((key.to_string(), value));
                    }
                }
                out
            }
            (Raw::Bcf { shared, .. }, Layout::Bcf {
                n_info, info_start, ..
            }) => {
                let mut cur = Cursor::new(shared.as_slice());
                cur.set_position(*info_start as u64);
                let mut out = Vec::with_capacity(*n_info);
                for _ in 0..*n_info {
                    let offset = read_typed_scalar_int(&mut cur)? as usize;
                    let (key, def) = header.info_by_offset(offset).ok_or_else(|| {
                        Error::format(format!("record names undeclared INFO offset {offset}"))
                    })?;
                    let value = decode_bcf_value(&mut cur, Some(def))?;
                    out.push((key.to_string(), value));
                }
                out
            }
            _ => unreachable!("layout always matches raw"),
        };
        self.info = Some(info);
        Ok(())
    }

    fn ensure_format(&mut self) -> Result<()> {
        if self.format_keys.is_some() {
            return Ok(());
        }
        self.ensure_core()?;
        let header = Arc::clone(&self.header);
        match (&self.raw, self.layout.as_ref().unwrap()) {
            (Raw::Text(line), Layout::Text { cols }) => {
                let keys = if cols.len() > 8 {
                    line[cols[8].clone()]
                        .split(':')
                        .map(str::to_string)
                        .collect()
                } else {
                    Vec::new()
                };
                self.format_keys = Some(keys);
            }
            (Raw::Bcf { indiv, .. }, Layout::Bcf {
                n_fmt, n_sample, ..
            }) => {
                let mut cur = Cursor::new(indiv.as_slice());
                let mut blocks = Vec::with_capacity(*n_fmt);
                let mut keys = Vec::with_capacity(*n_fmt);
                for _ in 0..*n_fmt {
                    let offset = read_typed_scalar_int(&mut cur)? as usize;
                    let (key, _def) = header.format_by_offset(offset).ok_or_else(|| {
                        Error::format(format!("record names undeclared FORMAT offset {offset}"))
                    })?;
                    let (kind, n) = read_typed_descriptor(&mut cur)?;
                    let stride = n * type_width(kind)?;
                    let data_start = cur.position() as usize;
                    cur.set_position((data_start + stride * n_sample) as u64);
                    if cur.position() as usize > indiv.len() {
                        return Err(Error::format(format!(
                            "FORMAT field '{key}' overruns the per-sample data"
                        )));
                    }
                    keys.push(key.to_string());
                    blocks.push(FmtBlock {
                        key: key.to_string(),
                        kind,
                        n,
                        data_start,
                        stride,
                    });
                }
                self.format_keys = Some(keys);
                self.fmt_blocks = Some(blocks);
            }
            _ => unreachable!("layout always matches raw"),
        }
        Ok(())
    }

    fn ensure_sample(&mut self, i: usize) -> Result<()> {
        if self.samples.len() <= i {
            self.samples.resize(self.n_samples().max(i + 1), None);
        }
        if self.samples[i].is_some() {
            return Ok(());
        }
        self.ensure_format()?;
        let header = Arc::clone(&self.header);
        let keys = self.format_keys.clone().unwrap();
        let data = match (&self.raw, self.layout.as_ref().unwrap()) {
            (Raw::Text(line), Layout::Text { cols }) => {
                let col = cols.get(9 + i).ok_or_else(|| {
                    Error::format(format!("data line has no column for sample {i}"))
                })?;
                decode_text_sample(&line[col.clone()], &keys, &header)?
            }
            (Raw::Bcf { indiv, .. }, Layout::Bcf { n_sample, .. }) => {
                if i >= *n_sample {
                    return Err(Error::format(format!(
                        "record carries {n_sample} samples, sample {i} requested"
                    )));
                }
                let blocks = self.fmt_blocks.as_ref().unwrap();
                let mut out = SampleData::default();
                for block in blocks {
                    let slice =
                        &indiv[block.data_start + i * block.stride..][..block.stride];
                    let def = header.format_def(&block.key);
                    if block.key == "GT" {
                        out.genotype = Some(decode_bcf_genotype(slice, block.kind)?);
                        continue;
                    }
                    let value = decode_bcf_sample_value(slice, block.kind, block.n, def)?;
                    out.values.push((block.key.clone(), value));
                }
                out
            }
            _ => unreachable!("layout always matches raw"),
        };
        self.samples[i] = Some(data);
        Ok(())
    }

    /// Forces every lazy slot to decode. Serialization and translation run
    /// through this.
    fn ensure_all(&mut self) -> Result<()> {
        self.ensure_info()?;
        self.ensure_format()?;
        for i in 0..self.n_samples() {
            self.ensure_sample(i)?;
        }
        Ok(())
    }

    // --- translation ---

    /// Rebinds the record to `target`, verifying that every name it uses is
    /// declared there. The first unknown name aborts the switch.
    pub fn translate(&mut self, target: &Arc<Header>) -> Result<()> {
        self.ensure_all()?;
        let core = self.core.as_ref().unwrap();
        if !target.contigs().is_empty() && target.contig_id(&core.chrom).is_none() {
            return Err(Error::SchemaLookup {
                kind: "contig",
                name: core.chrom.clone(),
            });
        }
        if let Some(filters) = &core.filters {
            for f in filters {
                if !target.has_filter(f) {
                    return Err(Error::SchemaLookup {
                        kind: "FILTER",
                        name: f.clone(),
                    });
                }
            }
        }
        for (key, _) in self.info.as_ref().unwrap() {
            if target.info_def(key).is_none() {
                return Err(Error::SchemaLookup {
                    kind: "INFO",
                    name: key.clone(),
                });
            }
        }
        for key in self.format_keys.as_ref().unwrap() {
            if target.format_def(key).is_none() {
                return Err(Error::SchemaLookup {
                    kind: "FORMAT",
                    name: key.clone(),
                });
            }
        }
        self.header = Arc::clone(target);
        self.dirty = true;
        Ok(())
    }

    // --- serialization ---

    /// The record as one text data line, newline not included. Clean records
    /// pass their original line through byte-for-byte.
    pub fn to_vcf_line(&mut self) -> Result<String> {
        if !self.dirty {
            if let Raw::Text(line) = &self.raw {
                return Ok(line.clone());
            }
        }
        self.ensure_all()?;
        let core = self.core.as_ref().unwrap();
        let mut out = String::new();
        out.push_str(&core.chrom);
        out.push('\t');
        out.push_str(&core.pos.to_string());
        out.push('\t');
        out.push_str(core.id.as_deref().unwrap_or("."));
        out.push('\t');
        out.push_str(&core.ref_allele);
        out.push('\t');
        if core.alts.is_empty() {
            out.push('.');
        } else {
            out.push_str(&core.alts.join(","));
        }
        out.push('\t');
        match core.qual {
            None => out.push('.'),
            Some(q) => out.push_str(&fmt_float(q)),
        }
        out.push('\t');
        match &core.filters {
            None => out.push('.'),
            Some(fs) => out.push_str(&fs.join(";")),
        }
        out.push('\t');
        let info = self.info.as_ref().unwrap();
        if info.is_empty() {
            out.push('.');
        } else {
            for (i, (key, value)) in info.iter().enumerate() {
                if i > 0 {
                    out.push(';');
                }
                out.push_str(key);
                if let Some(text) = fmt_value(value) {
                    out.push('=');
                    out.push_str(&text);
                }
            }
        }
        let keys = self.format_keys.as_ref().unwrap();
        if !keys.is_empty() {
            out.push('\t');
            out.push_str(&keys.join(":"));
            for sample in self.samples.iter().flatten() {
                out.push('\t');
                out.push_str(&fmt_sample(sample, keys));
            }
        }
        Ok(out)
    }

    /// Encodes the record in binary form against `target`'s dictionaries,
    /// length prefixes included. Every name must resolve in `target`.
    pub fn to_bcf_bytes(&mut self, target: &Header, out: &mut Vec<u8>) -> Result<()> {
        self.ensure_all()?;
        let core = self.core.as_ref().unwrap();

        let tid = target.contig_id(&core.chrom).ok_or_else(|| Error::SchemaLookup {
            kind: "contig",
            name: core.chrom.clone(),
        })?;

        let mut shared = Vec::new();
        shared.write_i32::<LittleEndian>(tid as i32)?;
        shared.write_i32::<LittleEndian>((core.pos - 1) as i32)?;
        shared.write_i32::<LittleEndian>(core.rlen as i32)?;
        let qual_bits = match core.qual {
            None => MISSING_F32_BITS,
            Some(q) => q.to_bits(),
        };
        shared.write_u32::<LittleEndian>(qual_bits)?;
        let info = self.info.as_ref().unwrap();
        let n_allele = 1 + core.alts.len();
        shared.write_u32::<LittleEndian>(((n_allele as u32) << 16) | info.len() as u32)?;
        let keys = self.format_keys.as_ref().unwrap();
        let n_fmt = keys.len();
        let n_sample = self.samples.iter().flatten().count();
        shared.write_u32::<LittleEndian>(((n_fmt as u32) << 24) | n_sample as u32)?;

        write_typed_string(&mut shared, core.id.as_deref().unwrap_or("."));
        write_typed_string(&mut shared, &core.ref_allele);
        for alt in &core.alts {
            write_typed_string(&mut shared, alt);
        }
        match &core.filters {
            None => write_typed_ints(&mut shared, &[]),
            Some(fs) => {
                let mut offsets = Vec::with_capacity(fs.len());
                for f in fs {
                    let off = target.filter_offset(f).ok_or_else(|| Error::SchemaLookup {
                        kind: "FILTER",
                        name: f.clone(),
                    })?;
                    offsets.push(BInt::Val(off as i32));
                }
                write_typed_ints(&mut shared, &offsets);
            }
        }
        for (key, value) in info {
            let def = target.info_def(key).ok_or_else(|| Error::SchemaLookup {
                kind: "INFO",
                name: key.clone(),
            })?;
            write_typed_scalar_int(&mut shared, def.dict_offset as i32);
            encode_bcf_value(&mut shared, value)?;
        }

        let mut indiv = Vec::new();
        let samples: Vec<&SampleData> = self.samples.iter().flatten().collect();
        for key in keys {
            let def = target.format_def(key).ok_or_else(|| Error::SchemaLookup {
                kind: "FORMAT",
                name: key.clone(),
            })?;
            write_typed_scalar_int(&mut indiv, def.dict_offset as i32);
            if key == "GT" {
                encode_gt_block(&mut indiv, &samples)?;
            } else {
                encode_fmt_block(&mut indiv, key, &samples)?;
            }
        }

        out.write_u32::<LittleEndian>(shared.len() as u32)?;
        out.write_u32::<LittleEndian>(indiv.len() as u32)?;
        out.extend_from_slice(&shared);
        out.extend_from_slice(&indiv);
        Ok(())
    }
}

fn bad_field(column: &str, key: &str, raw: &str) -> Error {
    Error::format(format!("bad {column} value for '{key}': '{raw}'"))
}

fn split_columns(line: &str) -> Vec<Range<usize>> {
    let mut cols = Vec::with_capacity(12);
    let mut start = 0usize;
    for (i, b) in line.bytes().enumerate() {
        if b == b'\t' {
            cols.push(start..i);
            start = i + 1;
        }
    }
    cols.push(start..line.len());
    cols
}

// --- text value decoding ---

/// True when the declaration allows more than one value.
fn is_multi(def: Option<&FieldDef>) -> bool {
    match def {
        None => false,
        Some(d) => !matches!(d.number, Number::Count(0) | Number::Count(1)),
    }
}

/// Decodes a text field value against its declaration. Multi-valued fields
/// always come back as vectors; a bare `.` on one decodes to a one-element
/// vector holding a missing entry rather than an error.
fn decode_text_value(raw: &str, def: Option<&FieldDef>) -> Result<Value> {
    let kind = def.map(|d| d.kind);
    if kind == Some(ValueType::Flag) {
        return Ok(Value::Flag);
    }
    let multi = is_multi(def) || raw.contains(',');
    if !multi {
        if raw == "." {
            return Ok(Value::Missing);
        }
        return Ok(match kind {
            Some(ValueType::Integer) => Value::Int(
                raw.parse()
                    .map_err(|_| Error::format(format!("bad integer '{raw}'")))?,
            ),
            Some(ValueType::Float) => Value::Float(
                raw.parse()
                    .map_err(|_| Error::format(format!("bad float '{raw}'")))?,
            ),
            Some(ValueType::Character) => {
                Value::Char(raw.chars().next().unwrap_or('.'))
            }
            _ => Value::Str(raw.to_string()),
        });
    }
    let parts: Vec<&str> = raw.split(',').collect();
    match kind {
        Some(ValueType::Integer) => {
            let mut vals = Vec::with_capacity(parts.len());
            for p in parts {
                vals.push(match p {
                    "." => None,
                    p => Some(
                        p.parse()
                            .map_err(|_| Error::format(format!("bad integer '{p}'")))?,
                    ),
                });
            }
            Ok(Value::IntVec(vals))
        }
        Some(ValueType::Float) => {
            let mut vals = Vec::with_capacity(parts.len());
            for p in parts {
                vals.push(match p {
                    "." => None,
                    p => Some(
                        p.parse()
                            .map_err(|_| Error::format(format!("bad float '{p}'")))?,
                    ),
                });
            }
            Ok(Value::FloatVec(vals))
        }
        _ => Ok(Value::StrVec(
            parts
                .iter()
                .map(|p| match *p {
                    "." => None,
                    p => Some(p.to_string()),
                })
                .collect(),
        )),
    }
}

fn decode_text_genotype(raw: &str) -> Genotype {
    let phased = raw.contains('|');
    let allele_indices = raw
        .split(['|', '/'])
        .map(|a| a.parse::<i32>().ok())
        .collect();
    Genotype {
        allele_indices,
        phased,
    }
}

/// Decodes one sample's `:`-separated block. Trailing fields may be dropped,
/// so fewer values than keys is not an error.
fn decode_text_sample(raw: &str, keys: &[String], header: &Header) -> Result<SampleData> {
    let mut out = SampleData::default();
    for (key, value) in keys.iter().zip(raw.split(':')) {
        if key == "GT" {
            out.genotype = Some(decode_text_genotype(value));
            continue;
        }
        let def = header.format_def(key);
        let value = decode_text_value(value, def).map_err(|_| bad_field("FORMAT", key, value))?;
        out.values.push((key.clone(), value));
    }
    Ok(out)
}

fn fmt_float(x: f32) -> String {
    if x == x.trunc() && x.abs() < 1e7 {
        format!("{}", x as i64)
    } else {
        format!("{x}")
    }
}

/// Text form of a value; `None` means the key is printed bare (flags).
fn fmt_value(value: &Value) -> Option<String> {
    match value {
        Value::Flag => None,
        Value::Missing => Some(".".to_string()),
        Value::Int(v) => Some(v.to_string()),
        Value::Float(v) => Some(fmt_float(*v)),
        Value::Char(c) => Some(c.to_string()),
        Value::Str(s) => Some(s.clone()),
        Value::IntVec(vs) => Some(join_opt(vs.iter().map(|v| v.map(|v| v.to_string())))),
        Value::FloatVec(vs) => Some(join_opt(vs.iter().map(|v| v.map(fmt_float)))),
        Value::StrVec(vs) => Some(join_opt(vs.iter().cloned())),
    }
}

fn join_opt(items: impl Iterator<Item = Option<String>>) -> String {
    items
        .map(|v| v.unwrap_or_else(|| ".".to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

fn fmt_sample(sample: &SampleData, keys: &[String]) -> String {
    let mut parts = Vec::with_capacity(keys.len());
    for key in keys {
        if key == "GT" {
            match &sample.genotype {
                Some(gt) => parts.push(gt.to_string()),
                None => parts.push(".".to_string()),
            }
            continue;
        }
        match sample.get(key) {
            Some(v) => parts.push(fmt_value(v).unwrap_or_else(|| ".".to_string())),
            // dropped trailing field: stop here, text form allows it
            None => break,
        }
    }
    parts.join(":")
}

// --- binary primitives ---

/// An integer slot in the binary encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BInt {
    Val(i32),
    Missing,
    /// End-of-vector padding for rows shorter than the block width.
    Eov,
}

fn type_width(kind: u8) -> Result<usize> {
    match kind {
        BT_NULL => Ok(0),
        BT_INT8 | BT_CHAR => Ok(1),
        BT_INT16 => Ok(2),
        BT_INT32 | BT_FLOAT => Ok(4),
        other => Err(Error::format(format!("unknown binary type code {other}"))),
    }
}

/// Reads a typed descriptor byte: low nibble type, high nibble count, with
/// count 15 meaning the real count follows as a typed integer.
fn read_typed_descriptor(cur: &mut Cursor<&[u8]>) -> Result<(u8, usize)> {
    let b = cur.read_u8()?;
    let kind = b & 0xf;
    let n = (b >> 4) as usize;
    let n = if n == 15 {
        read_typed_scalar_int(cur)? as usize
    } else {
        n
    };
    Ok((kind, n))
}

fn read_int_of(cur: &mut Cursor<&[u8]>, kind: u8) -> Result<BInt> {
    Ok(match kind {
        BT_INT8 => match cur.read_i8()? {
            MISSING_I8 => BInt::Missing,
            EOV_I8 => BInt::Eov,
            v => BInt::Val(v as i32),
        },
        BT_INT16 => match cur.read_i16::<LittleEndian>()? {
            MISSING_I16 => BInt::Missing,
            EOV_I16 => BInt::Eov,
            v => BInt::Val(v as i32),
        },
        BT_INT32 => match cur.read_i32::<LittleEndian>()? {
            MISSING_I32 => BInt::Missing,
            EOV_I32 => BInt::Eov,
            v => BInt::Val(v),
        },
        other => {
            return Err(Error::format(format!(
                "expected an integer type code, found {other}"
            )))
        }
    })
}

/// Reads one typed integer (descriptor + single value).
fn read_typed_scalar_int(cur: &mut Cursor<&[u8]>) -> Result<i32> {
    let (kind, n) = {
        let b = cur.read_u8()?;
        ((b & 0xf), (b >> 4) as usize)
    };
    if n != 1 {
        return Err(Error::format(format!(
            "expected a single typed integer, found a vector of {n}"
        )));
    }
    match read_int_of(cur, kind)? {
        BInt::Val(v) => Ok(v),
        _ => Err(Error::format("reserved value where an integer was expected")),
    }
}

fn read_typed_string(cur: &mut Cursor<&[u8]>) -> Result<String> {
    let (kind, n) = read_typed_descriptor(cur)?;
    if kind != BT_CHAR && !(kind == BT_NULL && n == 0) {
        return Err(Error::format(format!(
            "expected a character vector, found type code {kind}"
        )));
    }
    let mut buf = vec![0u8; n];
    std::io::Read::read_exact(cur, &mut buf)?;
    // zero padding trims
    while buf.last() == Some(&0) {
        buf.pop();
    }
    String::from_utf8(buf).map_err(|e| Error::format(format!("non-UTF-8 string field: {e}")))
}

fn read_typed_ints(cur: &mut Cursor<&[u8]>) -> Result<Vec<Option<i32>>> {
    let (kind, n) = read_typed_descriptor(cur)?;
    if n == 0 {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        match read_int_of(cur, kind)? {
            BInt::Val(v) => out.push(Some(v)),
            BInt::Missing => out.push(None),
            BInt::Eov => break,
        }
    }
    Ok(out)
}

/// Decodes one typed INFO value against its declaration.
fn decode_bcf_value(cur: &mut Cursor<&[u8]>, def: Option<&FieldDef>) -> Result<Value> {
    let (kind, n) = read_typed_descriptor(cur)?;
    let multi = is_multi(def) || n > 1;
    match kind {
        BT_NULL => {
            if def.map(|d| d.kind) == Some(ValueType::Flag) {
                Ok(Value::Flag)
            } else {
                Ok(Value::Missing)
            }
        }
        BT_CHAR => {
            let mut buf = vec![0u8; n];
            std::io::Read::read_exact(cur, &mut buf)?;
            while buf.last() == Some(&0) {
                buf.pop();
            }
            let s = String::from_utf8(buf)
                .map_err(|e| Error::format(format!("non-UTF-8 string field: {e}")))?;
            decode_text_value(&s, def)
        }
        BT_FLOAT => {
            let mut vals = Vec::with_capacity(n);
            for _ in 0..n {
                let bits = cur.read_u32::<LittleEndian>()?;
                if bits == EOV_F32_BITS {
                    break;
                }
                vals.push(if bits == MISSING_F32_BITS {
                    None
                } else {
                    Some(f32::from_bits(bits))
                });
            }
            Ok(shape_floats(vals, multi))
        }
        _ => {
            let mut vals = Vec::with_capacity(n);
            for _ in 0..n {
                match read_int_of(cur, kind)? {
                    BInt::Val(v) => vals.push(Some(v)),
                    BInt::Missing => vals.push(None),
                    BInt::Eov => break,
                }
            }
            Ok(shape_ints(vals, multi))
        }
    }
}

fn shape_ints(vals: Vec<Option<i32>>, multi: bool) -> Value {
    if multi {
        Value::IntVec(vals)
    } else {
        match vals.first() {
            Some(Some(v)) => Value::Int(*v),
            _ => Value::Missing,
        }
    }
}

fn shape_floats(vals: Vec<Option<f32>>, multi: bool) -> Value {
    if multi {
        Value::FloatVec(vals)
    } else {
        match vals.first() {
            Some(Some(v)) => Value::Float(*v),
            _ => Value::Missing,
        }
    }
}

/// Decodes one sample's slice of a FORMAT block.
fn decode_bcf_sample_value(
    slice: &[u8],
    kind: u8,
    n: usize,
    def: Option<&FieldDef>,
) -> Result<Value> {
    let mut cur = Cursor::new(slice);
    let multi = is_multi(def) || n > 1;
    match kind {
        BT_NULL => Ok(Value::Missing),
        BT_CHAR => {
            let mut buf = slice.to_vec();
            while buf.last() == Some(&0) {
                buf.pop();
            }
            let s = String::from_utf8(buf)
                .map_err(|e| Error::format(format!("non-UTF-8 string field: {e}")))?;
            if s.is_empty() || s == "." {
                Ok(Value::Missing)
            } else {
                decode_text_value(&s, def)
            }
        }
        BT_FLOAT => {
            let mut vals = Vec::with_capacity(n);
            for _ in 0..n {
                let bits = cur.read_u32::<LittleEndian>()?;
                if bits == EOV_F32_BITS {
                    break;
                }
                vals.push(if bits == MISSING_F32_BITS {
                    None
                } else {
                    Some(f32::from_bits(bits))
                });
            }
            Ok(shape_floats(vals, multi))
        }
        _ => {
            let mut vals = Vec::with_capacity(n);
            for _ in 0..n {
                match read_int_of(&mut cur, kind)? {
                    BInt::Val(v) => vals.push(Some(v)),
                    BInt::Missing => vals.push(None),
                    BInt::Eov => break,
                }
            }
            Ok(shape_ints(vals, multi))
        }
    }
}

/// Unpacks a sample's GT integers: each is `(allele + 1) << 1 | phased`, zero
/// meaning an uncalled allele, end-of-vector padding closing shorter
/// ploidies.
fn decode_bcf_genotype(slice: &[u8], kind: u8) -> Result<Genotype> {
    let width = type_width(kind)?.max(1);
    let mut cur = Cursor::new(slice);
    let mut allele_indices = Vec::new();
    let mut phased = false;
    for i in 0..slice.len() / width {
        match read_int_of(&mut cur, kind)? {
            BInt::Eov => break,
            BInt::Missing | BInt::Val(0) => allele_indices.push(None),
            BInt::Val(v) => {
                allele_indices.push(Some((v >> 1) - 1));
                if i > 0 && v & 1 != 0 {
                    phased = true;
                }
            }
        }
    }
    Ok(Genotype {
        allele_indices,
        phased,
    })
}

// --- binary encoding ---

fn write_typed_descriptor(out: &mut Vec<u8>, kind: u8, n: usize) {
    if n < 15 {
        out.push(((n as u8) << 4) | kind);
    } else {
        out.push(0xf0 | kind);
        write_typed_scalar_int(out, n as i32);
    }
}

/// Narrowest integer width that can hold every value, reserved patterns
/// excluded.
fn int_kind(vals: &[BInt]) -> u8 {
    let mut kind = BT_INT8;
    for v in vals {
        if let BInt::Val(v) = v {
            if *v < i16::MIN as i32 + 8 || *v > i16::MAX as i32 {
                return BT_INT32;
            }
            if *v < i8::MIN as i32 + 8 || *v > i8::MAX as i32 {
                kind = BT_INT16;
            }
        }
    }
    kind
}

fn write_int_of(out: &mut Vec<u8>, kind: u8, v: BInt) {
    match kind {
        BT_INT8 => {
            let b = match v {
                BInt::Val(v) => v as i8,
                BInt::Missing => MISSING_I8,
                BInt::Eov => EOV_I8,
            };
            out.push(b as u8);
        }
        BT_INT16 => {
            let b = match v {
                BInt::Val(v) => v as i16,
                BInt::Missing => MISSING_I16,
                BInt::Eov => EOV_I16,
            };
            out.extend_from_slice(&b.to_le_bytes());
        }
        _ => {
            let b = match v {
                BInt::Val(v) => v,
                BInt::Missing => MISSING_I32,
                BInt::Eov => EOV_I32,
            };
            out.extend_from_slice(&b.to_le_bytes());
        }
    }
}

fn write_typed_scalar_int(out: &mut Vec<u8>, v: i32) {
    let kind = int_kind(&[BInt::Val(v)]);
    out.push((1 << 4) | kind);
    write_int_of(out, kind, BInt::Val(v));
}

fn write_typed_ints(out: &mut Vec<u8>, vals: &[BInt]) {
    let kind = int_kind(vals);
    write_typed_descriptor(out, if vals.is_empty() { BT_NULL } else { kind }, vals.len());
    for v in vals {
        write_int_of(out, kind, *v);
    }
}

fn write_typed_floats(out: &mut Vec<u8>, vals: &[Option<f32>]) {
    write_typed_descriptor(out, BT_FLOAT, vals.len());
    for v in vals {
        let bits = match v {
            Some(v) => v.to_bits(),
            None => MISSING_F32_BITS,
        };
        out.extend_from_slice(&bits.to_le_bytes());
    }
}

fn write_typed_string(out: &mut Vec<u8>, s: &str) {
    write_typed_descriptor(out, BT_CHAR, s.len());
    out.extend_from_slice(s.as_bytes());
}

fn encode_bcf_value(out: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Flag | Value::Missing => out.push(BT_NULL),
        Value::Int(v) => write_typed_ints(out, &[BInt::Val(*v)]),
        Value::IntVec(vs) => {
            let vals: Vec<BInt> = vs
                .iter()
                .map(|v| v.map(BInt::Val).unwrap_or(BInt::Missing))
                .collect();
            write_typed_ints(out, &vals);
        }
        Value::Float(v) => write_typed_floats(out, &[Some(*v)]),
        Value::FloatVec(vs) => write_typed_floats(out, vs),
        Value::Char(c) => write_typed_string(out, &c.to_string()),
        Value::Str(s) => write_typed_string(out, s),
        Value::StrVec(vs) => {
            let joined = join_opt(vs.iter().cloned());
            write_typed_string(out, &joined);
        }
    }
    Ok(())
}

fn encode_gt_block(out: &mut Vec<u8>, samples: &[&SampleData]) -> Result<()> {
    let ploidy = samples
        .iter()
        .filter_map(|s| s.genotype.as_ref())
        .map(|g| g.allele_indices.len())
        .max()
        .unwrap_or(0);
    let mut rows: Vec<Vec<BInt>> = Vec::with_capacity(samples.len());
    for s in samples {
        let mut row = Vec::with_capacity(ploidy);
        if let Some(gt) = &s.genotype {
            for (i, allele) in gt.allele_indices.iter().enumerate() {
                let phase = (i > 0 && gt.phased) as i32;
                let v = match allele {
                    Some(a) => ((a + 1) << 1) | phase,
                    None => 0,
                };
                row.push(BInt::Val(v));
            }
        }
        while row.len() < ploidy {
            row.push(BInt::Eov);
        }
        rows.push(row);
    }
    let flat: Vec<BInt> = rows.iter().flatten().copied().collect();
    let kind = int_kind(&flat);
    write_typed_descriptor(out, kind, ploidy);
    for row in &rows {
        for v in row {
            write_int_of(out, kind, *v);
        }
    }
    Ok(())
}

/// Encodes one non-GT FORMAT block: a uniform type and per-sample width,
/// shorter samples padded with end-of-vector markers.
fn encode_fmt_block(out: &mut Vec<u8>, key: &str, samples: &[&SampleData]) -> Result<()> {
    let values: Vec<Option<&Value>> = samples.iter().map(|s| s.get(key)).collect();

    let is_string = values.iter().flatten().any(|v| {
        matches!(v, Value::Str(_) | Value::StrVec(_) | Value::Char(_))
    });
    let is_float = !is_string
        && values
            .iter()
            .flatten()
            .any(|v| matches!(v, Value::Float(_) | Value::FloatVec(_)));

    if is_string {
        let texts: Vec<String> = values
            .iter()
            .map(|v| match v {
                Some(v) => fmt_value(v).unwrap_or_else(|| ".".to_string()),
                None => ".".to_string(),
            })
            .collect();
        let width = texts.iter().map(|t| t.len()).max().unwrap_or(1).max(1);
        write_typed_descriptor(out, BT_CHAR, width);
        for t in &texts {
            out.extend_from_slice(t.as_bytes());
            out.resize(out.len() + width - t.len(), 0);
        }
        return Ok(());
    }

    if is_float {
        let rows: Vec<Vec<Option<f32>>> = values
            .iter()
            .map(|v| match v {
                Some(Value::Float(x)) => vec![Some(*x)],
                Some(Value::FloatVec(xs)) => xs.clone(),
                Some(Value::Int(x)) => vec![Some(*x as f32)],
                Some(Value::IntVec(xs)) => xs.iter().map(|x| x.map(|x| x as f32)).collect(),
                _ => vec![None],
            })
            .collect();
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(1).max(1);
        write_typed_descriptor(out, BT_FLOAT, width);
        for row in &rows {
            for v in row {
                let bits = v.map(f32::to_bits).unwrap_or(MISSING_F32_BITS);
                out.extend_from_slice(&bits.to_le_bytes());
            }
            for _ in row.len()..width {
                out.extend_from_slice(&EOV_F32_BITS.to_le_bytes());
            }
        }
        return Ok(());
    }

    let rows: Vec<Vec<BInt>> = values
        .iter()
        .map(|v| match v {
            Some(Value::Int(x)) => vec![BInt::Val(*x)],
            Some(Value::IntVec(xs)) => xs
                .iter()
                .map(|x| x.map(BInt::Val).unwrap_or(BInt::Missing))
                .collect(),
            _ => vec![BInt::Missing],
        })
        .collect();
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(1).max(1);
    let flat: Vec<BInt> = rows.iter().flatten().copied().collect();
    let kind = int_kind(&flat);
    write_typed_descriptor(out, kind, width);
    for row in &rows {
        for v in row {
            write_int_of(out, kind, *v);
        }
        for _ in row.len()..width {
            write_int_of(out, kind, BInt::Eov);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_header() -> Arc<Header> {
        let text = concat!(
            "##fileformat=VCFv4.0\n",
            "##FILTER=<ID=q10,Description=\"Quality below 10\">\n",
            "##FILTER=<ID=s50,Description=\"Less than 50% of samples have data\">\n",
            "##contig=<ID=20,length=62435964>\n",
            "##INFO=<ID=NS,Number=1,Type=Integer,Description=\"Number of Samples With Data\">\n",
            "##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total Depth\">\n",
            "##INFO=<ID=AF,Number=.,Type=Float,Description=\"Allele Frequency\">\n",
            "##INFO=<ID=DB,Number=0,Type=Flag,Description=\"dbSNP membership, build 129\">\n",
            "##INFO=<ID=H2,Number=0,Type=Flag,Description=\"HapMap2 membership\">\n",
            "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n",
            "##FORMAT=<ID=GQ,Number=1,Type=Integer,Description=\"Genotype Quality\">\n",
            "##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read Depth\">\n",
            "##FORMAT=<ID=HQ,Number=2,Type=Integer,Description=\"Haplotype Quality\">\n",
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNA00001\tNA00002\tNA00003\n",
        );
        Arc::new(Header::from_text(text).unwrap())
    }

    const LINE: &str = "20\t14370\trs6054257\tG\tA\t29\tPASS\tNS=3;DP=14;AF=0.5;DB;H2\tGT:GQ:DP:HQ\t0|0:48:1:51,51\t1|0:48:8:51,51\t1/1:43:5:.,.";

    #[test]
    fn core_columns_decode_lazily() {
        let mut rec = Record::from_text_line(test_header(), LINE.to_string());
        assert_eq!(rec.chrom().unwrap(), "20");
        assert_eq!(rec.pos().unwrap(), 14370);
        assert_eq!(rec.start().unwrap(), 14369);
        assert_eq!(rec.id().unwrap(), Some("rs6054257".to_string()));
        assert_eq!(rec.ref_allele().unwrap(), "G");
        assert_eq!(rec.alts().unwrap(), vec!["A".to_string()]);
        assert_eq!(rec.qual().unwrap(), Some(29.0));
        assert_eq!(rec.filters().unwrap(), Some(vec!["PASS".to_string()]));
        // info was never touched
        assert!(rec.info.is_none());
    }

    #[test]
    fn info_decodes_by_declared_type() {
        let mut rec = Record::from_text_line(test_header(), LINE.to_string());
        assert_eq!(rec.info_value("NS").unwrap(), Some(Value::Int(3)));
        assert_eq!(
            rec.info_value("AF").unwrap(),
            Some(Value::FloatVec(vec![Some(0.5)]))
        );
        assert_eq!(rec.info_value("DB").unwrap(), Some(Value::Flag));
        assert_eq!(rec.info_value("XX").unwrap(), None);
        assert_eq!(
            rec.info_keys().unwrap(),
            vec!["NS", "DP", "AF", "DB", "H2"]
        );
    }

    #[test]
    fn samples_decode_independently() {
        let mut rec = Record::from_text_line(test_header(), LINE.to_string());
        let s2 = rec.sample(2).unwrap();
        assert_eq!(
            s2.genotype().unwrap().allele_indices,
            vec![Some(1), Some(1)]
        );
        assert!(!s2.genotype().unwrap().phased);
        // HQ "." per element becomes a missing-entry vector
        assert_eq!(
            s2.get("HQ"),
            Some(&Value::IntVec(vec![None, None]))
        );
        // samples 0 and 1 were never decoded
        assert!(rec.samples[0].is_none());
        assert!(rec.samples[1].is_none());

        let s0 = rec.sample(0).unwrap();
        assert_eq!(
            s0.genotype().unwrap().allele_indices,
            vec![Some(0), Some(0)]
        );
        assert!(s0.genotype().unwrap().phased);
        assert_eq!(s0.get("HQ"), Some(&Value::IntVec(vec![Some(51), Some(51)])));
    }

    #[test]
    fn decode_is_idempotent() {
        let mut rec = Record::from_text_line(test_header(), LINE.to_string());
        let a = rec.info_value("DP").unwrap();
        let b = rec.info_value("DP").unwrap();
        assert_eq!(a, b);
        assert_eq!(rec.to_vcf_line().unwrap(), LINE);
    }

    #[test]
    fn clean_records_serialize_verbatim_and_dirty_ones_rebuild() {
        let mut rec = Record::from_text_line(test_header(), LINE.to_string());
        assert_eq!(rec.to_vcf_line().unwrap(), LINE);
        rec.set_qual(Some(10.0)).unwrap();
        let rebuilt = rec.to_vcf_line().unwrap();
        assert_eq!(rebuilt, LINE.replace("\t29\t", "\t10\t"));
    }

    #[test]
    fn permissive_singleton_on_multivalued_field() {
        let line = "20\t17330\t.\tT\tA\t3\tq10\tNS=3;DP=11;AF=0.017\tGT:GQ:DP:HQ\t0|0:49:3:58,50\t0|1:3:5:65,3\t0/0:41:3:.";
        let mut rec = Record::from_text_line(test_header(), line.to_string());
        let s2 = rec.sample(2).unwrap();
        assert_eq!(s2.get("HQ"), Some(&Value::IntVec(vec![None])));
    }

    #[test]
    fn bcf_round_trip_preserves_fields() {
        let header = test_header();
        let mut rec = Record::from_text_line(Arc::clone(&header), LINE.to_string());
        let mut bytes = Vec::new();
        rec.to_bcf_bytes(&header, &mut bytes).unwrap();

        let mut cur = Cursor::new(bytes.as_slice());
        let l_shared = cur.read_u32::<LittleEndian>().unwrap() as usize;
        let l_indiv = cur.read_u32::<LittleEndian>().unwrap() as usize;
        let rest = &bytes[8..];
        let shared = rest[..l_shared].to_vec();
        let indiv = rest[l_shared..l_shared + l_indiv].to_vec();

        let mut back = Record::from_bcf_parts(Arc::clone(&header), shared, indiv);
        assert_eq!(back.chrom().unwrap(), "20");
        assert_eq!(back.pos().unwrap(), 14370);
        assert_eq!(back.id().unwrap(), Some("rs6054257".to_string()));
        assert_eq!(back.qual().unwrap(), Some(29.0));
        assert_eq!(back.filters().unwrap(), Some(vec!["PASS".to_string()]));
        assert_eq!(back.info_value("NS").unwrap(), Some(Value::Int(3)));
        assert_eq!(back.info_value("DB").unwrap(), Some(Value::Flag));
        let s1 = back.sample(1).unwrap();
        assert_eq!(
            s1.genotype().unwrap().allele_indices,
            vec![Some(1), Some(0)]
        );
        assert!(s1.genotype().unwrap().phased);
        assert_eq!(s1.get("GQ"), Some(&Value::Int(48)));
        assert_eq!(back.to_vcf_line().unwrap(), LINE);
    }

    #[test]
    fn translate_rejects_unknown_names() {
        let target = Arc::new(Header::from_text(concat!(
            "##fileformat=VCFv4.0\n",
            "##contig=<ID=21>\n",
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n",
        )).unwrap());
        let mut rec = Record::from_text_line(test_header(), LINE.to_string());
        match rec.translate(&target) {
            Err(Error::SchemaLookup { kind, name }) => {
                assert_eq!(kind, "contig");
                assert_eq!(name, "20");
            }
            other => panic!("expected a schema lookup failure, got {other:?}"),
        }
    }

    #[test]
    fn translate_switches_headers() {
        let header = test_header();
        let target = Arc::new(Header::from_text(&header.to_text()).unwrap());
        let mut rec = Record::from_text_line(header, LINE.to_string());
        rec.translate(&target).unwrap();
        assert!(Arc::ptr_eq(rec.header(), &target));
        assert_eq!(rec.to_vcf_line().unwrap(), LINE);
    }

    #[test]
    fn sites_only_line_has_no_format() {
        let line = "20\t14370\t.\tG\tA\t29\t.\tNS=3";
        let header = Arc::new(Header::from_text(concat!(
            "##fileformat=VCFv4.0\n",
            "##INFO=<ID=NS,Number=1,Type=Integer,Description=\"n\">\n",
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n",
        )).unwrap());
        let mut rec = Record::from_text_line(header, line.to_string());
        assert!(rec.format_keys().unwrap().is_empty());
        assert_eq!(rec.filters().unwrap(), None);
        assert_eq!(rec.to_vcf_line().unwrap(), line);
    }

    #[test]
    fn mixed_ploidy_genotypes_round_trip() {
        let header = test_header();
        let line = "20\t1234567\t.\tG\tA\t50\tPASS\tNS=3\tGT\t0/1\t0\t./.";
        let mut rec = Record::from_text_line(Arc::clone(&header), line.to_string());
        let mut bytes = Vec::new();
        rec.to_bcf_bytes(&header, &mut bytes).unwrap();

        let l_shared = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let shared = bytes[8..8 + l_shared].to_vec();
        let indiv = bytes[8 + l_shared..].to_vec();
        let mut back = Record::from_bcf_parts(header, shared, indiv);
        assert_eq!(
            back.sample(0).unwrap().genotype().unwrap().allele_indices,
            vec![Some(0), Some(1)]
        );
        assert_eq!(
            back.sample(1).unwrap().genotype().unwrap().allele_indices,
            vec![Some(0)]
        );
        assert_eq!(
            back.sample(2).unwrap().genotype().unwrap().allele_indices,
            vec![None, None]
        );
    }

    #[test]
    fn bad_column_counts_are_format_errors() {
        let mut rec = Record::from_text_line(test_header(), "20\t14370\tonly-three".to_string());
        assert!(matches!(rec.chrom(), Err(Error::Format { .. })));
    }
}
