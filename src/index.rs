//! Binned interval indexes over BGZF-compressed variant data.
//!
//! Both supported layouts hash a genomic interval to the smallest bin of a
//! fixed hierarchy that contains it, and store per-bin lists of compressed
//! file chunks. The classic tabix layout (`TBI`) fixes the scheme at
//! `min_shift = 14, depth = 5`, capping coordinates at 2^29 - 1; the generic
//! layout (`CSI`) carries its scheme parameters in the file and has no such
//! cap. Index files are themselves BGZF-compressed.
//!
//! Bin membership is a superset filter: a query returns every chunk that may
//! hold overlapping records, and the caller re-checks real record spans.

use crate::bgzf::{self, VirtualOffset};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::path::Path;

/// Tabix scheme parameters.
pub const TBI_MIN_SHIFT: u32 = 14;
pub const TBI_DEPTH: u32 = 5;
/// Largest coordinate the tabix layout can address.
pub const TBI_MAX_COORD: i64 = 1 << 29;

/// On-disk layout of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Tbi,
    Csi,
}

/// Column/comment configuration stored in tabix-style indexes. Only the
/// variant-text preset is ever produced, but arbitrary values read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabixConfig {
    pub format: i32,
    pub col_seq: i32,
    pub col_beg: i32,
    pub col_end: i32,
    pub meta: i32,
    pub skip: i32,
}

/// Preset for tab-separated variant text: sequence in column 1, position in
/// column 2, no end column, `#` comments, no skipped lines.
pub const VCF_CONFIG: TabixConfig = TabixConfig {
    format: 2,
    col_seq: 1,
    col_beg: 2,
    col_end: 0,
    meta: '#' as i32,
    skip: 0,
};

/// Half-open range of compressed file positions, as raw virtual offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub beg: u64,
    pub end: u64,
}

#[derive(Debug, Clone, Default)]
struct BinData {
    /// Lowest virtual offset of any record in this bin.
    loffset: u64,
    chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Default)]
struct RefIndex {
    bins: BTreeMap<u32, BinData>,
    /// Lowest virtual offset per `1 << min_shift` window of the reference.
    linear: Vec<u64>,
}

/// Smallest bin of the `(min_shift, depth)` hierarchy fully containing
/// `[beg, end)`.
pub fn reg2bin(beg: i64, end: i64, min_shift: u32, depth: u32) -> u32 {
    let end = end - 1;
    let mut s = min_shift;
    let mut t = ((1i64 << (depth * 3)) - 1) / 7;
    for l in (1..=depth).rev() {
        if beg >> s == end >> s {
            return (t + (beg >> s)) as u32;
        }
        s += 3;
        t -= 1i64 << ((l - 1) * 3);
    }
    0
}

/// Every bin that may hold an interval overlapping `[beg, end)`.
pub fn reg2bins(beg: i64, end: i64, min_shift: u32, depth: u32) -> Vec<u32> {
    let end = end - 1;
    let mut bins = Vec::new();
    let mut s = min_shift + depth * 3;
    let mut t = 0i64;
    for l in 0..=depth {
        let b = t + (beg >> s);
        let e = t + (end >> s);
        for i in b..=e {
            bins.push(i as u32);
        }
        s -= 3;
        t += 1i64 << (l * 3);
    }
    bins
}

/// An index held in memory, either built from records or parsed from disk.
#[derive(Debug, Clone)]
pub struct Index {
    min_shift: u32,
    depth: u32,
    /// Reference names in id order. Empty when the source names its
    /// references elsewhere (binary headers).
    names: Vec<String>,
    refs: Vec<RefIndex>,
    config: Option<TabixConfig>,
}

impl Index {
    pub fn min_shift(&self) -> u32 {
        self.min_shift
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn config(&self) -> Option<&TabixConfig> {
        self.config.as_ref()
    }

    /// Reference id for `name`, when the index itself carries names.
    pub fn tid(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn n_refs(&self) -> usize {
        self.refs.len()
    }

    /// Chunks that may hold records overlapping `[beg, end)` on reference
    /// `tid`, sorted and merged. Chunks wholly before the linear-index lower
    /// bound are dropped.
    pub fn query(&self, tid: usize, beg: i64, end: i64) -> Vec<Chunk> {
        let Some(r) = self.refs.get(tid) else {
            return Vec::new();
        };
        let min_off = self.lower_bound(r, beg);
        let mut chunks = Vec::new();
        for bin in reg2bins(beg, end, self.min_shift, self.depth) {
            if let Some(data) = r.bins.get(&bin) {
                for c in &data.chunks {
                    if c.end > min_off {
                        chunks.push(Chunk {
                            beg: c.beg.max(min_off),
                            end: c.end,
                        });
                    }
                }
            }
        }
        chunks.sort_by_key(|c| c.beg);
        merge_chunks(chunks)
    }

    fn lower_bound(&self, r: &RefIndex, beg: i64) -> u64 {
        if !r.linear.is_empty() {
            let window = ((beg >> self.min_shift) as usize).min(r.linear.len() - 1);
            return r.linear[window];
        }
        // no linear index on disk: walk up from the smallest bin covering
        // `beg` until one with a recorded low offset exists
        let mut bin = reg2bin(beg, beg + 1, self.min_shift, self.depth);
        loop {
            if let Some(data) = r.bins.get(&bin) {
                return data.loffset;
            }
            if bin == 0 {
                return 0;
            }
            bin = (bin - 1) >> 3;
        }
    }

    // --- persistence ---

    /// Parses an index file, recognizing either layout by its magic.
    pub fn load(path: &Path) -> Result<Index> {
        let file = std::fs::File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                Error::Io(e)
            }
        })?;
        let mut reader = bgzf::Reader::new(file, 1, None, false);
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload)?;
        Index::from_bytes(&payload)
    }

    /// Parses the decompressed payload of an index file.
    pub fn from_bytes(payload: &[u8]) -> Result<Index> {
        let mut cur = std::io::Cursor::new(payload);
        let mut magic = [0u8; 4];
        cur.read_exact(&mut magic)?;
        match &magic {
            b"TBI\x01" => Index::read_tbi(&mut cur),
            b"CSI\x01" => Index::read_csi(&mut cur),
            other => Err(Error::format(format!(
                "unknown index magic {other:?}"
            ))),
        }
    }

    fn read_tbi<R: Read>(cur: &mut R) -> Result<Index> {
        let n_ref = cur.read_i32::<LittleEndian>()?;
        let config = TabixConfig {
            format: cur.read_i32::<LittleEndian>()?,
            col_seq: cur.read_i32::<LittleEndian>()?,
            col_beg: cur.read_i32::<LittleEndian>()?,
            col_end: cur.read_i32::<LittleEndian>()?,
            meta: cur.read_i32::<LittleEndian>()?,
            skip: cur.read_i32::<LittleEndian>()?,
        };
        let l_nm = cur.read_i32::<LittleEndian>()?;
        let names = read_names(cur, l_nm as usize)?;
        let mut refs = Vec::with_capacity(n_ref as usize);
        for _ in 0..n_ref {
            let mut r = RefIndex::default();
            let n_bin = cur.read_i32::<LittleEndian>()?;
            for _ in 0..n_bin {
                let bin = cur.read_u32::<LittleEndian>()?;
                let n_chunk = cur.read_i32::<LittleEndian>()?;
                let mut chunks = Vec::with_capacity(n_chunk as usize);
                for _ in 0..n_chunk {
                    chunks.push(Chunk {
                        beg: cur.read_u64::<LittleEndian>()?,
                        end: cur.read_u64::<LittleEndian>()?,
                    });
                }
                let loffset = chunks.first().map(|c| c.beg).unwrap_or(0);
                r.bins.insert(bin, BinData { loffset, chunks });
            }
            let n_intv = cur.read_i32::<LittleEndian>()?;
            for _ in 0..n_intv {
                r.linear.push(cur.read_u64::<LittleEndian>()?);
            }
            refs.push(r);
        }
        Ok(Index {
            min_shift: TBI_MIN_SHIFT,
            depth: TBI_DEPTH,
            names,
            refs,
            config: Some(config),
        })
    }

    fn read_csi<R: Read>(cur: &mut R) -> Result<Index> {
        let min_shift = cur.read_i32::<LittleEndian>()? as u32;
        let depth = cur.read_i32::<LittleEndian>()? as u32;
        let l_aux = cur.read_i32::<LittleEndian>()? as usize;
        let mut aux = vec![0u8; l_aux];
        cur.read_exact(&mut aux)?;
        let (config, names) = parse_csi_aux(&aux)?;
        let n_ref = cur.read_i32::<LittleEndian>()?;
        let mut refs = Vec::with_capacity(n_ref as usize);
        for _ in 0..n_ref {
            let mut r = RefIndex::default();
            let n_bin = cur.read_i32::<LittleEndian>()?;
            for _ in 0..n_bin {
                let bin = cur.read_u32::<LittleEndian>()?;
                let loffset = cur.read_u64::<LittleEndian>()?;
                let n_chunk = cur.read_i32::<LittleEndian>()?;
                let mut chunks = Vec::with_capacity(n_chunk as usize);
                for _ in 0..n_chunk {
                    chunks.push(Chunk {
                        beg: cur.read_u64::<LittleEndian>()?,
                        end: cur.read_u64::<LittleEndian>()?,
                    });
                }
                r.bins.insert(bin, BinData { loffset, chunks });
            }
            refs.push(r);
        }
        Ok(Index {
            min_shift,
            depth,
            names,
            refs,
            config,
        })
    }

    /// Serializes in the requested layout and compresses the result.
    /// Requesting the tabix layout for coordinates beyond its 29-bit range is
    /// a format error; callers fall back to the generic layout.
    pub fn to_file_bytes(&self, kind: IndexKind) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        match kind {
            IndexKind::Tbi => self.write_tbi(&mut payload)?,
            IndexKind::Csi => self.write_csi(&mut payload)?,
        }
        Ok(bgzf::compress_to_vec(&payload)?)
    }

    /// Writes to `path`, BGZF-compressed.
    pub fn save(&self, path: &Path, kind: IndexKind) -> Result<()> {
        let bytes = self.to_file_bytes(kind)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn write_tbi<W: Write>(&self, out: &mut W) -> Result<()> {
        if self.min_shift != TBI_MIN_SHIFT || self.depth != TBI_DEPTH {
            return Err(Error::format(format!(
                "tabix layout requires scheme (14, 5), index uses ({}, {})",
                self.min_shift, self.depth
            )));
        }
        for r in &self.refs {
            let span = (r.linear.len() as i64) << self.min_shift;
            if span > TBI_MAX_COORD {
                return Err(Error::format(
                    "coordinates exceed the tabix 2^29 limit; use the generic layout",
                ));
            }
        }
        let config = self.config.unwrap_or(VCF_CONFIG);
        out.write_all(b"TBI\x01")?;
        out.write_i32::<LittleEndian>(self.refs.len() as i32)?;
        out.write_i32::<LittleEndian>(config.format)?;
        out.write_i32::<LittleEndian>(config.col_seq)?;
        out.write_i32::<LittleEndian>(config.col_beg)?;
        out.write_i32::<LittleEndian>(config.col_end)?;
        out.write_i32::<LittleEndian>(config.meta)?;
        out.write_i32::<LittleEndian>(config.skip)?;
        let blob = names_blob(&self.names);
        out.write_i32::<LittleEndian>(blob.len() as i32)?;
        out.write_all(&blob)?;
        for r in &self.refs {
            out.write_i32::<LittleEndian>(r.bins.len() as i32)?;
            for (bin, data) in &r.bins {
                out.write_u32::<LittleEndian>(*bin)?;
                out.write_i32::<LittleEndian>(data.chunks.len() as i32)?;
                for c in &data.chunks {
                    out.write_u64::<LittleEndian>(c.beg)?;
                    out.write_u64::<LittleEndian>(c.end)?;
                }
            }
            out.write_i32::<LittleEndian>(r.linear.len() as i32)?;
            for off in &r.linear {
                out.write_u64::<LittleEndian>(*off)?;
            }
        }
        Ok(())
    }

    fn write_csi<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_all(b"CSI\x01")?;
        out.write_i32::<LittleEndian>(self.min_shift as i32)?;
        out.write_i32::<LittleEndian>(self.depth as i32)?;
        let aux = match &self.config {
            Some(config) => {
                let mut aux = Vec::new();
                aux.write_i32::<LittleEndian>(config.format)?;
                aux.write_i32::<LittleEndian>(config.col_seq)?;
                aux.write_i32::<LittleEndian>(config.col_beg)?;
                aux.write_i32::<LittleEndian>(config.col_end)?;
                aux.write_i32::<LittleEndian>(config.meta)?;
                aux.write_i32::<LittleEndian>(config.skip)?;
                let blob = names_blob(&self.names);
                aux.write_i32::<LittleEndian>(blob.len() as i32)?;
                aux.extend_from_slice(&blob);
                aux
            }
            None => Vec::new(),
        };
        out.write_i32::<LittleEndian>(aux.len() as i32)?;
        out.write_all(&aux)?;
        out.write_i32::<LittleEndian>(self.refs.len() as i32)?;
        for r in &self.refs {
            out.write_i32::<LittleEndian>(r.bins.len() as i32)?;
            for (bin, data) in &r.bins {
                out.write_u32::<LittleEndian>(*bin)?;
                out.write_u64::<LittleEndian>(data.loffset)?;
                out.write_i32::<LittleEndian>(data.chunks.len() as i32)?;
                for c in &data.chunks {
                    out.write_u64::<LittleEndian>(c.beg)?;
                    out.write_u64::<LittleEndian>(c.end)?;
                }
            }
        }
        Ok(())
    }
}

fn names_blob(names: &[String]) -> Vec<u8> {
    let mut blob = Vec::new();
    for name in names {
        blob.extend_from_slice(name.as_bytes());
        blob.push(0);
    }
    blob
}

fn read_names<R: Read>(cur: &mut R, len: usize) -> Result<Vec<String>> {
    let mut blob = vec![0u8; len];
    cur.read_exact(&mut blob)?;
    Ok(blob
        .split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect())
}

fn parse_csi_aux(aux: &[u8]) -> Result<(Option<TabixConfig>, Vec<String>)> {
    if aux.len() < 28 {
        return Ok((None, Vec::new()));
    }
    let mut cur = std::io::Cursor::new(aux);
    let config = TabixConfig {
        format: cur.read_i32::<LittleEndian>()?,
        col_seq: cur.read_i32::<LittleEndian>()?,
        col_beg: cur.read_i32::<LittleEndian>()?,
        col_end: cur.read_i32::<LittleEndian>()?,
        meta: cur.read_i32::<LittleEndian>()?,
        skip: cur.read_i32::<LittleEndian>()?,
    };
    let l_nm = cur.read_i32::<LittleEndian>()? as usize;
    let names = read_names(&mut cur, l_nm.min(aux.len().saturating_sub(28)))?;
    Ok((Some(config), names))
}

fn merge_chunks(sorted: Vec<Chunk>) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::with_capacity(sorted.len());
    for c in sorted {
        match merged.last_mut() {
            Some(last) if c.beg <= last.end => {
                last.end = last.end.max(c.end);
            }
            _ => merged.push(c),
        }
    }
    merged
}

/// Accumulates `(reference, span, file range)` triples for records fed in
/// file order, then yields the finished [`Index`]. Input must be sorted by
/// reference id, then by start.
pub struct IndexBuilder {
    min_shift: u32,
    depth: u32,
    names: Vec<String>,
    name_ids: HashMap<String, usize>,
    refs: Vec<RefIndex>,
    last: Option<(usize, i64)>,
    config: Option<TabixConfig>,
}

impl IndexBuilder {
    pub fn new(min_shift: u32, depth: u32, config: Option<TabixConfig>) -> Self {
        IndexBuilder {
            min_shift,
            depth,
            names: Vec::new(),
            name_ids: HashMap::new(),
            refs: Vec::new(),
            last: None,
            config,
        }
    }

    /// Builder for the tabix scheme with the variant-text preset.
    pub fn tabix() -> Self {
        IndexBuilder::new(TBI_MIN_SHIFT, TBI_DEPTH, Some(VCF_CONFIG))
    }

    /// Reference id for `name`, registering it on first sight.
    pub fn tid_for(&mut self, name: &str) -> usize {
        if let Some(&tid) = self.name_ids.get(name) {
            return tid;
        }
        let tid = self.names.len();
        self.name_ids.insert(name.to_string(), tid);
        self.names.push(name.to_string());
        tid
    }

    /// Feeds one record covering `[beg, end)` on `tid`, stored in the file
    /// range `[voff_beg, voff_end)`.
    pub fn add(
        &mut self,
        tid: usize,
        beg: i64,
        end: i64,
        voff_beg: VirtualOffset,
        voff_end: VirtualOffset,
    ) -> Result<()> {
        if let Some((last_tid, last_beg)) = self.last {
            if tid < last_tid || (tid == last_tid && beg < last_beg) {
                return Err(Error::format(format!(
                    "records out of order: reference {tid} position {beg} after reference {last_tid} position {last_beg}"
                )));
            }
        }
        self.last = Some((tid, beg));
        if self.refs.len() <= tid {
            self.refs.resize_with(tid + 1, RefIndex::default);
        }
        let end = end.max(beg + 1);
        let r = &mut self.refs[tid];

        let bin = reg2bin(beg, end, self.min_shift, self.depth);
        let data = r.bins.entry(bin).or_insert_with(|| BinData {
            loffset: voff_beg.as_raw(),
            chunks: Vec::new(),
        });
        match data.chunks.last_mut() {
            // contiguous records extend the open chunk instead of adding one
            Some(last) if last.end == voff_beg.as_raw() => last.end = voff_end.as_raw(),
            _ => data.chunks.push(Chunk {
                beg: voff_beg.as_raw(),
                end: voff_end.as_raw(),
            }),
        }

        let w_beg = (beg >> self.min_shift) as usize;
        let w_end = ((end - 1) >> self.min_shift) as usize;
        if r.linear.len() <= w_end {
            // u64::MAX marks a window no record has touched yet; a real
            // virtual offset of 0 must survive as a lower bound
            r.linear.resize(w_end + 1, u64::MAX);
        }
        for w in w_beg..=w_end {
            if r.linear[w] > voff_beg.as_raw() {
                r.linear[w] = voff_beg.as_raw();
            }
        }
        Ok(())
    }

    /// Explicitly registers a reference so it serializes even with no
    /// records (binary sources declare their full contig table up front).
    pub fn declare_reference(&mut self, name: &str) {
        let tid = self.tid_for(name);
        if self.refs.len() <= tid {
            self.refs.resize_with(tid + 1, RefIndex::default);
        }
    }

    /// True when every fed coordinate fits the tabix layout.
    pub fn fits_tabix(&self) -> bool {
        self.min_shift == TBI_MIN_SHIFT
            && self.depth == TBI_DEPTH
            && self
                .refs
                .iter()
                .all(|r| ((r.linear.len() as i64) << self.min_shift) <= TBI_MAX_COORD)
    }

    pub fn finish(mut self) -> Index {
        // backfill untouched windows with the preceding window's offset so
        // lower-bound lookups between records stay conservative
        for r in &mut self.refs {
            let mut carry = 0u64;
            for w in r.linear.iter_mut() {
                if *w == u64::MAX {
                    *w = carry;
                } else {
                    carry = *w;
                }
            }
        }
        Index {
            min_shift: self.min_shift,
            depth: self.depth,
            names: self.names,
            refs: self.refs,
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smallest_containing_bin_matches_the_fixed_scheme() {
        // whole-chromosome interval lands in the root bin
        assert_eq!(reg2bin(0, 1 << 29, TBI_MIN_SHIFT, TBI_DEPTH), 0);
        // a short interval lands in a leaf bin
        let b = reg2bin(14369, 14370, TBI_MIN_SHIFT, TBI_DEPTH);
        assert_eq!(b, 4681 + (14369 >> 14));
        // candidate set always contains the containing bin
        let bins = reg2bins(14000, 15000, TBI_MIN_SHIFT, TBI_DEPTH);
        assert!(bins.contains(&b));
        assert!(bins.contains(&0));
    }

    #[test]
    fn builder_merges_contiguous_chunks() {
        let mut b = IndexBuilder::tabix();
        let tid = b.tid_for("20");
        b.add(tid, 100, 101, VirtualOffset::from_raw(0), VirtualOffset::from_raw(50))
            .unwrap();
        b.add(tid, 200, 201, VirtualOffset::from_raw(50), VirtualOffset::from_raw(90))
            .unwrap();
        let idx = b.finish();
        let chunks = idx.query(0, 0, 1000);
        assert_eq!(chunks, vec![Chunk { beg: 0, end: 90 }]);
    }

    #[test]
    fn window_offset_zero_survives_later_records() {
        // both records share the first 16 KiB window; the second must not
        // displace the genuine offset-0 lower bound
        let mut b = IndexBuilder::tabix();
        let tid = b.tid_for("20");
        b.add(tid, 10, 11, VirtualOffset::from_raw(0), VirtualOffset::from_raw(40))
            .unwrap();
        b.add(tid, 5000, 5001, VirtualOffset::from_raw(40), VirtualOffset::from_raw(80))
            .unwrap();
        let idx = b.finish();
        let chunks = idx.query(tid, 4000, 6000);
        assert_eq!(chunks, vec![Chunk { beg: 0, end: 80 }]);
    }

    #[test]
    fn unsorted_input_is_rejected() {
        let mut b = IndexBuilder::tabix();
        let tid = b.tid_for("20");
        b.add(tid, 500, 501, VirtualOffset::from_raw(0), VirtualOffset::from_raw(10))
            .unwrap();
        assert!(b
            .add(tid, 100, 101, VirtualOffset::from_raw(10), VirtualOffset::from_raw(20))
            .is_err());
    }

    #[test]
    fn query_filters_by_reference_and_window() {
        let mut b = IndexBuilder::tabix();
        let t20 = b.tid_for("20");
        let t21 = b.tid_for("21");
        b.add(t20, 14369, 14370, VirtualOffset::from_raw(100), VirtualOffset::from_raw(200))
            .unwrap();
        b.add(t21, 9, 10, VirtualOffset::from_raw(200), VirtualOffset::from_raw(300))
            .unwrap();
        let idx = b.finish();
        assert_eq!(idx.tid("21"), Some(1));
        assert!(idx.query(t20, 14000, 15000).len() == 1);
        assert!(idx.query(t20, 20000, 30000).is_empty() || idx.query(t20, 20000, 30000)[0].end <= 200);
        assert_eq!(idx.query(t21, 0, 100).len(), 1);
        assert!(idx.query(5, 0, 100).is_empty());
    }

    #[test]
    fn tabix_layout_round_trips() {
        let mut b = IndexBuilder::tabix();
        let tid = b.tid_for("20");
        b.add(tid, 17329, 17330, VirtualOffset::from_raw(1000), VirtualOffset::from_raw(2000))
            .unwrap();
        let idx = b.finish();
        let bytes = idx.to_file_bytes(IndexKind::Tbi).unwrap();
        assert!(bgzf::is_bgzf(&bytes));

        let mut reader = bgzf::Reader::new(std::io::Cursor::new(bytes), 1, None, false);
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload).unwrap();
        assert_eq!(&payload[..4], b"TBI\x01");

        let back = Index::from_bytes(&payload).unwrap();
        assert_eq!(back.names(), &["20".to_string()]);
        assert_eq!(back.config(), Some(&VCF_CONFIG));
        assert_eq!(back.query(0, 17000, 18000), idx.query(0, 17000, 18000));
    }

    #[test]
    fn generic_layout_round_trips_without_linear_index() {
        let mut b = IndexBuilder::new(14, 5, None);
        let tid = b.tid_for("20");
        b.add(tid, 17329, 17330, VirtualOffset::from_raw(1000), VirtualOffset::from_raw(2000))
            .unwrap();
        let idx = b.finish();
        let bytes = idx.to_file_bytes(IndexKind::Csi).unwrap();

        let mut reader = bgzf::Reader::new(std::io::Cursor::new(bytes), 1, None, false);
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload).unwrap();
        assert_eq!(&payload[..4], b"CSI\x01");

        let back = Index::from_bytes(&payload).unwrap();
        assert!(back.names().is_empty());
        assert_eq!(back.min_shift(), 14);
        assert_eq!(back.query(0, 17000, 18000), idx.query(0, 17000, 18000));
    }

    #[test]
    fn oversized_coordinates_refuse_the_tabix_layout() {
        let mut b = IndexBuilder::tabix();
        let tid = b.tid_for("huge");
        b.add(
            tid,
            (1 << 30) as i64,
            (1 << 30) as i64 + 1,
            VirtualOffset::from_raw(0),
            VirtualOffset::from_raw(10),
        )
        .unwrap();
        assert!(!b.fits_tabix());
        let idx = b.finish();
        assert!(idx.to_file_bytes(IndexKind::Tbi).is_err());
        assert!(idx.to_file_bytes(IndexKind::Csi).is_ok());
    }
}
