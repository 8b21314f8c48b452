//! BGZF block codec.
//!
//! BGZF stores data as a series of independently-deflated gzip members, each
//! carrying its own compressed size in a `BC` extra subfield so a reader can
//! hop block-to-block without inflating skipped payloads. Any byte of the
//! decompressed stream is addressable by a [`VirtualOffset`]: the file offset
//! of its block paired with the offset inside that block's decompressed data.
//! A fixed 28-byte empty block terminates a well-formed stream.
//!
//! [`Reader`] inflates several blocks at a time, in parallel when given a
//! worker pool, and reassembles them strictly in sequence order. [`Writer`]
//! does the mirror image for compression. Neither touches the global rayon
//! pool; the pool is owned by the file handle that created it.

use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use flate2::bufread::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use rayon::prelude::*;
use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

/// Target uncompressed payload per block. The format caps payloads at 64 KiB;
/// 0xff00 leaves headroom so the compressed member size fits its u16 field.
pub const BLOCK_SIZE: usize = 0xff00;

/// Number of blocks batched per parallel (de)compression round when no
/// explicit worker count is given.
pub const DEFAULT_BATCH: usize = 8;

/// The reserved empty block that marks end-of-stream.
pub const EOF_BLOCK: [u8; 28] = [
    31, 139, 8, 4, 0, 0, 0, 0, 0, 255, // gzip header
    6, 0, 66, 67, 2, 0, 27, 0, // extra field: BC subfield, BSIZE=27
    3, 0, // empty deflate stream
    0, 0, 0, 0, // CRC32
    0, 0, 0, 0, // ISIZE
];

/// Returns true if `prefix` starts with a BGZF block header (gzip magic with
/// the FEXTRA flag and a `BC` subfield). Needs at least 16 bytes to decide.
pub fn is_bgzf(prefix: &[u8]) -> bool {
    prefix.len() >= 16
        && prefix[0] == 31
        && prefix[1] == 139
        && prefix[2] == 8
        && (prefix[3] & 4) != 0
        && prefix[12] == b'B'
        && prefix[13] == b'C'
}

/// A random-access cursor into a BGZF stream: the compressed file offset of a
/// block in the upper 48 bits, the offset within its decompressed payload in
/// the lower 16.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    pub fn new(coffset: u64, uoffset: u16) -> Self {
        VirtualOffset((coffset << 16) | uoffset as u64)
    }

    pub fn from_raw(raw: u64) -> Self {
        VirtualOffset(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }

    /// Compressed offset of the containing block.
    pub fn coffset(&self) -> u64 {
        self.0 >> 16
    }

    /// Offset within the block's decompressed payload.
    pub fn uoffset(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

impl std::fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.coffset(), self.uoffset())
    }
}

/// One in-flight block: compressed payload plus its inflated counterpart.
#[derive(Default, Clone)]
struct BlockBuf {
    compressed: Vec<u8>,
    data: Vec<u8>,
    coffset: u64,
    block_size: u32,
}

fn bad_header(key: &'static str, expected: usize, found: usize) -> Error {
    Error::format(format!(
        "bad BGZF block header: field {key} expected {expected}, found {found}"
    ))
}

/// BGZF reader with bounded block readahead.
///
/// Up to `workers` blocks are read from the source, then inflated as one
/// batch; with a pool the batch inflates in parallel, and output order is
/// fixed by each block's position in the batch, never by worker completion
/// time. Implements [`BufRead`] over the decompressed byte stream, so callers
/// can pull lines or binary records straight off it while
/// [`Reader::virtual_offset`] stays exact.
pub struct Reader<R: Read> {
    inner: R,
    blocks: Vec<BlockBuf>,
    nblocks: usize,
    iblock: usize,
    ibyte: usize,
    coffset: u64,
    inner_eof: bool,
    last_block_empty: bool,
    ignore_truncation: bool,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl<R: Read> Reader<R> {
    /// Wraps `inner`, keeping `workers.max(1)` blocks in flight. `pool`
    /// enables parallel inflation; `None` inflates sequentially.
    ///
    /// `ignore_truncation` tolerates a stream that ends without the empty
    /// terminal block. Combining it with a pool is a caller error that
    /// [`crate::VariantFile`] rejects before construction.
    pub fn new(
        inner: R,
        workers: usize,
        pool: Option<Arc<rayon::ThreadPool>>,
        ignore_truncation: bool,
    ) -> Self {
        let n = workers.max(1);
        Self {
            inner,
            blocks: vec![BlockBuf::default(); n],
            nblocks: 0,
            iblock: 0,
            ibyte: 0,
            coffset: 0,
            inner_eof: false,
            last_block_empty: false,
            ignore_truncation,
            pool,
        }
    }

    /// Virtual offset of the next byte [`Read::read`] would return.
    pub fn virtual_offset(&self) -> VirtualOffset {
        if self.iblock < self.nblocks {
            VirtualOffset::new(self.blocks[self.iblock].coffset, self.ibyte as u16)
        } else {
            VirtualOffset::new(self.coffset, 0)
        }
    }

    /// Reads one block header + compressed payload into the next buffer slot.
    /// Sets `inner_eof` when the source is exhausted.
    fn read_single_block(&mut self) -> Result<()> {
        let this_offset = if self.nblocks == 0 {
            self.coffset
        } else {
            let prev = &self.blocks[self.nblocks - 1];
            prev.coffset + prev.block_size as u64
        };

        let id1 = match self.inner.read_u8() {
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.inner_eof = true;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
            Ok(id1) => id1,
        };
        if id1 != 31 {
            return Err(bad_header("id1", 31, id1 as usize));
        }
        let id2 = self.inner.read_u8()?;
        if id2 != 139 {
            return Err(bad_header("id2", 139, id2 as usize));
        }
        let cm = self.inner.read_u8()?;
        if cm != 8 {
            return Err(bad_header("cm", 8, cm as usize));
        }
        let flg = self.inner.read_u8()?;
        if flg & 4 == 0 {
            return Err(bad_header("flg", 4, flg as usize));
        }
        let _mtime = self.inner.read_u32::<LittleEndian>()?;
        let _xfl = self.inner.read_u8()?;
        let _os = self.inner.read_u8()?;
        let xlen = self.inner.read_u16::<LittleEndian>()?;
        let si1 = self.inner.read_u8()?;
        if si1 != b'B' {
            return Err(bad_header("si1", b'B' as usize, si1 as usize));
        }
        let si2 = self.inner.read_u8()?;
        if si2 != b'C' {
            return Err(bad_header("si2", b'C' as usize, si2 as usize));
        }
        let slen = self.inner.read_u16::<LittleEndian>()?;
        if slen != 2 {
            return Err(bad_header("slen", 2, slen as usize));
        }
        let bsize = self.inner.read_u16::<LittleEndian>()?;

        // compressed payload sits between the extra field and the trailer
        let cdata_sz = (bsize as u32)
            .checked_sub(xlen as u32 + 19)
            .ok_or_else(|| bad_header("bsize", xlen as usize + 19, bsize as usize))?;

        let block = &mut self.blocks[self.nblocks];
        block.compressed.resize(cdata_sz as usize, 0u8);
        self.inner.read_exact(block.compressed.as_mut_slice())?;

        let _crc32 = self.inner.read_u32::<LittleEndian>()?;
        let isize = self.inner.read_u32::<LittleEndian>()?;
        if isize as usize > BLOCK_SIZE + 0x100 {
            return Err(bad_header("isize", BLOCK_SIZE, isize as usize));
        }

        block.data.resize(isize as usize, 0u8);
        block.coffset = this_offset;
        block.block_size = bsize as u32 + 1;
        self.last_block_empty = isize == 0;
        self.nblocks += 1;
        Ok(())
    }

    /// Refills the readahead buffers sequentially, then inflates them.
    fn fill(&mut self) -> Result<()> {
        if self.nblocks > 0 {
            let last = &self.blocks[self.nblocks - 1];
            self.coffset = last.coffset + last.block_size as u64;
        }
        for block in self.blocks.iter_mut() {
            block.compressed.clear();
            block.data.clear();
            block.coffset = 0;
            block.block_size = 0;
        }
        self.nblocks = 0;
        self.iblock = 0;
        self.ibyte = 0;
        for _ in 0..self.blocks.len() {
            self.read_single_block()?;
            if self.inner_eof {
                break;
            }
        }
        self.inflate_all()
    }

    /// Inflates every filled block, reassembled by batch position.
    fn inflate_all(&mut self) -> Result<()> {
        fn inflate_one(block: &mut BlockBuf) -> io::Result<()> {
            if block.data.is_empty() {
                return Ok(());
            }
            let mut deflater = DeflateDecoder::new(block.compressed.as_slice());
            deflater.read_exact(block.data.as_mut_slice())?;
            Ok(())
        }
        let filled = &mut self.blocks[..self.nblocks];
        match &self.pool {
            Some(pool) => pool.install(|| {
                filled
                    .par_iter_mut()
                    .try_for_each(inflate_one)
                    .map_err(Error::from)
            })?,
            None => {
                for block in filled.iter_mut() {
                    inflate_one(block)?;
                }
            }
        }
        Ok(())
    }

    /// Called once the source is exhausted: a stream missing the empty
    /// terminal block is truncated.
    fn check_terminator(&self) -> Result<()> {
        if self.last_block_empty || self.ignore_truncation {
            Ok(())
        } else {
            Err(Error::format(
                "truncated BGZF stream: end-of-file terminator block is missing",
            ))
        }
    }
}

impl<R: Read> BufRead for Reader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        loop {
            if self.iblock < self.nblocks {
                if self.ibyte < self.blocks[self.iblock].data.len() {
                    break;
                }
                self.iblock += 1;
                self.ibyte = 0;
                continue;
            }
            if self.inner_eof {
                self.check_terminator()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                return Ok(&[]);
            }
            self.fill().map_err(|e| match e {
                Error::Io(e) => e,
                other => io::Error::new(io::ErrorKind::InvalidData, other),
            })?;
            if self.nblocks == 0 && self.inner_eof {
                self.check_terminator()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                return Ok(&[]);
            }
        }
        Ok(&self.blocks[self.iblock].data[self.ibyte..])
    }

    fn consume(&mut self, amt: usize) {
        self.ibyte += amt;
    }
}

impl<R: Read> Read for Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let avail = self.fill_buf()?;
        let n = avail.len().min(buf.len());
        buf[..n].copy_from_slice(&avail[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read + Seek> Reader<R> {
    /// Repositions the stream so the next byte read is the one addressed by
    /// `voff`. Drops all buffered blocks and refills from the new position.
    pub fn seek_virtual(&mut self, voff: VirtualOffset) -> Result<()> {
        self.inner.seek(SeekFrom::Start(voff.coffset()))?;
        for block in self.blocks.iter_mut() {
            block.compressed.clear();
            block.data.clear();
            block.coffset = 0;
            block.block_size = 0;
        }
        self.nblocks = 0;
        self.iblock = 0;
        self.ibyte = 0;
        self.coffset = voff.coffset();
        self.inner_eof = false;
        for _ in 0..self.blocks.len() {
            self.read_single_block()?;
            if self.inner_eof {
                break;
            }
        }
        self.inflate_all()?;
        self.ibyte = voff.uoffset() as usize;
        Ok(())
    }
}

/// Serializes one uncompressed payload as a complete BGZF block.
///
/// Payloads that deflate poorly enough to overflow the u16 size field are
/// split in half and emitted as two blocks.
fn compress_block(data: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
    let mut deflate = DeflateEncoder::new(Vec::new(), Compression::default());
    deflate.write_all(data)?;
    let deflated = deflate.finish()?;

    let total = deflated.len() + 26;
    if total > u16::MAX as usize {
        let (lo, hi) = data.split_at(data.len() / 2);
        compress_block(lo, out)?;
        return compress_block(hi, out);
    }

    let crc = crc32fast::hash(data);
    out.push(31); // ID1
    out.push(139); // ID2
    out.push(8); // CM: deflate
    out.push(4); // FLG: FEXTRA
    out.extend_from_slice(&[0, 0, 0, 0]); // MTIME
    out.push(0); // XFL
    out.push(255); // OS: unknown
    out.extend_from_slice(&6u16.to_le_bytes()); // XLEN
    out.push(b'B');
    out.push(b'C');
    out.extend_from_slice(&2u16.to_le_bytes()); // SLEN
    out.extend_from_slice(&((total - 1) as u16).to_le_bytes()); // BSIZE
    out.extend_from_slice(&deflated);
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    Ok(())
}

/// BGZF writer with order-preserving batch compression.
///
/// Input bytes are chunked into `BLOCK_SIZE` payloads; once a batch of
/// payloads accumulates they are compressed — in parallel when a pool was
/// supplied — and written out in their original chunk order. Call
/// [`Writer::finish`] to flush the tail and append the terminal block;
/// dropping without it leaves a truncated stream.
pub struct Writer<W: Write> {
    inner: W,
    pending: Vec<Vec<u8>>,
    current: Vec<u8>,
    batch: usize,
    pool: Option<Arc<rayon::ThreadPool>>,
    finished: bool,
}

impl<W: Write> Writer<W> {
    pub fn new(inner: W, workers: usize, pool: Option<Arc<rayon::ThreadPool>>) -> Self {
        let batch = if pool.is_some() {
            workers.max(2).max(DEFAULT_BATCH)
        } else {
            1
        };
        Self {
            inner,
            pending: Vec::with_capacity(batch),
            current: Vec::with_capacity(BLOCK_SIZE),
            batch,
            pool,
            finished: false,
        }
    }

    /// Compresses and writes everything queued, preserving chunk order.
    fn flush_pending(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let compressed: Vec<Vec<u8>> = match &self.pool {
            Some(pool) => pool.install(|| {
                self.pending
                    .par_iter()
                    .map(|chunk| {
                        let mut out = Vec::with_capacity(chunk.len() / 2 + 64);
                        compress_block(chunk, &mut out)?;
                        Ok(out)
                    })
                    .collect::<io::Result<Vec<_>>>()
            })?,
            None => self
                .pending
                .iter()
                .map(|chunk| {
                    let mut out = Vec::with_capacity(chunk.len() / 2 + 64);
                    compress_block(chunk, &mut out)?;
                    Ok(out)
                })
                .collect::<io::Result<Vec<_>>>()?,
        };
        for block in compressed {
            self.inner.write_all(&block)?;
        }
        self.pending.clear();
        Ok(())
    }

    /// Flushes remaining payloads and writes the end-of-stream block. Safe to
    /// call once; further writes fail.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        if !self.current.is_empty() {
            let chunk = std::mem::take(&mut self.current);
            self.pending.push(chunk);
        }
        self.flush_pending()?;
        self.inner.write_all(&EOF_BLOCK)?;
        self.inner.flush()?;
        self.finished = true;
        Ok(())
    }
}

impl<W: Write> Write for Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write after BGZF stream was finished",
            ));
        }
        let mut remaining = buf;
        while !remaining.is_empty() {
            let space = BLOCK_SIZE - self.current.len();
            let take = remaining.len().min(space);
            self.current.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];
            if self.current.len() == BLOCK_SIZE {
                let chunk = std::mem::replace(&mut self.current, Vec::with_capacity(BLOCK_SIZE));
                self.pending.push(chunk);
                if self.pending.len() >= self.batch {
                    self.flush_pending()?;
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_pending()?;
        self.inner.flush()
    }
}

impl<W: Write> Drop for Writer<W> {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

/// Compresses `data` into a standalone BGZF byte vector, terminator included.
/// Used by the index writers, whose files are themselves BGZF-compressed.
pub fn compress_to_vec(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut w = Writer::new(&mut out, 1, None);
        w.write_all(data)?;
        w.finish()?;
    }
    Ok(out)
}
