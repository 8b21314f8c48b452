//! The file-level orchestrator tying detection, headers, records, the block
//! codec, and the region indexes together.
//!
//! A [`VariantFile`] is opened in one of four modes: `"r"` reads any
//! supported flavor (sniffed from content, never from the file name), `"w"`
//! writes plain text, `"wz"` writes block-compressed text, and `"wb"` writes
//! block-compressed binary. Each open handle owns its worker pool; nothing
//! ever runs on the global one.

use crate::bgzf::{self, VirtualOffset};
use crate::detect::{self, Compression, DataFormat, FileSignature};
use crate::error::{Error, Result};
use crate::header::{Header, Version};
use crate::index::{Chunk, Index, IndexBuilder, IndexKind, TBI_DEPTH, TBI_MIN_SHIFT, VCF_CONFIG};
use crate::record::Record;
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    WriteText,
    WriteTextBgzf,
    WriteBcf,
}

impl Mode {
    fn parse(mode: &str) -> Result<Mode> {
        match mode {
            "r" => Ok(Mode::Read),
            "w" => Ok(Mode::WriteText),
            "wz" => Ok(Mode::WriteTextBgzf),
            "wb" => Ok(Mode::WriteBcf),
            other => Err(Error::config(format!(
                "unknown open mode '{other}': expected 'r', 'w', 'wz', or 'wb'"
            ))),
        }
    }

    fn signature(&self) -> FileSignature {
        let (format, compression) = match self {
            Mode::Read | Mode::WriteText => (DataFormat::Vcf, Compression::None),
            Mode::WriteTextBgzf => (DataFormat::Vcf, Compression::Bgzf),
            Mode::WriteBcf => (DataFormat::Bcf, Compression::Bgzf),
        };
        FileSignature {
            category: detect::Category::Variants,
            format,
            compression,
        }
    }
}

enum Input {
    PlainText(BufReader<File>),
    BgzfText(bgzf::Reader<File>),
    PlainBcf(BufReader<File>),
    BgzfBcf(bgzf::Reader<File>),
}

enum Output {
    Text(BufWriter<File>),
    TextBgzf(bgzf::Writer<File>),
    Bcf(bgzf::Writer<File>),
}

/// Recovers a typed error smuggled through an `io::Error` by the block
/// reader's `BufRead` implementation.
fn unwrap_io(e: io::Error) -> Error {
    match e.downcast::<Error>() {
        Ok(inner) => inner,
        Err(e) => Error::Io(e),
    }
}

/// Builder-style open configuration. Option conflicts are reported before
/// any byte of the target is touched.
#[derive(Default)]
pub struct OpenOptions {
    threads: usize,
    index_filename: Option<PathBuf>,
    ignore_truncation: bool,
    header: Option<Header>,
}

impl OpenOptions {
    pub fn new() -> Self {
        OpenOptions {
            threads: 1,
            ..Default::default()
        }
    }

    /// Worker threads for block (de)compression. `1` stays sequential.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Explicit index path, overriding the conventional sibling names.
    pub fn index_filename(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_filename = Some(path.into());
        self
    }

    /// Tolerate a compressed stream that ends without its terminator block.
    /// Incompatible with a multi-threaded reader.
    pub fn ignore_truncation(mut self, yes: bool) -> Self {
        self.ignore_truncation = yes;
        self
    }

    /// Header to write. Ignored in read mode; write modes default to a
    /// fresh empty header.
    pub fn header(mut self, header: Header) -> Self {
        self.header = Some(header);
        self
    }

    pub fn open(self, path: impl AsRef<Path>, mode: &str) -> Result<VariantFile> {
        let path = path.as_ref();
        let mode = Mode::parse(mode)?;
        if self.threads == 0 {
            return Err(Error::config("threads must be at least 1"));
        }
        if self.threads > 1 && self.ignore_truncation {
            return Err(Error::config(
                "a multi-threaded reader cannot ignore stream truncation",
            ));
        }
        let pool = if self.threads > 1 {
            Some(Arc::new(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.threads)
                    .build()
                    .map_err(|e| Error::config(format!("cannot build worker pool: {e}")))?,
            ))
        } else {
            None
        };
        match mode {
            Mode::Read => VariantFile::open_read(path, self, pool),
            _ => VariantFile::open_write(path, mode, self, pool),
        }
    }
}

/// An open variant data file.
pub struct VariantFile {
    path: PathBuf,
    mode: Mode,
    signature: FileSignature,
    header: Arc<Header>,
    input: Option<Input>,
    output: Option<Output>,
    index: Option<Index>,
    index_filename: Option<PathBuf>,
    pool: Option<Arc<rayon::ThreadPool>>,
    header_written: bool,
    closed: bool,
}

impl VariantFile {
    /// Opens with default options. See [`OpenOptions`] for the knobs.
    pub fn open(path: impl AsRef<Path>, mode: &str) -> Result<VariantFile> {
        OpenOptions::new().open(path, mode)
    }

    pub fn options() -> OpenOptions {
        OpenOptions::new()
    }

    fn open_read(
        path: &Path,
        options: OpenOptions,
        pool: Option<Arc<rayon::ThreadPool>>,
    ) -> Result<VariantFile> {
        let signature = detect::sniff_path(path)?;
        let file = File::open(path)?;
        let workers = options.threads.max(1);

        let (input, header) = match (signature.format, signature.compression) {
            (DataFormat::Vcf, Compression::None) => {
                let mut reader = BufReader::new(file);
                let text = read_header_text(&mut reader)?;
                let header = parse_header(path, &text)?;
                (Input::PlainText(reader), header)
            }
            (DataFormat::Vcf, Compression::Bgzf) => {
                let mut reader =
                    bgzf::Reader::new(file, workers, pool.clone(), options.ignore_truncation);
                let text = read_header_text(&mut reader)?;
                let header = parse_header(path, &text)?;
                (Input::BgzfText(reader), header)
            }
            (DataFormat::Bcf, Compression::Bgzf) => {
                let mut reader =
                    bgzf::Reader::new(file, workers, pool.clone(), options.ignore_truncation);
                let header = Header::from_bcf_stream(&mut reader)?;
                (Input::BgzfBcf(reader), header)
            }
            (DataFormat::Bcf, Compression::None) => {
                let mut reader = BufReader::new(file);
                let header = Header::from_bcf_stream(&mut reader)?;
                (Input::PlainBcf(reader), header)
            }
        };
        let mut header = header;
        header.freeze();

        Ok(VariantFile {
            path: path.to_path_buf(),
            mode: Mode::Read,
            signature,
            header: Arc::new(header),
            input: Some(input),
            output: None,
            index: None,
            index_filename: options.index_filename,
            pool,
            header_written: false,
            closed: false,
        })
    }

    fn open_write(
        path: &Path,
        mode: Mode,
        options: OpenOptions,
        pool: Option<Arc<rayon::ThreadPool>>,
    ) -> Result<VariantFile> {
        let file = File::create(path)?;
        let workers = options.threads.max(1);
        let output = match mode {
            Mode::WriteText => Output::Text(BufWriter::new(file)),
            Mode::WriteTextBgzf => Output::TextBgzf(bgzf::Writer::new(file, workers, pool.clone())),
            Mode::WriteBcf => Output::Bcf(bgzf::Writer::new(file, workers, pool.clone())),
            Mode::Read => unreachable!("write path never sees read mode"),
        };
        Ok(VariantFile {
            path: path.to_path_buf(),
            mode,
            signature: mode.signature(),
            header: Arc::new(options.header.unwrap_or_default()),
            input: None,
            output: Some(output),
            index: None,
            index_filename: None,
            pool,
            header_written: false,
            closed: false,
        })
    }

    // --- introspection ---

    pub fn header(&self) -> &Arc<Header> {
        &self.header
    }

    /// Mutable header access, available on a writer until the first record
    /// write freezes it.
    pub fn header_mut(&mut self) -> Result<&mut Header> {
        if self.header.is_frozen() {
            return Err(Error::state(
                "header is frozen: it was already bound to an open file",
            ));
        }
        Arc::get_mut(&mut self.header)
            .ok_or_else(|| Error::state("header is shared and can no longer be edited"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn category(&self) -> &'static str {
        self.signature.category.as_str()
    }

    pub fn format(&self) -> &'static str {
        self.signature.format.as_str()
    }

    pub fn compression(&self) -> &'static str {
        self.signature.compression.as_str()
    }

    pub fn version(&self) -> Version {
        self.header.version()
    }

    pub fn description(&self) -> String {
        self.signature.describe(self.header.version())
    }

    pub fn is_read(&self) -> bool {
        self.mode == Mode::Read
    }

    pub fn is_write(&self) -> bool {
        self.mode != Mode::Read
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    // --- reading ---

    /// Sequential iterator over all records.
    pub fn records(&mut self) -> Records<'_> {
        Records {
            file: self,
            done: false,
        }
    }

    /// Alias for a full sequential scan; works without any index.
    pub fn fetch_all(&mut self) -> Records<'_> {
        self.records()
    }

    /// Region query via the on-disk index: records overlapping `[beg, end)`
    /// on `contig`, 0-based half-open. Requires a block-compressed source
    /// with a discoverable index.
    pub fn fetch(&mut self, contig: &str, beg: i64, end: i64) -> Result<Fetch<'_>> {
        if self.mode != Mode::Read {
            return Err(Error::state("region queries require read mode"));
        }
        if self.closed {
            return Err(Error::state("file is closed"));
        }
        if self.signature.compression != Compression::Bgzf {
            return Err(Error::format(
                "region queries require a block-compressed source",
            ));
        }
        self.load_index()?;
        let index = self.index.as_ref().unwrap();
        let tid = if !index.names().is_empty() {
            index.tid(contig)
        } else {
            self.header.contig_id(contig)
        };
        let tid = tid.ok_or_else(|| Error::SchemaLookup {
            kind: "contig",
            name: contig.to_string(),
        })?;
        let scheme_max = 1i64 << (index.min_shift() + 3 * index.depth());
        let beg = beg.max(0);
        let end = end.min(scheme_max);
        // a window at or past the scheme ceiling holds nothing addressable
        let chunks: VecDeque<Chunk> = if beg < end {
            index.query(tid, beg, end).into()
        } else {
            VecDeque::new()
        };
        Ok(Fetch {
            file: self,
            chunks,
            in_chunk: false,
            current_end: 0,
            contig: contig.to_string(),
            beg,
            end,
            done: false,
        })
    }

    /// Every record on `contig`.
    pub fn fetch_contig(&mut self, contig: &str) -> Result<Fetch<'_>> {
        self.fetch(contig, 0, i64::MAX >> 4)
    }

    /// True when an index file exists for this source.
    pub fn has_index(&self) -> bool {
        self.index.is_some() || self.find_index_path().is_some()
    }

    fn find_index_path(&self) -> Option<PathBuf> {
        if let Some(p) = &self.index_filename {
            return p.exists().then(|| p.clone());
        }
        for ext in [".tbi", ".csi"] {
            let p = sibling_path(&self.path, ext);
            if p.exists() {
                return Some(p);
            }
        }
        None
    }

    fn load_index(&mut self) -> Result<()> {
        if self.index.is_some() {
            return Ok(());
        }
        let path = self.find_index_path().ok_or_else(|| Error::NotFound {
            path: sibling_path(&self.path, ".tbi"),
        })?;
        self.index = Some(Index::load(&path)?);
        Ok(())
    }

    /// Virtual offset of the read cursor. Zero for uncompressed sources.
    fn voff(&self) -> VirtualOffset {
        match &self.input {
            Some(Input::BgzfText(r)) | Some(Input::BgzfBcf(r)) => r.virtual_offset(),
            _ => VirtualOffset::from_raw(0),
        }
    }

    fn seek_voff(&mut self, voff: VirtualOffset) -> Result<()> {
        match self.input.as_mut() {
            Some(Input::BgzfText(r)) => r.seek_virtual(voff),
            Some(Input::BgzfBcf(r)) => r.seek_virtual(voff),
            _ => Err(Error::state(
                "virtual seek requires a block-compressed source",
            )),
        }
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        if self.closed {
            return Err(Error::state("file is closed"));
        }
        if self.mode != Mode::Read {
            return Err(Error::state("file is open for writing"));
        }
        let header = Arc::clone(&self.header);
        let input = self
            .input
            .as_mut()
            .ok_or_else(|| Error::state("file is not open for reading"))?;
        match input {
            Input::PlainText(r) => next_text_record(r, header),
            Input::BgzfText(r) => next_text_record(r, header),
            Input::PlainBcf(r) => next_bcf_record(r, header),
            Input::BgzfBcf(r) => next_bcf_record(r, header),
        }
    }

    // --- writing ---

    /// Writes one record. The first write freezes the header and emits it
    /// ahead of the record.
    pub fn write(&mut self, record: &mut Record) -> Result<()> {
        if self.closed {
            return Err(Error::state("file is closed"));
        }
        if self.mode == Mode::Read {
            return Err(Error::state("file is open for reading"));
        }
        self.write_header_once()?;
        let payload = match self.mode {
            Mode::WriteText | Mode::WriteTextBgzf => {
                let mut line = record.to_vcf_line()?;
                line.push('\n');
                line.into_bytes()
            }
            Mode::WriteBcf => {
                let mut bytes = Vec::new();
                record.to_bcf_bytes(&self.header, &mut bytes)?;
                bytes
            }
            Mode::Read => unreachable!("checked above"),
        };
        match self.output.as_mut() {
            Some(Output::Text(w)) => w.write_all(&payload)?,
            Some(Output::TextBgzf(w)) | Some(Output::Bcf(w)) => w.write_all(&payload)?,
            None => return Err(Error::state("file is not open for writing")),
        }
        Ok(())
    }

    fn write_header_once(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        if let Some(h) = Arc::get_mut(&mut self.header) {
            h.freeze();
        }
        match self.output.as_mut() {
            Some(Output::Text(w)) => w.write_all(self.header.to_text().as_bytes())?,
            Some(Output::TextBgzf(w)) => w.write_all(self.header.to_text().as_bytes())?,
            Some(Output::Bcf(w)) => self.header.write_bcf_stream(w)?,
            None => return Err(Error::state("file is not open for writing")),
        }
        self.header_written = true;
        Ok(())
    }

    /// Flushes pending output, terminates compressed streams, and tears the
    /// worker pool down. A writer that never saw a record still gets its
    /// header, so header-only files are valid output.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.mode != Mode::Read {
            self.write_header_once()?;
        }
        if let Some(output) = self.output.as_mut() {
            match output {
                Output::Text(w) => w.flush()?,
                Output::TextBgzf(w) | Output::Bcf(w) => w.finish()?,
            }
        }
        self.output = None;
        self.input = None;
        self.pool = None;
        self.closed = true;
        Ok(())
    }
}

impl Drop for VariantFile {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn sibling_path(path: &Path, ext: &str) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_os_string();
    os.push(ext);
    PathBuf::from(os)
}

/// Consumes every leading `#` line, leaving the cursor at the first data
/// line.
fn read_header_text<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut text = String::new();
    loop {
        let buf = reader.fill_buf().map_err(unwrap_io)?;
        if buf.is_empty() || buf[0] != b'#' {
            break;
        }
        let mut line = String::new();
        reader.read_line(&mut line).map_err(unwrap_io)?;
        text.push_str(&line);
    }
    Ok(text)
}

fn parse_header(path: &Path, text: &str) -> Result<Header> {
    Header::from_text(text).map_err(|e| match e {
        Error::Format { msg } => Error::format(format!("{}: {msg}", path.display())),
        other => other,
    })
}

fn next_text_record<R: BufRead>(reader: &mut R, header: Arc<Header>) -> Result<Option<Record>> {
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).map_err(unwrap_io)?;
        if n == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        if line.is_empty() {
            continue;
        }
        return Ok(Some(Record::from_text_line(header, line)));
    }
}

fn next_bcf_record<R: Read>(reader: &mut R, header: Arc<Header>) -> Result<Option<Record>> {
    let l_shared = match reader.read_u32::<LittleEndian>() {
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(unwrap_io(e)),
        Ok(v) => v,
    };
    let l_indiv = reader.read_u32::<LittleEndian>().map_err(unwrap_io)?;
    let mut shared = vec![0u8; l_shared as usize];
    reader.read_exact(&mut shared).map_err(unwrap_io)?;
    let mut indiv = vec![0u8; l_indiv as usize];
    reader.read_exact(&mut indiv).map_err(unwrap_io)?;
    Ok(Some(Record::from_bcf_parts(header, shared, indiv)))
}

/// Sequential record iterator.
pub struct Records<'a> {
    file: &'a mut VariantFile,
    done: bool,
}

impl Iterator for Records<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.file.next_record() {
            Ok(Some(rec)) => Some(Ok(rec)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Region query iterator: walks the index's candidate chunks and re-checks
/// every record's real span against the query.
pub struct Fetch<'a> {
    file: &'a mut VariantFile,
    chunks: VecDeque<Chunk>,
    in_chunk: bool,
    current_end: u64,
    contig: String,
    beg: i64,
    end: i64,
    done: bool,
}

impl Iterator for Fetch<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if !self.in_chunk {
                let Some(chunk) = self.chunks.pop_front() else {
                    self.done = true;
                    return None;
                };
                if let Err(e) = self.file.seek_voff(VirtualOffset::from_raw(chunk.beg)) {
                    self.done = true;
                    return Some(Err(e));
                }
                self.current_end = chunk.end;
                self.in_chunk = true;
            }
            if self.file.voff().as_raw() >= self.current_end {
                self.in_chunk = false;
                continue;
            }
            let mut rec = match self.file.next_record() {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Ok(None) => {
                    self.in_chunk = false;
                    continue;
                }
                Ok(Some(rec)) => rec,
            };
            let span = (|| Ok::<_, Error>((rec.chrom()?, rec.start()?, rec.end()?)))();
            match span {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Ok((chrom, start, rec_end)) => {
                    if chrom != self.contig {
                        continue;
                    }
                    if start >= self.end {
                        // input is coordinate-sorted, nothing further overlaps
                        self.done = true;
                        return None;
                    }
                    if rec_end <= self.beg {
                        continue;
                    }
                    return Some(Ok(rec));
                }
            }
        }
    }
}

/// Builds a region index for an existing block-compressed file in one
/// sequential pass, writing `<path>.tbi` or `<path>.csi` next to it.
///
/// Text sources get the tabix layout unless their coordinates overflow it,
/// in which case the generic layout is written with enough hierarchy depth
/// to address them; binary sources always get the generic layout. Returns
/// the path written.
pub fn build_index(path: impl AsRef<Path>, kind: IndexKind) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut file = VariantFile::open(path, "r")?;
    if file.compression() != "BGZF" {
        return Err(Error::format(format!(
            "{}: only block-compressed files can be indexed",
            path.display()
        )));
    }
    let is_binary = file.format() == "BCF";

    // gather the spans first: the binning depth has to fit the largest
    // coordinate before any record is hashed to a bin
    let mut entries: Vec<(String, i64, i64, VirtualOffset, VirtualOffset)> = Vec::new();
    let mut max_end = 0i64;
    loop {
        let voff_beg = file.voff();
        let Some(mut rec) = file.next_record()? else {
            break;
        };
        let voff_end = file.voff();
        let chrom = rec.chrom()?;
        let beg = rec.start()?;
        let end = rec.end()?;
        max_end = max_end.max(end);
        entries.push((chrom, beg, end, voff_beg, voff_end));
    }
    let mut depth = TBI_DEPTH;
    while max_end > 1i64 << (TBI_MIN_SHIFT + 3 * depth) {
        depth += 1;
    }

    let mut builder = if !is_binary && depth == TBI_DEPTH {
        IndexBuilder::tabix()
    } else {
        IndexBuilder::new(
            TBI_MIN_SHIFT,
            depth,
            (!is_binary).then_some(VCF_CONFIG),
        )
    };
    if is_binary {
        // reference ids must match the header's contig table
        for contig in file.header().contigs() {
            builder.declare_reference(&contig.name);
        }
    }
    for (chrom, beg, end, voff_beg, voff_end) in entries {
        let tid = builder.tid_for(&chrom);
        builder.add(tid, beg, end, voff_beg, voff_end)?;
    }

    let kind = if is_binary || depth != TBI_DEPTH || (kind == IndexKind::Tbi && !builder.fits_tabix())
    {
        IndexKind::Csi
    } else {
        kind
    };
    let index = builder.finish();
    let out = match kind {
        IndexKind::Tbi => sibling_path(path, ".tbi"),
        IndexKind::Csi => sibling_path(path, ".csi"),
    };
    index.save(&out, kind)?;
    Ok(out)
}
