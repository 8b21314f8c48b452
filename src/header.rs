//! Header model: file version, contig dictionary, FILTER/INFO/FORMAT schema
//! records, and the ordered sample list.
//!
//! A header parsed from a file is immutable; one built for writing accepts
//! `add_*` calls until the first record write freezes it. Schema records keep
//! the raw line they were parsed from, so serialization round-trips line
//! content exactly (line order is not promised, only content plus the final
//! `#CHROM` column line).

use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::{Read, Write};

/// File format version from the `##fileformat=VCFv<major>.<minor>` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Default for Version {
    fn default() -> Self {
        Version { major: 4, minor: 2 }
    }
}

/// Declared value count of an INFO/FORMAT field relative to the record's
/// allele and genotype counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Number {
    /// Fixed count
    Count(usize),
    /// One value per alternate allele (`A`)
    AltAlleles,
    /// One value per allele, reference included (`R`)
    Alleles,
    /// One value per genotype (`G`)
    Genotypes,
    /// Variable (`.`)
    Unknown,
}

impl Number {
    pub(crate) fn parse(s: &str) -> Result<Number> {
        match s {
            "A" => Ok(Number::AltAlleles),
            "R" => Ok(Number::Alleles),
            "G" => Ok(Number::Genotypes),
            "." => Ok(Number::Unknown),
            n => n
                .parse::<usize>()
                .map(Number::Count)
                .map_err(|_| Error::format(format!("bad Number value '{n}' in header line"))),
        }
    }
}

/// Declared value type of an INFO/FORMAT field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Integer,
    Float,
    Flag,
    Character,
    String,
}

impl ValueType {
    pub(crate) fn parse(s: &str) -> Result<ValueType> {
        match s {
            "Integer" => Ok(ValueType::Integer),
            "Float" => Ok(ValueType::Float),
            "Flag" => Ok(ValueType::Flag),
            "Character" => Ok(ValueType::Character),
            "String" => Ok(ValueType::String),
            t => Err(Error::format(format!("bad Type value '{t}' in header line"))),
        }
    }
}

/// One `##`-prefixed header line, as a closed tagged set. Every variant keeps
/// the raw line (without trailing newline) it was parsed from or synthesized
/// as, which is what serialization emits.
#[derive(Debug, Clone)]
pub enum HeaderRecord {
    Filter {
        id: String,
        description: String,
        raw: String,
    },
    Info {
        id: String,
        number: Number,
        kind: ValueType,
        description: String,
        raw: String,
    },
    Format {
        id: String,
        number: Number,
        kind: ValueType,
        description: String,
        raw: String,
    },
    Contig {
        id: String,
        length: Option<u64>,
        raw: String,
    },
    Generic {
        key: String,
        value: String,
        raw: String,
    },
}

impl HeaderRecord {
    /// The raw `##...` line this record serializes to.
    pub fn raw(&self) -> &str {
        match self {
            HeaderRecord::Filter { raw, .. }
            | HeaderRecord::Info { raw, .. }
            | HeaderRecord::Format { raw, .. }
            | HeaderRecord::Contig { raw, .. }
            | HeaderRecord::Generic { raw, .. } => raw,
        }
    }
}

/// Attributes shared by INFO and FORMAT dictionary entries.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub number: Number,
    pub kind: ValueType,
    /// Offset into the shared FILTER/INFO/FORMAT string dictionary.
    pub dict_offset: usize,
}

/// A contig declaration, in declaration order. The position in the contig
/// table is the contig id used by the binary encoding and the region index.
#[derive(Debug, Clone)]
pub struct Contig {
    pub name: String,
    pub length: Option<u64>,
}

/// Parsed and indexed header.
#[derive(Debug, Clone)]
pub struct Header {
    version: Version,
    records: Vec<HeaderRecord>,
    contigs: Vec<Contig>,
    contig_index: HashMap<String, usize>,
    /// Shared FILTER/INFO/FORMAT string dictionary; `PASS` is implicit at 0.
    dict: Vec<String>,
    dict_index: HashMap<String, usize>,
    filters: HashMap<String, usize>,
    infos: HashMap<String, FieldDef>,
    formats: HashMap<String, FieldDef>,
    samples: Vec<String>,
    sample_index: HashMap<String, usize>,
    frozen: bool,
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

impl Header {
    /// Fresh mutable header with only the implicit `PASS` filter and a
    /// default `##fileformat` line.
    pub fn new() -> Self {
        let version = Version::default();
        let raw = format!("##fileformat=VCFv{}.{}", version.major, version.minor);
        let mut h = Header {
            version,
            records: vec![HeaderRecord::Generic {
                key: "fileformat".into(),
                value: format!("VCFv{}.{}", version.major, version.minor),
                raw,
            }],
            contigs: Vec::new(),
            contig_index: HashMap::new(),
            dict: Vec::new(),
            dict_index: HashMap::new(),
            filters: HashMap::new(),
            infos: HashMap::new(),
            formats: HashMap::new(),
            samples: Vec::new(),
            sample_index: HashMap::new(),
            frozen: false,
        };
        h.intern("PASS");
        h.filters.insert("PASS".into(), 0);
        h
    }

    /// Parses the full header text: every `##` line plus the `#CHROM` column
    /// line. Used for both text files and the binary header blob.
    pub fn from_text(text: &str) -> Result<Header> {
        let mut header = Header::new();
        header.records.clear();
        let mut saw_fileformat = false;
        let mut saw_column_line = false;

        for line in text.trim_end_matches('\0').lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("#CHROM") {
                header.parse_column_line(rest)?;
                saw_column_line = true;
                continue;
            }
            if !line.starts_with("##") {
                return Err(Error::format(format!(
                    "header line does not start with '##': '{line}'"
                )));
            }
            header.add_line(line)?;
            if line.starts_with("##fileformat=") {
                saw_fileformat = true;
            }
        }
        if !saw_column_line {
            return Err(Error::format(
                "header is missing the '#CHROM...' column line",
            ));
        }
        let _ = saw_fileformat; // tolerated when absent; version stays default
        Ok(header)
    }

    fn parse_column_line(&mut self, rest: &str) -> Result<()> {
        // `rest` is everything after the `#CHROM` token, tab included
        let mut cols = rest.strip_prefix('\t').unwrap_or(rest).split('\t');
        for expected in ["POS", "ID", "REF", "ALT", "QUAL", "FILTER", "INFO"] {
            match cols.next() {
                Some(c) if c == expected => {}
                other => {
                    return Err(Error::format(format!(
                        "bad '#CHROM' line: expected column {expected}, found {other:?}"
                    )))
                }
            }
        }
        match cols.next() {
            None => Ok(()),
            Some("FORMAT") => {
                for sample in cols {
                    self.add_sample(sample)?;
                }
                Ok(())
            }
            Some(other) => Err(Error::format(format!(
                "bad '#CHROM' line: expected FORMAT before sample names, found '{other}'"
            ))),
        }
    }

    /// Parses and adds one raw `##key=value` line. Structured values
    /// (`<ID=...,...>`) become typed schema records, everything else Generic.
    pub fn add_line(&mut self, line: &str) -> Result<()> {
        self.ensure_mutable()?;
        let line = line.trim_end_matches(['\n', '\r']);
        let body = line.strip_prefix("##").ok_or_else(|| {
            Error::format(format!("header line does not start with '##': '{line}'"))
        })?;
        let key = split_unquoted(body, '=')
            .into_iter()
            .next()
            .ok_or_else(|| Error::format(format!("header line has no key: '{line}'")))?;
        let value = &body[key.len().min(body.len())..];
        let value = value.strip_prefix('=').unwrap_or(value);

        if !value.starts_with('<') {
            if key == "fileformat" {
                self.version = parse_fileformat(value)?;
            }
            self.records.push(HeaderRecord::Generic {
                key: key.to_string(),
                value: value.to_string(),
                raw: line.to_string(),
            });
            return Ok(());
        }

        let fields = parse_bracketed(line)?;
        let get = |name: &str| -> Result<&str> {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
                .ok_or_else(|| {
                    Error::format(format!("header {key} line is missing key '{name}': '{line}'"))
                })
        };
        match key {
            "FILTER" => {
                let id = get("ID")?.to_string();
                let description = get("Description").unwrap_or_default().to_string();
                let idx = fields
                    .iter()
                    .find(|(k, _)| k == "IDX")
                    .and_then(|(_, v)| v.parse::<usize>().ok());
                self.register_filter(&id, idx);
                self.records.push(HeaderRecord::Filter {
                    id,
                    description,
                    raw: line.to_string(),
                });
            }
            "INFO" | "FORMAT" => {
                let id = get("ID")?.to_string();
                let number = Number::parse(get("Number")?)?;
                let kind = ValueType::parse(get("Type")?)?;
                let description = get("Description").unwrap_or_default().to_string();
                let idx = fields
                    .iter()
                    .find(|(k, _)| k == "IDX")
                    .and_then(|(_, v)| v.parse::<usize>().ok());
                let dict_offset = self.intern_at(&id, idx);
                let def = FieldDef {
                    number,
                    kind,
                    dict_offset,
                };
                if key == "INFO" {
                    self.infos.insert(id.clone(), def);
                    self.records.push(HeaderRecord::Info {
                        id,
                        number,
                        kind,
                        description,
                        raw: line.to_string(),
                    });
                } else {
                    self.formats.insert(id.clone(), def);
                    self.records.push(HeaderRecord::Format {
                        id,
                        number,
                        kind,
                        description,
                        raw: line.to_string(),
                    });
                }
            }
            "contig" => {
                let id = get("ID")?.to_string();
                let length = fields
                    .iter()
                    .find(|(k, _)| k == "length")
                    .and_then(|(_, v)| v.parse::<u64>().ok());
                self.register_contig(&id, length);
                self.records.push(HeaderRecord::Contig {
                    id,
                    length,
                    raw: line.to_string(),
                });
            }
            _ => {
                self.records.push(HeaderRecord::Generic {
                    key: key.to_string(),
                    value: value.to_string(),
                    raw: line.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Adds an already-built schema record (e.g. copied from another header).
    pub fn add_record(&mut self, record: &HeaderRecord) -> Result<()> {
        self.add_line(record.raw())
    }

    /// Declares a contig. Redeclaration of the same name is a no-op that
    /// keeps the first position.
    pub fn add_contig(&mut self, name: &str, length: Option<u64>) -> Result<()> {
        self.ensure_mutable()?;
        if self.contig_index.contains_key(name) {
            return Ok(());
        }
        let raw = match length {
            Some(len) => format!("##contig=<ID={name},length={len}>"),
            None => format!("##contig=<ID={name}>"),
        };
        self.register_contig(name, length);
        self.records.push(HeaderRecord::Contig {
            id: name.to_string(),
            length,
            raw,
        });
        Ok(())
    }

    /// Appends a sample name. Duplicates are rejected.
    pub fn add_sample(&mut self, name: &str) -> Result<()> {
        self.ensure_mutable()?;
        if name.is_empty() {
            return Err(Error::format("sample name is empty"));
        }
        if self.sample_index.contains_key(name) {
            return Err(Error::format(format!("duplicate sample name '{name}'")));
        }
        self.sample_index
            .insert(name.to_string(), self.samples.len());
        self.samples.push(name.to_string());
        Ok(())
    }

    /// Marks the header immutable. Called by writers at first record write
    /// and by readers right after parsing.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.frozen {
            Err(Error::state(
                "header is frozen: it was already bound to an open file",
            ))
        } else {
            Ok(())
        }
    }

    fn register_contig(&mut self, name: &str, length: Option<u64>) {
        if !self.contig_index.contains_key(name) {
            self.contig_index.insert(name.to_string(), self.contigs.len());
            self.contigs.push(Contig {
                name: name.to_string(),
                length,
            });
        }
    }

    fn register_filter(&mut self, id: &str, idx: Option<usize>) {
        let offset = self.intern_at(id, idx);
        self.filters.insert(id.to_string(), offset);
    }

    fn intern(&mut self, id: &str) -> usize {
        self.intern_at(id, None)
    }

    /// Interns `id` into the shared string dictionary. Identical ids share
    /// one offset across FILTER/INFO/FORMAT; an explicit `IDX=` pins the
    /// position.
    fn intern_at(&mut self, id: &str, idx: Option<usize>) -> usize {
        if let Some(&offset) = self.dict_index.get(id) {
            return offset;
        }
        let offset = match idx {
            Some(i) => {
                if i >= self.dict.len() {
                    self.dict.resize(i + 1, String::new());
                }
                self.dict[i] = id.to_string();
                i
            }
            None => {
                self.dict.push(id.to_string());
                self.dict.len() - 1
            }
        };
        self.dict_index.insert(id.to_string(), offset);
        offset
    }

    // --- lookups ---

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn records(&self) -> &[HeaderRecord] {
        &self.records
    }

    pub fn contigs(&self) -> &[Contig] {
        &self.contigs
    }

    pub fn contig_id(&self, name: &str) -> Option<usize> {
        self.contig_index.get(name).copied()
    }

    pub fn contig_name(&self, tid: usize) -> Option<&str> {
        self.contigs.get(tid).map(|c| c.name.as_str())
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn sample_id(&self, name: &str) -> Option<usize> {
        self.sample_index.get(name).copied()
    }

    pub fn info_def(&self, id: &str) -> Option<&FieldDef> {
        self.infos.get(id)
    }

    pub fn format_def(&self, id: &str) -> Option<&FieldDef> {
        self.formats.get(id)
    }

    pub fn has_filter(&self, id: &str) -> bool {
        self.filters.contains_key(id)
    }

    pub fn filter_offset(&self, id: &str) -> Option<usize> {
        self.filters.get(id).copied()
    }

    /// String at `offset` in the shared dictionary.
    pub fn dict_id(&self, offset: usize) -> Option<&str> {
        self.dict.get(offset).map(|s| s.as_str())
    }

    /// INFO definition by dictionary offset (binary records carry offsets).
    pub fn info_by_offset(&self, offset: usize) -> Option<(&str, &FieldDef)> {
        self.infos
            .iter()
            .find(|(_, d)| d.dict_offset == offset)
            .map(|(k, d)| (k.as_str(), d))
    }

    pub fn format_by_offset(&self, offset: usize) -> Option<(&str, &FieldDef)> {
        self.formats
            .iter()
            .find(|(_, d)| d.dict_offset == offset)
            .map(|(k, d)| (k.as_str(), d))
    }

    // --- serialization ---

    /// All header lines, `#CHROM` line included, newline-terminated.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(record.raw());
            out.push('\n');
        }
        out.push_str("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO");
        if !self.samples.is_empty() {
            out.push_str("\tFORMAT");
            for sample in &self.samples {
                out.push('\t');
                out.push_str(sample);
            }
        }
        out.push('\n');
        out
    }

    /// Reads the binary header: `BCF\2\x??` magic, then a length-prefixed
    /// text blob holding the same lines as the text form.
    pub fn from_bcf_stream<R: Read>(reader: &mut R) -> Result<Header> {
        let mut magic = [0u8; 3];
        reader.read_exact(&mut magic)?;
        if &magic != b"BCF" {
            return Err(Error::format(format!(
                "bad binary magic: expected 'BCF', found {magic:?}"
            )));
        }
        let major = reader.read_u8()?;
        let minor = reader.read_u8()?;
        if major != 2 {
            return Err(Error::format(format!(
                "unsupported binary version {major}.{minor}"
            )));
        }
        let l_text = reader.read_u32::<LittleEndian>()?;
        let mut text = vec![0u8; l_text as usize];
        reader.read_exact(&mut text)?;
        let text = String::from_utf8(text)
            .map_err(|e| Error::format(format!("binary header text is not UTF-8: {e}")))?;
        Header::from_text(&text)
    }

    /// Inverse of [`Header::from_bcf_stream`].
    pub fn write_bcf_stream<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut text = self.to_text().into_bytes();
        text.push(0);
        writer.write_all(b"BCF")?;
        writer.write_u8(2)?;
        writer.write_u8(2)?;
        writer.write_u32::<LittleEndian>(text.len() as u32)?;
        writer.write_all(&text)?;
        Ok(())
    }
}

fn parse_fileformat(value: &str) -> Result<Version> {
    let rest = value
        .strip_prefix("VCFv")
        .ok_or_else(|| Error::format(format!("bad fileformat value '{value}'")))?;
    let mut it = rest.splitn(2, '.');
    let major = it
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::format(format!("bad fileformat value '{value}'")))?;
    let minor = it
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::format(format!("bad fileformat value '{value}'")))?;
    Ok(Version { major, minor })
}

/// Extracts the `key=value` pairs between the outermost `<` and `>` of a
/// structured header line, quote-aware.
fn parse_bracketed(line: &str) -> Result<Vec<(String, String)>> {
    let l = line
        .find('<')
        .ok_or_else(|| Error::format(format!("'<' not found in header line '{line}'")))?;
    let body = &line[l + 1..];
    let r = body
        .rfind('>')
        .ok_or_else(|| Error::format(format!("'>' not found in header line '{line}'")))?;
    let body = &body[..r];
    let mut out = Vec::new();
    for kv in split_unquoted(body, ',') {
        let kv = kv.trim();
        let mut it = split_unquoted(kv, '=').into_iter();
        let k = it
            .next()
            .ok_or_else(|| Error::format(format!("key not found in '{kv}'")))?;
        let v = it
            .next()
            .ok_or_else(|| Error::format(format!("value not found in '{kv}'")))?
            .trim_matches('"');
        out.push((k.to_string(), v.to_string()));
    }
    Ok(out)
}

/// Splits on `sep`, ignoring separators inside double-quoted sections, so
/// the nested commas of `Description="..., ..."` values stay intact.
fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, ch) in s.char_indices() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if ch == sep && !in_quotes {
            parts.push(&s[start..i]);
            start = i + ch.len_utf8();
        }
    }
    if start < s.len() {
        parts.push(&s[start..]);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER_TEXT: &str = concat!(
        "##fileformat=VCFv4.2\n",
        "##FILTER=<ID=q10,Description=\"Quality below 10\">\n",
        "##contig=<ID=chr1,length=248956422>\n",
        "##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total Depth\">\n",
        "##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele Frequency, per ALT\">\n",
        "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n",
        "##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read Depth\">\n",
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\ts1\ts2\n",
    );

    #[test]
    fn parses_version_contigs_and_samples() {
        let h = Header::from_text(HEADER_TEXT).unwrap();
        assert_eq!(h.version(), Version { major: 4, minor: 2 });
        assert_eq!(h.contigs().len(), 1);
        assert_eq!(h.contig_id("chr1"), Some(0));
        assert_eq!(h.samples(), &["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn standard_column_line_parses_with_and_without_samples() {
        let sites_only = "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";
        let h = Header::from_text(sites_only).unwrap();
        assert!(h.samples().is_empty());

        let misordered = "##fileformat=VCFv4.2\n#CHROM\tID\tPOS\tREF\tALT\tQUAL\tFILTER\tINFO\n";
        assert!(matches!(
            Header::from_text(misordered),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn shared_dictionary_has_implicit_pass_and_deduplicates() {
        let h = Header::from_text(HEADER_TEXT).unwrap();
        assert_eq!(h.dict_id(0), Some("PASS"));
        assert_eq!(h.filter_offset("q10"), Some(1));
        // DP appears as both INFO and FORMAT: one dictionary entry
        let info_dp = h.info_def("DP").unwrap().dict_offset;
        let fmt_dp = h.format_def("DP").unwrap().dict_offset;
        assert_eq!(info_dp, fmt_dp);
    }

    #[test]
    fn quoted_commas_survive() {
        let h = Header::from_text(HEADER_TEXT).unwrap();
        let af = h
            .records()
            .iter()
            .find_map(|r| match r {
                HeaderRecord::Info { id, description, .. } if id == "AF" => Some(description.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(af, "Allele Frequency, per ALT");
    }

    #[test]
    fn serialization_round_trips_line_content() {
        let h = Header::from_text(HEADER_TEXT).unwrap();
        let mut original: Vec<&str> = HEADER_TEXT.lines().collect();
        let text = h.to_text();
        let mut rebuilt: Vec<&str> = text.lines().collect();
        original.sort_unstable();
        rebuilt.sort_unstable();
        assert_eq!(original, rebuilt);
    }

    #[test]
    fn duplicate_sample_is_rejected() {
        let mut h = Header::new();
        h.add_sample("NA00001").unwrap();
        assert!(matches!(
            h.add_sample("NA00001"),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn frozen_header_rejects_mutation() {
        let mut h = Header::new();
        h.freeze();
        assert!(matches!(h.add_sample("s1"), Err(Error::State { .. })));
        assert!(matches!(
            h.add_contig("chr1", None),
            Err(Error::State { .. })
        ));
    }

    #[test]
    fn bcf_blob_round_trip() {
        let h = Header::from_text(HEADER_TEXT).unwrap();
        let mut blob = Vec::new();
        h.write_bcf_stream(&mut blob).unwrap();
        let h2 = Header::from_bcf_stream(&mut blob.as_slice()).unwrap();
        assert_eq!(h2.samples(), h.samples());
        assert_eq!(h2.contigs().len(), 1);
        assert_eq!(h2.filter_offset("q10"), Some(1));
    }

    #[test]
    fn missing_column_line_is_a_format_error() {
        assert!(matches!(
            Header::from_text("##fileformat=VCFv4.2\n"),
            Err(Error::Format { .. })
        ));
    }
}
