//! End-to-end tests over the classic five-record example file: detection,
//! lazy parsing, region queries through both index layouts, cross-format
//! round trips, threading, and the error contract.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use varfile::{
    bgzf, build_index, Error, Genotype, Header, IndexKind, Value, VariantFile,
};

const HEADER_TEXT: &str = concat!(
    "##fileformat=VCFv4.0\n",
    "##fileDate=20090805\n",
    "##source=myImputationProgramV3.1\n",
    "##reference=1000GenomesPilot-NCBI36\n",
    "##phasing=partial\n",
    "##INFO=<ID=NS,Number=1,Type=Integer,Description=\"Number of Samples With Data\">\n",
    "##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total Depth\">\n",
    "##INFO=<ID=AF,Number=.,Type=Float,Description=\"Allele Frequency\">\n",
    "##INFO=<ID=AA,Number=1,Type=String,Description=\"Ancestral Allele\">\n",
    "##INFO=<ID=DB,Number=0,Type=Flag,Description=\"dbSNP membership, build 129\">\n",
    "##INFO=<ID=H2,Number=0,Type=Flag,Description=\"HapMap2 membership\">\n",
    "##FILTER=<ID=q10,Description=\"Quality below 10\">\n",
    "##FILTER=<ID=s50,Description=\"Less than 50% of samples have data\">\n",
    "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n",
    "##FORMAT=<ID=GQ,Number=1,Type=Integer,Description=\"Genotype Quality\">\n",
    "##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read Depth\">\n",
    "##FORMAT=<ID=HQ,Number=2,Type=Integer,Description=\"Haplotype Quality\">\n",
    "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNA00001\tNA00002\tNA00003\n",
);

const DATA_LINES: [&str; 5] = [
    "M\t1230237\t.\tT\t.\t47\tPASS\tNS=3;DP=13;AA=T\tGT:GQ:DP:HQ\t0|0:54:7:56,60\t0|0:48:4:51,51\t0/0:61:2",
    "17\t14370\trs6054257\tG\tA\t29\tPASS\tNS=3;DP=14;AF=0.5;DB;H2\tGT:GQ:DP:HQ\t0|0:48:1:51,51\t1|0:48:8:51,51\t1/1:43:5:.,.",
    "20\t17330\t.\tT\tA\t3\tq10\tNS=3;DP=11;AF=0.017\tGT:GQ:DP:HQ\t0|0:49:3:58,50\t0|1:3:5:65,3\t0/0:41:3",
    "20\t1110696\trs6040355\tA\tG,T\t67\tPASS\tNS=2;DP=10;AF=0.333,0.667;AA=T;DB\tGT:GQ:DP:HQ\t1|2:21:6:23,27\t2|1:2:0:18,2\t2/2:35:4",
    "20\t1234567\tmicrosat1\tGTCT\tG,GTACT\t50\tPASS\tNS=3;DP=9;AA=G\tGT:GQ:DP\t0/1:35:4\t0/2:17:2\t1/1:40:3",
];

/// Expected text rendition after a pass through the binary encoding: every
/// sample that dropped its trailing HQ field comes back with an explicit
/// missing entry, everything else is unchanged.
fn bcf_rendition() -> Vec<String> {
    let mut lines: Vec<String> = DATA_LINES.iter().map(|s| s.to_string()).collect();
    lines[0] = lines[0].replace("0/0:61:2", "0/0:61:2:.");
    lines[2] = lines[2].replace("0/0:41:3", "0/0:41:3:.");
    lines[3] = lines[3].replace("2/2:35:4", "2/2:35:4:.");
    lines
}

fn fixture_text() -> String {
    let mut text = HEADER_TEXT.to_string();
    for line in DATA_LINES {
        text.push_str(line);
        text.push('\n');
    }
    text
}

fn write_plain(dir: &Path) -> PathBuf {
    let path = dir.join("example.vcf");
    fs::write(&path, fixture_text()).unwrap();
    path
}

fn write_bgzf(dir: &Path) -> PathBuf {
    let path = dir.join("example.vcf.gz");
    fs::write(&path, bgzf::compress_to_vec(fixture_text().as_bytes()).unwrap()).unwrap();
    path
}

/// Unfrozen copy of a file's header, contig declarations added so the
/// binary encoding can resolve every chromosome.
fn header_with_contigs(vf: &VariantFile) -> Header {
    let mut h = Header::from_text(&vf.header().to_text()).unwrap();
    h.add_contig("M", Some(16_571)).unwrap();
    h.add_contig("17", Some(81_195_210)).unwrap();
    h.add_contig("20", Some(62_435_964)).unwrap();
    h
}

fn write_bcf(dir: &Path) -> PathBuf {
    let src_path = write_plain(dir);
    let mut src = VariantFile::open(&src_path, "r").unwrap();
    let header = header_with_contigs(&src);
    let path = dir.join("example.bcf");
    let mut out = VariantFile::options()
        .header(header)
        .open(&path, "wb")
        .unwrap();
    for rec in src.records() {
        out.write(&mut rec.unwrap()).unwrap();
    }
    out.close().unwrap();
    path
}

fn all_lines(vf: &mut VariantFile) -> Vec<String> {
    vf.records()
        .map(|r| r.unwrap().to_vcf_line().unwrap())
        .collect()
}

#[test]
fn detects_plain_text() {
    let dir = tempfile::tempdir().unwrap();
    let vf = VariantFile::open(write_plain(dir.path()), "r").unwrap();
    assert_eq!(vf.category(), "VARIANTS");
    assert_eq!(vf.format(), "VCF");
    assert_eq!(vf.compression(), "NONE");
    assert_eq!(vf.description(), "VCF version 4.0 variant calling text");
    assert!(vf.is_read());
    assert!(vf.is_open());
}

#[test]
fn detects_compressed_text() {
    let dir = tempfile::tempdir().unwrap();
    let vf = VariantFile::open(write_bgzf(dir.path()), "r").unwrap();
    assert_eq!(vf.format(), "VCF");
    assert_eq!(vf.compression(), "BGZF");
    assert_eq!(
        vf.description(),
        "VCF version 4.0 BGZF-compressed variant calling text"
    );
}

#[test]
fn detects_binary() {
    let dir = tempfile::tempdir().unwrap();
    let vf = VariantFile::open(write_bcf(dir.path()), "r").unwrap();
    assert_eq!(vf.format(), "BCF");
    assert_eq!(vf.compression(), "BGZF");
    assert_eq!(
        vf.description(),
        "BCF version 2.2 compressed variant calling binary data (BGZF)"
    );
}

#[test]
fn core_columns_across_all_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut vf = VariantFile::open(write_plain(dir.path()), "r").unwrap();
    let mut recs: Vec<_> = vf.records().map(|r| r.unwrap()).collect();
    assert_eq!(recs.len(), 5);

    let chroms: Vec<String> = recs.iter_mut().map(|r| r.chrom().unwrap()).collect();
    assert_eq!(chroms, ["M", "17", "20", "20", "20"]);

    let pos: Vec<i64> = recs.iter_mut().map(|r| r.pos().unwrap()).collect();
    assert_eq!(pos, [1230237, 14370, 17330, 1110696, 1234567]);

    let ids: Vec<Option<String>> = recs.iter_mut().map(|r| r.id().unwrap()).collect();
    assert_eq!(
        ids,
        [
            None,
            Some("rs6054257".into()),
            None,
            Some("rs6040355".into()),
            Some("microsat1".into())
        ]
    );

    let refs: Vec<String> = recs.iter_mut().map(|r| r.ref_allele().unwrap()).collect();
    assert_eq!(refs, ["T", "G", "T", "A", "GTCT"]);

    let alts: Vec<Vec<String>> = recs.iter_mut().map(|r| r.alts().unwrap()).collect();
    assert_eq!(alts[0], Vec::<String>::new());
    assert_eq!(alts[1], ["A"]);
    assert_eq!(alts[3], ["G", "T"]);
    assert_eq!(alts[4], ["G", "GTACT"]);

    let quals: Vec<f32> = recs.iter_mut().map(|r| r.qual().unwrap().unwrap()).collect();
    assert_eq!(quals, [47.0, 29.0, 3.0, 67.0, 50.0]);

    let filters: Vec<Option<Vec<String>>> =
        recs.iter_mut().map(|r| r.filters().unwrap()).collect();
    assert_eq!(filters[1], Some(vec!["PASS".to_string()]));
    assert_eq!(filters[2], Some(vec!["q10".to_string()]));
}

#[test]
fn info_and_format_decode_by_schema() {
    let dir = tempfile::tempdir().unwrap();
    let mut vf = VariantFile::open(write_plain(dir.path()), "r").unwrap();
    let mut recs: Vec<_> = vf.records().map(|r| r.unwrap()).collect();

    let r = &mut recs[1];
    assert_eq!(r.info_value("NS").unwrap(), Some(Value::Int(3)));
    assert_eq!(r.info_value("DP").unwrap(), Some(Value::Int(14)));
    assert_eq!(
        r.info_value("AF").unwrap(),
        Some(Value::FloatVec(vec![Some(0.5)]))
    );
    assert_eq!(r.info_value("DB").unwrap(), Some(Value::Flag));
    assert_eq!(r.info_value("AA").unwrap(), None);

    let keys: Vec<Vec<String>> = recs
        .iter_mut()
        .map(|r| r.format_keys().unwrap())
        .collect();
    assert_eq!(keys[0], ["GT", "GQ", "DP", "HQ"]);
    // last record carries no haplotype qualities
    assert_eq!(keys[4], ["GT", "GQ", "DP"]);
}

#[test]
fn genotypes_and_missing_fields() {
    let dir = tempfile::tempdir().unwrap();
    let mut vf = VariantFile::open(write_plain(dir.path()), "r").unwrap();
    let mut recs: Vec<_> = vf.records().map(|r| r.unwrap()).collect();

    let gt = |r: &mut varfile::Record, i: usize| -> Genotype {
        r.sample(i).unwrap().genotype().unwrap().clone()
    };
    assert_eq!(gt(&mut recs[3], 0).allele_indices, [Some(1), Some(2)]);
    assert!(gt(&mut recs[3], 0).phased);
    assert_eq!(gt(&mut recs[3], 1).allele_indices, [Some(2), Some(1)]);
    assert_eq!(gt(&mut recs[3], 2).allele_indices, [Some(2), Some(2)]);
    assert!(!gt(&mut recs[3], 2).phased);

    // HQ of ".,." decodes to per-element missing entries
    let s = recs[1].sample(2).unwrap();
    assert_eq!(s.get("HQ"), Some(&Value::IntVec(vec![None, None])));
    // dropped trailing field is simply absent
    let s = recs[0].sample(2).unwrap();
    assert_eq!(s.get("HQ"), None);
    assert_eq!(s.get("DP"), Some(&Value::Int(2)));
}

#[test]
fn region_query_through_tabix_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_bgzf(dir.path());
    let index_path = build_index(&path, IndexKind::Tbi).unwrap();
    assert_eq!(index_path, PathBuf::from(format!("{}.tbi", path.display())));

    // compressed index file with the tabix magic inside
    let raw = fs::read(&index_path).unwrap();
    assert!(bgzf::is_bgzf(&raw));
    let mut payload = Vec::new();
    bgzf::Reader::new(std::io::Cursor::new(raw), 1, None, false)
        .read_to_end(&mut payload)
        .unwrap();
    assert_eq!(&payload[..4], b"TBI\x01");

    let mut vf = VariantFile::open(&path, "r").unwrap();
    let mut hits: Vec<_> = vf
        .fetch_contig("20")
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    let summary: Vec<(i64, String, Vec<String>)> = hits
        .iter_mut()
        .map(|r| (r.pos().unwrap(), r.ref_allele().unwrap(), r.alts().unwrap()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (17330, "T".to_string(), vec!["A".to_string()]),
            (1110696, "A".to_string(), vec!["G".to_string(), "T".to_string()]),
            (
                1234567,
                "GTCT".to_string(),
                vec!["G".to_string(), "GTACT".to_string()]
            ),
        ]
    );

    // a narrow window picks out a single record
    let one: Vec<_> = vf
        .fetch("20", 1110695, 1110696)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(one.len(), 1);
}

#[test]
fn region_query_through_generic_index_matches_tabix() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_bgzf(dir.path());

    build_index(&path, IndexKind::Tbi).unwrap();
    let mut vf = VariantFile::open(&path, "r").unwrap();
    let via_tbi: Vec<String> = vf
        .fetch_contig("20")
        .unwrap()
        .map(|r| r.unwrap().to_vcf_line().unwrap())
        .collect();
    drop(vf);

    fs::remove_file(format!("{}.tbi", path.display())).unwrap();
    let csi_path = build_index(&path, IndexKind::Csi).unwrap();
    let raw = fs::read(&csi_path).unwrap();
    let mut payload = Vec::new();
    bgzf::Reader::new(std::io::Cursor::new(raw), 1, None, false)
        .read_to_end(&mut payload)
        .unwrap();
    assert_eq!(&payload[..4], b"CSI\x01");

    let mut vf = VariantFile::open(&path, "r").unwrap();
    let via_csi: Vec<String> = vf
        .fetch_contig("20")
        .unwrap()
        .map(|r| r.unwrap().to_vcf_line().unwrap())
        .collect();
    assert_eq!(via_tbi, via_csi);
    assert_eq!(via_csi.len(), 3);
}

#[test]
fn binary_files_always_get_the_generic_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_bcf(dir.path());
    let index_path = build_index(&path, IndexKind::Tbi).unwrap();
    assert!(index_path.to_string_lossy().ends_with(".csi"));

    let mut vf = VariantFile::open(&path, "r").unwrap();
    let hits: Vec<_> = vf
        .fetch_contig("20")
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(hits.len(), 3);
}

#[test]
fn fetch_at_or_past_the_scheme_ceiling_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_bgzf(dir.path());
    build_index(&path, IndexKind::Tbi).unwrap();
    let mut vf = VariantFile::open(&path, "r").unwrap();
    // the tabix scheme tops out at 2^29; a window beyond it holds nothing
    let ceiling = 1i64 << 29;
    let hits = vf.fetch("20", ceiling, ceiling + 100).unwrap().count();
    assert_eq!(hits, 0);
    let hits = vf.fetch("20", ceiling + 5000, ceiling + 5100).unwrap().count();
    assert_eq!(hits, 0);
}

#[test]
fn coordinates_beyond_the_tabix_range_index_and_query() {
    let dir = tempfile::tempdir().unwrap();
    let header = concat!(
        "##fileformat=VCFv4.0\n",
        "##contig=<ID=huge,length=1200000000>\n",
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n",
    );
    let text = format!(
        "{header}huge\t100\t.\tA\tT\t30\tPASS\t.\nhuge\t600000000\t.\tG\tC\t40\tPASS\t.\n"
    );
    let path = dir.path().join("huge.vcf.gz");
    fs::write(&path, bgzf::compress_to_vec(text.as_bytes()).unwrap()).unwrap();

    // the tabix request degrades to the generic layout, deep enough for 6e8
    let index_path = build_index(&path, IndexKind::Tbi).unwrap();
    assert_eq!(index_path, PathBuf::from(format!("{}.csi", path.display())));

    let mut vf = VariantFile::open(&path, "r").unwrap();
    let far: Vec<i64> = vf
        .fetch("huge", 599_999_000, 600_000_100)
        .unwrap()
        .map(|r| r.unwrap().pos().unwrap())
        .collect();
    assert_eq!(far, vec![600_000_000]);
    let near: Vec<i64> = vf
        .fetch("huge", 0, 1000)
        .unwrap()
        .map(|r| r.unwrap().pos().unwrap())
        .collect();
    assert_eq!(near, vec![100]);
}

#[test]
fn fetch_without_an_index_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_bgzf(dir.path());
    let mut vf = VariantFile::open(&path, "r").unwrap();
    assert!(matches!(
        vf.fetch_contig("20"),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn fetch_of_an_unknown_contig_is_a_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_bgzf(dir.path());
    build_index(&path, IndexKind::Tbi).unwrap();
    let mut vf = VariantFile::open(&path, "r").unwrap();
    match vf.fetch_contig("unknown") {
        Err(Error::SchemaLookup { kind, name }) => {
            assert_eq!(kind, "contig");
            assert_eq!(name, "unknown");
        }
        other => panic!("expected a schema lookup failure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn header_text_round_trips_as_a_set() {
    let dir = tempfile::tempdir().unwrap();
    let vf = VariantFile::open(write_plain(dir.path()), "r").unwrap();
    let mut original: Vec<&str> = HEADER_TEXT.lines().collect();
    let text = vf.header().to_text();
    let mut rebuilt: Vec<&str> = text.lines().collect();
    original.sort_unstable();
    rebuilt.sort_unstable();
    assert_eq!(original, rebuilt);
    assert_eq!(
        vf.header().samples(),
        &["NA00001".to_string(), "NA00002".to_string(), "NA00003".to_string()]
    );
}

#[test]
fn plain_to_compressed_round_trip_preserves_data_lines() {
    let dir = tempfile::tempdir().unwrap();
    let src_path = write_plain(dir.path());
    let out_path = dir.path().join("copy.vcf.gz");

    let mut src = VariantFile::open(&src_path, "r").unwrap();
    let header = Header::from_text(&src.header().to_text()).unwrap();
    let mut out = VariantFile::options()
        .header(header)
        .open(&out_path, "wz")
        .unwrap();
    for rec in src.records() {
        out.write(&mut rec.unwrap()).unwrap();
    }
    out.close().unwrap();

    let mut back = VariantFile::open(&out_path, "r").unwrap();
    assert_eq!(all_lines(&mut back), DATA_LINES.to_vec());
}

#[test]
fn binary_round_trip_preserves_data_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_bcf(dir.path());
    let mut vf = VariantFile::open(&path, "r").unwrap();
    assert_eq!(all_lines(&mut vf), bcf_rendition());
}

#[test]
fn multithreaded_and_sequential_reads_agree() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_bgzf(dir.path());

    let mut seq = VariantFile::open(&path, "r").unwrap();
    let mut par = VariantFile::options().threads(2).open(&path, "r").unwrap();
    assert_eq!(all_lines(&mut seq), all_lines(&mut par));
}

#[test]
fn multithreaded_writer_output_reads_back_identically() {
    let dir = tempfile::tempdir().unwrap();
    let src_path = write_plain(dir.path());
    let out_path = dir.path().join("threaded.bcf");

    let mut src = VariantFile::open(&src_path, "r").unwrap();
    let header = header_with_contigs(&src);
    let mut out = VariantFile::options()
        .header(header)
        .threads(2)
        .open(&out_path, "wb")
        .unwrap();
    for rec in src.records() {
        out.write(&mut rec.unwrap()).unwrap();
    }
    out.close().unwrap();

    let mut back = VariantFile::open(&out_path, "r").unwrap();
    assert_eq!(all_lines(&mut back), bcf_rendition());
}

#[test]
fn threads_and_truncation_tolerance_conflict_before_io() {
    // checked before the path is ever touched
    let err = VariantFile::options()
        .threads(2)
        .ignore_truncation(true)
        .open("/nonexistent/whatever.vcf.gz", "r");
    assert!(matches!(err, Err(Error::Config { .. })));
}

#[test]
fn empty_files_are_format_errors() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("empty.vcf");
    fs::write(&plain, b"").unwrap();
    assert!(matches!(
        VariantFile::open(&plain, "r"),
        Err(Error::Format { .. })
    ));

    let compressed = dir.path().join("empty.vcf.gz");
    fs::write(&compressed, bgzf::compress_to_vec(b"").unwrap()).unwrap();
    assert!(matches!(
        VariantFile::open(&compressed, "r"),
        Err(Error::Format { .. })
    ));
}

#[test]
fn garbage_and_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let garbage = dir.path().join("garbage.vcf");
    fs::write(&garbage, &[0u8, 1, 2, 3, 4, 5]).unwrap();
    assert!(matches!(
        VariantFile::open(&garbage, "r"),
        Err(Error::Format { .. })
    ));
    assert!(matches!(
        VariantFile::open(dir.path().join("no-such-file.vcf"), "r"),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn truncated_stream_is_rejected_unless_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("truncated.vcf.gz");
    let mut bytes = bgzf::compress_to_vec(fixture_text().as_bytes()).unwrap();
    bytes.truncate(bytes.len() - bgzf::EOF_BLOCK.len());
    fs::write(&path, &bytes).unwrap();

    let mut vf = VariantFile::open(&path, "r").unwrap();
    let result: std::result::Result<Vec<_>, _> = vf.records().collect();
    assert!(matches!(result, Err(Error::Format { .. })));

    let mut vf = VariantFile::options()
        .ignore_truncation(true)
        .open(&path, "r")
        .unwrap();
    assert_eq!(all_lines(&mut vf), DATA_LINES.to_vec());
}

#[test]
fn header_only_file_opens_and_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("header-only.vcf");
    fs::write(&path, HEADER_TEXT).unwrap();
    let mut vf = VariantFile::open(&path, "r").unwrap();
    assert_eq!(vf.records().count(), 0);
}

#[test]
fn mode_misuse_is_a_state_error() {
    let dir = tempfile::tempdir().unwrap();
    let src_path = write_plain(dir.path());

    let mut writer = VariantFile::open(dir.path().join("out.vcf"), "w").unwrap();
    assert!(matches!(
        writer.records().next(),
        Some(Err(Error::State { .. }))
    ));

    let mut reader = VariantFile::open(&src_path, "r").unwrap();
    let mut rec = reader.records().next().unwrap().unwrap();
    assert!(matches!(reader.write(&mut rec), Err(Error::State { .. })));

    writer.close().unwrap();
    assert!(!writer.is_open());
    assert!(matches!(writer.write(&mut rec), Err(Error::State { .. })));
}

#[test]
fn invalid_modes_and_thread_counts_are_config_errors() {
    assert!(matches!(
        VariantFile::open("whatever.vcf", "a"),
        Err(Error::Config { .. })
    ));
    assert!(matches!(
        VariantFile::options().threads(0).open("whatever.vcf", "r"),
        Err(Error::Config { .. })
    ));
}

#[test]
fn qual_edits_show_up_in_serialized_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut vf = VariantFile::open(write_plain(dir.path()), "r").unwrap();
    let mut rec = vf.records().next().unwrap().unwrap();
    rec.set_qual(Some(10.0)).unwrap();
    let line = rec.to_vcf_line().unwrap();
    assert!(line.contains("\t10\t"));
    assert!(!line.contains("\t47\t"));
}

#[test]
fn translation_to_a_foreign_header_fails_on_unknown_names() {
    let dir = tempfile::tempdir().unwrap();
    let mut vf = VariantFile::open(write_plain(dir.path()), "r").unwrap();
    let mut rec = vf.records().next().unwrap().unwrap();
    let sparse = Arc::new(
        Header::from_text(concat!(
            "##fileformat=VCFv4.0\n",
            "##contig=<ID=1>\n",
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n",
        ))
        .unwrap(),
    );
    assert!(matches!(
        rec.translate(&sparse),
        Err(Error::SchemaLookup { kind: "contig", .. })
    ));
}

#[test]
fn frozen_reader_header_rejects_edits() {
    let dir = tempfile::tempdir().unwrap();
    let vf = VariantFile::open(write_plain(dir.path()), "r").unwrap();
    assert!(vf.header().is_frozen());

    // a writer's header freezes at first record write
    let dir2 = tempfile::tempdir().unwrap();
    let mut out = VariantFile::options()
        .header(Header::from_text(HEADER_TEXT).unwrap())
        .open(dir2.path().join("w.vcf"), "w")
        .unwrap();
    out.header_mut().unwrap().add_contig("20", None).unwrap();
    let mut src = VariantFile::open(write_plain(dir.path()), "r").unwrap();
    let mut rec = src.records().next().unwrap().unwrap();
    out.write(&mut rec).unwrap();
    assert!(matches!(out.header_mut(), Err(Error::State { .. })));
}
