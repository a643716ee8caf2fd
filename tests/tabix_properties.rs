//! Property-based tests for the tabix reader and indexer
//!
//! An index built from sorted VCF text answers every region query with
//! exactly the lines whose span overlaps it: `[POS-1, POS-1+len(REF))`,
//! stretched to INFO `END` for structural variants.

use bytes::Bytes;
use proptest::prelude::*;
use vcf_tiler::core::io::ByteSource;
use vcf_tiler::core::SourceError;
use vcf_tiler::formats::bgzf;
use vcf_tiler::formats::tabix::{compress_and_index_vcf, index_bgzf_vcf, TabixVcfSource, TbiIndex};

const HEADER: &str = "##fileformat=VCFv4.2\n\
##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Depth\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";

#[derive(Debug, Clone)]
struct Row {
    contig: usize,
    pos: u64,
    ref_len: usize,
    /// INFO `END` of a `<DEL>` record
    sv_end: Option<u64>,
}

impl Row {
    fn line(&self, n: usize) -> String {
        let ref_allele = "A".repeat(self.ref_len);
        match self.sv_end {
            Some(sv_end) => format!(
                "ctg{}\t{}\tsv{}\t{}\t<DEL>\t.\tPASS\tSVTYPE=DEL;END={};DP={}",
                self.contig, self.pos, n, ref_allele, sv_end, n
            ),
            None => format!(
                "ctg{}\t{}\tv{}\t{}\tT\t.\tPASS\tDP={}",
                self.contig, self.pos, n, ref_allele, n
            ),
        }
    }

    fn overlaps(&self, contig: usize, start: u64, end: u64) -> bool {
        let beg = self.pos - 1;
        let stop = (beg + self.ref_len as u64).max(self.sv_end.unwrap_or(0));
        self.contig == contig && beg < end && stop > start
    }
}

/// Sorted rows over three contigs, positions spread across several bins;
/// about one row in twenty is a deletion with an INFO `END`
fn arb_rows(max: usize) -> impl Strategy<Value = Vec<Row>> {
    let sv_len = prop_oneof![19 => Just(None), 1 => (1u64..600_000).prop_map(Some)];
    prop::collection::vec((0usize..3, 1u64..2_000_000, 1usize..40, sv_len), 1..max).prop_map(|raw| {
        let mut rows: Vec<Row> = raw
            .into_iter()
            .map(|(contig, pos, ref_len, sv_len)| Row {
                contig,
                pos,
                ref_len,
                sv_end: sv_len.map(|len| pos + len),
            })
            .collect();
        rows.sort_by_key(|r| (r.contig, r.pos));
        rows
    })
}

fn arb_query() -> impl Strategy<Value = (usize, u64, u64)> {
    (0usize..4, 0u64..2_000_000, 1u64..300_000).prop_map(|(c, s, len)| (c, s, s + len))
}

fn vcf_text(rows: &[Row]) -> String {
    let mut text = HEADER.to_string();
    for (n, row) in rows.iter().enumerate() {
        text.push_str(&row.line(n));
        text.push('\n');
    }
    text
}

fn query(source: &TabixVcfSource, contig: usize, start: u64, end: u64) -> Vec<String> {
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    runtime.block_on(async {
        let mut lines = Vec::new();
        source
            .query_lines(&format!("ctg{}", contig), start, end, |line| {
                lines.push(line.to_string());
                Ok::<_, SourceError>(())
            })
            .await
            .unwrap();
        lines
    })
}

fn memory_source(vcf: Vec<u8>, index: &TbiIndex) -> TabixVcfSource {
    TabixVcfSource::new(
        ByteSource::memory(Bytes::from(vcf)),
        ByteSource::memory(Bytes::from(index.to_bytes().unwrap())),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Region queries return exactly the overlapping lines, in file order
    #[test]
    fn prop_query_returns_overlapping_lines(
        rows in arb_rows(3000),
        queries in prop::collection::vec(arb_query(), 1..6),
    ) {
        let (vcf, index) = compress_and_index_vcf(vcf_text(&rows).as_bytes()).unwrap();
        let source = memory_source(vcf, &index);

        for (contig, start, end) in queries {
            let expected: Vec<String> = rows
                .iter()
                .enumerate()
                .filter(|(_, row)| row.overlaps(contig, start, end))
                .map(|(n, row)| row.line(n))
                .collect();
            prop_assert_eq!(query(&source, contig, start, end), expected);
        }
    }

    /// Indexing the compressed file afterwards answers like the one-pass index
    #[test]
    fn prop_reindex_matches_one_pass(rows in arb_rows(1500), (contig, start, end) in arb_query()) {
        let (vcf, index) = compress_and_index_vcf(vcf_text(&rows).as_bytes()).unwrap();
        let reindexed = index_bgzf_vcf(&vcf).unwrap();

        let one_pass = query(&memory_source(vcf.clone(), &index), contig, start, end);
        let second_pass = query(&memory_source(vcf, &reindexed), contig, start, end);
        prop_assert_eq!(one_pass, second_pass);
    }

    /// BGZF output inflates back to the input text
    #[test]
    fn prop_bgzf_preserves_text(rows in arb_rows(3000)) {
        let text = vcf_text(&rows);
        let compressed = bgzf::compress(text.as_bytes()).unwrap();
        prop_assert!(bgzf::is_bgzf(&compressed));
        prop_assert_eq!(bgzf::decompress(&compressed).unwrap(), text.into_bytes());
    }
}

#[test]
fn test_header_is_read_from_compressed_file() {
    let rows = vec![Row { contig: 1, pos: 10, ref_len: 1, sv_end: None }];
    let (vcf, index) = compress_and_index_vcf(vcf_text(&rows).as_bytes()).unwrap();
    let source = memory_source(vcf, &index);

    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let header = runtime.block_on(source.header()).unwrap();
    assert!(header.info_definition("DP").is_some());
    assert!(header.samples.is_empty());
}

#[test]
fn test_unsorted_input_is_rejected() {
    let text = format!(
        "{}ctg0\t50\t.\tA\tT\t.\t.\t.\nctg0\t10\t.\tA\tT\t.\t.\t.\n",
        HEADER
    );
    assert!(compress_and_index_vcf(text.as_bytes()).is_err());
}

#[test]
fn test_deletion_is_found_past_its_first_base() {
    let rows = vec![
        Row { contig: 0, pos: 100, ref_len: 1, sv_end: Some(50_000) },
        Row { contig: 0, pos: 40_000, ref_len: 1, sv_end: None },
    ];
    let (vcf, index) = compress_and_index_vcf(vcf_text(&rows).as_bytes()).unwrap();
    let source = memory_source(vcf, &index);

    assert_eq!(query(&source, 0, 30_000, 31_000), vec![rows[0].line(0)]);
    assert_eq!(query(&source, 0, 49_999, 50_000), vec![rows[0].line(0)]);
    assert!(query(&source, 0, 50_000, 60_000).is_empty());
}
