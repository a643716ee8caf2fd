//! Tabix index and indexed VCF access
//!
//! A `.tbi` index maps each contig to a hierarchical binning index plus a
//! linear index of 16 kb windows, both pointing into the BGZF data file by
//! virtual offset. [`TabixVcfSource`] combines an index with a byte source
//! to stream the data lines overlapping a region.
//!
//! # Binning scheme
//!
//! 37,449 bins covering 512 Mbp over 6 levels:
//! - Level 0: 1 bin (512 Mbp)
//! - Level 1: 8 bins (64 Mbp each)
//! - Level 2: 64 bins (8 Mbp each)
//! - Level 3: 512 bins (1 Mbp each)
//! - Level 4: 4096 bins (128 Kbp each)
//! - Level 5: 32768 bins (16 Kbp each)

use crate::core::error::{SourceError, SourceResult};
use crate::core::io::ByteSource;
use crate::formats::bgzf::{self, BgzfWriter, MAX_BLOCK_SIZE};
use crate::formats::vcf::{info_end, VcfHeader, VcfRecordView};
use log::debug;
use memchr::memchr;
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// TBI file format magic string
const TBI_MAGIC: &[u8; 4] = b"TBI\x01";

/// Bins beyond this id hold index metadata, not data chunks
const MAX_BIN: u32 = 37_449;

/// Linear index window shift (16 kb)
const LINEAR_SHIFT: u32 = 14;

/// Positions beyond 2^29 fall outside the binning scheme
const MAX_POSITION: u64 = 1 << 29;

/// Bytes fetched per round while reading the VCF header
const HEADER_FETCH_SIZE: u64 = 128 * 1024;

/// BGZF virtual file offset
///
/// High 48 bits: compressed offset of the block; low 16 bits: offset into
/// the uncompressed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn new(block_address: u64, within_block: u16) -> Self {
        Self((block_address << 16) | within_block as u64)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }

    pub fn block_address(&self) -> u64 {
        self.0 >> 16
    }

    pub fn within_block(&self) -> usize {
        (self.0 & 0xffff) as usize
    }
}

/// A `[start, end)` range of virtual offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: VirtualOffset,
    pub end: VirtualOffset,
}

impl Chunk {
    pub fn new(start: VirtualOffset, end: VirtualOffset) -> Self {
        Self { start, end }
    }
}

/// File format types recognized by tabix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TbiFormat {
    /// Generic tab-delimited file
    Generic = 0,
    /// SAM format
    Sam = 1,
    /// VCF format
    Vcf = 2,
}

impl TbiFormat {
    fn from_i32(value: i32) -> SourceResult<Self> {
        match value & 0xffff {
            0 => Ok(TbiFormat::Generic),
            1 => Ok(TbiFormat::Sam),
            2 => Ok(TbiFormat::Vcf),
            _ => Err(SourceError::Index(format!("unknown format code {}", value))),
        }
    }
}

/// Index data for one contig
#[derive(Debug, Clone, Default)]
pub struct TbiReference {
    pub name: String,
    /// Bin id → chunks
    pub bins: HashMap<u32, Vec<Chunk>>,
    /// Smallest virtual offset of a record overlapping each 16 kb window
    pub intervals: Vec<VirtualOffset>,
}

/// Tabix (`.tbi`) index
#[derive(Debug, Clone)]
pub struct TbiIndex {
    format: TbiFormat,
    col_seq: i32,
    col_beg: i32,
    col_end: i32,
    meta_char: u8,
    skip_lines: i32,
    references: Vec<TbiReference>,
    ref_map: HashMap<String, usize>,
}

impl TbiIndex {
    /// Parse an index held in memory, BGZF/gzip-compressed or raw
    pub fn parse(data: &[u8]) -> SourceResult<Self> {
        if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
            let mut raw = Vec::new();
            flate2::read::MultiGzDecoder::new(data)
                .read_to_end(&mut raw)
                .map_err(|e| SourceError::Index(format!("decompression failed: {}", e)))?;
            Self::parse_raw(&raw)
        } else {
            Self::parse_raw(data)
        }
    }

    fn parse_raw(data: &[u8]) -> SourceResult<Self> {
        let mut reader = data;
        let reader = &mut reader;

        let mut magic = [0u8; 4];
        read_exact(reader, &mut magic)?;
        if &magic != TBI_MAGIC {
            return Err(SourceError::Index(format!("invalid magic {:?}", magic)));
        }

        let n_ref = read_count(reader, "n_ref")?;
        let format = TbiFormat::from_i32(read_i32(reader)?)?;
        let col_seq = read_i32(reader)?;
        let col_beg = read_i32(reader)?;
        let col_end = read_i32(reader)?;
        let meta = read_i32(reader)?;
        let skip = read_i32(reader)?;
        let l_nm = read_count(reader, "l_nm")?;

        let mut names_buf = vec![0u8; l_nm];
        read_exact(reader, &mut names_buf)?;
        let names = parse_sequence_names(&names_buf)?;
        if names.len() != n_ref {
            return Err(SourceError::Index(format!(
                "header claims {} references but has {} names",
                n_ref,
                names.len()
            )));
        }

        let mut references = Vec::with_capacity(n_ref);
        let mut ref_map = HashMap::with_capacity(n_ref);
        for (idx, name) in names.into_iter().enumerate() {
            let mut reference = TbiReference {
                name: name.clone(),
                ..Default::default()
            };

            let n_bin = read_count(reader, "n_bin")?;
            for _ in 0..n_bin {
                let bin_id = read_u32(reader)?;
                let n_chunk = read_count(reader, "n_chunk")?;
                let mut chunks = Vec::with_capacity(n_chunk);
                for _ in 0..n_chunk {
                    let start = VirtualOffset::from_raw(read_u64(reader)?);
                    let end = VirtualOffset::from_raw(read_u64(reader)?);
                    chunks.push(Chunk::new(start, end));
                }
                if bin_id <= MAX_BIN {
                    reference.bins.insert(bin_id, chunks);
                }
            }

            let n_intv = read_count(reader, "n_intv")?;
            for _ in 0..n_intv {
                reference.intervals.push(VirtualOffset::from_raw(read_u64(reader)?));
            }

            ref_map.insert(name, idx);
            references.push(reference);
        }

        Ok(TbiIndex {
            format,
            col_seq,
            col_beg,
            col_end,
            meta_char: meta as u8,
            skip_lines: skip,
            references,
            ref_map,
        })
    }

    /// Serialize as a BGZF-compressed `.tbi`
    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut raw = Vec::new();
        raw.extend_from_slice(TBI_MAGIC);
        raw.extend_from_slice(&(self.references.len() as i32).to_le_bytes());
        for value in [
            self.format as i32,
            self.col_seq,
            self.col_beg,
            self.col_end,
            self.meta_char as i32,
            self.skip_lines,
        ] {
            raw.extend_from_slice(&value.to_le_bytes());
        }

        let mut names = Vec::new();
        for reference in &self.references {
            names.extend_from_slice(reference.name.as_bytes());
            names.push(0);
        }
        raw.extend_from_slice(&(names.len() as i32).to_le_bytes());
        raw.extend_from_slice(&names);

        for reference in &self.references {
            let mut bin_ids: Vec<_> = reference.bins.keys().copied().collect();
            bin_ids.sort_unstable();
            raw.extend_from_slice(&(bin_ids.len() as i32).to_le_bytes());
            for bin_id in bin_ids {
                let chunks = &reference.bins[&bin_id];
                raw.extend_from_slice(&bin_id.to_le_bytes());
                raw.extend_from_slice(&(chunks.len() as i32).to_le_bytes());
                for chunk in chunks {
                    raw.extend_from_slice(&chunk.start.as_raw().to_le_bytes());
                    raw.extend_from_slice(&chunk.end.as_raw().to_le_bytes());
                }
            }
            raw.extend_from_slice(&(reference.intervals.len() as i32).to_le_bytes());
            for offset in &reference.intervals {
                raw.extend_from_slice(&offset.as_raw().to_le_bytes());
            }
        }

        bgzf::compress(&raw)
    }

    pub fn format(&self) -> TbiFormat {
        self.format
    }

    /// Column for sequence name (1-based)
    pub fn col_seq(&self) -> i32 {
        self.col_seq
    }

    /// Column for start position (1-based)
    pub fn col_beg(&self) -> i32 {
        self.col_beg
    }

    /// Comment character for header lines
    pub fn meta_char(&self) -> char {
        self.meta_char as char
    }

    pub fn references(&self) -> &[TbiReference] {
        &self.references
    }

    pub fn get_reference(&self, name: &str) -> Option<&TbiReference> {
        self.ref_map.get(name).map(|&idx| &self.references[idx])
    }

    /// Chunks that may hold records overlapping `[start, end)` (0-based)
    ///
    /// An unknown contig or an empty range yields no chunks.
    pub fn query(&self, ref_name: &str, start: u64, end: u64) -> Vec<Chunk> {
        let Some(reference) = self.get_reference(ref_name) else {
            return Vec::new();
        };
        if start >= end {
            return Vec::new();
        }

        let mut chunks: Vec<Chunk> = reg2bins(start, end)
            .into_iter()
            .filter_map(|bin_id| reference.bins.get(&bin_id))
            .flatten()
            .copied()
            .collect();

        let min_offset = min_offset(&reference.intervals, start);
        chunks.retain(|chunk| chunk.end > min_offset);

        chunks.sort_by_key(|c| c.start);
        merge_chunks(&chunks)
    }
}

/// Parse null-terminated sequence names
fn parse_sequence_names(buf: &[u8]) -> SourceResult<Vec<String>> {
    buf.split(|&b| b == 0)
        .filter(|name| !name.is_empty())
        .map(|name| {
            std::str::from_utf8(name)
                .map(str::to_string)
                .map_err(|_| SourceError::InvalidUtf8("tabix sequence name"))
        })
        .collect()
}

/// Smallest bin fully containing `[beg, end)`
pub fn reg2bin(beg: u64, end: u64) -> u32 {
    let beg = beg.min(MAX_POSITION - 1) as u32;
    let end = end.clamp(1, MAX_POSITION) as u32 - 1;
    if beg >> 14 == end >> 14 {
        return ((1 << 15) - 1) / 7 + (beg >> 14);
    }
    if beg >> 17 == end >> 17 {
        return ((1 << 12) - 1) / 7 + (beg >> 17);
    }
    if beg >> 20 == end >> 20 {
        return ((1 << 9) - 1) / 7 + (beg >> 20);
    }
    if beg >> 23 == end >> 23 {
        return ((1 << 6) - 1) / 7 + (beg >> 23);
    }
    if beg >> 26 == end >> 26 {
        return ((1 << 3) - 1) / 7 + (beg >> 26);
    }
    0
}

/// Bins that may overlap `[beg, end)`, in ascending order
pub fn reg2bins(beg: u64, end: u64) -> Vec<u32> {
    let beg = beg.min(MAX_POSITION - 1) as u32;
    let end = end.clamp(beg as u64 + 1, MAX_POSITION) as u32 - 1;

    let mut bins = vec![0];
    for level in 1..=5u32 {
        let offset = ((1 << (3 * level)) - 1) / 7;
        let shift = 29 - 3 * level;
        bins.extend((offset + (beg >> shift))..=(offset + (end >> shift)));
    }
    bins
}

/// Lower bound on the virtual offset of records overlapping `beg`
fn min_offset(intervals: &[VirtualOffset], beg: u64) -> VirtualOffset {
    let window = (beg >> LINEAR_SHIFT) as usize;
    intervals.get(window).copied().unwrap_or_default()
}

/// Merge overlapping or adjacent chunks; input must be sorted by start
fn merge_chunks(chunks: &[Chunk]) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match merged.last_mut() {
            Some(current) if chunk.start <= current.end => {
                if chunk.end > current.end {
                    current.end = chunk.end;
                }
            }
            _ => merged.push(*chunk),
        }
    }
    merged
}

fn read_exact(reader: &mut &[u8], buf: &mut [u8]) -> SourceResult<()> {
    reader
        .read_exact(buf)
        .map_err(|_| SourceError::Index("unexpected end of index".to_string()))
}

fn read_i32(reader: &mut &[u8]) -> SourceResult<i32> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u32(reader: &mut &[u8]) -> SourceResult<u32> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(reader: &mut &[u8]) -> SourceResult<u64> {
    let mut buf = [0u8; 8];
    read_exact(reader, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_count(reader: &mut &[u8], what: &str) -> SourceResult<usize> {
    let value = read_i32(reader)?;
    usize::try_from(value).map_err(|_| SourceError::Index(format!("negative {}: {}", what, value)))
}

/// Builds a VCF-preset tabix index from records in file order
#[derive(Debug, Default)]
pub struct TbiIndexBuilder {
    references: Vec<ReferenceBuilder>,
    ref_map: HashMap<String, usize>,
    last: Option<(usize, u64)>,
}

#[derive(Debug, Default)]
struct ReferenceBuilder {
    name: String,
    bins: BTreeMap<u32, Vec<Chunk>>,
    intervals: Vec<Option<VirtualOffset>>,
}

impl TbiIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one record spanning `[beg, end)` (0-based) stored between
    /// virtual offsets `start` and `stop`
    ///
    /// Records must be grouped by contig and sorted by `beg` within a contig.
    pub fn add_record(
        &mut self,
        contig: &str,
        beg: u64,
        end: u64,
        start: VirtualOffset,
        stop: VirtualOffset,
    ) -> SourceResult<()> {
        let ref_id = match self.ref_map.get(contig) {
            Some(&id) => id,
            None => {
                let id = self.references.len();
                self.references.push(ReferenceBuilder {
                    name: contig.to_string(),
                    ..Default::default()
                });
                self.ref_map.insert(contig.to_string(), id);
                id
            }
        };

        if let Some((last_ref, last_beg)) = self.last {
            if ref_id < last_ref || (ref_id == last_ref && beg < last_beg) {
                return Err(SourceError::Index(format!(
                    "records not sorted at {}:{}",
                    contig,
                    beg + 1
                )));
            }
        }
        self.last = Some((ref_id, beg));

        let end = end.max(beg + 1);
        let reference = &mut self.references[ref_id];

        let chunks = reference.bins.entry(reg2bin(beg, end)).or_default();
        match chunks.last_mut() {
            Some(last) if last.end == start => last.end = stop,
            _ => chunks.push(Chunk::new(start, stop)),
        }

        let first_window = (beg >> LINEAR_SHIFT) as usize;
        let last_window = ((end - 1) >> LINEAR_SHIFT) as usize;
        if reference.intervals.len() <= last_window {
            reference.intervals.resize(last_window + 1, None);
        }
        for slot in &mut reference.intervals[first_window..=last_window] {
            if slot.map_or(true, |existing| start < existing) {
                *slot = Some(start);
            }
        }

        Ok(())
    }

    /// Finish the index; empty linear windows inherit the previous offset
    pub fn build(self) -> TbiIndex {
        let mut ref_map = HashMap::with_capacity(self.references.len());
        let references = self
            .references
            .into_iter()
            .enumerate()
            .map(|(idx, reference)| {
                ref_map.insert(reference.name.clone(), idx);
                let mut previous = VirtualOffset::default();
                let intervals = reference
                    .intervals
                    .into_iter()
                    .map(|slot| {
                        if let Some(offset) = slot {
                            previous = offset;
                        }
                        previous
                    })
                    .collect();
                TbiReference {
                    name: reference.name,
                    bins: reference.bins.into_iter().collect(),
                    intervals,
                }
            })
            .collect();

        TbiIndex {
            format: TbiFormat::Vcf,
            col_seq: 1,
            col_beg: 2,
            col_end: 0,
            meta_char: b'#',
            skip_lines: 0,
            references,
            ref_map,
        }
    }
}

/// Index an existing BGZF-compressed VCF
pub fn index_bgzf_vcf(data: &[u8]) -> SourceResult<TbiIndex> {
    let mut builder = TbiIndexBuilder::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut line_start = VirtualOffset::default();

    for block in bgzf::read_blocks(data, 0)? {
        let mut pos = 0;
        while pos < block.data.len() {
            if pending.is_empty() {
                line_start = VirtualOffset::new(block.address, pos as u16);
            }
            match memchr(b'\n', &block.data[pos..]) {
                Some(nl) => {
                    pending.extend_from_slice(&block.data[pos..pos + nl]);
                    pos += nl + 1;
                    let line_end = if pos <= u16::MAX as usize {
                        VirtualOffset::new(block.address, pos as u16)
                    } else {
                        VirtualOffset::new(block.address + block.compressed_size as u64, 0)
                    };
                    index_line(&mut builder, &pending, line_start, line_end)?;
                    pending.clear();
                }
                None => {
                    pending.extend_from_slice(&block.data[pos..]);
                    pos = block.data.len();
                }
            }
        }
    }

    if !pending.is_empty() {
        let end = VirtualOffset::new(data.len() as u64, 0);
        index_line(&mut builder, &pending, line_start, end)?;
    }

    Ok(builder.build())
}

fn index_line(
    builder: &mut TbiIndexBuilder,
    line: &[u8],
    start: VirtualOffset,
    stop: VirtualOffset,
) -> SourceResult<()> {
    if line.is_empty() || line[0] == b'#' {
        return Ok(());
    }
    let view = VcfRecordView::parse(line)
        .map_err(|e| SourceError::Index(format!("cannot index line: {}", e)))?;
    let (beg, end) = view
        .span()
        .map_err(|e| SourceError::Index(format!("cannot index line: {}", e)))?;
    builder.add_record(view.chrom, beg, end, start, stop)
}

/// Compress VCF text to BGZF and index it in one pass
///
/// Lines must already be sorted by contig and position.
pub fn compress_and_index_vcf(text: &[u8]) -> SourceResult<(Vec<u8>, TbiIndex)> {
    let mut writer = BgzfWriter::new(Vec::new());
    let mut builder = TbiIndexBuilder::new();

    for line in text.split_inclusive(|&b| b == b'\n') {
        let start = VirtualOffset::from_raw(writer.virtual_offset());
        writer.write_all(line)?;
        let stop = VirtualOffset::from_raw(writer.virtual_offset());

        let content = line.strip_suffix(b"\n").unwrap_or(line);
        index_line(&mut builder, content, start, stop)?;
    }

    Ok((writer.finish()?, builder.build()))
}

/// An indexed, BGZF-compressed VCF
///
/// The header and index are fetched on first use and then shared.
#[derive(Debug)]
pub struct TabixVcfSource {
    vcf: ByteSource,
    index_source: ByteSource,
    header: OnceCell<Arc<VcfHeader>>,
    index: OnceCell<Arc<TbiIndex>>,
}

impl TabixVcfSource {
    /// Open a VCF and its index; the index defaults to `<vcf>.tbi`
    pub fn open(
        vcf_location: &str,
        index_location: Option<&str>,
        client: &reqwest::Client,
    ) -> SourceResult<Self> {
        let default_index = format!("{}.tbi", vcf_location);
        let index_location = index_location.unwrap_or(&default_index);
        Ok(Self::new(
            ByteSource::open(vcf_location, client)?,
            ByteSource::open(index_location, client)?,
        ))
    }

    pub fn new(vcf: ByteSource, index_source: ByteSource) -> Self {
        Self {
            vcf,
            index_source,
            header: OnceCell::new(),
            index: OnceCell::new(),
        }
    }

    pub fn location(&self) -> String {
        self.vcf.location()
    }

    /// Parsed VCF header, fetched once
    pub async fn header(&self) -> SourceResult<Arc<VcfHeader>> {
        self.header
            .get_or_try_init(|| async {
                let text = self.read_header_text().await?;
                let header = VcfHeader::parse(&text).map_err(|e| SourceError::Header {
                    location: self.vcf.location(),
                    message: e.to_string(),
                })?;
                Ok::<_, SourceError>(Arc::new(header))
            })
            .await
            .cloned()
    }

    /// Tabix index, fetched once
    pub async fn index(&self) -> SourceResult<Arc<TbiIndex>> {
        self.index
            .get_or_try_init(|| async {
                debug!("loading tabix index {}", self.index_source.location());
                let data = self.index_source.read_all().await?;
                Ok::<_, SourceError>(Arc::new(TbiIndex::parse(&data)?))
            })
            .await
            .cloned()
    }

    /// Inflate leading blocks until the first data line is reached
    async fn read_header_text(&self) -> SourceResult<String> {
        let mut text = Vec::new();
        let mut offset = 0u64;

        loop {
            let data = self.vcf.read_range(offset, offset + HEADER_FETCH_SIZE).await?;
            if data.is_empty() {
                break;
            }
            let blocks = bgzf::read_blocks(&data, offset)?;
            if blocks.is_empty() {
                return Err(SourceError::Bgzf(format!(
                    "truncated block at offset {} in {}",
                    offset,
                    self.vcf.location()
                )));
            }
            for block in blocks {
                offset += block.compressed_size as u64;
                text.extend_from_slice(&block.data);
            }
            if header_complete(&text) {
                break;
            }
        }

        let header_len = header_length(&text);
        String::from_utf8(text[..header_len].to_vec()).map_err(|_| SourceError::InvalidUtf8("VCF header"))
    }

    /// Stream the data lines of `contig` overlapping `[start, end)` (0-based)
    ///
    /// A record overlaps when its span (`[POS-1, POS-1+len(REF))`, or up
    /// to INFO `END`) intersects the query. Lines whose coordinates cannot be read are passed through so
    /// that the caller's parser reports them. Lines arrive in file order;
    /// an error from `on_line` stops the query.
    pub async fn query_lines<F, E>(
        &self,
        contig: &str,
        start: u64,
        end: u64,
        mut on_line: F,
    ) -> Result<(), E>
    where
        F: FnMut(&str) -> Result<(), E>,
        E: From<SourceError>,
    {
        let index = self.index().await?;
        let chunks = index.query(contig, start, end);
        debug!(
            "{}:{}-{} -> {} chunks in {}",
            contig,
            start,
            end,
            chunks.len(),
            self.vcf.location()
        );

        for chunk in chunks {
            let data = self.read_chunk(&chunk).await?;
            for raw in data.split(|&b| b == b'\n') {
                let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
                if raw.is_empty() || raw[0] == b'#' {
                    continue;
                }
                let line = std::str::from_utf8(raw).map_err(|_| SourceError::InvalidUtf8("VCF line"))?;
                if line_overlaps(raw, contig, start, end) {
                    on_line(line)?;
                }
            }
        }

        Ok(())
    }

    /// Inflated bytes between the chunk's virtual offsets
    async fn read_chunk(&self, chunk: &Chunk) -> SourceResult<Vec<u8>> {
        let first = chunk.start.block_address();
        let last = chunk.end.block_address();
        let bytes = self
            .vcf
            .read_range(first, last + MAX_BLOCK_SIZE as u64)
            .await?;

        let mut data = Vec::new();
        for block in bgzf::read_blocks(&bytes, first)? {
            if block.address > last {
                break;
            }
            let from = if block.address == first {
                chunk.start.within_block().min(block.data.len())
            } else {
                0
            };
            let to = if block.address == last {
                chunk.end.within_block().min(block.data.len())
            } else {
                block.data.len()
            };
            if from < to {
                data.extend_from_slice(&block.data[from..to]);
            }
        }
        Ok(data)
    }
}

/// True once a complete line not starting with `#` has been seen
fn header_complete(text: &[u8]) -> bool {
    // the last piece may be an unfinished line
    let complete = memchr::memchr_iter(b'\n', text).count();
    text.split(|&b| b == b'\n')
        .take(complete)
        .any(|line| !line.is_empty() && line[0] != b'#')
}

/// Byte length of the leading `#` lines
fn header_length(text: &[u8]) -> usize {
    let mut len = 0;
    for line in text.split_inclusive(|&b| b == b'\n') {
        if line.first() != Some(&b'#') {
            break;
        }
        len += line.len();
    }
    len
}

/// Coordinate check on the CHROM, POS, REF and INFO `END` columns
fn line_overlaps(line: &[u8], contig: &str, start: u64, end: u64) -> bool {
    let mut columns = line.splitn(9, |&b| b == b'\t');
    let (Some(chrom), Some(pos), Some(_id), Some(ref_allele)) =
        (columns.next(), columns.next(), columns.next(), columns.next())
    else {
        return true;
    };
    if chrom != contig.as_bytes() {
        return false;
    }
    let Some(pos) = std::str::from_utf8(pos).ok().and_then(|p| p.parse::<u64>().ok()) else {
        return true;
    };
    let beg = pos.saturating_sub(1);
    let mut stop = beg + ref_allele.len().max(1) as u64;
    // ALT, QUAL, FILTER, then INFO
    if let Some(sv_end) = columns
        .nth(3)
        .and_then(|info| std::str::from_utf8(info).ok())
        .and_then(info_end)
    {
        stop = stop.max(sv_end);
    }
    beg < end && stop > start
}
