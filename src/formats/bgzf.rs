//! BGZF block codec
//!
//! A BGZF file is a series of gzip members, each carrying a `BC` extra
//! subfield with the member's total size. Members hold at most 64 KiB of
//! uncompressed data, so any byte range of the compressed file starting at
//! a block boundary can be inflated on its own.
//!
//! Block layout:
//! - `1f 8b 08 04` gzip magic, deflate, FEXTRA
//! - MTIME, XFL, OS (6 bytes)
//! - XLEN (u16), then subfields; `BC` with SLEN=2 carries BSIZE = size - 1
//! - raw deflate payload
//! - CRC32 (u32) and ISIZE (u32) of the uncompressed data

use crate::core::error::{SourceError, SourceResult};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use std::io::{self, Read, Write};

/// Largest possible compressed block
pub const MAX_BLOCK_SIZE: usize = 64 * 1024;

/// Uncompressed bytes per block written by [`BgzfWriter`]
pub const BLOCK_DATA_SIZE: usize = 0xff00;

/// Fixed header bytes before the extra subfields
const HEADER_SIZE: usize = 12;

/// CRC32 + ISIZE
const FOOTER_SIZE: usize = 8;

/// Empty block marking the end of a BGZF file
pub const EOF_MARKER: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02, 0x00,
    0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// One inflated block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgzfBlock {
    /// Offset of the block in the compressed file
    pub address: u64,
    /// Compressed size of the block
    pub compressed_size: usize,
    /// Uncompressed content
    pub data: Vec<u8>,
}

/// True if `data` starts with a BGZF block header
pub fn is_bgzf(data: &[u8]) -> bool {
    matches!(block_size(data), Ok(Some(_)))
}

/// Total size of the block starting at `data[0]`
///
/// Returns `Ok(None)` when `data` is too short to hold the header.
pub fn block_size(data: &[u8]) -> SourceResult<Option<usize>> {
    if data.len() < HEADER_SIZE {
        return Ok(None);
    }
    if data[0] != 0x1f || data[1] != 0x8b || data[2] != 8 {
        return Err(SourceError::Bgzf(format!(
            "invalid gzip magic {:02x} {:02x}",
            data[0], data[1]
        )));
    }
    if data[3] & 0x04 == 0 {
        return Err(SourceError::Bgzf("gzip member without extra field".to_string()));
    }

    let xlen = u16::from_le_bytes([data[10], data[11]]) as usize;
    let extra_end = HEADER_SIZE + xlen;
    if data.len() < extra_end {
        return Ok(None);
    }

    let mut pos = HEADER_SIZE;
    while pos + 4 <= extra_end {
        let slen = u16::from_le_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if data[pos] == b'B' && data[pos + 1] == b'C' && slen == 2 && pos + 6 <= extra_end {
            let bsize = u16::from_le_bytes([data[pos + 4], data[pos + 5]]) as usize;
            return Ok(Some(bsize + 1));
        }
        pos += 4 + slen;
    }

    Err(SourceError::Bgzf("missing BC subfield".to_string()))
}

/// Inflate a single complete block and verify its CRC32 and ISIZE
pub fn decode_block(block: &[u8]) -> SourceResult<Vec<u8>> {
    let size = block_size(block)?
        .ok_or_else(|| SourceError::Bgzf("truncated block header".to_string()))?;
    if block.len() < size {
        return Err(SourceError::Bgzf(format!(
            "truncated block: expected {} bytes, got {}",
            size,
            block.len()
        )));
    }

    let xlen = u16::from_le_bytes([block[10], block[11]]) as usize;
    let payload_start = HEADER_SIZE + xlen;
    if size < payload_start + FOOTER_SIZE {
        return Err(SourceError::Bgzf(format!("block size {} too small", size)));
    }
    let payload = &block[payload_start..size - FOOTER_SIZE];
    let footer = &block[size - FOOTER_SIZE..size];
    let expected_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let expected_len = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]) as usize;

    let mut data = Vec::with_capacity(expected_len);
    DeflateDecoder::new(payload)
        .read_to_end(&mut data)
        .map_err(|e| SourceError::Bgzf(format!("inflate failed: {}", e)))?;

    if data.len() != expected_len {
        return Err(SourceError::Bgzf(format!(
            "ISIZE mismatch: header says {}, inflated {}",
            expected_len,
            data.len()
        )));
    }
    let mut crc = Crc::new();
    crc.update(&data);
    if crc.sum() != expected_crc {
        return Err(SourceError::Bgzf("CRC32 mismatch".to_string()));
    }

    Ok(data)
}

/// Inflate every complete block in `data`
///
/// `base` is the file offset of `data[0]`, which must be a block boundary.
/// A trailing partial block is ignored so that range reads may overshoot
/// the last block they need.
pub fn read_blocks(data: &[u8], base: u64) -> SourceResult<Vec<BgzfBlock>> {
    let mut blocks = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let size = match block_size(&data[pos..])? {
            Some(size) if pos + size <= data.len() => size,
            _ => break,
        };
        blocks.push(BgzfBlock {
            address: base + pos as u64,
            compressed_size: size,
            data: decode_block(&data[pos..pos + size])?,
        });
        pos += size;
    }

    Ok(blocks)
}

/// Inflate a whole BGZF file
pub fn decompress(data: &[u8]) -> SourceResult<Vec<u8>> {
    let blocks = read_blocks(data, 0)?;
    let consumed: usize = blocks.iter().map(|b| b.compressed_size).sum();
    if consumed != data.len() {
        return Err(SourceError::Bgzf(format!(
            "trailing {} bytes after last complete block",
            data.len() - consumed
        )));
    }
    Ok(blocks.into_iter().flat_map(|b| b.data).collect())
}

/// Compress one block
fn encode_block(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut deflate = DeflateEncoder::new(Vec::new(), Compression::default());
    deflate.write_all(data)?;
    let deflated = deflate.finish()?;

    let mut crc = Crc::new();
    crc.update(data);

    let total = HEADER_SIZE + 6 + deflated.len() + FOOTER_SIZE;
    if total > MAX_BLOCK_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "compressed block exceeds 64 KiB",
        ));
    }

    let mut block = Vec::with_capacity(total);
    block.extend_from_slice(&[0x1f, 0x8b, 8, 4, 0, 0, 0, 0, 0, 0xff]);
    block.extend_from_slice(&6u16.to_le_bytes());
    block.extend_from_slice(&[b'B', b'C']);
    block.extend_from_slice(&2u16.to_le_bytes());
    block.extend_from_slice(&((total - 1) as u16).to_le_bytes());
    block.extend_from_slice(&deflated);
    block.extend_from_slice(&crc.sum().to_le_bytes());
    block.extend_from_slice(&(data.len() as u32).to_le_bytes());
    Ok(block)
}

/// Streaming BGZF writer
///
/// Tracks the virtual offset of the next byte written, which is what a
/// tabix index records for each line.
pub struct BgzfWriter<W: Write> {
    inner: W,
    buffer: Vec<u8>,
    /// Compressed bytes written so far
    compressed_offset: u64,
}

impl<W: Write> BgzfWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(BLOCK_DATA_SIZE),
            compressed_offset: 0,
        }
    }

    /// Virtual offset (`block address << 16 | offset in block`) of the next byte
    pub fn virtual_offset(&self) -> u64 {
        (self.compressed_offset << 16) | self.buffer.len() as u64
    }

    fn flush_block(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let block = encode_block(&self.buffer)?;
        self.inner.write_all(&block)?;
        self.compressed_offset += block.len() as u64;
        self.buffer.clear();
        Ok(())
    }

    /// Flush pending data, append the EOF marker and return the inner writer
    pub fn finish(mut self) -> io::Result<W> {
        self.flush_block()?;
        self.inner.write_all(&EOF_MARKER)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for BgzfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut remaining = buf;
        while !remaining.is_empty() {
            let space = BLOCK_DATA_SIZE - self.buffer.len();
            let take = remaining.len().min(space);
            self.buffer.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];
            if self.buffer.len() >= BLOCK_DATA_SIZE {
                self.flush_block()?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_block()?;
        self.inner.flush()
    }
}

/// Compress `data` into a complete BGZF file
pub fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut writer = BgzfWriter::new(Vec::new());
    writer.write_all(data)?;
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eof_marker_is_empty_block() {
        assert_eq!(block_size(&EOF_MARKER).unwrap(), Some(28));
        assert!(decode_block(&EOF_MARKER).unwrap().is_empty());
    }

    #[test]
    fn test_round_trip_multiple_blocks() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let compressed = compress(&data).unwrap();
        assert!(is_bgzf(&compressed));

        let blocks = read_blocks(&compressed, 0).unwrap();
        // 4 data blocks + EOF
        assert_eq!(blocks.len(), 5);
        assert_eq!(blocks[0].address, 0);
        assert_eq!(blocks[1].address, blocks[0].compressed_size as u64);
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_output_is_valid_gzip() {
        let compressed = compress(b"chr1\t100\n").unwrap();
        let mut text = String::new();
        flate2::read::MultiGzDecoder::new(&compressed[..])
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "chr1\t100\n");
    }

    #[test]
    fn test_partial_trailing_block_is_skipped() {
        let compressed = compress(b"hello").unwrap();
        let cut = &compressed[..compressed.len() - 10];
        let blocks = read_blocks(cut, 0).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].data, b"hello");
        assert!(decompress(cut).is_err());
    }

    #[test]
    fn test_corruption_detected() {
        let mut compressed = compress(b"some text to corrupt").unwrap();
        let size = block_size(&compressed).unwrap().unwrap();
        compressed[size - 8] ^= 0xff;
        assert!(matches!(decode_block(&compressed), Err(SourceError::Bgzf(_))));

        assert!(matches!(block_size(b"not a gzip stream"), Err(SourceError::Bgzf(_))));
    }

    #[test]
    fn test_plain_gzip_is_rejected() {
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(b"abc").unwrap();
        let gz = gz.finish().unwrap();
        assert!(!is_bgzf(&gz));
    }

    #[test]
    fn test_virtual_offsets() {
        let mut writer = BgzfWriter::new(Vec::new());
        assert_eq!(writer.virtual_offset(), 0);
        writer.write_all(b"abc").unwrap();
        assert_eq!(writer.virtual_offset(), 3);
        writer.flush().unwrap();
        let vo = writer.virtual_offset();
        assert_eq!(vo & 0xffff, 0);
        assert!(vo >> 16 > 0);
    }
}
