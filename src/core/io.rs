//! Byte source abstraction layer
//!
//! Random-access reads over remote files (HTTP range requests), local files
//! (memory mapped) and in-memory buffers, plus compression-aware text readers
//! for small side files such as chromosome sizes.

use crate::core::error::{SourceError, SourceResult};
use bytes::Bytes;
use log::debug;
use memmap2::Mmap;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

/// Default buffer size for BufReader (128KB)
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// True for `http://` and `https://` locations
pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Strip an optional `file://` scheme from a local location
pub fn local_path(location: &str) -> &Path {
    Path::new(location.strip_prefix("file://").unwrap_or(location))
}

/// A random-access byte source
///
/// Reads are byte ranges `[start, end)`. A range running past the end of the
/// underlying data is truncated; a range starting past the end is empty.
#[derive(Debug)]
pub enum ByteSource {
    /// Remote file read with HTTP range requests
    Http(HttpSource),
    /// Local file mapped into memory
    Mapped(MappedSource),
    /// In-memory buffer
    Memory(Bytes),
}

/// Remote file fetched with HTTP range requests
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

/// Memory-mapped local file
#[derive(Debug)]
pub struct MappedSource {
    path: PathBuf,
    // zero-length files cannot be mapped on every platform
    mmap: Option<Mmap>,
}

impl MappedSource {
    /// Map a local file into memory
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path.as_ref())?;
        let mmap = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: We assume the file won't be modified while mapped
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            mmap,
        })
    }

    /// Get the entire file content as a byte slice
    pub fn as_bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

impl ByteSource {
    /// Open a location string: `http(s)://` URLs become HTTP sources,
    /// everything else (optionally `file://`-prefixed) is mapped from disk
    pub fn open(location: &str, client: &reqwest::Client) -> SourceResult<Self> {
        if is_remote(location) {
            Ok(Self::http(client.clone(), location))
        } else {
            Ok(Self::Mapped(MappedSource::open(local_path(location))?))
        }
    }

    /// Create an HTTP source
    pub fn http(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self::Http(HttpSource {
            client,
            url: url.into(),
        })
    }

    /// Create an in-memory source
    pub fn memory(data: impl Into<Bytes>) -> Self {
        Self::Memory(data.into())
    }

    /// Human-readable location, used in error messages and logs
    pub fn location(&self) -> String {
        match self {
            Self::Http(http) => http.url.clone(),
            Self::Mapped(mapped) => mapped.path.display().to_string(),
            Self::Memory(data) => format!("<memory: {} bytes>", data.len()),
        }
    }

    /// Read the byte range `[start, end)`
    pub async fn read_range(&self, start: u64, end: u64) -> SourceResult<Bytes> {
        if start >= end {
            return Ok(Bytes::new());
        }

        match self {
            Self::Http(http) => http.fetch_range(start, end).await,
            Self::Mapped(mapped) => Ok(Bytes::copy_from_slice(slice_range(
                mapped.as_bytes(),
                start,
                end,
            ))),
            Self::Memory(data) => {
                let len = data.len() as u64;
                let s = start.min(len) as usize;
                let e = end.min(len) as usize;
                Ok(data.slice(s..e))
            }
        }
    }

    /// Read the whole source
    pub async fn read_all(&self) -> SourceResult<Bytes> {
        match self {
            Self::Http(http) => http.fetch_all().await,
            Self::Mapped(mapped) => Ok(Bytes::copy_from_slice(mapped.as_bytes())),
            Self::Memory(data) => Ok(data.clone()),
        }
    }
}

impl HttpSource {
    fn network_error(&self, e: reqwest::Error) -> SourceError {
        SourceError::Network {
            url: self.url.clone(),
            message: e.to_string(),
        }
    }

    async fn fetch_range(&self, start: u64, end: u64) -> SourceResult<Bytes> {
        let range_header = format!("bytes={}-{}", start, end - 1);
        debug!("GET {} {}", self.url, range_header);

        let response = self
            .client
            .get(&self.url)
            .header(RANGE, range_header)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                response.bytes().await.map_err(|e| self.network_error(e))
            }
            StatusCode::OK => {
                // Server ignored the range header and sent the whole file
                let body = response.bytes().await.map_err(|e| self.network_error(e))?;
                let len = body.len() as u64;
                Ok(body.slice(start.min(len) as usize..end.min(len) as usize))
            }
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(Bytes::new()),
            status => Err(SourceError::Http {
                status: status.as_u16(),
                url: self.url.clone(),
            }),
        }
    }

    async fn fetch_all(&self) -> SourceResult<Bytes> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }
        response.bytes().await.map_err(|e| self.network_error(e))
    }
}

fn slice_range(data: &[u8], start: u64, end: u64) -> &[u8] {
    let len = data.len() as u64;
    &data[start.min(len) as usize..end.min(len) as usize]
}

/// Compression format of a text side file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// Plain text (uncompressed)
    Plain,
    /// Gzip or BGZF compressed (.gz)
    Gzip,
    /// Bzip2 compressed (.bz2)
    Bzip2,
}

/// Detect compression from leading magic bytes
pub fn detect_compression_bytes(magic: &[u8]) -> CompressionFormat {
    if magic.len() >= 2 && magic[0] == 0x1f && magic[1] == 0x8b {
        CompressionFormat::Gzip
    } else if magic.len() >= 3 && magic[..3] == *b"BZh" {
        CompressionFormat::Bzip2
    } else {
        CompressionFormat::Plain
    }
}

/// Detect compression format from file path and/or content
pub fn detect_compression(path: &Path) -> io::Result<CompressionFormat> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    // First check by extension
    if extension == "gz" || extension == "bgz" {
        return Ok(CompressionFormat::Gzip);
    }
    if extension == "bz2" {
        return Ok(CompressionFormat::Bzip2);
    }

    // Then check by magic bytes
    let mut file = File::open(path)?;
    let mut magic = [0u8; 3];
    let bytes_read = file.read(&mut magic)?;
    Ok(detect_compression_bytes(&magic[..bytes_read]))
}

/// Open a local text file, transparently decompressing gzip/BGZF and bzip2
pub fn open_text_reader(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let format = detect_compression(path)?;
    let file = File::open(path)?;

    Ok(match format {
        CompressionFormat::Gzip => Box::new(BufReader::with_capacity(
            DEFAULT_BUFFER_SIZE,
            flate2::read::MultiGzDecoder::new(file),
        )),
        CompressionFormat::Bzip2 => Box::new(BufReader::with_capacity(
            DEFAULT_BUFFER_SIZE,
            bzip2::read::BzDecoder::new(file),
        )),
        CompressionFormat::Plain => Box::new(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, file)),
    })
}

/// Wrap an in-memory text document, transparently decompressing it
pub fn text_reader_from_bytes(data: &[u8]) -> Box<dyn BufRead + '_> {
    match detect_compression_bytes(data) {
        CompressionFormat::Gzip => {
            Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(data)))
        }
        CompressionFormat::Bzip2 => Box::new(BufReader::new(bzip2::read::BzDecoder::new(data))),
        CompressionFormat::Plain => Box::new(data),
    }
}
