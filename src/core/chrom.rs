//! Genome coordinate index
//!
//! Maps between absolute genome positions (all chromosomes laid end to end,
//! in chrom-sizes order) and chromosome-relative positions.
//!
//! Chromosome-relative positions are 1-based: a chromosome of length `n`
//! covers positions `1..=n`, and position `p` of a chromosome starting at
//! absolute offset `o` has absolute position `o + p`.

use crate::core::error::{CoordinateError, CoordinateResult};
use crate::core::io::{self, ByteSource};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

/// One chromosome in the coordinate index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromEntry {
    /// Position of the chromosome in chrom-sizes order
    pub id: usize,
    /// Chromosome name as written in the sizes file
    pub name: String,
    /// Chromosome length in bases
    pub length: u64,
    /// Absolute position at which this chromosome starts
    pub offset: u64,
}

impl ChromEntry {
    /// Absolute position one past the end of this chromosome
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Result of an absolute → chromosome lookup
///
/// `offset` is zero for positions inside the genome. Positions before the
/// genome start are clamped to position 1 of the first chromosome with a
/// negative offset; positions past the end are clamped to the last base of
/// the last chromosome with a positive offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromPosition {
    pub chrom: String,
    pub pos: i64,
    pub offset: i64,
    pub index: usize,
}

/// A chromosome-relative fetch window produced by [`ChromInfo::split_range`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromWindow {
    /// Index of the chromosome in the coordinate index
    pub index: usize,
    /// Chromosome name
    pub chrom: String,
    /// Absolute start of the chromosome
    pub chrom_offset: u64,
    /// Window start, chromosome-relative (0-based, inclusive)
    pub start: u64,
    /// Window end, chromosome-relative (exclusive)
    pub end: u64,
}

/// Absolute ⇄ per-chromosome coordinate index built from a chrom-sizes list
#[derive(Debug, Clone)]
pub struct ChromInfo {
    entries: Vec<ChromEntry>,
    by_name: HashMap<String, usize>,
    total_length: u64,
}

impl ChromInfo {
    /// Build the index from `(name, length)` pairs in genome order
    pub fn from_sizes<I, S>(sizes: I) -> CoordinateResult<Self>
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut entries = Vec::new();
        let mut by_name = HashMap::new();
        let mut total_length = 0u64;

        for (line, (name, length)) in sizes.into_iter().enumerate() {
            let name = name.into();
            if length == 0 {
                return Err(CoordinateError::Format {
                    line: line + 1,
                    message: format!("chromosome '{}' has zero length", name),
                });
            }
            if by_name.contains_key(&name) {
                return Err(CoordinateError::Format {
                    line: line + 1,
                    message: format!("duplicate chromosome '{}'", name),
                });
            }

            let id = entries.len();
            by_name.insert(name.clone(), id);
            entries.push(ChromEntry {
                id,
                name,
                length,
                offset: total_length,
            });
            total_length += length;
        }

        if entries.is_empty() {
            return Err(CoordinateError::Format {
                line: 0,
                message: "no chromosomes found".to_string(),
            });
        }

        Ok(Self {
            entries,
            by_name,
            total_length,
        })
    }

    /// Parse tab-separated `name<TAB>length` rows
    ///
    /// Blank lines and `#` comments are skipped, extra columns are ignored.
    pub fn from_reader<R: BufRead>(reader: R) -> CoordinateResult<Self> {
        let mut sizes = Vec::new();
        let mut line_numbers = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line_number = idx + 1;
            let line = line?;
            let trimmed = line.trim_end_matches('\r');
            if trimmed.trim().is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let mut fields = trimmed.split('\t');
            let name = fields.next().unwrap_or("").trim();
            let length = fields.next().map(str::trim).ok_or_else(|| CoordinateError::Format {
                line: line_number,
                message: format!("expected 2 tab-separated columns, got '{}'", trimmed),
            })?;
            if name.is_empty() {
                return Err(CoordinateError::Format {
                    line: line_number,
                    message: "empty chromosome name".to_string(),
                });
            }
            let length = length.parse::<u64>().map_err(|_| CoordinateError::Format {
                line: line_number,
                message: format!("invalid length '{}' for chromosome '{}'", length, name),
            })?;

            sizes.push((name.to_string(), length));
            line_numbers.push(line_number);
        }

        // Report validation failures against file line numbers, not row numbers
        Self::from_sizes(sizes).map_err(|e| match e {
            CoordinateError::Format { line, message } if line > 0 => CoordinateError::Format {
                line: line_numbers[line - 1],
                message,
            },
            other => other,
        })
    }

    /// Parse a chrom-sizes document held in memory (plain or gzip/bzip2)
    pub fn from_bytes(data: &[u8]) -> CoordinateResult<Self> {
        Self::from_reader(io::text_reader_from_bytes(data))
    }

    /// Load a local chrom-sizes file
    ///
    /// Automatically handles gzip and bzip2 compression.
    pub fn from_path<P: AsRef<Path>>(path: P) -> CoordinateResult<Self> {
        Self::from_reader(io::open_text_reader(path.as_ref())?)
    }

    /// Load chrom sizes from a location string (`http(s)://` URL or local path)
    pub async fn load(location: &str, client: &reqwest::Client) -> crate::core::Result<Self> {
        if io::is_remote(location) {
            let data = ByteSource::http(client.clone(), location).read_all().await?;
            Ok(Self::from_bytes(&data)?)
        } else {
            Ok(Self::from_path(io::local_path(location))?)
        }
    }

    /// Sum of all chromosome lengths
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Number of chromosomes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a successfully built index
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Chromosomes in genome order
    pub fn entries(&self) -> &[ChromEntry] {
        &self.entries
    }

    /// Look up a chromosome by name
    pub fn get(&self, chrom: &str) -> Option<&ChromEntry> {
        self.by_name.get(chrom).map(|&idx| &self.entries[idx])
    }

    /// Convert a chromosome-relative position to an absolute position
    ///
    /// # Example
    /// ```
    /// use vcf_tiler::core::ChromInfo;
    ///
    /// let info = ChromInfo::from_sizes(vec![("chr1", 1000), ("chr2", 500)]).unwrap();
    /// assert_eq!(info.chr_to_abs("chr2", 10).unwrap(), 1010);
    /// assert!(info.chr_to_abs("chrX", 10).is_err());
    /// ```
    pub fn chr_to_abs(&self, chrom: &str, pos: u64) -> CoordinateResult<u64> {
        self.get(chrom)
            .map(|entry| entry.offset + pos)
            .ok_or_else(|| CoordinateError::UnknownChromosome(chrom.to_string()))
    }

    /// Convert an absolute position to a chromosome-relative position
    ///
    /// Uses a left bisection over chromosome offsets. Out-of-genome
    /// positions are clamped and the excess is reported in `offset`.
    ///
    /// # Example
    /// ```
    /// use vcf_tiler::core::ChromInfo;
    ///
    /// let info = ChromInfo::from_sizes(vec![("chr1", 1000), ("chr2", 500)]).unwrap();
    /// let p = info.abs_to_chr(1010);
    /// assert_eq!((p.chrom.as_str(), p.pos, p.offset, p.index), ("chr2", 10, 0, 1));
    /// ```
    pub fn abs_to_chr(&self, abs: i64) -> ChromPosition {
        let insert = self.entries.partition_point(|e| (e.offset as i64) < abs);
        let index = insert.saturating_sub(1);
        let entry = &self.entries[index];

        let mut pos = abs - entry.offset as i64;
        let mut offset = 0;

        if pos < 0 {
            // before the start of the genome
            offset = pos - 1;
            pos = 1;
        }

        let length = entry.length as i64;
        if index == self.entries.len() - 1 && pos > length {
            // beyond the last chromosome
            offset = pos - length;
            pos = length;
        }

        ChromPosition {
            chrom: entry.name.clone(),
            pos,
            offset,
            index,
        }
    }

    /// Split the absolute interval `[min_x, max_x)` into per-chromosome windows
    ///
    /// Walks chromosomes in order starting from the one containing `min_x`.
    /// A window reaching past a chromosome end is clipped and the walk
    /// continues into the next chromosome. Empty windows are dropped.
    pub fn split_range(&self, min_x: f64, max_x: f64) -> Vec<ChromWindow> {
        let mut windows = Vec::new();
        let mut min_x = min_x;

        for entry in &self.entries {
            let chrom_start = entry.offset as f64;
            let chrom_end = entry.end() as f64;

            if !(chrom_start <= min_x && min_x < chrom_end) {
                continue;
            }

            let start = (min_x - chrom_start).floor() as u64;
            if max_x > chrom_end {
                // runs past this chromosome: take the rest of it and move on
                push_window(&mut windows, entry, start, entry.length);
                min_x = chrom_end;
            } else {
                let end = ((max_x - chrom_start).ceil() as u64).min(entry.length);
                push_window(&mut windows, entry, start, end);
                break;
            }
        }

        windows
    }
}

fn push_window(windows: &mut Vec<ChromWindow>, entry: &ChromEntry, start: u64, end: u64) {
    if end > start {
        windows.push(ChromWindow {
            index: entry.id,
            chrom: entry.name.clone(),
            chrom_offset: entry.offset,
            start,
            end,
        });
    }
}
