//! VCF text layer
//!
//! Zero-copy data line view, header parsing (INFO definitions, sample
//! names) and the fully parsed [`VcfRecord`] used for single-variant
//! detail lookups.

use memchr::memchr;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Zero-copy VCF record view for parsing
/// Only parses CHROM and POS immediately, other fields are kept as byte slices
pub struct VcfRecordView<'a> {
    /// Original line bytes
    line: &'a [u8],
    /// Chromosome name
    pub chrom: &'a str,
    /// Position (1-based)
    pub pos: u64,
    /// Field boundaries (start, end) for lazy access
    field_bounds: Vec<(usize, usize)>,
}

impl<'a> VcfRecordView<'a> {
    /// Parse a VCF data line
    ///
    /// Requires the 8 fixed columns and a numeric POS. A trailing `\r` is
    /// ignored.
    pub fn parse(line: &'a [u8]) -> Result<Self, VcfParseError> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            return Err(VcfParseError::EmptyLine);
        }

        let mut field_bounds = Vec::with_capacity(10);
        let mut start = 0;
        while let Some(tab) = memchr(b'\t', &line[start..]) {
            field_bounds.push((start, start + tab));
            start += tab + 1;
        }
        field_bounds.push((start, line.len()));

        // CHROM, POS, ID, REF, ALT, QUAL, FILTER, INFO
        if field_bounds.len() < 8 {
            return Err(VcfParseError::TooFewFields {
                expected: 8,
                found: field_bounds.len(),
            });
        }

        let chrom = std::str::from_utf8(&line[field_bounds[0].0..field_bounds[0].1])
            .map_err(|_| VcfParseError::InvalidUtf8("CHROM"))?;

        let pos_str = std::str::from_utf8(&line[field_bounds[1].0..field_bounds[1].1])
            .map_err(|_| VcfParseError::InvalidUtf8("POS"))?;
        let pos: u64 = pos_str
            .parse()
            .map_err(|_| VcfParseError::InvalidNumber("POS", pos_str.to_string()))?;

        Ok(Self {
            line,
            chrom,
            pos,
            field_bounds,
        })
    }

    /// Get the number of fields
    pub fn field_count(&self) -> usize {
        self.field_bounds.len()
    }

    /// Get field as string slice (lazy access)
    pub fn field(&self, index: usize) -> Option<&'a str> {
        self.field_bounds
            .get(index)
            .and_then(|(start, end)| std::str::from_utf8(&self.line[*start..*end]).ok())
    }

    /// Fetch a mandatory column, failing on non UTF-8 content
    fn required(&self, index: usize, name: &'static str) -> Result<&'a str, VcfParseError> {
        self.field(index).ok_or(VcfParseError::InvalidUtf8(name))
    }

    /// Get ID field (field 2)
    pub fn id(&self) -> Option<&'a str> {
        self.field(2)
    }

    /// Get REF field (field 3)
    pub fn ref_allele(&self) -> Result<&'a str, VcfParseError> {
        self.required(3, "REF")
    }

    /// Get ALT field (field 4) as raw text
    pub fn alt_field(&self) -> Result<&'a str, VcfParseError> {
        self.required(4, "ALT")
    }

    /// ALT alleles split on `,`; a `.` ALT yields no alleles
    pub fn alt_alleles(&self) -> Result<Vec<&'a str>, VcfParseError> {
        let alt = self.alt_field()?;
        if alt == "." || alt.is_empty() {
            return Ok(Vec::new());
        }
        Ok(alt.split(',').collect())
    }

    /// Get QUAL field (field 5)
    pub fn qual(&self) -> Option<&'a str> {
        self.field(5)
    }

    /// Get FILTER field (field 6)
    pub fn filter(&self) -> Option<&'a str> {
        self.field(6)
    }

    /// Get INFO field (field 7)
    pub fn info(&self) -> Result<&'a str, VcfParseError> {
        self.required(7, "INFO")
    }

    /// Get FORMAT field (field 8) if present
    pub fn format(&self) -> Option<&'a str> {
        self.field(8)
    }

    /// Get sample fields (fields 9+)
    pub fn samples(&self) -> Vec<&'a str> {
        (9..self.field_count()).filter_map(|i| self.field(i)).collect()
    }

    /// 0-based half-open reference span
    ///
    /// `[POS-1, POS-1+len(REF))`, stretched to INFO `END` when present
    /// (except for `SVTYPE=TRA`).
    pub fn span(&self) -> Result<(u64, u64), VcfParseError> {
        let start = self.pos.saturating_sub(1);
        let end = start + self.ref_allele()?.len().max(1) as u64;
        let end = info_end(self.info()?).map_or(end, |info_end| end.max(info_end));
        Ok((start, end))
    }

    /// Parse INFO into `key -> raw value`
    ///
    /// Flags (keys without `=`) map to `None`.
    pub fn info_map(&self) -> Result<HashMap<&'a str, Option<&'a str>>, VcfParseError> {
        let info = self.info()?;
        let mut map = HashMap::new();
        if info == "." {
            return Ok(map);
        }
        for item in info.split(';').filter(|s| !s.is_empty()) {
            match item.split_once('=') {
                Some((key, value)) => map.insert(key, Some(value)),
                None => map.insert(item, None),
            };
        }
        Ok(map)
    }
}

/// 1-based inclusive `END` of a raw INFO column
///
/// Translocations (`SVTYPE=TRA`) put the mate position in `END`, so they
/// report none.
pub fn info_end(info: &str) -> Option<u64> {
    let mut end = None;
    for item in info.split(';') {
        match item.split_once('=') {
            Some(("END", value)) => end = value.parse().ok(),
            Some(("SVTYPE", "TRA")) => return None,
            _ => {}
        }
    }
    end
}

/// VCF parsing error
#[derive(Debug, thiserror::Error)]
pub enum VcfParseError {
    #[error("Empty line")]
    EmptyLine,

    #[error("Too few fields: expected at least {expected}, found {found}")]
    TooFewFields { expected: usize, found: usize },

    #[error("Invalid UTF-8 in field: {0}")]
    InvalidUtf8(&'static str),

    #[error("Invalid number in field {0}: {1}")]
    InvalidNumber(&'static str, String),

    #[error("Malformed header line: {0}")]
    MalformedHeader(String),
}

/// Declared INFO `Number`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoNumber {
    /// Fixed count
    Count(usize),
    /// One value per ALT allele
    A,
    /// One value per allele, REF included
    R,
    /// One value per genotype
    G,
    /// `.`: unknown or varying
    Unknown,
}

impl InfoNumber {
    fn parse(s: &str) -> Self {
        match s {
            "A" => InfoNumber::A,
            "R" => InfoNumber::R,
            "G" => InfoNumber::G,
            _ => s.parse().map(InfoNumber::Count).unwrap_or(InfoNumber::Unknown),
        }
    }
}

/// Declared INFO `Type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoType {
    Integer,
    Float,
    Flag,
    Character,
    String,
}

impl InfoType {
    fn parse(s: &str) -> Self {
        match s {
            "Integer" => InfoType::Integer,
            "Float" => InfoType::Float,
            "Flag" => InfoType::Flag,
            "Character" => InfoType::Character,
            _ => InfoType::String,
        }
    }
}

/// One `##INFO=<...>` declaration
#[derive(Debug, Clone, PartialEq)]
pub struct InfoDefinition {
    pub id: String,
    pub number: InfoNumber,
    pub ty: InfoType,
    pub description: String,
}

/// Parsed VCF header
#[derive(Debug, Clone, Default)]
pub struct VcfHeader {
    /// Every `##` line, verbatim and in order
    pub meta_lines: Vec<String>,
    /// INFO declarations by ID
    pub info: HashMap<String, InfoDefinition>,
    /// Sample names from the `#CHROM` line
    pub samples: Vec<String>,
}

impl VcfHeader {
    /// Parse header text (`##` meta lines followed by the `#CHROM` line)
    ///
    /// Parsing stops at the first data line.
    ///
    /// # Example
    /// ```
    /// use vcf_tiler::formats::vcf::{InfoNumber, VcfHeader};
    ///
    /// let text = "##fileformat=VCFv4.2\n##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele frequency\">\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n";
    /// let header = VcfHeader::parse(text).unwrap();
    /// assert_eq!(header.info["AF"].number, InfoNumber::A);
    /// assert_eq!(header.samples, vec!["S1"]);
    /// ```
    pub fn parse(text: &str) -> Result<Self, VcfParseError> {
        let mut header = VcfHeader::default();

        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if let Some(meta) = line.strip_prefix("##") {
                if let Some(body) = meta.strip_prefix("INFO=") {
                    let def = parse_info_definition(body)
                        .ok_or_else(|| VcfParseError::MalformedHeader(line.to_string()))?;
                    header.info.insert(def.id.clone(), def);
                }
                header.meta_lines.push(line.to_string());
            } else if line.starts_with("#CHROM") {
                header.samples = line.split('\t').skip(9).map(str::to_string).collect();
            } else if !line.is_empty() {
                break;
            }
        }

        Ok(header)
    }

    /// Look up an INFO declaration
    pub fn info_definition(&self, id: &str) -> Option<&InfoDefinition> {
        self.info.get(id)
    }
}

/// Parse `<ID=..,Number=..,Type=..,Description="..">`
fn parse_info_definition(body: &str) -> Option<InfoDefinition> {
    let inner = body.strip_prefix('<')?.strip_suffix('>')?;
    let attrs = parse_structured_attrs(inner);

    Some(InfoDefinition {
        id: attrs.get("ID")?.clone(),
        number: attrs
            .get("Number")
            .map(|n| InfoNumber::parse(n))
            .unwrap_or(InfoNumber::Unknown),
        ty: attrs
            .get("Type")
            .map(|t| InfoType::parse(t))
            .unwrap_or(InfoType::String),
        description: attrs.get("Description").cloned().unwrap_or_default(),
    })
}

/// Split `key=value` pairs on commas outside double quotes
fn parse_structured_attrs(inner: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut in_quotes = false;

    let mut flush = |key: &mut String, value: &mut String| {
        if !key.is_empty() {
            attrs.insert(std::mem::take(key), std::mem::take(value));
        }
        key.clear();
        value.clear();
    };

    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    value.push(escaped);
                }
            }
            '"' if in_value => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                flush(&mut key, &mut value);
                in_value = false;
            }
            '=' if !in_value => in_value = true,
            _ if in_value => value.push(c),
            _ => key.push(c),
        }
    }
    flush(&mut key, &mut value);

    attrs
}

/// Genotype columns of one sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleCall {
    pub name: String,
    pub values: BTreeMap<String, String>,
}

/// A fully parsed VCF data line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VcfRecord {
    pub chrom: String,
    pub pos: u64,
    pub id: Option<String>,
    #[serde(rename = "ref")]
    pub ref_allele: String,
    pub alt: Vec<String>,
    pub qual: Option<f64>,
    pub filter: Vec<String>,
    /// INFO values split on `,`; flags have no values
    pub info: BTreeMap<String, Vec<String>>,
    pub format: Vec<String>,
    pub samples: Vec<SampleCall>,
}

impl VcfRecord {
    /// Parse a data line, naming sample columns from the header
    pub fn parse(line: &str, header: &VcfHeader) -> Result<Self, VcfParseError> {
        let view = VcfRecordView::parse(line.as_bytes())?;

        let id = view.id().filter(|id| *id != ".").map(str::to_string);
        let qual = view.qual().and_then(|q| q.parse::<f64>().ok());
        let filter = match view.filter() {
            Some(".") | None => Vec::new(),
            Some(f) => f.split(';').map(str::to_string).collect(),
        };

        let info = view
            .info_map()?
            .into_iter()
            .map(|(key, value)| {
                let values = value
                    .map(|v| v.split(',').map(str::to_string).collect())
                    .unwrap_or_default();
                (key.to_string(), values)
            })
            .collect();

        let format: Vec<String> = view
            .format()
            .filter(|f| *f != ".")
            .map(|f| f.split(':').map(str::to_string).collect())
            .unwrap_or_default();

        let samples = view
            .samples()
            .into_iter()
            .enumerate()
            .map(|(i, column)| SampleCall {
                name: header
                    .samples
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("sample{}", i + 1)),
                values: format
                    .iter()
                    .cloned()
                    .zip(column.split(':').map(str::to_string))
                    .collect(),
            })
            .collect();

        Ok(Self {
            chrom: view.chrom.to_string(),
            pos: view.pos,
            id,
            ref_allele: view.ref_allele()?.to_string(),
            alt: view.alt_alleles()?.into_iter().map(str::to_string).collect(),
            qual,
            filter,
            info,
            format,
            samples,
        })
    }
}
