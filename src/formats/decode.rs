//! Variant decoding
//!
//! Turns one VCF data line into one [`VariantRecord`] per ALT allele, with
//! INFO values selected for that allele and coerced to the types declared in
//! the dataset options.

use crate::engine::options::{DatasetOptions, Transform};
use crate::formats::vcf::{info_end, InfoNumber, InfoType, VcfHeader, VcfParseError, VcfRecordView};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Declared type of an INFO field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int,
    Float,
    #[default]
    String,
    /// `|`-separated list of strings
    StringList,
}

/// A decoded field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Coerce a raw INFO value
    ///
    /// `.`, `NA`, empty and unparseable values become `Null` (an empty list
    /// for `StringList`).
    ///
    /// # Example
    /// ```
    /// use vcf_tiler::formats::decode::{FieldType, FieldValue};
    ///
    /// assert_eq!(FieldValue::coerce(Some("3"), FieldType::Int), FieldValue::Int(3));
    /// assert_eq!(FieldValue::coerce(Some("NA"), FieldType::Float), FieldValue::Null);
    /// assert_eq!(
    ///     FieldValue::coerce(Some("a|b"), FieldType::StringList),
    ///     FieldValue::List(vec!["a".into(), "b".into()])
    /// );
    /// ```
    pub fn coerce(raw: Option<&str>, ty: FieldType) -> FieldValue {
        let raw = raw.map(str::trim).filter(|v| !is_missing(v));
        match (raw, ty) {
            (None, FieldType::StringList) => FieldValue::List(Vec::new()),
            (None, _) => FieldValue::Null,
            (Some(v), FieldType::Int) => v.parse().map(FieldValue::Int).unwrap_or(FieldValue::Null),
            (Some(v), FieldType::Float) => match v.parse::<f64>() {
                Ok(f) if f.is_finite() => FieldValue::Float(f),
                _ => FieldValue::Null,
            },
            (Some(v), FieldType::String) => FieldValue::Str(v.to_string()),
            (Some(v), FieldType::StringList) => FieldValue::List(
                v.split('|')
                    .filter(|s| !is_missing(s))
                    .map(str::to_string)
                    .collect(),
            ),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Numeric view of `Int` and `Float`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    fn from_f64(value: Option<f64>) -> FieldValue {
        value
            .filter(|v| v.is_finite())
            .map(FieldValue::Float)
            .unwrap_or(FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "NA"),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Str(s) => write!(f, "{}", s),
            FieldValue::List(items) => write!(f, "{}", items.join("|")),
        }
    }
}

fn is_missing(value: &str) -> bool {
    value.is_empty() || value == "." || value == "NA"
}

/// Variant category, from REF and ALT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VariantCategory {
    #[serde(rename = "SNV")]
    Snv,
    #[serde(rename = "MNV")]
    Mnv,
    #[serde(rename = "insertion")]
    Insertion,
    #[serde(rename = "deletion")]
    Deletion,
    #[serde(rename = "symbolic")]
    Symbolic,
}

impl VariantCategory {
    pub fn classify(ref_allele: &str, alt: &str) -> Self {
        if alt.starts_with('<') || alt.contains('[') || alt.contains(']') || alt == "*" {
            return VariantCategory::Symbolic;
        }
        match alt.len().cmp(&ref_allele.len()) {
            std::cmp::Ordering::Equal if alt.len() == 1 => VariantCategory::Snv,
            std::cmp::Ordering::Equal => VariantCategory::Mnv,
            std::cmp::Ordering::Greater => VariantCategory::Insertion,
            std::cmp::Ordering::Less => VariantCategory::Deletion,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VariantCategory::Snv => "SNV",
            VariantCategory::Mnv => "MNV",
            VariantCategory::Insertion => "insertion",
            VariantCategory::Deletion => "deletion",
            VariantCategory::Symbolic => "symbolic",
        }
    }
}

/// Record attributes that INFO and derived fields may not be named after
///
/// Fields are flattened into the same JSON object, and filters resolve
/// these names to the record columns first.
pub const RESERVED_FIELD_NAMES: [&str; 12] = [
    "id",
    "chrName",
    "chrom",
    "multiresChrName",
    "chrOffset",
    "pos",
    "from",
    "to",
    "ref",
    "alt",
    "vcfId",
    "category",
];

/// One ALT allele of a VCF line, positioned on the absolute genome axis
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantRecord {
    /// `chrom:pos:ref:alt`
    pub id: String,
    #[serde(rename = "chrName")]
    pub chrom: String,
    #[serde(rename = "multiresChrName")]
    pub multires_chrom: String,
    #[serde(rename = "chrOffset")]
    pub chrom_offset: u64,
    /// 1-based chromosome position
    pub pos: u64,
    /// Absolute start, `chrom_offset + pos`
    pub from: u64,
    /// `from + len(REF)`, or `chrom_offset + END` for longer structural
    /// variants
    pub to: u64,
    #[serde(rename = "ref")]
    pub ref_allele: String,
    pub alt: String,
    pub vcf_id: Option<String>,
    pub category: VariantCategory,
    /// Declared INFO fields and derived fields
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

static NULL: FieldValue = FieldValue::Null;

impl VariantRecord {
    /// Declared or derived field, `Null` when absent
    pub fn field(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&NULL)
    }

    /// Any filterable attribute: record columns first, then fields
    pub fn value(&self, name: &str) -> Cow<'_, FieldValue> {
        let owned = match name {
            "id" => FieldValue::Str(self.id.clone()),
            "chrName" | "chrom" => FieldValue::Str(self.chrom.clone()),
            "ref" => FieldValue::Str(self.ref_allele.clone()),
            "alt" => FieldValue::Str(self.alt.clone()),
            "category" => FieldValue::Str(self.category.as_str().to_string()),
            "pos" => FieldValue::Int(self.pos as i64),
            "from" => FieldValue::Int(self.from as i64),
            "to" => FieldValue::Int(self.to as i64),
            "vcfId" => self
                .vcf_id
                .clone()
                .map(FieldValue::Str)
                .unwrap_or(FieldValue::Null),
            _ => return Cow::Borrowed(self.field(name)),
        };
        Cow::Owned(owned)
    }
}

impl AsRef<VariantRecord> for VariantRecord {
    fn as_ref(&self) -> &VariantRecord {
        self
    }
}

/// Decoding error
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Parse(#[from] VcfParseError),

    #[error("INFO field {field} at {chrom}:{pos} has {found} values for {expected} alleles")]
    AlleleMismatch {
        field: String,
        chrom: String,
        pos: u64,
        expected: usize,
        found: usize,
    },
}

/// How an INFO value maps onto ALT alleles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    /// `Number=A`: value `i` belongs to ALT `i`
    PerAllele,
    /// `Number=R`: value `0` is REF, value `i+1` belongs to ALT `i`
    PerAlleleWithRef,
    /// `Number=1` or flag: shared by every ALT
    Broadcast,
    /// Anything else: a single value is shared, several are per allele
    Auto,
}

impl Arity {
    fn from_header(header: &VcfHeader, name: &str) -> Self {
        match header.info_definition(name) {
            Some(def) if def.ty == InfoType::Flag => Arity::Broadcast,
            Some(def) => match def.number {
                InfoNumber::A => Arity::PerAllele,
                InfoNumber::R => Arity::PerAlleleWithRef,
                InfoNumber::Count(0) | InfoNumber::Count(1) => Arity::Broadcast,
                _ => Arity::Auto,
            },
            None => Arity::Auto,
        }
    }
}

#[derive(Debug, Clone)]
struct FieldSpec {
    name: String,
    ty: FieldType,
    arity: Arity,
}

#[derive(Debug, Clone)]
struct SourceSpec {
    name: String,
    arity: Arity,
}

#[derive(Debug, Clone)]
enum DerivedKind {
    Delta {
        case: SourceSpec,
        control: SourceSpec,
        abs: bool,
    },
    NegLog10(SourceSpec),
}

#[derive(Debug, Clone)]
struct DerivedSpec {
    name: String,
    kind: DerivedKind,
}

/// Decodes VCF lines of one dataset
#[derive(Debug, Clone)]
pub struct VariantDecoder {
    fields: Vec<FieldSpec>,
    derived: Vec<DerivedSpec>,
}

impl VariantDecoder {
    pub fn new(header: &VcfHeader, options: &DatasetOptions) -> Self {
        let source = |name: &str| SourceSpec {
            name: name.to_string(),
            arity: Arity::from_header(header, name),
        };

        let fields = options
            .info_fields
            .iter()
            .map(|field| FieldSpec {
                name: field.name.clone(),
                ty: field.ty,
                arity: Arity::from_header(header, &field.name),
            })
            .collect();

        let derived = options
            .derived_fields
            .iter()
            .map(|field| DerivedSpec {
                name: field.name.clone(),
                kind: match &field.transform {
                    Transform::DeltaAf { case, control } => DerivedKind::Delta {
                        case: source(case.as_str()),
                        control: source(control.as_str()),
                        abs: false,
                    },
                    Transform::AbsDeltaAf { case, control } => DerivedKind::Delta {
                        case: source(case.as_str()),
                        control: source(control.as_str()),
                        abs: true,
                    },
                    Transform::NegLog10 { source: name } => {
                        DerivedKind::NegLog10(source(name.as_str()))
                    }
                },
            })
            .collect();

        Self { fields, derived }
    }

    /// Decode one data line into one record per ALT allele
    ///
    /// `chrom` is the plain chromosome name; `multires_chrom` the contig the
    /// line was fetched from. A `.` ALT yields no records.
    pub fn decode_line(
        &self,
        line: &str,
        chrom: &str,
        multires_chrom: &str,
        chrom_offset: u64,
    ) -> Result<Vec<VariantRecord>, DecodeError> {
        let view = VcfRecordView::parse(line.as_bytes())?;
        let ref_allele = view.ref_allele()?;
        let alts = view.alt_alleles()?;
        let info = view.info_map()?;
        let vcf_id = view.id().filter(|id| !is_missing(id)).map(str::to_string);

        let line_ctx = LineContext {
            info: &info,
            chrom,
            pos: view.pos,
            n_alt: alts.len(),
        };

        let from = chrom_offset + view.pos;
        let to = match info_end(view.info()?) {
            Some(end) => (from + ref_allele.len() as u64).max(chrom_offset + end),
            None => from + ref_allele.len() as u64,
        };

        let mut records = Vec::with_capacity(alts.len());
        for (i, alt) in alts.iter().enumerate() {
            let mut fields = BTreeMap::new();

            for spec in &self.fields {
                let raw = line_ctx.allele_value(&spec.name, spec.arity, i)?;
                fields.insert(spec.name.clone(), FieldValue::coerce(raw, spec.ty));
            }

            for spec in &self.derived {
                let value = match &spec.kind {
                    DerivedKind::Delta { case, control, abs } => {
                        let case = line_ctx.allele_f64(case, i)?;
                        // a missing control frequency counts as 0
                        let control = line_ctx.allele_f64(control, i)?.unwrap_or(0.0);
                        let delta = case.map(|c| c - control);
                        if *abs {
                            delta.map(f64::abs)
                        } else {
                            delta
                        }
                    }
                    DerivedKind::NegLog10(source) => line_ctx
                        .allele_f64(source, i)?
                        .map(|v| if v > 0.0 { -v.log10() } else { 0.0 }),
                };
                fields.insert(spec.name.clone(), FieldValue::from_f64(value));
            }

            records.push(VariantRecord {
                id: format!("{}:{}:{}:{}", chrom, view.pos, ref_allele, alt),
                chrom: chrom.to_string(),
                multires_chrom: multires_chrom.to_string(),
                chrom_offset,
                pos: view.pos,
                from,
                to,
                ref_allele: ref_allele.to_string(),
                alt: alt.to_string(),
                vcf_id: vcf_id.clone(),
                category: VariantCategory::classify(ref_allele, alt),
                fields,
            });
        }

        Ok(records)
    }
}

struct LineContext<'a> {
    info: &'a HashMap<&'a str, Option<&'a str>>,
    chrom: &'a str,
    pos: u64,
    n_alt: usize,
}

impl<'a> LineContext<'a> {
    /// Raw value of `name` for ALT `i`; `None` when absent or missing
    fn allele_value(&self, name: &str, arity: Arity, i: usize) -> Result<Option<&'a str>, DecodeError> {
        let value = match self.info.get(name) {
            None => return Ok(None),
            // flag present
            Some(None) => return Ok(Some("1")),
            Some(Some(v)) if is_missing(v) => return Ok(None),
            Some(Some(v)) => *v,
        };

        let (index, needed) = match arity {
            Arity::Broadcast => return Ok(Some(value)),
            Arity::Auto if !value.contains(',') => return Ok(Some(value)),
            Arity::PerAllele | Arity::Auto => (i, self.n_alt),
            Arity::PerAlleleWithRef => (i + 1, self.n_alt + 1),
        };

        let found = value.split(',').count();
        // declared arities must match exactly; undeclared ones only need enough values
        let exact = !matches!(arity, Arity::Auto);
        if found < needed || (exact && found != needed) {
            return Err(DecodeError::AlleleMismatch {
                field: name.to_string(),
                chrom: self.chrom.to_string(),
                pos: self.pos,
                expected: needed,
                found,
            });
        }
        Ok(value.split(',').nth(index))
    }

    fn allele_f64(&self, source: &SourceSpec, i: usize) -> Result<Option<f64>, DecodeError> {
        let raw = self.allele_value(&source.name, source.arity, i)?;
        Ok(FieldValue::coerce(raw, FieldType::Float).as_f64())
    }
}
