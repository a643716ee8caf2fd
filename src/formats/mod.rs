//! File format adapters
//!
//! VCF text, the BGZF block codec, tabix indexes and the option-driven
//! variant decoder.

pub mod bgzf;
pub mod decode;
pub mod tabix;
pub mod vcf;

pub use bgzf::{BgzfBlock, BgzfWriter};
pub use decode::{DecodeError, FieldType, FieldValue, VariantCategory, VariantDecoder, VariantRecord};
pub use tabix::{compress_and_index_vcf, index_bgzf_vcf, TabixVcfSource, TbiIndex, TbiIndexBuilder, VirtualOffset};
pub use vcf::{VcfHeader, VcfParseError, VcfRecord, VcfRecordView};
