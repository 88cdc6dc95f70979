
//! # Variant annotation libraries
//!
//! These libraries contain the pieces needed to annotate a cohort of
//! tumor/normal VCF files with vcf2maf and VEP.
//! The annotation tools themselves are external programs, here we only
//! prepare their inputs, call them and collect their results into one MAF
//! per VCF file.
//!
//! The code is split into :
//!  - common: folders, file listing, splitting and the error type
//!  - meta: metadata table and the per-sample identifiers
//!  - hts_lib_based: functions specific for htslib derived input
//!  - annotator: tool configurations and the annotation routine
//!

/// folders, file listing, splitting and errors
pub mod lib {
    pub mod common;
    /// metadata table and identifiers
    pub mod meta;
    /// functions specific for htslib derived input
    pub mod hts_lib_based;
    /// vcf2maf + VEP orchestration
    pub mod annotator;
}
