//! Per-cluster alignment: candidate fragments, template selection and scoring.

pub mod bam_template;
pub mod fragment;
pub mod fragment_builder;
pub mod oracle;
pub mod rest_of_genome;
pub mod shadow_aligner;
pub mod template_builder;
pub mod template_length;
