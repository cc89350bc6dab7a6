//! Data cleaning module for normalizing values.
//!
//! This module provides functionality for:
//! - Correcting known misspellings and label casing (built-in dictionary)
//! - Whitespace, punctuation-spacing and camel-case repairs in free text
//! - Clustering near-duplicate categorical labels into canonical forms
//!
//! Both normalizers return a new dataset and leave their input untouched.

pub mod dictionary;
mod labels;
mod text;

pub use labels::{
    LABEL_UNIQUE_RATIO, LabelGroup, LabelNormalizer, MAX_LABEL_CLASSES, ZERO_SHOT_MIN_CONFIDENCE,
    build_normalization_map, cluster_labels, is_label_column,
};
pub use text::{
    TEXT_MIN_CHARS, TEXT_SAMPLE_ROWS, TextNormalizer, collapse_whitespace, is_text_column,
    normalize_text, repair_punctuation, split_camel_case,
};
