//! Format normalization and display labels

pub mod labels;
pub mod normalizer;

pub use labels::{description_excerpt, duration_label, views_label};
pub use normalizer::{normalize_formats, AudioFormat, NormalizedFormats, VideoFormat};
