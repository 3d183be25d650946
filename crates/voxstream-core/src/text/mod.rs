//! Text front-end: normalization and segmentation.

pub mod normalize;
pub mod numbers;
pub mod segmenter;

pub use normalize::{clean_text, normalize_text};
pub use segmenter::{segment_text, Segmenter, SegmenterConfig, TextSegment};
