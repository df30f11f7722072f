//! Reconcile noisy broadcast OCR tokens into per-frame player chip counts.
//!
//! Per frame: classify tokens, normalize chip values, pair names with chip
//! counts by position, accept or drop the frame. Per batch: infer the
//! expected total chips in play and flag frames that deviate from it.

pub mod config;
pub mod consistency;
pub mod error;
pub mod extractor;
pub mod models;
pub mod names;
pub mod pipeline;
pub mod reconcile;
pub mod summary;

pub use config::{Config, ReconcileConfig, ValidationPolicy};
pub use error::{AppResult, ConfigError, ExtractorError, ParseError, RulesError};
pub use extractor::{build_extractor, FrameExtractor};
pub use models::{FrameInput, FrameResult, MatchedPair, OcrToken};
pub use pipeline::{BatchReport, Pipeline};
