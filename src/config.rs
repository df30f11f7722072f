use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "chipcount";
const CONFIG_FILE: &str = "config.json";

/// Frame acceptance policy applied after matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Drop every pair of a frame that still has an unmatched chip count
    #[default]
    Strict,
    /// Keep matched pairs regardless of leftover chip counts
    Lenient,
}

/// How strictly a token must look like a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NameStrictness {
    Lenient,
    #[default]
    Standard,
    /// Also requires a leading letter and only letters, spaces, `-`, `'` or `.`
    Strict,
}

impl NameStrictness {
    /// Minimum fraction of letters among the name's characters
    pub fn letter_ratio(&self) -> f64 {
        match self {
            NameStrictness::Lenient => 0.5,
            NameStrictness::Standard => 0.6,
            NameStrictness::Strict => 0.7,
        }
    }
}

/// Combines the name and chip confidences of a matched pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum ConfidenceFusion {
    #[default]
    Mean,
    Min,
    Weighted { name_weight: f64 },
}

impl ConfidenceFusion {
    pub fn fuse(&self, name_confidence: f64, chip_confidence: f64) -> f64 {
        match *self {
            ConfidenceFusion::Mean => (name_confidence + chip_confidence) / 2.0,
            ConfidenceFusion::Min => name_confidence.min(chip_confidence),
            ConfidenceFusion::Weighted { name_weight } => {
                let w = name_weight.clamp(0.0, 1.0);
                w * name_confidence + (1.0 - w) * chip_confidence
            }
        }
    }
}

/// Which extractor produces the matched pairs of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    #[default]
    Heuristic,
    Llm,
}

/// Reconciliation thresholds and policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Tokens below this OCR confidence are noise
    pub min_confidence: f64,
    /// Largest horizontal name/chip distance that can still pair
    pub x_threshold_px: f64,
    /// Largest vertical name/chip distance that can still pair (inclusive)
    pub y_threshold_px: f64,
    pub x_weight: f64,
    pub y_weight: f64,
    pub validation_policy: ValidationPolicy,
    /// Frames whose total deviates by this much or more are invalid
    pub consistency_tolerance: u64,
    pub name_strictness: NameStrictness,
    /// Overrides the strictness profile's letter ratio
    pub name_letter_ratio: Option<f64>,
    pub min_name_len: usize,
    pub fold_diacritics: bool,
    /// Optional plausibility band for chip values
    pub min_chips: Option<u64>,
    pub max_chips: Option<u64>,
    pub confidence_fusion: ConfidenceFusion,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            x_threshold_px: 100.0,
            y_threshold_px: 80.0,
            x_weight: 1.0,
            y_weight: 2.0,
            validation_policy: ValidationPolicy::Strict,
            consistency_tolerance: 1_000_000,
            name_strictness: NameStrictness::Standard,
            name_letter_ratio: None,
            min_name_len: 2,
            fold_diacritics: false,
            min_chips: None,
            max_chips: None,
            confidence_fusion: ConfidenceFusion::Mean,
        }
    }
}

impl ReconcileConfig {
    /// Letter ratio in effect (override first, then the strictness profile)
    pub fn letter_ratio(&self) -> f64 {
        self.name_letter_ratio
            .unwrap_or_else(|| self.name_strictness.letter_ratio())
    }
}

/// Settings for the hosted language-model extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Confidence assigned to every pair this extractor returns
    pub confidence: f64,
    /// Minimum delay between two requests
    pub request_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
            max_tokens: 500,
            temperature: 0.1,
            confidence: 0.85,
            request_delay_ms: 500,
        }
    }
}

/// Batch execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames reconciled (and appended to the output) per step
    pub chunk_size: usize,
    /// Reconcile the frames of a chunk on the rayon pool
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub reconcile: ReconcileConfig,
    pub extractor: ExtractorKind,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    /// Replaces the embedded blacklist/garbage tables
    pub rules_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `path`, or from the platform config directory.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !config_path.exists() {
            tracing::debug!(
                "No config at {}, using defaults",
                config_path.display()
            );
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::LoadFailed {
            path: config_path.display().to_string(),
            source: Box::new(e),
        })?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: config_path.display().to_string(),
                source: Box::new(e),
            })?;
        config.validate()?;

        tracing::info!("Loaded config from: {}", config_path.display());
        Ok(config)
    }

    /// Save configuration to `path` (pretty JSON), creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    ConfigError::DirectoryCreationFailed {
                        path: parent.display().to_string(),
                        source: e,
                    }
                })?;
            }
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;
        fs::write(path, json).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;

        Ok(())
    }

    /// `<config_dir>/chipcount/config.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::app_dir()?.join(CONFIG_FILE))
    }

    /// `<config_dir>/chipcount`
    pub fn app_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Reject values no reconciliation run can work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.reconcile;
        if !(0.0..=1.0).contains(&r.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "min_confidence must be within [0, 1], got {}",
                r.min_confidence
            )));
        }
        if r.x_threshold_px < 0.0 || r.y_threshold_px < 0.0 {
            return Err(ConfigError::Invalid(
                "distance thresholds must not be negative".to_string(),
            ));
        }
        if r.x_weight < 0.0 || r.y_weight < 0.0 {
            return Err(ConfigError::Invalid(
                "distance weights must not be negative".to_string(),
            ));
        }
        if r.y_weight <= r.x_weight {
            return Err(ConfigError::Invalid(format!(
                "y_weight ({}) must exceed x_weight ({}) so vertical alignment is preferred",
                r.y_weight, r.x_weight
            )));
        }
        if let Some(ratio) = r.name_letter_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ConfigError::Invalid(format!(
                    "name_letter_ratio must be within [0, 1], got {}",
                    ratio
                )));
            }
        }
        if let (Some(min), Some(max)) = (r.min_chips, r.max_chips) {
            if min > max {
                return Err(ConfigError::Invalid(format!(
                    "min_chips ({}) exceeds max_chips ({})",
                    min, max
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.llm.confidence) {
            return Err(ConfigError::Invalid(format!(
                "llm.confidence must be within [0, 1], got {}",
                self.llm.confidence
            )));
        }
        if self.pipeline.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.reconcile.min_confidence, 0.5);
        assert_eq!(config.reconcile.x_threshold_px, 100.0);
        assert_eq!(config.reconcile.y_threshold_px, 80.0);
        assert_eq!(config.reconcile.x_weight, 1.0);
        assert_eq!(config.reconcile.y_weight, 2.0);
        assert_eq!(config.reconcile.validation_policy, ValidationPolicy::Strict);
        assert_eq!(config.reconcile.consistency_tolerance, 1_000_000);
        assert_eq!(config.extractor, ExtractorKind::Heuristic);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{"reconcile": {"validation_policy": "lenient", "y_threshold_px": 60}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.reconcile.validation_policy, ValidationPolicy::Lenient);
        assert_eq!(config.reconcile.y_threshold_px, 60.0);
        assert_eq!(config.reconcile.x_threshold_px, 100.0);
        assert_eq!(config.pipeline.chunk_size, 64);
    }

    #[test]
    fn test_confidence_fusion() {
        assert!((ConfidenceFusion::Mean.fuse(0.9, 0.85) - 0.875).abs() < 1e-9);
        assert_eq!(ConfidenceFusion::Min.fuse(0.9, 0.6), 0.6);
        let weighted = ConfidenceFusion::Weighted { name_weight: 0.25 };
        assert!((weighted.fuse(1.0, 0.0) - 0.25).abs() < 1e-9);

        let json = r#"{"method": "weighted", "name_weight": 0.7}"#;
        let parsed: ConfidenceFusion = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, ConfidenceFusion::Weighted { name_weight: 0.7 });
    }

    #[test]
    fn test_letter_ratio_profiles() {
        let mut config = ReconcileConfig::default();
        assert_eq!(config.letter_ratio(), 0.6);
        config.name_strictness = NameStrictness::Strict;
        assert_eq!(config.letter_ratio(), 0.7);
        config.name_letter_ratio = Some(0.55);
        assert_eq!(config.letter_ratio(), 0.55);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.reconcile.min_confidence = 1.5;
        assert!(config.validate().is_err(), "min_confidence above 1 is invalid");

        let mut config = Config::default();
        config.reconcile.x_weight = 2.0;
        config.reconcile.y_weight = 2.0;
        assert!(config.validate().is_err(), "y_weight must exceed x_weight");

        let mut config = Config::default();
        config.reconcile.x_weight = 3.0;
        config.reconcile.y_weight = 1.0;
        assert!(config.validate().is_err(), "horizontal bias is invalid");

        let mut config = Config::default();
        config.pipeline.chunk_size = 0;
        assert!(config.validate().is_err(), "chunk_size 0 is invalid");

        let mut config = Config::default();
        config.reconcile.min_chips = Some(10);
        config.reconcile.max_chips = Some(5);
        assert!(config.validate().is_err(), "inverted chip band is invalid");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.reconcile.validation_policy = ValidationPolicy::Lenient;
        config.extractor = ExtractorKind::Llm;
        config.save(&path).expect("save should succeed");

        let loaded = Config::load(Some(&path)).expect("load should succeed");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(loaded, Config::default());
    }
}
