//! Hosted language-model extractor.
//!
//! Sends the frame's tokens to an OpenAI-compatible chat completions
//! endpoint and parses the JSON array of `{"name", "chips"}` it returns.
//! Every pair gets the same configured confidence. The model is told to
//! leave out anything it cannot pair, so no unmatched chips are reported.

use super::FrameExtractor;
use crate::config::{LlmConfig, ReconcileConfig};
use crate::error::ExtractorError;
use crate::models::{MatchedPair, OcrToken};
use crate::names::clean_name;
use crate::reconcile::{normalize_in_range, Extraction};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

const SYSTEM_PROMPT: &str = "You are a specialized poker broadcast data extractor. \
You only output valid JSON arrays containing player data.";

const INSTRUCTIONS: &str = r#"You are analyzing OCR data from a poker broadcast screenshot. Extract player names and their chip counts.

Player names are usually in capitals and at least 2 letters long (e.g. "VU", "NEGREANU").
Ignore broadcast UI terms such as "BLINDS", "ANTE", "BB", "SB".
Chip counts are numbers with separators ("1,234,000") or abbreviated ("1.2M" = 1,200,000), never zero.
Names and their chip counts are vertically aligned, usually within 80 pixels.

Return ONLY a JSON array:
[{"name": "PLAYER_NAME", "chips": CHIP_COUNT}, ...]

Leave out any name you cannot confidently pair with a chip count.
If any chip count is left without a name, return an empty array."#;

/// Token as presented to the model
#[derive(Debug, Serialize)]
struct PromptToken<'a> {
    text: &'a str,
    confidence: f64,
    x: f64,
    y: f64,
}

/// Chat completions response (only the fields we read)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One entry of the array the model returns
#[derive(Debug, Deserialize)]
struct RawPlayer {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    chips: Value,
}

/// How a model reply becomes pairs
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyRules {
    /// Assigned to every returned pair
    pub confidence: f64,
    pub fold_diacritics: bool,
    pub min_chips: Option<u64>,
    pub max_chips: Option<u64>,
}

impl ReplyRules {
    pub fn new(llm: &LlmConfig, reconcile: &ReconcileConfig) -> Self {
        Self {
            confidence: llm.confidence,
            fold_diacritics: reconcile.fold_diacritics,
            min_chips: reconcile.min_chips,
            max_chips: reconcile.max_chips,
        }
    }

    fn in_range(&self, value: u64) -> bool {
        !(self.min_chips.is_some_and(|m| value < m) || self.max_chips.is_some_and(|m| value > m))
    }
}

pub struct LlmExtractor {
    agent: ureq::Agent,
    config: LlmConfig,
    api_key: String,
    reply: ReplyRules,
    /// Start of the previous request, shared by every worker
    last_request: Mutex<Option<Instant>>,
}

impl LlmExtractor {
    /// Read the API key from the configured environment variable
    pub fn new(config: &LlmConfig, reconcile: &ReconcileConfig) -> Result<Self, ExtractorError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ExtractorError::MissingApiKey(config.api_key_env.clone()))?;
        Ok(Self::with_api_key(config, reconcile, api_key))
    }

    pub fn with_api_key(config: &LlmConfig, reconcile: &ReconcileConfig, api_key: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self {
            agent,
            config: config.clone(),
            api_key,
            reply: ReplyRules::new(config, reconcile),
            last_request: Mutex::new(None),
        }
    }

    /// Hold back until `request_delay_ms` has passed since the previous request
    fn throttle(&self) {
        let delay = Duration::from_millis(self.config.request_delay_ms);
        let mut last = self.last_request.lock();
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < delay {
                std::thread::sleep(delay - elapsed);
            }
        }
        *last = Some(Instant::now());
    }

    fn request(&self, tokens: &[OcrToken]) -> Result<String, ExtractorError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(tokens)},
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        self.throttle();
        let response = match self
            .agent
            .post(&self.config.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json")
            .send_json(body)
        {
            Ok(resp) => resp,
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                return Err(ExtractorError::Status { status, body });
            }
            Err(e) => {
                return Err(ExtractorError::RequestFailed {
                    endpoint: self.config.endpoint.clone(),
                    source: Box::new(e),
                })
            }
        };

        let parsed: ChatResponse = response
            .into_json()
            .map_err(|e| ExtractorError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ExtractorError::MalformedResponse("no message content".to_string()))
    }
}

impl FrameExtractor for LlmExtractor {
    fn extract(&self, tokens: &[OcrToken]) -> Result<Extraction, ExtractorError> {
        let content = self.request(tokens)?;
        let pairs = parse_players(&content, &self.reply)?;
        tracing::debug!("Model returned {} pair(s)", pairs.len());
        Ok(Extraction::new(pairs, Vec::new()))
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

/// User prompt: instructions followed by the tokens as pretty JSON
pub fn build_prompt(tokens: &[OcrToken]) -> String {
    let listed: Vec<PromptToken> = tokens
        .iter()
        .map(|t| PromptToken {
            text: t.text.trim(),
            confidence: t.confidence,
            x: t.x,
            y: t.y,
        })
        .collect();
    // Serializing plain strings and floats cannot fail
    let json = serde_json::to_string_pretty(&listed).unwrap_or_else(|_| "[]".to_string());
    format!("{}\n\nOCR data (text, confidence, x, y):\n{}", INSTRUCTIONS, json)
}

/// Parse the model's reply into pairs.
///
/// Only the text between the first `[` and the last `]` is read; a reply
/// without an array yields no pairs. Entries without a usable name or a
/// positive chip count inside the configured band are dropped.
pub fn parse_players(content: &str, rules: &ReplyRules) -> Result<Vec<MatchedPair>, ExtractorError> {
    let (Some(start), Some(end)) = (content.find('['), content.rfind(']')) else {
        return Ok(Vec::new());
    };
    if end < start {
        return Ok(Vec::new());
    }

    let raw: Vec<RawPlayer> = serde_json::from_str(&content[start..=end])
        .map_err(|e| ExtractorError::MalformedResponse(e.to_string()))?;

    let pairs = raw
        .into_iter()
        .filter_map(|player| {
            let name = clean_name(player.name.as_deref()?, rules.fold_diacritics);
            let chips = coerce_chips(&player.chips, rules)?;
            if name.is_empty() {
                return None;
            }
            Some(MatchedPair {
                name,
                chips,
                confidence: rules.confidence,
            })
        })
        .collect();

    Ok(pairs)
}

/// Chip count from a JSON number or a chip-notation string, inside the band
fn coerce_chips(value: &Value, rules: &ReplyRules) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 1.0).map(|f| f as u64))
            .filter(|&v| v > 0 && rules.in_range(v)),
        Value::String(s) => normalize_in_range(s, rules.min_chips, rules.max_chips).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(confidence: f64) -> ReplyRules {
        ReplyRules {
            confidence,
            fold_diacritics: false,
            min_chips: None,
            max_chips: None,
        }
    }

    #[test]
    fn test_prompt_lists_tokens() {
        let prompt = build_prompt(&[OcrToken::new(" NEGREANU ", 50.0, 10.0, 0.9)]);
        assert!(prompt.contains("\"text\": \"NEGREANU\""));
        assert!(prompt.contains("\"x\": 50.0"));
        assert!(prompt.starts_with("You are analyzing"));
    }

    #[test]
    fn test_parse_players_from_wrapped_reply() {
        let reply = "Here you go:\n```json\n[{\"name\": \"NEGREANU\", \"chips\": 1200000}, {\"name\": \"VU\", \"chips\": \"2.5M\"}]\n```";
        let pairs = parse_players(reply, &rules(0.85)).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].name, "NEGREANU");
        assert_eq!(pairs[0].chips, 1_200_000);
        assert_eq!(pairs[1].chips, 2_500_000);
        assert!(pairs.iter().all(|p| p.confidence == 0.85));
    }

    #[test]
    fn test_parse_players_drops_unusable_entries() {
        let reply = r#"[{"name": "A", "chips": 0}, {"name": "  ", "chips": 5}, {"chips": 7}, {"name": "OK", "chips": -3}, {"name": "FINE", "chips": 1500.7}]"#;
        let pairs = parse_players(reply, &rules(0.9)).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].name, "FINE");
        assert_eq!(pairs[0].chips, 1_500);
    }

    #[test]
    fn test_parse_players_without_array() {
        assert!(parse_players("I could not find any players.", &rules(0.85)).unwrap().is_empty());
        assert!(parse_players("] nothing [", &rules(0.85)).unwrap().is_empty());
        assert!(parse_players("[]", &rules(0.85)).unwrap().is_empty());
    }

    #[test]
    fn test_parse_players_malformed_array() {
        let result = parse_players("[{\"name\": \"VU\", \"chips\": }]", &rules(0.85));
        assert!(matches!(result, Err(ExtractorError::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_players_respects_chip_band() {
        let band = ReplyRules {
            min_chips: Some(1_000),
            max_chips: Some(100_000_000),
            ..rules(0.85)
        };
        let reply = r#"[
            {"name": "HUGE", "chips": 5000000000},
            {"name": "HUGE_TEXT", "chips": "5B"},
            {"name": "TINY", "chips": 500},
            {"name": "TINY_TEXT", "chips": "500"},
            {"name": "NEGREANU", "chips": "1.2M"},
            {"name": "VU", "chips": 2500000}
        ]"#;
        let pairs = parse_players(reply, &band).unwrap();
        let names: Vec<&str> = pairs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["NEGREANU", "VU"], "Counts outside the band are dropped");
        assert_eq!(pairs[0].chips, 1_200_000);

        let unbounded = parse_players(reply, &rules(0.85)).unwrap();
        assert_eq!(unbounded.len(), 6, "Without a band every positive count is kept");
    }

    #[test]
    fn test_rules_follow_config() {
        let llm = LlmConfig::default();
        let mut reconcile = ReconcileConfig::default();
        reconcile.max_chips = Some(10_000);
        reconcile.fold_diacritics = true;
        let rules = ReplyRules::new(&llm, &reconcile);
        assert_eq!(rules.confidence, llm.confidence);
        assert_eq!(rules.max_chips, Some(10_000));
        assert!(rules.fold_diacritics);
    }

    #[test]
    fn test_throttle_spaces_requests() {
        let config = LlmConfig {
            request_delay_ms: 30,
            ..LlmConfig::default()
        };
        let extractor = LlmExtractor::with_api_key(&config, &ReconcileConfig::default(), "test".to_string());
        let start = Instant::now();
        extractor.throttle();
        extractor.throttle();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
