/// === TRANSLATION PROVIDER ===
///
/// The translation service is an external collaborator behind a synchronous
/// call. It may be slow and it may fail for any reason (network, quota,
/// unsupported language); callers are expected to catch the error and fall
/// back to the original text.
use std::time::Duration;

use ureq::Agent;

/// Errors a provider call can surface. The fan-out engine only logs these
/// and falls back, so a trait object is all that is needed.
pub type TranslateError = Box<dyn std::error::Error + Send + Sync>;

/// The synchronous translation contract: `(text, target_lang) -> text`.
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str, target_lang: &str) -> Result<String, TranslateError>;
}

/// Unofficial Google Translate (GTX) endpoint. No API key required.
const GTX_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// Translator backed by the GTX endpoint through a blocking HTTP client.
pub struct GtxTranslator {
    agent: Agent,
}

impl GtxTranslator {
    /// Build a translator whose requests are abandoned after `timeout`.
    /// A timed-out request surfaces as an ordinary provider failure.
    pub fn new(timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl Translator for GtxTranslator {
    fn translate(&self, text: &str, target_lang: &str) -> Result<String, TranslateError> {
        // The target code is passed through untouched; GTX rejects codes it
        // does not know and that rejection is the caller's fallback signal.
        let url = format!(
            "{}?client=gtx&sl=auto&tl={}&dt=t&q={}",
            GTX_ENDPOINT,
            urlencoding::encode(target_lang),
            urlencoding::encode(text)
        );

        let resp = self
            .agent
            .get(&url)
            .header("User-Agent", "Mozilla/5.0")
            .call()?;

        let json: serde_json::Value = resp.into_body().read_json()?;

        // The body is a nested array; sentence segments live at [0][i][0].
        let sentences = json
            .get(0)
            .and_then(|v| v.as_array())
            .ok_or("unexpected response shape from translation service")?;

        let mut full_text = String::new();
        for sentence_node in sentences {
            if let Some(segment) = sentence_node.get(0).and_then(|s| s.as_str()) {
                full_text.push_str(segment);
            }
        }

        if full_text.is_empty() {
            return Err("empty translation result".into());
        }
        Ok(full_text)
    }
}
