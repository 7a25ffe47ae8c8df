/// === WIRE PROTOCOL ===
///
/// Frames exchanged with clients over the WebSocket. Inbound frames are
/// internally tagged JSON objects; outbound frames are either the `lang_ack`
/// reply or an untagged delivery record.
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One decoded inbound event from a client.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum InboundEvent {
    /// `{"type": "set_lang", "lang": "<code>"}` — missing lang defaults to "en".
    #[serde(rename = "set_lang")]
    SetLang {
        #[serde(default = "default_lang")]
        lang: String,
    },

    /// `{"type": "message", "text": "<string>", "translate": <bool>}` —
    /// missing text defaults to "", missing translate defaults to true.
    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        text: String,
        #[serde(default = "default_translate")]
        translate: bool,
    },
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_translate() -> bool {
    true
}

/// Result of classifying one raw text frame.
#[derive(Debug)]
pub enum Decoded {
    /// A recognized event to dispatch.
    Event(InboundEvent),
    /// Valid JSON that is not a recognized event; skipped silently.
    Ignored,
}

/// Classify a raw text frame.
///
/// Unknown event types and JSON of the wrong shape are `Ignored`; input that
/// is not JSON at all is an `Err`, which is fatal for the connection.
pub fn decode_event(raw: &str) -> Result<Decoded, serde_json::Error> {
    match serde_json::from_str::<InboundEvent>(raw) {
        Ok(event) => Ok(Decoded::Event(event)),
        Err(e) => match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(_) => Ok(Decoded::Ignored),
            Err(_) => Err(e),
        },
    }
}

/// One frame queued for delivery to a single connection. The session task
/// that owns the socket drains these in order, so writes never interleave.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// Point-to-point acknowledgement of a `set_lang` event.
    LangAck(LangAck),
    /// One receiver's translated copy of a broadcast message.
    Delivery(DeliveryRecord),
    /// Internal control: write a WebSocket Close and tear the session down.
    Close,
}

impl OutboundFrame {
    /// Serialize to the wire, or `None` for control frames that carry no JSON.
    pub fn to_json(&self) -> Option<String> {
        match self {
            OutboundFrame::LangAck(ack) => serde_json::to_string(ack).ok(),
            OutboundFrame::Delivery(record) => serde_json::to_string(record).ok(),
            OutboundFrame::Close => None,
        }
    }
}

/// `{"type": "lang_ack", "lang": "<code>"}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LangAck {
    #[serde(rename = "type")]
    pub kind: String,
    pub lang: String,
}

impl LangAck {
    pub fn new(lang: &str) -> Self {
        Self {
            kind: "lang_ack".to_string(),
            lang: lang.to_string(),
        }
    }
}

/// One receiver's copy of a broadcast message plus timing metadata.
/// Produced once per (message, receiver) pair and never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryRecord {
    pub sender: String,
    pub original: String,
    pub translated: String,
    pub target_lang: String,
    /// Translation latency in milliseconds, rounded to 2 decimal places.
    pub latency: f64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

/// Round a millisecond measurement to 2 decimal places.
pub fn round2(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
