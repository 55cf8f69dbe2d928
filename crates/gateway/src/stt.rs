//! The flux STT client.
//!
//! An outbound WebSocket carrying raw audio up and JSON `TurnInfo` events
//! down. The session configures it from the client's own query parameters;
//! authentication is a bearer token in the connection headers. Connection
//! attempts retry up to three times, 500 ms apart.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

use voxtask_core::SessionError;

const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_BACKOFF_MS: u64 = 500;

pub type SttSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type SttSink = SplitSink<SttSocket, WsMessage>;
pub type SttStream = SplitStream<SttSocket>;

/// STT session parameters, parsed from the client's query string.
#[derive(Debug, Clone, PartialEq)]
pub struct SttConfig {
    pub model: String,
    pub sample_rate: u32,
    pub encoding: String,
    pub eot_threshold: f64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "flux-general-en".into(),
            sample_rate: 16_000,
            encoding: "linear16".into(),
            eot_threshold: 0.9,
        }
    }
}

impl SttConfig {
    /// Parse from a raw query string; missing or malformed parameters fall
    /// back to the defaults.
    pub fn from_query(query: &str) -> Self {
        let mut config = Self::default();
        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key {
                "model" if !value.is_empty() => config.model = value.to_string(),
                "sample_rate" => {
                    if let Ok(rate) = value.parse() {
                        config.sample_rate = rate;
                    }
                }
                "encoding" if !value.is_empty() => config.encoding = value.to_string(),
                "eot_threshold" => {
                    if let Ok(threshold) = value.parse() {
                        config.eot_threshold = threshold;
                    }
                }
                _ => {}
            }
        }
        config
    }

    pub fn to_query(&self) -> String {
        format!(
            "model={}&sample_rate={}&encoding={}&eot_threshold={}",
            self.model, self.sample_rate, self.encoding, self.eot_threshold
        )
    }
}

/// Turn lifecycle events the STT provider reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnEvent {
    StartOfTurn,
    Update,
    EagerEndOfTurn,
    TurnResumed,
    EndOfTurn,
}

/// A `TurnInfo` payload (`data["type"] == "TurnInfo"`).
#[derive(Debug, Clone, Deserialize)]
pub struct TurnInfo {
    pub event: TurnEvent,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub end_of_turn_confidence: Option<f64>,
}

/// Connect to the STT provider, retrying on failure. Returns the split
/// sink (audio up) and stream (events down).
pub async fn connect(
    base_url: &str,
    api_key: &str,
    config: &SttConfig,
) -> Result<(SttSink, SttStream), SessionError> {
    let url = format!("{}?{}", base_url, config.to_query());
    let mut last_error = String::new();

    for attempt in 1..=CONNECT_ATTEMPTS {
        match try_connect(&url, api_key).await {
            Ok(socket) => {
                info!(attempt, "Connected to STT provider");
                let (sink, stream) = socket.split();
                return Ok((sink, stream));
            }
            Err(reason) => {
                warn!(attempt, %reason, "STT connection attempt failed");
                last_error = reason;
                if attempt < CONNECT_ATTEMPTS {
                    tokio::time::sleep(std::time::Duration::from_millis(CONNECT_BACKOFF_MS)).await;
                }
            }
        }
    }

    Err(SessionError::SttConnectFailed {
        attempts: CONNECT_ATTEMPTS,
        reason: last_error,
    })
}

async fn try_connect(url: &str, api_key: &str) -> Result<SttSocket, String> {
    let mut request = url
        .into_client_request()
        .map_err(|e| format!("invalid STT url: {e}"))?;
    let auth = HeaderValue::from_str(&format!("Token {api_key}"))
        .map_err(|e| format!("invalid API key header: {e}"))?;
    request.headers_mut().insert("Authorization", auth);

    let (socket, _response) = connect_async(request).await.map_err(|e| e.to_string())?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_parsing_with_defaults() {
        let config = SttConfig::from_query("");
        assert_eq!(config, SttConfig::default());

        let config = SttConfig::from_query("model=flux-general-en&sample_rate=8000&eot_threshold=0.7");
        assert_eq!(config.sample_rate, 8000);
        assert!((config.eot_threshold - 0.7).abs() < 1e-9);
        assert_eq!(config.encoding, "linear16");
    }

    #[test]
    fn malformed_values_fall_back() {
        let config = SttConfig::from_query("sample_rate=fast&eot_threshold=high&junk");
        assert_eq!(config.sample_rate, 16_000);
        assert!((config.eot_threshold - 0.9).abs() < 1e-9);
    }

    #[test]
    fn query_roundtrip() {
        let config = SttConfig::default();
        assert_eq!(SttConfig::from_query(&config.to_query()), config);
    }

    #[test]
    fn turn_info_deserialization() {
        let info: TurnInfo = serde_json::from_str(
            r#"{"event":"EndOfTurn","transcript":"add a task","end_of_turn_confidence":0.97}"#,
        )
        .unwrap();
        assert_eq!(info.event, TurnEvent::EndOfTurn);
        assert_eq!(info.transcript, "add a task");
        assert!(info.end_of_turn_confidence.unwrap() > 0.9);
    }

    #[test]
    fn turn_info_tolerates_missing_fields() {
        let info: TurnInfo = serde_json::from_str(r#"{"event":"StartOfTurn"}"#).unwrap();
        assert_eq!(info.event, TurnEvent::StartOfTurn);
        assert!(info.transcript.is_empty());
    }

    #[test]
    fn unknown_turn_event_rejected() {
        assert!(serde_json::from_str::<TurnInfo>(r#"{"event":"MidTurn"}"#).is_err());
    }
}
