use crate::core::errors::ExchangeError;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

/// Codec trait for turning raw WebSocket frames into typed messages
///
/// Control frames (ping, pong, close) never reach a codec; the transport
/// handles them.
pub trait WsCodec: Send + Sync + 'static {
    /// The type representing parsed messages
    type Message: Send + Sync;

    /// Decode a raw WebSocket message into a typed message
    ///
    /// # Returns
    /// - `Ok(Some(message))` - Successfully decoded message
    /// - `Ok(None)` - Message was ignored/filtered by codec
    /// - `Err(ExchangeError::ProtocolError)` - The frame could not be parsed
    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ExchangeError>;
}

/// Parse a text or binary frame as JSON.
///
/// Shared by the concrete codecs; `Ok(None)` for frame kinds that carry no data.
pub fn decode_json_frame(message: Message) -> Result<Option<Value>, ExchangeError> {
    let text = match message {
        Message::Text(text) => text,
        Message::Binary(data) => String::from_utf8(data).map_err(|e| {
            ExchangeError::ProtocolError(format!("Invalid UTF-8 in binary message: {}", e))
        })?,
        _ => return Ok(None),
    };

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| ExchangeError::ProtocolError(format!("Failed to parse JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_frame() {
        let value = decode_json_frame(Message::Text(r#"{"id":1}"#.to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(value["id"], 1);
    }

    #[test]
    fn test_decode_binary_frame() {
        let value = decode_json_frame(Message::Binary(br#"{"u":5}"#.to_vec()))
            .unwrap()
            .unwrap();
        assert_eq!(value["u"], 5);
    }

    #[test]
    fn test_malformed_frame_is_protocol_error() {
        let result = decode_json_frame(Message::Text("{not json".to_string()));
        assert!(matches!(result, Err(ExchangeError::ProtocolError(_))));
    }

    #[test]
    fn test_frame_without_data_is_ignored() {
        assert!(decode_json_frame(Message::Pong(vec![])).unwrap().is_none());
    }
}
