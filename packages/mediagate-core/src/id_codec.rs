//! Opaque id encoding.
//!
//! The production catalog layer mints the opaque `id` path segment with an
//! encoder this crate never sees. [`IdCodec`] models only the decode
//! direction the gateway actually needs, with a reversible base64 stand-in
//! good enough for tests and for deployments that don't supply a real
//! catalog-layer encoder.

use crate::error::GatewayError;
use crate::upstream::types::MessageRef;

/// Decodes the opaque `id` path segment into a `(chat_id, msg_id)` pair.
pub trait IdCodec: Send + Sync {
    fn decode(&self, id: &str) -> Result<MessageRef, GatewayError>;
}

/// Reversible `"{chat_id}:{msg_id}"` base64 codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct Base64IdCodec;

impl Base64IdCodec {
    /// Encodes a `MessageRef`, mainly for building fixtures and tests —
    /// the real encoder lives in the excluded catalog layer.
    pub fn encode(msg: MessageRef) -> String {
        use base64::Engine;
        let raw = format!("{}:{}", msg.chat_id, msg.msg_id);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw)
    }
}

impl IdCodec for Base64IdCodec {
    fn decode(&self, id: &str) -> Result<MessageRef, GatewayError> {
        use base64::Engine;
        let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(id)
            .map_err(|_| GatewayError::InvalidId)?;
        let raw = String::from_utf8(raw).map_err(|_| GatewayError::InvalidId)?;
        let (chat_id, msg_id) = raw.split_once(':').ok_or(GatewayError::InvalidId)?;
        let chat_id: i64 = chat_id.parse().map_err(|_| GatewayError::InvalidId)?;
        let msg_id: i64 = msg_id.parse().map_err(|_| GatewayError::InvalidId)?;
        Ok(MessageRef { chat_id, msg_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let msg = MessageRef {
            chat_id: -1001234567890,
            msg_id: 42,
        };
        let encoded = Base64IdCodec::encode(msg);
        let decoded = Base64IdCodec.decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn garbage_input_is_invalid_id() {
        let err = Base64IdCodec.decode("not valid base64!!").unwrap_err();
        assert!(matches!(err, GatewayError::InvalidId));
    }

    #[test]
    fn missing_separator_is_invalid_id() {
        use base64::Engine;
        let bad = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("no-colon-here");
        let err = Base64IdCodec.decode(&bad).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidId));
    }
}
