use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::MessageId;

/// Routing and correlation metadata carried by every packet.
///
/// Field names on the wire follow the peer process (`MsgId`, `Target`,
/// `Action`, `Ack`). Missing fields decode to their defaults, so an object
/// without a header decodes to a packet with the invalid id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Correlation id, assigned by the client when the request is sent.
    #[serde(rename = "MsgId", default)]
    pub message_id: MessageId,

    /// Business-logic handler the packet is addressed to.
    #[serde(rename = "Target", default)]
    pub target: String,

    /// Operation the handler should perform.
    #[serde(rename = "Action", default)]
    pub action: String,

    /// Set only on a genuine response to a request.
    #[serde(rename = "Ack", default)]
    pub ack: bool,
}

/// Unit of the structured request/response protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    // ---
    /// Packet header.
    #[serde(rename = "Header", default)]
    pub header: Header,

    /// Opaque application payload, base64 on the wire.
    #[serde(rename = "Data", default, with = "base64_data")]
    pub data: Bytes,
}

impl Packet {
    // ---
    /// Build a request packet for `target`/`action`.
    ///
    /// The message id is left unset; the client assigns it on send.
    pub fn request(target: impl Into<String>, action: impl Into<String>, data: impl Into<Bytes>) -> Self {
        // ---
        Self {
            header: Header {
                message_id: MessageId::INVALID,
                target: target.into(),
                action: action.into(),
                ack: false,
            },
            data: data.into(),
        }
    }

    /// Build the response to this packet.
    ///
    /// The response keeps the request header (and therefore its message id)
    /// and sets `ack`.
    pub fn respond_with(&self, data: impl Into<Bytes>) -> Self {
        // ---
        let mut header = self.header.clone();
        header.ack = true;
        Self {
            header,
            data: data.into(),
        }
    }

    /// Message id from the header.
    pub fn message_id(&self) -> MessageId {
        self.header.message_id
    }
}

mod base64_data {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        if data.is_empty() {
            serializer.serialize_none()
        } else {
            serializer.serialize_str(&STANDARD.encode(data))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        match encoded {
            None => Ok(Bytes::new()),
            Some(text) => STANDARD
                .decode(text.as_bytes())
                .map(Bytes::from)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_wire_field_names() {
        // ---
        let mut packet = Packet::request("echo", "ping", "hi");
        packet.header.message_id = MessageId::new(3);

        let value = serde_json::to_value(&packet).unwrap();
        assert_eq!(value["Header"]["MsgId"], 3);
        assert_eq!(value["Header"]["Target"], "echo");
        assert_eq!(value["Header"]["Action"], "ping");
        assert_eq!(value["Header"]["Ack"], false);
        assert_eq!(value["Data"], "aGk=");
    }

    #[test]
    fn test_decodes_peer_packet() {
        // ---
        let raw = br#"{"Header":{"MsgId":9,"Target":"mixer","Action":"Start","Ack":true},"Data":"cG9uZw=="}"#;
        let packet: Packet = serde_json::from_slice(raw).unwrap();

        assert_eq!(packet.message_id(), MessageId::new(9));
        assert_eq!(packet.header.target, "mixer");
        assert!(packet.header.ack);
        assert_eq!(packet.data, Bytes::from_static(b"pong"));
    }

    #[test]
    fn test_null_and_missing_data_are_empty() {
        // ---
        let with_null: Packet =
            serde_json::from_str(r#"{"Header":{"MsgId":1},"Data":null}"#).unwrap();
        assert!(with_null.data.is_empty());

        let without: Packet = serde_json::from_str(r#"{"Header":{"MsgId":1}}"#).unwrap();
        assert!(without.data.is_empty());
        assert_eq!(without.header.target, "");
    }

    #[test]
    fn test_empty_object_has_invalid_id() {
        // ---
        let packet: Packet = serde_json::from_str("{}").unwrap();
        assert!(!packet.message_id().is_valid());
    }

    #[test]
    fn test_respond_with_keeps_header_and_acks() {
        // ---
        let mut request = Packet::request("echo", "ping", "hi");
        request.header.message_id = MessageId::new(12);

        let response = request.respond_with("pong");
        assert_eq!(response.message_id(), MessageId::new(12));
        assert_eq!(response.header.target, "echo");
        assert_eq!(response.header.action, "ping");
        assert!(response.header.ack);
        assert_eq!(response.data, Bytes::from_static(b"pong"));
    }
}
