//! Typed request/reply envelopes layered over [`Document`].

use crate::error::ProtoError;
use crate::value::{Document, Value};
use bytes::{Bytes, BytesMut};

/// A decoded wire document, tagged by its `method` field.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope(Document);

impl Envelope {
    pub fn new(method: &str) -> Self {
        let mut doc = Document::new();
        doc.insert("method", method);
        Envelope(doc)
    }

    pub fn from_document(doc: Document) -> Self {
        Envelope(doc)
    }

    pub fn into_document(self) -> Document {
        self.0
    }

    pub fn document(&self) -> &Document {
        &self.0
    }

    pub fn method(&self) -> Result<&str, ProtoError> {
        self.0.get_str("method")
    }

    pub fn channel(&self) -> Option<&str> {
        self.0.get_str_opt("channel")
    }

    pub fn published_at(&self) -> Option<i64> {
        self.0.get_i64("published_at").ok()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key, value);
        self
    }

    /// Build `{method, status:"ERROR", reason}`.
    pub fn error(method: &str, reason: impl Into<String>) -> Self {
        let mut doc = Document::new();
        doc.insert("method", method);
        doc.insert("status", "ERROR");
        doc.insert("reason", reason.into());
        Envelope(doc)
    }

    pub fn is_error(&self) -> bool {
        self.0.get_str_opt("status") == Some("ERROR")
    }

    /// Encode the document directly, with no outer length prefix — for
    /// carrying envelopes over a transport that already frames messages
    /// (e.g. NATS), as opposed to [`crate::EnvelopeCodec`] which is for
    /// raw byte streams.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.0.encode(&mut buf);
        buf.freeze()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtoError> {
        let mut buf = bytes;
        let doc = Document::decode(&mut buf)?;
        Ok(Envelope(doc))
    }
}

/// The fixed set of client→server requests named by the protocol.
///
/// Parsing a `Request` from an `Envelope` only validates the `method` tag
/// and pulls out fields common to dispatch (e.g. `channel`); handler-level
/// field validation (blank messages, missing partner ids, ...) happens in
/// the relay's own request handlers, which still hold the raw `Envelope`.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Authenticate,
    Create,
    GetChannels,
    Unread,
    Join { channel: String },
    Withdrawal { channel: String },
    Attend { channel: String },
    Exit,
    Publish,
    Ack { channel: String, published_at: i64 },
    Ping,
}

impl Request {
    pub fn method_name(&self) -> &'static str {
        match self {
            Request::Authenticate => "authenticate",
            Request::Create => "create",
            Request::GetChannels => "get_channels",
            Request::Unread => "unread",
            Request::Join { .. } => "join",
            Request::Withdrawal { .. } => "withdrawal",
            Request::Attend { .. } => "attend",
            Request::Exit => "exit",
            Request::Publish => "publish",
            Request::Ack { .. } => "ack",
            Request::Ping => "ping",
        }
    }
}

impl TryFrom<&Envelope> for Request {
    type Error = ProtoError;

    fn try_from(env: &Envelope) -> Result<Self, ProtoError> {
        let method = env.method()?;
        let doc = env.document();
        Ok(match method {
            "authenticate" => Request::Authenticate,
            "create" => Request::Create,
            "get_channels" => Request::GetChannels,
            "unread" => Request::Unread,
            "join" => Request::Join {
                channel: doc.get_str("channel")?.to_string(),
            },
            "withdrawal" => Request::Withdrawal {
                channel: doc.get_str("channel")?.to_string(),
            },
            "attend" => Request::Attend {
                channel: doc.get_str("channel")?.to_string(),
            },
            "exit" => Request::Exit,
            "publish" => Request::Publish,
            "ack" => Request::Ack {
                channel: doc.get_str("channel")?.to_string(),
                published_at: doc.get_i64("published_at")?,
            },
            "ping" => Request::Ping,
            other => return Err(ProtoError::UnknownMethod(other.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join_request() {
        let mut env = Envelope::new("join");
        env.set("channel", "g1");
        let req = Request::try_from(&env).unwrap();
        assert_eq!(
            req,
            Request::Join {
                channel: "g1".to_string()
            }
        );
    }

    #[test]
    fn unknown_method_is_an_error() {
        let env = Envelope::new("teleport");
        let err = Request::try_from(&env).unwrap_err();
        assert!(matches!(err, ProtoError::UnknownMethod(m) if m == "teleport"));
    }

    #[test]
    fn error_envelope_is_flagged() {
        let env = Envelope::error("publish", "Blank message is not accepted");
        assert!(env.is_error());
        assert_eq!(env.method().unwrap(), "publish");
    }
}
