//! Length-prefixed framing for [`Envelope`] over a byte stream.

use crate::envelope::Envelope;
use crate::error::ProtoError;
use crate::value::Document;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Refuse to buffer a frame larger than this many bytes. A well-behaved
/// peer never gets close to it; a misbehaving one gets disconnected
/// instead of growing the read buffer without bound.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// `tokio_util::codec::{Encoder, Decoder}` pair for `Envelope`.
///
/// Wire shape: a `u32` little-endian length prefix (byte count of the
/// document body that follows) then the document body itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvelopeCodec;

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = ProtoError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), ProtoError> {
        let mut body = BytesMut::new();
        item.into_document().encode(&mut body);
        if body.len() > MAX_FRAME_LEN {
            return Err(ProtoError::FrameTooLarge {
                size: body.len(),
                max: MAX_FRAME_LEN,
            });
        }
        dst.reserve(4 + body.len());
        dst.put_u32_le(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = ProtoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Envelope>, ProtoError> {
        if src.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_le_bytes(src[..4].try_into().expect("checked above")) as usize;
        if len > MAX_FRAME_LEN {
            return Err(ProtoError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_LEN,
            });
        }
        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let mut body = src.split_to(len);
        let doc = Document::decode(&mut body)?;
        Ok(Some(Envelope::from_document(doc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_yields_same_method() {
        let mut codec = EnvelopeCodec;
        let mut env = Envelope::new("ping");
        env.set("time", 42i64);

        let mut buf = BytesMut::new();
        codec.encode(env.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.method().unwrap(), "ping");
        assert_eq!(decoded.document().get_i64("time").unwrap(), 42);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_waits_for_full_frame() {
        let mut codec = EnvelopeCodec;
        let env = Envelope::new("ping");
        let mut full = BytesMut::new();
        codec.encode(env, &mut full).unwrap();

        let mut partial = BytesMut::from(&full[..full.len() - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut codec = EnvelopeCodec;
        let mut buf = BytesMut::new();
        buf.put_u32_le((MAX_FRAME_LEN + 1) as u32);
        assert!(codec.decode(&mut buf).is_err());
    }
}
