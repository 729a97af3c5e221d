//! Wire protocol for the chat relay: a tagged-document value format, the
//! envelope types built on top of it, and a length-framed codec for
//! driving them through `tokio_util`.

mod codec;
mod envelope;
mod error;
mod value;

pub use codec::{EnvelopeCodec, MAX_FRAME_LEN};
pub use envelope::{Envelope, Request};
pub use error::ProtoError;
pub use value::{Document, Value};
