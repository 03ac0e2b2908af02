//! WeChat Official-Account protocol surface: the handshake signature and the
//! XML message envelope.

pub mod envelope;
pub mod signature;

pub use envelope::{
    decode, encode, Article, EnvelopeError, InboundMessage, MessageKind, OutboundReply, ReplyBody,
};
pub use signature::{compute_signature, verify_signature};
