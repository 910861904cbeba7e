//! MTProto session state and message framing.
//!
//! This crate handles:
//! * Message identifiers and sequence numbers ([`MtpState`])
//! * Writing the per-message envelope (`msg_id`, `seq_no`, `length`, body)
//! * `msg_container` layout, both writing the header and reading members back
//! * `gzip_packed` and `invokeAfterMsg` wrapping
//!
//! It is intentionally sans-IO: no sockets, no encryption. The outgoing
//! batching engine in `courier-sender` drives it through [`SessionFramer`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod container;
pub mod framer;
pub mod message;
pub mod session;
pub mod tl;

pub use framer::{FramingError, SessionFramer};
pub use message::{Message, MessageId};
pub use session::MtpState;
