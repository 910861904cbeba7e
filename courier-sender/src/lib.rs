//! # courier-sender
//!
//! The outgoing side of an MTProto connection.
//!
//! ## Features
//! - Many callers submit concurrently; one flush loop drains
//! - Requests batched into `msg_container`s under the server's count and
//!   byte ceilings, strictly in submission order
//! - An oversized request fails on its own without holding up the rest
//! - In-flight tracking by message id and by container id
//! - Disconnect fails every outstanding request exactly once
//!
//! Message ids, sequence numbers and the per-message envelope come from a
//! [`SessionFramer`](courier_mtproto::SessionFramer), normally
//! [`MtpState`](courier_mtproto::MtpState).

#![deny(unsafe_code)]

mod config;
mod errors;
pub mod in_flight;
pub mod packer;
pub mod queue;
pub mod request;
mod sender;
pub mod transport;

pub use config::PackerConfig;
pub use errors::{InvocationError, RpcError, SendError};
pub use in_flight::InFlightSet;
pub use packer::{Batch, MessagePacker};
pub use queue::PendingQueue;
pub use request::{InvocationResult, MsgIdCell, RequestHandle, RequestRecord};
pub use sender::{Sender, SenderHandle};
pub use transport::{AbridgedTransport, IntermediateTransport, Transport};
