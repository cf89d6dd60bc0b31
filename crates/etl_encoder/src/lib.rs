//! The Copy-Line Encoder (C3): turn a coerced field sequence into one
//! COPY-protocol text line, and the bounded line channel that carries
//! those lines from the transform layer to the bulk loader under
//! backpressure.

mod channel;
mod line;

pub use channel::{bounded_line_channel, LineReceiver, LineSendError, LineSender};
pub use line::{decode_line, encode_line, value_to_field};
