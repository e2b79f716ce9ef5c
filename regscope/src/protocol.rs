//! Text command protocol spoken by the sensor board firmware
//!
//! Builders for outbound commands and parsers for inbound acknowledgements. Nothing here touches
//! the channel, see [`crate::session`].

mod command;
mod frame;
mod response;

pub use command::*;
pub use frame::*;
pub use response::*;
