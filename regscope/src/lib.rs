//! Regscope --- Inspect and edit the registers of an I2C sensor through a board's serial text
//! protocol.
//!
//! Register templates come from a JSON catalog. Values are edited either as a whole or one
//! bit-field at a time, kept in address/value text files, and read from or written to the part
//! one command at a time.

// Export full API at crate root
pub use api::*;

mod api;
pub mod codec;
mod error;
mod filtering;
pub mod format;
mod frontend;
mod model;
pub mod protocol;
mod session;
mod transport;
mod workset;

pub use error::{
    BoundsError, CatalogError, ChannelError, EditError, ProtocolError, ResponseShapeError,
    TemplateError, ValueParseError,
};
pub use filtering::ItemFilter;
pub use frontend::{parse_catalog, parse_value_lines, render_value_lines};
pub use model::{
    Access, BitFieldSpec, BitFieldValue, Catalog, FieldSelector, RegisterSpec, RegisterValue,
    ValueSize,
};
pub use protocol::Ack;
pub use session::{CommandState, Session, SessionConfig};
pub use transport::{LineTransport, Transport};
pub use workset::{EditPolicy, WorkingSet};
