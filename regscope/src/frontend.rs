//! Parsers for the text formats the core exchanges with the outside world

mod json_catalog;
mod values_file;

pub use json_catalog::parse_catalog;
pub use values_file::{parse_value_lines, render_value_lines};
