//! Exposes functionality supported by this crate
mod error;

use std::path;

use log::info;

use crate::{
    frontend,
    model::Catalog,
    session::{Session, SessionConfig},
    transport::LineTransport,
    workset::WorkingSet,
};

pub use error::ApiError;

/// Session over a serial device file
pub type SerialSession = Session<LineTransport<fs_err::File>>;

/// Load a template catalog from a JSON file
pub fn load_catalog(path: &path::Path) -> Result<Catalog, ApiError> {
    let text = fs_err::read_to_string(path)?;
    let catalog = frontend::parse_catalog(&text)?;
    info!("loaded {} register templates from {}", catalog.len(), path.display());
    Ok(catalog)
}

/// Load a value file into a working set over `catalog`
///
/// Lines that do not parse and addresses missing from `catalog` are skipped with a warning.
pub fn load_values<'c>(catalog: &'c Catalog, path: &path::Path) -> Result<WorkingSet<'c>, ApiError> {
    let text = fs_err::read_to_string(path)?;
    let set = WorkingSet::from_entries(catalog, frontend::parse_value_lines(&text));
    info!("loaded {} register values from {}", set.len(), path.display());
    Ok(set)
}

/// Write every register of `set` into a value file, replacing it
pub fn save_values(path: &path::Path, set: &WorkingSet) -> Result<(), ApiError> {
    fs_err::write(path, frontend::render_value_lines(set.iter()))?;
    info!("wrote {} register values to {}", set.len(), path.display());
    Ok(())
}

/// Open a session over a serial device that has already been configured by the OS
///
/// The device file is opened for reading and writing. Reads happen on a background thread.
pub fn open_serial(path: &path::Path, config: SessionConfig) -> Result<SerialSession, ApiError> {
    let file = fs_err::OpenOptions::new().read(true).write(true).open(path)?;
    let reader = file.file().try_clone()?;
    info!("opened {} for board {}", path.display(), config.target().board_id);
    Ok(Session::new(LineTransport::new(reader, file), config))
}
