use std::io;

use thiserror::Error;

use crate::error::{CatalogError, EditError, ProtocolError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("i/o error")]
    Io(#[from] io::Error),
    #[error("cannot load catalog")]
    Catalog(#[from] CatalogError),
    #[error("edit rejected")]
    Edit(#[from] EditError),
    #[error("command failed")]
    Protocol(#[from] ProtocolError),
}
