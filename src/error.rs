use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("all {max} stream slots are in use")]
    Capacity { max: usize },

    #[error("no stream attached at slot {0}")]
    NoSuchBinding(usize),

    #[error("unsupported stream address: {0}")]
    UnsupportedAddress(String),

    #[error("invalid stream address: {0}")]
    InvalidAddress(String),

    #[error("engine is stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, Error>;
