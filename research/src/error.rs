use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Agent(#[from] agent::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
