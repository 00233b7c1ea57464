use thiserror::Error;

/// Errors surfaced by layer configuration, persistence and combination.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("unknown option {0}, a typo in the layer config?")]
    Config(String),

    #[error("corrupt layer state: {0}")]
    CorruptState(String),

    #[error("cannot combine layers of different kinds")]
    TypeMismatch,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
