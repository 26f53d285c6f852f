use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Pin resolution errors
    #[error("Unknown pin: no hardware mapping for {0}")]
    UnknownPin(String),

    #[error("Pins {first} and {second} both target GPIO line {line}")]
    DuplicatePin {
        first: String,
        second: String,
        line: u32,
    },

    #[error("Interrupt name {0} is used more than once")]
    DuplicateName(String),

    // Configuration errors
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
