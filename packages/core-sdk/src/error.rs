use thiserror::Error;

/**
 * \brief Rejections raised by the credential gate. The gate stays locked on either.
 */
#[derive(Debug, Error)]
pub enum GateError {
    #[error("invalid API key format: expected 'sk-' followed by at least 20 alphanumeric characters")]
    Format,

    #[error("API key rejected: {0}")]
    Auth(String),
}

/**
 * \brief Failure of a single completion attempt.
 * \details The display text is what ends up in the result record after the error marker.
 */
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    Transport(String),

    #[error("request failed: {status} -> {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for DispatchError {
    fn from(e: reqwest::Error) -> Self {
        DispatchError::Transport(e.to_string())
    }
}

/**
 * \brief Reasons a batch is refused before its first attempt.
 */
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("repetition count must be between 1 and {max}, got {count}")]
    CountOutOfRange { count: u32, max: u32 },

    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("session is locked, validate an API key first")]
    Locked,

    #[error("no API key held for this session, validate the key again")]
    CredentialExpired,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
}
