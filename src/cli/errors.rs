use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid argument {arg}: {reason}")]
    InvalidArgument { arg: String, reason: String },

    #[error("Missing required argument: {arg}")]
    MissingArgument { arg: String },

    #[error("Could not install the Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("HTTP session error: {0}")]
    Session(#[from] landsatpro::io::HttpError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pipeline(#[from] landsatpro::Error),
}
