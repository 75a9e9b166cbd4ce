use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Could not authenticate against the API. {0}")]
    AuthenticationFailed(String),

    #[error("Could not download {resource}. Received: {status} - {message}.")]
    ApiError {
        resource: String,
        status: u16,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Could not recognize date \"{0}\".")]
    InvalidSinceDate(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("CSV writing failed: {0}")]
    CsvWriting(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// 利用者起因のエラーかどうか（プロセス終了コード1に対応）
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationFailed(_)
                | Error::ApiError { .. }
                | Error::InvalidConfiguration(_)
                | Error::ConfigurationMissing(_)
                | Error::InvalidSinceDate(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
