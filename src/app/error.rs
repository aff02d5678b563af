// Error types for the task client and the startup configuration

/// Failures of a single request against the remote task store.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connection-level failure: DNS, connect, TLS, timeout or a dropped body.
    #[error("Network error: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    /// The store answered with a non-success status.
    #[error("Server responded with HTTP {status}: {body}")]
    Server { status: u16, body: String },

    /// The store rejected the payload of a create or update request.
    #[error("Request rejected with HTTP {status}: {message}")]
    Validation { status: u16, message: String },

    /// The response body was not the JSON shape we expect.
    #[error("Failed to decode {context}: {source}")]
    Decode {
        context: &'static str,
        source: serde_json::Error,
    },

    /// A request payload could not be turned into JSON.
    #[error("Failed to encode {context}: {source}")]
    Encode {
        context: &'static str,
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid base URL '{value}': {source}")]
    BaseUrl {
        value: String,
        source: url::ParseError,
    },

    #[error("Unsupported URL scheme '{scheme}', expected http or https")]
    Scheme { scheme: String },

    #[error("User id must be a positive number")]
    UserId,

    #[error("Tick rate must be at least 1 ms")]
    TickRate,

    #[error("Failed to open log file '{path}': {source}")]
    LogFile {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to install the log subscriber: {message}")]
    Logging { message: String },
}
