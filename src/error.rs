#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("catalog error: {0}")]
    Catalog(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("blob store error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("server '{name}' not found")]
    ServerNotFound { name: String },

    #[error("backup '{id}' not found")]
    BackupNotFound { id: uuid::Uuid },

    #[error("schedule '{id}' not found")]
    ScheduleNotFound { id: uuid::Uuid },

    #[error("restore job '{id}' not found")]
    RestoreJobNotFound { id: uuid::Uuid },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("command validation failed: {0}")]
    ValidationFailed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("unsupported backup kind '{kind}' for database family '{family}'")]
    UnsupportedCombination { family: String, kind: String },

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("catalog compare-and-set lost for backup '{id}'")]
    CasLost { id: uuid::Uuid },

    #[error("cron parse error: {0}")]
    Cron(String),

    #[error("timezone error: {0}")]
    Timezone(String),

    #[error("job timed out after {0} seconds")]
    Timeout(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn reason(&self) -> &str {
        match self {
            Error::Catalog(_) => "CatalogError",
            Error::Serialization(_) => "SerializationError",
            Error::Storage(_) => "StorageError",
            Error::ServerNotFound { .. } => "ServerNotFound",
            Error::BackupNotFound { .. } => "BackupNotFound",
            Error::ScheduleNotFound { .. } => "ScheduleNotFound",
            Error::RestoreJobNotFound { .. } => "RestoreJobNotFound",
            Error::InvalidConfig(_) => "InvalidConfiguration",
            Error::ValidationFailed(_) => "ValidationFailed",
            Error::Transport(_) => "TransportError",
            Error::Engine(_) => "EngineError",
            Error::UnsupportedCombination { .. } => "UnsupportedCombination",
            Error::Crypto(_) => "CryptoError",
            Error::Compression(_) => "CompressionError",
            Error::ChecksumMismatch { .. } => "ChecksumMismatch",
            Error::CasLost { .. } => "CasLost",
            Error::Cron(_) => "CronError",
            Error::Timezone(_) => "TimezoneError",
            Error::Timeout(_) => "Timeout",
            Error::Io(_) => "IoError",
            Error::Regex(_) => "RegexError",
        }
    }

    /// Transport/storage/catalog hiccups are worth a bounded retry; everything else is permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Storage(_))
    }
}
