use thiserror::Error;

/// Errors that abort a pipeline run or block startup
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}

/// Forecast retrieval failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("forecast server returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
}

/// Compressed payload failures
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("malformed archive: {0}")]
    Malformed(#[from] zip::result::ZipError),

    #[error("archive contains no entries")]
    Empty,

    #[error("archive has no forecast entry")]
    MissingEntry,

    #[error("archive entry {name} exceeds {limit} bytes")]
    TooLarge { name: String, limit: u64 },

    #[error("failed to read archive entry {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Forecast document failures
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("document is not valid XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("document has no forecast time steps")]
    MissingTimeSteps,

    #[error("document has no forecast series named {element}")]
    MissingSeries { element: String },

    #[error("time step #{index} is not a valid timestamp: {raw:?}")]
    InvalidTimestamp { index: usize, raw: String },

    #[error("time step #{index} is earlier than its predecessor")]
    NonMonotonic { index: usize },

    #[error("value #{index} is marked as missing in the feed")]
    MissingValue { index: usize },

    #[error("value #{index} is not a number: {raw:?}")]
    InvalidValue { index: usize, raw: String },

    #[error("series length mismatch: {timestamps} time steps vs {values} values")]
    LengthMismatch { timestamps: usize, values: usize },
}

/// Invalid or missing static settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Load(Box::new(e))
    }
}

/// Publish sink failures
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish to {topic} failed: {reason}")]
    Client { topic: String, reason: String },
}

impl PipelineError {
    /// Short category label used in logs and task status
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Transport(_) => "transport",
            PipelineError::Archive(_) => "archive",
            PipelineError::Parse(_) => "parse",
            PipelineError::Config(_) => "config",
            PipelineError::Publish(_) => "publish",
        }
    }
}
