use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChurnPipelineError {
    #[error("Malformed date in column '{column}' for client {client_id}: '{value}'")]
    MalformedDate {
        column: String,
        client_id: String,
        value: String,
    },

    #[error("Missing required column '{column}' in {batch} batch")]
    MissingColumn { batch: String, column: String },

    #[error("Governorate '{0}' is not part of the fitted encoding")]
    UnknownGovernorate(String),

    #[error("Invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChurnPipelineError>;
