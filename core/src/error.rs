use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Composite weights must sum to 1.0, got {sum}")]
    InvalidWeights { sum: f64 },

    #[error("Cluster count {clusters} exceeds entity count {entities}")]
    TooManyClusters { clusters: usize, entities: usize },

    #[error("Category table is empty")]
    EmptyCategories,

    #[error("Unknown category '{category}'")]
    UnknownCategory { category: String },

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("No entities to score")]
    EmptyPopulation,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type LabResult<T> = Result<T, LabError>;
