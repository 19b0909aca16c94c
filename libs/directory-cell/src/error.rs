use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Directory backend error: {0}")]
    Backend(String),

    #[error("Invalid directory seed: {0}")]
    Seed(String),

    #[error("Malformed profile record: {0}")]
    Malformed(#[from] serde_json::Error),
}
