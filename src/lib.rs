use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(#[from] document::ParseError),

    #[error("No course found matching '{0}'")]
    NotFound(String),

    #[error("Search index error: {0}")]
    SearchIndex(String),

    #[error("Model call failed: {0}")]
    ModelCall(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod generator;
pub mod ollama;
pub mod rag;
pub mod session;
pub mod tools;
