use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a resolution pass.
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("No files found for single collection '{collection}' (patterns: {patterns})")]
    NoFiles { collection: String, patterns: String },

    #[error("Single collection '{collection}' has no valid records ({issues} issue(s) reported)")]
    Cardinality { collection: String, issues: usize },

    #[error("Strict mode: {0} issue(s) reported")]
    StrictIssues(usize),

    #[error("Hook '{hook}' failed: {message}")]
    Hook { hook: &'static str, message: String },

    #[error("Invalid glob pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ContentError>;

/// Failure to turn one source file into raw records. Fatal to that file only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("No loader registered for {0}")]
    NoLoader(PathBuf),

    #[error("Failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Failure while extracting a referenced asset. Surfaced as a field issue.
#[derive(Error, Debug, Clone)]
pub enum AssetError {
    #[error("Cannot read asset {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Cannot decode image {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("Cannot write asset {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("Asset task failed: {0}")]
    Task(String),
}
