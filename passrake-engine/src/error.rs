use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("dictionary file '{path}' not found")]
    DictionaryNotFound { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored hash is not bcrypt-shaped: {reason}")]
    MalformedHash { reason: String },

    #[error("progress ledger '{path}' unreadable: {source}")]
    Ledger {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
