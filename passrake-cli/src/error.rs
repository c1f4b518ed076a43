#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Engine(#[from] passrake_engine::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
