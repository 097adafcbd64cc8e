use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A lookup by composite key matched zero rows. Nothing was mutated.
    #[error("not found: {0}")]
    NotFound(String),

    /// A lookup that the table invariants guarantee to be unique matched more
    /// than one row. This is invariant corruption, not a user error.
    #[error("{count} rows match {key}, the table invariants allow at most one")]
    AmbiguousMatch { key: String, count: usize },

    /// The target row is bound to another identity; unregister it first.
    #[error("{key} is already bound to registered id {registered_id}")]
    AlreadyBound { key: String, registered_id: u32 },

    /// The description is already registered.
    #[error("identity `{description}` is already registered (requested class `{class_name}`)")]
    IdentityCollision {
        class_name: String,
        description: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("logging setup failed: {0}")]
    Logging(String),
}
