//! Error types for the dispatch engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during start-up and serving.

/// Top-level error for the dispatch engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: dispatch_core::ConfigError,
    },

    /// The store could not be reached or migrated.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: dispatch_db::DbError,
    },

    /// The roster could not be loaded.
    #[error("roster load error: {source}")]
    Load {
        /// The underlying load error.
        #[from]
        source: dispatch_core::LoadError,
    },

    /// The HTTP server failed to bind or serve.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: dispatch_server::ServerError,
    },
}
