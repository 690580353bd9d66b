use thiserror::Error;

/// Errors surfaced by the provider clients and the twitter subprocess
/// fetcher.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A required credential or setting is absent; the platform cannot be
    /// sourced at all.
    #[error("missing provider configuration: {0}")]
    MissingConfig(&'static str),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status or an error payload.
    #[error("provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// An actor/collection run finished in a terminal non-success state.
    #[error("provider run {run_id} ended as {status}")]
    RunFailed { run_id: String, status: String },

    #[error("subprocess failure: {0}")]
    Subprocess(String),

    #[error("failed to deserialize {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}
