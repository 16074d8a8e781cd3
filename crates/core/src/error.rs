/// Result alias that carries the custom [`GovernorError`] type.
pub type Result<T> = std::result::Result<T, GovernorError>;

/// Common error type for the core crate.
///
/// Missing runtime capabilities, panicking subscribers and completion of
/// unknown animation ids are not errors and have no variant here.
#[derive(Debug, thiserror::Error)]
pub enum GovernorError {
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration or report (de)serialisation failed.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// `end_transition` was called with a handle the profiler never issued, or
    /// one that has already been finalised.
    #[error("unknown theme transition handle {0}")]
    UnknownTransition(u64),
    /// A shared component mutex was poisoned by a panicking holder.
    #[error("{0} has been poisoned")]
    Poisoned(&'static str),
    /// The governor was used after `dispose`.
    #[error("governor has been disposed")]
    Disposed,
}

impl GovernorError {
    pub(crate) fn invalid_config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        assert_eq!(
            GovernorError::UnknownTransition(7).to_string(),
            "unknown theme transition handle 7"
        );
        assert_eq!(
            GovernorError::invalid_config("bad window").to_string(),
            "invalid configuration: bad window"
        );
        assert_eq!(
            GovernorError::Poisoned("performance governor").to_string(),
            "performance governor has been poisoned"
        );
    }
}
