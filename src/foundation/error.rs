pub type ReelResult<T> = Result<T, ReelError>;

#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    #[error("validation error: {0}")]
    Validation(String),

    /// A single asset failed to fetch or decode. Callers degrade to a placeholder.
    #[error("asset error: {0}")]
    Asset(String),

    /// A generative provider call failed; production halts.
    #[error("provider error: {0}")]
    Provider(String),

    /// Encoder or audio bus construction failed; the export is aborted.
    #[error("export error: {0}")]
    Export(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("gpu error: {0}")]
    Gpu(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::Gpu(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// `true` for failures that abort an export outright, as opposed to degraded assets.
    pub fn is_export_fatal(&self) -> bool {
        matches!(self, Self::Export(_))
    }
}

impl From<serde_json::Error> for ReelError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            ReelError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(ReelError::asset("x").to_string().contains("asset error:"));
        assert!(
            ReelError::provider("x")
                .to_string()
                .contains("provider error:")
        );
        assert!(ReelError::export("x").to_string().contains("export error:"));
        assert!(ReelError::serde("x").to_string().contains("serialization error:"));
    }

    #[test]
    fn only_export_errors_are_export_fatal() {
        assert!(ReelError::export("encoder").is_export_fatal());
        assert!(!ReelError::asset("404").is_export_fatal());
        assert!(!ReelError::provider("quota").is_export_fatal());
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ReelError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
