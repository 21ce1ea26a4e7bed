/// Convenience result type used across the crate.
pub type PaintResult<T> = Result<T, PaintError>;

/// Error taxonomy shared by every painting API.
#[derive(thiserror::Error, Debug)]
pub enum PaintError {
    /// Invalid session, stroke or solver configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The rasterizer failed or produced a raster of the wrong shape.
    #[error("render error: {0}")]
    Render(String),

    /// The guidance scorer failed or returned mismatched data.
    #[error("guidance error: {0}")]
    Guidance(String),

    /// A loss, gradient or parameter became NaN or infinite.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Optimizer state and parameter tensors disagree.
    #[error("optimizer error: {0}")]
    Optimizer(String),

    /// Errors when serializing or deserializing configs.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PaintError {
    /// Build a [`PaintError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`PaintError::Render`] value.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Build a [`PaintError::Guidance`] value.
    pub fn guidance(msg: impl Into<String>) -> Self {
        Self::Guidance(msg.into())
    }

    /// Build a [`PaintError::Numerical`] value.
    pub fn numerical(msg: impl Into<String>) -> Self {
        Self::Numerical(msg.into())
    }

    /// Build a [`PaintError::Optimizer`] value.
    pub fn optimizer(msg: impl Into<String>) -> Self {
        Self::Optimizer(msg.into())
    }

    /// Build a [`PaintError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Return `true` for errors raised by non-finite losses, gradients or parameters.
    pub fn is_numerical(&self) -> bool {
        matches!(self, Self::Numerical(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
