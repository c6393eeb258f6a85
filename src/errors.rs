use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapEditError {
    // Codec errors
    #[error("Invalid file format: {reason}")]
    Format { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    // Settings errors
    #[error("Missing setting '{key}' in section [{section}]")]
    ConfigMissing { section: String, key: String },

    #[error("Failed to parse settings: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("Invalid settings: {reason}")]
    InvalidSettings { reason: String },

    // Map state errors
    #[error("Dimension mismatch: {reason}")]
    DimensionMismatch { reason: String },

    #[error("No quicksave snapshot available")]
    NoSnapshotAvailable,

    #[error("Invalid map data: {reason}")]
    InvalidMapData { reason: String },
}

impl MapEditError {
    pub fn format(reason: impl Into<String>) -> Self {
        Self::Format {
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidMapData {
            reason: reason.into(),
        }
    }

    pub fn config_missing(section: &str, key: &str) -> Self {
        Self::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }
}

/// Result type alias for all operations
pub type MapEditResult<T> = Result<T, MapEditError>;
