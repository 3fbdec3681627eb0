//! Error types shared by every stage of the painter.

use thiserror::Error;

/// Everything that can go wrong while loading inputs or running a painting.
///
/// Geometric degeneracies (off-canvas strokes, empty footprints) are NOT errors:
/// they show up as empty scanline rows or as `NO_IMPROVEMENT` scores instead.
#[derive(Debug, Error)]
pub enum PaintError {
    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No textures were supplied")]
    NoTextures,

    #[error("Unknown texture id {0}")]
    UnknownTexture(usize),

    #[error("Texture {index} has no pixels")]
    EmptyTexture { index: usize },

    #[error("Target is {width}x{height}; it must have at least one pixel")]
    EmptyTarget { width: u32, height: u32 },

    #[error("{0} worker did not finish in time")]
    WorkerTimeout(&'static str),

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("{0} channel closed unexpectedly")]
    ChannelClosed(&'static str),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PaintError>;

/// Turn a panic payload into something printable.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_lists_every_problem() {
        let err = PaintError::InvalidConfig(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Invalid configuration: a; b");
    }

    #[test]
    fn test_panic_message_downcasts() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload), "boom");

        let payload = std::panic::catch_unwind(|| panic!("{}", String::from("owned"))).unwrap_err();
        assert_eq!(panic_message(payload), "owned");
    }
}
