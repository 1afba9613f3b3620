use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// People detector strategy.
///
/// One implementation is selected at startup and then called once per
/// processed frame. Implementations return every person box they find, in
/// no particular order; overlapping boxes are allowed and callers must
/// tolerate them.
pub trait PeopleDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// An error only affects the current frame: the pipeline logs it and
    /// proceeds as if nothing had been detected.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Startup failures of a detector backend.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("detector '{backend}' unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },
}

impl DetectorError {
    pub(crate) fn unavailable(backend: &'static str, reason: impl std::fmt::Display) -> Self {
        DetectorError::Unavailable {
            backend,
            reason: reason.to_string(),
        }
    }
}
