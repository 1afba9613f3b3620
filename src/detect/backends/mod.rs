pub mod hog;
mod hog_model;
pub mod replay;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use hog::{HogDetector, HogParams, LinearSvm};
pub use replay::{write_replay, ReplayDetector, ReplayRecord};

#[cfg(feature = "backend-tract")]
pub use tract::TractDetector;
