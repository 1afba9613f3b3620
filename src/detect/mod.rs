mod backend;
pub mod backends;
mod result;
mod select;

pub use backend::{DetectorError, PeopleDetector};
pub use backends::{
    write_replay, HogDetector, HogParams, LinearSvm, ReplayDetector, ReplayRecord,
};
#[cfg(feature = "backend-tract")]
pub use backends::TractDetector;
pub use result::Detection;
pub use select::{select_detector, DetectorKind, DetectorSettings};
