//! Positioning, orientation and weather state.
//!
//! The drivers producing these readings are external. They deliver samples
//! over channels; this module keeps the latest value of each stream where
//! the frame pipeline can read it without blocking the producers.

mod samples;
mod snapshot;
mod subscription;

pub use samples::{normalize_heading, OrientationSample, PositioningSample, WeatherSnapshot};
pub use snapshot::{SensorHub, SensorSnapshot};
pub use subscription::Subscription;

#[cfg(test)]
pub(crate) use samples::fixtures;
