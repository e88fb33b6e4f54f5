//! Shared latest-value sensor state.
//!
//! Each sensor stream owns one slot and only ever replaces it wholesale.
//! The frame pipeline reads all slots into a [`SensorSnapshot`] when it
//! stamps a frame. No slot is ever read-modify-written, so producers never
//! wait on each other or on the pipeline beyond a pointer swap.

use super::samples::{OrientationSample, PositioningSample, WeatherSnapshot};
use super::subscription::Subscription;
use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Point-in-time copy of the sensor state used to stamp one frame.
#[derive(Debug, Clone, Default)]
pub struct SensorSnapshot {
    pub positioning: Option<Arc<PositioningSample>>,
    /// Latest orientation heading in degrees.
    pub heading: f32,
    pub weather: Option<Arc<WeatherSnapshot>>,
}

/// Holder of the most recent positioning fix, heading and weather report.
#[derive(Debug, Default)]
pub struct SensorHub {
    positioning: RwLock<Option<Arc<PositioningSample>>>,
    heading_bits: AtomicU32,
    weather: RwLock<Option<Arc<WeatherSnapshot>>>,
}

impl SensorHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current positioning fix.
    pub fn publish_positioning(&self, sample: PositioningSample) {
        *self.positioning.write() = Some(Arc::new(sample));
    }

    /// Replaces the current heading.
    pub fn publish_orientation(&self, sample: OrientationSample) {
        self.heading_bits
            .store(sample.heading().to_bits(), Ordering::Release);
    }

    /// Replaces (or clears) the current weather report.
    pub fn publish_weather(&self, weather: Option<WeatherSnapshot>) {
        *self.weather.write() = weather.map(Arc::new);
    }

    /// Latest heading in degrees.
    pub fn heading(&self) -> f32 {
        f32::from_bits(self.heading_bits.load(Ordering::Acquire))
    }

    /// Latest positioning fix, if any has arrived.
    pub fn positioning(&self) -> Option<Arc<PositioningSample>> {
        self.positioning.read().clone()
    }

    /// Copies every slot into a snapshot.
    pub fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            positioning: self.positioning(),
            heading: self.heading(),
            weather: self.weather.read().clone(),
        }
    }

    /// Consumes a positioning stream, publishing each fix and handing it to
    /// `on_sample` afterwards (e.g. to append it to the route log).
    pub fn subscribe_positioning<F>(
        self: &Arc<Self>,
        samples: Receiver<PositioningSample>,
        mut on_sample: F,
    ) -> Subscription
    where
        F: FnMut(&PositioningSample) + Send + 'static,
    {
        let hub = Arc::clone(self);
        Subscription::spawn("positioning", samples, move |sample| {
            hub.publish_positioning(sample);
            on_sample(&sample);
        })
    }

    /// Consumes an orientation stream.
    pub fn subscribe_orientation(
        self: &Arc<Self>,
        samples: Receiver<OrientationSample>,
    ) -> Subscription {
        let hub = Arc::clone(self);
        Subscription::spawn("orientation", samples, move |sample| {
            hub.publish_orientation(sample);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::samples::fixtures::*;
    use std::time::{Duration, Instant};

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_empty_snapshot() {
        let hub = SensorHub::new();
        let snapshot = hub.snapshot();
        assert!(snapshot.positioning.is_none());
        assert!(snapshot.weather.is_none());
        assert_eq!(snapshot.heading, 0.0);
    }

    #[test]
    fn test_snapshot_is_point_in_time_copy() {
        let hub = SensorHub::new();
        hub.publish_positioning(sample_fix());
        hub.publish_orientation(OrientationSample::new(0, 45.0));

        let before = hub.snapshot();

        let mut moved = sample_fix();
        moved.latitude = 10.0;
        hub.publish_positioning(moved);
        hub.publish_orientation(OrientationSample::new(1, 90.0));
        hub.publish_weather(Some(sample_weather()));

        assert_eq!(before.positioning.unwrap().latitude, sample_fix().latitude);
        assert_eq!(before.heading, 45.0);
        assert!(before.weather.is_none());

        let after = hub.snapshot();
        assert_eq!(after.positioning.unwrap().latitude, 10.0);
        assert_eq!(after.heading, 90.0);
        assert!(after.weather.is_some());
    }

    #[test]
    fn test_subscriptions_publish_and_forward() {
        let hub = Arc::new(SensorHub::new());
        let (pos_tx, pos_rx) = crossbeam_channel::unbounded();
        let (ori_tx, ori_rx) = crossbeam_channel::unbounded();
        let (seen_tx, seen_rx) = crossbeam_channel::unbounded();

        let positioning = hub.subscribe_positioning(pos_rx, move |sample| {
            let _ = seen_tx.send(sample.timestamp_ms);
        });
        let orientation = hub.subscribe_orientation(ori_rx);

        pos_tx.send(sample_fix()).unwrap();
        ori_tx.send(OrientationSample::new(5, 123.0)).unwrap();

        assert_eq!(
            seen_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            sample_fix().timestamp_ms
        );
        assert!(wait_for(|| hub.heading() == 123.0));
        assert!(hub.positioning().is_some());

        positioning.unsubscribe();
        orientation.unsubscribe();

        // further samples are no longer consumed
        let _ = ori_tx.send(OrientationSample::new(6, 10.0));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(hub.heading(), 123.0);
    }
}
