//! Map capture export
//!
//! A capture is the buffered lidar sweep plus the mean of each environmental
//! channel, written as one JSON document:
//!
//! ```json
//! {
//!   "timestamp": 1718000000.25,
//!   "lidar_points": [[12.5, -3.0], [13.0, -2.5]],
//!   "sensor_data": { "temperature": 21.4, "humidity": 55.0, "pressure": null }
//! }
//! ```

use crate::core::types::{ChannelId, Sample};
use crate::error::{Error, Result};
use crate::store::{SampleStore, mean_of};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Channels emptied after a successful capture (raw counts are kept)
pub const CAPTURED_CHANNELS: [ChannelId; 4] = [
    ChannelId::Position,
    ChannelId::Temperature,
    ChannelId::Humidity,
    ChannelId::Pressure,
];

/// Means of the buffered environmental samples (`None` when empty)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorAverages {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
}

/// One exported sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapCapture {
    /// Unix time in seconds
    pub timestamp: f64,
    /// Buffered positions, oldest first
    pub lidar_points: Vec<[f64; 2]>,
    pub sensor_data: SensorAverages,
}

impl MapCapture {
    /// Capture the store's current contents without removing them
    pub fn from_store(store: &SampleStore) -> Self {
        Self {
            timestamp: unix_now(),
            lidar_points: store.positions().into_iter().map(|(x, y)| [x, y]).collect(),
            sensor_data: SensorAverages {
                temperature: store.mean(ChannelId::Temperature),
                humidity: store.mean(ChannelId::Humidity),
                pressure: store.mean(ChannelId::Pressure),
            },
        }
    }

    /// Capture from drained batches, in [`CAPTURED_CHANNELS`] order
    fn from_batches(batches: &[Vec<Sample>; 4]) -> Self {
        let [positions, temperature, humidity, pressure] = batches;
        Self {
            timestamp: unix_now(),
            lidar_points: positions
                .iter()
                .filter_map(|s| s.value.as_point())
                .map(|(x, y)| [x, y])
                .collect(),
            sensor_data: SensorAverages {
                temperature: mean_of(temperature),
                humidity: mean_of(humidity),
                pressure: mean_of(pressure),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lidar_points.is_empty()
    }

    /// Write `<dir>/<name>.json`, creating `dir` if needed
    ///
    /// Without a name the file is `map_<unix seconds>.json`.
    pub fn save(&self, dir: &Path, name: Option<&str>) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(file_name(name, self.timestamp));
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        log::info!(
            "Saved map capture with {} points to {}",
            self.lidar_points.len(),
            path.display()
        );
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// File name for a capture
///
/// Path separators in `name` are replaced so the file always lands in the
/// export directory.
pub fn file_name(name: Option<&str>, timestamp: f64) -> String {
    let stem = match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect::<String>(),
        None => format!("map_{}", timestamp as u64),
    };
    if stem.ends_with(".json") {
        stem
    } else {
        format!("{}.json", stem)
    }
}

/// Drain the captured channels and save them as one sweep
///
/// Each channel is taken under its write lock, so samples appended while the
/// file is written stay buffered for the next capture. Fails with
/// [`Error::EmptyCapture`] (and removes nothing) when no positions are
/// buffered. If saving fails the drained samples are put back.
pub fn capture_and_clear(store: &SampleStore, dir: &Path, name: Option<&str>) -> Result<PathBuf> {
    let positions = store.take(ChannelId::Position);
    if positions.is_empty() {
        log::warn!("Map capture requested with no lidar points buffered");
        return Err(Error::EmptyCapture);
    }
    let batches = [
        positions,
        store.take(ChannelId::Temperature),
        store.take(ChannelId::Humidity),
        store.take(ChannelId::Pressure),
    ];

    match MapCapture::from_batches(&batches).save(dir, name) {
        Ok(path) => Ok(path),
        Err(e) => {
            log::warn!("Capture not saved, returning samples to the buffers");
            for (channel, batch) in CAPTURED_CHANNELS.into_iter().zip(batches) {
                store.restore(channel, batch);
            }
            Err(e)
        }
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SampleValue;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn filled_store() -> SampleStore {
        let store = SampleStore::with_capacity(16);
        store.append_position(12.5, -3.0);
        store.append_position(13.0, -2.5);
        store.append(ChannelId::Temperature, SampleValue::Scalar(20.0)).unwrap();
        store.append(ChannelId::Temperature, SampleValue::Scalar(22.0)).unwrap();
        store.append(ChannelId::Humidity, SampleValue::Scalar(55.0)).unwrap();
        store.append(ChannelId::Raw, SampleValue::Integer(512)).unwrap();
        store
    }

    #[test]
    fn test_capture_contents() {
        let capture = MapCapture::from_store(&filled_store());
        assert_eq!(capture.lidar_points, vec![[12.5, -3.0], [13.0, -2.5]]);
        assert_eq!(
            capture.sensor_data,
            SensorAverages {
                temperature: Some(21.0),
                humidity: Some(55.0),
                pressure: None,
            }
        );
        assert!(capture.timestamp > 0.0);
    }

    #[test]
    fn test_json_shape() {
        let capture = MapCapture {
            timestamp: 1.5,
            lidar_points: vec![[1.0, 2.0]],
            sensor_data: SensorAverages {
                temperature: Some(20.0),
                humidity: None,
                pressure: None,
            },
        };
        let value: serde_json::Value = serde_json::to_value(&capture).unwrap();
        assert_eq!(value["lidar_points"][0][1], 2.0);
        assert_eq!(value["sensor_data"]["temperature"], 20.0);
        assert!(value["sensor_data"]["pressure"].is_null());
    }

    #[test]
    fn test_file_names() {
        assert_eq!(file_name(Some("room_a"), 0.0), "room_a.json");
        assert_eq!(file_name(Some("room_a.json"), 0.0), "room_a.json");
        assert_eq!(file_name(Some("../etc/x"), 0.0), ".._etc_x.json");
        assert_eq!(file_name(None, 1718000000.9), "map_1718000000.json");
        assert_eq!(file_name(Some("  "), 42.0), "map_42.json");
    }

    #[test]
    fn test_capture_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = filled_store();

        let path = capture_and_clear(&store, dir.path(), Some("room_a")).unwrap();
        assert_eq!(path, dir.path().join("room_a.json"));

        let loaded = MapCapture::load(&path).unwrap();
        assert_eq!(loaded.lidar_points.len(), 2);
        assert_eq!(loaded.sensor_data.temperature, Some(21.0));

        for channel in CAPTURED_CHANNELS {
            assert!(store.is_empty(channel), "{} not cleared", channel);
        }
        assert_eq!(store.len(ChannelId::Raw), 1);
    }

    #[test]
    fn test_empty_capture_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::with_capacity(4);
        store.append(ChannelId::Temperature, SampleValue::Scalar(20.0)).unwrap();

        let result = capture_and_clear(&store, dir.path(), None);
        assert!(matches!(result, Err(Error::EmptyCapture)));
        assert_eq!(store.len(ChannelId::Temperature), 1);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_save_keeps_samples() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"").unwrap();
        let store = filled_store();

        assert!(capture_and_clear(&store, &blocker, Some("room_a")).is_err());
        assert_eq!(store.positions(), vec![(12.5, -3.0), (13.0, -2.5)]);
        assert_eq!(store.values(ChannelId::Temperature), vec![20.0, 22.0]);
        assert_eq!(store.len(ChannelId::Humidity), 1);
    }

    #[test]
    fn test_no_point_lost_while_appending() {
        const POINTS: usize = 5_000;
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SampleStore::with_capacity(POINTS));
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for i in 0..POINTS {
                    store.append_position(i as f64, 0.0);
                    if i % 64 == 0 {
                        thread::yield_now();
                    }
                }
                done.store(true, Ordering::Release);
            })
        };

        let mut files = Vec::new();
        while !done.load(Ordering::Acquire) {
            let name = format!("sweep_{:05}", files.len());
            match capture_and_clear(&store, dir.path(), Some(&name)) {
                Ok(path) => files.push(path),
                Err(Error::EmptyCapture) => thread::yield_now(),
                Err(e) => panic!("capture failed: {}", e),
            }
        }
        writer.join().unwrap();

        let mut seen: Vec<f64> = Vec::new();
        for path in &files {
            let capture = MapCapture::load(path).unwrap();
            seen.extend(capture.lidar_points.iter().map(|p| p[0]));
        }
        seen.extend(store.positions().into_iter().map(|(x, _)| x));

        let expected: Vec<f64> = (0..POINTS).map(|i| i as f64).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("maps").join("today");
        let store = filled_store();
        let path = capture_and_clear(&store, &nested, None).unwrap();
        assert!(path.starts_with(&nested));
        assert!(path.exists());
    }
}
