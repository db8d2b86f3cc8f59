//! Ambient light sensor collaborator.
//!
//! The Sensor mode reads lux values from an external sensor attached over a
//! serial/USB link.  Unavailability is a normal mode-ineligibility signal
//! handled by the mode watchdog, never a crash.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;

/// Error type for sensor reads.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("no ambient light sensor is attached")]
    Unavailable,
    #[error("malformed sensor reading: {0}")]
    Malformed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A raw ambient light reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LuxReading {
    pub lux: f64,
}

/// Ambient light sensor seam.
#[async_trait]
pub trait AmbientSensor: Send + Sync {
    /// Current reading, or [`SensorError::Unavailable`] when the sensor is
    /// missing or not answering.
    async fn current_value(&self) -> Result<LuxReading, SensorError>;

    /// Cheap availability probe for mode resolution.
    async fn is_available(&self) -> bool;
}

/// Normalizes a lux reading to a 0–100% brightness signal.
pub fn lux_to_percent(lux: f64, max_lux: f64) -> f64 {
    if max_lux <= 0.0 {
        return 0.0;
    }
    (lux / max_lux * 100.0).clamp(0.0, 100.0)
}

/// Sensor reading newline-delimited lux values from a tty device.
///
/// The device firmware prints one decimal value per line; the most recent
/// complete line wins.
pub struct SerialLineSensor {
    path: PathBuf,
}

impl SerialLineSensor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AmbientSensor for SerialLineSensor {
    async fn current_value(&self) -> Result<LuxReading, SensorError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SensorError::Unavailable)
            }
            Err(e) => return Err(SensorError::Io(e)),
        };
        let line = content
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or(SensorError::Unavailable)?;
        let lux: f64 = line
            .trim()
            .parse()
            .map_err(|_| SensorError::Malformed(line.to_string()))?;
        Ok(LuxReading { lux })
    }

    async fn is_available(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }
}

/// Sensor for deployments without one configured: never available.
pub struct NullSensor;

#[async_trait]
impl AmbientSensor for NullSensor {
    async fn current_value(&self) -> Result<LuxReading, SensorError> {
        Err(SensorError::Unavailable)
    }

    async fn is_available(&self) -> bool {
        false
    }
}

/// Scripted sensor for tests.
#[derive(Default)]
pub struct MockSensor {
    value: std::sync::Mutex<Option<f64>>,
}

impl MockSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(lux)` plugs the sensor in; `None` unplugs it.
    pub fn set_lux(&self, lux: Option<f64>) {
        *self.value.lock().expect("lock poisoned") = lux;
    }
}

#[async_trait]
impl AmbientSensor for MockSensor {
    async fn current_value(&self) -> Result<LuxReading, SensorError> {
        self.value
            .lock()
            .expect("lock poisoned")
            .map(|lux| LuxReading { lux })
            .ok_or(SensorError::Unavailable)
    }

    async fn is_available(&self) -> bool {
        self.value.lock().expect("lock poisoned").is_some()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lux_to_percent_clamps_and_scales() {
        assert_eq!(lux_to_percent(0.0, 2000.0), 0.0);
        assert_eq!(lux_to_percent(1000.0, 2000.0), 50.0);
        assert_eq!(lux_to_percent(5000.0, 2000.0), 100.0);
        assert_eq!(lux_to_percent(100.0, 0.0), 0.0);
    }

    #[tokio::test]
    async fn test_mock_sensor_unplugged_is_unavailable() {
        let sensor = MockSensor::new();
        assert!(!sensor.is_available().await);
        assert!(matches!(
            sensor.current_value().await,
            Err(SensorError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_mock_sensor_returns_scripted_value() {
        let sensor = MockSensor::new();
        sensor.set_lux(Some(420.0));
        assert!(sensor.is_available().await);
        assert_eq!(sensor.current_value().await.unwrap().lux, 420.0);
    }

    #[tokio::test]
    async fn test_serial_sensor_missing_device_is_unavailable() {
        let sensor = SerialLineSensor::new("/nonexistent/ttyLUX0");
        assert!(!sensor.is_available().await);
        assert!(matches!(
            sensor.current_value().await,
            Err(SensorError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_serial_sensor_parses_last_complete_line() {
        let path = std::env::temp_dir().join(format!("luxd_sensor_test_{}", std::process::id()));
        tokio::fs::write(&path, "120.5\n340.0\n\n").await.unwrap();
        let sensor = SerialLineSensor::new(&path);
        assert_eq!(sensor.current_value().await.unwrap().lux, 340.0);
        tokio::fs::remove_file(&path).await.ok();
    }
}
