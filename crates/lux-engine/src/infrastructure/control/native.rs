//! Native panel service channel.
//!
//! Directly-attached panels (laptop lids, all-in-ones) expose a backlight
//! class device instead of DDC/CI.  On Linux that is
//! `/sys/class/backlight/<dev>/` with `brightness`, `max_brightness`, and
//! `actual_brightness` attribute files.  Only brightness is controllable on
//! this channel; everything else reports [`ControlError::Unsupported`].

use std::path::PathBuf;

use async_trait::async_trait;
use lux_core::{percent_of, Capability, DisplayRecord};
use tokio::fs;

use super::{Command, ControlBackend, ControlError};

/// sysfs backlight control backend.
pub struct NativeApiControl {
    device_dir: PathBuf,
}

impl NativeApiControl {
    pub fn new(device_dir: impl Into<PathBuf>) -> Self {
        Self {
            device_dir: device_dir.into(),
        }
    }

    /// First backlight device under `root`, if any.
    pub async fn discover(root: impl Into<PathBuf>) -> Option<Self> {
        let root = root.into();
        let mut entries = fs::read_dir(&root).await.ok()?;
        let entry = entries.next_entry().await.ok()??;
        Some(Self::new(entry.path()))
    }

    async fn read_attr(&self, name: &str) -> Result<i64, ControlError> {
        let text = fs::read_to_string(self.device_dir.join(name)).await?;
        text.trim()
            .parse::<i64>()
            .map_err(|e| ControlError::Bus(format!("bad {name} value: {e}")))
    }

    async fn max_hardware_brightness(&self) -> Result<i64, ControlError> {
        self.read_attr("max_brightness").await
    }
}

#[async_trait]
impl ControlBackend for NativeApiControl {
    fn kind(&self) -> Capability {
        Capability::NativeApi
    }

    async fn exists(&self, _display: &DisplayRecord) -> bool {
        fs::metadata(&self.device_dir).await.is_ok()
    }

    async fn read(&self, display: &DisplayRecord, command: Command) -> Result<i64, ControlError> {
        if command != Command::Brightness {
            return Err(ControlError::Unsupported(command));
        }
        let actual = self.read_attr("actual_brightness").await?;
        let max = self.max_hardware_brightness().await?.max(1);
        // Scale the hardware value back into the record's range.
        let percent = percent_of(actual, 0, max);
        Ok(lux_core::compute_from_percent(
            percent,
            display.min_brightness,
            display.max_brightness,
            0,
        ))
    }

    async fn write(
        &self,
        display: &DisplayRecord,
        command: Command,
        value: i64,
    ) -> Result<(), ControlError> {
        if command != Command::Brightness {
            return Err(ControlError::Unsupported(command));
        }
        let max = self.max_hardware_brightness().await?.max(1);
        let percent = percent_of(value, display.min_brightness, display.max_brightness);
        let hardware = lux_core::compute_from_percent(percent, 0, max, 0);
        fs::write(self.device_dir.join("brightness"), hardware.to_string())
            .await
            .map_err(ControlError::from)
    }

    async fn is_responsive(&self, _display: &DisplayRecord) -> bool {
        self.read_attr("actual_brightness").await.is_ok()
    }

    async fn reset_state(&self, _display: &DisplayRecord) -> Result<(), ControlError> {
        // Rewriting the current hardware value flushes a wedged firmware
        // queue without visibly changing the panel.
        let actual = self.read_attr("actual_brightness").await?;
        fs::write(self.device_dir.join("brightness"), actual.to_string())
            .await
            .map_err(ControlError::from)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn fake_backlight(max: i64, actual: i64) -> (tempdir::TempDirGuard, NativeApiControl) {
        let dir = tempdir::TempDirGuard::new("luxd_backlight_test");
        tokio::fs::write(dir.path().join("max_brightness"), max.to_string())
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("actual_brightness"), actual.to_string())
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("brightness"), actual.to_string())
            .await
            .unwrap();
        let control = NativeApiControl::new(dir.path());
        (dir, control)
    }

    /// Minimal temp-dir helper so the tests do not depend on an extra crate.
    mod tempdir {
        use std::path::{Path, PathBuf};

        pub struct TempDirGuard(PathBuf);

        impl TempDirGuard {
            pub fn new(prefix: &str) -> Self {
                let path = std::env::temp_dir().join(format!(
                    "{prefix}_{}_{:?}",
                    std::process::id(),
                    std::thread::current().id()
                ));
                std::fs::create_dir_all(&path).unwrap();
                Self(path)
            }

            pub fn path(&self) -> &Path {
                &self.0
            }
        }

        impl Drop for TempDirGuard {
            fn drop(&mut self) {
                std::fs::remove_dir_all(&self.0).ok();
            }
        }
    }

    #[tokio::test]
    async fn test_native_write_scales_record_range_to_hardware_range() {
        let (dir, control) = fake_backlight(255, 100).await;
        let record = DisplayRecord::new(1, "s", "panel");

        // Record range is 0..100; 50% of a 255-step backlight is 128.
        control.write(&record, Command::Brightness, 50).await.unwrap();

        let written = tokio::fs::read_to_string(dir.path().join("brightness"))
            .await
            .unwrap();
        assert_eq!(written.trim(), "128");
    }

    #[tokio::test]
    async fn test_native_read_scales_hardware_value_into_record_range() {
        let (_dir, control) = fake_backlight(200, 100).await;
        let record = DisplayRecord::new(1, "s", "panel");
        // 100/200 = 50% of the record's 0..100 range.
        assert_eq!(control.read(&record, Command::Brightness).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_native_rejects_unsupported_commands() {
        let (_dir, control) = fake_backlight(100, 10).await;
        let record = DisplayRecord::new(1, "s", "panel");
        assert!(matches!(
            control.read(&record, Command::Volume).await,
            Err(ControlError::Unsupported(Command::Volume))
        ));
        assert!(matches!(
            control.write(&record, Command::Contrast, 1).await,
            Err(ControlError::Unsupported(Command::Contrast))
        ));
    }

    #[tokio::test]
    async fn test_native_missing_device_is_unresponsive() {
        let control = NativeApiControl::new("/nonexistent/backlight/device");
        let record = DisplayRecord::new(1, "s", "panel");
        assert!(!control.exists(&record).await);
        assert!(!control.is_responsive(&record).await);
    }
}
