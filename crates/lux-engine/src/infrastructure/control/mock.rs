//! Scripted control backend for unit and integration tests.
//!
//! Lets tests choose the channel's capability, flip responsiveness and
//! existence at runtime, and inspect every write the engine issued — without
//! an i2c bus, relay, or compositor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use lux_core::{Capability, DisplayId, DisplayRecord};

use super::{Command, ControlBackend, ControlError};

/// A scripted implementation of [`ControlBackend`].
pub struct MockControl {
    kind: Capability,
    responsive: AtomicBool,
    exists: AtomicBool,
    fail_writes: AtomicBool,
    reset_count: AtomicU32,
    values: Mutex<HashMap<(DisplayId, Command), i64>>,
    writes: Mutex<Vec<(DisplayId, Command, i64)>>,
}

impl MockControl {
    pub fn new(kind: Capability) -> Self {
        Self {
            kind,
            responsive: AtomicBool::new(true),
            exists: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            reset_count: AtomicU32::new(0),
            values: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn set_responsive(&self, responsive: bool) {
        self.responsive.store(responsive, Ordering::SeqCst);
    }

    pub fn set_exists(&self, exists: bool) {
        self.exists.store(exists, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Seeds a value returned by subsequent reads.
    pub fn set_value(&self, display: DisplayId, command: Command, value: i64) {
        self.values
            .lock()
            .expect("lock poisoned")
            .insert((display, command), value);
    }

    /// Every `(display, command, value)` written so far, in order.
    pub fn writes(&self) -> Vec<(DisplayId, Command, i64)> {
        self.writes.lock().expect("lock poisoned").clone()
    }

    /// Number of times [`ControlBackend::reset_state`] was called.
    pub fn reset_count(&self) -> u32 {
        self.reset_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlBackend for MockControl {
    fn kind(&self) -> Capability {
        self.kind
    }

    async fn exists(&self, _display: &DisplayRecord) -> bool {
        self.exists.load(Ordering::SeqCst)
    }

    async fn read(&self, display: &DisplayRecord, command: Command) -> Result<i64, ControlError> {
        if !self.responsive.load(Ordering::SeqCst) {
            return Err(ControlError::Unresponsive(display.id));
        }
        Ok(self
            .values
            .lock()
            .expect("lock poisoned")
            .get(&(display.id, command))
            .copied()
            .unwrap_or(0))
    }

    async fn write(
        &self,
        display: &DisplayRecord,
        command: Command,
        value: i64,
    ) -> Result<(), ControlError> {
        if self.fail_writes.load(Ordering::SeqCst) || !self.responsive.load(Ordering::SeqCst) {
            return Err(ControlError::Unresponsive(display.id));
        }
        self.values
            .lock()
            .expect("lock poisoned")
            .insert((display.id, command), value);
        self.writes
            .lock()
            .expect("lock poisoned")
            .push((display.id, command, value));
        Ok(())
    }

    async fn is_responsive(&self, _display: &DisplayRecord) -> bool {
        self.responsive.load(Ordering::SeqCst)
    }

    async fn reset_state(&self, _display: &DisplayRecord) -> Result<(), ControlError> {
        self.reset_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_writes_in_order() {
        let mock = MockControl::new(Capability::Ddc);
        let record = DisplayRecord::new(3, "s", "d");

        mock.write(&record, Command::Brightness, 40).await.unwrap();
        mock.write(&record, Command::Contrast, 70).await.unwrap();

        assert_eq!(
            mock.writes(),
            vec![(3, Command::Brightness, 40), (3, Command::Contrast, 70)]
        );
    }

    #[tokio::test]
    async fn test_mock_read_returns_last_written_value() {
        let mock = MockControl::new(Capability::Ddc);
        let record = DisplayRecord::new(3, "s", "d");
        mock.write(&record, Command::Brightness, 40).await.unwrap();
        assert_eq!(mock.read(&record, Command::Brightness).await.unwrap(), 40);
    }

    #[tokio::test]
    async fn test_mock_unresponsive_fails_reads_and_writes() {
        let mock = MockControl::new(Capability::Ddc);
        let record = DisplayRecord::new(3, "s", "d");
        mock.set_responsive(false);
        assert!(!mock.is_responsive(&record).await);
        assert!(mock.read(&record, Command::Brightness).await.is_err());
        assert!(mock.write(&record, Command::Brightness, 1).await.is_err());
    }
}
