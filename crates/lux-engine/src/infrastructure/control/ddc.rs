//! DDC/CI control channel.
//!
//! Speaks MCCS VCP over the display's data connection: brightness (0x10),
//! contrast (0x12), audio volume (0x62), audio mute (0x8D), and input
//! source (0x60).  The byte-level transport is abstracted behind [`DdcBus`];
//! on Linux the bus talks to `/dev/i2c-N` at the DDC slave address 0x37.
//!
//! Packet layout (after the slave address byte):
//!
//! ```text
//! Set VCP:  51 84 03 <op> <hi> <lo> <chk>
//! Get VCP:  51 82 01 <op> <chk>
//! Reply:    6E 88 02 <rc> <op> <type> <max hi> <max lo> <cur hi> <cur lo> <chk>
//! ```
//!
//! Checksums are XOR over the destination address and every preceding byte.

use std::sync::Arc;

use async_trait::async_trait;
use lux_core::{cap, Capability, DisplayId, DisplayRecord};
use tracing::debug;

use super::{Command, ControlBackend, ControlError};

/// DDC/CI slave address on the i2c bus.
pub const DDC_SLAVE_ADDR: u16 = 0x37;
/// Source address byte the host writes into every packet.
const HOST_SOURCE: u8 = 0x51;
/// Destination address as it appears in checksums (slave << 1).
const DEST_FOR_CHECKSUM: u8 = 0x6E;

pub const VCP_RESTORE_FACTORY_LUMINANCE: u8 = 0x05;
pub const VCP_BRIGHTNESS: u8 = 0x10;
pub const VCP_CONTRAST: u8 = 0x12;
pub const VCP_INPUT: u8 = 0x60;
pub const VCP_VOLUME: u8 = 0x62;
pub const VCP_MUTE: u8 = 0x8D;

/// A VCP feature value pair as returned by Get VCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcpValue {
    pub current: u16,
    pub maximum: u16,
}

/// Byte transport for DDC/CI packets.
#[async_trait]
pub trait DdcBus: Send + Sync {
    async fn set_vcp(
        &self,
        display: DisplayId,
        feature: u8,
        value: u16,
    ) -> Result<(), ControlError>;

    async fn get_vcp(&self, display: DisplayId, feature: u8) -> Result<VcpValue, ControlError>;

    /// Whether a bus device is registered for this display.
    async fn detect(&self, display: DisplayId) -> bool;
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(DEST_FOR_CHECKSUM, |acc, b| acc ^ b)
}

/// Builds a Set VCP packet (excluding the slave address byte).
pub fn set_vcp_packet(feature: u8, value: u16) -> [u8; 7] {
    let [hi, lo] = value.to_be_bytes();
    let mut packet = [HOST_SOURCE, 0x84, 0x03, feature, hi, lo, 0];
    packet[6] = checksum(&packet[..6]);
    packet
}

/// Builds a Get VCP request packet (excluding the slave address byte).
pub fn get_vcp_request(feature: u8) -> [u8; 5] {
    let mut packet = [HOST_SOURCE, 0x82, 0x01, feature, 0];
    packet[4] = checksum(&packet[..4]);
    packet
}

/// Parses a Get VCP reply for `feature`.
pub fn parse_vcp_reply(feature: u8, reply: &[u8]) -> Result<VcpValue, ControlError> {
    if reply.len() < 11 {
        return Err(ControlError::Bus(format!(
            "short VCP reply: {} bytes",
            reply.len()
        )));
    }
    if reply[3] != 0 {
        return Err(ControlError::Bus(format!(
            "VCP result code {:#04x}",
            reply[3]
        )));
    }
    if reply[4] != feature {
        return Err(ControlError::Bus(format!(
            "VCP reply for {:#04x}, expected {feature:#04x}",
            reply[4]
        )));
    }
    Ok(VcpValue {
        maximum: u16::from_be_bytes([reply[6], reply[7]]),
        current: u16::from_be_bytes([reply[8], reply[9]]),
    })
}

fn feature_for(command: Command) -> u8 {
    match command {
        Command::Brightness => VCP_BRIGHTNESS,
        Command::Contrast => VCP_CONTRAST,
        Command::Volume => VCP_VOLUME,
        Command::Mute => VCP_MUTE,
        Command::Input => VCP_INPUT,
    }
}

/// The DDC/CI control backend.
pub struct DdcControl {
    bus: Arc<dyn DdcBus>,
}

impl DdcControl {
    pub fn new(bus: Arc<dyn DdcBus>) -> Self {
        Self { bus }
    }

    /// Applies the per-display DDC write limits.
    fn limited(display: &DisplayRecord, command: Command, value: i64) -> i64 {
        match command {
            Command::Brightness => cap(value, 0, display.max_ddc_brightness),
            Command::Contrast => cap(value, 0, display.max_ddc_contrast),
            Command::Volume => cap(value, 0, display.max_ddc_volume),
            Command::Mute | Command::Input => value,
        }
    }
}

#[async_trait]
impl ControlBackend for DdcControl {
    fn kind(&self) -> Capability {
        Capability::Ddc
    }

    async fn exists(&self, display: &DisplayRecord) -> bool {
        self.bus.detect(display.id).await
    }

    async fn read(&self, display: &DisplayRecord, command: Command) -> Result<i64, ControlError> {
        let value = self.bus.get_vcp(display.id, feature_for(command)).await?;
        Ok(i64::from(value.current))
    }

    async fn write(
        &self,
        display: &DisplayRecord,
        command: Command,
        value: i64,
    ) -> Result<(), ControlError> {
        let value = Self::limited(display, command, value);
        let wire = u16::try_from(value.max(0)).unwrap_or(u16::MAX);
        self.bus
            .set_vcp(display.id, feature_for(command), wire)
            .await
    }

    async fn is_responsive(&self, display: &DisplayRecord) -> bool {
        self.bus.get_vcp(display.id, VCP_BRIGHTNESS).await.is_ok()
    }

    async fn reset_state(&self, record: &DisplayRecord) -> Result<(), ControlError> {
        debug!(display = record.id, "writing DDC calibration sequence");
        self.bus
            .set_vcp(record.id, VCP_RESTORE_FACTORY_LUMINANCE, 1)
            .await
    }
}

#[cfg(target_os = "linux")]
pub mod linux {
    //! `/dev/i2c-N` bus implementation using the kernel i2c-dev interface.
    //!
    //! Displays are registered with their i2c device path at enumeration
    //! time.  The blocking ioctl-based I/O runs on the blocking thread pool.

    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use i2cdev::core::I2CDevice;
    use i2cdev::linux::LinuxI2CDevice;
    use lux_core::DisplayId;

    use super::{
        get_vcp_request, parse_vcp_reply, set_vcp_packet, ControlError, DdcBus, VcpValue,
        DDC_SLAVE_ADDR,
    };

    /// Delay between a Get VCP request and the reply read, per MCCS timing.
    const REPLY_DELAY: Duration = Duration::from_millis(40);

    pub struct LinuxI2cBus {
        devices: Mutex<HashMap<DisplayId, PathBuf>>,
    }

    impl LinuxI2cBus {
        pub fn new() -> Self {
            Self {
                devices: Mutex::new(HashMap::new()),
            }
        }

        /// Associates a display with its i2c character device.
        pub fn register(&self, display: DisplayId, device: PathBuf) {
            self.devices
                .lock()
                .expect("lock poisoned")
                .insert(display, device);
        }

        fn device_path(&self, display: DisplayId) -> Option<PathBuf> {
            self.devices
                .lock()
                .expect("lock poisoned")
                .get(&display)
                .cloned()
        }
    }

    impl Default for LinuxI2cBus {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl DdcBus for LinuxI2cBus {
        async fn set_vcp(
            &self,
            display: DisplayId,
            feature: u8,
            value: u16,
        ) -> Result<(), ControlError> {
            let path = self
                .device_path(display)
                .ok_or_else(|| ControlError::Bus(format!("no i2c device for display {display}")))?;
            tokio::task::spawn_blocking(move || {
                let mut device = LinuxI2CDevice::new(&path, DDC_SLAVE_ADDR)
                    .map_err(|e| ControlError::Bus(e.to_string()))?;
                device
                    .write(&set_vcp_packet(feature, value))
                    .map_err(|e| ControlError::Bus(e.to_string()))
            })
            .await
            .map_err(|e| ControlError::Bus(e.to_string()))?
        }

        async fn get_vcp(
            &self,
            display: DisplayId,
            feature: u8,
        ) -> Result<VcpValue, ControlError> {
            let path = self
                .device_path(display)
                .ok_or_else(|| ControlError::Bus(format!("no i2c device for display {display}")))?;
            tokio::task::spawn_blocking(move || {
                let mut device = LinuxI2CDevice::new(&path, DDC_SLAVE_ADDR)
                    .map_err(|e| ControlError::Bus(e.to_string()))?;
                device
                    .write(&get_vcp_request(feature))
                    .map_err(|e| ControlError::Bus(e.to_string()))?;
                std::thread::sleep(REPLY_DELAY);
                let mut reply = [0u8; 11];
                device
                    .read(&mut reply)
                    .map_err(|e| ControlError::Bus(e.to_string()))?;
                parse_vcp_reply(feature, &reply)
            })
            .await
            .map_err(|e| ControlError::Bus(e.to_string()))?
        }

        async fn detect(&self, display: DisplayId) -> bool {
            self.device_path(display).is_some()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
