//! Display enumeration.
//!
//! Produces a mapping of transient hardware ids to the EDID-like attributes
//! the identity matcher consumes.  An empty mapping means no external
//! displays — that is a normal state, never an error.
//!
//! The Linux implementation walks `/sys/class/drm/card*-*` connectors and
//! parses the minimal EDID fields needed for matching: vendor letters,
//! product id, serial number, manufacture year, and the display-name
//! descriptor.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use lux_core::{DisplayId, HardwareAttributes};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Error type for enumeration operations.
#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One freshly enumerated display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumeratedDisplay {
    pub name: String,
    pub attributes: HardwareAttributes,
}

/// Enumeration seam.
#[async_trait]
pub trait DisplayEnumerator: Send + Sync {
    /// Returns hardware id → display for every connected external display.
    async fn find_external_displays(
        &self,
        include_virtual: bool,
    ) -> Result<HashMap<DisplayId, EnumeratedDisplay>, EnumerationError>;
}

/// Parses the EDID fields the identity matcher needs.
///
/// Returns `None` when the blob is shorter than one EDID block.
pub fn parse_edid(edid: &[u8]) -> Option<(String, HardwareAttributes)> {
    if edid.len() < 128 {
        return None;
    }

    // Manufacturer ID: bytes 8-9, big-endian, three 5-bit letters.
    let mfg_id = u16::from_be_bytes([edid[8], edid[9]]);
    let letters = [
        (((mfg_id >> 10) & 0x1F) as u8 + 0x40) as char,
        (((mfg_id >> 5) & 0x1F) as u8 + 0x40) as char,
        ((mfg_id & 0x1F) as u8 + 0x40) as char,
    ];
    let vendor_id = if letters.iter().all(char::is_ascii_uppercase) {
        Some(i64::from(mfg_id))
    } else {
        None
    };

    let product_id = i64::from(u16::from_le_bytes([edid[10], edid[11]]));
    let serial_number = i64::from(u32::from_le_bytes([edid[12], edid[13], edid[14], edid[15]]));
    let manufacture_year = 1990 + i64::from(edid[17]);

    // Walk the four 18-byte descriptor blocks for the display name (0xFC).
    let mut name = String::new();
    let mut offset = 54;
    while offset + 18 <= 128 {
        let block = &edid[offset..offset + 18];
        if block[0] == 0 && block[1] == 0 && block[3] == 0xFC {
            name = block[5..18]
                .iter()
                .copied()
                .take_while(|&b| b != 0x0A && b != 0x00)
                .map(char::from)
                .collect::<String>()
                .trim()
                .to_string();
        }
        offset += 18;
    }
    if name.is_empty() {
        name = letters.iter().collect();
    }

    let attributes = HardwareAttributes {
        name: name.clone(),
        serial_number,
        product_id,
        manufacture_year,
        vendor_id,
    };
    Some((name, attributes))
}

/// Stable-within-a-boot hardware id derived from the connector name.
fn connector_id(connector: &str) -> DisplayId {
    connector
        .bytes()
        .fold(2_166_136_261u32, |hash, byte| {
            (hash ^ u32::from(byte)).wrapping_mul(16_777_619)
        })
}

/// DRM/sysfs enumerator.
pub struct DrmEnumerator {
    drm_root: PathBuf,
}

impl DrmEnumerator {
    pub fn new(drm_root: impl Into<PathBuf>) -> Self {
        Self {
            drm_root: drm_root.into(),
        }
    }
}

impl Default for DrmEnumerator {
    fn default() -> Self {
        Self::new("/sys/class/drm")
    }
}

#[async_trait]
impl DisplayEnumerator for DrmEnumerator {
    async fn find_external_displays(
        &self,
        include_virtual: bool,
    ) -> Result<HashMap<DisplayId, EnumeratedDisplay>, EnumerationError> {
        let mut displays = HashMap::new();

        let mut entries = match fs::read_dir(&self.drm_root).await {
            Ok(entries) => entries,
            // No DRM class at all (headless container): no displays.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(displays),
            Err(source) => {
                return Err(EnumerationError::Io {
                    path: self.drm_root.clone(),
                    source,
                })
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let connector_path = entry.path();
            let connector = entry.file_name().to_string_lossy().to_string();
            // Connectors look like "card0-DP-1"; the bare "card0" device
            // node and render nodes are skipped.
            if !connector.contains('-') {
                continue;
            }
            // Built-in panels go through the native channel, not enumeration.
            if connector.contains("-eDP-") || connector.contains("-LVDS-") {
                continue;
            }
            if !include_virtual && connector.contains("-Virtual") {
                continue;
            }

            let status = fs::read_to_string(connector_path.join("status"))
                .await
                .unwrap_or_default();
            if status.trim() != "connected" {
                continue;
            }

            let edid = fs::read(connector_path.join("edid")).await.unwrap_or_default();
            let Some((name, attributes)) = parse_edid(&edid) else {
                debug!(connector, "connected display without parseable EDID, skipping");
                continue;
            };

            displays.insert(
                connector_id(&connector),
                EnumeratedDisplay { name, attributes },
            );
        }

        Ok(displays)
    }
}

/// Scripted enumerator for tests and headless runs.
#[derive(Default)]
pub struct MockEnumerator {
    displays: std::sync::Mutex<HashMap<DisplayId, EnumeratedDisplay>>,
}

impl MockEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a display as connected.
    pub fn connect(&self, id: DisplayId, name: &str, attributes: HardwareAttributes) {
        self.displays.lock().expect("lock poisoned").insert(
            id,
            EnumeratedDisplay {
                name: name.to_string(),
                attributes,
            },
        );
    }

    /// Marks a display as disconnected.
    pub fn disconnect(&self, id: DisplayId) {
        self.displays.lock().expect("lock poisoned").remove(&id);
    }
}

#[async_trait]
impl DisplayEnumerator for MockEnumerator {
    async fn find_external_displays(
        &self,
        _include_virtual: bool,
    ) -> Result<HashMap<DisplayId, EnumeratedDisplay>, EnumerationError> {
        Ok(self.displays.lock().expect("lock poisoned").clone())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a minimal 128-byte EDID block with the fields the parser reads.
    fn fake_edid(name: &str, vendor: u16, product: u16, serial: u32, year_offset: u8) -> Vec<u8> {
        let mut edid = vec![0u8; 128];
        edid[8..10].copy_from_slice(&vendor.to_be_bytes());
        edid[10..12].copy_from_slice(&product.to_le_bytes());
        edid[12..16].copy_from_slice(&serial.to_le_bytes());
        edid[17] = year_offset;
        // Display-name descriptor in the first descriptor block.
        edid[54] = 0;
        edid[55] = 0;
        edid[57] = 0xFC;
        let bytes = name.as_bytes();
        let n = bytes.len().min(13);
        edid[59..59 + n].copy_from_slice(&bytes[..n]);
        if n < 13 {
            edid[59 + n] = 0x0A;
        }
        edid
    }

    // "GSM" packed as 5-bit letters: G=7, S=19, M=13.
    const GSM: u16 = (7 << 10) | (19 << 5) | 13;

    #[test]
    fn test_parse_edid_extracts_all_matcher_fields() {
        let edid = fake_edid("LG Ultra HD", GSM, 23305, 314041, 27);
        let (name, attrs) = parse_edid(&edid).expect("parseable");
        assert_eq!(name, "LG Ultra HD");
        assert_eq!(attrs.product_id, 23305);
        assert_eq!(attrs.serial_number, 314041);
        assert_eq!(attrs.manufacture_year, 2017);
        assert_eq!(attrs.vendor_id, Some(i64::from(GSM)));
    }

    #[test]
    fn test_parse_edid_falls_back_to_vendor_letters_without_name_descriptor() {
        let mut edid = fake_edid("x", GSM, 1, 2, 10);
        // Clobber the descriptor tag.
        edid[57] = 0x00;
        let (name, _) = parse_edid(&edid).expect("parseable");
        assert_eq!(name, "GSM");
    }

    #[test]
    fn test_parse_edid_rejects_short_blob() {
        assert!(parse_edid(&[0u8; 64]).is_none());
    }

    #[test]
    fn test_connector_id_is_stable_and_distinct() {
        assert_eq!(connector_id("card0-DP-1"), connector_id("card0-DP-1"));
        assert_ne!(connector_id("card0-DP-1"), connector_id("card0-DP-2"));
    }

    #[tokio::test]
    async fn test_mock_enumerator_connect_and_disconnect() {
        let enumerator = MockEnumerator::new();
        let attrs = HardwareAttributes {
            name: "A".into(),
            serial_number: 1,
            product_id: 2,
            manufacture_year: 2020,
            vendor_id: None,
        };
        enumerator.connect(7, "A", attrs);
        assert_eq!(
            enumerator.find_external_displays(false).await.unwrap().len(),
            1
        );
        enumerator.disconnect(7);
        assert!(enumerator
            .find_external_displays(false)
            .await
            .unwrap()
            .is_empty());
    }
}
