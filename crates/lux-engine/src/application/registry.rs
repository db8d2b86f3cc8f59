//! Display registry: enumeration → identity reconciliation → active set.
//!
//! On every refresh the registry derives a durable serial for each
//! enumerated display, loads stored records by serial, fuzzy-matches the
//! leftovers, creates fresh records for genuinely new hardware, persists the
//! result, and replaces the engine's active-display map.  Disconnected
//! records simply drop out of the map.

use std::collections::HashMap;

use lux_core::{
    derive_serial, domain::identity, ensure_unique_serials, DisplayId, DisplayRecord,
    HardwareAttributes,
};
use tracing::{debug, info, warn};

use crate::application::engine::EngineContext;
use crate::infrastructure::enumeration::EnumeratedDisplay;

/// Re-enumerates hardware and rebuilds the active-display map.
///
/// Returns the number of active displays.
pub async fn refresh(ctx: &EngineContext) -> usize {
    let enumerated = match ctx
        .collaborators
        .enumerator
        .find_external_displays(ctx.config.include_virtual_displays)
        .await
    {
        Ok(mapping) => mapping,
        Err(e) => {
            warn!(error = %e, "display enumeration failed, keeping empty set");
            HashMap::new()
        }
    };

    // Deterministic processing order so serial disambiguation and identity
    // ties are stable across refreshes.
    let mut entries: Vec<(DisplayId, EnumeratedDisplay, String)> = enumerated
        .into_iter()
        .map(|(id, display)| {
            let serial = derive_serial(&display.attributes);
            (id, display, serial)
        })
        .collect();
    entries.sort_by_key(|(id, _, _)| *id);

    let mut id_serials: Vec<(u32, String)> = entries
        .iter()
        .map(|(id, _, serial)| (*id, serial.clone()))
        .collect();
    ensure_unique_serials(&mut id_serials);
    for (entry, (_, serial)) in entries.iter_mut().zip(&id_serials) {
        entry.2 = serial.clone();
    }

    let serials: Vec<String> = id_serials.into_iter().map(|(_, serial)| serial).collect();
    let stored = ctx.collaborators.datastore.displays(&serials);
    if stored.is_none() {
        debug!("no stored display records, treating as first run");
    }
    let mut by_serial: HashMap<String, DisplayRecord> = stored
        .unwrap_or_default()
        .into_iter()
        .map(|record| (record.serial.clone(), record))
        .collect();

    let mut next: HashMap<DisplayId, DisplayRecord> = HashMap::new();
    for (id, display, serial) in entries {
        let mut record = if let Some(record) = by_serial.remove(&serial) {
            record
        } else if let Some(record) = adopt_by_attributes(&mut by_serial, &display.attributes) {
            info!(
                old_serial = %record.serial,
                new_serial = %serial,
                "adopted drifted display identity"
            );
            record
        } else {
            fresh_record(id, &serial, &display)
        };

        record.id = id;
        record.serial = serial;
        record.active = true;
        record.edid_name = display.name.clone();
        if record.name.is_empty() {
            record.name = display.name.clone();
        }
        record.manufacture_year = display.attributes.manufacture_year;
        record.serial_number = display.attributes.serial_number;
        record.product_id = display.attributes.product_id;
        record.vendor_id = display.attributes.vendor_id;
        record.clear_downgrades();
        next.insert(id, record);
    }

    ctx.collaborators
        .datastore
        .store_displays(next.values().cloned().collect());

    let count = next.len();
    *ctx.displays.write().await = next;
    count
}

/// Adopts a stored record whose serial no longer lines up but whose
/// attributes still match exactly or fuzzily.  A zero fuzzy score shares no
/// attribute at all and is treated as new hardware instead.
fn adopt_by_attributes(
    by_serial: &mut HashMap<String, DisplayRecord>,
    attrs: &HardwareAttributes,
) -> Option<DisplayRecord> {
    let has_full_match = by_serial.values().any(|r| identity::full_match(r, attrs));
    if !has_full_match && identity::best_partial_score(by_serial.values(), attrs) <= 0 {
        return None;
    }
    let serial = identity::resolve(by_serial.values(), attrs)?.serial.clone();
    by_serial.remove(&serial)
}

fn fresh_record(id: DisplayId, serial: &str, enumerated: &EnumeratedDisplay) -> DisplayRecord {
    debug!(id, serial, name = %enumerated.name, "creating fresh display record");
    DisplayRecord::new(id, serial, &enumerated.name)
}
