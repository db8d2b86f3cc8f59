//! Display identity resolution.
//!
//! Enumeration hands out transient numeric ids, and monitor firmware is
//! sloppy: serial numbers and product ids can drift by a couple of units
//! across firmware updates.  Cross-session identity therefore rests on two
//! mechanisms:
//!
//! 1. A **derived serial** computed from EDID attributes, used as the
//!    datastore key.
//! 2. **Exact and fuzzy attribute matching** ([`full_match`] /
//!    [`partial_match_score`]) for records whose derived serial no longer
//!    lines up with the freshly enumerated attributes.
//!
//! Exact matches always outrank fuzzy ones; among fuzzy candidates the
//! maximum score wins and ties resolve to the first-encountered record.

use tracing::debug;

use super::display::DisplayRecord;

/// Proximity window for serial/product/vendor closeness scoring.
const PROXIMITY_WINDOW: i64 = 3;

/// Freshly enumerated EDID-like attributes of one display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareAttributes {
    pub name: String,
    pub serial_number: i64,
    pub product_id: i64,
    pub manufacture_year: i64,
    pub vendor_id: Option<i64>,
}

/// Derives the durable serial for a set of hardware attributes.
///
/// The result is deterministic and human-readable; uniqueness across
/// *simultaneously connected* duplicates is handled separately by
/// [`ensure_unique_serials`].
pub fn derive_serial(attrs: &HardwareAttributes) -> String {
    let slug: String = attrs
        .name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    format!(
        "{}-{}-{}-{}-{}",
        slug.trim_matches('-'),
        attrs.manufacture_year,
        attrs.serial_number,
        attrs.product_id,
        attrs.vendor_id.unwrap_or(0)
    )
}

/// Disambiguates colliding serials by suffixing the raw hardware id.
///
/// Two identical monitors connected at the same time derive the same serial;
/// when any collision is present, every serial in the generation is suffixed
/// so the stored keys stay stable relative to each other.
pub fn ensure_unique_serials(entries: &mut [(u32, String)]) {
    let mut seen = std::collections::HashSet::new();
    let collides = entries.iter().any(|(_, serial)| !seen.insert(serial.clone()));
    if collides {
        for (id, serial) in entries.iter_mut() {
            *serial = format!("{serial}-{id}");
        }
    }
}

/// Exact-match predicate.
///
/// Requires name equality AND exact manufacture year, serial number, and
/// product id.  A vendor-id match alone also satisfies the predicate when
/// both sides carry one.
pub fn full_match(record: &DisplayRecord, attrs: &HardwareAttributes) -> bool {
    let mut matches = record.edid_name == attrs.name
        && record.manufacture_year == attrs.manufacture_year
        && record.serial_number == attrs.serial_number
        && record.product_id == attrs.product_id;

    if let (Some(vendor), Some(record_vendor)) = (attrs.vendor_id, record.vendor_id) {
        matches = matches || record_vendor == vendor;
    }

    matches
}

/// Fuzzy-match score for one candidate record.
///
/// +1 for name equality, +1 for manufacture-year equality, and up to +3 per
/// numeric attribute scaled by closeness (`3 - |Δ|` inside a window of 3).
/// The product-id bonus gates on product-id closeness but the bonus itself
/// tracks the distance between the candidate's product id and the enumerated
/// serial number.
pub fn partial_match_score(record: &DisplayRecord, attrs: &HardwareAttributes) -> i64 {
    let mut score = i64::from(record.edid_name == attrs.name);
    score += i64::from(record.manufacture_year == attrs.manufacture_year);

    let serial_delta = (record.serial_number - attrs.serial_number).abs();
    if serial_delta < PROXIMITY_WINDOW {
        score += PROXIMITY_WINDOW - serial_delta;
    }

    let product_delta = (record.product_id - attrs.product_id).abs();
    if product_delta < PROXIMITY_WINDOW {
        score += PROXIMITY_WINDOW - (record.product_id - attrs.serial_number).abs();
    }

    if let (Some(vendor), Some(record_vendor)) = (attrs.vendor_id, record.vendor_id) {
        let vendor_delta = (record_vendor - vendor).abs();
        if vendor_delta < PROXIMITY_WINDOW {
            score += PROXIMITY_WINDOW - vendor_delta;
        }
    }

    score
}

/// Finds the record matching the given attributes.
///
/// Tries [`full_match`] first; otherwise returns the maximum-scoring fuzzy
/// candidate, resolving ties to the first-encountered record.  Returns `None`
/// only when `records` is empty.
pub fn resolve<'a>(
    records: impl IntoIterator<Item = &'a DisplayRecord>,
    attrs: &HardwareAttributes,
) -> Option<&'a DisplayRecord> {
    let records: Vec<&DisplayRecord> = records.into_iter().collect();

    if let Some(exact) = records.iter().copied().find(|record| full_match(record, attrs)) {
        return Some(exact);
    }

    let mut best: Option<(&DisplayRecord, i64)> = None;
    let mut tied = 0usize;
    for record in records.iter().copied() {
        let score = partial_match_score(record, attrs);
        match best {
            Some((_, best_score)) if score == best_score => tied += 1,
            Some((_, best_score)) if score > best_score => {
                best = Some((record, score));
                tied = 0;
            }
            None => best = Some((record, score)),
            _ => {}
        }
    }

    if tied > 0 {
        if let Some((record, score)) = best {
            debug!(
                serial = %record.serial,
                score,
                tied,
                "ambiguous identity match resolved to first-encountered candidate"
            );
        }
    }

    best.map(|(record, _)| record)
}

/// Best fuzzy score across the candidate set, without the full-match
/// shortcut.  Used by callers that need a confidence threshold.
pub fn best_partial_score<'a>(
    records: impl IntoIterator<Item = &'a DisplayRecord>,
    attrs: &HardwareAttributes,
) -> i64 {
    records
        .into_iter()
        .map(|record| partial_match_score(record, attrs))
        .max()
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
