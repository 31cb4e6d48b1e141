//! Exact-duplicate and DMX-overlap detection over a patch.
//!
//! Both checks are read-only and advisory: nothing here rejects an import.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::model::{Instrument, InstrumentId};

// ── Duplicates ──────────────────────────────────────────────────────

/// Rebuild a JSON value with every object's keys in sorted order.
fn canonical(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, canonical(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonical).collect()),
        other => other,
    }
}

/// Every field except `id`, serialized with sorted keys.
fn fingerprint(instrument: &Instrument) -> Option<String> {
    let mut value = match serde_json::to_value(instrument) {
        Ok(value) => value,
        Err(e) => {
            warn!(id = %instrument.id, error = %e, "instrument not serializable, skipping");
            return None;
        }
    };
    if let Value::Object(map) = &mut value {
        map.remove("id");
    }
    Some(canonical(value).to_string())
}

/// Groups (two or more) of instruments identical in every field but `id`, in
/// order of first appearance.
pub fn find_duplicates(instruments: &[Instrument]) -> Vec<Vec<InstrumentId>> {
    let mut groups: IndexMap<String, Vec<InstrumentId>> = IndexMap::new();
    for instrument in instruments {
        if let Some(key) = fingerprint(instrument) {
            groups.entry(key).or_default().push(instrument.id);
        }
    }
    groups.into_values().filter(|ids| ids.len() >= 2).collect()
}

// ── Overlaps ────────────────────────────────────────────────────────

fn ranges_intersect(a: &Instrument, b: &Instrument) -> bool {
    match (a.dmx_range(), b.dmx_range()) {
        (Some((ua, ra)), Some((ub, rb))) => {
            ua == ub && ra.start() <= rb.end() && rb.start() <= ra.end()
        }
        _ => false,
    }
}

/// Instruments other than `subject` whose DMX range shares a slot with the
/// subject's in the same universe. Unpatched and non-numeric addresses never
/// overlap anything.
pub fn find_overlaps(instruments: &[Instrument], subject: &Instrument) -> Vec<InstrumentId> {
    instruments
        .iter()
        .filter(|other| other.id != subject.id && ranges_intersect(subject, other))
        .map(|other| other.id)
        .collect()
}

/// Every overlapping pair once, lower id first, sorted.
pub fn all_overlaps(instruments: &[Instrument]) -> Vec<(InstrumentId, InstrumentId)> {
    let patched: Vec<&Instrument> = instruments.iter().filter(|i| i.dmx_range().is_some()).collect();
    let mut pairs = Vec::new();
    for (index, a) in patched.iter().enumerate() {
        for b in patched.iter().skip(index + 1) {
            if a.id != b.id && ranges_intersect(a, b) {
                pairs.push((a.id.min(b.id), a.id.max(b.id)));
            }
        }
    }
    pairs.sort_unstable();
    pairs.dedup();
    pairs
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::PartialInstrument;

    fn inst(id: u32, channel: &str, address: &str, footprint: u32) -> Instrument {
        let mut p = PartialInstrument::new(channel, 1);
        p.address = Some(address.into());
        p.dmx_footprint = Some(footprint);
        Instrument::from_partial(InstrumentId(id), 1, &p)
    }

    #[test]
    fn footprint_overlap_in_same_universe() {
        let wide = inst(1, "1", "1:10", 4);
        let inside = inst(2, "2", "1:12", 1);
        let other_universe = inst(3, "3", "2:12", 1);
        let after = inst(4, "4", "1:14", 1);
        let all = vec![wide.clone(), inside, other_universe, after];

        assert_eq!(find_overlaps(&all, &wide), vec![InstrumentId(2)]);
        assert_eq!(find_overlaps(&all, &all[1]), vec![InstrumentId(1)]);
        assert!(find_overlaps(&all, &all[2]).is_empty());
    }

    #[test]
    fn absolute_and_universe_forms_compare_equal() {
        let a = inst(1, "1", "513", 2);
        let b = inst(2, "2", "2/2", 1);
        assert_eq!(find_overlaps(&[a.clone(), b], &a), vec![InstrumentId(2)]);
    }

    #[test]
    fn unpatched_and_verbatim_never_overlap() {
        let blank = inst(1, "1", "", 1);
        let blank2 = inst(2, "2", "", 1);
        let verbatim = inst(3, "3", "DMX A", 1);
        let verbatim2 = inst(4, "4", "DMX A", 1);
        let zero = inst(5, "5", "0", 1);
        let all = vec![blank, blank2, verbatim, verbatim2, zero];
        for subject in &all {
            assert!(find_overlaps(&all, subject).is_empty());
        }
        assert!(all_overlaps(&all).is_empty());
    }

    #[test]
    fn all_overlaps_lists_each_pair_once() {
        let all = vec![
            inst(3, "3", "1:1", 10),
            inst(1, "1", "1:5", 1),
            inst(2, "2", "1:9", 4),
            inst(4, "4", "1:20", 1),
        ];
        assert_eq!(
            all_overlaps(&all),
            vec![
                (InstrumentId(1), InstrumentId(3)),
                (InstrumentId(2), InstrumentId(3)),
            ]
        );
    }

    #[test]
    fn duplicates_ignore_id_only() {
        let mut a = inst(1, "7", "1:1", 1);
        a.custom_fields.insert("Circuit".into(), "A1".into());
        a.custom_fields.insert("Focus".into(), "DS".into());
        let mut b = a.clone();
        b.id = InstrumentId(2);
        // Same custom fields, different insertion order.
        b.custom_fields.clear();
        b.custom_fields.insert("Focus".into(), "DS".into());
        b.custom_fields.insert("Circuit".into(), "A1".into());
        let mut c = a.clone();
        c.id = InstrumentId(3);
        c.part = 2;
        let d = inst(4, "8", "1:2", 1);
        let mut e = d.clone();
        e.id = InstrumentId(5);

        let groups = find_duplicates(&[a, b, c, d, e]);
        assert_eq!(
            groups,
            vec![
                vec![InstrumentId(1), InstrumentId(2)],
                vec![InstrumentId(4), InstrumentId(5)],
            ]
        );
    }

    #[test]
    fn no_duplicates_in_distinct_patch() {
        let all = vec![inst(1, "1", "1:1", 1), inst(2, "2", "1:2", 1)];
        assert!(find_duplicates(&all).is_empty());
    }
}
