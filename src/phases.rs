//! Phase table: the colour map and running histogram of one sample.
//!
//! Entries are addressed by a dense slot index. The id → slot map is a flat
//! vector sized to the largest id, so lookups in the pixel loop are a single
//! bounds-checked index. Ids are bounded by [`MAX_PHASE_ID`], the largest value
//! a 16-bit classification tile can hold.
use crate::error::{CompositeError, Result};
use image::Rgb;
use log::debug;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Name the instrument gives to the catch-all phase.
pub const UNCLASSIFIED_NAME: &str = "[Unclassified]";

pub const MAX_PHASE_ID: u32 = u16::MAX as u32;

/// One row of a phase metadata file.
#[derive(Clone, Debug, Deserialize)]
pub struct PhaseRecord {
    pub id: u32,
    pub name: String,
    /// `#RRGGBB`
    pub color: String,
    #[serde(default)]
    pub mass: Option<f64>,
    #[serde(default)]
    pub background: bool,
}

impl PhaseRecord {
    fn is_unclassified(&self) -> bool {
        self.background || self.name == UNCLASSIFIED_NAME
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PhaseEntry {
    pub id: u32,
    pub name: String,
    pub color: Rgb<u8>,
    /// `None` when the metadata carries no mass.
    pub mass: Option<f64>,
    pub pixel_count: u64,
}

#[derive(Clone, Debug, Default)]
pub struct PhaseTable {
    entries: Vec<PhaseEntry>,
    slots: Vec<Option<usize>>,
}

impl PhaseTable {
    /// Builds the table in metadata order. Unclassified/background phases are
    /// dropped when `exclude_unclassified` is set.
    pub fn from_records<I>(records: I, exclude_unclassified: bool) -> std::result::Result<Self, String>
    where
        I: IntoIterator<Item = PhaseRecord>,
    {
        let mut table = PhaseTable::default();
        let mut seen = HashSet::new();
        for record in records {
            if exclude_unclassified && record.is_unclassified() {
                debug!("Excluding phase {} ({})", record.id, record.name);
                continue;
            }
            if record.id > MAX_PHASE_ID {
                return Err(format!(
                    "phase {} ({}) has an id above {MAX_PHASE_ID}",
                    record.id, record.name
                ));
            }
            if !seen.insert(record.id) {
                return Err(format!("duplicate phase id {}", record.id));
            }
            let color = parse_hex_color(&record.color).ok_or_else(|| {
                format!(
                    "phase {} ({}) has invalid color {:?}",
                    record.id, record.name, record.color
                )
            })?;
            let slot = table.entries.len();
            let id = record.id as usize;
            if table.slots.len() <= id {
                table.slots.resize(id + 1, None);
            }
            table.slots[id] = Some(slot);
            table.entries.push(PhaseEntry {
                id: record.id,
                name: record.name,
                color,
                mass: record.mass,
                pixel_count: 0,
            });
        }
        Ok(table)
    }

    #[inline]
    pub fn lookup(&self, id: u32) -> Option<usize> {
        self.slots.get(id as usize).copied().flatten()
    }

    #[inline]
    pub fn entry(&self, slot: usize) -> &PhaseEntry {
        &self.entries[slot]
    }

    #[inline]
    pub fn record_pixel(&mut self, slot: usize) {
        self.entries[slot].pixel_count += 1;
    }

    pub fn entries(&self) -> &[PhaseEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn classified_total(&self) -> u64 {
        self.entries.iter().map(|e| e.pixel_count).sum()
    }

    /// Zeroed per-field histogram with one counter per slot.
    pub fn baseline(&self) -> FieldHistogram {
        FieldHistogram {
            counts: vec![0; self.entries.len()],
        }
    }

    /// Drops phases that never occurred and orders the rest by pixel count,
    /// descending, with ties broken by ascending id.
    pub fn into_ranked(self) -> Vec<PhaseEntry> {
        let mut ranked: Vec<PhaseEntry> = self
            .entries
            .into_iter()
            .filter(|e| e.pixel_count > 0)
            .collect();
        ranked.sort_by(|a, b| b.pixel_count.cmp(&a.pixel_count).then(a.id.cmp(&b.id)));
        ranked
    }
}

/// Per-field phase counts, reused across fields via [`FieldHistogram::reset`].
#[derive(Clone, Debug)]
pub struct FieldHistogram {
    counts: Vec<u64>,
}

impl FieldHistogram {
    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
    }

    #[inline]
    pub fn record(&mut self, slot: usize) {
        self.counts[slot] += 1;
    }

    /// Non-zero `(phase id, count)` pairs, most frequent first.
    pub fn ranked(&self, table: &PhaseTable) -> Vec<(u32, u64)> {
        let mut out: Vec<(u32, u64)> = self
            .counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(slot, &c)| (table.entry(slot).id, c))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        out
    }
}

/// Parses `#RRGGBB` (leading `#` optional).
pub fn parse_hex_color(text: &str) -> Option<Rgb<u8>> {
    let hex = text.trim().strip_prefix('#').unwrap_or(text.trim());
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

/// Reads a JSON array of [`PhaseRecord`]s and builds the sample's table.
pub fn load_phase_table(sample: &str, path: &Path, exclude_unclassified: bool) -> Result<PhaseTable> {
    if !path.is_file() {
        return Err(CompositeError::PhaseMetadataMissing {
            sample: sample.to_string(),
            path: path.to_path_buf(),
        });
    }
    let data = fs::read_to_string(path).map_err(|e| CompositeError::io(path, e))?;
    let records: Vec<PhaseRecord> =
        serde_json::from_str(&data).map_err(|e| CompositeError::PhaseMetadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    debug!("Extracting {} phases from {}", records.len(), path.display());
    PhaseTable::from_records(records, exclude_unclassified).map_err(|reason| {
        CompositeError::PhaseMetadata {
            path: path.to_path_buf(),
            reason,
        }
    })
}
