//! Windowed note features for one song.
//!
//! A song is cut into fixed tick windows. Each window becomes one row:
//! `start_time, end_time, key_signature, time_signature`, then 13 values per instrument
//! (12 pitch-class presence flags followed by the mean velocity of the window's notes).

use std::io::Write;

use crate::song::signatures::{key_signature_at, time_signature_at};
use crate::song::{Note, PITCH_CLASS_NAMES, Song};

/// Leading context columns before the per-instrument block.
pub const CONTEXT_COLUMNS: [&str; 4] =
    ["start_time", "end_time", "key_signature", "time_signature"];

/// Values per instrument: 12 pitch classes + mean velocity.
pub const VALUES_PER_INSTRUMENT: usize = 13;

/// One instrument's summary of one window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InstrumentSummary {
    pub pitch_classes: [u8; 12],
    pub mean_velocity: f64,
}

impl InstrumentSummary {
    pub fn is_empty(&self) -> bool {
        self.pitch_classes.iter().all(|&f| f == 0) && self.mean_velocity == 0.0
    }
}

/// One window of a song.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub start_time: f64,
    pub end_time: f64,
    pub key_signature: u8,
    pub time_signature: f64,
    pub instruments: Vec<InstrumentSummary>,
}

impl FeatureRow {
    pub fn column_count(&self) -> usize {
        CONTEXT_COLUMNS.len() + VALUES_PER_INSTRUMENT * self.instruments.len()
    }

    fn to_record(&self) -> Vec<String> {
        let mut record = Vec::with_capacity(self.column_count());
        record.push(self.start_time.to_string());
        record.push(self.end_time.to_string());
        record.push(self.key_signature.to_string());
        record.push(self.time_signature.to_string());
        for summary in &self.instruments {
            record.extend(summary.pitch_classes.iter().map(|f| f.to_string()));
            record.push(summary.mean_velocity.to_string());
        }
        record
    }
}

/// All windows of one song plus its column names.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Write as tab-separated values with a header row.
    pub fn write_tsv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.to_record())?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Column names for a song with `instrument_count` instruments.
pub fn column_names(instrument_count: usize) -> Vec<String> {
    let mut columns: Vec<String> = CONTEXT_COLUMNS.iter().map(|c| c.to_string()).collect();
    for idx in 0..instrument_count {
        for name in PITCH_CLASS_NAMES {
            columns.push(format!("instrument {}: {}", idx, name));
        }
        columns.push(format!("instrument {}: velocity", idx));
    }
    columns
}

/// Window boundaries in seconds: one per `tick_window` step over the song's ticks.
/// The last window may run past the final tick.
pub fn windows(song: &Song, tick_window: u64) -> Vec<(f64, f64)> {
    let step = tick_window.max(1);
    (0..song.tick_count)
        .step_by(step as usize)
        .map(|tick| (song.tick_to_time(tick), song.tick_to_time(tick + step)))
        .collect()
}

/// Notes that belong to the window `[start, end)`.
///
/// `notes` are scanned in release order. Notes starting before `start` are skipped and
/// collection stops at the first note that ends at or after `end`, even if later notes
/// would still fit.
pub fn collect_relevant_notes(notes: &[Note], start: f64, end: f64) -> Vec<&Note> {
    let mut relevant = Vec::new();
    for note in notes {
        if note.start < start {
            continue;
        }
        if note.end >= end {
            break;
        }
        relevant.push(note);
    }
    relevant
}

/// Summarize one instrument over `[start, end)`.
pub fn summarize_instrument(notes: &[Note], start: f64, end: f64) -> InstrumentSummary {
    let relevant = collect_relevant_notes(notes, start, end);
    if relevant.is_empty() {
        return InstrumentSummary::default();
    }

    let mut summary = InstrumentSummary::default();
    for note in &relevant {
        summary.pitch_classes[note.pitch_class()] = 1;
    }
    let total: f64 = relevant.iter().map(|n| n.velocity as f64).sum();
    summary.mean_velocity = total / relevant.len() as f64;
    summary
}

/// Build the full feature table of a song.
pub fn extract_features(song: &Song, tick_window: u64) -> FeatureTable {
    let rows = windows(song, tick_window)
        .into_iter()
        .map(|(start_time, end_time)| FeatureRow {
            start_time,
            end_time,
            key_signature: key_signature_at(&song.key_signatures, start_time),
            time_signature: time_signature_at(&song.time_signatures, start_time),
            instruments: song
                .instruments
                .iter()
                .map(|inst| summarize_instrument(&inst.notes, start_time, end_time))
                .collect(),
        })
        .collect();

    FeatureTable {
        columns: column_names(song.instruments.len()),
        rows,
    }
}
