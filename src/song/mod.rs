pub mod decode;
pub mod signatures;
pub mod tempo;

pub use decode::{DecodeError, load_song, parse_song};
pub use signatures::{KeySignature, PITCH_CLASS_NAMES, TimeSignature};
pub use tempo::TickMap;

/// A single note, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub start: f64,
    pub end: f64,
    pub pitch: u8,
    pub velocity: u8,
}

impl Note {
    pub fn pitch_class(&self) -> usize {
        (self.pitch % 12) as usize
    }
}

/// Notes played by one (program, channel, track) combination.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub program: u8,
    pub channel: u8,
    pub track: usize,
    pub is_drum: bool,
    /// In release order: a note lands here when its note-off is read.
    pub notes: Vec<Note>,
}

/// A parsed MIDI file.
#[derive(Debug, Clone)]
pub struct Song {
    /// Ticks per quarter note.
    pub resolution: u16,
    pub tick_map: TickMap,
    /// Length of the tick table: every tick in `0..tick_count` is part of the song.
    pub tick_count: u64,
    /// In stored (file) order.
    pub key_signatures: Vec<KeySignature>,
    /// In stored (file) order.
    pub time_signatures: Vec<TimeSignature>,
    pub instruments: Vec<Instrument>,
}

impl Song {
    pub fn tick_to_time(&self, tick: u64) -> f64 {
        self.tick_map.tick_to_time(tick)
    }

    /// Time of the last note release, or 0.0 for a song without notes.
    pub fn end_time(&self) -> f64 {
        self.instruments
            .iter()
            .flat_map(|i| i.notes.iter())
            .map(|n| n.end)
            .fold(0.0, f64::max)
    }
}
