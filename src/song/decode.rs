use std::collections::HashMap;
use std::path::Path;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use thiserror::Error;

use super::signatures::{self, KeySignature, TimeSignature};
use super::{Instrument, Note, Song, TickMap};

/// Anything past this tick is almost certainly a corrupt file.
const MAX_TICK: u64 = 10_000_000;

/// General MIDI percussion channel (10, zero-based 9).
const DRUM_CHANNEL: u8 = 9;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("MIDI parse error: {0}")]
    Midi(#[from] midly::Error),
    #[error("SMPTE timecode timing is not supported")]
    UnsupportedTiming,
    #[error("MIDI file has a largest tick of {0}, it is likely corrupt")]
    TickOverflow(u64),
}

/// Read and parse a Standard MIDI File.
pub fn load_song(path: &Path) -> Result<Song, DecodeError> {
    let data = std::fs::read(path)?;
    parse_song(&data)
}

/// Parse Standard MIDI File bytes into a [`Song`].
pub fn parse_song(data: &[u8]) -> Result<Song, DecodeError> {
    let smf = Smf::parse(data)?;

    let resolution = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int(),
        Timing::Timecode(..) => return Err(DecodeError::UnsupportedTiming),
    };

    // Absolute ticks per event, keeping track order
    let tracks: Vec<Vec<(u64, TrackEventKind<'_>)>> = smf
        .tracks
        .iter()
        .map(|track| {
            let mut tick = 0u64;
            track
                .iter()
                .map(|event| {
                    tick += event.delta.as_int() as u64;
                    (tick, event.kind)
                })
                .collect()
        })
        .collect();

    let last_tick = tracks
        .iter()
        .filter_map(|t| t.last().map(|&(tick, _)| tick))
        .max()
        .unwrap_or(0);
    if last_tick + 1 > MAX_TICK {
        return Err(DecodeError::TickOverflow(last_tick));
    }

    // Tempo and signature events only count on track 0
    let mut tempo_events: Vec<(u64, u32)> = Vec::new();
    let mut ignored_meta = 0usize;
    for (track_idx, track) in tracks.iter().enumerate() {
        for &(tick, kind) in track {
            match kind {
                TrackEventKind::Meta(MetaMessage::Tempo(t)) if track_idx == 0 => {
                    tempo_events.push((tick, t.as_int()));
                }
                TrackEventKind::Meta(
                    MetaMessage::Tempo(..)
                    | MetaMessage::KeySignature(..)
                    | MetaMessage::TimeSignature(..),
                ) if track_idx > 0 => ignored_meta += 1,
                _ => {}
            }
        }
    }
    if ignored_meta > 0 {
        log::debug!(
            "Ignoring {} tempo, key or time signature events outside track 0",
            ignored_meta
        );
    }

    let tick_map = TickMap::new(resolution, &tempo_events);

    let mut key_signatures = Vec::new();
    let mut time_signatures = Vec::new();
    let mut instruments = InstrumentSet::default();

    for (track_idx, track) in tracks.iter().enumerate() {
        // Program per channel, reset for every track
        let mut programs = [0u8; 16];
        // (channel, pitch) -> open (start_tick, velocity) pairs
        let mut open_notes: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();

        for &(tick, kind) in track {
            match kind {
                TrackEventKind::Meta(MetaMessage::KeySignature(sharps_flats, minor))
                    if track_idx == 0 =>
                {
                    key_signatures.push(KeySignature {
                        time: tick_map.tick_to_time(tick),
                        key_number: signatures::key_number(sharps_flats, minor),
                    });
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, denom_pow, _, _))
                    if track_idx == 0 =>
                {
                    time_signatures.push(TimeSignature {
                        time: tick_map.tick_to_time(tick),
                        numerator,
                        denominator: 2u32.saturating_pow(denom_pow as u32),
                    });
                }
                TrackEventKind::Midi { channel, message } => {
                    let ch = channel.as_int();
                    match message {
                        MidiMessage::ProgramChange { program } => {
                            programs[ch as usize] = program.as_int();
                        }
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            open_notes
                                .entry((ch, key.as_int()))
                                .or_default()
                                .push((tick, vel.as_int()));
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let pitch = key.as_int();
                            // Spurious note-offs are ignored
                            let Some(open) = open_notes.remove(&(ch, pitch)) else {
                                continue;
                            };
                            // One note-off closes every note opened on an earlier tick.
                            // Notes opened on this very tick stay open, but only if
                            // something else was closed.
                            let (keep, close): (Vec<_>, Vec<_>) =
                                open.into_iter().partition(|&(start, _)| start == tick);

                            for &(start_tick, velocity) in &close {
                                instruments.push(
                                    (programs[ch as usize], ch, track_idx),
                                    Note {
                                        start: tick_map.tick_to_time(start_tick),
                                        end: tick_map.tick_to_time(tick),
                                        pitch,
                                        velocity,
                                    },
                                );
                            }
                            if !close.is_empty() && !keep.is_empty() {
                                open_notes.insert((ch, pitch), keep);
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }

    Ok(Song {
        resolution,
        tick_map,
        tick_count: last_tick + 2,
        key_signatures,
        time_signatures,
        instruments: instruments.finish(),
    })
}

/// Instruments in order of their first completed note.
#[derive(Default)]
struct InstrumentSet {
    index: HashMap<(u8, u8, usize), usize>,
    instruments: Vec<Instrument>,
}

impl InstrumentSet {
    fn push(&mut self, (program, channel, track): (u8, u8, usize), note: Note) {
        let idx = *self.index.entry((program, channel, track)).or_insert_with(|| {
            self.instruments.push(Instrument {
                program,
                channel,
                track,
                is_drum: channel == DRUM_CHANNEL,
                notes: Vec::new(),
            });
            self.instruments.len() - 1
        });
        self.instruments[idx].notes.push(note);
    }

    /// Notes stay in release order.
    fn finish(self) -> Vec<Instrument> {
        self.instruments
    }
}
