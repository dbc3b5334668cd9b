use std::path::Path;

use midiprep::config::{ExtractConfig, ReduceConfig};
use midiprep::{extractor, reducer};
use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

const TPQ: u16 = 480;

/// (start_tick, end_tick, pitch, velocity)
type NoteSpec = (u32, u32, u8, u8);

fn note_track(channel: u8, notes: &[NoteSpec]) -> Vec<TrackEvent<'static>> {
    let mut events: Vec<(u32, TrackEventKind<'static>)> = Vec::new();
    for &(start, end, pitch, vel) in notes {
        events.push((
            start,
            TrackEventKind::Midi {
                channel: u4::new(channel),
                message: MidiMessage::NoteOn {
                    key: u7::new(pitch),
                    vel: u7::new(vel),
                },
            },
        ));
        events.push((
            end,
            TrackEventKind::Midi {
                channel: u4::new(channel),
                message: MidiMessage::NoteOff {
                    key: u7::new(pitch),
                    vel: u7::new(0),
                },
            },
        ));
    }
    events.sort_by_key(|&(tick, _)| tick);
    to_track(events)
}

fn to_track(events: Vec<(u32, TrackEventKind<'static>)>) -> Vec<TrackEvent<'static>> {
    let mut last = 0;
    let mut track: Vec<TrackEvent<'static>> = events
        .into_iter()
        .map(|(tick, kind)| {
            let delta = tick - last;
            last = tick;
            TrackEvent {
                delta: u28::new(delta),
                kind,
            }
        })
        .collect();
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

/// Two instruments over four seconds at 120 BPM (3840 ticks), D major in 3/4.
fn two_track_song() -> Vec<u8> {
    let meta = to_track(vec![
        (0, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000)))),
        (0, TrackEventKind::Meta(MetaMessage::KeySignature(2, false))),
        (0, TrackEventKind::Meta(MetaMessage::TimeSignature(3, 2, 24, 8))),
    ]);
    let piano = note_track(0, &[(0, 50, 60, 80), (500, 980, 62, 70), (1000, 1060, 72, 90)]);
    let strings = note_track(1, &[(1000, 1040, 67, 100), (2000, 3840, 64, 60)]);
    encode(vec![meta, piano, strings])
}

fn encode(tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
    let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(u15::new(TPQ))));
    smf.tracks = tracks;
    let mut buf = Vec::new();
    smf.write_std(&mut buf).unwrap();
    buf
}

fn read_rows(path: &Path) -> (Vec<String>, Vec<Vec<f64>>) {
    let text = std::fs::read_to_string(path).unwrap();
    let mut lines = text.lines();
    let header = lines
        .next()
        .unwrap()
        .split('\t')
        .map(|s| s.to_string())
        .collect();
    let rows = lines
        .map(|l| l.split('\t').map(|v| v.parse::<f64>().unwrap()).collect())
        .collect();
    (header, rows)
}

fn setup() -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let midi_dir = dir.path().join("midi_files");
    let out_dir = dir.path().join("song_representations");
    std::fs::create_dir(&midi_dir).unwrap();
    std::fs::write(midi_dir.join("duet.mid"), two_track_song()).unwrap();
    (dir, midi_dir, out_dir)
}

#[test]
fn extracts_two_track_song() {
    let (_dir, midi_dir, out_dir) = setup();

    let result = extractor::extract_directory(&midi_dir, &out_dir, &ExtractConfig::default(), 2)
        .unwrap();
    assert_eq!(result.extracted, 1);
    assert_eq!(result.failed, 0);

    let (header, rows) = read_rows(&out_dir.join("duet.mid.csv"));
    assert_eq!(header.len(), 4 + 13 * 2);
    assert_eq!(header[4], "instrument 0: C");
    assert_eq!(header[29], "instrument 1: velocity");

    // 3842 ticks in 100-tick windows
    assert_eq!(rows.len(), 39);
    assert_eq!(result.windows, 39);
    assert!(rows.iter().all(|r| r.len() == 30));

    let first = &rows[0];
    assert_eq!(first[0], 0.0);
    assert_eq!(first[2], 2.0);
    assert_eq!(first[3], 0.75);

    // The only qualifying piano note in window 0 is C / 80
    let piano = &first[4..17];
    assert_eq!(piano[0], 1.0);
    assert!(piano[1..12].iter().all(|&f| f == 0.0));
    assert_eq!(piano[12], 80.0);
    // Strings are silent in window 0
    assert!(first[17..30].iter().all(|&v| v == 0.0));

    // Window 10 (ticks 1000..1100): piano C5 and strings G
    let w10 = &rows[10];
    assert_eq!(w10[4], 1.0);
    assert_eq!(w10[16], 90.0);
    assert_eq!(w10[17 + 7], 1.0);
    assert_eq!(w10[29], 100.0);

    let duration = 4.0;
    let window_secs = 100.0 / TPQ as f64 * 0.5;
    let last_end = rows.last().unwrap()[1];
    assert!(last_end <= duration + window_secs + 1e-9);
    assert!(last_end >= duration);
}

#[test]
fn extraction_is_deterministic() {
    let (_dir, midi_dir, out_dir) = setup();
    let table = out_dir.join("duet.mid.csv");

    extractor::extract_directory(&midi_dir, &out_dir, &ExtractConfig::default(), 1).unwrap();
    let first = std::fs::read(&table).unwrap();
    extractor::extract_directory(&midi_dir, &out_dir, &ExtractConfig::default(), 4).unwrap();
    let second = std::fs::read(&table).unwrap();
    assert_eq!(first, second);
}

#[test]
fn broken_song_does_not_stop_the_batch() {
    let (_dir, midi_dir, out_dir) = setup();
    std::fs::write(midi_dir.join("a_broken.mid"), b"MThd\x00\x00\x00\x06oops").unwrap();
    std::fs::write(midi_dir.join("readme.txt"), b"not midi").unwrap();

    let result = extractor::extract_directory(&midi_dir, &out_dir, &ExtractConfig::default(), 1)
        .unwrap();
    assert_eq!(result.extracted, 1);
    assert_eq!(result.failed, 1);
    assert!(out_dir.join("duet.mid.csv").exists());
    assert!(!out_dir.join("a_broken.mid.csv").exists());
    assert!(!out_dir.join("a_broken.mid.csv.tmp").exists());
}

#[test]
fn larger_window_means_fewer_rows() {
    let (_dir, midi_dir, out_dir) = setup();
    let config = ExtractConfig { tick_window: 480 };
    extractor::extract_directory(&midi_dir, &out_dir, &config, 1).unwrap();
    let (_, rows) = read_rows(&out_dir.join("duet.mid.csv"));
    // ticks 0, 480, ..., 3840
    assert_eq!(rows.len(), 9);
    assert!((rows[1][0] - 0.5).abs() < 1e-12);
}

#[test]
fn end_to_end_reduction() {
    let (dir, midi_dir, out_dir) = setup();
    std::fs::write(
        midi_dir.join("solo.mid"),
        encode(vec![note_track(
            0,
            &[(0, 40, 60, 64), (120, 160, 64, 70), (240, 280, 67, 76), (360, 2000, 72, 90)],
        )]),
    )
    .unwrap();

    let extracted =
        extractor::extract_directory(&midi_dir, &out_dir, &ExtractConfig::default(), 2).unwrap();
    assert_eq!(extracted.extracted, 2);

    let output = dir.path().join("pcas.csv");
    let config = ReduceConfig::default();
    let result = reducer::reduce_directory(&out_dir, &output, &config, 2).unwrap();
    assert_eq!(result.reduced, 2);
    assert_eq!(result.failed, 0);
    assert_eq!(result.vector_len, 6000);

    let text = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0].split(',').count(), 6001);
    assert!(lines[0].starts_with("0,1,2,"));
    assert!(lines[0].ends_with(",6000"));

    for (line, name) in lines[1..].iter().zip(["duet.mid.csv", "solo.mid.csv"]) {
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields[0], name);
        assert_eq!(fields.len(), 6001);
        let values: Vec<f64> = fields[1..].iter().map(|v| v.parse().unwrap()).collect();
        // Each fitted component row is a unit vector; padding is zero
        let first_row_norm: f64 = values[..200].iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((first_row_norm - 1.0).abs() < 1e-6);
    }

    // solo has 17 columns, so rows past 17 components are padding
    let solo: Vec<f64> = lines[2].split(',').skip(1).map(|v| v.parse().unwrap()).collect();
    assert!(solo[17 * 200..].iter().all(|&v| v == 0.0));
    assert!(solo[17..200].iter().all(|&v| v == 0.0));
}

#[test]
fn short_note_released_under_a_held_note_is_counted() {
    let dir = tempfile::tempdir().unwrap();
    let midi_dir = dir.path().join("midi_files");
    let out_dir = dir.path().join("song_representations");
    std::fs::create_dir(&midi_dir).unwrap();
    // C#3 held for nearly a second; C5 struck and released inside the first window
    std::fs::write(
        midi_dir.join("held.mid"),
        encode(vec![note_track(0, &[(0, 1990, 49, 60), (10, 20, 72, 80)])]),
    )
    .unwrap();

    extractor::extract_directory(&midi_dir, &out_dir, &ExtractConfig::default(), 1).unwrap();
    let (_, rows) = read_rows(&out_dir.join("held.mid.csv"));

    // C5 is released first, so it is seen before the held note stops the scan
    let first = &rows[0][4..17];
    assert_eq!(first[0], 1.0);
    assert_eq!(first[1], 0.0);
    assert_eq!(first[12], 80.0);
}
