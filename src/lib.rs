pub mod config;
pub mod extractor;
pub mod reducer;
pub mod scanner;
pub mod song;

use indicatif::{ProgressBar, ProgressStyle};

/// MIDI file extensions we pick up from the input directory
pub const MIDI_EXTENSIONS: &[&str] = &["mid", "midi", "kar", "smf"];

/// Extension appended to a MIDI file name for its feature table
pub const TABLE_EXTENSION: &str = "csv";

/// Application name for XDG paths
pub const APP_NAME: &str = "midiprep";

/// Progress bar shared by both stages.
pub(crate) fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    )
    .map(|s| s.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}
