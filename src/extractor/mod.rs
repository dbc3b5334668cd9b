pub mod features;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use features::FeatureTable;
use thiserror::Error;

use crate::config::ExtractConfig;
use crate::song::{self, DecodeError};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("TSV write error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

#[derive(Debug)]
pub struct ExtractResult {
    pub extracted: u64,
    pub failed: u64,
    /// Total rows written across all tables.
    pub windows: u64,
}

/// Summary of one successfully extracted song.
struct SongExtraction {
    windows: usize,
}

/// Extract a feature table for every MIDI file in `midi_dir` into `out_dir`.
///
/// Each song is independent: a file that fails to parse or write is logged and skipped,
/// and leaves no table behind. Only directory setup or listing errors abort the run.
pub fn extract_directory(
    midi_dir: &Path,
    out_dir: &Path,
    config: &ExtractConfig,
    jobs: usize,
) -> std::result::Result<ExtractResult, ExtractError> {
    std::fs::create_dir_all(out_dir)?;

    let files = crate::scanner::collect_files(midi_dir, crate::MIDI_EXTENSIONS)?;
    if files.is_empty() {
        log::info!("No MIDI files in {}", midi_dir.display());
        return Ok(ExtractResult {
            extracted: 0,
            failed: 0,
            windows: 0,
        });
    }

    log::info!(
        "Extracting {} songs with {} workers (tick window {})",
        files.len(),
        jobs,
        config.tick_window
    );

    let pb = crate::progress_bar(files.len() as u64);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| ExtractError::ThreadPool(e.to_string()))?;

    let results: Vec<(PathBuf, Result<SongExtraction, ExtractError>)> = pool.install(|| {
        use rayon::prelude::*;
        files
            .par_iter()
            .map(|path| {
                let result = extract_song_file(path, out_dir, config.tick_window);
                pb.inc(1);
                (path.clone(), result)
            })
            .collect()
    });

    let mut extracted: u64 = 0;
    let mut failed: u64 = 0;
    let mut windows: u64 = 0;
    for (path, result) in results {
        match result {
            Ok(song) => {
                extracted += 1;
                windows += song.windows as u64;
            }
            Err(e) => {
                log::warn!("Skipping {}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    pb.finish_with_message(format!("Done: {} extracted, {} failed", extracted, failed));

    Ok(ExtractResult {
        extracted,
        failed,
        windows,
    })
}

/// Table file name for a MIDI file: the full MIDI file name plus `.csv`.
pub fn table_file_name(midi_path: &Path) -> String {
    let name = midi_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    format!("{}.{}", name, crate::TABLE_EXTENSION)
}

/// Parse one MIDI file and compute its table without touching the filesystem further.
pub fn extract_song(
    path: &Path,
    tick_window: u64,
) -> std::result::Result<FeatureTable, ExtractError> {
    let song = song::load_song(path)?;
    log::debug!(
        "{}: {} ticks ({:.1}s), {} instruments, {} key / {} time signatures",
        path.file_name().and_then(|f| f.to_str()).unwrap_or("?"),
        song.tick_count,
        song.end_time(),
        song.instruments.len(),
        song.key_signatures.len(),
        song.time_signatures.len()
    );
    Ok(features::extract_features(&song, tick_window))
}

fn extract_song_file(
    path: &Path,
    out_dir: &Path,
    tick_window: u64,
) -> std::result::Result<SongExtraction, ExtractError> {
    let table = extract_song(path, tick_window)?;
    let target = out_dir.join(table_file_name(path));
    write_table(&table, &target)?;
    Ok(SongExtraction {
        windows: table.rows.len(),
    })
}

/// Write to a temporary sibling first so a failed write never leaves a partial table.
fn write_table(table: &FeatureTable, target: &Path) -> std::result::Result<(), ExtractError> {
    let mut tmp_name = target.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let written = File::create(&tmp)
        .map_err(ExtractError::from)
        .and_then(|file| table.write_tsv(BufWriter::new(file)).map_err(ExtractError::from));

    if let Err(e) = written {
        std::fs::remove_file(&tmp).ok();
        return Err(e);
    }

    std::fs::rename(&tmp, target)?;
    Ok(())
}
