use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record};

/// Replaces the source's two (one stubbed) logger modules with exactly one.
/// Mirrors `env_logger`'s console formatting but additionally tees every
/// debug+ record into `log_full_*.log` and every error+ record into
/// `log_errors_*.log`, which `env_logger` alone has no way to do with a
/// single global logger.
struct AppLogger {
    console_level: LevelFilter,
    full_log: Mutex<File>,
    error_log: Mutex<File>,
}

impl Log for AppLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let line = format!(
            "{} [{:<5}] {}: {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );

        if let Ok(mut full) = self.full_log.lock() {
            let _ = full.write_all(line.as_bytes());
        }

        if record.level() <= Level::Error {
            if let Ok(mut errors) = self.error_log.lock() {
                let _ = errors.write_all(line.as_bytes());
            }
        }

        if record.level() <= self.console_level {
            eprint!("{line}");
        }
    }

    fn flush(&self) {
        if let Ok(mut full) = self.full_log.lock() {
            let _ = full.flush();
        }
        if let Ok(mut errors) = self.error_log.lock() {
            let _ = errors.flush();
        }
    }
}

/// Initializes the process-wide logger. `log_dir` is `R/logs/`; `run_timestamp`
/// names this run's files (§6: `log_full_*.log`, `log_errors_*.log`).
pub fn init(log_dir: &Path, run_timestamp: &str, console_level: LevelFilter) -> std::io::Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let full_log = open_append(log_dir, &format!("log_full_{run_timestamp}.log"))?;
    let error_log = open_append(log_dir, &format!("log_errors_{run_timestamp}.log"))?;

    let logger = AppLogger {
        console_level,
        full_log: Mutex::new(full_log),
        error_log: Mutex::new(error_log),
    };

    log::set_max_level(LevelFilter::Trace);
    if log::set_boxed_logger(Box::new(logger)).is_err() {
        log::warn!("logger was already initialized; ignoring second init() call");
    }

    Ok(())
}

fn open_append(dir: &Path, filename: &str) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(dir.join(filename))
}

/// Fixed-format sinks owned by the phases that populate them (§4.6, §4.7,
/// §4.5), opened once per run. Not routed through the `log` facade: their
/// layout is a contract, not free-form text.
pub struct StructuredLogger {
    download_failures: Mutex<File>,
    lyrics_failures: Mutex<File>,
    match_close_alternatives: Mutex<File>,
}

impl StructuredLogger {
    pub fn open(log_dir: &Path, run_timestamp: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(log_dir)?;

        Ok(Self {
            download_failures: Mutex::new(open_append(
                log_dir,
                &format!("download_failures_{run_timestamp}.log"),
            )?),
            lyrics_failures: Mutex::new(open_append(
                log_dir,
                &format!("lyrics_failures_{run_timestamp}.log"),
            )?),
            match_close_alternatives: Mutex::new(open_append(
                log_dir,
                &format!("match_close_alternatives_{run_timestamp}.log"),
            )?),
        })
    }

    /// One block per failure: `{position}-{title}-{artist}.<ext>` then the
    /// catalog-A URL.
    pub fn log_download_failure(
        &self,
        position: u32,
        title: &str,
        artist: &str,
        ext: &str,
        catalog_a_url: &str,
    ) {
        let block = format!("{position}-{title}-{artist}.{ext}\n{catalog_a_url}\n\n");
        self.write_to(&self.download_failures, &block);
    }

    /// Same shape as download failures, per §6.
    pub fn log_lyrics_failure(
        &self,
        position: u32,
        title: &str,
        artist: &str,
        ext: &str,
        catalog_a_url: &str,
    ) {
        let block = format!("{position}-{title}-{artist}.{ext}\n{catalog_a_url}\n\n");
        self.write_to(&self.lyrics_failures, &block);
    }

    /// `filename` header, selected candidate, indented alternatives block,
    /// trailing reminder to verify — exact shape from §6.
    pub fn log_close_alternatives(
        &self,
        filename: &str,
        catalog_a_title: &str,
        catalog_a_url: &str,
        selected_title: &str,
        selected_url: &str,
        selected_score: f64,
        alternatives: &[(String, String, f64)],
    ) {
        let mut block = format!("{filename}\n");
        block.push_str(&format!("Spotify: {catalog_a_title} {catalog_a_url}\n"));
        block.push_str(&format!(
            "Selected: {selected_title} {selected_url} (score: {selected_score:.1})\n"
        ));
        block.push_str("Alternatives:\n");
        for (title, url, score) in alternatives {
            block.push_str(&format!("  - {title} {url} (score: {score:.1})\n"));
        }
        block.push_str("Multiple close matches found. Verify if correct.\n\n");

        self.write_to(&self.match_close_alternatives, &block);
    }

    fn write_to(&self, target: &Mutex<File>, block: &str) {
        if let Ok(mut file) = target.lock() {
            let _ = file.write_all(block.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn download_failure_block_matches_contract_shape() {
        let dir = tempdir().expect("tempdir");
        let logger = StructuredLogger::open(dir.path(), "20260731").expect("open");

        logger.log_download_failure(3, "Song", "Artist", "m4a", "https://open.spotify.com/track/1");

        let contents =
            std::fs::read_to_string(dir.path().join("download_failures_20260731.log")).expect("read");
        assert_eq!(contents, "3-Song-Artist.m4a\nhttps://open.spotify.com/track/1\n\n");
    }

    #[test]
    fn close_alternatives_block_lists_every_candidate() {
        let dir = tempdir().expect("tempdir");
        let logger = StructuredLogger::open(dir.path(), "20260731").expect("open");

        logger.log_close_alternatives(
            "1-Song-Artist.m4a",
            "Song",
            "https://open.spotify.com/track/1",
            "Song (Official)",
            "https://music.example/v1",
            90.0,
            &[("Song (Live)".to_string(), "https://music.example/v2".to_string(), 86.0)],
        );

        let contents =
            std::fs::read_to_string(dir.path().join("match_close_alternatives_20260731.log")).expect("read");
        assert!(contents.contains("Selected: Song (Official) https://music.example/v1 (score: 90.0)"));
        assert!(contents.contains("  - Song (Live) https://music.example/v2 (score: 86.0)"));
        assert!(contents.ends_with("Multiple close matches found. Verify if correct.\n\n"));
    }
}
