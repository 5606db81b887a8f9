use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use log::LevelFilter;
use lofty::file::TaggedFileExt;
use lofty::tag::TagExt;

use trackmirror::catalog::spotify::SpotifyClient;
use trackmirror::catalog::youtube_music::YouTubeMusicClient;
use trackmirror::cli::{Cli, Command, SyncScope};
use trackmirror::catalog::CatalogRef;
use trackmirror::repository::Registry;
use trackmirror::services::acquirer::{locate_output_file, move_or_copy, Acquirer, YtDlpExtractor};
use trackmirror::services::embedder::Embedder;
use trackmirror::services::file_manager::FileManager;
use trackmirror::services::lyrics::{LyricsProvider, LyricsResolver};
use trackmirror::services::orchestrator::{CancelFlag, Orchestrator, PhaseSelection, Scope};
use trackmirror::utils::config::{get_config, Config};
use trackmirror::utils::logging;
use trackmirror::utils::logging::StructuredLogger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match get_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {err}", "configuration error:".red().bold());
            std::process::exit(1);
        }
    };

    let run_timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let log_dir = config.output.directory.join("logs");
    if let Err(err) = logging::init(&log_dir, &run_timestamp, LevelFilter::Info) {
        eprintln!("{} {err}", "failed to initialize logging:".red().bold());
        std::process::exit(1);
    }

    let structured_log = match StructuredLogger::open(&log_dir, &run_timestamp) {
        Ok(logger) => Arc::new(logger),
        Err(err) => {
            eprintln!("{} {err}", "failed to open structured logs:".red().bold());
            std::process::exit(1);
        }
    };

    let registry = match trackmirror::utils::db::get_registry().await {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("{} {err}", "failed to open the registry:".red().bold());
            std::process::exit(2);
        }
    };

    let exit_code = match cli.command {
        Command::Replace { file, catalog_b_url } => {
            run_replace(&registry, config, &file, &catalog_b_url).await
        }
        command => run_pipeline(registry, config, structured_log, command).await,
    };

    std::process::exit(exit_code);
}

async fn run_pipeline(
    registry: Arc<Registry>,
    config: &'static Config,
    structured_log: Arc<StructuredLogger>,
    command: Command,
) -> i32 {
    let file_manager = Arc::new(FileManager::new(config.output.directory.clone()));
    let http = reqwest::Client::new();

    let catalog_a = SpotifyClient::new(&config.catalog_a.client_id, &config.catalog_a.client_secret);
    let catalog_b = Arc::new(YouTubeMusicClient::new());

    let extractor = YtDlpExtractor::new("yt-dlp");
    let acquirer = Acquirer::new(
        registry.clone(),
        file_manager.clone(),
        extractor,
        structured_log.clone(),
        config.acquisition.cookie_file.clone(),
        config.acquisition.workers,
    );

    let providers = vec![LyricsProvider::LrcLib(http.clone()), LyricsProvider::Ovh(http.clone())];
    let lyrics = LyricsResolver::new(registry.clone(), providers, structured_log.clone(), config.acquisition.workers);

    let embedder = Embedder::new(registry.clone(), http.clone());

    let cancel = CancelFlag::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received; finishing the in-flight track then stopping");
            signal_cancel.cancel();
        }
    });

    let orchestrator =
        Orchestrator::new(registry.clone(), catalog_a, catalog_b, acquirer, lyrics, embedder, structured_log, cancel.clone());

    let (scope, phases) = match command {
        Command::Sync { scope, skip_match, skip_acquire, skip_lyrics, skip_embed, force_rematch } => (
            Some(match scope {
                SyncScope::Playlist { reference } => Scope::Playlist(CatalogRef::from(reference)),
                SyncScope::Liked => Scope::Liked,
                SyncScope::All => Scope::SyncAll,
            }),
            PhaseSelection {
                ingest: true,
                matching: !skip_match,
                acquisition: !skip_acquire,
                lyrics: !skip_lyrics,
                embedding: !skip_embed,
                force_rematch,
            },
        ),
        Command::Match { force_rematch } => (
            None,
            PhaseSelection { ingest: false, matching: true, acquisition: false, lyrics: false, embedding: false, force_rematch },
        ),
        Command::Acquire => (
            None,
            PhaseSelection { ingest: false, matching: false, acquisition: true, lyrics: false, embedding: false, force_rematch: false },
        ),
        Command::Lyrics => (
            None,
            PhaseSelection { ingest: false, matching: false, acquisition: false, lyrics: true, embedding: false, force_rematch: false },
        ),
        Command::Embed => (
            None,
            PhaseSelection { ingest: false, matching: false, acquisition: false, lyrics: false, embedding: true, force_rematch: false },
        ),
        Command::Replace { .. } => unreachable!("handled by run_replace"),
    };

    match orchestrator.run(scope, &phases).await {
        Ok(summary) => {
            print_summary(&summary);
            if cancel.is_cancelled() {
                130
            } else {
                0
            }
        }
        Err(err) => {
            eprintln!("{} {err}", "run failed:".red().bold());
            err.exit_code()
        }
    }
}

fn print_summary(summary: &trackmirror::services::orchestrator::RunSummary) {
    println!("{}", "sync summary".bold());
    println!("  ingested:     {}", summary.tracks_ingested);
    println!("  matched:      {}", summary.tracks_matched);
    println!("  match failed: {}", summary.tracks_match_failed);
    println!("  acquired:     {}", summary.tracks_acquired);
    println!("  lyrics found: {}", summary.tracks_with_lyrics);
    println!(
        "  registry:     {} tracks total, {} acquired, {} finalized",
        summary.registry_stats.total_tracks, summary.registry_stats.acquired, summary.registry_stats.fully_finalized
    );
}

/// `--replace <file> <catalogB-URL>`: re-downloads the audio, keeps the
/// file's existing container tags, and flags the track for re-embedding so
/// the next embedding pass reapplies canonical metadata on top (§7).
async fn run_replace(registry: &Registry, config: &Config, file: &Path, catalog_b_url: &str) -> i32 {
    let file_path = match file.canonicalize() {
        Ok(path) => path,
        Err(err) => {
            eprintln!("{} {err}", "cannot resolve file path:".red().bold());
            return 4;
        }
    };

    let preserved_tag = match lofty::probe::Probe::open(&file_path).and_then(|p| p.read()) {
        Ok(mut tagged) => tagged.primary_tag_mut().cloned(),
        Err(err) => {
            eprintln!("{} {err}", "failed to open existing file:".red().bold());
            return 4;
        }
    };

    let temp_dir = match tempfile::Builder::new().prefix("replace-").tempdir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("{} {err}", "failed to allocate temp dir:".red().bold());
            return 4;
        }
    };

    let extractor = YtDlpExtractor::new("yt-dlp");
    if let Err(err) = {
        use trackmirror::services::acquirer::Extractor;
        extractor.extract(catalog_b_url, temp_dir.path(), config.acquisition.cookie_file.as_deref())
    } {
        eprintln!("{} {err}", "extractor failed:".red().bold());
        return 4;
    }

    let downloaded = match locate_output_file(temp_dir.path()) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("{} {err}", "extractor produced no usable output:".red().bold());
            return 4;
        }
    };

    if let Err(err) = move_or_copy(&downloaded, &file_path) {
        eprintln!("{} {err}", "failed to install replacement audio:".red().bold());
        return 4;
    }

    if let Some(tag) = preserved_tag {
        match lofty::probe::Probe::open(&file_path).and_then(|p| p.read()) {
            Ok(mut tagged) => {
                tagged.insert_tag(tag);
                let saved = tagged
                    .primary_tag_mut()
                    .expect("tag was just inserted")
                    .save_to_path(&file_path, lofty::config::WriteOptions::default());
                if let Err(err) = saved {
                    eprintln!("{} {err}", "failed to restore tags:".red().bold());
                    return 4;
                }
            }
            Err(err) => {
                eprintln!("{} {err}", "failed to reopen replacement file:".red().bold());
                return 4;
            }
        }
    }

    let path_str = file_path.to_string_lossy().to_string();
    match registry.track_by_file_path(&path_str).await {
        Ok(Some(track)) => {
            if let Err(err) = registry.reset_embedding_flags(&track.external_id).await {
                eprintln!("{} {err}", "failed to reset embedding flags:".red().bold());
                return 2;
            }
        }
        Ok(None) => log::warn!("replaced '{}' but no registry row references that path", path_str),
        Err(err) => {
            eprintln!("{} {err}", "registry error:".red().bold());
            return 2;
        }
    }

    println!("{} {}", "replaced:".green().bold(), path_str);
    0
}
