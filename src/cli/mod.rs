use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "trackmirror", about = "Mirrors a Spotify library onto local YouTube Music downloads")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Phase 1 (ingestion) plus whichever downstream phases aren't skipped.
    Sync {
        #[command(subcommand)]
        scope: SyncScope,

        #[arg(long)]
        skip_match: bool,
        #[arg(long)]
        skip_acquire: bool,
        #[arg(long)]
        skip_lyrics: bool,
        #[arg(long)]
        skip_embed: bool,
        /// Retry tracks previously recorded as match failures (§4.5).
        #[arg(long)]
        force_rematch: bool,
    },

    /// Phase 2 alone, over whatever the Registry reports as needing a match.
    Match {
        #[arg(long)]
        force_rematch: bool,
    },

    /// Phase 3 alone.
    Acquire,

    /// Phase 4 alone.
    Lyrics,

    /// Phase 5 alone.
    Embed,

    /// Re-download the audio at `file` from `catalog_b_url`, preserving the
    /// file's existing container tags, then flag it for re-embedding (§7).
    Replace { file: PathBuf, catalog_b_url: String },
}

#[derive(Subcommand, Clone, Debug, PartialEq)]
pub enum SyncScope {
    Playlist { reference: String },
    Liked,
    All,
}
