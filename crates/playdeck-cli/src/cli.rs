//! Command-line argument parsing for Playdeck.

use std::path::PathBuf;

use clap::Parser;


/// Playdeck - a terminal audio panel with a fixed playlist.
#[derive( Parser, Debug )]
#[command( name = "playdeck" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// JSON catalog of tracks (array of { name, artist, source }).
    #[arg( short, long )]
    pub catalog: Option<PathBuf>,

    /// File holding the saved playback state.
    #[arg( short, long )]
    pub state_file: Option<PathBuf>,

    /// Log file (defaults to the data directory).
    #[arg( short, long )]
    pub log_file: Option<PathBuf>,

    /// Ignore the saved state and start from the first track.
    #[arg( long )]
    pub fresh: bool,
}
