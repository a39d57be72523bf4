//! Application settings management
//!
//! Persistent tunables read from settings.json in the config directory.
//! Command-line flags take precedence over anything set here.

use std::fs;
use std::path::PathBuf;

use playdeck_core::{ PersistThrottle, PlayerOptions };
use serde::{ Deserialize, Serialize };

use crate::cli::Args;


/// Application settings.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Catalog file; the built-in tracks are used when unset
    pub catalog: Option<PathBuf>,

    /// Saved-state file; defaults to the data directory
    pub state_file: Option<PathBuf>,

    /// Seconds skipped by rewind/forward
    pub skip_seconds: f64,

    /// Position checkpoint period in seconds
    pub persist_period: f64,

    /// Width of the checkpoint window after each period boundary
    pub persist_window: f64,

    /// UI refresh and input poll interval in milliseconds
    pub tick_ms: u64,
}


impl Default for Settings {
    fn default() -> Self {
        let options = PlayerOptions::default();
        Self {
            catalog: None,
            state_file: None,
            skip_seconds: options.skip_seconds,
            persist_period: options.throttle.period,
            persist_window: options.throttle.window,
            tick_ms: 100,
        }
    }
}


impl Settings {
    /// Returns the path to the settings file.
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "playdeck" ).join( "settings.json" ) )
    }


    /// Loads settings from disk, or returns defaults if not found.
    pub fn load() -> Self {
        let path = match Self::settings_path() {
            Some( p ) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( &path ) {
            Ok( contents ) => Self::parse( &contents ),
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    fn parse( contents: &str ) -> Self {
        serde_json::from_str( contents ).unwrap_or_else( |e| {
            tracing::warn!( "Ignoring invalid settings: {}", e );
            Self::default()
        })
    }


    /// Applies command-line overrides.
    pub fn with_args( mut self, args: &Args ) -> Self {
        if let Some( catalog ) = &args.catalog {
            self.catalog = Some( catalog.clone() );
        }
        if let Some( state_file ) = &args.state_file {
            self.state_file = Some( state_file.clone() );
        }
        self
    }


    /// Player tunables derived from these settings.
    pub fn player_options( &self ) -> PlayerOptions {
        PlayerOptions {
            skip_seconds: self.skip_seconds,
            throttle: PersistThrottle {
                period: self.persist_period,
                window: self.persist_window,
            },
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings = Settings::parse( r#"{ "skip_seconds": 15 }"# );
        assert_eq!( settings.skip_seconds, 15.0 );
        assert_eq!( settings.persist_period, 5.0 );
        assert_eq!( settings.tick_ms, 100 );
    }


    #[test]
    fn test_invalid_settings_fall_back() {
        assert_eq!( Settings::parse( "[1, 2" ), Settings::default() );
    }


    #[test]
    fn test_args_override_settings() {
        let args = Args {
            catalog: Some( PathBuf::from( "/tmp/catalog.json" ) ),
            state_file: None,
            log_file: None,
            fresh: false,
        };
        let settings = Settings {
            state_file: Some( PathBuf::from( "/tmp/state.json" ) ),
            ..Settings::default()
        }.with_args( &args );

        assert_eq!( settings.catalog, Some( PathBuf::from( "/tmp/catalog.json" ) ) );
        assert_eq!( settings.state_file, Some( PathBuf::from( "/tmp/state.json" ) ) );
    }


    #[test]
    fn test_player_options() {
        let settings = Settings { persist_window: 0.3, ..Settings::default() };
        let options = settings.player_options();
        assert_eq!( options.throttle.window, 0.3 );
        assert_eq!( options.skip_seconds, 10.0 );
    }
}
