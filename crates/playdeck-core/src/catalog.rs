//! Track catalog
//!
//! The fixed, ordered list of tracks the panel can play. Built once at
//! startup and never mutated afterwards.

use std::fs;
use std::path::Path;

use serde::{ Deserialize, Serialize };
use thiserror::Error;


/// Errors that can occur with catalog access or loading.
#[derive( Debug, Error )]
pub enum CatalogError {
    #[error( "Track index {index} out of range (catalog has {len} tracks)" )]
    IndexOutOfRange { index: usize, len: usize },

    #[error( "Catalog has no tracks" )]
    Empty,

    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Invalid catalog file: {0}" )]
    Parse( #[from] serde_json::Error ),
}


/// A single playable track.
#[derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize )]
pub struct TrackDescriptor {
    pub name: String,
    pub artist: String,
    /// Locator handed to the media sink (a file path for the terminal host).
    pub source: String,
}


impl TrackDescriptor {
    pub fn new( name: impl Into<String>, artist: impl Into<String>, source: impl Into<String> ) -> Self {
        Self {
            name: name.into(),
            artist: artist.into(),
            source: source.into(),
        }
    }
}


/// Read-only ordered track list.
#[derive( Debug, Clone )]
pub struct Catalog {
    tracks: Vec<TrackDescriptor>,
}


impl Catalog {
    /// Creates a catalog from a non-empty list of tracks.
    pub fn new( tracks: Vec<TrackDescriptor> ) -> Result<Self, CatalogError> {
        if tracks.is_empty() {
            return Err( CatalogError::Empty );
        }
        Ok( Self { tracks } )
    }


    /// The tracks shipped with the panel.
    pub fn builtin() -> Self {
        Self {
            tracks: vec![
                TrackDescriptor::new( "Outside", "Oneheart", "music/outside.mp3" ),
                TrackDescriptor::new( "Leaving", "Oneheart", "music/leaving.mp3" ),
                TrackDescriptor::new( "Snowfall", "Oneheart", "music/snegpadaet.mp3" ),
                TrackDescriptor::new( "HeartBrake", "Oneheart", "music/hertbrak.mp3" ),
            ],
        }
    }


    /// Loads a catalog from a JSON array of `{ name, artist, source }`.
    ///
    /// Relative sources are resolved against the directory holding the file.
    ///
    /// @param path - Path to the catalog file
    ///
    /// @returns The loaded catalog or an error
    pub fn load( path: &Path ) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string( path )?;
        let mut tracks: Vec<TrackDescriptor> = serde_json::from_str( &contents )?;

        if let Some( base ) = path.parent() {
            for track in &mut tracks {
                if Path::new( &track.source ).is_relative() {
                    track.source = base.join( &track.source ).to_string_lossy().into_owned();
                }
            }
        }

        tracing::info!( "Loaded {} tracks from {:?}", tracks.len(), path );
        Self::new( tracks )
    }


    /// Gets the track at `index`.
    pub fn get( &self, index: usize ) -> Result<&TrackDescriptor, CatalogError> {
        self.tracks.get( index ).ok_or( CatalogError::IndexOutOfRange {
            index,
            len: self.tracks.len(),
        })
    }


    /// Gets the number of tracks.
    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    /// Always false; an empty catalog cannot be constructed.
    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }


    pub fn iter( &self ) -> impl Iterator<Item = &TrackDescriptor> {
        self.tracks.iter()
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::io::Write;


    #[test]
    fn test_builtin_has_four_tracks() {
        let catalog = Catalog::builtin();
        assert_eq!( catalog.len(), 4 );
        assert_eq!( catalog.get( 2 ).unwrap().name, "Snowfall" );
    }


    #[test]
    fn test_get_out_of_range() {
        let catalog = Catalog::builtin();
        let result = catalog.get( 4 );
        assert!( matches!( result, Err( CatalogError::IndexOutOfRange { index: 4, len: 4 } ) ) );
    }


    #[test]
    fn test_empty_rejected() {
        assert!( matches!( Catalog::new( Vec::new() ), Err( CatalogError::Empty ) ) );
    }


    #[test]
    fn test_load_resolves_relative_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "catalog.json" );
        let mut file = fs::File::create( &path ).unwrap();
        write!(
            file,
            r#"[
                {{ "name": "One", "artist": "A", "source": "one.mp3" }},
                {{ "name": "Two", "artist": "B", "source": "/abs/two.mp3" }}
            ]"#
        ).unwrap();

        let catalog = Catalog::load( &path ).unwrap();
        assert_eq!( catalog.len(), 2 );
        assert_eq!( catalog.get( 0 ).unwrap().source, dir.path().join( "one.mp3" ).to_string_lossy() );
        assert_eq!( catalog.get( 1 ).unwrap().source, "/abs/two.mp3" );
    }


    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "catalog.json" );
        fs::write( &path, "{ not json" ).unwrap();

        assert!( matches!( Catalog::load( &path ), Err( CatalogError::Parse( _ ) ) ) );
    }


    #[test]
    fn test_load_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "catalog.json" );
        fs::write( &path, "[]" ).unwrap();

        assert!( matches!( Catalog::load( &path ), Err( CatalogError::Empty ) ) );
    }
}
