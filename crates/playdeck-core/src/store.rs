//! Snapshot persistence
//!
//! A small key-value abstraction standing in for browser local storage,
//! and the adapter that reads and writes the playback snapshot through it.

use std::collections::{ BTreeMap, HashMap };
use std::fs;
use std::io::ErrorKind;
use std::path::{ Path, PathBuf };

use thiserror::Error;

use crate::snapshot::PlaybackSnapshot;


/// Key the snapshot is stored under.
pub const STATE_KEY: &str = "audioPlayerState";


/// Errors that can occur reading or writing a store.
#[derive( Debug, Error )]
pub enum StoreError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Serialization error: {0}" )]
    Json( #[from] serde_json::Error ),
}


/// String-keyed, string-valued store that outlives the process.
pub trait KeyValueStore {
    fn get( &self, key: &str ) -> Result<Option<String>, StoreError>;

    fn set( &mut self, key: &str, value: &str ) -> Result<(), StoreError>;
}


/// In-memory store, mostly useful for tests and `--fresh` sessions.
#[derive( Debug, Default, Clone )]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}


impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}


impl KeyValueStore for MemoryStore {
    fn get( &self, key: &str ) -> Result<Option<String>, StoreError> {
        Ok( self.entries.get( key ).cloned() )
    }


    fn set( &mut self, key: &str, value: &str ) -> Result<(), StoreError> {
        self.entries.insert( key.to_string(), value.to_string() );
        Ok(())
    }
}


/// Store persisted as a single JSON object on disk.
#[derive( Debug, Clone )]
pub struct JsonFileStore {
    path: PathBuf,
}


impl JsonFileStore {
    pub fn new( path: impl Into<PathBuf> ) -> Self {
        Self { path: path.into() }
    }


    /// Default location: ~/.local/share/playdeck/state.json on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map( |d| d.join( "playdeck" ).join( "state.json" ) )
    }


    pub fn path( &self ) -> &Path {
        &self.path
    }


    fn read_entries( &self ) -> Result<BTreeMap<String, String>, StoreError> {
        let contents = match fs::read_to_string( &self.path ) {
            Ok( c ) => c,
            Err( e ) if e.kind() == ErrorKind::NotFound => return Ok( BTreeMap::new() ),
            Err( e ) => return Err( e.into() ),
        };

        match serde_json::from_str( &contents ) {
            Ok( entries ) => Ok( entries ),
            Err( e ) => {
                tracing::warn!( "Ignoring unreadable store {:?}: {}", self.path, e );
                Ok( BTreeMap::new() )
            }
        }
    }
}


impl KeyValueStore for JsonFileStore {
    fn get( &self, key: &str ) -> Result<Option<String>, StoreError> {
        Ok( self.read_entries()?.remove( key ) )
    }


    fn set( &mut self, key: &str, value: &str ) -> Result<(), StoreError> {
        let mut entries = self.read_entries()?;
        entries.insert( key.to_string(), value.to_string() );

        if let Some( parent ) = self.path.parent() {
            fs::create_dir_all( parent )?;
        }
        fs::write( &self.path, serde_json::to_string_pretty( &entries )? )?;
        Ok(())
    }
}


/// Reads and writes the playback snapshot under a fixed key.
#[derive( Debug )]
pub struct SnapshotStore<K> {
    store: K,
    key: String,
}


impl<K: KeyValueStore> SnapshotStore<K> {
    /// Creates an adapter using the standard `audioPlayerState` key.
    pub fn new( store: K ) -> Self {
        Self::with_key( store, STATE_KEY )
    }


    pub fn with_key( store: K, key: impl Into<String> ) -> Self {
        Self { store, key: key.into() }
    }


    /// Writes the snapshot.
    pub fn save( &mut self, snapshot: &PlaybackSnapshot ) -> Result<(), StoreError> {
        let raw = snapshot.to_json()?;
        self.store.set( &self.key, &raw )
    }


    /// Reads the stored snapshot for a catalog of `track_count` tracks.
    ///
    /// Missing, unreadable and out-of-range snapshots all yield `None`.
    pub fn load( &self, track_count: usize ) -> Option<PlaybackSnapshot> {
        let raw = match self.store.get( &self.key ) {
            Ok( Some( raw ) ) => raw,
            Ok( None ) => return None,
            Err( e ) => {
                tracing::warn!( "Failed to read saved state: {}", e );
                return None;
            }
        };

        match PlaybackSnapshot::from_json( &raw, track_count ) {
            Ok( snapshot ) => Some( snapshot ),
            Err( e ) => {
                tracing::debug!( "Discarding saved state: {}", e );
                None
            }
        }
    }


    pub fn inner( &self ) -> &K {
        &self.store
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_memory_round_trip() {
        let mut store = SnapshotStore::new( MemoryStore::new() );
        let snapshot = PlaybackSnapshot {
            current_track: 1,
            is_playing: true,
            volume: 0.3,
            current_time: 42.5,
            muted: false,
        };

        store.save( &snapshot ).unwrap();
        assert_eq!( store.load( 4 ), Some( snapshot ) );
    }


    #[test]
    fn test_missing_key_is_absent() {
        let store = SnapshotStore::new( MemoryStore::new() );
        assert_eq!( store.load( 4 ), None );
    }


    #[test]
    fn test_malformed_value_is_absent() {
        let mut memory = MemoryStore::new();
        memory.set( STATE_KEY, "{ currentTrack: oops" ).unwrap();
        let store = SnapshotStore::new( memory );

        assert_eq!( store.load( 4 ), None );
    }


    #[test]
    fn test_stale_track_index_is_absent() {
        let mut memory = MemoryStore::new();
        memory.set( STATE_KEY, r#"{ "currentTrack": 7 }"# ).unwrap();
        let store = SnapshotStore::new( memory );

        assert_eq!( store.load( 4 ), None );
        assert!( store.load( 8 ).is_some() );
    }


    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "nested" ).join( "state.json" );

        let mut store = JsonFileStore::new( &path );
        store.set( "a", "1" ).unwrap();
        store.set( "b", "two" ).unwrap();

        let reopened = JsonFileStore::new( &path );
        assert_eq!( reopened.get( "a" ).unwrap().as_deref(), Some( "1" ) );
        assert_eq!( reopened.get( "b" ).unwrap().as_deref(), Some( "two" ) );
        assert_eq!( reopened.get( "c" ).unwrap(), None );
    }


    #[test]
    fn test_file_store_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new( dir.path().join( "absent.json" ) );
        assert_eq!( store.get( STATE_KEY ).unwrap(), None );
    }


    #[test]
    fn test_file_store_recovers_from_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "state.json" );
        fs::write( &path, "garbage" ).unwrap();

        let mut store = JsonFileStore::new( &path );
        assert_eq!( store.get( STATE_KEY ).unwrap(), None );

        store.set( STATE_KEY, "{}" ).unwrap();
        assert_eq!( store.get( STATE_KEY ).unwrap().as_deref(), Some( "{}" ) );
    }


    #[test]
    fn test_snapshot_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "state.json" );
        let snapshot = PlaybackSnapshot { current_track: 2, current_time: 9.25, ..Default::default() };

        SnapshotStore::new( JsonFileStore::new( &path ) ).save( &snapshot ).unwrap();
        let loaded = SnapshotStore::new( JsonFileStore::new( &path ) ).load( 4 );

        assert_eq!( loaded, Some( snapshot ) );
    }
}
