//! Persisted playback snapshot
//!
//! The unit written to the key-value store. Field names on the wire are
//! camelCase so snapshots written by older builds stay readable.

use serde::{ Deserialize, Serialize };
use thiserror::Error;


/// Reasons a stored snapshot is rejected. Never surfaced to callers;
/// a rejected snapshot is treated as absent.
#[derive( Debug, Error )]
pub(crate) enum SnapshotError {
    #[error( "Invalid JSON: {0}" )]
    Json( #[from] serde_json::Error ),

    #[error( "Track index {index} outside catalog of {len}" )]
    TrackOutOfRange { index: usize, len: usize },

    #[error( "Volume {0} outside 0..=1" )]
    VolumeOutOfRange( f64 ),

    #[error( "Invalid position {0}" )]
    InvalidPosition( f64 ),
}


/// Complete playback state at a point in time.
#[derive( Debug, Clone, Copy, PartialEq, Serialize, Deserialize )]
#[serde( default, rename_all = "camelCase" )]
pub struct PlaybackSnapshot {
    pub current_track: usize,
    pub is_playing: bool,
    pub volume: f64,
    /// Elapsed position in seconds.
    pub current_time: f64,
    pub muted: bool,
}


impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            current_track: 0,
            is_playing: false,
            volume: 0.5,
            current_time: 0.0,
            muted: false,
        }
    }
}


impl PlaybackSnapshot {
    /// Serializes the snapshot to its stored JSON form.
    pub fn to_json( &self ) -> Result<String, serde_json::Error> {
        serde_json::to_string( self )
    }


    /// Parses and validates a stored snapshot against a catalog of `track_count` tracks.
    pub(crate) fn from_json( raw: &str, track_count: usize ) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str( raw )?;
        snapshot.validate( track_count )?;
        Ok( snapshot )
    }


    fn validate( &self, track_count: usize ) -> Result<(), SnapshotError> {
        if self.current_track >= track_count {
            return Err( SnapshotError::TrackOutOfRange {
                index: self.current_track,
                len: track_count,
            });
        }
        if !( 0.0..=1.0 ).contains( &self.volume ) {
            return Err( SnapshotError::VolumeOutOfRange( self.volume ) );
        }
        if !self.current_time.is_finite() || self.current_time < 0.0 {
            return Err( SnapshotError::InvalidPosition( self.current_time ) );
        }
        Ok(())
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_wire_field_names() {
        let snapshot = PlaybackSnapshot {
            current_track: 1,
            is_playing: true,
            volume: 0.3,
            current_time: 42.5,
            muted: false,
        };
        let value: serde_json::Value = serde_json::from_str( &snapshot.to_json().unwrap() ).unwrap();

        assert_eq!( value[ "currentTrack" ], 1 );
        assert_eq!( value[ "isPlaying" ], true );
        assert_eq!( value[ "volume" ], 0.3 );
        assert_eq!( value[ "currentTime" ], 42.5 );
        assert_eq!( value[ "muted" ], false );
    }


    #[test]
    fn test_round_trip() {
        let snapshot = PlaybackSnapshot {
            current_track: 3,
            is_playing: true,
            volume: 0.77,
            current_time: 123.456,
            muted: true,
        };
        let raw = snapshot.to_json().unwrap();
        assert_eq!( PlaybackSnapshot::from_json( &raw, 4 ).unwrap(), snapshot );
    }


    #[test]
    fn test_missing_fields_use_defaults() {
        let snapshot = PlaybackSnapshot::from_json( r#"{ "currentTrack": 2 }"#, 4 ).unwrap();
        assert_eq!( snapshot, PlaybackSnapshot { current_track: 2, ..PlaybackSnapshot::default() } );

        let empty = PlaybackSnapshot::from_json( "{}", 4 ).unwrap();
        assert_eq!( empty, PlaybackSnapshot::default() );
    }


    #[test]
    fn test_rejects_out_of_range_fields() {
        assert!( matches!(
            PlaybackSnapshot::from_json( r#"{ "currentTrack": 4 }"#, 4 ),
            Err( SnapshotError::TrackOutOfRange { .. } )
        ));
        assert!( matches!(
            PlaybackSnapshot::from_json( r#"{ "volume": 1.5 }"#, 4 ),
            Err( SnapshotError::VolumeOutOfRange( _ ) )
        ));
        assert!( matches!(
            PlaybackSnapshot::from_json( r#"{ "currentTime": -3 }"#, 4 ),
            Err( SnapshotError::InvalidPosition( _ ) )
        ));
        assert!( matches!(
            PlaybackSnapshot::from_json( r#"{ "currentTrack": -1 }"#, 4 ),
            Err( SnapshotError::Json( _ ) )
        ));
    }


    #[test]
    fn test_rejects_garbage() {
        assert!( PlaybackSnapshot::from_json( "not json", 4 ).is_err() );
        assert!( PlaybackSnapshot::from_json( "null", 4 ).is_err() );
        assert!( PlaybackSnapshot::from_json( r#"{ "isPlaying": "yes" }"#, 4 ).is_err() );
    }
}
