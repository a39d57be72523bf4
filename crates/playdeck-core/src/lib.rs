//! Playdeck Core - Playback state machine for a fixed-playlist audio panel
//!
//! This crate owns playback state and its persistence. Audio output and
//! rendering are injected through the [`MediaSink`] and [`View`] traits,
//! and state is written through any [`KeyValueStore`].

pub mod catalog;
pub mod command;
pub mod player;
pub mod sink;
pub mod snapshot;
pub mod store;
pub mod view;

pub use catalog::{ Catalog, CatalogError, TrackDescriptor };
pub use command::{ Command, CommandError, Prompt };
pub use player::{ PersistThrottle, PlaybackState, Player, PlayerError, PlayerOptions };
pub use sink::{ MediaSink, PlayOutcome, PlayRequest, PlayResolver, PlaybackRejected, SinkEvent };
pub use snapshot::PlaybackSnapshot;
pub use store::{ JsonFileStore, KeyValueStore, MemoryStore, SnapshotStore, StoreError, STATE_KEY };
pub use view::{ format_time, NullView, Progress, View, ViewUpdate, VolumeTier };
