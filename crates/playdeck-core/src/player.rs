//! Playback state machine
//!
//! The Player owns the current track, play/pause status and restore
//! bookkeeping. Audio output is delegated to a [`MediaSink`], rendering to a
//! [`View`], and every mutation is written through a [`SnapshotStore`].
//!
//! All methods run to completion on the host thread. The only deferred
//! operation is `play`, whose outcome is collected by `poll_pending_plays`
//! and applied to whatever state is current when it arrives.

use thiserror::Error;

use crate::catalog::{ Catalog, CatalogError };
use crate::command::Command;
use crate::sink::{ MediaSink, PlayOutcome, PlayRequest, SinkEvent };
use crate::snapshot::PlaybackSnapshot;
use crate::store::{ KeyValueStore, SnapshotStore };
use crate::view::{ Progress, View, ViewUpdate, VolumeTier };


/// Volume used when no saved state exists.
pub const DEFAULT_VOLUME: f64 = 0.5;


/// Errors that can occur during playback control.
#[derive( Debug, Error )]
pub enum PlayerError {
    #[error( transparent )]
    Catalog( #[from] CatalogError ),

    #[error( "Volume must be within 0..=1, got {0}" )]
    InvalidVolume( f64 ),
}


/// Current playback state.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum PlaybackState {
    #[default]
    Paused,
    Playing,
}


/// Decides which position ticks write a snapshot.
///
/// A tick persists when `current_time % period < window`, or when it is the
/// first tick past a period boundary that the window missed. Sinks whose
/// ticks are coarser than the window still checkpoint once per period.
#[derive( Debug, Clone, Copy, PartialEq )]
pub struct PersistThrottle {
    pub period: f64,
    pub window: f64,
}


impl Default for PersistThrottle {
    fn default() -> Self {
        Self {
            period: 5.0,
            window: 0.1,
        }
    }
}


impl PersistThrottle {
    pub fn should_persist( &self, current_time: f64 ) -> bool {
        current_time.is_finite()
            && current_time >= 0.0
            && self.period > 0.0
            && current_time % self.period < self.window
    }


    /// Index of the period containing `current_time`.
    pub fn period_index( &self, current_time: f64 ) -> Option<u64> {
        ( current_time.is_finite() && current_time >= 0.0 && self.period > 0.0 )
            .then( || ( current_time / self.period ).floor() as u64 )
    }
}


/// Tunables for the player.
#[derive( Debug, Clone, Copy, PartialEq )]
pub struct PlayerOptions {
    /// Step used by rewind/forward, in seconds.
    pub skip_seconds: f64,
    pub throttle: PersistThrottle,
}


impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            skip_seconds: 10.0,
            throttle: PersistThrottle::default(),
        }
    }
}


/// Seek/resume armed at startup, consumed by the first metadata notification.
#[derive( Debug, Clone, Copy, PartialEq )]
struct PendingRestore {
    /// Cleared when the user seeks first.
    time: Option<f64>,
    /// Cleared when the user plays or pauses first.
    resume: bool,
}


/// The playback state machine.
pub struct Player<M, K, V> {
    catalog: Catalog,
    sink: M,
    store: SnapshotStore<K>,
    view: V,
    options: PlayerOptions,
    state: PlaybackState,
    current_track: usize,
    panel_open: bool,
    pending_plays: Vec<PlayRequest>,
    pending_restore: Option<PendingRestore>,
    /// Period of the last position tick, for boundary checkpoints.
    tick_period: Option<u64>,
}


impl<M: MediaSink, K: KeyValueStore, V: View> Player<M, K, V> {
    /// Creates a player with default options. Call [`Player::start`] before use.
    pub fn new( catalog: Catalog, sink: M, store: K, view: V ) -> Self {
        Self::with_options( catalog, sink, store, view, PlayerOptions::default() )
    }


    pub fn with_options( catalog: Catalog, sink: M, store: K, view: V, options: PlayerOptions ) -> Self {
        Self {
            catalog,
            sink,
            store: SnapshotStore::new( store ),
            view,
            options,
            state: PlaybackState::Paused,
            current_track: 0,
            panel_open: false,
            pending_plays: Vec::new(),
            pending_restore: None,
            tick_period: None,
        }
    }


    /// Restores the saved snapshot, or starts from defaults if there is none.
    pub fn start( &mut self ) -> Result<(), PlayerError> {
        let saved = self.store.load( self.catalog.len() );
        self.restore( saved )
    }


    /// Applies `saved` as the starting state.
    ///
    /// Volume, mute and track apply immediately. The position and resume are
    /// held back until the sink reports metadata for the loaded track.
    pub fn restore( &mut self, saved: Option<PlaybackSnapshot> ) -> Result<(), PlayerError> {
        match saved {
            Some( saved ) => {
                // Nothing changes for a track the catalog lacks
                self.catalog.get( saved.current_track )?;
                tracing::info!(
                    "Restoring track {}, position {:.1}s, playing={}, volume={}",
                    saved.current_track,
                    saved.current_time,
                    saved.is_playing,
                    saved.volume
                );
                self.sink.set_volume( saved.volume );
                self.sink.set_muted( saved.muted );
                self.pending_restore = Some( PendingRestore {
                    time: Some( saved.current_time ),
                    resume: saved.is_playing,
                });
                self.load_source( saved.current_track )?;
            }
            None => {
                tracing::info!( "No saved state, starting from the first track" );
                self.pending_restore = None;
                self.sink.set_volume( DEFAULT_VOLUME );
                self.load_source( 0 )?;
            }
        }

        self.render_volume();
        self.set_state( PlaybackState::Paused );
        Ok(())
    }


    /// Points the sink at the track at `index` without starting playback.
    pub fn load_track( &mut self, index: usize ) -> Result<(), PlayerError> {
        if self.pending_restore.take().is_some() {
            tracing::debug!( "Track changed before metadata loaded, dropping restore" );
        }
        self.load_source( index )
    }


    fn load_source( &mut self, index: usize ) -> Result<(), PlayerError> {
        let track = self.catalog.get( index )?.clone();

        tracing::info!( "Loading track {}: {} - {}", index, track.artist, track.name );
        self.sink.set_source( &track.source );
        self.current_track = index;
        self.tick_period = None;

        self.view.render( ViewUpdate::Track {
            index,
            name: track.name,
            artist: track.artist,
        });
        self.view.render( ViewUpdate::Progress( Progress::new( self.sink.current_time(), self.sink.duration() ) ) );
        self.persist();
        Ok(())
    }


    /// Asks the sink to start output. The state changes once the request settles.
    pub fn play( &mut self ) {
        self.cancel_restore_resume();
        tracing::debug!( "Requesting playback of track {}", self.current_track );
        let request = self.sink.play();
        self.pending_plays.push( request );
        self.poll_pending_plays();
    }


    /// Applies every play request that has resolved since the last poll.
    ///
    /// @returns The number of requests settled
    pub fn poll_pending_plays( &mut self ) -> usize {
        let mut settled = 0;
        let mut i = 0;

        while i < self.pending_plays.len() {
            match self.pending_plays[ i ].try_outcome() {
                Some( outcome ) => {
                    self.pending_plays.remove( i );
                    self.settle_play( outcome );
                    settled += 1;
                }
                None => i += 1,
            }
        }

        settled
    }


    fn settle_play( &mut self, outcome: PlayOutcome ) {
        match outcome {
            Ok(()) => {
                self.set_state( PlaybackState::Playing );
            }
            Err( e ) => {
                tracing::warn!( "Play failed: {}", e );
                self.set_state( PlaybackState::Paused );
            }
        }
        self.persist();
    }


    pub fn pause( &mut self ) {
        self.cancel_restore_resume();
        self.sink.pause();
        self.set_state( PlaybackState::Paused );
        self.persist();
    }


    pub fn toggle_play( &mut self ) {
        match self.state {
            PlaybackState::Playing => self.pause(),
            PlaybackState::Paused => self.play(),
        }
    }


    /// Advances to the next track, wrapping to the first after the last.
    pub fn next( &mut self ) -> Result<(), PlayerError> {
        let index = ( self.current_track + 1 ) % self.catalog.len();
        self.switch_to( index )
    }


    /// Goes back one track, wrapping to the last before the first.
    pub fn previous( &mut self ) -> Result<(), PlayerError> {
        let len = self.catalog.len();
        let index = ( self.current_track + len - 1 ) % len;
        self.switch_to( index )
    }


    /// Loads the track at `index`, resuming playback if it was running.
    pub fn select_track( &mut self, index: usize ) -> Result<(), PlayerError> {
        self.switch_to( index )
    }


    // The track changes even if the follow-up play is rejected.
    fn switch_to( &mut self, index: usize ) -> Result<(), PlayerError> {
        let was_playing = self.is_playing();
        self.load_track( index )?;
        if was_playing {
            self.play();
        }
        Ok(())
    }


    /// Moves the position by `delta` seconds, clamped to the track.
    ///
    /// Only the lower bound applies while the duration is unknown.
    pub fn seek_relative( &mut self, delta: f64 ) {
        let mut target = ( self.sink.current_time() + delta ).max( 0.0 );
        if let Some( duration ) = self.known_duration() {
            target = target.min( duration );
        }

        self.cancel_restore_seek();
        self.sink.set_current_time( target );
        self.persist();
    }


    pub fn rewind( &mut self ) {
        self.seek_relative( -self.options.skip_seconds );
    }


    pub fn forward( &mut self ) {
        self.seek_relative( self.options.skip_seconds );
    }


    /// Seeks to the time under a click `offset` units into a bar `width` wide.
    pub fn seek_absolute( &mut self, offset: f64, width: f64 ) {
        let Some( duration ) = self.known_duration() else {
            tracing::debug!( "Ignoring seek, duration not known yet" );
            return;
        };
        if !( width > 0.0 ) {
            tracing::debug!( "Ignoring seek on a bar of width {}", width );
            return;
        }

        self.cancel_restore_seek();
        self.sink.set_current_time( offset / width * duration );
        self.persist();
    }


    pub fn set_volume( &mut self, volume: f64 ) -> Result<(), PlayerError> {
        if !( 0.0..=1.0 ).contains( &volume ) {
            return Err( PlayerError::InvalidVolume( volume ) );
        }

        self.sink.set_volume( volume );
        self.render_volume();
        self.persist();
        Ok(())
    }


    pub fn toggle_mute( &mut self ) {
        let muted = !self.sink.muted();
        self.sink.set_muted( muted );
        self.render_volume();
        self.persist();
    }


    pub fn toggle_panel( &mut self ) {
        self.panel_open = !self.panel_open;
        self.view.render( ViewUpdate::Panel { open: self.panel_open } );
    }


    /// End of media: behaves exactly like `next`.
    pub fn on_track_ended( &mut self ) -> Result<(), PlayerError> {
        tracing::debug!( "Track {} ended", self.current_track );
        self.next()
    }


    /// Position report from the sink. Persists only on throttle boundaries.
    pub fn on_position_tick( &mut self, current_time: f64, duration: Option<f64> ) {
        self.view.render( ViewUpdate::Progress( Progress::new( current_time, duration ) ) );

        let throttle = self.options.throttle;
        let period = throttle.period_index( current_time );
        let crossed = matches!( ( self.tick_period, period ), ( Some( last ), Some( now ) ) if now > last );
        self.tick_period = period;

        if crossed || throttle.should_persist( current_time ) {
            tracing::debug!( "Checkpointing position {:.2}s", current_time );
            self.persist();
        }
    }


    /// Metadata for the current source is available.
    pub fn on_loaded_metadata( &mut self, duration: f64 ) {
        self.view.render( ViewUpdate::Progress( Progress::new( self.sink.current_time(), Some( duration ) ) ) );

        let Some( restore ) = self.pending_restore.take() else {
            return;
        };

        if let Some( time ) = restore.time {
            let target = if duration.is_finite() { time.min( duration ) } else { time };
            tracing::info!( "Resuming track {} at {:.1}s", self.current_track, target );
            self.sink.set_current_time( target );
        }

        if restore.resume {
            self.play();
        }
    }


    /// Last chance to save before the session ends.
    pub fn on_page_unload( &mut self ) {
        tracing::info!( "Saving state on exit" );
        self.persist();
    }


    /// The session came back from a suspended state.
    ///
    /// Output may have been stopped behind our back, so playback is
    /// requested again if the saved state says it was running.
    pub fn on_page_show( &mut self, persisted: bool ) {
        if !persisted {
            return;
        }

        if let Some( saved ) = self.store.load( self.catalog.len() ) {
            if saved.is_playing {
                tracing::info!( "Resuming playback after suspend" );
                self.play();
            }
        }
    }


    /// Dispatches a view command.
    pub fn handle( &mut self, command: Command ) -> Result<(), PlayerError> {
        match command {
            Command::TogglePanel => self.toggle_panel(),
            Command::PlayPause => self.toggle_play(),
            Command::Next => self.next()?,
            Command::Prev => self.previous()?,
            Command::Rewind => self.rewind(),
            Command::Forward => self.forward(),
            Command::SeekTo { offset, width } => self.seek_absolute( offset, width ),
            Command::SetVolume { level } => self.set_volume( level )?,
            Command::ToggleMute => self.toggle_mute(),
            Command::SelectTrack { index } => self.select_track( index )?,
        }
        Ok(())
    }


    /// Dispatches a sink notification.
    pub fn handle_sink_event( &mut self, event: SinkEvent ) -> Result<(), PlayerError> {
        match event {
            SinkEvent::TimeUpdate { current_time, duration } => self.on_position_tick( current_time, duration ),
            SinkEvent::LoadedMetadata { duration } => self.on_loaded_metadata( duration ),
            SinkEvent::Ended => self.on_track_ended()?,
        }
        Ok(())
    }


    /// Current state as it would be persisted.
    ///
    /// While a restore is pending the restoring position is reported, so
    /// saves before metadata arrives keep the stored position.
    pub fn snapshot( &self ) -> PlaybackSnapshot {
        let ( current_time, resuming ) = match self.pending_restore {
            Some( restore ) => ( restore.time.unwrap_or_else( || self.sink.current_time() ), restore.resume ),
            None => ( self.sink.current_time(), false ),
        };

        PlaybackSnapshot {
            current_track: self.current_track,
            is_playing: self.is_playing() || resuming,
            volume: self.sink.volume(),
            current_time,
            muted: self.sink.muted(),
        }
    }


    fn persist( &mut self ) {
        let snapshot = self.snapshot();
        if let Err( e ) = self.store.save( &snapshot ) {
            tracing::warn!( "Failed to save player state: {}", e );
        }
    }


    // The user's own transport commands win over the startup restore.
    fn cancel_restore_resume( &mut self ) {
        if let Some( restore ) = self.pending_restore.as_mut() {
            restore.resume = false;
        }
    }


    fn cancel_restore_seek( &mut self ) {
        if let Some( restore ) = self.pending_restore.as_mut() {
            restore.time = None;
        }
    }


    fn set_state( &mut self, state: PlaybackState ) {
        self.state = state;
        self.view.render( ViewUpdate::PlayState { playing: state == PlaybackState::Playing } );
    }


    fn render_volume( &mut self ) {
        let level = self.sink.volume();
        self.view.render( ViewUpdate::Volume {
            tier: VolumeTier::for_level( level, self.sink.muted() ),
            level,
        });
    }


    fn known_duration( &self ) -> Option<f64> {
        self.sink.duration().filter( |d| d.is_finite() )
    }


    pub fn state( &self ) -> PlaybackState {
        self.state
    }


    pub fn is_playing( &self ) -> bool {
        self.state == PlaybackState::Playing
    }


    pub fn current_track( &self ) -> usize {
        self.current_track
    }


    pub fn catalog( &self ) -> &Catalog {
        &self.catalog
    }


    pub fn panel_open( &self ) -> bool {
        self.panel_open
    }


    /// Returns true while the startup seek/resume is still waiting on metadata.
    pub fn restore_pending( &self ) -> bool {
        self.pending_restore.is_some()
    }


    /// Number of play requests still waiting on the sink.
    pub fn pending_play_count( &self ) -> usize {
        self.pending_plays.len()
    }


    pub fn sink( &self ) -> &M {
        &self.sink
    }


    pub fn sink_mut( &mut self ) -> &mut M {
        &mut self.sink
    }


    pub fn store( &self ) -> &K {
        self.store.inner()
    }


    pub fn view( &self ) -> &V {
        &self.view
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use crate::sink::{ PlayResolver, PlaybackRejected };
    use crate::store::{ MemoryStore, StoreError, STATE_KEY };
    use crate::view::NullView;


    #[derive( Debug, Clone, Copy, PartialEq )]
    enum PlayMode {
        Accept,
        Reject,
        Defer,
    }


    #[derive( Debug )]
    struct FakeSink {
        source: Option<String>,
        time: f64,
        duration: Option<f64>,
        volume: f64,
        muted: bool,
        outputting: bool,
        mode: PlayMode,
        deferred: Vec<PlayResolver>,
        play_calls: usize,
    }


    impl FakeSink {
        fn new( mode: PlayMode ) -> Self {
            Self {
                source: None,
                time: 0.0,
                duration: None,
                volume: 1.0,
                muted: false,
                outputting: false,
                mode,
                deferred: Vec::new(),
                play_calls: 0,
            }
        }
    }


    impl MediaSink for FakeSink {
        fn set_source( &mut self, locator: &str ) {
            self.source = Some( locator.to_string() );
            self.time = 0.0;
            self.duration = None;
            self.outputting = false;
        }


        fn play( &mut self ) -> PlayRequest {
            self.play_calls += 1;
            match self.mode {
                PlayMode::Accept => {
                    self.outputting = true;
                    PlayRequest::resolved( Ok(()) )
                }
                PlayMode::Reject => PlayRequest::resolved( Err( PlaybackRejected::new( "autoplay blocked" ) ) ),
                PlayMode::Defer => {
                    let ( request, resolver ) = PlayRequest::deferred();
                    self.deferred.push( resolver );
                    request
                }
            }
        }


        fn pause( &mut self ) {
            self.outputting = false;
        }


        fn current_time( &self ) -> f64 {
            self.time
        }


        fn set_current_time( &mut self, seconds: f64 ) {
            self.time = seconds;
        }


        fn duration( &self ) -> Option<f64> {
            self.duration
        }


        fn volume( &self ) -> f64 {
            self.volume
        }


        fn set_volume( &mut self, volume: f64 ) {
            self.volume = volume;
        }


        fn muted( &self ) -> bool {
            self.muted
        }


        fn set_muted( &mut self, muted: bool ) {
            self.muted = muted;
        }
    }


    #[derive( Debug, Default )]
    struct CountingStore {
        inner: MemoryStore,
        writes: usize,
    }


    impl KeyValueStore for CountingStore {
        fn get( &self, key: &str ) -> Result<Option<String>, StoreError> {
            self.inner.get( key )
        }


        fn set( &mut self, key: &str, value: &str ) -> Result<(), StoreError> {
            self.writes += 1;
            self.inner.set( key, value )
        }
    }


    #[derive( Debug, Default )]
    struct RecordingView {
        updates: Vec<ViewUpdate>,
    }


    impl View for RecordingView {
        fn render( &mut self, update: ViewUpdate ) {
            self.updates.push( update );
        }
    }


    impl RecordingView {
        fn last_volume_tier( &self ) -> Option<VolumeTier> {
            self.updates.iter().rev().find_map( |u| match u {
                ViewUpdate::Volume { tier, .. } => Some( *tier ),
                _ => None,
            })
        }
    }


    type TestPlayer = Player<FakeSink, CountingStore, RecordingView>;


    fn player( mode: PlayMode ) -> TestPlayer {
        player_with_store( mode, CountingStore::default() )
    }


    fn player_with_store( mode: PlayMode, store: CountingStore ) -> TestPlayer {
        let mut player = Player::new( Catalog::builtin(), FakeSink::new( mode ), store, RecordingView::default() );
        player.start().unwrap();
        player
    }


    fn store_with( raw: &str ) -> CountingStore {
        let mut store = CountingStore::default();
        store.inner.set( STATE_KEY, raw ).unwrap();
        store
    }


    fn stored( player: &TestPlayer ) -> PlaybackSnapshot {
        let raw = player.store().get( STATE_KEY ).unwrap().expect( "snapshot written" );
        serde_json::from_str( &raw ).unwrap()
    }


    #[test]
    fn test_defaults_without_saved_state() {
        let player = player( PlayMode::Accept );

        assert_eq!( player.current_track(), 0 );
        assert_eq!( player.state(), PlaybackState::Paused );
        assert_eq!( player.sink().volume, DEFAULT_VOLUME );
        assert_eq!( player.sink().source.as_deref(), Some( "music/outside.mp3" ) );
        assert!( !player.restore_pending() );
        assert_eq!( stored( &player ), PlaybackSnapshot::default() );
    }


    #[test]
    fn test_malformed_saved_state_uses_defaults() {
        let player = player_with_store( PlayMode::Accept, store_with( "{ broken" ) );

        assert_eq!( player.current_track(), 0 );
        assert_eq!( player.sink().volume, DEFAULT_VOLUME );
        assert!( !player.restore_pending() );
    }


    #[test]
    fn test_next_wraps_to_first() {
        let mut player = player( PlayMode::Accept );
        player.select_track( 3 ).unwrap();

        player.next().unwrap();
        assert_eq!( player.current_track(), 0 );
    }


    #[test]
    fn test_previous_wraps_to_last() {
        let mut player = player( PlayMode::Accept );

        player.previous().unwrap();
        assert_eq!( player.current_track(), 3 );
        assert_eq!( player.sink().source.as_deref(), Some( "music/hertbrak.mp3" ) );
    }


    #[test]
    fn test_next_cycles_back_to_start() {
        let mut player = player( PlayMode::Accept );
        let len = player.catalog().len();

        for start in 0..len {
            player.select_track( start ).unwrap();
            for _ in 0..len {
                player.next().unwrap();
            }
            assert_eq!( player.current_track(), start );
        }
    }


    #[test]
    fn test_previous_undoes_next() {
        let mut player = player( PlayMode::Accept );

        for start in 0..player.catalog().len() {
            player.select_track( start ).unwrap();
            player.next().unwrap();
            player.previous().unwrap();
            assert_eq!( player.current_track(), start );
        }
    }


    #[test]
    fn test_next_while_paused_does_not_play() {
        let mut player = player( PlayMode::Accept );

        player.next().unwrap();
        assert_eq!( player.sink().play_calls, 0 );
        assert_eq!( player.state(), PlaybackState::Paused );
    }


    #[test]
    fn test_next_while_playing_resumes() {
        let mut player = player( PlayMode::Accept );
        player.play();
        assert_eq!( player.state(), PlaybackState::Playing );

        player.next().unwrap();
        assert_eq!( player.current_track(), 1 );
        assert_eq!( player.sink().play_calls, 2 );
        assert_eq!( player.state(), PlaybackState::Playing );
        assert!( stored( &player ).is_playing );
    }


    #[test]
    fn test_next_keeps_new_track_when_play_rejected() {
        let mut player = player( PlayMode::Accept );
        player.play();
        player.sink_mut().mode = PlayMode::Reject;

        player.next().unwrap();
        assert_eq!( player.current_track(), 1 );
        assert_eq!( player.state(), PlaybackState::Paused );
        assert_eq!( stored( &player ).current_track, 1 );
        assert!( !stored( &player ).is_playing );
    }


    #[test]
    fn test_play_rejection_stays_paused() {
        let mut player = player( PlayMode::Reject );

        player.play();
        assert_eq!( player.state(), PlaybackState::Paused );
        assert_eq!( player.pending_play_count(), 0 );
    }


    #[test]
    fn test_pause_is_safe_when_paused() {
        let mut player = player( PlayMode::Accept );

        player.pause();
        player.pause();
        assert_eq!( player.state(), PlaybackState::Paused );
    }


    #[test]
    fn test_toggle_play() {
        let mut player = player( PlayMode::Accept );

        player.toggle_play();
        assert!( player.is_playing() );
        assert!( player.sink().outputting );

        player.toggle_play();
        assert!( !player.is_playing() );
        assert!( !player.sink().outputting );
    }


    #[test]
    fn test_select_track_matches_next_semantics() {
        let mut player = player( PlayMode::Accept );

        player.select_track( 2 ).unwrap();
        assert_eq!( player.sink().play_calls, 0 );

        player.play();
        player.select_track( 1 ).unwrap();
        assert_eq!( player.current_track(), 1 );
        assert_eq!( player.sink().play_calls, 2 );
        assert!( player.is_playing() );
    }


    #[test]
    fn test_select_track_out_of_range_fails() {
        let mut player = player( PlayMode::Accept );

        let result = player.handle( Command::SelectTrack { index: 9 } );
        assert!( matches!(
            result,
            Err( PlayerError::Catalog( CatalogError::IndexOutOfRange { index: 9, len: 4 } ) )
        ));
        assert_eq!( player.current_track(), 0 );
    }


    #[test]
    fn test_track_ended_advances_and_plays() {
        let mut player = player( PlayMode::Accept );
        player.play();

        player.handle_sink_event( SinkEvent::Ended ).unwrap();
        assert_eq!( player.current_track(), 1 );
        assert!( player.is_playing() );
        assert_eq!( player.sink().play_calls, 2 );
    }


    #[test]
    fn test_rewind_clamps_at_zero() {
        let mut player = player( PlayMode::Accept );

        player.sink_mut().time = 25.0;
        player.seek_relative( -10.0 );
        assert_eq!( player.sink().time, 15.0 );

        player.sink_mut().time = 4.0;
        player.rewind();
        assert_eq!( player.sink().time, 0.0 );
    }


    #[test]
    fn test_forward_clamps_at_duration() {
        let mut player = player( PlayMode::Accept );
        player.sink_mut().duration = Some( 180.0 );

        player.sink_mut().time = 175.0;
        player.forward();
        assert_eq!( player.sink().time, 180.0 );

        player.sink_mut().time = 100.0;
        player.forward();
        assert_eq!( player.sink().time, 110.0 );
    }


    #[test]
    fn test_forward_unclamped_without_duration() {
        let mut player = player( PlayMode::Accept );

        player.sink_mut().time = 175.0;
        player.seek_relative( 10.0 );
        assert_eq!( player.sink().time, 185.0 );
    }


    #[test]
    fn test_seek_absolute() {
        let mut player = player( PlayMode::Accept );
        player.sink_mut().duration = Some( 200.0 );

        player.handle( Command::SeekTo { offset: 60.0, width: 240.0 } ).unwrap();
        assert_eq!( player.sink().time, 50.0 );
        assert_eq!( stored( &player ).current_time, 50.0 );
    }


    #[test]
    fn test_seek_absolute_ignored_without_duration() {
        let mut player = player( PlayMode::Accept );
        player.sink_mut().time = 12.0;

        player.seek_absolute( 60.0, 240.0 );
        assert_eq!( player.sink().time, 12.0 );

        player.sink_mut().duration = Some( 200.0 );
        player.seek_absolute( 10.0, 0.0 );
        assert_eq!( player.sink().time, 12.0 );
    }


    #[test]
    fn test_volume_tiers() {
        let mut player = player( PlayMode::Accept );

        player.set_volume( 0.0 ).unwrap();
        assert_eq!( player.view().last_volume_tier(), Some( VolumeTier::Muted ) );
        assert!( !player.sink().muted );

        player.set_volume( 0.4 ).unwrap();
        assert_eq!( player.view().last_volume_tier(), Some( VolumeTier::Low ) );

        player.set_volume( 0.8 ).unwrap();
        assert_eq!( player.view().last_volume_tier(), Some( VolumeTier::High ) );
        assert_eq!( stored( &player ).volume, 0.8 );
    }


    #[test]
    fn test_invalid_volume_rejected() {
        let mut player = player( PlayMode::Accept );

        assert!( matches!( player.set_volume( 1.2 ), Err( PlayerError::InvalidVolume( _ ) ) ) );
        assert!( player.set_volume( f64::NAN ).is_err() );
        assert_eq!( player.sink().volume, DEFAULT_VOLUME );
    }


    #[test]
    fn test_toggle_mute_independent_of_volume() {
        let mut player = player( PlayMode::Accept );
        player.set_volume( 0.8 ).unwrap();

        player.toggle_mute();
        assert!( player.sink().muted );
        assert_eq!( player.sink().volume, 0.8 );
        assert_eq!( player.view().last_volume_tier(), Some( VolumeTier::Muted ) );
        assert!( stored( &player ).muted );

        player.toggle_mute();
        assert_eq!( player.view().last_volume_tier(), Some( VolumeTier::High ) );
    }


    #[test]
    fn test_toggle_panel() {
        let mut player = player( PlayMode::Accept );

        player.handle( Command::TogglePanel ).unwrap();
        assert!( player.panel_open() );
        assert_eq!( player.view().updates.last(), Some( &ViewUpdate::Panel { open: true } ) );

        player.handle( Command::TogglePanel ).unwrap();
        assert!( !player.panel_open() );
    }


    #[test]
    fn test_throttle_boundaries() {
        let throttle = PersistThrottle::default();

        assert!( !throttle.should_persist( 9.95 ) );
        assert!( throttle.should_persist( 10.0 ) );
        assert!( throttle.should_persist( 10.05 ) );
        assert!( throttle.should_persist( 15.0 ) );
        assert!( !throttle.should_persist( 12.05 ) );
        assert!( !throttle.should_persist( 12.12 ) );
        assert!( !throttle.should_persist( f64::NAN ) );
    }


    #[test]
    fn test_position_ticks_are_throttled() {
        let mut player = player( PlayMode::Accept );
        let before = player.store().writes;

        player.on_position_tick( 12.05, Some( 180.0 ) );
        player.on_position_tick( 12.12, Some( 180.0 ) );
        assert_eq!( player.store().writes, before );

        player.on_position_tick( 9.95, Some( 180.0 ) );
        assert_eq!( player.store().writes, before );

        player.sink_mut().time = 10.0;
        player.on_position_tick( 10.0, Some( 180.0 ) );
        assert_eq!( player.store().writes, before + 1 );
        assert_eq!( stored( &player ).current_time, 10.0 );

        player.on_position_tick( 10.05, Some( 180.0 ) );
        player.on_position_tick( 15.0, Some( 180.0 ) );
        assert_eq!( player.store().writes, before + 3 );
    }


    #[test]
    fn test_coarse_ticks_checkpoint_every_period() {
        let mut player = player( PlayMode::Accept );
        let mut checkpoints = Vec::new();

        // 300 ms ticks never line up with the 0.1 s window
        for k in 0..200 {
            let t = 0.07 + 0.3 * k as f64;
            let before = player.store().writes;
            player.sink_mut().time = t;
            player.on_position_tick( t, Some( 180.0 ) );
            if player.store().writes > before {
                checkpoints.push( t );
            }
        }

        let periods: Vec<u64> = checkpoints.iter().map( |t| ( t / 5.0 ).floor() as u64 ).collect();
        assert_eq!( periods, ( 0..12 ).collect::<Vec<_>>() );
        assert!( checkpoints.windows( 2 ).all( |w| w[ 1 ] - w[ 0 ] < 5.0 + 0.3 + 1e-9 ) );
    }


    #[test]
    fn test_position_tick_renders_progress() {
        let mut player = player( PlayMode::Accept );

        player.handle_sink_event( SinkEvent::TimeUpdate { current_time: 45.0, duration: Some( 180.0 ) } ).unwrap();
        assert_eq!(
            player.view().updates.last(),
            Some( &ViewUpdate::Progress( Progress {
                percent: Some( 25.0 ),
                elapsed: "0:45".into(),
                total: Some( "3:00".into() ),
            }))
        );
    }


    #[test]
    fn test_restore_waits_for_metadata_then_plays() {
        let saved = r#"{"currentTrack":1,"isPlaying":true,"volume":0.3,"currentTime":42.5,"muted":false}"#;
        let mut player = player_with_store( PlayMode::Reject, store_with( saved ) );

        assert_eq!( player.current_track(), 1 );
        assert_eq!( player.sink().source.as_deref(), Some( "music/leaving.mp3" ) );
        assert_eq!( player.sink().volume, 0.3 );
        assert_eq!( player.sink().time, 0.0 );
        assert_eq!( player.sink().play_calls, 0 );
        assert!( player.restore_pending() );
        assert_eq!( player.view().last_volume_tier(), Some( VolumeTier::Low ) );

        // Loading the track saved again; the stored position must survive that.
        let pending = stored( &player );
        assert_eq!( pending.current_time, 42.5 );
        assert!( pending.is_playing );

        player.sink_mut().duration = Some( 180.0 );
        player.handle_sink_event( SinkEvent::LoadedMetadata { duration: 180.0 } ).unwrap();

        assert_eq!( player.sink().time, 42.5 );
        assert_eq!( player.sink().play_calls, 1 );
        assert_eq!( player.current_track(), 1 );
        assert_eq!( player.state(), PlaybackState::Paused );
        assert!( !player.restore_pending() );

        let after = stored( &player );
        assert_eq!( after.current_time, 42.5 );
        assert!( !after.is_playing );
    }


    #[test]
    fn test_restore_consumed_once() {
        let saved = r#"{"currentTrack":2,"isPlaying":true,"currentTime":30}"#;
        let mut player = player_with_store( PlayMode::Accept, store_with( saved ) );

        player.handle_sink_event( SinkEvent::LoadedMetadata { duration: 200.0 } ).unwrap();
        assert_eq!( player.sink().time, 30.0 );
        assert!( player.is_playing() );

        player.sink_mut().time = 90.0;
        player.handle_sink_event( SinkEvent::LoadedMetadata { duration: 200.0 } ).unwrap();
        assert_eq!( player.sink().time, 90.0 );
        assert_eq!( player.sink().play_calls, 1 );
    }


    #[test]
    fn test_restore_clamps_to_duration() {
        let saved = r#"{"currentTrack":0,"isPlaying":false,"currentTime":500}"#;
        let mut player = player_with_store( PlayMode::Accept, store_with( saved ) );

        player.on_loaded_metadata( 120.0 );
        assert_eq!( player.sink().time, 120.0 );
        assert_eq!( player.sink().play_calls, 0 );
    }


    #[test]
    fn test_restore_dropped_when_track_changes_first() {
        let saved = r#"{"currentTrack":1,"isPlaying":true,"currentTime":42.5}"#;
        let mut player = player_with_store( PlayMode::Accept, store_with( saved ) );

        player.next().unwrap();
        assert!( !player.restore_pending() );

        player.on_loaded_metadata( 180.0 );
        assert_eq!( player.current_track(), 2 );
        assert_eq!( player.sink().time, 0.0 );
        assert_eq!( player.sink().play_calls, 0 );
    }


    #[test]
    fn test_pause_before_metadata_cancels_resume() {
        let saved = r#"{"currentTrack":1,"isPlaying":true,"currentTime":42.5}"#;
        let mut player = player_with_store( PlayMode::Accept, store_with( saved ) );

        player.pause();
        player.on_page_unload();
        let unloaded = stored( &player );
        assert!( !unloaded.is_playing );
        assert_eq!( unloaded.current_time, 42.5 );

        player.sink_mut().duration = Some( 180.0 );
        player.on_loaded_metadata( 180.0 );
        assert_eq!( player.sink().time, 42.5 );
        assert_eq!( player.sink().play_calls, 0 );
        assert_eq!( player.state(), PlaybackState::Paused );
    }


    #[test]
    fn test_seek_before_metadata_keeps_user_position() {
        let saved = r#"{"currentTrack":1,"isPlaying":true,"currentTime":42.5}"#;
        let mut player = player_with_store( PlayMode::Accept, store_with( saved ) );

        player.rewind();
        assert_eq!( player.sink().time, 0.0 );
        let after_seek = stored( &player );
        assert_eq!( after_seek.current_time, 0.0 );
        assert!( after_seek.is_playing );

        player.sink_mut().duration = Some( 180.0 );
        player.on_loaded_metadata( 180.0 );
        assert_eq!( player.sink().time, 0.0 );
        assert_eq!( player.sink().play_calls, 1 );
        assert!( player.is_playing() );
    }


    #[test]
    fn test_play_before_metadata_not_repeated() {
        let saved = r#"{"currentTrack":1,"isPlaying":true,"currentTime":42.5}"#;
        let mut player = player_with_store( PlayMode::Accept, store_with( saved ) );

        player.toggle_play();
        assert!( player.is_playing() );

        player.sink_mut().duration = Some( 180.0 );
        player.on_loaded_metadata( 180.0 );
        assert_eq!( player.sink().time, 42.5 );
        assert_eq!( player.sink().play_calls, 1 );
    }


    #[test]
    fn test_restore_rejects_unknown_track() {
        let mut player = Player::new( Catalog::builtin(), FakeSink::new( PlayMode::Accept ), MemoryStore::default(), NullView );
        player.restore( None ).unwrap();

        let saved = PlaybackSnapshot {
            current_track: 7,
            is_playing: true,
            volume: 0.2,
            current_time: 30.0,
            muted: true,
        };
        let result = player.restore( Some( saved ) );

        assert!( matches!(
            result,
            Err( PlayerError::Catalog( CatalogError::IndexOutOfRange { index: 7, len: 4 } ) )
        ));
        assert!( !player.restore_pending() );
        assert_eq!( player.current_track(), 0 );
        assert_eq!( player.sink().volume, DEFAULT_VOLUME );
        assert!( !player.sink().muted );
    }


    #[test]
    fn test_restore_applies_mute() {
        let saved = r#"{"currentTrack":0,"volume":0.9,"muted":true}"#;
        let player = player_with_store( PlayMode::Accept, store_with( saved ) );

        assert!( player.sink().muted );
        assert_eq!( player.view().last_volume_tier(), Some( VolumeTier::Muted ) );
    }


    #[test]
    fn test_late_resolution_applies_to_current_state() {
        let mut player = player( PlayMode::Defer );

        player.play();
        assert_eq!( player.pending_play_count(), 1 );
        assert_eq!( player.state(), PlaybackState::Paused );

        // The user pauses before the request settles; the success still lands.
        player.pause();
        let resolver = player.sink_mut().deferred.pop().unwrap();
        resolver.resolve( Ok(()) );

        assert_eq!( player.poll_pending_plays(), 1 );
        assert_eq!( player.state(), PlaybackState::Playing );
        assert_eq!( player.pending_play_count(), 0 );
    }


    #[test]
    fn test_deferred_rejection_after_next() {
        let mut player = player( PlayMode::Accept );
        player.play();
        player.sink_mut().mode = PlayMode::Defer;

        player.next().unwrap();
        assert_eq!( player.current_track(), 1 );
        assert!( player.is_playing() );

        let resolver = player.sink_mut().deferred.pop().unwrap();
        resolver.resolve( Err( PlaybackRejected::new( "decode stalled" ) ) );
        player.poll_pending_plays();

        assert_eq!( player.current_track(), 1 );
        assert_eq!( player.state(), PlaybackState::Paused );
    }


    #[test]
    fn test_abandoned_request_counts_as_rejection() {
        let mut player = player( PlayMode::Defer );

        player.play();
        player.sink_mut().deferred.clear();

        assert_eq!( player.poll_pending_plays(), 1 );
        assert_eq!( player.state(), PlaybackState::Paused );
    }


    #[test]
    fn test_unload_saves_latest_position() {
        let mut player = player( PlayMode::Accept );
        player.sink_mut().time = 77.3;

        player.on_page_unload();
        assert_eq!( stored( &player ).current_time, 77.3 );
    }


    #[test]
    fn test_page_show_resumes_when_saved_playing() {
        let mut player = player( PlayMode::Accept );
        player.play();
        player.sink_mut().outputting = false;

        player.on_page_show( false );
        assert_eq!( player.sink().play_calls, 1 );

        player.on_page_show( true );
        assert_eq!( player.sink().play_calls, 2 );
        assert!( player.sink().outputting );
    }


    #[test]
    fn test_page_show_ignored_when_saved_paused() {
        let mut player = player( PlayMode::Accept );

        player.on_page_show( true );
        assert_eq!( player.sink().play_calls, 0 );
    }


    #[test]
    fn test_saved_snapshot_survives_restart() {
        let mut first = player( PlayMode::Accept );
        first.select_track( 2 ).unwrap();
        first.set_volume( 0.7 ).unwrap();
        first.sink_mut().time = 61.0;
        first.on_page_unload();

        let raw = first.store().get( STATE_KEY ).unwrap().unwrap();
        let mut second = player_with_store( PlayMode::Accept, store_with( &raw ) );
        second.on_loaded_metadata( 240.0 );

        assert_eq!( second.current_track(), 2 );
        assert_eq!( second.sink().volume, 0.7 );
        assert_eq!( second.sink().time, 61.0 );
        assert!( !second.is_playing() );
    }
}
