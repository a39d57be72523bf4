//! Media sink contract
//!
//! The host's audio output primitive. The core never decodes audio itself;
//! it drives a sink through this trait and reacts to its notifications.

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use thiserror::Error;


/// The sink declined to start output.
#[derive( Debug, Clone, PartialEq, Eq, Error )]
#[error( "Playback rejected: {reason}" )]
pub struct PlaybackRejected {
    pub reason: String,
}


impl PlaybackRejected {
    pub fn new( reason: impl Into<String> ) -> Self {
        Self { reason: reason.into() }
    }
}


/// Outcome of a play request.
pub type PlayOutcome = Result<(), PlaybackRejected>;


/// Deferred result of [`MediaSink::play`].
///
/// Resolution may arrive long after the request was issued. There is no
/// way to cancel a request once made.
#[derive( Debug )]
pub struct PlayRequest {
    rx: oneshot::Receiver<PlayOutcome>,
}


/// Resolving half of a [`PlayRequest`], held by the sink.
#[derive( Debug )]
pub struct PlayResolver {
    tx: oneshot::Sender<PlayOutcome>,
}


impl PlayRequest {
    /// Creates an unresolved request and the handle that resolves it.
    pub fn deferred() -> ( Self, PlayResolver ) {
        let ( tx, rx ) = oneshot::channel();
        ( Self { rx }, PlayResolver { tx } )
    }


    /// Creates a request that has already resolved.
    pub fn resolved( outcome: PlayOutcome ) -> Self {
        let ( request, resolver ) = Self::deferred();
        resolver.resolve( outcome );
        request
    }


    /// Returns the outcome if the request has resolved.
    ///
    /// A resolver dropped without answering counts as a rejection.
    pub fn try_outcome( &mut self ) -> Option<PlayOutcome> {
        match self.rx.try_recv() {
            Ok( outcome ) => Some( outcome ),
            Err( TryRecvError::Empty ) => None,
            Err( TryRecvError::Closed ) => Some( Err( PlaybackRejected::new( "request abandoned by sink" ) ) ),
        }
    }
}


impl PlayResolver {
    pub fn resolve( self, outcome: PlayOutcome ) {
        // The request may already be gone; nobody is left to observe it then.
        let _ = self.tx.send( outcome );
    }
}


/// Notifications emitted by a sink.
#[derive( Debug, Clone, Copy, PartialEq )]
pub enum SinkEvent {
    /// Periodic position report while output runs.
    TimeUpdate { current_time: f64, duration: Option<f64> },

    /// Fires once per source load, when the duration becomes known.
    LoadedMetadata { duration: f64 },

    /// End of media reached.
    Ended,
}


/// Host audio primitive driven by the player.
pub trait MediaSink {
    /// Points the sink at a new source. Output stops until the next `play`.
    fn set_source( &mut self, locator: &str );

    /// Starts output from the current position.
    fn play( &mut self ) -> PlayRequest;

    fn pause( &mut self );

    /// Current position in seconds.
    fn current_time( &self ) -> f64;

    fn set_current_time( &mut self, seconds: f64 );

    /// Track length in seconds, `None` until metadata has loaded.
    fn duration( &self ) -> Option<f64>;

    fn volume( &self ) -> f64;

    fn set_volume( &mut self, volume: f64 );

    fn muted( &self ) -> bool;

    fn set_muted( &mut self, muted: bool );
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_deferred_resolves_later() {
        let ( mut request, resolver ) = PlayRequest::deferred();
        assert_eq!( request.try_outcome(), None );

        resolver.resolve( Ok(()) );
        assert_eq!( request.try_outcome(), Some( Ok(()) ) );
    }


    #[test]
    fn test_resolved_rejection() {
        let mut request = PlayRequest::resolved( Err( PlaybackRejected::new( "autoplay blocked" ) ) );
        assert_eq!( request.try_outcome(), Some( Err( PlaybackRejected::new( "autoplay blocked" ) ) ) );
    }


    #[test]
    fn test_dropped_resolver_is_rejection() {
        let ( mut request, resolver ) = PlayRequest::deferred();
        drop( resolver );
        assert!( matches!( request.try_outcome(), Some( Err( _ ) ) ) );
    }
}
