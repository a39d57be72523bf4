//! View contract
//!
//! Render notifications pushed from the player to whatever draws the panel.


/// Volume icon tier.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum VolumeTier {
    Muted,
    Low,
    High,
}


impl VolumeTier {
    /// Picks the tier for a volume level and mute flag.
    ///
    /// A zero level shows as muted even when the mute flag is off.
    pub fn for_level( volume: f64, muted: bool ) -> Self {
        if muted || volume == 0.0 {
            VolumeTier::Muted
        } else if volume < 0.5 {
            VolumeTier::Low
        } else {
            VolumeTier::High
        }
    }
}


/// Progress bar contents.
#[derive( Debug, Clone, PartialEq )]
pub struct Progress {
    /// Filled share of the bar, 0-100. `None` while the duration is unknown.
    pub percent: Option<f64>,
    /// Elapsed time as `M:SS`.
    pub elapsed: String,
    /// Total time as `M:SS`. `None` leaves the label as it was.
    pub total: Option<String>,
}


impl Progress {
    pub fn new( current_time: f64, duration: Option<f64> ) -> Self {
        let duration = duration.filter( |d| d.is_finite() );
        let percent = duration
            .filter( |d| *d > 0.0 )
            .map( |d| ( current_time / d * 100.0 ).clamp( 0.0, 100.0 ) );

        Self {
            percent,
            elapsed: format_time( current_time ),
            total: duration.map( format_time ),
        }
    }
}


/// Updates the player pushes to its view.
#[derive( Debug, Clone, PartialEq )]
pub enum ViewUpdate {
    /// A track was loaded. `index` marks the active playlist entry.
    Track { index: usize, name: String, artist: String },
    PlayState { playing: bool },
    Progress( Progress ),
    Volume { tier: VolumeTier, level: f64 },
    Panel { open: bool },
}


/// Receives render updates.
pub trait View {
    fn render( &mut self, update: ViewUpdate );
}


/// A view that draws nothing.
#[derive( Debug, Default, Clone, Copy )]
pub struct NullView;


impl View for NullView {
    fn render( &mut self, _update: ViewUpdate ) {}
}


/// Formats seconds as `M:SS`. Negative and non-finite input shows as `0:00`.
pub fn format_time( seconds: f64 ) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 { seconds.floor() as u64 } else { 0 };
    format!( "{}:{:02}", total / 60, total % 60 )
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_format_time() {
        assert_eq!( format_time( 0.0 ), "0:00" );
        assert_eq!( format_time( 9.99 ), "0:09" );
        assert_eq!( format_time( 65.0 ), "1:05" );
        assert_eq!( format_time( 600.4 ), "10:00" );
        assert_eq!( format_time( f64::NAN ), "0:00" );
    }


    #[test]
    fn test_volume_tiers() {
        assert_eq!( VolumeTier::for_level( 0.0, false ), VolumeTier::Muted );
        assert_eq!( VolumeTier::for_level( 0.4, false ), VolumeTier::Low );
        assert_eq!( VolumeTier::for_level( 0.5, false ), VolumeTier::High );
        assert_eq!( VolumeTier::for_level( 0.8, false ), VolumeTier::High );
        assert_eq!( VolumeTier::for_level( 0.8, true ), VolumeTier::Muted );
    }


    #[test]
    fn test_progress_with_known_duration() {
        let progress = Progress::new( 45.0, Some( 180.0 ) );
        assert_eq!( progress.percent, Some( 25.0 ) );
        assert_eq!( progress.elapsed, "0:45" );
        assert_eq!( progress.total.as_deref(), Some( "3:00" ) );
    }


    #[test]
    fn test_progress_with_unknown_duration() {
        let progress = Progress::new( 12.0, None );
        assert_eq!( progress.percent, None );
        assert_eq!( progress.elapsed, "0:12" );
        assert_eq!( progress.total, None );

        let nan = Progress::new( 12.0, Some( f64::NAN ) );
        assert_eq!( nan.percent, None );
        assert_eq!( nan.total, None );
    }
}
