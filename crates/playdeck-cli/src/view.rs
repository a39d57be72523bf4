//! Panel render model for the TUI.
//!
//! Collects the player's render updates; `draw_ui` reads it every frame.

use playdeck_core::{ Progress, View, ViewUpdate, VolumeTier };


/// What the panel currently shows.
#[derive( Debug, Clone, PartialEq )]
pub struct PanelView {
    pub open: bool,
    pub track_index: usize,
    pub track_name: String,
    pub track_artist: String,
    pub playing: bool,
    /// Filled share of the progress bar, 0-100.
    pub percent: f64,
    pub elapsed: String,
    pub total: String,
    pub volume_tier: VolumeTier,
    pub volume_level: f64,
}


impl Default for PanelView {
    fn default() -> Self {
        Self {
            open: false,
            track_index: 0,
            track_name: String::new(),
            track_artist: String::new(),
            playing: false,
            percent: 0.0,
            elapsed: "0:00".into(),
            total: "0:00".into(),
            volume_tier: VolumeTier::High,
            volume_level: 0.5,
        }
    }
}


impl PanelView {
    pub fn new() -> Self {
        Self::default()
    }


    /// Icon for the play/pause button.
    pub fn play_icon( &self ) -> &'static str {
        if self.playing { "⏸" } else { "▶" }
    }


    /// Icon for the mute button.
    pub fn volume_icon( &self ) -> &'static str {
        match self.volume_tier {
            VolumeTier::Muted => "🔇",
            VolumeTier::Low => "🔉",
            VolumeTier::High => "🔊",
        }
    }


    fn apply_progress( &mut self, progress: Progress ) {
        self.elapsed = progress.elapsed;
        if let Some( percent ) = progress.percent {
            self.percent = percent;
        }
        if let Some( total ) = progress.total {
            self.total = total;
        }
    }
}


impl View for PanelView {
    fn render( &mut self, update: ViewUpdate ) {
        match update {
            ViewUpdate::Track { index, name, artist } => {
                self.track_index = index;
                self.track_name = name;
                self.track_artist = artist;
                self.percent = 0.0;
            }
            ViewUpdate::PlayState { playing } => self.playing = playing,
            ViewUpdate::Progress( progress ) => self.apply_progress( progress ),
            ViewUpdate::Volume { tier, level } => {
                self.volume_tier = tier;
                self.volume_level = level;
            }
            ViewUpdate::Panel { open } => self.open = open,
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_unknown_duration_keeps_total_label() {
        let mut view = PanelView::new();
        view.render( ViewUpdate::Progress( Progress::new( 30.0, Some( 120.0 ) ) ) );
        assert_eq!( view.total, "2:00" );
        assert_eq!( view.percent, 25.0 );

        view.render( ViewUpdate::Progress( Progress::new( 31.0, None ) ) );
        assert_eq!( view.elapsed, "0:31" );
        assert_eq!( view.total, "2:00" );
        assert_eq!( view.percent, 25.0 );
    }


    #[test]
    fn test_track_update_resets_bar() {
        let mut view = PanelView::new();
        view.percent = 80.0;
        view.render( ViewUpdate::Track { index: 2, name: "Snowfall".into(), artist: "Oneheart".into() } );

        assert_eq!( view.track_index, 2 );
        assert_eq!( view.track_name, "Snowfall" );
        assert_eq!( view.percent, 0.0 );
    }


    #[test]
    fn test_icons_follow_state() {
        let mut view = PanelView::new();
        assert_eq!( view.play_icon(), "▶" );

        view.render( ViewUpdate::PlayState { playing: true } );
        view.render( ViewUpdate::Volume { tier: VolumeTier::Muted, level: 0.0 } );
        assert_eq!( view.play_icon(), "⏸" );
        assert_eq!( view.volume_icon(), "🔇" );
    }
}
