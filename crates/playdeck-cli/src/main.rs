//! Playdeck CLI - terminal host for the audio panel

mod cli;
mod prompt;
mod settings;
mod sink;
mod view;

use std::fs::{ self, OpenOptions };
use std::io::{ self, Stdout };
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{ Duration, Instant };

use anyhow::{ Context, Result };
use clap::Parser;
use crossterm::{
    event::{
        self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
        Event, KeyCode, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind,
    },
    terminal::{ disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen },
    ExecutableCommand,
};
use ratatui::{
    layout::Alignment,
    prelude::*,
    widgets::{ Block, Borders, Gauge, List, ListItem, Paragraph, Wrap },
};
use tracing_subscriber::EnvFilter;

use playdeck_core::{
    command, Catalog, CatalogError, Command, JsonFileStore, MediaSink, Player, PlayerError, Prompt,
};

use cli::Args;
use prompt::{ InputMode, PromptLine };
use settings::Settings;
use sink::AudioSink;
use view::PanelView;


type DeckPlayer = Player<AudioSink, JsonFileStore, PanelView>;


/// Volume change per +/- key press.
const VOLUME_STEP: f64 = 0.1;


/// Application state.
struct App {
    player: DeckPlayer,
    should_quit: bool,
    show_help: bool,

    // Prompt
    input_mode: InputMode,
    prompt: PromptLine,

    // Status message (shown in status bar)
    status_message: Option<String>,
    status_clear_at: Option<Instant>,

    // Clickable regions from the last frame
    progress_area: Option<Rect>,
    playlist_area: Option<Rect>,
}


impl App {
    /// Creates the app and restores the saved session.
    fn new( args: &Args, settings: &Settings ) -> Result<Self> {
        let catalog = match &settings.catalog {
            Some( path ) => Catalog::load( path )
                .with_context( || format!( "Failed to load catalog {:?}", path ) )?,
            None => Catalog::builtin(),
        };

        let state_path = settings.state_file.clone()
            .or_else( JsonFileStore::default_path )
            .unwrap_or_else( || PathBuf::from( "playdeck-state.json" ) );
        let store = JsonFileStore::new( state_path );
        tracing::info!( "Using state file {:?}", store.path() );

        let mut player = Player::with_options(
            catalog,
            AudioSink::new(),
            store,
            PanelView::new(),
            settings.player_options(),
        );

        if args.fresh {
            player.restore( None )?;
        } else {
            player.start()?;
        }

        Ok( Self {
            player,
            should_quit: false,
            show_help: false,
            input_mode: InputMode::Keys,
            prompt: PromptLine::new(),
            status_message: None,
            status_clear_at: None,
            progress_area: None,
            playlist_area: None,
        })
    }


    /// Sets a status message that auto-clears after a delay.
    fn set_status( &mut self, msg: impl Into<String> ) {
        self.status_message = Some( msg.into() );
        self.status_clear_at = Some( Instant::now() + Duration::from_secs( 3 ) );
    }


    /// Delivers sink notifications and settled play requests to the player.
    fn tick( &mut self ) {
        if let Some( clear_at ) = self.status_clear_at {
            if Instant::now() >= clear_at {
                self.status_message = None;
                self.status_clear_at = None;
            }
        }

        for event in self.player.sink_mut().poll_events() {
            if let Err( e ) = self.player.handle_sink_event( event ) {
                self.report( e );
            }
        }

        self.player.poll_pending_plays();
    }


    fn run( &mut self, command: Command ) {
        if let Err( e ) = self.player.handle( command ) {
            self.report( e );
        }
    }


    fn report( &mut self, error: PlayerError ) {
        match &error {
            PlayerError::Catalog( CatalogError::IndexOutOfRange { .. } ) => {
                tracing::error!( "{}", error );
            }
            _ => tracing::warn!( "{}", error ),
        }
        self.set_status( error.to_string() );
    }


    fn step_volume( &mut self, delta: f64 ) {
        let level = ( ( self.player.sink().volume() + delta ) * 10.0 ).round() / 10.0;
        self.run( Command::SetVolume { level: level.clamp( 0.0, 1.0 ) } );
    }


    fn handle_key( &mut self, code: KeyCode, modifiers: KeyModifiers ) {
        if modifiers.contains( KeyModifiers::CONTROL ) && code == KeyCode::Char( 'c' ) {
            self.should_quit = true;
            return;
        }

        match self.input_mode {
            InputMode::Keys => self.handle_panel_key( code ),
            InputMode::Prompt => self.handle_prompt_key( code ),
        }
    }


    fn handle_panel_key( &mut self, code: KeyCode ) {
        if self.show_help {
            self.show_help = false;
            return;
        }

        match code {
            KeyCode::Char( ' ' ) => self.run( Command::PlayPause ),
            KeyCode::Char( 'n' ) => self.run( Command::Next ),
            KeyCode::Char( 'p' ) => self.run( Command::Prev ),
            KeyCode::Left => self.run( Command::Rewind ),
            KeyCode::Right => self.run( Command::Forward ),
            KeyCode::Char( '+' ) | KeyCode::Char( '=' ) => self.step_volume( VOLUME_STEP ),
            KeyCode::Char( '-' ) => self.step_volume( -VOLUME_STEP ),
            KeyCode::Char( 'm' ) => self.run( Command::ToggleMute ),
            KeyCode::Tab | KeyCode::Char( 'o' ) => self.run( Command::TogglePanel ),
            KeyCode::Char( c @ '1'..='9' ) => {
                let index = c as usize - '1' as usize;
                self.run( Command::SelectTrack { index } );
            }
            KeyCode::Char( '/' ) | KeyCode::Char( ':' ) => {
                self.input_mode = InputMode::Prompt;
                self.prompt.clear();
            }
            KeyCode::Char( '?' ) => self.show_help = true,
            KeyCode::Char( 'q' ) | KeyCode::Esc => self.should_quit = true,
            _ => {}
        }
    }


    fn handle_prompt_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Enter => {
                let line = self.prompt.take();
                self.input_mode = InputMode::Keys;
                self.execute_prompt( &line );
            }
            KeyCode::Esc => {
                self.prompt.clear();
                self.input_mode = InputMode::Keys;
            }
            KeyCode::Backspace => self.prompt.backspace(),
            KeyCode::Left => self.prompt.move_left(),
            KeyCode::Right => self.prompt.move_right(),
            KeyCode::Char( c ) => self.prompt.insert( c ),
            _ => {}
        }
    }


    fn execute_prompt( &mut self, line: &str ) {
        match Prompt::parse( line ) {
            Ok( Prompt::Player( command ) ) => {
                self.run( command );
                if self.status_message.is_none() {
                    self.set_status( command.description() );
                }
            }
            Ok( Prompt::Help ) => self.show_help = true,
            Ok( Prompt::Quit ) => self.should_quit = true,
            Err( e ) => self.set_status( e.to_string() ),
        }
    }


    fn handle_mouse( &mut self, column: u16, row: u16, kind: MouseEventKind ) {
        if kind != MouseEventKind::Down( MouseButton::Left ) {
            return;
        }

        if let Some( area ) = self.progress_area.filter( |a| hit( a, column, row ) ) {
            self.run( Command::SeekTo {
                offset: ( column - area.x ) as f64,
                width: area.width as f64,
            });
            return;
        }

        // Rows inside the playlist border map to catalog entries
        if let Some( area ) = self.playlist_area.filter( |a| hit( a, column, row ) ) {
            if row > area.y && row < area.y + area.height.saturating_sub( 1 ) {
                let index = ( row - area.y - 1 ) as usize;
                if index < self.player.catalog().len() {
                    self.run( Command::SelectTrack { index } );
                }
            }
        }
    }
}


fn hit( area: &Rect, column: u16, row: u16 ) -> bool {
    column >= area.x && column < area.x + area.width && row >= area.y && row < area.y + area.height
}


/// Sends logs to a file; the terminal belongs to the UI.
fn init_logging( path: Option<PathBuf> ) -> Result<()> {
    let path = match path.or_else( || dirs::data_local_dir().map( |d| d.join( "playdeck" ).join( "playdeck.log" ) ) ) {
        Some( p ) => p,
        None => return Ok(()),
    };

    if let Some( parent ) = path.parent() {
        fs::create_dir_all( parent )?;
    }
    let file = OpenOptions::new()
        .create( true )
        .append( true )
        .open( &path )
        .with_context( || format!( "Failed to open log file {:?}", path ) )?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else( |_| EnvFilter::new( "info" ) );
    tracing_subscriber::fmt()
        .with_env_filter( filter )
        .with_ansi( false )
        .with_writer( Mutex::new( file ) )
        .init();

    Ok(())
}


fn main() -> Result<()> {
    let args = Args::parse();
    init_logging( args.log_file.clone() )?;

    let settings = Settings::load().with_args( &args );
    let mut app = App::new( &args, &settings )?;
    let tick = Duration::from_millis( settings.tick_ms.max( 10 ) );

    let result = setup_terminal()
        .and_then( |mut terminal| run_loop( &mut terminal, &mut app, tick ) );

    // Save before tearing down, even if the loop failed
    app.player.on_page_unload();

    let cleanup = restore_terminal();
    result.and( cleanup.map_err( Into::into ) )
}


fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    io::stdout().execute( EnterAlternateScreen )?;
    io::stdout().execute( EnableMouseCapture )?;
    io::stdout().execute( EnableFocusChange )?;

    Ok( Terminal::new( CrosstermBackend::new( io::stdout() ) )? )
}


/// Runs every teardown step, even after a failed one.
fn restore_terminal() -> io::Result<()> {
    first_error([
        io::stdout().execute( DisableFocusChange ).map( |_| () ),
        io::stdout().execute( DisableMouseCapture ).map( |_| () ),
        disable_raw_mode(),
        io::stdout().execute( LeaveAlternateScreen ).map( |_| () ),
    ])
}


fn first_error( results: impl IntoIterator<Item = io::Result<()>> ) -> io::Result<()> {
    results.into_iter().find( Result::is_err ).unwrap_or( Ok(()) )
}


fn run_loop( terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App, tick: Duration ) -> Result<()> {
    loop {
        app.tick();

        terminal.draw( |frame| draw_ui( frame, app ) )?;

        if event::poll( tick )? {
            match event::read()? {
                Event::Key( key ) if key.kind == KeyEventKind::Press => {
                    app.handle_key( key.code, key.modifiers );
                }
                Event::Mouse( mouse ) => {
                    app.handle_mouse( mouse.column, mouse.row, mouse.kind );
                }
                // Coming back to the terminal is treated like a restored page
                Event::FocusGained => app.player.on_page_show( true ),
                _ => {}
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}


/// Draws the main UI.
fn draw_ui( frame: &mut Frame, app: &mut App ) {
    let chunks = Layout::default()
        .direction( Direction::Vertical )
        .constraints([ Constraint::Min( 3 ), Constraint::Length( 1 ) ])
        .split( frame.area() );

    if app.show_help {
        draw_help( frame, chunks[ 0 ] );
        app.progress_area = None;
        app.playlist_area = None;
    } else if app.player.view().open {
        draw_panel( frame, app, chunks[ 0 ] );
    } else {
        draw_toggle( frame, app, chunks[ 0 ] );
        app.progress_area = None;
        app.playlist_area = None;
    }

    draw_status_bar( frame, app, chunks[ 1 ] );
}


/// Collapsed panel: just the toggle and what is playing.
fn draw_toggle( frame: &mut Frame, app: &App, area: Rect ) {
    let view = app.player.view();
    let line = Line::from( vec![
        Span::styled( " ♪ ", Style::default().fg( Color::Cyan ).add_modifier( Modifier::BOLD ) ),
        Span::raw( format!( "{} ", view.play_icon() ) ),
        Span::styled( view.track_name.clone(), Style::default().add_modifier( Modifier::BOLD ) ),
        Span::styled( format!( " - {}", view.track_artist ), Style::default().fg( Color::Gray ) ),
        Span::styled( "   [Tab] open panel", Style::default().fg( Color::DarkGray ) ),
    ]);

    let widget = Paragraph::new( line )
        .block( Block::default().borders( Borders::ALL ).title( " Playdeck " ) );
    let height = area.height.min( 3 );
    frame.render_widget( widget, Rect { height, ..area } );
}


fn draw_panel( frame: &mut Frame, app: &mut App, area: Rect ) {
    let block = Block::default()
        .borders( Borders::ALL )
        .title( " Playdeck " )
        .title_alignment( Alignment::Center );
    let inner = block.inner( area );
    frame.render_widget( block, area );

    let rows = Layout::default()
        .direction( Direction::Vertical )
        .constraints([
            Constraint::Length( 2 ), // title / artist
            Constraint::Length( 1 ), // transport
            Constraint::Length( 1 ), // progress bar
            Constraint::Length( 1 ), // times
            Constraint::Length( 1 ), // volume
            Constraint::Min( 3 ),    // playlist
        ])
        .split( inner );

    let view = app.player.view().clone();

    let info = Paragraph::new( vec![
        Line::from( Span::styled( view.track_name.clone(), Style::default().add_modifier( Modifier::BOLD ) ) ),
        Line::from( Span::styled( view.track_artist.clone(), Style::default().fg( Color::Gray ) ) ),
    ])
    .alignment( Alignment::Center );
    frame.render_widget( info, rows[ 0 ] );

    let transport = Paragraph::new( format!( "⏮   ⏪   {}   ⏩   ⏭", view.play_icon() ) )
        .alignment( Alignment::Center )
        .style( Style::default().fg( Color::Cyan ) );
    frame.render_widget( transport, rows[ 1 ] );

    let gauge = Gauge::default()
        .gauge_style( Style::default().fg( Color::Cyan ).bg( Color::DarkGray ) )
        .ratio( ( view.percent / 100.0 ).clamp( 0.0, 1.0 ) )
        .label( "" );
    frame.render_widget( gauge, rows[ 2 ] );
    app.progress_area = Some( rows[ 2 ] );

    let times = Paragraph::new( Line::from( vec![
        Span::raw( view.elapsed.clone() ),
        Span::styled( " / ", Style::default().fg( Color::DarkGray ) ),
        Span::raw( view.total.clone() ),
    ]));
    frame.render_widget( times, rows[ 3 ] );

    let filled = ( view.volume_level * 10.0 ).round() as usize;
    let volume = Paragraph::new( format!(
        "{} {}{} {:>3}%",
        view.volume_icon(),
        "█".repeat( filled ),
        "░".repeat( 10usize.saturating_sub( filled ) ),
        ( view.volume_level * 100.0 ).round() as u32
    ));
    frame.render_widget( volume, rows[ 4 ] );

    let items: Vec<ListItem> = app.player.catalog().iter().enumerate().map( |( i, track )| {
        let style = if i == view.track_index {
            Style::default().fg( Color::Cyan ).add_modifier( Modifier::BOLD )
        } else {
            Style::default()
        };
        let marker = if i == view.track_index { "▸" } else { " " };
        ListItem::new( format!( "{} {}. {} - {}", marker, i + 1, track.name, track.artist ) ).style( style )
    }).collect();

    let list = List::new( items )
        .block( Block::default().borders( Borders::TOP | Borders::BOTTOM ).title( " Playlist " ) );
    frame.render_widget( list, rows[ 5 ] );
    app.playlist_area = Some( rows[ 5 ] );
}


fn draw_help( frame: &mut Frame, area: Rect ) {
    let help = Paragraph::new( command::help_text() )
        .block( Block::default().borders( Borders::ALL ).title( " Help (any key to close) " ) )
        .wrap( Wrap { trim: false } );
    frame.render_widget( help, area );
}


fn draw_status_bar( frame: &mut Frame, app: &App, area: Rect ) {
    if app.input_mode == InputMode::Prompt {
        let line = Paragraph::new( format!( "/{}", app.prompt.text() ) );
        frame.render_widget( line, area );
        frame.set_cursor_position(( area.x + 1 + app.prompt.cursor_col() as u16, area.y ));
        return;
    }

    let text = match &app.status_message {
        Some( msg ) => Span::styled( msg.clone(), Style::default().fg( Color::Yellow ) ),
        None => Span::styled(
            "space play/pause · n/p track · ←/→ skip · +/- volume · m mute · / command · ? help · q quit",
            Style::default().fg( Color::DarkGray ),
        ),
    };
    frame.render_widget( Paragraph::new( Line::from( text ) ), area );
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_first_error_reports_earliest_failure() {
        let result = first_error([
            Ok(()),
            Err( io::Error::other( "focus" ) ),
            Ok(()),
            Err( io::Error::other( "screen" ) ),
        ]);
        assert_eq!( result.unwrap_err().to_string(), "focus" );
        assert!( first_error([ Ok(()), Ok(()) ]).is_ok() );
    }


    #[test]
    fn test_hit_bounds() {
        let area = Rect::new( 2, 3, 10, 1 );
        assert!( hit( &area, 2, 3 ) );
        assert!( hit( &area, 11, 3 ) );
        assert!( !hit( &area, 12, 3 ) );
        assert!( !hit( &area, 5, 4 ) );
    }
}
