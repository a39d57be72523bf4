//! Panel commands and their text form.
//!
//! Commands are what the view forwards into the player. The terminal
//! prompt accepts the same commands typed as slash commands.

use std::str::FromStr;

use thiserror::Error;


/// Errors that can occur during command parsing.
#[derive( Debug, Error )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),
}


/// A command issued by the view.
#[derive( Debug, Clone, Copy, PartialEq )]
pub enum Command {
    TogglePanel,
    PlayPause,
    Next,
    Prev,
    Rewind,
    Forward,
    /// Click on the progress bar, `offset` pixels into a bar `width` wide.
    SeekTo { offset: f64, width: f64 },
    SetVolume { level: f64 },
    ToggleMute,
    SelectTrack { index: usize },
}


/// A line typed at the prompt: either a player command or a host action.
#[derive( Debug, Clone, Copy, PartialEq )]
pub enum Prompt {
    Player( Command ),
    Help,
    Quit,
}


/// Percentage argument in 0..=100.
#[derive( Debug, Clone, Copy, PartialEq )]
struct Percent( f64 );


impl FromStr for Percent {
    type Err = CommandError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches( '%' );
        let value: f64 = trimmed.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Not a number: '{}'", s ) ) )?;

        if !( 0.0..=100.0 ).contains( &value ) {
            return Err( CommandError::InvalidArgument(
                format!( "'{}' is outside 0-100", s )
            ));
        }
        Ok( Percent( value ) )
    }
}


impl Prompt {
    /// Parses a prompt line (without the leading `/`).
    ///
    /// @param input - The command string to parse
    ///
    /// @returns The parsed command or an error
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let mut parts = input.splitn( 2, ' ' );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( |s| s.trim() );

        let command = match cmd.as_str() {
            "panel" | "open" | "close" => Command::TogglePanel,
            "play" | "pause" | "p" => Command::PlayPause,
            "next" | "n" => Command::Next,
            "prev" | "previous" | "pr" => Command::Prev,
            "rew" | "rewind" | "back" => Command::Rewind,
            "fwd" | "forward" | "ff" => Command::Forward,
            "seek" | "sk" => {
                let arg = args
                    .ok_or_else( || CommandError::MissingArgument( "position (0-100%)".into() ) )?;
                let Percent( offset ) = arg.parse()?;
                Command::SeekTo { offset, width: 100.0 }
            }
            "vol" | "volume" => {
                let arg = args
                    .ok_or_else( || CommandError::MissingArgument( "level (0-100)".into() ) )?;
                let Percent( level ) = arg.parse()?;
                Command::SetVolume { level: level / 100.0 }
            }
            "mute" | "m" => Command::ToggleMute,
            "track" | "t" => {
                let arg = args
                    .ok_or_else( || CommandError::MissingArgument( "track number".into() ) )?;
                let number: usize = arg.parse()
                    .map_err( |_| CommandError::InvalidArgument( format!( "Invalid track number: {}", arg ) ) )?;
                if number == 0 {
                    return Err( CommandError::InvalidArgument( "Track numbers start at 1".into() ) );
                }
                Command::SelectTrack { index: number - 1 }
            }
            "help" | "h" | "?" => return Ok( Prompt::Help ),
            "quit" | "q" | "exit" => return Ok( Prompt::Quit ),

            "" => return Err( CommandError::Unknown( "empty command".into() ) ),
            other => return Err( CommandError::Unknown( other.to_string() ) ),
        };

        Ok( Prompt::Player( command ) )
    }
}


impl Command {
    /// Returns a brief description of the command for help text.
    pub fn description( &self ) -> &'static str {
        match self {
            Command::TogglePanel => "Show or hide the panel",
            Command::PlayPause => "Toggle play/pause",
            Command::Next => "Next track",
            Command::Prev => "Previous track",
            Command::Rewind => "Skip back",
            Command::Forward => "Skip forward",
            Command::SeekTo { .. } => "Seek to position",
            Command::SetVolume { .. } => "Set volume",
            Command::ToggleMute => "Toggle mute",
            Command::SelectTrack { .. } => "Select track",
        }
    }
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Playback:
  /play, /pause   Toggle play/pause      [space]
  /next           Next track             [n]
  /prev           Previous track         [p]
  /rew            Skip back 10s          [left]
  /fwd            Skip forward 10s       [right]
  /seek <0-100%>  Seek to position       [click bar]
  /track <n>      Select track n         [1-9]

Volume:
  /vol <0-100>    Set volume             [+/-]
  /mute           Toggle mute            [m]

Other:
  /panel          Show/hide panel        [tab]
  /help           Show this help         [?]
  /quit           Exit playdeck          [q]"#
}


#[cfg( test )]
mod tests {
    use super::*;


    fn player( input: &str ) -> Command {
        match Prompt::parse( input ).unwrap() {
            Prompt::Player( cmd ) => cmd,
            other => panic!( "expected player command, got {:?}", other ),
        }
    }


    #[test]
    fn test_parse_simple() {
        assert_eq!( player( "play" ), Command::PlayPause );
        assert_eq!( player( "pause" ), Command::PlayPause );
        assert_eq!( player( "N" ), Command::Next );
        assert_eq!( player( "prev" ), Command::Prev );
        assert_eq!( player( "mute" ), Command::ToggleMute );
        assert_eq!( player( "panel" ), Command::TogglePanel );
    }


    #[test]
    fn test_parse_seek_percent() {
        assert_eq!( player( "seek 40%" ), Command::SeekTo { offset: 40.0, width: 100.0 } );
        assert_eq!( player( "seek 25" ), Command::SeekTo { offset: 25.0, width: 100.0 } );
    }


    #[test]
    fn test_parse_volume() {
        assert_eq!( player( "vol 40" ), Command::SetVolume { level: 0.4 } );
        assert_eq!( player( "volume 0" ), Command::SetVolume { level: 0.0 } );
    }


    #[test]
    fn test_parse_volume_out_of_range() {
        let result = Prompt::parse( "vol 150" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_track_is_one_based() {
        assert_eq!( player( "track 1" ), Command::SelectTrack { index: 0 } );
        assert_eq!( player( "t 4" ), Command::SelectTrack { index: 3 } );
        assert!( matches!( Prompt::parse( "track 0" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_host_actions() {
        assert_eq!( Prompt::parse( "help" ).unwrap(), Prompt::Help );
        assert_eq!( Prompt::parse( "q" ).unwrap(), Prompt::Quit );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Prompt::parse( "foobar" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_missing_arg() {
        let result = Prompt::parse( "seek" );
        assert!( matches!( result, Err( CommandError::MissingArgument( _ ) ) ) );
    }
}
