//! Remote control command parsing.
//!
//! Commands arrive as one UTF-8 token per datagram. Decoding is total:
//! anything outside the vocabulary is reported as unknown and dropped by
//! the caller, never treated as a failure of the control loop.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;


/// Errors that can occur during command parsing.
#[derive( Debug, Error, PartialEq, Eq )]
pub enum CommandError {
    #[error( "Unknown command: {0:?}" )]
    Unknown( String ),

    #[error( "Payload is not valid UTF-8 ({0} bytes)" )]
    InvalidUtf8( usize ),

    #[error( "Payload too long ({0} bytes)" )]
    TooLong( usize ),
}


/// Playback control command.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Command {
    Play,
    Pause,
    Stop,
    Next,
    ReloadPlaylist,
}


impl Command {
    /// Every command, in wire-vocabulary order.
    pub const ALL: [Command; 5] = [
        Command::Play,
        Command::Pause,
        Command::Stop,
        Command::Next,
        Command::ReloadPlaylist,
    ];


    /// Parses a command token.
    ///
    /// Surrounding whitespace is ignored; the token itself is matched
    /// case-sensitively.
    ///
    /// @param input - The command text to parse
    ///
    /// @returns The parsed command or an error
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        match input.trim() {
            "play" => Ok( Command::Play ),
            "pause" => Ok( Command::Pause ),
            "stop" => Ok( Command::Stop ),
            "next" => Ok( Command::Next ),
            "video_reload" => Ok( Command::ReloadPlaylist ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }


    /// Decodes a raw datagram payload.
    pub fn decode( payload: &[u8] ) -> Result<Self, CommandError> {
        let text = std::str::from_utf8( payload )
            .map_err( |_| CommandError::InvalidUtf8( payload.len() ) )?;
        Self::parse( text )
    }


    /// Returns the wire token for this command.
    pub fn token( &self ) -> &'static str {
        match self {
            Command::Play => "play",
            Command::Pause => "pause",
            Command::Stop => "stop",
            Command::Next => "next",
            Command::ReloadPlaylist => "video_reload",
        }
    }


    /// Returns a brief description of the command for help text.
    pub fn description( &self ) -> &'static str {
        match self {
            Command::Play => "Resume, or start at the current entry",
            Command::Pause => "Pause playback",
            Command::Stop => "Stop playback",
            Command::Next => "Skip to the next entry",
            Command::ReloadPlaylist => "Re-read settings and restart from the first entry",
        }
    }
}


impl FromStr for Command {
    type Err = CommandError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        Self::parse( s )
    }
}


impl fmt::Display for Command {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( self.token() )
    }
}


/// Returns help text listing the control vocabulary.
pub fn help_text() -> String {
    let mut text = String::from( "Control commands (one per UDP datagram):\n" );
    for cmd in Command::ALL {
        text.push_str( &format!( "  {:<14}{}\n", cmd.token(), cmd.description() ) );
    }
    text
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_vocabulary() {
        assert_eq!( Command::parse( "play" ), Ok( Command::Play ) );
        assert_eq!( Command::parse( "pause" ), Ok( Command::Pause ) );
        assert_eq!( Command::parse( "stop" ), Ok( Command::Stop ) );
        assert_eq!( Command::parse( "next" ), Ok( Command::Next ) );
        assert_eq!( Command::parse( "video_reload" ), Ok( Command::ReloadPlaylist ) );
    }


    #[test]
    fn test_parse_trims_whitespace() {
        assert_eq!( Command::parse( "  next\r\n" ), Ok( Command::Next ) );
        assert_eq!( Command::decode( b"\tstop \n" ), Ok( Command::Stop ) );
    }


    #[test]
    fn test_parse_is_case_sensitive() {
        assert!( matches!( Command::parse( "PLAY" ), Err( CommandError::Unknown( _ ) ) ) );
        assert!( matches!( Command::parse( "Video_Reload" ), Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_unknown() {
        for input in [ "", "   ", "reload", "play now", "prev", "next\0" ] {
            assert!(
                matches!( Command::parse( input ), Err( CommandError::Unknown( _ ) ) ),
                "{:?} should be unknown",
                input
            );
        }
    }


    #[test]
    fn test_decode_invalid_utf8() {
        let result = Command::decode( &[ 0xff, 0xfe, b'p' ] );
        assert_eq!( result, Err( CommandError::InvalidUtf8( 3 ) ) );
    }


    #[test]
    fn test_token_matches_parse() {
        for cmd in Command::ALL {
            assert_eq!( Command::parse( cmd.token() ), Ok( cmd ) );
        }
    }


    #[test]
    fn test_help_lists_every_token() {
        let help = help_text();
        for cmd in Command::ALL {
            assert!( help.contains( cmd.token() ) );
        }
    }
}
