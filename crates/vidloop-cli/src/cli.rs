//! Command-line argument parsing for vidloop.

use std::path::PathBuf;

use clap::Parser;

use vidloop_core::Settings;


/// vidloop - A kiosk video player that loops a playlist and takes commands over UDP.
#[derive( Parser, Debug )]
#[command( name = "vidloop" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Settings file (defaults to the platform config directory).
    #[arg( short, long, env = "VIDLOOP_CONFIG" )]
    pub config: Option<PathBuf>,

    /// UDP port for control commands, overriding the settings file.
    #[arg( short, long )]
    pub port: Option<u16>,

    /// Monitor index to pin the window to, overriding the settings file.
    #[arg( short, long )]
    pub monitor: Option<usize>,

    /// Log unrecognized control datagrams at info level.
    #[arg( long )]
    pub log_unknown: bool,

    /// Enable debug logging.
    #[arg( short, long )]
    pub verbose: bool,

    /// Print the control command vocabulary and exit.
    #[arg( long )]
    pub commands: bool,
}


impl Args {
    /// Resolves the settings file location.
    pub fn config_path( &self ) -> PathBuf {
        self.config.clone().unwrap_or_else( Settings::default_path )
    }


    /// Applies command-line overrides on top of loaded settings.
    pub fn apply( &self, settings: &mut Settings ) {
        if let Some( port ) = self.port {
            settings.network_settings.port = port;
        }
        if let Some( monitor ) = self.monitor {
            settings.video_settings.monitor = monitor;
        }
        if self.log_unknown {
            settings.playback_settings.log_unknown_commands = true;
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_overrides() {
        let args = Args::parse_from( [ "vidloop", "--port", "9000", "-m", "2", "--log-unknown" ] );
        let mut settings = Settings::default();
        args.apply( &mut settings );

        assert_eq!( settings.network_settings.port, 9000 );
        assert_eq!( settings.video_settings.monitor, 2 );
        assert!( settings.playback_settings.log_unknown_commands );
    }


    #[test]
    fn test_no_overrides_keeps_settings() {
        let args = Args::parse_from( [ "vidloop", "--config", "/etc/vidloop.json" ] );
        let mut settings = Settings::default();
        args.apply( &mut settings );

        assert_eq!( settings, Settings::default() );
        assert_eq!( args.config_path(), PathBuf::from( "/etc/vidloop.json" ) );
    }
}
