//! Settings file handling
//!
//! The kiosk is configured by a single JSON document. Every section is
//! optional and missing fields fall back to their defaults, so a file
//! containing only `file_order` is valid.

use std::collections::BTreeMap;
use std::fs;
use std::net::{ IpAddr, Ipv4Addr, SocketAddr };
use std::path::{ Path, PathBuf };
use std::time::Duration;

use serde::{ Deserialize, Serialize };
use thiserror::Error;

use crate::window::WindowGeometry;


/// Errors that can occur while reading the settings file.
#[derive( Debug, Error )]
pub enum ConfigError {
    #[error( "Cannot read settings {path}: {source}" )]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error( "Malformed settings {path}: {source}" )]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}


/// Window size and placement.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,

    /// Index of the monitor the window is pinned to
    pub monitor: usize,

    /// Offset from the monitor's top-left corner
    pub x: i32,
    pub y: i32,
}


impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            monitor: 0,
            x: 0,
            y: 0,
        }
    }
}


/// Control channel endpoint.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct NetworkSettings {
    pub address: IpAddr,
    pub port: u16,
}


impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            address: IpAddr::V4( Ipv4Addr::UNSPECIFIED ),
            port: 12345,
        }
    }
}


/// Control loop timing and behaviour.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct PlaybackSettings {
    /// Control loop ticks per second
    pub tick_hz: u32,

    /// Minimum spacing between command polls
    pub poll_interval_ms: u64,

    /// First retry delay when nothing is playable
    pub backoff_initial_ms: u64,

    /// Upper bound for the doubling retry delay
    pub backoff_max_ms: u64,

    /// Tear down and exit when a `stop` command arrives
    pub exit_on_stop: bool,

    /// Log unrecognized datagrams at info level instead of debug
    pub log_unknown_commands: bool,

    /// How long a freshly opened file may stay unloaded before it counts as failed
    pub load_grace_ms: u64,
}


impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            tick_hz: 30,
            poll_interval_ms: 100,
            backoff_initial_ms: 1000,
            backoff_max_ms: 8000,
            exit_on_stop: true,
            log_unknown_commands: false,
            load_grace_ms: 1500,
        }
    }
}


impl PlaybackSettings {
    pub fn tick_interval( &self ) -> Duration {
        Duration::from_secs_f64( 1.0 / self.tick_hz.max( 1 ) as f64 )
    }


    pub fn poll_interval( &self ) -> Duration {
        Duration::from_millis( self.poll_interval_ms )
    }


    pub fn backoff_initial( &self ) -> Duration {
        Duration::from_millis( self.backoff_initial_ms.max( 1 ) )
    }


    pub fn backoff_max( &self ) -> Duration {
        Duration::from_millis( self.backoff_max_ms.max( self.backoff_initial_ms.max( 1 ) ) )
    }


    pub fn load_grace( &self ) -> Duration {
        Duration::from_millis( self.load_grace_ms )
    }
}


/// Embedded player settings.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct PlayerSettings {
    /// Window title
    pub title: String,

    /// Extra mpv options set after the kiosk defaults, e.g. `"hwdec": "auto"`
    pub options: BTreeMap<String, String>,
}


impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            title: "vidloop".to_string(),
            options: BTreeMap::new(),
        }
    }
}


/// Complete kiosk settings.
#[derive( Debug, Clone, Default, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    pub video_settings: VideoSettings,
    pub network_settings: NetworkSettings,
    pub playback_settings: PlaybackSettings,
    pub player: PlayerSettings,

    /// Media paths in playback order
    pub file_order: Vec<String>,
}


impl Settings {
    /// Returns the default settings file location.
    ///
    /// Uses the platform config directory, falling back to the working directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map( |p| p.join( "vidloop" ).join( "settings.json" ) )
            .unwrap_or_else( || PathBuf::from( "settings.json" ) )
    }


    /// Reads and parses a settings file.
    pub fn load( path: &Path ) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string( path )
            .map_err( |source| ConfigError::Io { path: path.to_path_buf(), source } )?;
        Self::from_json( &contents )
            .map_err( |source| ConfigError::Parse { path: path.to_path_buf(), source } )
    }


    /// Parses settings from a JSON string.
    pub fn from_json( json: &str ) -> Result<Self, serde_json::Error> {
        serde_json::from_str( json )
    }


    /// Socket address the control channel binds to.
    pub fn control_addr( &self ) -> SocketAddr {
        SocketAddr::new( self.network_settings.address, self.network_settings.port )
    }


    /// Window geometry described by the video settings.
    pub fn geometry( &self ) -> WindowGeometry {
        let video = &self.video_settings;
        WindowGeometry {
            width: video.width,
            height: video.height,
            monitor_index: video.monitor,
            origin_x: video.x,
            origin_y: video.y,
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::io::Write;


    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!( settings.video_settings.width, 800 );
        assert_eq!( settings.video_settings.height, 600 );
        assert_eq!( settings.video_settings.monitor, 0 );
        assert_eq!( settings.network_settings.port, 12345 );
        assert_eq!( settings.control_addr().to_string(), "0.0.0.0:12345" );
        assert!( settings.file_order.is_empty() );
        assert!( settings.playback_settings.exit_on_stop );
    }


    #[test]
    fn test_partial_document_fills_defaults() {
        let settings = Settings::from_json( r#"{
            "video_settings": { "width": 1920, "monitor": 1 },
            "network_settings": { "port": 5000 },
            "file_order": [ "a.mp4", "b.txt" ]
        }"# ).unwrap();

        assert_eq!( settings.video_settings.width, 1920 );
        assert_eq!( settings.video_settings.height, 600 );
        assert_eq!( settings.video_settings.monitor, 1 );
        assert_eq!( settings.network_settings.port, 5000 );
        assert_eq!( settings.file_order, vec![ "a.mp4", "b.txt" ] );
        assert_eq!( settings.playback_settings.tick_hz, 30 );
    }


    #[test]
    fn test_empty_object_is_default() {
        assert_eq!( Settings::from_json( "{}" ).unwrap(), Settings::default() );
    }


    #[test]
    fn test_geometry_from_video_settings() {
        let settings = Settings::from_json( r#"{
            "video_settings": { "width": 1280, "height": 720, "monitor": 2, "x": 10, "y": -5 }
        }"# ).unwrap();

        assert_eq!( settings.geometry(), WindowGeometry {
            width: 1280,
            height: 720,
            monitor_index: 2,
            origin_x: 10,
            origin_y: -5,
        });
    }


    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::load( &dir.path().join( "absent.json" ) );
        assert!( matches!( result, Err( ConfigError::Io { .. } ) ) );
    }


    #[test]
    fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!( file, "{{ \"file_order\": [ " ).unwrap();

        let result = Settings::load( file.path() );
        assert!( matches!( result, Err( ConfigError::Parse { .. } ) ) );
    }


    #[test]
    fn test_player_options() {
        let settings = Settings::from_json( r#"{
            "player": { "options": { "hwdec": "auto", "volume": "0" } }
        }"# ).unwrap();

        assert_eq!( settings.player.title, "vidloop" );
        assert_eq!( settings.player.options.get( "hwdec" ).map( String::as_str ), Some( "auto" ) );
        assert_eq!( settings.player.options.len(), 2 );
    }


    #[test]
    fn test_wrong_field_type_is_malformed() {
        assert!( Settings::from_json( r#"{ "file_order": "a.mp4" }"# ).is_err() );
    }


    #[test]
    fn test_timing_helpers() {
        let playback = PlaybackSettings { tick_hz: 0, backoff_max_ms: 10, ..Default::default() };
        assert_eq!( playback.tick_interval(), Duration::from_secs( 1 ) );
        assert_eq!( playback.backoff_max(), playback.backoff_initial() );
        assert_eq!( PlaybackSettings::default().poll_interval(), Duration::from_millis( 100 ) );
    }
}
