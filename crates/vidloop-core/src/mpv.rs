//! mpv-backed window and playback engine
//!
//! A single embedded mpv core provides both the borderless kiosk window
//! and the decoder. [`MpvWindow`] creates the core and owns its placement;
//! [`MpvBackend`] drives playback on the same core through a shared handle.

use std::path::Path;
use std::rc::Rc;
use std::time::{ Duration, Instant };

use libmpv2::Mpv;

use crate::backend::{ BackendError, BackendState, MediaHandle, PlaybackBackend };
use crate::config::PlayerSettings;
use crate::window::{ PresentationSurface, SurfaceError, SurfaceId, WindowGeometry };


/// Options that turn the mpv window into a kiosk surface.
const KIOSK_OPTIONS: &[( &str, &str )] = &[
    ( "idle", "yes" ),
    ( "keep-open", "yes" ),
    ( "border", "no" ),
    ( "ontop", "yes" ),
    ( "cursor-autohide", "always" ),
    ( "osc", "no" ),
    ( "osd-level", "0" ),
    ( "input-default-bindings", "no" ),
    ( "input-vo-keyboard", "no" ),
];


/// Placement options for `geometry`.
pub fn geometry_options( geometry: &WindowGeometry ) -> Vec<( String, String )> {
    vec![
        ( "screen".into(), geometry.monitor_index.to_string() ),
        ( "fs-screen".into(), geometry.monitor_index.to_string() ),
        ( "geometry".into(), geometry.to_geometry_string() ),
    ]
}


/// Full option list for a new kiosk window, in the order it is applied.
///
/// User options come after the kiosk defaults so they can override them.
/// `force-window` is last: the window appears as soon as it is set.
pub fn window_options( settings: &PlayerSettings, geometry: &WindowGeometry ) -> Vec<( String, String )> {
    let mut options = vec![ ( "title".to_string(), settings.title.clone() ) ];
    options.extend( geometry_options( geometry ) );
    options.extend( KIOSK_OPTIONS.iter().map( |( k, v )| ( k.to_string(), v.to_string() ) ) );
    options.extend( settings.options.iter().map( |( k, v )| ( k.clone(), v.clone() ) ) );
    options.push( ( "force-window".into(), "yes".into() ) );
    options
}


fn apply_options( mpv: &Mpv, options: &[( String, String )] ) -> Result<(), SurfaceError> {
    for ( name, value ) in options {
        mpv.set_property( name, value.as_str() )
            .map_err( |e| SurfaceError::Control( format!( "{}={}: {}", name, value, e ) ) )?;
    }
    Ok(())
}


/// Kiosk window hosted by an embedded mpv core.
pub struct MpvWindow {
    mpv: Rc<Mpv>,
    title: String,
    geometry: WindowGeometry,
    closed: bool,
}


impl MpvWindow {
    /// Creates the player core and opens its window at `geometry`.
    pub fn launch( settings: &PlayerSettings, geometry: &WindowGeometry ) -> Result<Self, SurfaceError> {
        tracing::info!( "Creating player window at {}", geometry );

        let mpv = Mpv::new().map_err( |e| SurfaceError::Init( e.to_string() ) )?;
        apply_options( &mpv, &window_options( settings, geometry ) )?;

        Ok( Self {
            mpv: Rc::new( mpv ),
            title: settings.title.clone(),
            geometry: *geometry,
            closed: false,
        })
    }


    /// Shared handle to the player core, for the playback backend.
    pub fn player( &self ) -> Rc<Mpv> {
        Rc::clone( &self.mpv )
    }


    pub fn geometry( &self ) -> &WindowGeometry {
        &self.geometry
    }
}


impl PresentationSurface for MpvWindow {
    fn surface_id( &self ) -> SurfaceId {
        SurfaceId( format!( "mpv:{}", self.title ) )
    }


    fn pump( &mut self ) {
        // mpv runs its own event loop; closing the window shuts the core down
        if !self.closed && self.mpv.get_property::<bool>( "idle-active" ).is_err() {
            tracing::warn!( "Player window is gone" );
            self.closed = true;
        }
    }


    fn is_alive( &mut self ) -> bool {
        !self.closed
    }


    fn apply_geometry( &mut self, geometry: &WindowGeometry ) -> Result<SurfaceId, SurfaceError> {
        if self.closed {
            return Err( SurfaceError::Closed );
        }
        if *geometry != self.geometry {
            tracing::info!( "Moving window to {}", geometry );
            apply_options( &self.mpv, &geometry_options( geometry ) )?;
            self.geometry = *geometry;
        }
        Ok( self.surface_id() )
    }


    fn close( &mut self ) -> Result<(), SurfaceError> {
        if !self.closed {
            // The core itself is destroyed once the last handle is dropped
            self.mpv.command( "quit", &[] )
                .map_err( |e| SurfaceError::Control( format!( "quit: {}", e ) ) )?;
            self.closed = true;
        }
        Ok(())
    }
}


/// Maps mpv's playback properties onto a backend state.
///
/// mpv drops back to idle when a file cannot be loaded, but only once the
/// load has been processed. While `loading`, an idle core is still opening.
fn playback_state( idle: bool, ended: bool, paused: bool, loading: bool ) -> BackendState {
    match ( idle, loading ) {
        ( true, false ) => BackendState::Error,
        _ if ended => BackendState::Ended,
        _ if paused => BackendState::Paused,
        _ => BackendState::Playing,
    }
}


/// The file currently loaded into mpv.
struct Loaded {
    handle: MediaHandle,
    opened_at: Instant,
}


/// Playback engine driving the window's mpv core.
pub struct MpvBackend {
    mpv: Rc<Mpv>,
    surface: Option<SurfaceId>,
    loaded: Option<Loaded>,
    next_handle: u64,
    load_grace: Duration,
}


impl MpvBackend {
    /// @param mpv - Core shared with the window, see [`MpvWindow::player`]
    /// @param load_grace - How long a freshly opened file may stay idle
    pub fn new( mpv: Rc<Mpv>, load_grace: Duration ) -> Self {
        Self {
            mpv,
            surface: None,
            loaded: None,
            next_handle: 1,
            load_grace,
        }
    }


    fn check( &self, handle: MediaHandle ) -> Result<(), BackendError> {
        match self.loaded {
            Some( ref loaded ) if loaded.handle == handle => Ok(()),
            _ => Err( BackendError::StaleHandle( handle ) ),
        }
    }


    fn set_pause( &mut self, handle: MediaHandle, paused: bool, command: &'static str ) -> Result<(), BackendError> {
        self.check( handle )?;
        self.mpv.set_property( "pause", paused )
            .map_err( |e| BackendError::Command { command, reason: e.to_string() } )
    }


    fn query_state( &self, opened_at: Instant ) -> Result<BackendState, String> {
        let idle = self.mpv.get_property::<bool>( "idle-active" ).map_err( |e| e.to_string() )?;
        // eof-reached is unavailable while idle
        let ended = !idle && self.mpv.get_property::<bool>( "eof-reached" ).unwrap_or( false );
        let paused = self.mpv.get_property::<bool>( "pause" ).map_err( |e| e.to_string() )?;

        Ok( playback_state( idle, ended, paused, opened_at.elapsed() < self.load_grace ) )
    }
}


impl PlaybackBackend for MpvBackend {
    fn attach( &mut self, surface: &SurfaceId ) -> Result<(), BackendError> {
        if self.surface.as_ref() == Some( surface ) {
            return Ok(());
        }

        self.mpv.get_property::<bool>( "idle-active" )
            .map_err( |e| BackendError::Unavailable( e.to_string() ) )?;

        tracing::debug!( "Backend attached to {}", surface );
        self.surface = Some( surface.clone() );
        self.loaded = None;
        Ok(())
    }


    fn open( &mut self, path: &Path ) -> Result<MediaHandle, BackendError> {
        let rejected = |reason: String| BackendError::Rejected {
            path: path.display().to_string(),
            reason,
        };
        if self.surface.is_none() {
            return Err( BackendError::Unavailable( "not attached".into() ) );
        }
        let target = path.to_str()
            .ok_or_else( || rejected( "path is not valid UTF-8".into() ) )?;

        self.mpv.set_property( "pause", true ).map_err( |e| rejected( e.to_string() ) )?;
        self.mpv.command( "loadfile", &[ target, "replace" ] )
            .map_err( |e| rejected( e.to_string() ) )?;

        let handle = MediaHandle( self.next_handle );
        self.next_handle += 1;
        self.loaded = Some( Loaded { handle, opened_at: Instant::now() } );

        tracing::debug!( "Opened {:?} as {}", path, handle );
        Ok( handle )
    }


    fn play( &mut self, handle: MediaHandle ) -> Result<(), BackendError> {
        self.set_pause( handle, false, "play" )
    }


    fn pause( &mut self, handle: MediaHandle ) -> Result<(), BackendError> {
        self.set_pause( handle, true, "pause" )
    }


    fn stop( &mut self, handle: MediaHandle ) -> Result<(), BackendError> {
        if self.check( handle ).is_err() {
            return Ok(());
        }
        self.loaded = None;
        self.mpv.command( "stop", &[] )
            .map_err( |e| BackendError::Command { command: "stop", reason: e.to_string() } )
    }


    fn rewind( &mut self, handle: MediaHandle ) -> Result<(), BackendError> {
        self.check( handle )?;
        self.mpv.command( "seek", &[ "0", "absolute" ] )
            .map_err( |e| BackendError::Command { command: "rewind", reason: e.to_string() } )
    }


    fn state( &mut self, handle: MediaHandle ) -> BackendState {
        let Some( opened_at ) = self.loaded.as_ref().filter( |l| l.handle == handle ).map( |l| l.opened_at ) else {
            return BackendState::Idle;
        };

        match self.query_state( opened_at ) {
            Ok( state ) => state,
            Err( e ) => {
                tracing::warn!( "Cannot query player state: {}", e );
                BackendState::Error
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn geometry() -> WindowGeometry {
        WindowGeometry {
            width: 1024,
            height: 768,
            monitor_index: 1,
            origin_x: 0,
            origin_y: 0,
        }
    }


    fn value<'a>( options: &'a [( String, String )], name: &str ) -> Option<&'a str> {
        options.iter().rev().find( |( k, _ )| k == name ).map( |( _, v )| v.as_str() )
    }


    #[test]
    fn test_window_options() {
        let options = window_options( &PlayerSettings::default(), &geometry() );

        assert_eq!( value( &options, "border" ), Some( "no" ) );
        assert_eq!( value( &options, "ontop" ), Some( "yes" ) );
        assert_eq!( value( &options, "cursor-autohide" ), Some( "always" ) );
        assert_eq!( value( &options, "keep-open" ), Some( "yes" ) );
        assert_eq!( value( &options, "idle" ), Some( "yes" ) );
        assert_eq!( value( &options, "screen" ), Some( "1" ) );
        assert_eq!( value( &options, "fs-screen" ), Some( "1" ) );
        assert_eq!( value( &options, "geometry" ), Some( "1024x768+0+0" ) );
        assert_eq!( value( &options, "title" ), Some( "vidloop" ) );
    }


    #[test]
    fn test_force_window_is_set_last() {
        let options = window_options( &PlayerSettings::default(), &geometry() );
        let last = options.last().unwrap();
        assert_eq!( ( last.0.as_str(), last.1.as_str() ), ( "force-window", "yes" ) );
    }


    #[test]
    fn test_user_options_override_defaults() {
        let mut settings = PlayerSettings::default();
        settings.options.insert( "osd-level".into(), "1".into() );
        settings.options.insert( "hwdec".into(), "auto".into() );

        let options = window_options( &settings, &geometry() );
        assert_eq!( value( &options, "osd-level" ), Some( "1" ) );
        assert_eq!( value( &options, "hwdec" ), Some( "auto" ) );
    }


    #[test]
    fn test_geometry_options_follow_monitor() {
        let moved = WindowGeometry { monitor_index: 2, origin_x: 10, origin_y: -5, ..geometry() };
        let options = geometry_options( &moved );

        assert_eq!( value( &options, "screen" ), Some( "2" ) );
        assert_eq!( value( &options, "fs-screen" ), Some( "2" ) );
        assert_eq!( value( &options, "geometry" ), Some( "1024x768+10-5" ) );
    }


    #[test]
    fn test_playback_state() {
        assert_eq!( playback_state( false, false, false, false ), BackendState::Playing );
        assert_eq!( playback_state( false, false, true, false ), BackendState::Paused );
        assert_eq!( playback_state( false, true, false, false ), BackendState::Ended );
        assert_eq!( playback_state( false, true, true, true ), BackendState::Ended );
    }


    #[test]
    fn test_idle_core_is_error_once_loaded() {
        // Still inside the grace period: the file is being opened
        assert_eq!( playback_state( true, false, true, true ), BackendState::Paused );
        assert_eq!( playback_state( true, false, false, true ), BackendState::Playing );

        assert_eq!( playback_state( true, false, false, false ), BackendState::Error );
        assert_eq!( playback_state( true, false, true, false ), BackendState::Error );
    }
}
