//! Playback coordination
//!
//! The coordinator owns the playlist, the cursor and the backend handle,
//! and is driven by a fixed-cadence tick. Each tick runs, in order:
//!
//! 1. command dispatch (rate limited to the poll interval)
//! 2. the end-of-media check, or a retry when backing off
//! 3. the surface liveness check
//!
//! Handling commands first means a `stop` arriving in the same tick the
//! media ends can never be followed by an automatic advance.

use std::path::{ Path, PathBuf };
use std::time::{ Duration, Instant };

use thiserror::Error;

use crate::backend::{ BackendError, BackendState, MediaHandle, PlaybackBackend };
use crate::channel::CommandSource;
use crate::command::Command;
use crate::config::{ PlaybackSettings, Settings };
use crate::playlist::Playlist;
use crate::window::{ PresentationSurface, SurfaceError, WindowGeometry };


/// Why a single playlist entry could not be started.
#[derive( Debug, Error )]
pub enum MediaOpenError {
    #[error( "File not found: {0}" )]
    NotFound( PathBuf ),

    #[error( transparent )]
    Backend( #[from] BackendError ),

    #[error( "Playback of {0} failed" )]
    Failed( PathBuf ),
}


/// Every entry of the playlist was tried and none could be started.
#[derive( Debug, Error, PartialEq, Eq )]
#[error( "No playable entry after {attempts} attempts" )]
pub struct NoPlayableEntry {
    pub attempts: usize,
}


/// Errors raised while releasing resources on shutdown.
#[derive( Debug, Error )]
pub enum TeardownError {
    #[error( "Failed to stop playback: {0}" )]
    Backend( #[source] BackendError ),

    #[error( "Failed to close window: {0}" )]
    Surface( #[source] SurfaceError ),
}


/// Coordinator state, layered over the backend's own state.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum CoordinatorState {
    /// Nothing is playing and nothing could be started
    Idle,
    Advancing,
    Playing,
    Paused,
    Stopped,
    Terminated,
}


/// Why the control loop ended.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum LoopExit {
    StopRequested,
    SurfaceClosed,
}


/// Result of a single tick.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum TickOutcome {
    Continue,
    Exit( LoopExit ),
}


/// The entry currently handed to the backend.
#[derive( Debug )]
struct Current {
    handle: MediaHandle,
    path: PathBuf,
}


/// Retry schedule while nothing is playable.
#[derive( Debug, Clone, Copy )]
struct Backoff {
    delay: Duration,
    retry_at: Instant,
}


/// Adjusts freshly loaded settings, e.g. with command-line overrides.
pub type SettingsHook = Box<dyn Fn( &mut Settings )>;


/// Drives playback of the playlist and reacts to remote commands.
pub struct Coordinator<B, S, C> {
    backend: B,
    surface: S,
    commands: C,
    config_path: PathBuf,
    playlist: Playlist,
    geometry: WindowGeometry,
    timing: PlaybackSettings,
    state: CoordinatorState,
    current: Option<Current>,
    next_poll: Option<Instant>,
    backoff: Option<Backoff>,
    overrides: Option<SettingsHook>,
    exit: Option<LoopExit>,
}


impl<B, S, C> Coordinator<B, S, C>
where
    B: PlaybackBackend,
    S: PresentationSurface,
    C: CommandSource,
{
    /// Creates a coordinator and attaches the backend to the surface.
    ///
    /// @param settings - Settings the playlist and window were built from
    /// @param config_path - Settings file re-read on `video_reload`
    pub fn new(
        settings: &Settings,
        config_path: PathBuf,
        playlist: Playlist,
        mut backend: B,
        surface: S,
        commands: C,
    ) -> Result<Self, BackendError> {
        backend.attach( &surface.surface_id() )?;

        Ok( Self {
            backend,
            surface,
            commands,
            config_path,
            playlist,
            geometry: settings.geometry(),
            timing: settings.playback_settings.clone(),
            state: CoordinatorState::Idle,
            current: None,
            next_poll: None,
            backoff: None,
            overrides: None,
            exit: None,
        })
    }


    /// Installs a hook applied to the settings re-read on `video_reload`.
    ///
    /// The settings passed to [`Coordinator::new`] are expected to have had
    /// the same adjustments applied already.
    pub fn with_overrides<F>( mut self, overrides: F ) -> Self
    where
        F: Fn( &mut Settings ) + 'static,
    {
        self.overrides = Some( Box::new( overrides ) );
        self
    }


    pub fn state( &self ) -> CoordinatorState {
        self.state
    }


    pub fn playlist( &self ) -> &Playlist {
        &self.playlist
    }


    pub fn cursor( &self ) -> Option<usize> {
        self.playlist.cursor()
    }


    pub fn geometry( &self ) -> &WindowGeometry {
        &self.geometry
    }


    /// Current retry delay, if backing off.
    pub fn backoff_delay( &self ) -> Option<Duration> {
        self.backoff.map( |b| b.delay )
    }


    /// Starts playback at the first entry.
    pub fn start( &mut self, now: Instant ) {
        tracing::info!( "Starting playback of {} entries", self.playlist.len() );
        let _ = self.try_start_at( 0, now );
    }


    /// Runs ticks until the loop exits.
    pub async fn run( &mut self ) -> LoopExit {
        loop {
            match self.tick( Instant::now() ) {
                TickOutcome::Exit( exit ) => return exit,
                TickOutcome::Continue => tokio::time::sleep( self.next_delay() ).await,
            }
        }
    }


    /// How long to sleep before the next tick.
    ///
    /// Backing off sleeps for the poll interval rather than the tick so the
    /// loop idles while commands stay responsive.
    pub fn next_delay( &self ) -> Duration {
        let tick = self.timing.tick_interval();
        if self.backoff.is_some() {
            tick.max( self.timing.poll_interval() )
        } else {
            tick
        }
    }


    /// Performs one iteration of the control loop.
    pub fn tick( &mut self, now: Instant ) -> TickOutcome {
        if let Some( exit ) = self.exit {
            return TickOutcome::Exit( exit );
        }

        self.surface.pump();

        if self.next_poll.map_or( true, |at| now >= at ) {
            self.next_poll = Some( now + self.timing.poll_interval() );
            if let Some( cmd ) = self.commands.poll() {
                if let Some( exit ) = self.handle_command( cmd, now ) {
                    return TickOutcome::Exit( exit );
                }
            }
        }

        self.check_playback( now );

        if !self.surface.is_alive() {
            tracing::info!( "Window closed, leaving control loop" );
            return TickOutcome::Exit( self.terminate( LoopExit::SurfaceClosed ) );
        }

        TickOutcome::Continue
    }


    /// Applies a single command.
    ///
    /// Returns the loop exit reason when the command ends the loop.
    pub fn handle_command( &mut self, cmd: Command, now: Instant ) -> Option<LoopExit> {
        tracing::debug!( "Handling '{}' in state {:?}", cmd, self.state );

        match cmd {
            Command::Play => match self.state {
                CoordinatorState::Playing => tracing::debug!( "Already playing" ),
                CoordinatorState::Paused if self.current.is_some() => self.resume(),
                _ => {
                    let at = self.cursor().unwrap_or( 0 );
                    let _ = self.try_start_at( at, now );
                }
            },
            Command::Pause => self.pause(),
            Command::Stop => {
                self.stop_current();
                self.backoff = None;
                self.state = CoordinatorState::Stopped;
                tracing::info!( "Playback stopped at entry {:?}", self.cursor() );

                if self.timing.exit_on_stop {
                    return Some( self.terminate( LoopExit::StopRequested ) );
                }
            }
            Command::Next => {
                self.stop_current();
                if self.playlist.advance().is_some() {
                    let at = self.cursor().unwrap_or( 0 );
                    let _ = self.try_start_at( at, now );
                } else {
                    self.enter_backoff( now );
                }
            }
            Command::ReloadPlaylist => {
                self.stop_current();
                self.reload();
                self.backoff = None;
                let _ = self.try_start_at( 0, now );
            }
        }

        None
    }


    /// Starts the entry at `start`, skipping unplayable entries.
    ///
    /// Tries at most one full lap of the playlist. On success the cursor is
    /// left on the entry that started; otherwise the coordinator backs off.
    pub fn try_start_at( &mut self, start: usize, now: Instant ) -> Result<usize, NoPlayableEntry> {
        let len = self.playlist.len();
        if len == 0 {
            tracing::debug!( "Playlist is empty" );
            self.state = CoordinatorState::Idle;
            self.enter_backoff( now );
            return Err( NoPlayableEntry { attempts: 0 } );
        }

        self.state = CoordinatorState::Advancing;

        for attempt in 0..len {
            let index = ( start + attempt ) % len;
            let path = self.playlist.entries()[ index ].path().to_path_buf();

            match self.start_entry( &path ) {
                Ok(()) => {
                    self.playlist.set_cursor( index );
                    self.state = CoordinatorState::Playing;
                    self.backoff = None;
                    tracing::info!( "Playing [{}/{}] {:?}", index + 1, len, path );
                    return Ok( index );
                }
                Err( e ) => tracing::warn!( "Skipping entry {}: {}", index, e ),
            }
        }

        self.playlist.set_cursor( start );
        self.state = CoordinatorState::Idle;
        self.enter_backoff( now );
        Err( NoPlayableEntry { attempts: len } )
    }


    /// Releases the command socket, stops the backend and closes the window.
    ///
    /// Every step runs even if an earlier one fails; the first failure is returned.
    pub fn shutdown( self ) -> Result<(), TeardownError> {
        let Self { mut backend, mut surface, commands, current, .. } = self;

        drop( commands );

        let mut result = Ok(());
        if let Some( current ) = current {
            if let Err( e ) = backend.stop( current.handle ) {
                tracing::error!( "Failed to stop playback: {}", e );
                result = Err( TeardownError::Backend( e ) );
            }
        }

        if let Err( e ) = surface.close() {
            tracing::error!( "Failed to close window: {}", e );
            if result.is_ok() {
                result = Err( TeardownError::Surface( e ) );
            }
        }

        result
    }


    fn start_entry( &mut self, path: &Path ) -> Result<(), MediaOpenError> {
        if !path.exists() {
            return Err( MediaOpenError::NotFound( path.to_path_buf() ) );
        }

        // Same file as last time: reuse the loaded media instead of reopening
        if let Some( current ) = self.current.as_ref().filter( |c| c.path == path ) {
            let handle = current.handle;
            match self.backend.state( handle ) {
                BackendState::Ended => {
                    self.backend.rewind( handle )?;
                    self.backend.play( handle )?;
                    return Ok(());
                }
                BackendState::Playing | BackendState::Paused => {
                    self.backend.play( handle )?;
                    return Ok(());
                }
                BackendState::Idle | BackendState::Error => {}
            }
        }

        self.stop_current();

        let handle = self.backend.open( path )?;
        self.current = Some( Current { handle, path: path.to_path_buf() } );

        if let Err( e ) = self.backend.play( handle ) {
            self.stop_current();
            return Err( e.into() );
        }
        Ok(())
    }


    /// End-of-media and back-off handling for one tick.
    fn check_playback( &mut self, now: Instant ) {
        match self.state {
            CoordinatorState::Playing => {
                let Some( handle ) = self.current.as_ref().map( |c| c.handle ) else {
                    return;
                };

                match self.backend.state( handle ) {
                    BackendState::Ended => {
                        tracing::debug!( "Entry {:?} finished", self.cursor() );
                        self.playlist.advance();
                    }
                    BackendState::Error | BackendState::Idle => {
                        let path = self.current.as_ref().map( |c| c.path.clone() ).unwrap_or_default();
                        tracing::warn!( "{}", MediaOpenError::Failed( path ) );
                        self.stop_current();
                        self.playlist.advance();
                    }
                    BackendState::Playing | BackendState::Paused => return,
                }

                let at = self.cursor().unwrap_or( 0 );
                let _ = self.try_start_at( at, now );
            }
            CoordinatorState::Idle => {
                if self.backoff.is_some_and( |b| now >= b.retry_at ) {
                    let at = self.cursor().unwrap_or( 0 );
                    tracing::debug!( "Retrying playback at entry {}", at );
                    let _ = self.try_start_at( at, now );
                }
            }
            _ => {}
        }
    }


    fn resume( &mut self ) {
        if let Some( ref current ) = self.current {
            match self.backend.play( current.handle ) {
                Ok(()) => {
                    self.state = CoordinatorState::Playing;
                    tracing::info!( "Resumed" );
                }
                Err( e ) => tracing::warn!( "{}", e ),
            }
        }
    }


    fn pause( &mut self ) {
        let Some( ref current ) = self.current else {
            tracing::debug!( "Nothing to pause" );
            return;
        };

        match self.backend.pause( current.handle ) {
            Ok(()) => {
                if self.state == CoordinatorState::Playing {
                    self.state = CoordinatorState::Paused;
                }
                tracing::info!( "Paused" );
            }
            Err( e ) => tracing::warn!( "{}", e ),
        }
    }


    fn stop_current( &mut self ) {
        if let Some( current ) = self.current.take() {
            if let Err( e ) = self.backend.stop( current.handle ) {
                tracing::warn!( "{}", e );
            }
        }
    }


    /// Re-reads the settings file, swapping in the new playlist and geometry.
    ///
    /// If the file cannot be read the previous playlist stays, with the cursor reset.
    fn reload( &mut self ) {
        let mut settings = match self.playlist.reload( &self.config_path ) {
            Ok( settings ) => settings,
            Err( e ) => {
                tracing::warn!( "{}; keeping previous playlist", e );
                return;
            }
        };
        tracing::info!( "Reloaded playlist: {} entries", self.playlist.len() );

        if let Some( ref overrides ) = self.overrides {
            overrides( &mut settings );
        }

        let geometry = settings.geometry();
        match self.surface.apply_geometry( &geometry ) {
            Ok( surface ) => {
                self.geometry = geometry;
                if let Err( e ) = self.backend.attach( &surface ) {
                    tracing::warn!( "Cannot attach to {}: {}", surface, e );
                }
            }
            Err( e ) => tracing::warn!( "Keeping window geometry {}: {}", self.geometry, e ),
        }
    }


    fn terminate( &mut self, exit: LoopExit ) -> LoopExit {
        self.state = CoordinatorState::Terminated;
        self.exit = Some( exit );
        exit
    }


    fn enter_backoff( &mut self, now: Instant ) {
        let delay = match self.backoff {
            Some( b ) => ( b.delay * 2 ).min( self.timing.backoff_max() ),
            None => {
                tracing::warn!( "Nothing playable, backing off" );
                self.timing.backoff_initial()
            }
        };
        self.backoff = Some( Backoff { delay, retry_at: now + delay } );
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::{ HashMap, HashSet, VecDeque };
    use std::fs;
    use std::rc::Rc;

    use tempfile::TempDir;

    use crate::window::SurfaceId;


    #[derive( Debug, Clone, PartialEq )]
    enum Event {
        Attach( String ),
        Open( String ),
        Play( u64 ),
        Pause( u64 ),
        Stop( u64 ),
        Rewind( u64 ),
        Geometry( WindowGeometry ),
        CommandsClosed,
        SurfaceClosed,
    }


    /// State shared by the fake backend, surface and command source.
    #[derive( Default )]
    struct World {
        events: Vec<Event>,
        states: HashMap<u64, BackendState>,
        reject: HashSet<String>,
        next_handle: u64,
        queue: VecDeque<Command>,
        surface_gone: bool,
        fail_stop: bool,
        fail_close: bool,
    }


    type Shared = Rc<RefCell<World>>;


    fn file_name( path: &Path ) -> String {
        path.file_name().unwrap().to_string_lossy().into_owned()
    }


    struct FakeBackend( Shared );


    impl PlaybackBackend for FakeBackend {
        fn attach( &mut self, surface: &SurfaceId ) -> Result<(), BackendError> {
            self.0.borrow_mut().events.push( Event::Attach( surface.0.clone() ) );
            Ok(())
        }

        fn open( &mut self, path: &Path ) -> Result<MediaHandle, BackendError> {
            let mut world = self.0.borrow_mut();
            let name = file_name( path );
            world.events.push( Event::Open( name.clone() ) );
            if world.reject.contains( &name ) {
                return Err( BackendError::Rejected { path: name, reason: "unsupported codec".into() } );
            }
            world.next_handle += 1;
            let handle = world.next_handle;
            world.states.insert( handle, BackendState::Paused );
            Ok( MediaHandle( handle ) )
        }

        fn play( &mut self, handle: MediaHandle ) -> Result<(), BackendError> {
            let mut world = self.0.borrow_mut();
            world.events.push( Event::Play( handle.0 ) );
            world.states.insert( handle.0, BackendState::Playing );
            Ok(())
        }

        fn pause( &mut self, handle: MediaHandle ) -> Result<(), BackendError> {
            let mut world = self.0.borrow_mut();
            world.events.push( Event::Pause( handle.0 ) );
            world.states.insert( handle.0, BackendState::Paused );
            Ok(())
        }

        fn stop( &mut self, handle: MediaHandle ) -> Result<(), BackendError> {
            let mut world = self.0.borrow_mut();
            world.events.push( Event::Stop( handle.0 ) );
            world.states.remove( &handle.0 );
            if world.fail_stop {
                return Err( BackendError::Command { command: "stop", reason: "player hung".into() } );
            }
            Ok(())
        }

        fn rewind( &mut self, handle: MediaHandle ) -> Result<(), BackendError> {
            self.0.borrow_mut().events.push( Event::Rewind( handle.0 ) );
            Ok(())
        }

        fn state( &mut self, handle: MediaHandle ) -> BackendState {
            self.0.borrow().states.get( &handle.0 ).copied().unwrap_or( BackendState::Idle )
        }
    }


    struct FakeSurface( Shared );


    impl PresentationSurface for FakeSurface {
        fn surface_id( &self ) -> SurfaceId {
            SurfaceId( "surface-0".into() )
        }

        fn pump( &mut self ) {}

        fn is_alive( &mut self ) -> bool {
            !self.0.borrow().surface_gone
        }

        fn apply_geometry( &mut self, geometry: &WindowGeometry ) -> Result<SurfaceId, SurfaceError> {
            self.0.borrow_mut().events.push( Event::Geometry( *geometry ) );
            Ok( SurfaceId( format!( "surface-{}", geometry.monitor_index ) ) )
        }

        fn close( &mut self ) -> Result<(), SurfaceError> {
            let mut world = self.0.borrow_mut();
            world.events.push( Event::SurfaceClosed );
            if world.fail_close {
                return Err( SurfaceError::Control( "window refused to close".into() ) );
            }
            Ok(())
        }
    }


    struct FakeCommands( Shared );


    impl CommandSource for FakeCommands {
        fn poll( &mut self ) -> Option<Command> {
            self.0.borrow_mut().queue.pop_front()
        }
    }


    impl Drop for FakeCommands {
        fn drop( &mut self ) {
            self.0.borrow_mut().events.push( Event::CommandsClosed );
        }
    }


    type TestCoordinator = Coordinator<FakeBackend, FakeSurface, FakeCommands>;


    struct Fixture {
        dir: TempDir,
        config: PathBuf,
        world: Shared,
        coordinator: TestCoordinator,
    }


    impl Fixture {
        /// Builds a coordinator over `order`, creating only the files in `present`.
        fn new( order: &[&str], present: &[&str], exit_on_stop: bool ) -> Self {
            let dir = tempfile::tempdir().unwrap();
            for name in present {
                fs::write( dir.path().join( name ), b"" ).unwrap();
            }

            let config = dir.path().join( "settings.json" );
            write_settings( &config, order, 800, 0 );

            let mut settings = Settings::load( &config ).unwrap();
            settings.playback_settings.poll_interval_ms = 0;
            settings.playback_settings.exit_on_stop = exit_on_stop;

            let world: Shared = Rc::default();
            let playlist = Playlist::from_settings( &settings, &config );
            let coordinator = Coordinator::new(
                &settings,
                config.clone(),
                playlist,
                FakeBackend( Rc::clone( &world ) ),
                FakeSurface( Rc::clone( &world ) ),
                FakeCommands( Rc::clone( &world ) ),
            ).unwrap();

            Self { dir, config, world, coordinator }
        }


        fn with_overrides<F>( self, overrides: F ) -> Self
        where
            F: Fn( &mut Settings ) + 'static,
        {
            Self { coordinator: self.coordinator.with_overrides( overrides ), ..self }
        }


        fn touch( &self, name: &str ) {
            fs::write( self.dir.path().join( name ), b"" ).unwrap();
        }


        fn send( &self, cmd: Command ) {
            self.world.borrow_mut().queue.push_back( cmd );
        }


        fn events( &self ) -> Vec<Event> {
            self.world.borrow().events.clone()
        }


        fn opened( &self ) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map( |e| match e {
                    Event::Open( name ) => Some( name ),
                    _ => None,
                })
                .collect()
        }


        fn last_handle( &self ) -> u64 {
            self.world.borrow().next_handle
        }


        fn set_state( &self, handle: u64, state: BackendState ) {
            self.world.borrow_mut().states.insert( handle, state );
        }


        fn reject( &self, name: &str ) {
            self.world.borrow_mut().reject.insert( name.to_string() );
        }
    }


    fn write_settings( path: &Path, order: &[&str], width: u32, monitor: usize ) {
        let json = serde_json::json!({
            "video_settings": { "width": width, "height": 600, "monitor": monitor },
            "file_order": order,
        });
        fs::write( path, json.to_string() ).unwrap();
    }


    #[test]
    fn test_attaches_to_surface_on_construction() {
        let fx = Fixture::new( &[ "a.mp4" ], &[ "a.mp4" ], true );
        assert_eq!( fx.events(), vec![ Event::Attach( "surface-0".into() ) ] );
        assert_eq!( fx.coordinator.state(), CoordinatorState::Idle );
    }


    #[test]
    fn test_start_plays_first_entry() {
        let mut fx = Fixture::new( &[ "a.mp4", "b.mp4" ], &[ "a.mp4", "b.mp4" ], true );
        fx.coordinator.start( Instant::now() );

        assert_eq!( fx.coordinator.state(), CoordinatorState::Playing );
        assert_eq!( fx.coordinator.cursor(), Some( 0 ) );
        assert_eq!( fx.opened(), vec![ "a.mp4" ] );
        assert!( fx.events().contains( &Event::Play( 1 ) ) );
    }


    #[test]
    fn test_natural_end_advances() {
        let mut fx = Fixture::new( &[ "a.mp4", "b.mp4", "c.mp4" ], &[ "a.mp4", "b.mp4", "c.mp4" ], true );
        let now = Instant::now();
        fx.coordinator.start( now );

        fx.set_state( fx.last_handle(), BackendState::Ended );
        assert_eq!( fx.coordinator.tick( now ), TickOutcome::Continue );

        assert_eq!( fx.coordinator.cursor(), Some( 1 ) );
        assert_eq!( fx.opened(), vec![ "a.mp4", "b.mp4" ] );
        assert_eq!( fx.coordinator.state(), CoordinatorState::Playing );
    }


    #[test]
    fn test_natural_end_wraps_to_first_entry() {
        let mut fx = Fixture::new( &[ "a.mp4", "b.mp4" ], &[ "a.mp4", "b.mp4" ], true );
        let now = Instant::now();
        fx.coordinator.start( now );

        for _ in 0..2 {
            fx.set_state( fx.last_handle(), BackendState::Ended );
            fx.coordinator.tick( now );
        }

        assert_eq!( fx.coordinator.cursor(), Some( 0 ) );
        assert_eq!( fx.opened(), vec![ "a.mp4", "b.mp4", "a.mp4" ] );
    }


    #[test]
    fn test_missing_file_is_skipped() {
        let mut fx = Fixture::new( &[ "a.mp4", "b.mp4" ], &[ "b.mp4" ], true );

        assert_eq!( fx.coordinator.try_start_at( 0, Instant::now() ), Ok( 1 ) );
        assert_eq!( fx.coordinator.cursor(), Some( 1 ) );
        assert_eq!( fx.opened(), vec![ "b.mp4" ] );
    }


    #[test]
    fn test_rejected_file_is_skipped() {
        let mut fx = Fixture::new( &[ "a.mp4", "b.mp4", "c.mp4" ], &[ "a.mp4", "b.mp4", "c.mp4" ], true );
        fx.reject( "b.mp4" );
        fx.coordinator.start( Instant::now() );

        fx.set_state( fx.last_handle(), BackendState::Ended );
        fx.coordinator.tick( Instant::now() );

        assert_eq!( fx.coordinator.cursor(), Some( 2 ) );
        assert_eq!( fx.opened(), vec![ "a.mp4", "b.mp4", "c.mp4" ] );
    }


    #[test]
    fn test_all_entries_unplayable_terminates() {
        let mut fx = Fixture::new( &[ "a.mp4", "b.mp4", "c.mp4" ], &[ "c.mp4" ], true );
        fx.reject( "c.mp4" );

        let result = fx.coordinator.try_start_at( 1, Instant::now() );
        assert_eq!( result, Err( NoPlayableEntry { attempts: 3 } ) );
        assert_eq!( fx.coordinator.state(), CoordinatorState::Idle );
        assert_eq!( fx.coordinator.cursor(), Some( 1 ) );
        assert_eq!( fx.opened(), vec![ "c.mp4" ] );
        assert!( fx.coordinator.backoff_delay().is_some() );
    }


    #[test]
    fn test_backend_error_skips_to_next() {
        let mut fx = Fixture::new( &[ "a.mp4", "b.mp4" ], &[ "a.mp4", "b.mp4" ], true );
        fx.coordinator.start( Instant::now() );

        fx.set_state( fx.last_handle(), BackendState::Error );
        fx.coordinator.tick( Instant::now() );

        assert_eq!( fx.coordinator.cursor(), Some( 1 ) );
        assert!( fx.events().contains( &Event::Stop( 1 ) ) );
    }


    #[test]
    fn test_empty_playlist_backs_off_without_panicking() {
        let mut fx = Fixture::new( &[], &[], true );
        let t0 = Instant::now();
        fx.coordinator.start( t0 );
        assert_eq!( fx.coordinator.state(), CoordinatorState::Idle );
        assert_eq!( fx.coordinator.cursor(), None );

        for step in 0..20 {
            fx.set_state( 1, BackendState::Ended );
            let outcome = fx.coordinator.tick( t0 + Duration::from_millis( 500 * step ) );
            assert_eq!( outcome, TickOutcome::Continue );
        }

        fx.send( Command::Next );
        fx.send( Command::Play );
        fx.send( Command::Pause );
        for _ in 0..3 {
            fx.coordinator.tick( t0 );
        }

        assert!( fx.opened().is_empty() );
        assert!( fx.coordinator.backoff_delay().is_some() );
    }


    #[test]
    fn test_backoff_doubles_then_recovers() {
        let mut fx = Fixture::new( &[ "a.mp4" ], &[], true );
        let t0 = Instant::now();
        fx.coordinator.start( t0 );
        assert_eq!( fx.coordinator.backoff_delay(), Some( Duration::from_secs( 1 ) ) );

        // Not yet due
        fx.coordinator.tick( t0 + Duration::from_millis( 500 ) );
        assert_eq!( fx.coordinator.backoff_delay(), Some( Duration::from_secs( 1 ) ) );

        let t1 = t0 + Duration::from_secs( 1 );
        fx.coordinator.tick( t1 );
        assert_eq!( fx.coordinator.backoff_delay(), Some( Duration::from_secs( 2 ) ) );

        let mut t = t1;
        for _ in 0..5 {
            t += Duration::from_secs( 8 );
            fx.coordinator.tick( t );
        }
        assert_eq!( fx.coordinator.backoff_delay(), Some( Duration::from_secs( 8 ) ) );

        fx.touch( "a.mp4" );
        fx.coordinator.tick( t + Duration::from_secs( 8 ) );
        assert_eq!( fx.coordinator.state(), CoordinatorState::Playing );
        assert_eq!( fx.coordinator.backoff_delay(), None );
        assert_eq!( fx.coordinator.next_delay(), fx.coordinator.timing.tick_interval() );
    }


    #[test]
    fn test_next_wraps_back_to_start() {
        let names = [ "a.mp4", "b.mp4", "c.mp4" ];
        let mut fx = Fixture::new( &names, &names, true );
        fx.coordinator.start( Instant::now() );

        for _ in 0..names.len() {
            fx.send( Command::Next );
            fx.coordinator.tick( Instant::now() );
        }

        assert_eq!( fx.coordinator.cursor(), Some( 0 ) );
        assert_eq!( fx.opened(), vec![ "a.mp4", "b.mp4", "c.mp4", "a.mp4" ] );
    }


    #[test]
    fn test_next_stops_current_first() {
        let mut fx = Fixture::new( &[ "a.mp4", "b.mp4" ], &[ "a.mp4", "b.mp4" ], true );
        fx.coordinator.start( Instant::now() );
        fx.send( Command::Next );
        fx.coordinator.tick( Instant::now() );

        let events = fx.events();
        let stop = events.iter().position( |e| *e == Event::Stop( 1 ) ).unwrap();
        let open = events.iter().position( |e| *e == Event::Open( "b.mp4".into() ) ).unwrap();
        assert!( stop < open );
    }


    #[test]
    fn test_pause_and_resume() {
        let mut fx = Fixture::new( &[ "a.mp4" ], &[ "a.mp4" ], true );
        fx.coordinator.start( Instant::now() );

        fx.send( Command::Pause );
        fx.coordinator.tick( Instant::now() );
        assert_eq!( fx.coordinator.state(), CoordinatorState::Paused );

        // Pausing again is harmless
        fx.send( Command::Pause );
        fx.coordinator.tick( Instant::now() );
        assert_eq!( fx.coordinator.state(), CoordinatorState::Paused );

        fx.send( Command::Play );
        fx.coordinator.tick( Instant::now() );
        assert_eq!( fx.coordinator.state(), CoordinatorState::Playing );

        assert_eq!( fx.opened(), vec![ "a.mp4" ] );
        assert_eq!( fx.events().iter().filter( |e| **e == Event::Pause( 1 ) ).count(), 2 );
        assert_eq!( fx.events().iter().filter( |e| **e == Event::Play( 1 ) ).count(), 2 );
    }


    #[test]
    fn test_play_while_playing_is_noop() {
        let mut fx = Fixture::new( &[ "a.mp4" ], &[ "a.mp4" ], true );
        fx.coordinator.start( Instant::now() );
        let before = fx.events().len();

        fx.send( Command::Play );
        fx.coordinator.tick( Instant::now() );
        assert_eq!( fx.events().len(), before );
    }


    #[test]
    fn test_same_file_is_rewound_not_reopened() {
        let mut fx = Fixture::new( &[ "a.mp4" ], &[ "a.mp4" ], true );
        fx.coordinator.start( Instant::now() );

        fx.set_state( 1, BackendState::Ended );
        fx.coordinator.tick( Instant::now() );

        assert_eq!( fx.opened(), vec![ "a.mp4" ] );
        assert!( fx.events().ends_with( &[ Event::Rewind( 1 ), Event::Play( 1 ) ] ) );
        assert_eq!( fx.coordinator.cursor(), Some( 0 ) );
    }


    #[test]
    fn test_stop_exits_and_tears_down_in_order() {
        let mut fx = Fixture::new( &[ "a.mp4" ], &[ "a.mp4" ], true );
        fx.coordinator.start( Instant::now() );

        fx.send( Command::Stop );
        assert_eq!( fx.coordinator.tick( Instant::now() ), TickOutcome::Exit( LoopExit::StopRequested ) );
        assert_eq!( fx.coordinator.state(), CoordinatorState::Terminated );

        let world = Rc::clone( &fx.world );
        fx.coordinator.shutdown().unwrap();

        let events = world.borrow().events.clone();
        assert!( events.contains( &Event::Stop( 1 ) ) );
        assert!( events.ends_with( &[ Event::CommandsClosed, Event::SurfaceClosed ] ) );
    }


    #[test]
    fn test_stop_beats_end_of_media_in_same_tick() {
        let mut fx = Fixture::new( &[ "a.mp4", "b.mp4" ], &[ "a.mp4", "b.mp4" ], false );
        fx.coordinator.start( Instant::now() );

        fx.set_state( 1, BackendState::Ended );
        fx.send( Command::Stop );
        assert_eq!( fx.coordinator.tick( Instant::now() ), TickOutcome::Continue );

        assert_eq!( fx.coordinator.state(), CoordinatorState::Stopped );
        assert_eq!( fx.coordinator.cursor(), Some( 0 ) );
        assert_eq!( fx.opened(), vec![ "a.mp4" ] );

        // Further ticks stay put until told to play
        fx.coordinator.tick( Instant::now() );
        assert_eq!( fx.opened(), vec![ "a.mp4" ] );

        fx.send( Command::Play );
        fx.coordinator.tick( Instant::now() );
        assert_eq!( fx.coordinator.state(), CoordinatorState::Playing );
        assert_eq!( fx.opened(), vec![ "a.mp4", "a.mp4" ] );
    }


    #[test]
    fn test_reload_while_playing() {
        let mut fx = Fixture::new( &[ "a.mp4", "b.mp4" ], &[ "a.mp4", "b.mp4", "c.mp4" ], true );
        fx.coordinator.start( Instant::now() );
        fx.send( Command::Next );
        fx.coordinator.tick( Instant::now() );
        assert_eq!( fx.coordinator.cursor(), Some( 1 ) );

        write_settings( &fx.config, &[ "c.mp4", "a.mp4" ], 1024, 1 );
        fx.send( Command::ReloadPlaylist );
        fx.coordinator.tick( Instant::now() );

        assert_eq!( fx.coordinator.cursor(), Some( 0 ) );
        assert_eq!( fx.coordinator.playlist().len(), 2 );
        assert_eq!( fx.coordinator.state(), CoordinatorState::Playing );
        assert_eq!( fx.opened().last().map( String::as_str ), Some( "c.mp4" ) );
        assert_eq!( fx.coordinator.geometry().width, 1024 );

        let events = fx.events();
        assert!( events.contains( &Event::Stop( 2 ) ) );
        assert!( events.contains( &Event::Attach( "surface-1".into() ) ) );
    }


    #[test]
    fn test_failed_reload_keeps_playlist() {
        let mut fx = Fixture::new( &[ "a.mp4", "b.mp4" ], &[ "a.mp4", "b.mp4" ], true );
        fx.coordinator.start( Instant::now() );
        fx.send( Command::Next );
        fx.coordinator.tick( Instant::now() );

        fs::write( &fx.config, "{ broken" ).unwrap();
        fx.send( Command::ReloadPlaylist );
        fx.coordinator.tick( Instant::now() );

        assert_eq!( fx.coordinator.playlist().len(), 2 );
        assert_eq!( fx.coordinator.cursor(), Some( 0 ) );
        assert_eq!( fx.opened().last().map( String::as_str ), Some( "a.mp4" ) );
    }


    #[test]
    fn test_reload_to_empty_playlist() {
        let mut fx = Fixture::new( &[ "a.mp4" ], &[ "a.mp4" ], true );
        fx.coordinator.start( Instant::now() );

        write_settings( &fx.config, &[ "notes.txt" ], 800, 0 );
        fx.send( Command::ReloadPlaylist );
        fx.coordinator.tick( Instant::now() );

        assert!( fx.coordinator.playlist().is_empty() );
        assert_eq!( fx.coordinator.state(), CoordinatorState::Idle );
        assert!( fx.coordinator.backoff_delay().is_some() );
    }


    #[test]
    fn test_commands_are_rate_limited() {
        let mut fx = Fixture::new( &[ "a.mp4", "b.mp4", "c.mp4" ], &[ "a.mp4", "b.mp4", "c.mp4" ], true );
        fx.coordinator.timing.poll_interval_ms = 100;
        let t0 = Instant::now();
        fx.coordinator.start( t0 );

        fx.send( Command::Next );
        fx.send( Command::Next );

        fx.coordinator.tick( t0 );
        assert_eq!( fx.coordinator.cursor(), Some( 1 ) );

        fx.coordinator.tick( t0 + Duration::from_millis( 30 ) );
        assert_eq!( fx.coordinator.cursor(), Some( 1 ) );

        fx.coordinator.tick( t0 + Duration::from_millis( 100 ) );
        assert_eq!( fx.coordinator.cursor(), Some( 2 ) );
    }


    #[test]
    fn test_surface_closed_ends_loop() {
        let mut fx = Fixture::new( &[ "a.mp4" ], &[ "a.mp4" ], true );
        fx.coordinator.start( Instant::now() );

        fx.world.borrow_mut().surface_gone = true;
        assert_eq!( fx.coordinator.tick( Instant::now() ), TickOutcome::Exit( LoopExit::SurfaceClosed ) );
        assert_eq!( fx.coordinator.state(), CoordinatorState::Terminated );
    }


    #[test]
    fn test_exit_reason_is_sticky() {
        let mut fx = Fixture::new( &[ "a.mp4" ], &[ "a.mp4" ], true );
        fx.coordinator.start( Instant::now() );

        fx.world.borrow_mut().surface_gone = true;
        assert_eq!( fx.coordinator.tick( Instant::now() ), TickOutcome::Exit( LoopExit::SurfaceClosed ) );
        assert_eq!( fx.coordinator.tick( Instant::now() ), TickOutcome::Exit( LoopExit::SurfaceClosed ) );

        let mut fx = Fixture::new( &[ "a.mp4" ], &[ "a.mp4" ], true );
        fx.coordinator.start( Instant::now() );
        fx.send( Command::Stop );
        fx.coordinator.tick( Instant::now() );
        assert_eq!( fx.coordinator.tick( Instant::now() ), TickOutcome::Exit( LoopExit::StopRequested ) );
    }


    #[test]
    fn test_reload_keeps_monitor_override() {
        let fx = Fixture::new( &[ "a.mp4" ], &[ "a.mp4" ], true );
        let mut fx = fx.with_overrides( |settings| settings.video_settings.monitor = 2 );
        fx.coordinator.start( Instant::now() );

        write_settings( &fx.config, &[ "a.mp4" ], 1024, 0 );
        fx.send( Command::ReloadPlaylist );
        fx.coordinator.tick( Instant::now() );

        assert_eq!( fx.coordinator.geometry().monitor_index, 2 );
        assert_eq!( fx.coordinator.geometry().width, 1024 );
        assert!( fx.events().contains( &Event::Attach( "surface-2".into() ) ) );
    }


    #[test]
    fn test_shutdown_closes_window_after_stop_failure() {
        let mut fx = Fixture::new( &[ "a.mp4" ], &[ "a.mp4" ], true );
        fx.coordinator.start( Instant::now() );
        fx.world.borrow_mut().fail_stop = true;

        let world = Rc::clone( &fx.world );
        let result = fx.coordinator.shutdown();

        assert!( matches!( result, Err( TeardownError::Backend( _ ) ) ) );
        let events = world.borrow().events.clone();
        assert!( events.ends_with( &[ Event::CommandsClosed, Event::Stop( 1 ), Event::SurfaceClosed ] ) );
    }


    #[test]
    fn test_shutdown_reports_close_failure() {
        let mut fx = Fixture::new( &[ "a.mp4" ], &[ "a.mp4" ], true );
        fx.coordinator.start( Instant::now() );
        fx.world.borrow_mut().fail_close = true;

        let world = Rc::clone( &fx.world );
        let result = fx.coordinator.shutdown();

        assert!( matches!( result, Err( TeardownError::Surface( _ ) ) ) );
        assert!( world.borrow().events.contains( &Event::Stop( 1 ) ) );
    }


    #[test]
    fn test_shutdown_reports_first_failure() {
        let mut fx = Fixture::new( &[ "a.mp4" ], &[ "a.mp4" ], true );
        fx.coordinator.start( Instant::now() );
        {
            let mut world = fx.world.borrow_mut();
            world.fail_stop = true;
            world.fail_close = true;
        }

        let world = Rc::clone( &fx.world );
        let result = fx.coordinator.shutdown();

        assert!( matches!( result, Err( TeardownError::Backend( _ ) ) ) );
        assert_eq!( world.borrow().events.last(), Some( &Event::SurfaceClosed ) );
    }
}
