//! Playback backend interface
//!
//! The media engine is an external collaborator. The coordinator only
//! needs to open a file, start, pause, stop and rewind it, and ask how
//! playback is going. Every call is expected to return promptly.

use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::window::SurfaceId;


/// Errors reported by a playback backend.
#[derive( Debug, Error )]
pub enum BackendError {
    #[error( "Backend rejected {path}: {reason}" )]
    Rejected { path: String, reason: String },

    #[error( "Backend command '{command}' failed: {reason}" )]
    Command { command: &'static str, reason: String },

    #[error( "Stale media handle {0}" )]
    StaleHandle( MediaHandle ),

    #[error( "Backend unavailable: {0}" )]
    Unavailable( String ),
}


/// State of the media currently loaded in the backend.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum BackendState {
    Idle,
    Playing,
    Paused,
    Ended,
    Error,
}


/// Opaque reference to an opened media item.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub struct MediaHandle( pub u64 );


impl fmt::Display for MediaHandle {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        write!( f, "#{}", self.0 )
    }
}


/// Media engine operations used by the coordinator.
pub trait PlaybackBackend {
    /// Points the backend at a (possibly new) presentation surface.
    fn attach( &mut self, surface: &SurfaceId ) -> Result<(), BackendError>;

    /// Loads a file without starting it.
    fn open( &mut self, path: &Path ) -> Result<MediaHandle, BackendError>;

    fn play( &mut self, handle: MediaHandle ) -> Result<(), BackendError>;

    fn pause( &mut self, handle: MediaHandle ) -> Result<(), BackendError>;

    /// Stops and unloads. The handle is invalid afterwards.
    fn stop( &mut self, handle: MediaHandle ) -> Result<(), BackendError>;

    /// Seeks back to the start of the loaded file.
    fn rewind( &mut self, handle: MediaHandle ) -> Result<(), BackendError>;

    /// Reports the state of `handle`; unknown or stale handles are `Idle`.
    fn state( &mut self, handle: MediaHandle ) -> BackendState;
}
