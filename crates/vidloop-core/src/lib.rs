//! vidloop core - kiosk playback engine
//!
//! This crate provides the playlist, the UDP control channel, the
//! playback coordinator and the mpv-backed window and media backend.

pub mod backend;
pub mod channel;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod mpv;
pub mod playlist;
pub mod window;

pub use backend::{ BackendError, BackendState, MediaHandle, PlaybackBackend };
pub use channel::{ ChannelError, CommandChannel, CommandSource };
pub use command::{ Command, CommandError };
pub use config::{ ConfigError, Settings };
pub use coordinator::{ Coordinator, CoordinatorState, LoopExit, TeardownError };
pub use mpv::{ MpvBackend, MpvWindow };
pub use playlist::{ MediaEntry, MediaKind, Playlist };
pub use window::{ PresentationSurface, SurfaceError, SurfaceId, WindowGeometry };
