//! Presentation surface interface
//!
//! Window creation, cursor hiding and monitor placement live outside the
//! coordinator. It only receives the surface identifier, asks whether the
//! surface is still alive, and forwards geometry changes after a reload.

use std::fmt;

use thiserror::Error;


/// Errors reported by the presentation surface.
#[derive( Debug, Error )]
pub enum SurfaceError {
    #[error( "Failed to create surface: {0}" )]
    Init( String ),

    #[error( "Surface control failed: {0}" )]
    Control( String ),

    #[error( "Surface is closed" )]
    Closed,
}


/// Size and placement of the kiosk window.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub struct WindowGeometry {
    pub width: u32,
    pub height: u32,
    pub monitor_index: usize,
    pub origin_x: i32,
    pub origin_y: i32,
}


impl WindowGeometry {
    /// X11-style geometry string, e.g. `1920x1080+0+0`.
    pub fn to_geometry_string( &self ) -> String {
        format!( "{}x{}{:+}{:+}", self.width, self.height, self.origin_x, self.origin_y )
    }
}


impl fmt::Display for WindowGeometry {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        write!( f, "{} on monitor {}", self.to_geometry_string(), self.monitor_index )
    }
}


/// Opaque identifier of an embeddable surface.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct SurfaceId( pub String );


impl fmt::Display for SurfaceId {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( &self.0 )
    }
}


/// Window the video is rendered into.
pub trait PresentationSurface {
    fn surface_id( &self ) -> SurfaceId;

    /// Services pending window events. Must not block.
    fn pump( &mut self );

    /// Returns false once the window has been closed externally.
    fn is_alive( &mut self ) -> bool;

    /// Moves/resizes the window, returning the surface to render into.
    fn apply_geometry( &mut self, geometry: &WindowGeometry ) -> Result<SurfaceId, SurfaceError>;

    fn close( &mut self ) -> Result<(), SurfaceError>;
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_geometry_string() {
        let geometry = WindowGeometry {
            width: 1920,
            height: 1080,
            monitor_index: 1,
            origin_x: 0,
            origin_y: -20,
        };
        assert_eq!( geometry.to_geometry_string(), "1920x1080+0-20" );
        assert_eq!( geometry.to_string(), "1920x1080+0-20 on monitor 1" );
    }
}
