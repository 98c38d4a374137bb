//! Playlist and cursor management
//!
//! Holds the ordered media entries taken from the settings file together
//! with the playback cursor. A playlist is never edited in place: reloads
//! build a fresh one and swap it in, which also resets the cursor.

use std::path::{ Path, PathBuf };

use crate::config::{ ConfigError, Settings };


/// Supported video file extensions.
pub const VIDEO_EXTENSIONS: &[&str] = &[ "mp4", "avi", "mov", "mkv", "wmv" ];


/// Kind of media an entry holds.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum MediaKind {
    Video,
}


/// A single playable entry.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct MediaEntry {
    path: PathBuf,
    kind: MediaKind,
}


impl MediaEntry {
    /// Creates an entry if the path has a supported video extension.
    pub fn video( path: PathBuf ) -> Option<Self> {
        is_video_file( &path ).then_some( Self { path, kind: MediaKind::Video } )
    }


    pub fn path( &self ) -> &Path {
        &self.path
    }


    pub fn kind( &self ) -> MediaKind {
        self.kind
    }
}


/// Checks if a file has a supported video extension (case-insensitive).
pub fn is_video_file( path: &Path ) -> bool {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| VIDEO_EXTENSIONS.contains( &e.to_lowercase().as_str() ) )
        .unwrap_or( false )
}


/// Normalizes a configured path string.
///
/// Trims whitespace, expands a leading `~` and resolves relative paths
/// against `base`. Returns `None` for blank entries.
pub fn normalize_path( raw: &str, base: Option<&Path> ) -> Option<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let expanded = match raw.strip_prefix( "~" ) {
        Some( rest ) if rest.is_empty() || rest.starts_with( [ '/', '\\' ] ) => {
            match dirs::home_dir() {
                Some( home ) => home.join( rest.trim_start_matches( [ '/', '\\' ] ) ),
                None => PathBuf::from( raw ),
            }
        }
        _ => PathBuf::from( raw ),
    };

    match base {
        Some( base ) if expanded.is_relative() => Some( base.join( expanded ) ),
        _ => Some( expanded ),
    }
}


/// Ordered media entries plus the playback cursor.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct Playlist {
    entries: Vec<MediaEntry>,
    cursor: usize,
}


impl Playlist {
    /// Creates a new empty playlist.
    pub fn new() -> Self {
        Self::default()
    }


    /// Builds a playlist from configured path strings.
    ///
    /// Order is preserved; entries without a video extension are dropped.
    pub fn from_paths<S: AsRef<str>>( paths: &[S], base: Option<&Path> ) -> Self {
        let mut entries = Vec::with_capacity( paths.len() );

        for raw in paths {
            let Some( path ) = normalize_path( raw.as_ref(), base ) else {
                continue;
            };
            match MediaEntry::video( path ) {
                Some( entry ) => entries.push( entry ),
                None => tracing::debug!( "Skipping non-video entry: {:?}", raw.as_ref() ),
            }
        }

        Self { entries, cursor: 0 }
    }


    /// Builds a playlist from the `file_order` of already parsed settings.
    ///
    /// @param settings - Parsed settings
    /// @param source - Settings file the paths are relative to
    pub fn from_settings( settings: &Settings, source: &Path ) -> Self {
        Self::from_paths( settings.file_order.as_slice(), source.parent() )
    }


    /// Loads a playlist from a settings file.
    ///
    /// @returns The playlist together with the settings it was built from
    pub fn load( path: &Path ) -> Result<( Self, Settings ), ConfigError> {
        let settings = Settings::load( path )?;
        let playlist = Self::from_settings( &settings, path );
        tracing::info!( "Loaded {} entries from {:?}", playlist.len(), path );
        Ok(( playlist, settings ))
    }


    /// Re-reads the settings file and replaces this playlist wholesale.
    ///
    /// On failure the current entries are kept. The cursor is reset to 0
    /// either way.
    ///
    /// @returns The freshly parsed settings
    pub fn reload( &mut self, path: &Path ) -> Result<Settings, ConfigError> {
        self.cursor = 0;
        let ( fresh, settings ) = Self::load( path )?;
        self.replace( fresh );
        Ok( settings )
    }


    /// Swaps in a new playlist, resetting the cursor.
    pub fn replace( &mut self, fresh: Playlist ) {
        *self = Self { entries: fresh.entries, cursor: 0 };
    }


    pub fn len( &self ) -> usize {
        self.entries.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.entries.is_empty()
    }


    pub fn entries( &self ) -> &[MediaEntry] {
        &self.entries
    }


    /// Gets the cursor, or `None` when the playlist is empty.
    pub fn cursor( &self ) -> Option<usize> {
        ( !self.entries.is_empty() ).then_some( self.cursor )
    }


    /// Moves the cursor to `index`, wrapping around the playlist length.
    pub fn set_cursor( &mut self, index: usize ) {
        if !self.entries.is_empty() {
            self.cursor = index % self.entries.len();
        }
    }


    /// Gets the entry under the cursor.
    pub fn current( &self ) -> Option<&MediaEntry> {
        self.entries.get( self.cursor )
    }


    /// Advances the cursor by one, wrapping to the start.
    ///
    /// Returns the new current entry, or `None` if the playlist is empty.
    pub fn advance( &mut self ) -> Option<&MediaEntry> {
        if self.entries.is_empty() {
            return None;
        }
        self.cursor = ( self.cursor + 1 ) % self.entries.len();
        self.current()
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::fs;


    fn names( playlist: &Playlist ) -> Vec<String> {
        playlist.entries()
            .iter()
            .map( |e| e.path().to_string_lossy().into_owned() )
            .collect()
    }


    #[test]
    fn test_filter_keeps_order() {
        let playlist = Playlist::from_paths(
            &[ "intro.mp4", "notes.txt", "b.MKV", "poster.png", "c.avi", "d.mov", "e.wmv" ],
            None,
        );
        assert_eq!( names( &playlist ), vec![ "intro.mp4", "b.MKV", "c.avi", "d.mov", "e.wmv" ] );
    }


    #[test]
    fn test_extension_match_is_case_insensitive() {
        let playlist = Playlist::from_paths( &[ "A.MP4", "a.mp4", "Clip.Mov" ], None );
        assert_eq!( playlist.len(), 3 );
        assert!( playlist.entries().iter().all( |e| e.kind() == MediaKind::Video ) );
    }


    #[test]
    fn test_rejects_missing_extension() {
        let playlist = Playlist::from_paths( &[ "mp4", "video.", ".mp4x", "  " ], None );
        assert!( playlist.is_empty() );
        assert_eq!( playlist.cursor(), None );
        assert_eq!( playlist.current(), None );
    }


    #[test]
    fn test_relative_paths_resolve_against_base() {
        let base = Path::new( "/srv/kiosk" );
        let playlist = Playlist::from_paths( &[ " clips/a.mp4 ", "/abs/b.mp4" ], Some( base ) );
        assert_eq!( playlist.entries()[ 0 ].path(), Path::new( "/srv/kiosk/clips/a.mp4" ) );
        assert_eq!( playlist.entries()[ 1 ].path(), Path::new( "/abs/b.mp4" ) );
    }


    #[test]
    fn test_advance_wraps() {
        let mut playlist = Playlist::from_paths( &[ "a.mp4", "b.mp4", "c.mp4" ], None );
        assert_eq!( playlist.cursor(), Some( 0 ) );

        playlist.advance();
        assert_eq!( playlist.cursor(), Some( 1 ) );
        playlist.advance();
        playlist.advance();
        assert_eq!( playlist.cursor(), Some( 0 ) );
    }


    #[test]
    fn test_advance_n_times_returns_to_start() {
        let mut playlist = Playlist::from_paths( &[ "a.mp4", "b.mp4", "c.mp4", "d.mp4" ], None );
        playlist.set_cursor( 2 );
        for _ in 0..playlist.len() {
            playlist.advance();
        }
        assert_eq!( playlist.cursor(), Some( 2 ) );
    }


    #[test]
    fn test_empty_playlist_advance() {
        let mut playlist = Playlist::new();
        assert!( playlist.advance().is_none() );
        assert!( playlist.current().is_none() );
        playlist.set_cursor( 5 );
        assert_eq!( playlist.cursor(), None );
    }


    #[test]
    fn test_load_from_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "file_order": [ "a.mp4", "b.jpg", "C.MOV" ] }"# ).unwrap();

        let ( playlist, settings ) = Playlist::load( &path ).unwrap();
        assert_eq!( settings.file_order.len(), 3 );
        assert_eq!( playlist.len(), 2 );
        assert_eq!( playlist.entries()[ 0 ].path(), dir.path().join( "a.mp4" ) );
        assert_eq!( playlist.entries()[ 1 ].path(), dir.path().join( "C.MOV" ) );
    }


    #[test]
    fn test_reload_replaces_and_resets_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "file_order": [ "a.mp4", "b.mp4", "c.mp4" ] }"# ).unwrap();

        let ( mut playlist, _ ) = Playlist::load( &path ).unwrap();
        playlist.set_cursor( 2 );

        fs::write( &path, r#"{ "video_settings": { "monitor": 1 }, "file_order": [ "x.mkv", "y.mkv" ] }"# ).unwrap();
        let settings = playlist.reload( &path ).unwrap();
        assert_eq!( settings.video_settings.monitor, 1 );

        assert_eq!( playlist.cursor(), Some( 0 ) );
        assert_eq!( playlist.len(), 2 );
        assert_eq!( playlist.current().unwrap().path(), dir.path().join( "x.mkv" ) );
    }


    #[test]
    fn test_failed_reload_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "file_order": [ "a.mp4", "b.mp4" ] }"# ).unwrap();

        let ( mut playlist, _ ) = Playlist::load( &path ).unwrap();
        playlist.set_cursor( 1 );

        fs::write( &path, "not json" ).unwrap();
        assert!( playlist.reload( &path ).is_err() );
        assert_eq!( playlist.len(), 2 );
        assert_eq!( playlist.cursor(), Some( 0 ) );
    }
}
