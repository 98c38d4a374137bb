//! vidloop - kiosk looping video player

mod cli;

use std::process::ExitCode;
use std::time::Instant;

use anyhow::{ Context, Result };
use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use cli::Args;

use vidloop_core::{
    command, CommandChannel, Coordinator, LoopExit, MpvBackend, MpvWindow, Playlist, Settings,
};


/// Installs the global tracing subscriber.
fn init_logging( verbose: bool ) {
    let fallback = if verbose { "vidloop=debug,vidloop_core=debug" } else { "vidloop=info,vidloop_core=info" };

    tracing_subscriber::registry()
        .with( EnvFilter::try_from_default_env().unwrap_or_else( |_| EnvFilter::new( fallback ) ) )
        .with( tracing_subscriber::fmt::layer() )
        .init();
}


/// Resolves when the process is asked to terminate.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err( e ) = tokio::signal::ctrl_c().await {
            tracing::warn!( "Cannot listen for Ctrl+C: {}", e );
            std::future::pending::<()>().await;
        }
    };

    #[cfg( unix )]
    let term = async {
        use tokio::signal::unix::{ signal, SignalKind };
        match signal( SignalKind::terminate() ) {
            Ok( mut sig ) => { sig.recv().await; }
            Err( e ) => {
                tracing::warn!( "Cannot listen for SIGTERM: {}", e );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg( not( unix ) )]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = term => {},
    }
}


async fn run( args: Args ) -> Result<()> {
    let config_path = args.config_path();
    let ( playlist, mut settings ) = match Playlist::load( &config_path ) {
        Ok( loaded ) => loaded,
        Err( e ) => {
            tracing::warn!( "{}; using default settings", e );
            ( Playlist::new(), Settings::default() )
        }
    };
    args.apply( &mut settings );
    tracing::info!( "Settings {:?}: {} playable entries", config_path, playlist.len() );

    // Remote control is the kiosk's only operator interface, so a bind failure is fatal
    let commands = CommandChannel::bind(
        settings.control_addr(),
        settings.playback_settings.log_unknown_commands,
    ).context( "Failed to open control channel" )?;

    let window = MpvWindow::launch( &settings.player, &settings.geometry() )
        .context( "Failed to open player window" )?;
    let backend = MpvBackend::new( window.player(), settings.playback_settings.load_grace() );

    let mut coordinator = Coordinator::new( &settings, config_path, playlist, backend, window, commands )
        .context( "Failed to attach to player" )?
        .with_overrides( move |settings| args.apply( settings ) );

    coordinator.start( Instant::now() );

    let exit = tokio::select! {
        exit = coordinator.run() => Some( exit ),
        _ = shutdown_signal() => None,
    };

    match exit {
        Some( LoopExit::StopRequested ) => tracing::info!( "Stop requested, shutting down" ),
        Some( LoopExit::SurfaceClosed ) => tracing::info!( "Window closed, shutting down" ),
        None => tracing::info!( "Signal received, shutting down" ),
    }

    coordinator.shutdown().context( "Teardown failed" )?;
    Ok(())
}


fn main() -> ExitCode {
    let args = Args::parse();

    if args.commands {
        print!( "{}", command::help_text() );
        return ExitCode::SUCCESS;
    }

    init_logging( args.verbose );

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok( rt ) => rt,
        Err( e ) => {
            tracing::error!( "Failed to start runtime: {}", e );
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on( run( args ) ) {
        Ok(()) => ExitCode::SUCCESS,
        Err( e ) => {
            tracing::error!( "{:#}", e );
            ExitCode::FAILURE
        }
    }
}
