//! UDP control channel
//!
//! One-way and fire-and-forget: each datagram carries a single command
//! token and nothing is ever sent back. The socket is non-blocking so a
//! poll costs one `recv_from` attempt at most.

use std::io::ErrorKind;
use std::net::{ SocketAddr, UdpSocket };

use thiserror::Error;

use crate::command::{ Command, CommandError };


/// Receive buffer size; larger than any UDP payload, so nothing is truncated.
const MAX_DATAGRAM: usize = 64 * 1024;


/// Errors that can occur while setting up the control channel.
#[derive( Debug, Error )]
pub enum ChannelError {
    #[error( "Cannot bind control socket {addr}: {source}" )]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error( "Cannot configure control socket: {0}" )]
    Configure( #[source] std::io::Error ),
}


/// Anything the coordinator can pull commands from.
pub trait CommandSource {
    /// Returns the next pending command without blocking.
    fn poll( &mut self ) -> Option<Command>;
}


/// Non-blocking UDP command listener.
pub struct CommandChannel {
    socket: UdpSocket,
    log_unknown: bool,
    buf: Vec<u8>,
}


impl CommandChannel {
    /// Binds the listener and switches it to non-blocking mode.
    ///
    /// @param addr - Local address to listen on
    /// @param log_unknown - Report unrecognized payloads at info level
    pub fn bind( addr: SocketAddr, log_unknown: bool ) -> Result<Self, ChannelError> {
        let socket = UdpSocket::bind( addr )
            .map_err( |source| ChannelError::Bind { addr, source } )?;
        socket.set_nonblocking( true ).map_err( ChannelError::Configure )?;

        tracing::info!( "Listening for control commands on udp://{}", socket.local_addr().unwrap_or( addr ) );

        Ok( Self {
            socket,
            log_unknown,
            buf: vec![ 0; MAX_DATAGRAM ],
        })
    }


    /// Address the socket is actually bound to.
    pub fn local_addr( &self ) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }


    fn report_unknown( &self, from: SocketAddr, err: &CommandError ) {
        if self.log_unknown {
            tracing::info!( "Ignoring datagram from {}: {}", from, err );
        } else {
            tracing::debug!( "Ignoring datagram from {}: {}", from, err );
        }
    }
}


impl CommandSource for CommandChannel {
    fn poll( &mut self ) -> Option<Command> {
        match self.socket.recv_from( &mut self.buf ) {
            Ok(( len, from )) if len >= self.buf.len() => {
                self.report_unknown( from, &CommandError::TooLong( len ) );
                None
            }
            Ok(( len, from )) => match Command::decode( &self.buf[ ..len ] ) {
                Ok( cmd ) => {
                    tracing::info!( "Received command '{}' from {}", cmd, from );
                    Some( cmd )
                }
                Err( e ) => {
                    self.report_unknown( from, &e );
                    None
                }
            },
            Err( e ) if e.kind() == ErrorKind::WouldBlock => None,
            Err( e ) => {
                // Windows surfaces ICMP port-unreachable as ConnectionReset on UDP sockets
                tracing::debug!( "Control socket receive error: {}", e );
                None
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;


    fn loopback_channel() -> CommandChannel {
        CommandChannel::bind( "127.0.0.1:0".parse().unwrap(), false ).unwrap()
    }


    /// Polls until something arrives or the attempts run out.
    fn poll_for( channel: &mut CommandChannel, attempts: usize ) -> Option<Command> {
        for _ in 0..attempts {
            if let Some( cmd ) = channel.poll() {
                return Some( cmd );
            }
            thread::sleep( Duration::from_millis( 10 ) );
        }
        None
    }


    #[test]
    fn test_poll_without_traffic_returns_immediately() {
        let mut channel = loopback_channel();
        let started = std::time::Instant::now();
        assert_eq!( channel.poll(), None );
        assert!( started.elapsed() < Duration::from_millis( 50 ) );
    }


    #[test]
    fn test_receives_command() {
        let mut channel = loopback_channel();
        let sender = UdpSocket::bind( "127.0.0.1:0" ).unwrap();
        sender.send_to( b"next\n", channel.local_addr().unwrap() ).unwrap();

        assert_eq!( poll_for( &mut channel, 100 ), Some( Command::Next ) );
    }


    #[test]
    fn test_unknown_payload_is_dropped() {
        let mut channel = loopback_channel();
        let sender = UdpSocket::bind( "127.0.0.1:0" ).unwrap();
        let target = channel.local_addr().unwrap();

        sender.send_to( b"rewind", target ).unwrap();
        sender.send_to( &[ 0xc3, 0x28 ], target ).unwrap();
        sender.send_to( b"video_reload", target ).unwrap();

        // The two junk datagrams come back as None, the third decodes
        assert_eq!( poll_for( &mut channel, 100 ), Some( Command::ReloadPlaylist ) );
        assert_eq!( channel.poll(), None );
    }


    #[test]
    fn test_long_datagram_is_not_cut_down_to_a_command() {
        let mut channel = loopback_channel();
        let sender = UdpSocket::bind( "127.0.0.1:0" ).unwrap();
        let target = channel.local_addr().unwrap();

        let payload = format!( "play{}junk", " ".repeat( 600 ) );
        sender.send_to( payload.as_bytes(), target ).unwrap();
        sender.send_to( b"stop", target ).unwrap();

        assert_eq!( poll_for( &mut channel, 100 ), Some( Command::Stop ) );
    }


    #[test]
    fn test_long_datagram_alone_yields_nothing() {
        let mut channel = loopback_channel();
        let sender = UdpSocket::bind( "127.0.0.1:0" ).unwrap();

        let payload = format!( "pause{}", "x".repeat( 4000 ) );
        sender.send_to( payload.as_bytes(), channel.local_addr().unwrap() ).unwrap();

        assert_eq!( poll_for( &mut channel, 50 ), None );
    }


    #[test]
    fn test_one_command_per_poll() {
        let mut channel = loopback_channel();
        let sender = UdpSocket::bind( "127.0.0.1:0" ).unwrap();
        let target = channel.local_addr().unwrap();

        sender.send_to( b"pause", target ).unwrap();
        sender.send_to( b"play", target ).unwrap();

        assert_eq!( poll_for( &mut channel, 100 ), Some( Command::Pause ) );
        assert_eq!( poll_for( &mut channel, 100 ), Some( Command::Play ) );
    }


    #[test]
    fn test_bind_conflict_is_reported() {
        let channel = loopback_channel();
        let addr = channel.local_addr().unwrap();

        let result = CommandChannel::bind( addr, false );
        assert!( matches!( result, Err( ChannelError::Bind { .. } ) ) );
    }
}
