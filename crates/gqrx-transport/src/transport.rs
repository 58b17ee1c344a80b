//! Socket ownership: connect, write, close and inbound byte notifications

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::{ChannelError, ChannelResult};
use crate::state::ConnectionState;

const READ_CHUNK: usize = 4096;
const INBOUND_CAPACITY: usize = 64;

/// Raw notifications from the socket, with no interpretation of the bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Data(Bytes),
    /// The daemon closed its side of the connection
    Closed,
    /// Socket-level read error
    Failed(String),
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Owns the write half of the connection and the task reading the other half.
pub struct Transport {
    writer: Option<BoxedWriter>,
    reader: Option<JoinHandle<()>>,
    state: watch::Sender<ConnectionState>,
    peer: String,
}

impl Transport {
    /// Open a TCP connection to the daemon.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> ChannelResult<(Self, mpsc::Receiver<TransportEvent>)> {
        let addr = format!("{}:{}", host, port);
        debug!(addr = %addr, "Connecting to daemon");

        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ChannelError::Connection(format!(
                    "Failed to connect to {}: {}",
                    addr, e
                )));
            }
            Err(_) => {
                return Err(ChannelError::Connection(format!(
                    "Timed out connecting to {} after {:?}",
                    addr, connect_timeout
                )));
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!(addr = %addr, error = %e, "Failed to disable Nagle's algorithm");
        }
        info!(addr = %addr, "Connected to daemon");

        Ok(Self::from_stream(stream, addr))
    }

    /// Wrap an already connected byte stream.
    pub fn from_stream<S>(stream: S, peer: impl Into<String>) -> (Self, mpsc::Receiver<TransportEvent>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let peer = peer.into();
        let (read_half, write_half) = tokio::io::split(stream);
        let (events_tx, events_rx) = mpsc::channel(INBOUND_CAPACITY);
        let reader = tokio::spawn(read_loop(read_half, events_tx, peer.clone()));
        let (state, _) = watch::channel(ConnectionState::Connected);

        let transport = Self {
            writer: Some(Box::new(write_half)),
            reader: Some(reader),
            state,
            peer,
        };
        (transport, events_rx)
    }

    /// Write all bytes and flush. Fails unless the connection is `Connected`.
    pub async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let state = self.state();
        let writer = match self.writer.as_mut() {
            Some(writer) if state.is_connected() => writer,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    format!("connection is {}", state),
                ));
            }
        };
        writer.write_all(bytes).await?;
        writer.flush().await?;
        trace!(peer = %self.peer, bytes = bytes.len(), "Wrote to socket");
        Ok(())
    }

    /// Shut the socket down. Calling it again does nothing.
    pub async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(peer = %self.peer, error = %e, "Socket shutdown failed");
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(peer = %self.peer, from = %previous, to = %state, "Connection state changed");
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Publish state changes on `state` from now on, starting with the current one.
    pub(crate) fn publish_state(&mut self, state: watch::Sender<ConnectionState>) {
        state.send_replace(self.state());
        self.state = state;
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn read_loop<R>(mut reader: R, events: mpsc::Sender<TransportEvent>, peer: String)
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    loop {
        buf.reserve(READ_CHUNK);
        let event = match reader.read_buf(&mut buf).await {
            Ok(0) => {
                info!(peer = %peer, "Daemon closed the connection");
                TransportEvent::Closed
            }
            Ok(n) => {
                trace!(peer = %peer, bytes = n, "Read from socket");
                TransportEvent::Data(buf.split().freeze())
            }
            Err(e) => {
                error!(peer = %peer, error = %e, "Read error");
                TransportEvent::Failed(e.to_string())
            }
        };

        let terminal = !matches!(event, TransportEvent::Data(_));
        if events.send(event).await.is_err() || terminal {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_write_and_receive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            write_half.write_all(b"RPRT 0\n").await.unwrap();
            line
        });

        let (mut transport, mut inbound) =
            Transport::connect("127.0.0.1", port, Duration::from_secs(1)).await.unwrap();
        assert_eq!(transport.state(), ConnectionState::Connected);

        transport.write(b"F 145288000\n").await.unwrap();
        assert_eq!(server.await.unwrap(), "F 145288000\n");

        let mut received = Vec::new();
        while let Some(event) = inbound.recv().await {
            match event {
                TransportEvent::Data(bytes) => received.extend_from_slice(&bytes),
                TransportEvent::Closed => break,
                TransportEvent::Failed(e) => panic!("unexpected failure: {e}"),
            }
        }
        assert_eq!(received, b"RPRT 0\n");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Transport::connect("127.0.0.1", port, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ChannelError::Connection(_))));
    }

    #[tokio::test]
    async fn test_write_requires_connected() {
        let (client, _server) = tokio::io::duplex(64);
        let (mut transport, _inbound) = Transport::from_stream(client, "duplex");

        transport.set_state(ConnectionState::Closing);
        let err = transport.write(b"f\n").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _server) = tokio::io::duplex(64);
        let (mut transport, _inbound) = Transport::from_stream(client, "duplex");

        transport.close().await;
        transport.close().await;

        let err = transport.write(b"f\n").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_remote_close_is_reported() {
        let (client, server) = tokio::io::duplex(64);
        let (_transport, mut inbound) = Transport::from_stream(client, "duplex");

        drop(server);
        assert_eq!(inbound.recv().await, Some(TransportEvent::Closed));
    }
}
