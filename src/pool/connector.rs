//! Transport collaborator: how connections are dialed and torn down

use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

/// Dials and closes the connections held by a [`Pool`](super::Pool)
///
/// The pool resolves the target and applies the dial timeout; implementors
/// only deal with the transport.
pub trait Connector: Send + Sync + 'static {
    /// Connection handle produced by this connector
    type Connection: Send + 'static;

    /// Open a new connection to `target`
    fn connect(&self, target: &str) -> impl Future<Output = io::Result<Self::Connection>> + Send;

    /// Release the transport resources of `conn`
    fn close(&self, conn: Self::Connection) -> impl Future<Output = io::Result<()>> + Send;
}

/// Plain TCP connector with keep-alive enabled
#[derive(Debug, Clone)]
pub struct TcpConnector {
    /// Keep-alive idle time before probes are sent
    pub keepalive: Option<Duration>,

    /// Disable Nagle's algorithm
    pub nodelay: bool,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            keepalive: Some(Duration::from_secs(60)),
            nodelay: true,
        }
    }
}

impl Connector for TcpConnector {
    type Connection = TcpStream;

    async fn connect(&self, target: &str) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(target).await?;
        stream.set_nodelay(self.nodelay)?;

        let stream = match self.keepalive {
            Some(idle) => {
                // Configure TCP keep-alive
                let socket = socket2::Socket::from(stream.into_std()?);
                socket.set_tcp_keepalive(&socket2::TcpKeepalive::new().with_time(idle))?;
                TcpStream::from_std(socket.into())?
            }
            None => stream,
        };

        debug!(target = %target, "Dialed TCP connection");
        Ok(stream)
    }

    async fn close(&self, mut conn: TcpStream) -> io::Result<()> {
        match conn.shutdown().await {
            // Peer already went away
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}
