//! Framed connection abstraction with configurable send/recv deadlines.
//!
//! Wraps either a plain TCP stream or a TLS-wrapped one behind the
//! same `send`/`recv` surface so the server and node message loops
//! don't need to know which transport they're on.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use nray_core::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::{client::TlsStream as ClientTlsStream, server::TlsStream as ServerTlsStream};
use tokio_util::codec::Framed;

use crate::codec;

/// Default per-call send/recv deadline (§4.G).
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

pub enum Connection {
    Plain(Framed<TcpStream, tokio_util::codec::LengthDelimitedCodec>),
    ServerTls(Framed<ServerTlsStream<TcpStream>, tokio_util::codec::LengthDelimitedCodec>),
    ClientTls(Framed<ClientTlsStream<TcpStream>, tokio_util::codec::LengthDelimitedCodec>),
}

impl Connection {
    pub fn plain(stream: TcpStream) -> Self {
        Connection::Plain(Framed::new(stream, codec::codec()))
    }

    pub fn server_tls(stream: ServerTlsStream<TcpStream>) -> Self {
        Connection::ServerTls(Framed::new(stream, codec::codec()))
    }

    pub fn client_tls(stream: ClientTlsStream<TcpStream>) -> Self {
        Connection::ClientTls(Framed::new(stream, codec::codec()))
    }

    async fn send_frame(&mut self, bytes: Bytes) -> Result<()> {
        let result = match self {
            Connection::Plain(f) => f.send(bytes).await,
            Connection::ServerTls(f) => f.send(bytes).await,
            Connection::ClientTls(f) => f.send(bytes).await,
        };
        result.map_err(Error::Io)
    }

    async fn recv_frame(&mut self) -> Result<Option<Bytes>> {
        let next = match self {
            Connection::Plain(f) => f.next().await,
            Connection::ServerTls(f) => f.next().await,
            Connection::ClientTls(f) => f.next().await,
        };
        match next {
            Some(Ok(bytes)) => Ok(Some(bytes.freeze())),
            Some(Err(e)) => Err(Error::Io(e)),
            None => Ok(None),
        }
    }

    /// Encode and send one message, failing with `Error::Timeout` if
    /// `deadline` elapses first.
    pub async fn send<T: Serialize + Sync>(&mut self, message: &T, deadline: Duration) -> Result<()> {
        let bytes = codec::encode(message)?;
        timeout(deadline, self.send_frame(bytes))
            .await
            .map_err(|_| Error::Timeout)?
    }

    /// Receive and decode one message. `Ok(None)` means the peer
    /// closed the connection cleanly.
    pub async fn recv<T: DeserializeOwned>(&mut self, deadline: Duration) -> Result<Option<T>> {
        let frame = timeout(deadline, self.recv_frame())
            .await
            .map_err(|_| Error::Timeout)??;
        match frame {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }
}
