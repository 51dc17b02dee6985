//! Transport abstraction for the client session.
//!
//! The transport moves whole encoded frames. Socket lifecycle, framing on
//! the byte stream and TLS all live behind this trait.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use prim_im_core::AccountId;

use crate::error::Result;

/// Wire protocol used to reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectMode {
    #[default]
    Tcp,
    Udp,
    Quic,
}

/// Identity presented when connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account_id: AccountId,
    pub token: String,
}

/// Transport trait for exchanging frames with the server.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish (or re-establish) the connection.
    async fn connect(&self, address: &str, credentials: &Credentials, mode: ConnectMode)
        -> Result<()>;

    /// Send one encoded frame.
    async fn send(&self, frame: Bytes) -> Result<()>;

    /// Receive the next frame.
    ///
    /// Returns `None` once the connection is gone.
    async fn recv(&self) -> Result<Option<Bytes>>;
}

/// A simple in-memory transport for testing.
///
/// Uses channels to simulate a single client/server link. The
/// [`MemoryServer`](memory::MemoryServer) end can push frames, read what
/// the client sent, and cut the connection.
pub mod memory {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex, RwLock};

    use prim_im_core::Msg;

    use crate::error::ClientError;

    const LINK_CAPACITY: usize = 1000;

    /// Where the client connected to.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ConnectInfo {
        pub address: String,
        pub account_id: AccountId,
        pub mode: ConnectMode,
    }

    struct Link {
        to_client: RwLock<Option<mpsc::Sender<Bytes>>>,
        client_rx: Mutex<mpsc::Receiver<Bytes>>,
        from_client: mpsc::Sender<Bytes>,
        server_rx: Mutex<mpsc::Receiver<Bytes>>,
        connected: RwLock<Option<ConnectInfo>>,
    }

    /// Create a connected transport/server pair.
    pub fn pair() -> (MemoryTransport, MemoryServer) {
        let (to_client, client_rx) = mpsc::channel(LINK_CAPACITY);
        let (from_client, server_rx) = mpsc::channel(LINK_CAPACITY);
        let link = Arc::new(Link {
            to_client: RwLock::new(Some(to_client)),
            client_rx: Mutex::new(client_rx),
            from_client,
            server_rx: Mutex::new(server_rx),
            connected: RwLock::new(None),
        });
        (
            MemoryTransport {
                link: Arc::clone(&link),
            },
            MemoryServer { link },
        )
    }

    /// Client end of an in-memory link.
    pub struct MemoryTransport {
        link: Arc<Link>,
    }

    /// Server end of an in-memory link.
    pub struct MemoryServer {
        link: Arc<Link>,
    }

    impl MemoryServer {
        /// Deliver raw bytes to the client.
        pub async fn push(&self, frame: Bytes) -> Result<()> {
            let to_client = self.link.to_client.read().await;
            let sender = to_client.as_ref().ok_or(ClientError::NotConnected)?;
            sender
                .send(frame)
                .await
                .map_err(|_| ClientError::Transport("client end dropped".into()))
        }

        /// Encode and deliver a message to the client.
        pub async fn push_msg(&self, msg: &Msg) -> Result<()> {
            self.push(msg.encode()?).await
        }

        /// Everything the client has sent and the server has not yet read.
        pub async fn drain_sent(&self) -> Vec<Bytes> {
            let mut rx = self.link.server_rx.lock().await;
            let mut frames = Vec::new();
            while let Ok(frame) = rx.try_recv() {
                frames.push(frame);
            }
            frames
        }

        /// Decoded form of [`drain_sent`](Self::drain_sent).
        pub async fn drain_sent_msgs(&self) -> Result<Vec<Msg>> {
            self.drain_sent()
                .await
                .iter()
                .map(|frame| Msg::decode(frame).map_err(ClientError::from))
                .collect()
        }

        /// Cut the connection. The client sees `None` after draining what
        /// was already queued.
        pub async fn disconnect(&self) {
            self.link.to_client.write().await.take();
            self.link.connected.write().await.take();
        }

        pub async fn connection(&self) -> Option<ConnectInfo> {
            self.link.connected.read().await.clone()
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn connect(
            &self,
            address: &str,
            credentials: &Credentials,
            mode: ConnectMode,
        ) -> Result<()> {
            let mut to_client = self.link.to_client.write().await;
            if to_client.is_none() {
                let (tx, rx) = mpsc::channel(LINK_CAPACITY);
                *self.link.client_rx.lock().await = rx;
                *to_client = Some(tx);
            }
            *self.link.connected.write().await = Some(ConnectInfo {
                address: address.to_string(),
                account_id: credentials.account_id,
                mode,
            });
            Ok(())
        }

        async fn send(&self, frame: Bytes) -> Result<()> {
            if self.link.connected.read().await.is_none() {
                return Err(ClientError::NotConnected);
            }
            self.link
                .from_client
                .send(frame)
                .await
                .map_err(|_| ClientError::Transport("server end dropped".into()))
        }

        async fn recv(&self) -> Result<Option<Bytes>> {
            let mut rx = self.link.client_rx.lock().await;
            Ok(rx.recv().await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory;
    use super::*;
    use crate::error::ClientError;

    fn creds() -> Credentials {
        Credentials {
            account_id: 1,
            token: "t".into(),
        }
    }

    #[tokio::test]
    async fn test_memory_transport_send_recv() {
        let (transport, server) = memory::pair();
        transport
            .connect("127.0.0.1:8190", &creds(), ConnectMode::Quic)
            .await
            .unwrap();

        transport.send(Bytes::from_static(b"up")).await.unwrap();
        assert_eq!(server.drain_sent().await, vec![Bytes::from_static(b"up")]);

        server.push(Bytes::from_static(b"down")).await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap(),
            Some(Bytes::from_static(b"down"))
        );

        let info = server.connection().await.unwrap();
        assert_eq!(info.mode, ConnectMode::Quic);
        assert_eq!(info.account_id, 1);
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let (transport, _server) = memory::pair();
        let err = transport.send(Bytes::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_and_reconnect() {
        let (transport, server) = memory::pair();
        transport
            .connect("addr", &creds(), ConnectMode::Tcp)
            .await
            .unwrap();

        server.push(Bytes::from_static(b"last")).await.unwrap();
        server.disconnect().await;
        assert_eq!(
            transport.recv().await.unwrap(),
            Some(Bytes::from_static(b"last"))
        );
        assert_eq!(transport.recv().await.unwrap(), None);
        assert!(server.push(Bytes::new()).await.is_err());

        transport
            .connect("addr", &creds(), ConnectMode::Tcp)
            .await
            .unwrap();
        server.push(Bytes::from_static(b"again")).await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap(),
            Some(Bytes::from_static(b"again"))
        );
    }

    #[test]
    fn test_connect_mode_serde() {
        let mode: ConnectMode = serde_json::from_str("\"udp\"").unwrap();
        assert_eq!(mode, ConnectMode::Udp);
    }
}
