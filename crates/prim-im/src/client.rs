//! The client session: configuration, connection and event loop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use prim_im_core::{now_millis, Account, AccountId, ChannelKey, Msg};
use prim_im_store::MessageStore;
use prim_im_sync::{Backfiller, HistorySource, SyncConfig};

use crate::dispatch::{AuthState, DispatchConfig, Dispatcher, Routed, SessionEvent, SyncOutcome};
use crate::error::{ClientError, Result};
use crate::transport::{ConnectMode, Credentials, Transport};

/// Configuration for a client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Local account id.
    pub account_id: AccountId,
    /// Server node this session is pinned to.
    pub node_id: u32,
    /// Server address, `host:port`.
    pub address: String,
    /// Session token presented in the `Auth` frame.
    pub token: String,
    pub mode: ConnectMode,
    /// Outbound messages that may wait for the transport.
    pub send_buffer_capacity: usize,
    /// Messages loaded per history window.
    pub history_window: usize,
    /// Backfill configuration.
    pub sync: SyncConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            account_id: 0,
            node_id: 0,
            address: "127.0.0.1:8190".to_string(),
            token: String::new(),
            mode: ConnectMode::default(),
            send_buffer_capacity: 256,
            history_window: 100,
            sync: SyncConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A connected client session.
pub struct Client<T: Transport, S: MessageStore, H: HistorySource> {
    config: ClientConfig,
    transport: T,
    dispatcher: Dispatcher<S, H>,
    connected: bool,
    last_minted: u64,
}

impl<T: Transport, S: MessageStore, H: HistorySource> Client<T, S, H> {
    /// Create a client and the receiver for its session events.
    pub fn new(
        config: ClientConfig,
        transport: T,
        store: Arc<S>,
        history: H,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let backfiller = Backfiller::new(history, config.sync.clone());
        let dispatcher = Dispatcher::new(
            Account::new(config.account_id),
            store,
            backfiller,
            DispatchConfig {
                send_buffer_capacity: config.send_buffer_capacity,
                history_window: config.history_window,
            },
            events_tx,
        );

        let client = Self {
            config,
            transport,
            dispatcher,
            connected: false,
            last_minted: 0,
        };
        (client, events_rx)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher<S, H> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<S, H> {
        &mut self.dispatcher
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Connect, authenticate and request the roster.
    ///
    /// Messages queued while offline are flushed once the handshake frames
    /// are out.
    pub async fn connect(&mut self) -> Result<()> {
        let credentials = Credentials {
            account_id: self.config.account_id,
            token: self.config.token.clone(),
        };
        self.transport
            .connect(&self.config.address, &credentials, self.config.mode)
            .await?;
        self.connected = true;
        tracing::info!(
            account = self.config.account_id,
            address = %self.config.address,
            mode = ?self.config.mode,
            "connected"
        );

        self.dispatcher.restore().await?;

        let now = now_millis();
        let auth = Msg::auth(
            self.config.account_id,
            self.config.node_id,
            now,
            &self.config.token,
        )?;
        self.transport.send(auth.encode()?).await?;

        let roster = Msg::box_request(self.config.account_id, self.config.node_id, now)?;
        self.transport.send(roster.encode()?).await?;

        self.dispatcher.drain(&self.transport).await?;
        Ok(())
    }

    /// Await one inbound frame and route it.
    ///
    /// Returns `None` once the transport has disconnected.
    pub async fn run_once(&mut self) -> Result<Option<Routed>> {
        if !self.connected {
            return Err(ClientError::NotConnected);
        }
        match self.transport.recv().await? {
            Some(frame) => self.dispatcher.on_frame(&frame).await.map(Some),
            None => {
                self.on_disconnect();
                Ok(None)
            }
        }
    }

    /// Route frames until the transport disconnects.
    ///
    /// Frames that fail to decode are logged and skipped.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            match self.run_once().await {
                Ok(Some(_)) => {}
                Ok(None) => return Ok(()),
                Err(ClientError::Codec(e)) => {
                    tracing::warn!(error = %e, "rejected inbound frame");
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn on_disconnect(&mut self) {
        self.connected = false;
        self.dispatcher.on_disconnect();
    }

    /// Send a text message to `peer`.
    ///
    /// The message is queued first, so it survives a transport failure and
    /// goes out on the next successful drain.
    pub async fn send_text(&mut self, peer: AccountId, text: &str) -> Result<()> {
        if let AuthState::Failed(reason) = self.dispatcher.auth_state() {
            return Err(ClientError::AuthFailed(reason.clone()));
        }

        let minted = self.mint_timestamp();
        let msg = Msg::text(self.config.account_id, peer, self.config.node_id, minted, text)?;
        self.dispatcher.submit(msg)?;

        if !self.connected {
            return Err(ClientError::NotConnected);
        }
        self.dispatcher.drain(&self.transport).await?;
        Ok(())
    }

    /// Send a keep-alive probe.
    pub async fn ping(&mut self) -> Result<()> {
        if !self.connected {
            return Err(ClientError::NotConnected);
        }
        let msg = Msg::ping(self.config.account_id, self.config.node_id, now_millis())?;
        self.transport.send(msg.encode()?).await
    }

    pub async fn open_conversation(&mut self, peer: AccountId) -> Result<SyncOutcome> {
        self.dispatcher.open_conversation(peer).await
    }

    pub async fn load_more(&mut self, peer: AccountId) -> Result<usize> {
        let channel = ChannelKey::for_peer(self.config.account_id, peer);
        self.dispatcher.load_more(channel).await
    }

    /// Minting timestamps strictly increase, so two messages sent within the
    /// same millisecond still have distinct pending keys.
    fn mint_timestamp(&mut self) -> u64 {
        let minted = now_millis().max(self.last_minted + 1);
        self.last_minted = minted;
        minted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.send_buffer_capacity, 256);
        assert_eq!(config.history_window, 100);
        assert_eq!(config.sync.page_size, 50);
        assert_eq!(config.mode, ConnectMode::Tcp);
    }

    #[test]
    fn test_config_from_json() {
        let config = ClientConfig::from_json(
            r#"{"account_id": 7, "address": "im.example:8190", "mode": "quic", "sync": {"page_size": 25}}"#,
        )
        .unwrap();
        assert_eq!(config.account_id, 7);
        assert_eq!(config.mode, ConnectMode::Quic);
        assert_eq!(config.sync.page_size, 25);
        assert_eq!(config.history_window, 100);
    }
}
