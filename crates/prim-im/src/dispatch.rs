//! Inbound routing and outbound buffering.
//!
//! The [`Dispatcher`] owns every piece of per-channel state: timelines, sync
//! tracking and the conversation list. All mutation goes through `&mut self`,
//! so one handler's merge and persist finish before the next event is routed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc;

use prim_im_core::{
    Account, AccountId, ChannelKey, CodecError, InsertOutcome, Msg, MsgType, Timeline,
};
use prim_im_store::MessageStore;
use prim_im_sync::{Backfiller, BackfillRequest, HistorySource, Page, SyncTracker};

use crate::conversation::ConversationSet;
use crate::error::{ClientError, Result};
use crate::transport::Transport;

/// Something the session surfaced to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The server accepted the credentials.
    Authenticated,
    /// The server rejected the credentials. Not retried.
    AuthFailed(String),
    /// A content message was merged into a channel.
    Message { channel: ChannelKey, msg: Msg },
    /// A pending message received its sequence number.
    Acked {
        channel: ChannelKey,
        seq_num: u64,
        minted_ts: u64,
    },
    /// The server sent a roster snapshot.
    Roster { peers: Vec<AccountId> },
    /// A channel has no more history to fetch.
    SyncCompleted { channel: ChannelKey },
    /// A backfill gave up after its retry budget.
    SyncFailed { channel: ChannelKey, reason: String },
    /// `Error` or `InternalError` from the server.
    ServerError { typ: MsgType, detail: String },
    /// The server is taking this session offline.
    Offline { reason: String },
    /// Any other non-content frame (pings, echoes, edits, business notices).
    Notice(Msg),
    /// The transport went away.
    Disconnected,
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Content {
        channel: ChannelKey,
        outcome: InsertOutcome,
    },
    Ack {
        channel: ChannelKey,
        promoted: bool,
    },
    Roster {
        peers: usize,
    },
    SyncDone {
        channel: ChannelKey,
    },
    Auth {
        ok: bool,
    },
    Surfaced(MsgType),
    Ignored(MsgType),
}

/// Result of one backfill cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing to fetch, or this activation already synced.
    Skipped,
    /// Ran to an empty page or completion sentinel.
    Completed { merged: usize },
    /// A page fetch failed; the channel keeps its current `next_seq_num`.
    Failed { merged: usize, reason: String },
}

/// Authentication status of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Pending,
    Authenticated,
    Failed(String),
}

/// Tunables the dispatcher needs.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub send_buffer_capacity: usize,
    pub history_window: usize,
}

/// Routes frames and owns all channel state.
pub struct Dispatcher<S: MessageStore, H: HistorySource> {
    account: Account,
    store: Arc<S>,
    backfiller: Backfiller<H>,
    tracker: SyncTracker,
    timelines: HashMap<ChannelKey, Timeline>,
    conversations: ConversationSet,
    outbox: VecDeque<Msg>,
    config: DispatchConfig,
    active: Option<ChannelKey>,
    auth: AuthState,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<S: MessageStore, H: HistorySource> Dispatcher<S, H> {
    pub fn new(
        account: Account,
        store: Arc<S>,
        backfiller: Backfiller<H>,
        config: DispatchConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let page_size = backfiller.config().page_size;
        Self {
            account,
            store,
            backfiller,
            tracker: SyncTracker::new(page_size),
            timelines: HashMap::new(),
            conversations: ConversationSet::new(),
            outbox: VecDeque::new(),
            config,
            active: None,
            auth: AuthState::Pending,
            events,
        }
    }

    pub fn account(&self) -> Account {
        self.account
    }

    pub fn timeline(&self, channel: ChannelKey) -> Option<&Timeline> {
        self.timelines.get(&channel)
    }

    pub fn tracker(&self) -> &SyncTracker {
        &self.tracker
    }

    pub fn conversations(&self) -> &ConversationSet {
        &self.conversations
    }

    pub fn auth_state(&self) -> &AuthState {
        &self.auth
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn backfiller(&self) -> &Backfiller<H> {
        &self.backfiller
    }

    pub fn queued(&self) -> usize {
        self.outbox.len()
    }

    /// Reload the persisted conversation list.
    pub async fn restore(&mut self) -> Result<()> {
        self.conversations = ConversationSet::load(self.store.as_ref(), self.account.id).await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────────

    /// Decode and route one frame.
    ///
    /// A frame that fails to decode, or whose payload cannot be read for its
    /// type, is rejected before any channel state changes.
    pub async fn on_frame(&mut self, bytes: &[u8]) -> Result<Routed> {
        let msg = Msg::decode(bytes)?;
        let typ = msg.head.typ;
        tracing::debug!(%typ, sender = msg.head.sender, seq = msg.head.seq_num, "routing frame");

        if typ.is_content() {
            return self.on_content(msg).await;
        }

        match typ {
            MsgType::Ack => self.on_ack(msg).await,
            MsgType::Box => self.on_box(msg).await,
            MsgType::Sync => self.on_sync(msg),
            MsgType::Auth => Ok(self.on_auth(msg)),
            MsgType::Error | MsgType::InternalError => {
                let detail = String::from_utf8_lossy(&msg.payload).into_owned();
                tracing::warn!(%typ, %detail, "server error");
                self.emit(SessionEvent::ServerError { typ, detail });
                Ok(Routed::Surfaced(typ))
            }
            MsgType::BeOffline => {
                let reason = String::from_utf8_lossy(&msg.payload).into_owned();
                tracing::info!(%reason, "server took session offline");
                self.emit(SessionEvent::Offline { reason });
                Ok(Routed::Surfaced(typ))
            }
            _ if typ.is_internal() || typ == MsgType::NA => {
                tracing::warn!(%typ, "dropping frame not meant for clients");
                Ok(Routed::Ignored(typ))
            }
            _ => {
                self.emit(SessionEvent::Notice(msg));
                Ok(Routed::Surfaced(typ))
            }
        }
    }

    async fn on_content(&mut self, msg: Msg) -> Result<Routed> {
        let me = self.account.id;
        let channel = msg.channel_key(me);
        let peer = msg.peer_of(me);
        let first_seen = self.tracker.state(channel).is_none();

        self.tracker
            .touch_from_store(self.store.as_ref(), channel)
            .await?;
        let outcome = self.merge(channel, msg.clone()).await?;

        if outcome.is_inserted() {
            let counts_unread = self.active != Some(channel);
            self.conversations.record_message(peer, &msg, counts_unread);
            self.save_conversations().await?;
            self.emit(SessionEvent::Message { channel, msg });
        }

        if first_seen {
            self.sync_channel(channel).await?;
        }

        Ok(Routed::Content { channel, outcome })
    }

    async fn on_ack(&mut self, msg: Msg) -> Result<Routed> {
        let minted_ts = msg.ack_minted_timestamp()?;
        let me = self.account.id;
        let channel = msg.channel_key(me);
        let head = &msg.head;

        let promoted = self.timelines.get_mut(&channel).and_then(|timeline| {
            timeline.promote(head.sender, head.receiver, minted_ts, head.seq_num, head.timestamp)
        });

        let Some(promoted) = promoted else {
            tracing::warn!(%channel, minted_ts, seq = head.seq_num, "ack for unknown message");
            return Ok(Routed::Ack {
                channel,
                promoted: false,
            });
        };

        let seq_num = promoted.head.seq_num;
        self.store.save_message(channel, &promoted).await?;
        self.tracker.observe(channel, seq_num);
        self.conversations
            .record_ack(msg.peer_of(me), promoted.head.timestamp);
        self.save_conversations().await?;

        self.emit(SessionEvent::Acked {
            channel,
            seq_num,
            minted_ts,
        });
        Ok(Routed::Ack {
            channel,
            promoted: true,
        })
    }

    async fn on_box(&mut self, msg: Msg) -> Result<Routed> {
        let roster: Vec<(AccountId, u64)> = if msg.payload.is_empty() {
            Vec::new()
        } else {
            serde_json::from_slice(&msg.payload)
                .map_err(|e| CodecError::MalformedPayload(format!("roster: {e}")))?
        };

        self.conversations.merge_roster(&roster);
        self.save_conversations().await?;

        let peers: Vec<AccountId> = roster.iter().map(|(peer, _)| *peer).collect();
        tracing::info!(peers = peers.len(), "roster received");
        self.emit(SessionEvent::Roster {
            peers: peers.clone(),
        });

        for &peer in &peers {
            let channel = self.account.channel_with(peer);
            self.tracker
                .touch_from_store(self.store.as_ref(), channel)
                .await?;
            self.sync_channel(channel).await?;
        }

        Ok(Routed::Roster { peers: peers.len() })
    }

    fn on_sync(&mut self, msg: Msg) -> Result<Routed> {
        let remaining = msg.sync_remaining()?;
        let channel = msg.channel_key(self.account.id);
        if remaining == 0 {
            self.tracker.complete(channel);
            self.emit(SessionEvent::SyncCompleted { channel });
        } else {
            tracing::debug!(%channel, remaining, "sync progress");
        }
        Ok(Routed::SyncDone { channel })
    }

    fn on_auth(&mut self, msg: Msg) -> Routed {
        let reply = String::from_utf8_lossy(&msg.payload).trim().to_string();
        if reply.is_empty() || reply.eq_ignore_ascii_case("ok") {
            tracing::info!(account = self.account.id, "authenticated");
            self.auth = AuthState::Authenticated;
            self.emit(SessionEvent::Authenticated);
            Routed::Auth { ok: true }
        } else {
            tracing::warn!(account = self.account.id, reason = %reply, "authentication rejected");
            self.auth = AuthState::Failed(reply.clone());
            self.emit(SessionEvent::AuthFailed(reply));
            Routed::Auth { ok: false }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync
    // ─────────────────────────────────────────────────────────────────────────

    /// Run the channel's backfill cycle if the tracker issues one.
    ///
    /// A fetch that exhausts its retries is reported through
    /// [`SessionEvent::SyncFailed`], not as an error.
    pub async fn sync_channel(&mut self, channel: ChannelKey) -> Result<SyncOutcome> {
        let Some(plan) = self.tracker.maybe_sync(channel) else {
            return Ok(SyncOutcome::Skipped);
        };

        let peer = channel.other(self.account.id);
        tracing::info!(%channel, from = plan.from, to = plan.to, "backfill started");

        let mut cursor = plan.cursor(peer);
        let mut merged = 0;
        loop {
            let page = match self.backfiller.next_page(&mut cursor).await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(e) => {
                    let reason = e.to_string();
                    tracing::warn!(%channel, %reason, "backfill abandoned");
                    self.emit(SessionEvent::SyncFailed {
                        channel,
                        reason: reason.clone(),
                    });
                    return Ok(SyncOutcome::Failed { merged, reason });
                }
            };

            let (count, last) = self.merge_page(channel, &page).await?;
            merged += count;
            if let Some(last) = last {
                self.tracker.advance(channel, last);
            }
            if page.complete {
                self.tracker.complete(channel);
                self.emit(SessionEvent::SyncCompleted { channel });
            }
        }

        Ok(SyncOutcome::Completed { merged })
    }

    /// Merge the page's messages that belong to `channel`.
    ///
    /// Returns how many were new and the highest sequence number among the
    /// messages kept.
    async fn merge_page(
        &mut self,
        channel: ChannelKey,
        page: &Page,
    ) -> Result<(usize, Option<u64>)> {
        let mut merged = 0;
        let mut last = None;
        for msg in &page.messages {
            if msg.channel_key(self.account.id) != channel {
                tracing::warn!(%channel, %msg, "history frame for another channel");
                continue;
            }
            last = last.max(msg.position().seq_num());
            if self.merge(channel, msg.clone()).await?.is_inserted() {
                merged += 1;
            }
        }
        Ok((merged, last))
    }

    /// Insert into the channel's timeline and persist if sequenced.
    async fn merge(&mut self, channel: ChannelKey, msg: Msg) -> Result<InsertOutcome> {
        let seq = msg.position().seq_num();
        let outcome = self.timelines.entry(channel).or_default().insert(msg.clone());

        if let Some(seq) = seq {
            if outcome.is_inserted() {
                self.store.save_message(channel, &msg).await?;
            }
            self.tracker.observe(channel, seq);
        }
        Ok(outcome)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Conversations
    // ─────────────────────────────────────────────────────────────────────────

    /// Make `peer`'s conversation the active one.
    ///
    /// Loads the cached tail, fixes the tracker's newest sequence number from
    /// it, runs the backfill cycle and clears the unread count.
    pub async fn open_conversation(&mut self, peer: AccountId) -> Result<SyncOutcome> {
        let channel = self.account.channel_with(peer);
        self.active = Some(channel);

        let cached = self
            .store
            .get_messages_before(channel, u64::MAX, self.config.history_window)
            .await?;
        let tail = cached.last().and_then(|m| m.position().seq_num());

        let timeline = self.timelines.entry(channel).or_default();
        for msg in cached {
            timeline.insert(msg);
        }
        self.tracker.touch(channel, tail);

        let outcome = self.sync_channel(channel).await?;

        self.conversations.mark_read(peer);
        self.save_conversations().await?;
        Ok(outcome)
    }

    /// Pull one window of older history below the oldest loaded message.
    ///
    /// The window is the `history_window` sequence numbers directly below the
    /// oldest one loaded. The local store fills it first; every run the store
    /// cannot supply is requested from the history endpoint. Returns how many
    /// messages were added.
    pub async fn load_more(&mut self, channel: ChannelKey) -> Result<usize> {
        let Some(oldest) = self.timelines.get(&channel).and_then(Timeline::oldest_seq) else {
            return Ok(0);
        };
        if oldest <= 1 {
            return Ok(0);
        }

        let ceiling = oldest - 1;
        let floor = oldest.saturating_sub(self.config.history_window as u64).max(1);
        let cached = self
            .store
            .get_messages_in_range(channel, floor, ceiling)
            .await?;

        let mut added = 0;
        let timeline = self.timelines.entry(channel).or_default();
        for msg in cached {
            if timeline.insert(msg).is_inserted() {
                added += 1;
            }
        }
        let gaps = timeline.missing_ranges(floor, ceiling);

        let peer = channel.other(self.account.id);
        let page_size = self.backfiller.config().page_size.max(1);
        for (from, to) in gaps {
            let mut start = from;
            while start <= to {
                let end = to.min(start.saturating_add(page_size - 1));
                let request = BackfillRequest {
                    peer_id: peer,
                    from_seq_num: start,
                    to_seq_num: end,
                };
                let messages = self.backfiller.fetch_messages(&request).await?;
                added += self.merge_page(channel, &Page::from_frames(messages)).await?.0;
                start = end + 1;
            }
        }

        tracing::debug!(%channel, floor, ceiling, added, "loaded older history");
        Ok(added)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Outbound
    // ─────────────────────────────────────────────────────────────────────────

    /// Queue a message for sending.
    pub fn submit(&mut self, msg: Msg) -> Result<()> {
        if self.outbox.len() >= self.config.send_buffer_capacity {
            return Err(ClientError::SendBufferFull {
                capacity: self.config.send_buffer_capacity,
            });
        }
        self.outbox.push_back(msg);
        Ok(())
    }

    /// Send queued messages in submission order.
    ///
    /// Each sent content message is merged into its timeline as pending. A
    /// transport failure leaves the failed message and everything behind it
    /// queued.
    pub async fn drain<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<usize> {
        let me = self.account.id;
        let mut sent = 0;

        while let Some(msg) = self.outbox.front() {
            let frame = match msg.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    self.outbox.pop_front();
                    return Err(e.into());
                }
            };
            transport.send(frame).await?;

            let Some(msg) = self.outbox.pop_front() else {
                break;
            };
            sent += 1;

            if msg.head.typ.is_content() {
                let channel = msg.channel_key(me);
                let peer = msg.peer_of(me);
                self.timelines.entry(channel).or_default().insert(msg.clone());
                self.conversations.record_message(peer, &msg, false);
            }
        }

        if sent > 0 {
            self.save_conversations().await?;
        }
        Ok(sent)
    }

    /// Forget per-activation sync flags after the transport dropped.
    pub fn on_disconnect(&mut self) {
        self.tracker.reset_synced();
        tracing::info!(account = self.account.id, "disconnected");
        self.emit(SessionEvent::Disconnected);
    }

    async fn save_conversations(&self) -> Result<()> {
        self.conversations
            .save(self.store.as_ref(), self.account.id)
            .await
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("session event dropped: no listener");
        }
    }
}
