//! Paginated history fetch with bounded retry.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};

use prim_im_core::Msg;

use crate::error::{Result, SyncError};
use crate::messages::{BackfillCursor, BackfillRequest, Page, DEFAULT_PAGE_SIZE};

/// The history endpoint.
///
/// Answers a request with the raw frames in the range, oldest first. An
/// empty answer means the history is exhausted.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_page(&self, request: &BackfillRequest) -> Result<Vec<Bytes>>;
}

/// Exponential backoff with jitter, capped at `max_attempts` tries per page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Backoff plus up to half of it again as random jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let backoff = self.backoff(attempt);
        let spread = backoff.as_millis() as u64 / 2;
        let jitter = if spread == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=spread)
        };
        backoff + Duration::from_millis(jitter)
    }
}

/// Configuration for backfill behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Sequence numbers requested per page.
    pub page_size: u64,
    /// Timeout for a single page fetch.
    pub fetch_timeout: Duration,
    /// Retry policy for failed or timed-out fetches.
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            fetch_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Drives page fetches against a [`HistorySource`].
pub struct Backfiller<H: HistorySource> {
    source: H,
    config: SyncConfig,
}

impl<H: HistorySource> Backfiller<H> {
    pub fn new(source: H, config: SyncConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn source(&self) -> &H {
        &self.source
    }

    /// Fetch and decode the cursor's current page.
    ///
    /// Returns `None` once the cursor is done. The cursor only moves forward
    /// on success; after the retry budget is spent the error is returned and
    /// the cursor still points at the failed page.
    pub async fn next_page(&self, cursor: &mut BackfillCursor) -> Result<Option<Page>> {
        let Some(request) = cursor.request() else {
            return Ok(None);
        };

        let page = Page::from_frames(self.fetch_messages(&request).await?);
        cursor.advance(&page);
        tracing::debug!(
            peer_id = request.peer_id,
            from = request.from_seq_num,
            to = request.to_seq_num,
            messages = page.messages.len(),
            complete = page.complete,
            "history page"
        );
        Ok(Some(page))
    }

    /// One page of decoded messages.
    ///
    /// A frame that fails to decode fails the whole attempt, which is then
    /// retried like any other fetch failure.
    pub async fn fetch_messages(&self, request: &BackfillRequest) -> Result<Vec<Msg>> {
        self.retry(request, |frames| {
            frames
                .iter()
                .map(|frame| Msg::decode(frame).map_err(SyncError::from))
                .collect()
        })
        .await
    }

    /// One page of raw frames, retried with backoff until it succeeds or the
    /// budget is spent.
    pub async fn fetch_with_retry(&self, request: &BackfillRequest) -> Result<Vec<Bytes>> {
        self.retry(request, Ok).await
    }

    async fn retry<T, F>(&self, request: &BackfillRequest, accept: F) -> Result<T>
    where
        F: Fn(Vec<Bytes>) -> Result<T>,
    {
        let policy = &self.config.retry;
        let attempts = policy.max_attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=attempts {
            let outcome =
                match tokio::time::timeout(self.config.fetch_timeout, self.source.fetch_page(request))
                    .await
                {
                    Ok(result) => result.and_then(&accept),
                    Err(_) => Err(SyncError::Timeout(self.config.fetch_timeout)),
                };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(
                        peer_id = request.peer_id,
                        from = request.from_seq_num,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "history fetch failed"
                    );
                    last = e.to_string();
                }
            }

            if attempt < attempts {
                tokio::time::sleep(policy.delay(attempt)).await;
            }
        }

        Err(SyncError::RetriesExhausted { attempts, last })
    }
}

/// A scripted history endpoint for tests.
///
/// Serves frames from an in-memory log keyed by channel, and can be told to
/// fail or stall a number of upcoming requests.
pub mod memory {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    use prim_im_core::{AccountId, ChannelKey};

    #[derive(Default)]
    struct State {
        frames: HashMap<ChannelKey, BTreeMap<u64, Bytes>>,
        fail_next: u32,
        stall_next: u32,
        requests: Vec<BackfillRequest>,
    }

    /// In-memory history source answering on behalf of one local account.
    pub struct MemoryHistory {
        me: AccountId,
        with_sentinel: bool,
        stall: Duration,
        state: Mutex<State>,
    }

    impl MemoryHistory {
        pub fn new(me: AccountId) -> Self {
            Self {
                me,
                with_sentinel: false,
                stall: Duration::from_secs(3600),
                state: Mutex::new(State::default()),
            }
        }

        /// Append a zero-count `Sync` frame to the page that reaches the tail.
        pub fn with_sentinel(mut self) -> Self {
            self.with_sentinel = true;
            self
        }

        /// Store a sequenced message as server history.
        pub fn push(&self, msg: &Msg) -> Result<()> {
            let frame = msg.encode()?;
            let channel = msg.channel_key(self.me);
            let seq = msg.head.seq_num;
            if let Ok(mut state) = self.state.lock() {
                state.frames.entry(channel).or_default().insert(seq, frame);
            }
            Ok(())
        }

        /// Serve `frame` at `seq` in the channel with `peer`, whatever it
        /// decodes to.
        pub fn push_raw(&self, peer: AccountId, seq: u64, frame: Bytes) {
            let channel = ChannelKey::for_peer(self.me, peer);
            if let Ok(mut state) = self.state.lock() {
                state.frames.entry(channel).or_default().insert(seq, frame);
            }
        }

        /// Fail the next `n` requests with a fetch error.
        pub fn fail_next(&self, n: u32) {
            if let Ok(mut state) = self.state.lock() {
                state.fail_next = n;
            }
        }

        /// Stall the next `n` requests long enough to hit any sane timeout.
        pub fn stall_next(&self, n: u32) {
            if let Ok(mut state) = self.state.lock() {
                state.stall_next = n;
            }
        }

        /// Every request received so far, failed ones included.
        pub fn requests(&self) -> Vec<BackfillRequest> {
            self.state
                .lock()
                .map(|state| state.requests.clone())
                .unwrap_or_default()
        }

        fn answer(&self, request: &BackfillRequest) -> std::result::Result<Vec<Bytes>, Option<SyncError>> {
            let mut state = self
                .state
                .lock()
                .map_err(|e| Some(SyncError::Fetch(e.to_string())))?;
            state.requests.push(*request);

            if state.stall_next > 0 {
                state.stall_next -= 1;
                return Err(None);
            }
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(Some(SyncError::Fetch("scripted failure".into())));
            }

            let channel = ChannelKey::for_peer(self.me, request.peer_id);
            let Some(log) = state.frames.get(&channel) else {
                return Ok(Vec::new());
            };

            let to = if request.is_open_ended() {
                request.from_seq_num.saturating_add(DEFAULT_PAGE_SIZE - 1)
            } else {
                request.to_seq_num
            };
            if request.from_seq_num > to {
                return Ok(Vec::new());
            }

            let mut frames: Vec<Bytes> = log
                .range(request.from_seq_num..=to)
                .map(|(_, frame)| frame.clone())
                .collect();

            let tail = log.keys().next_back().copied().unwrap_or(0);
            if self.with_sentinel && !frames.is_empty() && to >= tail {
                let done = Msg::sync_done(request.peer_id, self.me, 0)
                    .and_then(|m| m.encode())
                    .map_err(|e| Some(SyncError::Codec(e)))?;
                frames.push(done);
            }
            Ok(frames)
        }
    }

    #[async_trait]
    impl HistorySource for MemoryHistory {
        async fn fetch_page(&self, request: &BackfillRequest) -> Result<Vec<Bytes>> {
            match self.answer(request) {
                Ok(frames) => Ok(frames),
                Err(Some(e)) => Err(e),
                Err(None) => {
                    tokio::time::sleep(self.stall).await;
                    Err(SyncError::Fetch("stalled request released".into()))
                }
            }
        }
    }
}
