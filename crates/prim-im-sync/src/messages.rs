//! Backfill request and page types.
//!
//! A backfill walks a channel's history oldest-first in fixed-size pages.
//! The history endpoint answers each request with an ordered list of raw
//! frames; an empty list means there is nothing further.

use serde::{Deserialize, Serialize};

use prim_im_core::{AccountId, ChannelKey, Msg, MsgType, MAX_SEQ_NUM};

/// Page size observed on the history endpoint.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// `next_seq_num` before anything is known about a channel.
pub const UNKNOWN_SEQ: u64 = u64::MAX;

/// `next_seq_num` once a channel is fully caught up.
pub const CAUGHT_UP: u64 = 0;

/// One request to the history endpoint.
///
/// Serialized as the JSON body `{"peer_id", "from_seq_num", "to_seq_num"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillRequest {
    pub peer_id: AccountId,
    pub from_seq_num: u64,
    /// Inclusive upper bound; `0` lets the server pick the page size.
    pub to_seq_num: u64,
}

impl BackfillRequest {
    /// A page of `page_size` sequence numbers starting at `from`.
    pub fn page(peer_id: AccountId, from: u64, page_size: u64) -> Self {
        Self {
            peer_id,
            from_seq_num: from,
            to_seq_num: from.saturating_add(page_size.max(1) - 1),
        }
    }

    /// Everything from `from` onward, paged by the server.
    pub fn open_ended(peer_id: AccountId, from: u64) -> Self {
        Self {
            peer_id,
            from_seq_num: from,
            to_seq_num: 0,
        }
    }

    pub fn is_open_ended(&self) -> bool {
        self.to_seq_num == 0
    }
}

/// Work issued by the tracker for one sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillPlan {
    pub channel: ChannelKey,
    /// First missing sequence number.
    pub from: u64,
    /// Newest sequence number known when the plan was made.
    pub to: u64,
    pub page_size: u64,
}

impl BackfillPlan {
    /// Start paging this plan against `peer_id`.
    pub fn cursor(&self, peer_id: AccountId) -> BackfillCursor {
        BackfillCursor::new(peer_id, self.from, self.page_size)
    }
}

/// Position of an in-progress backfill.
///
/// Pages run past the plan's `to`: the cycle ends on an empty page or an
/// explicit completion sentinel, never on a computed bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillCursor {
    peer_id: AccountId,
    next_from: u64,
    page_size: u64,
    done: bool,
}

impl BackfillCursor {
    pub fn new(peer_id: AccountId, from: u64, page_size: u64) -> Self {
        Self {
            peer_id,
            next_from: from.max(1),
            page_size: page_size.max(1),
            done: false,
        }
    }

    /// The request for the current page, or `None` once finished.
    pub fn request(&self) -> Option<BackfillRequest> {
        if self.done {
            return None;
        }
        Some(BackfillRequest::page(
            self.peer_id,
            self.next_from,
            self.page_size,
        ))
    }

    /// Move past a page that was fetched successfully.
    pub fn advance(&mut self, page: &Page) {
        if page.complete {
            self.done = true;
            return;
        }
        self.next_from = self.next_from.saturating_add(self.page_size);
        if self.next_from > MAX_SEQ_NUM {
            self.done = true;
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn peer_id(&self) -> AccountId {
        self.peer_id
    }
}

/// One fetched page of history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Content frames, in the order the server sent them.
    pub messages: Vec<Msg>,
    /// Nothing remains: the page was empty or carried a zero-count sentinel.
    pub complete: bool,
}

impl Page {
    /// Split decoded frames into content and completion signal.
    pub fn from_frames(frames: Vec<Msg>) -> Self {
        if frames.is_empty() {
            return Self {
                messages: Vec::new(),
                complete: true,
            };
        }

        let mut complete = false;
        let mut messages = Vec::with_capacity(frames.len());
        for msg in frames {
            if msg.head.typ == MsgType::Sync {
                if is_sync_done(&msg) {
                    complete = true;
                }
                continue;
            }
            messages.push(msg);
        }
        Self { messages, complete }
    }

    /// Highest sequence number on the page.
    pub fn last_seq(&self) -> Option<u64> {
        self.messages
            .iter()
            .filter_map(|m| m.position().seq_num())
            .max()
    }
}

/// Whether a `Sync` frame signals that nothing remains.
///
/// A malformed remaining-count is not treated as completion.
pub fn is_sync_done(msg: &Msg) -> bool {
    msg.head.typ == MsgType::Sync && matches!(msg.sync_remaining(), Ok(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq_msg(seq: u64) -> Msg {
        let mut msg = Msg::text(2, 1, 0, 1_000 + seq, "x").unwrap();
        msg.head.seq_num = seq;
        msg
    }

    #[test]
    fn test_page_request_bounds() {
        let req = BackfillRequest::page(2, 1, 50);
        assert_eq!((req.from_seq_num, req.to_seq_num), (1, 50));
        assert!(!req.is_open_ended());
        assert!(BackfillRequest::open_ended(2, 7).is_open_ended());
    }

    #[test]
    fn test_request_json_shape() {
        let json = serde_json::to_value(BackfillRequest::page(2, 51, 50)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"peer_id": 2, "from_seq_num": 51, "to_seq_num": 100})
        );
    }

    #[test]
    fn test_cursor_pages_until_complete() {
        let mut cursor = BackfillCursor::new(2, 1, 50);
        let mut ranges = Vec::new();
        for _ in 0..4 {
            let req = cursor.request().unwrap();
            ranges.push((req.from_seq_num, req.to_seq_num));
            cursor.advance(&Page {
                messages: vec![seq_msg(req.to_seq_num)],
                complete: false,
            });
        }
        assert_eq!(ranges, vec![(1, 50), (51, 100), (101, 150), (151, 200)]);

        cursor.advance(&Page::from_frames(Vec::new()));
        assert!(cursor.is_done());
        assert_eq!(cursor.request(), None);
    }

    #[test]
    fn test_page_sentinel() {
        let frames = vec![
            seq_msg(1),
            seq_msg(2),
            Msg::sync_done(2, 1, 0).unwrap(),
        ];
        let page = Page::from_frames(frames);
        assert!(page.complete);
        assert_eq!(page.messages.len(), 2);
        assert_eq!(page.last_seq(), Some(2));

        let progress = Page::from_frames(vec![seq_msg(3), Msg::sync_progress(2, 1, 0, 40).unwrap()]);
        assert!(!progress.complete);
        assert_eq!(progress.messages.len(), 1);
    }
}
