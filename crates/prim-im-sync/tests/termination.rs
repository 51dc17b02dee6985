//! A sync cycle over finite history always ends with the channel caught up.

use std::time::Duration;

use prim_im_core::{ChannelKey, Msg};
use prim_im_sync::memory::MemoryHistory;
use prim_im_sync::{Backfiller, RetryPolicy, SyncConfig, SyncPhase, SyncTracker, CAUGHT_UP};
use proptest::prelude::*;

const ME: u64 = 1;
const PEER: u64 = 2;

fn seq_msg(seq: u64) -> Msg {
    let mut msg = Msg::text(PEER, ME, 0, 1_000 + seq, &format!("m{seq}")).unwrap();
    msg.head.seq_num = seq;
    msg
}

fn config(page_size: u64) -> SyncConfig {
    SyncConfig {
        page_size,
        fetch_timeout: Duration::from_secs(1),
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        },
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_sync_cycle_terminates(
        total in 2u64..300,
        cached in 0u64..50,
        page_size in 1u64..80,
        sentinel in any::<bool>(),
    ) {
        let cached = cached.min(total - 2);
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        rt.block_on(async {
            let history = if sentinel {
                MemoryHistory::new(ME).with_sentinel()
            } else {
                MemoryHistory::new(ME)
            };
            for seq in 1..=total {
                history.push(&seq_msg(seq)).unwrap();
            }
            let backfiller = Backfiller::new(history, config(page_size));

            let channel = ChannelKey::new(ME, PEER);
            let mut tracker = SyncTracker::new(page_size);
            tracker.touch(channel, Some(cached));
            assert!(tracker.observe(channel, total));

            let plan = tracker.maybe_sync(channel).expect("gap must produce a plan");
            assert_eq!(plan.from, cached + 1);
            assert!(tracker.maybe_sync(channel).is_none());

            let mut cursor = plan.cursor(PEER);
            let mut merged = 0;
            while let Some(page) = backfiller.next_page(&mut cursor).await.unwrap() {
                merged += page.messages.len() as u64;
                if let Some(last) = page.last_seq() {
                    tracker.advance(channel, last);
                }
                if page.complete {
                    tracker.complete(channel);
                }
            }

            assert_eq!(merged, total - cached);
            assert_eq!(tracker.state(channel).unwrap().next_seq_num, CAUGHT_UP);
            assert_eq!(tracker.phase(channel), SyncPhase::CaughtUp);
        });
    }
}
