//! Market-data publisher.
//!
//! Group-based fan-out of order-book deltas, the trade tape, tickers and
//! per-user events. Every subscriber owns a bounded ring; book-delta style
//! groups drop the oldest message on overflow (a newer state supersedes
//! it), trade-tape groups drop the newest and count the loss (tape events
//! are historical facts, the gap must be observable).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Notify;

use crate::models::OrderSide;

/// Messages delivered to group subscribers. Serialised shape matches the
/// wire payloads; the user id is addressing, not payload.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PushMessage {
    #[serde(rename_all = "camelCase")]
    BookDelta {
        symbol: String,
        side: OrderSide,
        price: Decimal,
        /// 0 removes the level.
        new_size: Decimal,
        ts: i64,
    },
    #[serde(rename_all = "camelCase")]
    TradeTape {
        symbol: String,
        price: Decimal,
        qty: Decimal,
        ts: i64,
        taker_side: OrderSide,
    },
    #[serde(rename_all = "camelCase")]
    Ticker {
        symbol: String,
        last: Decimal,
        vol24h: Decimal,
        ts: i64,
    },
    #[serde(rename_all = "camelCase")]
    UserEvent {
        #[serde(skip)]
        user_id: i64,
        kind: String,
        payload: serde_json::Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverflowPolicy {
    DropOldest,
    DropNewest,
}

fn policy_for(group: &str) -> OverflowPolicy {
    if group.starts_with("trades:") {
        OverflowPolicy::DropNewest
    } else {
        OverflowPolicy::DropOldest
    }
}

struct Member {
    queue: Mutex<VecDeque<PushMessage>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

struct Group {
    policy: OverflowPolicy,
    members: Mutex<Vec<Arc<Member>>>,
}

/// Handle returned by [`PublisherHub::subscribe`]. Dropping it leaves the
/// group; the publisher prunes closed members lazily.
pub struct Subscription {
    group: String,
    member: Arc<Member>,
}

impl Subscription {
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Next message, in enqueue order. Waits when the ring is empty.
    pub async fn recv(&self) -> PushMessage {
        loop {
            if let Some(message) = self.member.queue.lock().pop_front() {
                return message;
            }
            self.member.notify.notified().await;
        }
    }

    /// Non-blocking receive, mostly for draining in tests.
    pub fn try_recv(&self) -> Option<PushMessage> {
        self.member.queue.lock().pop_front()
    }

    /// Messages dropped on this subscriber under the drop-newest policy.
    pub fn dropped(&self) -> u64 {
        self.member.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.member.closed.store(true, Ordering::Relaxed);
    }
}

pub struct PublisherHub {
    groups: DashMap<String, Group>,
    delta_buffer: usize,
    tape_buffer: usize,
}

impl PublisherHub {
    pub fn new(delta_buffer: usize, tape_buffer: usize) -> Self {
        Self {
            groups: DashMap::new(),
            delta_buffer,
            tape_buffer,
        }
    }

    /// Join a group, creating it on first use.
    pub fn subscribe(&self, group: &str) -> Subscription {
        let policy = policy_for(group);
        let capacity = match policy {
            OverflowPolicy::DropOldest => self.delta_buffer,
            OverflowPolicy::DropNewest => self.tape_buffer,
        };
        let member = Arc::new(Member {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        });
        self.groups
            .entry(group.to_string())
            .or_insert_with(|| Group {
                policy,
                members: Mutex::new(Vec::new()),
            })
            .members
            .lock()
            .push(Arc::clone(&member));
        Subscription {
            group: group.to_string(),
            member,
        }
    }

    /// Fan a message out to group members. Never blocks the caller.
    pub fn publish(&self, group: &str, message: PushMessage) {
        let Some(entry) = self.groups.get(group) else {
            return;
        };
        let mut members = entry.members.lock();
        members.retain(|m| !m.closed.load(Ordering::Relaxed));
        for member in members.iter() {
            let mut queue = member.queue.lock();
            if queue.len() >= member.capacity {
                match entry.policy {
                    OverflowPolicy::DropOldest => {
                        queue.pop_front();
                    }
                    OverflowPolicy::DropNewest => {
                        member.dropped.fetch_add(1, Ordering::Relaxed);
                        crate::metrics::record_tape_dropped(group);
                        continue;
                    }
                }
            }
            queue.push_back(message.clone());
            drop(queue);
            member.notify.notify_one();
        }
    }

    /// Number of live subscribers in a group.
    pub fn group_len(&self, group: &str) -> usize {
        self.groups
            .get(group)
            .map(|g| {
                g.members
                    .lock()
                    .iter()
                    .filter(|m| !m.closed.load(Ordering::Relaxed))
                    .count()
            })
            .unwrap_or(0)
    }
}

impl Default for PublisherHub {
    fn default() -> Self {
        Self::new(1024, 4096)
    }
}
