//! Correlation of responses with the calls that are waiting for them.
//!
//! Every request gets a fresh id and a one-shot slot. The reader task hands
//! each incoming response to the slot with the matching id, so responses may
//! arrive in any order. A [`PendingCall`] removes its slot when dropped, which
//! covers timeouts and cancellation without leaking entries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use super::protocol::JsonRpcResponse;

#[derive(Debug, Default)]
struct Slots {
    waiting: HashMap<u64, oneshot::Sender<JsonRpcResponse>>,
    closed: bool,
}

/// Shared table of in-flight requests for one connection.
#[derive(Debug)]
pub struct PendingRequests {
    slots: Mutex<Slots>,
    next_id: AtomicU64,
}

impl PendingRequests {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(Slots::default()),
            next_id: AtomicU64::new(1),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // A panic while holding the lock leaves the map itself consistent.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reserve an id and a slot. Returns `None` once the table is closed.
    pub fn register(self: &Arc<Self>) -> Option<PendingCall> {
        let (tx, rx) = oneshot::channel();
        let mut slots = self.lock();
        if slots.closed {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        slots.waiting.insert(id, tx);
        Some(PendingCall {
            id,
            rx,
            table: Arc::clone(self),
        })
    }

    /// Deliver a response to whoever registered its id.
    ///
    /// Returns `false` when nobody is waiting (unknown id, or the caller
    /// already gave up).
    pub fn resolve(&self, response: JsonRpcResponse) -> bool {
        let sender = self.lock().waiting.remove(&response.id);
        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Close the table. Every waiting call observes a dropped sender and no
    /// new call can register.
    pub fn close(&self) {
        let drained: Vec<_> = {
            let mut slots = self.lock();
            slots.closed = true;
            slots.waiting.drain().collect()
        };
        drop(drained);
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of calls currently waiting.
    pub fn in_flight(&self) -> usize {
        self.lock().waiting.len()
    }

    fn forget(&self, id: u64) {
        self.lock().waiting.remove(&id);
    }
}

/// A registered request waiting for its response.
#[derive(Debug)]
pub struct PendingCall {
    id: u64,
    rx: oneshot::Receiver<JsonRpcResponse>,
    table: Arc<PendingRequests>,
}

impl PendingCall {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the response. `None` means the connection went away first.
    pub async fn response(&mut self) -> Option<JsonRpcResponse> {
        (&mut self.rx).await.ok()
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.table.forget(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn response(id: u64, payload: &str) -> JsonRpcResponse {
        JsonRpcResponse {
            id,
            result: Some(json!({ "payload": payload })),
            error: None,
        }
    }

    #[test]
    fn ids_are_unique() {
        let table = PendingRequests::new();
        let a = table.register().unwrap();
        let b = table.register().unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(table.in_flight(), 2);
    }

    #[tokio::test]
    async fn out_of_order_responses_reach_their_callers() {
        let table = PendingRequests::new();
        let mut first = table.register().unwrap();
        let mut second = table.register().unwrap();
        let (first_id, second_id) = (first.id(), second.id());

        let waiter_one = tokio::spawn(async move { first.response().await });
        let waiter_two = tokio::spawn(async move { second.response().await });

        // Answer the later request first.
        assert!(table.resolve(response(second_id, "second")));
        assert!(table.resolve(response(first_id, "first")));

        let one = waiter_one.await.unwrap().unwrap();
        let two = waiter_two.await.unwrap().unwrap();
        assert_eq!(one.id, first_id);
        assert_eq!(one.result, Some(json!({"payload": "first"})));
        assert_eq!(two.id, second_id);
        assert_eq!(two.result, Some(json!({"payload": "second"})));
        assert_eq!(table.in_flight(), 0);
    }

    #[test]
    fn unknown_id_is_rejected() {
        let table = PendingRequests::new();
        let _call = table.register().unwrap();
        assert!(!table.resolve(response(999, "stray")));
        assert_eq!(table.in_flight(), 1);
    }

    #[tokio::test]
    async fn dropping_a_call_frees_its_slot() {
        let table = PendingRequests::new();
        let mut call = table.register().unwrap();
        let id = call.id();

        let timed_out = tokio::time::timeout(Duration::from_millis(10), call.response()).await;
        assert!(timed_out.is_err());
        drop(call);

        assert_eq!(table.in_flight(), 0);
        assert!(!table.resolve(response(id, "late")));
    }

    #[tokio::test]
    async fn close_wakes_waiters_and_blocks_new_calls() {
        let table = PendingRequests::new();
        let mut call = table.register().unwrap();
        table.close();

        assert!(call.response().await.is_none());
        assert!(table.register().is_none());
        assert!(table.is_closed());
    }
}
