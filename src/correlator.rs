//! ActionID to one-shot reply table

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{
    error::{AmiError, AmiResult},
    message::AmiMessage,
};

struct Waiter {
    seq: u64,
    action_id: String,
    tx: oneshot::Sender<AmiMessage>,
}

#[derive(Default)]
struct Table {
    waiters: VecDeque<Waiter>,
    next_seq: u64,
    closed: bool,
}

/// Routes each Response frame to the caller waiting on its ActionID.
///
/// Waiters are kept in registration order. A response carrying no ActionID
/// goes to the oldest waiter, since the server answers one connection's
/// actions in order.
#[derive(Clone, Default)]
pub(crate) struct Correlator {
    table: Arc<Mutex<Table>>,
}

impl Correlator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register interest in the reply to `action_id`.
    pub(crate) fn register(&self, action_id: &str) -> AmiResult<PendingReply> {
        let mut table = self
            .table
            .lock();
        if table.closed {
            return Err(AmiError::Network("session closed".to_string()));
        }
        let seq = table.next_seq;
        table.next_seq += 1;
        let (tx, rx) = oneshot::channel();
        table
            .waiters
            .push_back(Waiter {
                seq,
                action_id: action_id.to_string(),
                tx,
            });
        Ok(PendingReply {
            seq,
            rx,
            table: self
                .table
                .clone(),
        })
    }

    /// Pick the waiter for `response`, removing it from the table.
    pub(crate) fn take_waiter(&self, response: &AmiMessage) -> Option<oneshot::Sender<AmiMessage>> {
        let mut table = self
            .table
            .lock();
        let index = match response.action_id() {
            Some(id) if !id.is_empty() => table
                .waiters
                .iter()
                .position(|w| w.action_id == id),
            _ => {
                if table
                    .waiters
                    .is_empty()
                {
                    None
                } else {
                    Some(0)
                }
            }
        };
        match index {
            Some(i) => table
                .waiters
                .remove(i)
                .map(|w| w.tx),
            None => {
                if let Some(id) = response.action_id() {
                    debug!("[CORRELATE] no waiter for ActionID {}", id);
                }
                None
            }
        }
    }

    /// Drop every waiter and refuse new ones; waiting callers observe a
    /// closed channel.
    pub(crate) fn fail_all(&self) {
        let mut table = self
            .table
            .lock();
        table.closed = true;
        let n = table
            .waiters
            .len();
        table
            .waiters
            .clear();
        if n > 0 {
            warn!("[CORRELATE] abandoned {} pending action(s)", n);
        }
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.table
            .lock()
            .waiters
            .len()
    }
}

/// Receive half of one registration. Dropping it unregisters.
pub(crate) struct PendingReply {
    seq: u64,
    rx: oneshot::Receiver<AmiMessage>,
    table: Arc<Mutex<Table>>,
}

impl PendingReply {
    /// Wait for the reply; `None` if the session went away first.
    pub(crate) async fn recv(&mut self) -> Option<AmiMessage> {
        (&mut self.rx)
            .await
            .ok()
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        let seq = self.seq;
        self.table
            .lock()
            .waiters
            .retain(|w| w.seq != seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(action_id: Option<&str>, tag: &str) -> AmiMessage {
        let mut m = AmiMessage::new();
        m.push_header("Response", "Success");
        if let Some(id) = action_id {
            m.push_header("ActionID", id);
        }
        m.push_header("Tag", tag);
        m
    }

    #[tokio::test]
    async fn routes_by_action_id() {
        let c = Correlator::new();
        let mut a = c
            .register("A")
            .unwrap();
        let mut b = c
            .register("B")
            .unwrap();

        let reply = response(Some("B"), "for-b");
        c.take_waiter(&reply)
            .unwrap()
            .send(reply)
            .unwrap();
        let reply = response(Some("A"), "for-a");
        c.take_waiter(&reply)
            .unwrap()
            .send(reply)
            .unwrap();

        assert_eq!(
            b.recv()
                .await
                .unwrap()
                .get("Tag"),
            "for-b"
        );
        assert_eq!(
            a.recv()
                .await
                .unwrap()
                .get("Tag"),
            "for-a"
        );
    }

    #[tokio::test]
    async fn missing_action_id_goes_to_oldest() {
        let c = Correlator::new();
        let mut first = c
            .register("1")
            .unwrap();
        let _second = c
            .register("2")
            .unwrap();

        let reply = response(None, "anon");
        c.take_waiter(&reply)
            .unwrap()
            .send(reply)
            .unwrap();
        assert_eq!(
            first
                .recv()
                .await
                .unwrap()
                .get("Tag"),
            "anon"
        );
        assert_eq!(c.pending_count(), 1);
    }

    #[test]
    fn unknown_action_id_is_ignored() {
        let c = Correlator::new();
        let _a = c
            .register("A")
            .unwrap();
        assert!(c
            .take_waiter(&response(Some("zzz"), "x"))
            .is_none());
        assert_eq!(c.pending_count(), 1);
    }

    #[test]
    fn drop_unregisters() {
        let c = Correlator::new();
        let a = c
            .register("A")
            .unwrap();
        assert_eq!(c.pending_count(), 1);
        drop(a);
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test]
    async fn fail_all_wakes_waiters() {
        let c = Correlator::new();
        let mut a = c
            .register("A")
            .unwrap();
        c.fail_all();
        assert!(a
            .recv()
            .await
            .is_none());
        assert!(c
            .register("B")
            .is_err());
    }
}
