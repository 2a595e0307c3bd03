//! Pending-transaction table keyed by system bytes

use crate::header::MessageHeader;
use crate::message::Message;
use parking_lot::Mutex;
use secs_core::{SecsError, SecsResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

struct PendingEntry {
    session_id: u16,
    sender: oneshot::Sender<Message>,
}

type PendingTable = Arc<Mutex<HashMap<u32, PendingEntry>>>;

/// Correlates replies with outstanding requests
pub struct TransactionManager {
    pending: PendingTable,
    counter: AtomicU32,
}

impl TransactionManager {
    /// Create a manager with a randomly seeded system-bytes counter
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    pub fn with_seed(seed: u32) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            counter: AtomicU32::new(seed),
        }
    }

    /// Next system-bytes value; wraps at `u32::MAX`
    pub fn next_system_bytes(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Register an outstanding request and get a handle to await its reply
    pub fn register(&self, header: &MessageHeader, timeout: Duration) -> SecsResult<PendingReply> {
        let (sender, receiver) = oneshot::channel();
        let mut pending = self.pending.lock();
        if pending.contains_key(&header.system_bytes) {
            return Err(SecsError::DuplicateTransaction(header.system_bytes));
        }
        pending.insert(
            header.system_bytes,
            PendingEntry {
                session_id: header.session_id,
                sender,
            },
        );
        Ok(PendingReply {
            header: *header,
            timeout,
            receiver,
            table: self.pending.clone(),
        })
    }

    /// Deliver a reply to its waiter.
    ///
    /// Returns the message back if no transaction with matching system
    /// bytes and session id is open.
    pub fn complete(&self, reply: Message) -> Result<(), Message> {
        let entry = {
            let mut pending = self.pending.lock();
            match pending.get(&reply.header.system_bytes) {
                Some(entry) if entry.session_id == reply.header.session_id => {
                    pending.remove(&reply.header.system_bytes)
                }
                _ => None,
            }
        };
        match entry {
            // A waiter that already gave up is the same as no waiter
            Some(entry) => entry.sender.send(reply),
            None => Err(reply),
        }
    }

    pub fn is_pending(&self, system_bytes: u32) -> bool {
        self.pending.lock().contains_key(&system_bytes)
    }

    pub fn cancel(&self, system_bytes: u32) -> bool {
        self.pending.lock().remove(&system_bytes).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drop every pending entry; each waiter observes `ConnectionLost`
    pub fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        drained.len()
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to an outstanding request.
///
/// Dropping it removes the pending entry, so a late reply is discarded.
pub struct PendingReply {
    header: MessageHeader,
    timeout: Duration,
    receiver: oneshot::Receiver<Message>,
    table: PendingTable,
}

impl PendingReply {
    /// Header of the request as sent
    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn system_bytes(&self) -> u32 {
        self.header.system_bytes
    }

    /// Wait for the reply within the timeout given at registration
    pub async fn wait(self) -> SecsResult<Message> {
        let timeout = self.timeout;
        self.wait_timeout(timeout).await
    }

    /// Wait for the reply within `timeout`
    pub async fn wait_timeout(mut self, timeout: Duration) -> SecsResult<Message> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(SecsError::ConnectionLost),
            Err(_) => {
                self.table.lock().remove(&self.header.system_bytes);
                // The reply may have been delivered between expiry and removal
                match self.receiver.try_recv() {
                    Ok(message) => Ok(message),
                    Err(_) => Err(SecsError::Timeout),
                }
            }
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.table.lock().remove(&self.header.system_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secs_core::Item;

    fn request(system_bytes: u32) -> MessageHeader {
        MessageHeader::data(1, 1, 1, true, system_bytes)
    }

    #[tokio::test]
    async fn test_reply_completes_transaction() {
        let manager = TransactionManager::with_seed(100);
        let header = request(manager.next_system_bytes());
        assert_eq!(header.system_bytes, 100);
        let pending = manager.register(&header, Duration::from_secs(1)).unwrap();

        let reply = Message::reply_to(&header, Some(Item::empty_list()));
        assert!(manager.complete(reply.clone()).is_ok());
        assert_eq!(pending.wait().await.unwrap(), reply);
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_duplicate_registration() {
        let manager = TransactionManager::new();
        let header = request(5);
        let _pending = manager.register(&header, Duration::from_secs(1)).unwrap();
        assert!(matches!(
            manager.register(&header, Duration::from_secs(1)),
            Err(SecsError::DuplicateTransaction(5))
        ));
    }

    #[tokio::test]
    async fn test_timeout_then_late_reply_discarded() {
        let manager = TransactionManager::new();
        let header = request(9);
        let pending = manager.register(&header, Duration::from_millis(20)).unwrap();
        assert!(matches!(pending.wait().await, Err(SecsError::Timeout)));
        assert!(!manager.is_pending(9));

        let late = Message::reply_to(&header, None);
        assert!(manager.complete(late).is_err());
    }

    #[tokio::test]
    async fn test_fail_all_reports_connection_lost() {
        let manager = TransactionManager::new();
        let first = manager.register(&request(1), Duration::from_secs(5)).unwrap();
        let second = manager.register(&request(2), Duration::from_secs(5)).unwrap();
        assert_eq!(manager.fail_all(), 2);
        assert!(matches!(first.wait().await, Err(SecsError::ConnectionLost)));
        assert!(matches!(second.wait().await, Err(SecsError::ConnectionLost)));
    }

    #[test]
    fn test_session_mismatch_not_completed() {
        let manager = TransactionManager::new();
        let header = request(3);
        let _pending = manager.register(&header, Duration::from_secs(1)).unwrap();
        let mut reply = Message::reply_to(&header, None);
        reply.header.session_id = 2;
        assert!(manager.complete(reply).is_err());
        assert!(manager.is_pending(3));
    }

    #[test]
    fn test_counter_wraps() {
        let manager = TransactionManager::with_seed(u32::MAX);
        assert_eq!(manager.next_system_bytes(), u32::MAX);
        assert_eq!(manager.next_system_bytes(), 0);
    }

    #[test]
    fn test_dropped_handle_clears_entry() {
        let manager = TransactionManager::new();
        let pending = manager.register(&request(8), Duration::from_secs(1)).unwrap();
        assert_eq!(pending.system_bytes(), 8);
        drop(pending);
        assert!(!manager.is_pending(8));
        assert!(!manager.cancel(8));
    }
}
