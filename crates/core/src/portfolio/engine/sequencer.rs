use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes recomputation per account. Different accounts never wait on
/// each other.
#[derive(Debug, Clone, Default)]
pub struct AccountSequencer {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl AccountSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `account_id`; released when the guard drops.
    pub async fn lock(&self, account_id: &str) -> OwnedMutexGuard<()> {
        let mutex = Arc::clone(
            &*self
                .locks
                .entry(account_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );
        mutex.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_account_is_exclusive() {
        let sequencer = AccountSequencer::new();
        let guard = sequencer.lock("acc-1").await;

        let contender = sequencer.clone();
        let waiting = tokio::spawn(async move {
            let _guard = contender.lock("acc-1").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());
        drop(guard);
        waiting.await.unwrap();
    }

    #[tokio::test]
    async fn test_other_accounts_do_not_block() {
        let sequencer = AccountSequencer::new();
        let _guard = sequencer.lock("acc-1").await;
        let other = tokio::time::timeout(Duration::from_millis(200), sequencer.lock("acc-2")).await;
        assert!(other.is_ok());
    }
}
