use crate::database::errors::DatabaseError;
use crate::database::services::drafts::DraftStore;
use crate::database::types::{NewEstimateDraft, OwnerContext};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, warn};

/// One change notification from an estimate session. The snapshot is the
/// comparison view used for deduplication; the document is what actually gets
/// persisted.
#[derive(Debug, Clone)]
pub struct DraftPayload {
    pub snapshot: Value,
    pub document: Value,
    pub client_name: Option<String>,
}

/// Handle held by an estimate session. Dropping the last handle closes the
/// channel and lets the reconciler task flush anything still pending, then
/// exit.
#[derive(Clone)]
pub struct AutoSave {
    tx: mpsc::UnboundedSender<DraftPayload>,
}

impl AutoSave {
    /// The baseline snapshot is the state at session open; it is never
    /// persisted by itself, so opening a session does not write a draft.
    pub fn spawn(
        store: Arc<dyn DraftStore>,
        owner: OwnerContext,
        debounce: Duration,
        baseline: Value,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(store, owner, debounce, baseline, rx));
        Self { tx }
    }

    pub fn notify(&self, payload: DraftPayload) {
        // Send failure means the reconciler task is gone; nothing to do.
        let _ = self.tx.send(payload);
    }
}

struct Reconciler {
    store: Arc<dyn DraftStore>,
    owner: OwnerContext,
    last_saved: Value,
}

async fn run(
    store: Arc<dyn DraftStore>,
    owner: OwnerContext,
    debounce: Duration,
    baseline: Value,
    mut rx: mpsc::UnboundedReceiver<DraftPayload>,
) {
    let mut reconciler = Reconciler {
        store,
        owner,
        last_saved: baseline,
    };
    let mut pending: Option<DraftPayload> = None;
    let mut deadline = Instant::now();

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(payload) => {
                    if payload.snapshot == reconciler.last_saved {
                        // Back to the persisted state; drop any pending save.
                        pending = None;
                        continue;
                    }
                    // Trailing-edge debounce: every change restarts the window.
                    pending = Some(payload);
                    deadline = Instant::now() + debounce;
                }
                None => {
                    if let Some(payload) = pending.take() {
                        reconciler.flush(payload).await;
                    }
                    break;
                }
            },
            _ = sleep_until(deadline), if pending.is_some() => {
                if let Some(payload) = pending.take() {
                    // Flushes run inline in this task, so at most one
                    // persistence call is ever in flight and a slow write
                    // cannot overlap the next one.
                    reconciler.flush(payload).await;
                }
            }
        }
    }
}

impl Reconciler {
    async fn flush(&mut self, payload: DraftPayload) {
        // Empty string is the stored form of "no client yet"; the same key is
        // used for lookup and insert so the row converges instead of
        // duplicating.
        let client_name = payload.client_name.clone().unwrap_or_default();

        let outcome: Result<(), DatabaseError> = async {
            match self
                .store
                .find_draft(self.owner.owner_id, &client_name)
                .await?
            {
                Some(draft) => {
                    self.store.update_draft(draft.id, &payload.document).await?;
                }
                None => {
                    self.store
                        .insert_draft(NewEstimateDraft {
                            owner_id: self.owner.owner_id,
                            client_name: client_name.clone(),
                            document: payload.document.clone(),
                        })
                        .await?;
                }
            }
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => {
                debug!(owner = %self.owner.owner_id, "auto-saved draft");
                self.last_saved = payload.snapshot;
            }
            Err(e) => {
                // Not surfaced to the user; last_saved stays stale so the
                // next changed snapshot schedules the write again.
                warn!(owner = %self.owner.owner_id, "auto-save failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::types::EstimateDraft;
    use async_trait::async_trait;
    use chrono::Utc;
    use serial_test::serial;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct InMemoryStore {
        drafts: Mutex<Vec<EstimateDraft>>,
        inserts: AtomicUsize,
        updates: AtomicUsize,
        fail_next: AtomicUsize,
    }

    impl InMemoryStore {
        fn failing_once() -> Self {
            let store = Self::default();
            store.fail_next.store(1, Ordering::SeqCst);
            store
        }

        fn take_failure(&self) -> bool {
            self.fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    if n > 0 {
                        Some(n - 1)
                    } else {
                        None
                    }
                })
                .is_ok()
        }
    }

    #[async_trait]
    impl DraftStore for InMemoryStore {
        async fn find_draft(
            &self,
            owner_id: Uuid,
            client_name: &str,
        ) -> Result<Option<EstimateDraft>, DatabaseError> {
            let drafts = self.drafts.lock().unwrap();
            // PostgREST's eq filter never matches a NULL column, so a None
            // client_name must not compare equal to an empty lookup string.
            Ok(drafts
                .iter()
                .find(|d| d.owner_id == owner_id && d.client_name.as_deref() == Some(client_name))
                .cloned())
        }

        async fn get_draft(&self, id: Uuid) -> Result<Option<EstimateDraft>, DatabaseError> {
            let drafts = self.drafts.lock().unwrap();
            Ok(drafts.iter().find(|d| d.id == id).cloned())
        }

        async fn list_drafts(&self, owner_id: Uuid) -> Result<Vec<EstimateDraft>, DatabaseError> {
            let drafts = self.drafts.lock().unwrap();
            Ok(drafts
                .iter()
                .filter(|d| d.owner_id == owner_id)
                .cloned()
                .collect())
        }

        async fn insert_draft(&self, draft: NewEstimateDraft) -> Result<Uuid, DatabaseError> {
            if self.take_failure() {
                return Err(DatabaseError::QueryError("injected failure".to_string()));
            }
            self.inserts.fetch_add(1, Ordering::SeqCst);
            let id = Uuid::new_v4();
            self.drafts.lock().unwrap().push(EstimateDraft {
                id,
                owner_id: draft.owner_id,
                client_name: Some(draft.client_name),
                document: draft.document,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            });
            Ok(id)
        }

        async fn update_draft(
            &self,
            id: Uuid,
            document: &Value,
        ) -> Result<(), DatabaseError> {
            if self.take_failure() {
                return Err(DatabaseError::QueryError("injected failure".to_string()));
            }
            self.updates.fetch_add(1, Ordering::SeqCst);
            let mut drafts = self.drafts.lock().unwrap();
            let draft = drafts
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or(DatabaseError::DraftNotFound)?;
            draft.document = document.clone();
            draft.updated_at = Utc::now();
            Ok(())
        }
    }

    fn payload(revision: u32) -> DraftPayload {
        DraftPayload {
            snapshot: json!({ "revision": revision }),
            document: json!({ "revision": revision, "material_costs": { "items": [] } }),
            client_name: Some("Acme Renovations".to_string()),
        }
    }

    const DEBOUNCE: Duration = Duration::from_millis(50);

    #[tokio::test]
    #[serial]
    async fn test_rapid_changes_coalesce_into_one_write() {
        let store = Arc::new(InMemoryStore::default());
        let autosave = AutoSave::spawn(
            store.clone(),
            OwnerContext::new(Uuid::new_v4()),
            DEBOUNCE,
            json!({ "revision": 0 }),
        );

        autosave.notify(payload(1));
        autosave.notify(payload(2));
        autosave.notify(payload(3));
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
        let drafts = store.drafts.lock().unwrap();
        assert_eq!(drafts[0].document["revision"], 3);
    }

    #[tokio::test]
    #[serial]
    async fn test_unchanged_snapshot_is_not_persisted() {
        let store = Arc::new(InMemoryStore::default());
        let autosave = AutoSave::spawn(
            store.clone(),
            OwnerContext::new(Uuid::new_v4()),
            DEBOUNCE,
            json!({ "revision": 0 }),
        );

        // Same snapshot as the baseline: a fresh session must not write.
        autosave.notify(DraftPayload {
            snapshot: json!({ "revision": 0 }),
            document: json!({}),
            client_name: None,
        });
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
        assert_eq!(store.updates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[serial]
    async fn test_existing_draft_is_updated_not_duplicated() {
        let store = Arc::new(InMemoryStore::default());
        let owner = OwnerContext::new(Uuid::new_v4());
        store
            .insert_draft(NewEstimateDraft {
                owner_id: owner.owner_id,
                client_name: "Acme Renovations".to_string(),
                document: json!({ "revision": 0 }),
            })
            .await
            .unwrap();

        let autosave = AutoSave::spawn(store.clone(), owner, DEBOUNCE, json!({ "revision": 0 }));
        autosave.notify(payload(1));
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(store.inserts.load(Ordering::SeqCst), 1); // the seed only
        assert_eq!(store.updates.load(Ordering::SeqCst), 1);
        assert_eq!(store.drafts.lock().unwrap().len(), 1);
    }

    fn clientless_payload(revision: u32) -> DraftPayload {
        DraftPayload {
            snapshot: json!({ "revision": revision }),
            document: json!({ "revision": revision, "material_costs": { "items": [] } }),
            client_name: None,
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_clientless_draft_converges_to_one_row() {
        let store = Arc::new(InMemoryStore::default());
        let owner = OwnerContext::new(Uuid::new_v4());
        // A legacy row with a NULL client_name must stay untouched; the
        // reconciler keys clientless drafts on the empty string.
        store.drafts.lock().unwrap().push(EstimateDraft {
            id: Uuid::new_v4(),
            owner_id: owner.owner_id,
            client_name: None,
            document: json!({ "legacy": true }),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });

        let autosave = AutoSave::spawn(store.clone(), owner, DEBOUNCE, json!({ "revision": 0 }));
        autosave.notify(clientless_payload(1));
        tokio::time::sleep(Duration::from_millis(300)).await;
        autosave.notify(clientless_payload(2));
        tokio::time::sleep(Duration::from_millis(300)).await;

        // One insert for the empty-string row, then an update of that same
        // row; no duplicate per flush.
        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
        assert_eq!(store.updates.load(Ordering::SeqCst), 1);
        let drafts = store.drafts.lock().unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].document["legacy"], true);
        assert_eq!(drafts[1].client_name.as_deref(), Some(""));
        assert_eq!(drafts[1].document["revision"], 2);
    }

    #[tokio::test]
    #[serial]
    async fn test_failure_is_swallowed_and_next_change_retries() {
        let store = Arc::new(InMemoryStore::failing_once());
        let autosave = AutoSave::spawn(
            store.clone(),
            OwnerContext::new(Uuid::new_v4()),
            DEBOUNCE,
            json!({ "revision": 0 }),
        );

        autosave.notify(payload(1));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(store.drafts.lock().unwrap().len(), 0);

        // The failed snapshot was not recorded as saved, so the next change
        // (even re-sending the same state) schedules persistence again.
        autosave.notify(payload(1));
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
        assert_eq!(store.drafts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    #[serial]
    async fn test_pending_change_flushes_on_session_close() {
        let store = Arc::new(InMemoryStore::default());
        let autosave = AutoSave::spawn(
            store.clone(),
            OwnerContext::new(Uuid::new_v4()),
            Duration::from_secs(3600),
            json!({ "revision": 0 }),
        );

        autosave.notify(payload(1));
        drop(autosave);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
    }
}
