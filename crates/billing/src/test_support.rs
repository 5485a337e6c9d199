//! In-memory fakes for the remote collaborators

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::{SyncError, SyncResult};
use crate::metadata::MetadataDocument;
use crate::providers::{BillingProvider, IdentityProvider};

/// Identity provider holding metadata documents in memory
#[derive(Default)]
pub struct FakeIdentity {
    documents: Mutex<HashMap<String, MetadataDocument>>,
    fetches: AtomicUsize,
    writes: AtomicUsize,
    fail_fetches: AtomicBool,
    fail_writes: AtomicBool,
    fetch_delay: Mutex<Option<Duration>>,
    gate: Mutex<Option<watch::Receiver<bool>>>,
}

/// Opens a gate created by [`FakeIdentity::hold_fetches`]
pub struct FetchGate {
    sender: watch::Sender<bool>,
}

impl FetchGate {
    pub fn release(&self) {
        let _ = self.sender.send(true);
    }
}

impl FakeIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep between reading and returning a document, widening the
    /// read-modify-write window
    pub fn with_fetch_delay(self, delay: Duration) -> Self {
        *self.fetch_delay.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
        self
    }

    pub fn set_document(&self, organization_id: &str, doc: MetadataDocument) {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(organization_id.to_string(), doc);
    }

    pub fn document(&self, organization_id: &str) -> MetadataDocument {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(organization_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Block every fetch until the returned gate is released
    pub fn hold_fetches(&self) -> FetchGate {
        let (sender, receiver) = watch::channel(false);
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(receiver);
        FetchGate { sender }
    }

    /// Wait until at least `count` fetches have started
    pub async fn wait_for_fetches(&self, count: usize) {
        while self.fetches() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn fetch_organization_metadata(
        &self,
        organization_id: &str,
    ) -> SyncResult<MetadataDocument> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let gate = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }

        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(SyncError::remote("identity", "fetch unavailable"));
        }

        let doc = self.document(organization_id);

        let delay = *self.fetch_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        Ok(doc)
    }

    async fn write_organization_metadata(
        &self,
        organization_id: &str,
        doc: &MetadataDocument,
    ) -> SyncResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::remote("identity", "write rejected"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.set_document(organization_id, doc.clone());
        Ok(())
    }
}

/// Billing provider handing out sequential customer ids
#[derive(Default)]
pub struct FakeBilling {
    created: Mutex<Vec<(String, String)>>,
    deleted: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl FakeBilling {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(name, organization_id)` for every customer created
    pub fn created(&self) -> Vec<(String, String)> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BillingProvider for FakeBilling {
    async fn create_customer_account(
        &self,
        name: &str,
        organization_id: &str,
    ) -> SyncResult<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::remote("billing", "customer create failed"));
        }
        let mut created = self.created.lock().unwrap_or_else(PoisonError::into_inner);
        created.push((name.to_string(), organization_id.to_string()));
        Ok(format!("cus_fake_{}", created.len()))
    }

    async fn delete_customer_account(&self, customer_id: &str) -> SyncResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::remote("billing", "customer delete failed"));
        }
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(customer_id.to_string());
        Ok(())
    }
}
