//! Contact store with a single-writer actor.
//!
//! The backing store holds the entire collection as one value, so every
//! mutation is a load-mutate-save cycle. Mutations are sent over an
//! [`mpsc`] channel to one actor task which applies them strictly one at a
//! time; two concurrent mutations can never interleave their read and write
//! halves. Reads go straight to the key-value store.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::kv::KeyValueStore;
use super::{validate_new_contact, validate_phone_field};
use super::{Contact, ContactError, ContactPatch, HistoryEntry, NewContact};

/// Writer channel capacity — bounded to provide backpressure.
const WRITER_CHANNEL_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, ContactError>>;

/// Mutations handled by the writer actor.
#[derive(Debug)]
enum WriteOp {
    Create {
        fields: NewContact,
        reply: Reply<Contact>,
    },
    Update {
        id: String,
        patch: ContactPatch,
        reply: Reply<Contact>,
    },
    Delete {
        id: String,
        reply: Reply<bool>,
    },
    AppendHistory {
        id: String,
        entry: HistoryEntry,
        reply: Reply<()>,
    },
}

/// Persisted collection of trusted contacts.
pub struct ContactStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    writer_tx: mpsc::Sender<WriteOp>,
    writer_handle: JoinHandle<()>,
}

impl std::fmt::Debug for ContactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContactStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl ContactStore {
    /// Create a store persisting under `key` and spawn its writer actor.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let (writer_tx, writer_rx) = mpsc::channel(WRITER_CHANNEL_CAPACITY);
        let writer_handle = tokio::spawn(run_writer(Arc::clone(&kv), key.clone(), writer_rx));
        info!(key = %key, "contact store initialised");
        Self {
            kv,
            key,
            writer_tx,
            writer_handle,
        }
    }

    /// All contacts in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`ContactError::Storage`] or [`ContactError::Corrupt`] if the
    /// collection cannot be loaded.
    pub async fn list(&self) -> Result<Vec<Contact>, ContactError> {
        load(self.kv.as_ref(), &self.key).await
    }

    /// Look up a single contact.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be loaded.
    pub async fn get(&self, id: &str) -> Result<Option<Contact>, ContactError> {
        Ok(self.list().await?.into_iter().find(|c| c.id == id))
    }

    /// Create a contact with a fresh id and an empty history.
    ///
    /// # Errors
    ///
    /// Returns [`ContactError::Invalid`] if the fields fail validation.
    pub async fn create(&self, fields: NewContact) -> Result<Contact, ContactError> {
        validate_new_contact(&fields)?;
        self.submit(|reply| WriteOp::Create { fields, reply }).await
    }

    /// Apply a partial update to an existing contact.
    ///
    /// # Errors
    ///
    /// Returns [`ContactError::NotFound`] if no contact has `id`.
    pub async fn update(&self, id: &str, patch: ContactPatch) -> Result<Contact, ContactError> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(ContactError::Invalid("name must not be empty".to_owned()));
            }
        }
        if let Some(phone) = &patch.phone {
            validate_phone_field(phone)?;
        }
        let id = id.to_owned();
        self.submit(|reply| WriteOp::Update { id, patch, reply })
            .await
    }

    /// Delete a contact. Returns whether a contact was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be loaded or saved.
    pub async fn delete(&self, id: &str) -> Result<bool, ContactError> {
        let id = id.to_owned();
        self.submit(|reply| WriteOp::Delete { id, reply }).await
    }

    /// Prepend a history entry to a contact's history.
    ///
    /// # Errors
    ///
    /// Returns [`ContactError::NotFound`] if no contact has `id`; the
    /// persisted collection is left untouched in that case.
    pub async fn append_history(&self, id: &str, entry: HistoryEntry) -> Result<(), ContactError> {
        let id = id.to_owned();
        self.submit(|reply| WriteOp::AppendHistory { id, entry, reply })
            .await
    }

    /// Stop accepting writes and wait for queued writes to finish.
    pub async fn shutdown(self) {
        drop(self.writer_tx);
        if let Err(e) = self.writer_handle.await {
            warn!(error = %e, "contact writer task failed");
        }
    }

    async fn submit<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> WriteOp,
    ) -> Result<T, ContactError> {
        let (reply, rx) = oneshot::channel();
        self.writer_tx
            .send(build(reply))
            .await
            .map_err(|_| ContactError::WriterClosed)?;
        rx.await.map_err(|_| ContactError::WriterClosed)?
    }
}

// ---------------------------------------------------------------------------
// Writer actor
// ---------------------------------------------------------------------------

/// Run the single-writer actor loop until every sender is dropped.
async fn run_writer(kv: Arc<dyn KeyValueStore>, key: String, mut rx: mpsc::Receiver<WriteOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Create { fields, reply } => {
                let _ = reply.send(create(kv.as_ref(), &key, fields).await);
            }
            WriteOp::Update { id, patch, reply } => {
                let _ = reply.send(update(kv.as_ref(), &key, &id, patch).await);
            }
            WriteOp::Delete { id, reply } => {
                let _ = reply.send(delete(kv.as_ref(), &key, &id).await);
            }
            WriteOp::AppendHistory { id, entry, reply } => {
                let _ = reply.send(append_history(kv.as_ref(), &key, &id, entry).await);
            }
        }
    }
    trace!("contact writer actor stopped");
}

async fn load(kv: &dyn KeyValueStore, key: &str) -> Result<Vec<Contact>, ContactError> {
    match kv.get(key).await? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(Vec::new()),
    }
}

async fn save(kv: &dyn KeyValueStore, key: &str, contacts: &[Contact]) -> Result<(), ContactError> {
    let raw = serde_json::to_string(contacts)?;
    kv.set(key, &raw).await?;
    Ok(())
}

async fn create(
    kv: &dyn KeyValueStore,
    key: &str,
    fields: NewContact,
) -> Result<Contact, ContactError> {
    let mut contacts = load(kv, key).await?;
    let contact = Contact {
        id: Uuid::new_v4().to_string(),
        name: fields.name.trim().to_owned(),
        phone: fields.phone.trim().to_owned(),
        email: fields.email,
        relationship: fields.relationship,
        notes: fields.notes,
        created_at: Utc::now(),
        updated_at: None,
        history: Vec::new(),
    };
    contacts.push(contact.clone());
    save(kv, key, &contacts).await?;
    debug!(contact_id = %contact.id, name = %contact.name, "contact created");
    Ok(contact)
}

async fn update(
    kv: &dyn KeyValueStore,
    key: &str,
    id: &str,
    patch: ContactPatch,
) -> Result<Contact, ContactError> {
    let mut contacts = load(kv, key).await?;
    let contact = contacts
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or_else(|| ContactError::NotFound(id.to_owned()))?;

    if let Some(name) = patch.name {
        contact.name = name.trim().to_owned();
    }
    if let Some(phone) = patch.phone {
        contact.phone = phone.trim().to_owned();
    }
    if patch.email.is_some() {
        contact.email = patch.email;
    }
    if patch.relationship.is_some() {
        contact.relationship = patch.relationship;
    }
    if patch.notes.is_some() {
        contact.notes = patch.notes;
    }
    contact.updated_at = Some(Utc::now());

    let updated = contact.clone();
    save(kv, key, &contacts).await?;
    debug!(contact_id = %id, "contact updated");
    Ok(updated)
}

async fn delete(kv: &dyn KeyValueStore, key: &str, id: &str) -> Result<bool, ContactError> {
    let mut contacts = load(kv, key).await?;
    let before = contacts.len();
    contacts.retain(|c| c.id != id);
    if contacts.len() == before {
        debug!(contact_id = %id, "delete of unknown contact ignored");
        return Ok(false);
    }
    save(kv, key, &contacts).await?;
    debug!(contact_id = %id, "contact deleted");
    Ok(true)
}

async fn append_history(
    kv: &dyn KeyValueStore,
    key: &str,
    id: &str,
    entry: HistoryEntry,
) -> Result<(), ContactError> {
    let mut contacts = load(kv, key).await?;
    let contact = contacts
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or_else(|| ContactError::NotFound(id.to_owned()))?;
    let kind = entry.kind.label();
    contact.history.insert(0, entry);
    save(kv, key, &contacts).await?;
    trace!(contact_id = %id, kind, "history entry appended");
    Ok(())
}
