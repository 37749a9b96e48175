//! # redb-backed Record Store
//!
//! The embedded database behind QDMS. Every entity is postcard-encoded
//! into a redb table keyed by id; quality records share one generic
//! table keyed `(collection, id)` so new record families need no schema
//! work. Auto-number counters live in their own table and are bumped
//! inside the same write transaction as the insert they number.

use crate::document::Document;
use crate::folder::{Folder, generate_code};
use crate::notify::Notification;
use crate::rbac::{Role, User};
use crate::records::record_code;
use crate::types::{QdmsError, Timestamp};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::path::Path;

/// Table for users: user id -> serialized User bytes
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Table for roles: normalized role name -> serialized Role bytes
const ROLES: TableDefinition<&str, &[u8]> = TableDefinition::new("roles");

/// Table for folders: folder id -> serialized Folder bytes
const FOLDERS: TableDefinition<&str, &[u8]> = TableDefinition::new("folders");

/// Table for documents: document id -> serialized Document bytes
const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

/// Generic quality-record table: (collection, id) -> serialized bytes.
/// Collections: complaints, capas, audits, risks, devices, work_orders.
const RECORDS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("records");

/// Table for notifications: notification id -> serialized bytes
const NOTIFICATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("notifications");

/// Table for attachment metadata: file id -> serialized FileMeta bytes
const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Table for attachment payloads: file id -> raw bytes
const FILE_BLOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("file_blobs");

/// Auto-number counters: "collection:year" -> last issued sequence
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

// =============================================================================
// ATTACHMENT METADATA
// =============================================================================

/// Metadata for an uploaded attachment; the payload lives in `FILE_BLOBS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub id: String,
    pub original_filename: String,
    pub mime_type: String,
    pub file_size: u64,
    pub uploaded_by: String,
    pub uploaded_at: Timestamp,
    /// Record family the file is linked to, e.g. "documents" or "capas".
    #[serde(default)]
    pub module_type: Option<String>,
    #[serde(default)]
    pub module_id: Option<String>,
}

// =============================================================================
// STORE
// =============================================================================

/// The embedded QDMS record store.
pub struct Store {
    db: Database,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

fn io_err(e: impl std::fmt::Display) -> QdmsError {
    QdmsError::IoError(e.to_string())
}

fn ser_err(e: impl std::fmt::Display) -> QdmsError {
    QdmsError::SerializationError(e.to_string())
}

impl Store {
    /// Open or create the store at the given path. All tables are created
    /// up front so later reads never race table creation.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QdmsError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(USERS).map_err(io_err)?;
            let _ = write_txn.open_table(ROLES).map_err(io_err)?;
            let _ = write_txn.open_table(FOLDERS).map_err(io_err)?;
            let _ = write_txn.open_table(DOCUMENTS).map_err(io_err)?;
            let _ = write_txn.open_table(RECORDS).map_err(io_err)?;
            let _ = write_txn.open_table(NOTIFICATIONS).map_err(io_err)?;
            let _ = write_txn.open_table(FILES).map_err(io_err)?;
            let _ = write_txn.open_table(FILE_BLOBS).map_err(io_err)?;
            let _ = write_txn.open_table(COUNTERS).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }
        Ok(Self { db })
    }

    // =========================================================================
    // GENERIC KEYED ACCESS
    // =========================================================================

    fn put_keyed<T: Serialize>(
        &self,
        table: TableDefinition<&'static str, &'static [u8]>,
        key: &str,
        value: &T,
    ) -> Result<(), QdmsError> {
        let bytes = postcard::to_allocvec(value).map_err(ser_err)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut t = write_txn.open_table(table).map_err(io_err)?;
            t.insert(key, bytes.as_slice()).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn get_keyed<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&'static str, &'static [u8]>,
        key: &str,
    ) -> Result<Option<T>, QdmsError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let t = read_txn.open_table(table).map_err(io_err)?;
        match t.get(key).map_err(io_err)? {
            Some(data) => Ok(Some(postcard::from_bytes(data.value()).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    fn delete_keyed(
        &self,
        table: TableDefinition<&'static str, &'static [u8]>,
        key: &str,
    ) -> Result<bool, QdmsError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let removed = {
            let mut t = write_txn.open_table(table).map_err(io_err)?;
            t.remove(key).map_err(io_err)?.is_some()
        };
        write_txn.commit().map_err(io_err)?;
        Ok(removed)
    }

    fn list_keyed<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&'static str, &'static [u8]>,
    ) -> Result<Vec<T>, QdmsError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let t = read_txn.open_table(table).map_err(io_err)?;
        let mut out = Vec::new();
        for entry in t.iter().map_err(io_err)? {
            let (_, data) = entry.map_err(io_err)?;
            out.push(postcard::from_bytes(data.value()).map_err(ser_err)?);
        }
        Ok(out)
    }

    // =========================================================================
    // USERS & ROLES
    // =========================================================================

    pub fn put_user(&self, user: &User) -> Result<(), QdmsError> {
        self.put_keyed(USERS, &user.id, user)
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>, QdmsError> {
        self.get_keyed(USERS, id)
    }

    pub fn list_users(&self) -> Result<Vec<User>, QdmsError> {
        self.list_keyed(USERS)
    }

    /// Linear scan; the user table is small and login is rare.
    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>, QdmsError> {
        let needle = username.trim().to_lowercase();
        Ok(self
            .list_users()?
            .into_iter()
            .find(|u| u.username.trim().to_lowercase() == needle))
    }

    pub fn put_role(&self, role: &Role) -> Result<(), QdmsError> {
        self.put_keyed(ROLES, &role.name.trim().to_lowercase(), role)
    }

    pub fn get_role(&self, name: &str) -> Result<Option<Role>, QdmsError> {
        self.get_keyed(ROLES, &name.trim().to_lowercase())
    }

    pub fn list_roles(&self) -> Result<Vec<Role>, QdmsError> {
        self.list_keyed(ROLES)
    }

    pub fn delete_role(&self, name: &str) -> Result<bool, QdmsError> {
        self.delete_keyed(ROLES, &name.trim().to_lowercase())
    }

    // =========================================================================
    // FOLDERS & DOCUMENTS
    // =========================================================================

    pub fn put_folder(&self, folder: &Folder) -> Result<(), QdmsError> {
        self.put_keyed(FOLDERS, &folder.id, folder)
    }

    pub fn get_folder(&self, id: &str) -> Result<Option<Folder>, QdmsError> {
        self.get_keyed(FOLDERS, id)
    }

    pub fn list_folders(&self) -> Result<Vec<Folder>, QdmsError> {
        self.list_keyed(FOLDERS)
    }

    pub fn delete_folder(&self, id: &str) -> Result<bool, QdmsError> {
        self.delete_keyed(FOLDERS, id)
    }

    pub fn put_document(&self, document: &Document) -> Result<(), QdmsError> {
        self.put_keyed(DOCUMENTS, &document.id, document)
    }

    pub fn get_document(&self, id: &str) -> Result<Option<Document>, QdmsError> {
        self.get_keyed(DOCUMENTS, id)
    }

    pub fn list_documents(&self) -> Result<Vec<Document>, QdmsError> {
        self.list_keyed(DOCUMENTS)
    }

    pub fn delete_document(&self, id: &str) -> Result<bool, QdmsError> {
        self.delete_keyed(DOCUMENTS, id)
    }

    /// Insert a document with a code generated from the folder's pattern.
    ///
    /// The folder's sequence bump and the document insert commit in one
    /// transaction, so two concurrent creates can never share a code.
    /// Returns the stored document and the updated folder.
    pub fn insert_document_with_code(
        &self,
        folder: &Folder,
        mut document: Document,
    ) -> Result<(Document, Folder), QdmsError> {
        let mut folder = folder.clone();
        let next_seq = folder.auto_code_seq.saturating_add(1);
        document.code = generate_code(
            &folder,
            &document.document_type,
            next_seq,
            document.created_at,
        );
        folder.auto_code_seq = next_seq;
        folder.updated_at = document.created_at;

        let folder_bytes = postcard::to_allocvec(&folder).map_err(ser_err)?;
        let doc_bytes = postcard::to_allocvec(&document).map_err(ser_err)?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut folders = write_txn.open_table(FOLDERS).map_err(io_err)?;
            folders
                .insert(folder.id.as_str(), folder_bytes.as_slice())
                .map_err(io_err)?;
            let mut documents = write_txn.open_table(DOCUMENTS).map_err(io_err)?;
            documents
                .insert(document.id.as_str(), doc_bytes.as_slice())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok((document, folder))
    }

    // =========================================================================
    // QUALITY RECORDS (generic, keyed by collection)
    // =========================================================================

    pub fn put_record<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        record: &T,
    ) -> Result<(), QdmsError> {
        let bytes = postcard::to_allocvec(record).map_err(ser_err)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut t = write_txn.open_table(RECORDS).map_err(io_err)?;
            t.insert((collection, id), bytes.as_slice()).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    pub fn get_record<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>, QdmsError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let t = read_txn.open_table(RECORDS).map_err(io_err)?;
        match t.get((collection, id)).map_err(io_err)? {
            Some(data) => Ok(Some(postcard::from_bytes(data.value()).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    pub fn list_records<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>, QdmsError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let t = read_txn.open_table(RECORDS).map_err(io_err)?;
        let mut out = Vec::new();
        // Ids are uuid strings, so "\u{10ffff}" upper-bounds the collection.
        for entry in t
            .range((collection, "")..=(collection, "\u{10ffff}"))
            .map_err(io_err)?
        {
            let (_, data) = entry.map_err(io_err)?;
            out.push(postcard::from_bytes(data.value()).map_err(ser_err)?);
        }
        Ok(out)
    }

    pub fn delete_record(&self, collection: &str, id: &str) -> Result<bool, QdmsError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let removed = {
            let mut t = write_txn.open_table(RECORDS).map_err(io_err)?;
            t.remove((collection, id)).map_err(io_err)?.is_some()
        };
        write_txn.commit().map_err(io_err)?;
        Ok(removed)
    }

    /// Issue the next auto-number for a collection, e.g. `CAPA-2026-0007`.
    /// Counters are per collection and year, bumped atomically.
    pub fn next_code(&self, collection: &str, prefix: &str, year: i32) -> Result<String, QdmsError> {
        let key = format!("{collection}:{year}");
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let seq = {
            let mut t = write_txn.open_table(COUNTERS).map_err(io_err)?;
            let current = t
                .get(key.as_str())
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            let next = current.saturating_add(1);
            t.insert(key.as_str(), next).map_err(io_err)?;
            next
        };
        write_txn.commit().map_err(io_err)?;
        Ok(record_code(prefix, year, seq))
    }

    // =========================================================================
    // NOTIFICATIONS
    // =========================================================================

    pub fn put_notification(&self, notification: &Notification) -> Result<(), QdmsError> {
        self.put_keyed(NOTIFICATIONS, &notification.id, notification)
    }

    /// Store a batch of notifications in one transaction.
    pub fn put_notifications(&self, batch: &[Notification]) -> Result<(), QdmsError> {
        if batch.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut t = write_txn.open_table(NOTIFICATIONS).map_err(io_err)?;
            for notification in batch {
                let bytes = postcard::to_allocvec(notification).map_err(ser_err)?;
                t.insert(notification.id.as_str(), bytes.as_slice())
                    .map_err(io_err)?;
            }
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    pub fn get_notification(&self, id: &str) -> Result<Option<Notification>, QdmsError> {
        self.get_keyed(NOTIFICATIONS, id)
    }

    pub fn list_notifications_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Notification>, QdmsError> {
        let mut out: Vec<Notification> = self
            .list_keyed::<Notification>(NOTIFICATIONS)?
            .into_iter()
            .filter(|n| n.user_id == user_id)
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    // =========================================================================
    // ATTACHMENTS
    // =========================================================================

    /// Store metadata and payload together in one transaction.
    pub fn put_file(&self, meta: &FileMeta, bytes: &[u8]) -> Result<(), QdmsError> {
        let meta_bytes = postcard::to_allocvec(meta).map_err(ser_err)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut files = write_txn.open_table(FILES).map_err(io_err)?;
            files
                .insert(meta.id.as_str(), meta_bytes.as_slice())
                .map_err(io_err)?;
            let mut blobs = write_txn.open_table(FILE_BLOBS).map_err(io_err)?;
            blobs.insert(meta.id.as_str(), bytes).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    pub fn get_file_meta(&self, id: &str) -> Result<Option<FileMeta>, QdmsError> {
        self.get_keyed(FILES, id)
    }

    /// Update metadata only, e.g. after linking the file to a record.
    pub fn put_file_meta(&self, meta: &FileMeta) -> Result<(), QdmsError> {
        self.put_keyed(FILES, &meta.id, meta)
    }

    pub fn get_file(&self, id: &str) -> Result<Option<(FileMeta, Vec<u8>)>, QdmsError> {
        let Some(meta) = self.get_file_meta(id)? else {
            return Ok(None);
        };
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let blobs = read_txn.open_table(FILE_BLOBS).map_err(io_err)?;
        let bytes = blobs
            .get(id)
            .map_err(io_err)?
            .map(|data| data.value().to_vec())
            .unwrap_or_default();
        Ok(Some((meta, bytes)))
    }

    pub fn delete_file(&self, id: &str) -> Result<bool, QdmsError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let removed = {
            let mut files = write_txn.open_table(FILES).map_err(io_err)?;
            let removed = files.remove(id).map_err(io_err)?.is_some();
            let mut blobs = write_txn.open_table(FILE_BLOBS).map_err(io_err)?;
            let _ = blobs.remove(id).map_err(io_err)?;
            removed
        };
        write_txn.commit().map_err(io_err)?;
        Ok(removed)
    }

    // =========================================================================
    // STATUS
    // =========================================================================

    /// Row counts per table, plus per-collection record counts. Used by
    /// the CLI `status` command and the dashboard.
    pub fn collection_counts(&self) -> Result<BTreeMap<String, u64>, QdmsError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let mut counts = BTreeMap::new();

        let fixed: [(&str, TableDefinition<&str, &[u8]>); 6] = [
            ("users", USERS),
            ("roles", ROLES),
            ("folders", FOLDERS),
            ("documents", DOCUMENTS),
            ("notifications", NOTIFICATIONS),
            ("files", FILES),
        ];
        for (name, table) in fixed {
            let t = read_txn.open_table(table).map_err(io_err)?;
            counts.insert(name.to_string(), t.len().map_err(io_err)?);
        }

        let records = read_txn.open_table(RECORDS).map_err(io_err)?;
        for entry in records.iter().map_err(io_err)? {
            let (key, _) = entry.map_err(io_err)?;
            let (collection, _) = key.value();
            *counts.entry(collection.to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::records::Complaint;
    use chrono::Utc;
    use tempfile::tempdir;

    fn user(id: &str, username: &str) -> User {
        User {
            id: id.to_string(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            full_name: username.to_string(),
            role: "user".to_string(),
            roles: vec![],
            department: "QA".to_string(),
            groups: vec![],
            permissions: vec![],
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn folder(id: &str) -> Folder {
        let now = Utc::now();
        Folder {
            id: id.to_string(),
            name: "Quality Manual".to_string(),
            code_prefix: Some("QM".to_string()),
            department: None,
            description: None,
            parent_id: None,
            auto_code_pattern: "{PREFIX}-{TYPE}-{SEQ:000}".to_string(),
            auto_code_seq: 0,
            permissions: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    fn document(id: &str, folder_id: &str) -> Document {
        let now = Utc::now();
        Document {
            id: id.to_string(),
            folder_id: folder_id.to_string(),
            code: String::new(),
            title: "SOP".to_string(),
            description: None,
            document_type: "SOP".to_string(),
            department: None,
            status: crate::types::DocumentStatus::Draft,
            author_id: "u1".to_string(),
            version: "1.0".to_string(),
            tags: vec![],
            distribution_list: vec![],
            approval_matrix: vec![],
            read_receipts: vec![],
            status_history: vec![],
            version_history: vec![],
            current_version_id: None,
            review_date: None,
            expiry_date: None,
            published_at: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn user_roundtrip_and_username_lookup() {
        let temp = tempdir().expect("temp dir");
        let store = Store::open(temp.path().join("qdms.redb")).expect("open");

        store.put_user(&user("u1", "Alice")).expect("put");
        let found = store.get_user("u1").expect("get");
        assert_eq!(found.map(|u| u.username), Some("Alice".to_string()));

        let by_name = store.find_user_by_username("  alice ").expect("find");
        assert_eq!(by_name.map(|u| u.id), Some("u1".to_string()));
        assert!(store.find_user_by_username("bob").expect("find").is_none());
    }

    #[test]
    fn role_keys_are_normalized() {
        let temp = tempdir().expect("temp dir");
        let store = Store::open(temp.path().join("qdms.redb")).expect("open");

        let now = Utc::now();
        let role = Role {
            name: "QA Manager".to_string(),
            description: None,
            permissions: vec!["doc.document.read".to_string()],
            created_at: now,
            updated_at: now,
        };
        store.put_role(&role).expect("put");
        assert!(store.get_role("qa manager").expect("get").is_some());
        assert!(store.delete_role("QA MANAGER").expect("delete"));
        assert!(store.get_role("qa manager").expect("get").is_none());
    }

    #[test]
    fn document_code_issued_atomically_with_folder_seq() {
        let temp = tempdir().expect("temp dir");
        let store = Store::open(temp.path().join("qdms.redb")).expect("open");

        let f = folder("f1");
        store.put_folder(&f).expect("put folder");

        let (d1, f) = store
            .insert_document_with_code(&f, document("d1", "f1"))
            .expect("insert");
        assert_eq!(d1.code, "QM-SOP-001");
        assert_eq!(f.auto_code_seq, 1);

        let (d2, f) = store
            .insert_document_with_code(&f, document("d2", "f1"))
            .expect("insert");
        assert_eq!(d2.code, "QM-SOP-002");
        assert_eq!(f.auto_code_seq, 2);

        // Both visible after reload
        assert_eq!(store.list_documents().expect("list").len(), 2);
        let reloaded = store.get_folder("f1").expect("get").expect("folder");
        assert_eq!(reloaded.auto_code_seq, 2);
    }

    fn complaint(id: &str) -> Complaint {
        let now = Utc::now();
        Complaint {
            id: id.to_string(),
            complaint_no: "COMP-2026-0001".to_string(),
            title: "Late delivery".to_string(),
            description: None,
            customer_name: "Acme".to_string(),
            category_id: None,
            severity: None,
            status: "open".to_string(),
            assigned_to: None,
            investigation_notes: None,
            resolution: None,
            linked_capa_ids: vec![],
            file_attachments: vec![],
            status_history: vec![],
            created_by: "u1".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn records_scoped_by_collection() {
        let temp = tempdir().expect("temp dir");
        let store = Store::open(temp.path().join("qdms.redb")).expect("open");

        store
            .put_record("complaints", "c1", &complaint("c1"))
            .expect("put");

        let listed: Vec<Complaint> = store.list_records("complaints").expect("list");
        assert_eq!(listed.len(), 1);
        let empty: Vec<Complaint> = store.list_records("capas").expect("list");
        assert!(empty.is_empty());

        assert!(store.delete_record("complaints", "c1").expect("delete"));
        assert!(!store.delete_record("complaints", "c1").expect("delete"));
    }

    #[test]
    fn counters_monotonic_and_survive_reopen() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("qdms.redb");

        {
            let store = Store::open(&path).expect("open");
            assert_eq!(store.next_code("capas", "CAPA", 2026).expect("code"), "CAPA-2026-0001");
            assert_eq!(store.next_code("capas", "CAPA", 2026).expect("code"), "CAPA-2026-0002");
            // Independent per collection and year
            assert_eq!(store.next_code("capas", "CAPA", 2027).expect("code"), "CAPA-2027-0001");
            assert_eq!(
                store.next_code("complaints", "COMP", 2026).expect("code"),
                "COMP-2026-0001"
            );
        }

        {
            let store = Store::open(&path).expect("reopen");
            assert_eq!(store.next_code("capas", "CAPA", 2026).expect("code"), "CAPA-2026-0003");
        }
    }

    #[test]
    fn notifications_filtered_per_user() {
        let temp = tempdir().expect("temp dir");
        let store = Store::open(temp.path().join("qdms.redb")).expect("open");

        let now = Utc::now();
        let batch = vec![
            Notification::new("u1", "a", "m", crate::types::NotificationKind::Info, now),
            Notification::new("u2", "b", "m", crate::types::NotificationKind::Info, now),
            Notification::new("u1", "c", "m", crate::types::NotificationKind::Warning, now),
        ];
        store.put_notifications(&batch).expect("put");

        let for_u1 = store.list_notifications_for_user("u1").expect("list");
        assert_eq!(for_u1.len(), 2);
        let for_u3 = store.list_notifications_for_user("u3").expect("list");
        assert!(for_u3.is_empty());
    }

    #[test]
    fn file_payload_roundtrip_and_delete() {
        let temp = tempdir().expect("temp dir");
        let store = Store::open(temp.path().join("qdms.redb")).expect("open");

        let meta = FileMeta {
            id: "f1".to_string(),
            original_filename: "sop.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            file_size: 4,
            uploaded_by: "u1".to_string(),
            uploaded_at: Utc::now(),
            module_type: None,
            module_id: None,
        };
        store.put_file(&meta, b"%PDF").expect("put");

        let (got_meta, bytes) = store.get_file("f1").expect("get").expect("present");
        assert_eq!(got_meta, meta);
        assert_eq!(bytes, b"%PDF");

        assert!(store.delete_file("f1").expect("delete"));
        assert!(store.get_file("f1").expect("get").is_none());
        assert!(!store.delete_file("f1").expect("delete"));
    }

    #[test]
    fn collection_counts_cover_fixed_and_record_tables() {
        let temp = tempdir().expect("temp dir");
        let store = Store::open(temp.path().join("qdms.redb")).expect("open");

        store.put_user(&user("u1", "alice")).expect("put");
        store.put_folder(&folder("f1")).expect("put");
        store.put_record("capas", "c1", &complaint("c1")).expect("put");
        store.put_record("capas", "c2", &complaint("c2")).expect("put");

        let counts = store.collection_counts().expect("counts");
        assert_eq!(counts.get("users"), Some(&1));
        assert_eq!(counts.get("folders"), Some(&1));
        assert_eq!(counts.get("documents"), Some(&0));
        assert_eq!(counts.get("capas"), Some(&2));
    }
}
