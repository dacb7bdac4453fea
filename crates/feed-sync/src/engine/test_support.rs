//! In-memory transport, credentials and scheduler plus an on-disk SQLite
//! store, wired into an engine for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use contactsync_core::contacts::{ContactEntry, Entry, EntryMeta, GroupEntry};
use contactsync_core::settings::{SettingsRepositoryTrait, SYNC_EVERYTHING};
use contactsync_core::sync::SyncConfig;
use contactsync_storage_sqlite::{
    create_pool, init, run_migrations, spawn_writer, ContactRepository, PhotoRepository,
    SettingsRepository, SyncStateRepository,
};
use tempfile::{tempdir, TempDir};

use super::{ContactsSyncEngine, CredentialStore, EnginePorts, FeedTransport, SyncRequester};
use crate::error::{FeedSyncError, Result};
use crate::types::{FeedItem, FeedPage, FeedQuery};

pub const ACCOUNT: &str = "a@x.com";
pub const ROOT: &str = "https://feeds.test/m8/feeds";
pub const LEGACY_TITLE: &str = "Starred in Android";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch {
        feed: String,
        updated_min: Option<String>,
        show_deleted: bool,
    },
    Create {
        url: String,
        entry: Entry,
    },
    Update {
        url: String,
        entry: Entry,
    },
    Delete {
        url: String,
    },
    GetMedia {
        url: String,
    },
    UpdateMedia {
        url: String,
        data: Vec<u8>,
    },
}

impl Call {
    pub fn url(&self) -> &str {
        match self {
            Call::Fetch { feed, .. } => feed,
            Call::Create { url, .. }
            | Call::Update { url, .. }
            | Call::Delete { url }
            | Call::GetMedia { url }
            | Call::UpdateMedia { url, .. } => url,
        }
    }
}

/// Scripted feed server. Feeds serve their entries in insertion order;
/// failures are queued per URL.
#[derive(Default)]
pub struct FakeTransport {
    feeds: Mutex<HashMap<String, Vec<FeedItem>>>,
    media: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, VecDeque<Option<u16>>>>,
    calls: Mutex<Vec<Call>>,
    next_id: Mutex<u32>,
    cancel_on_call: Mutex<Option<Arc<AtomicBool>>>,
}

impl FakeTransport {
    pub fn serve(&self, feed: &str, entries: Vec<Entry>) {
        let mut feeds = self.feeds.lock().unwrap();
        let items = feeds.entry(feed.to_string()).or_default();
        items.extend(entries.into_iter().map(FeedItem::Entry));
    }

    pub fn serve_malformed(&self, feed: &str, id: &str) {
        let mut feeds = self.feeds.lock().unwrap();
        feeds.entry(feed.to_string()).or_default().push(FeedItem::Malformed {
            id: Some(id.to_string()),
            error: "unknown variant `satellite`".to_string(),
        });
    }

    pub fn serve_media(&self, url: &str, body: Vec<u8>) {
        self.media.lock().unwrap().insert(url.to_string(), body);
    }

    /// Queues outcomes for the next calls to `url`: `Some(status)` fails,
    /// `None` lets the call through.
    pub fn script(&self, url: &str, outcomes: Vec<Option<u16>>) {
        self.failures
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// Raises `flag` while serving the next call, as a user cancelling
    /// mid-pass would.
    pub fn cancel_on_next_call(&self, flag: Arc<AtomicBool>) {
        *self.cancel_on_call.lock().unwrap() = Some(flag);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.url() == url)
            .collect()
    }

    fn record(&self, call: Call) -> Result<()> {
        let url = call.url().to_string();
        self.calls.lock().unwrap().push(call);
        if let Some(flag) = self.cancel_on_call.lock().unwrap().take() {
            flag.store(true, Ordering::SeqCst);
        }
        let scripted = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&url)
            .and_then(VecDeque::pop_front)
            .flatten();
        match scripted {
            Some(status) => Err(FeedSyncError::api(status, format!("scripted {}", status))),
            None => Ok(()),
        }
    }

    fn next_number(&self) -> u32 {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        *next
    }

    fn with_meta(entry: &Entry, id: String, edit_uri: String) -> Entry {
        let meta = EntryMeta {
            id: Some(id),
            edit_uri: Some(edit_uri),
            updated: Some("2030-01-01T00:00:00Z".to_string()),
            deleted: false,
        };
        match entry.clone() {
            Entry::Contact(mut contact) => {
                contact.meta = meta;
                Entry::Contact(contact)
            }
            Entry::Group(mut group) => {
                group.meta = meta;
                Entry::Group(group)
            }
            Entry::Media(mut media) => {
                media.meta = meta;
                Entry::Media(media)
            }
        }
    }
}

fn entry_updated(item: &FeedItem) -> Option<&str> {
    match item {
        FeedItem::Entry(entry) => entry.meta().updated.as_deref(),
        FeedItem::Malformed { .. } => None,
    }
}

#[async_trait]
impl FeedTransport for FakeTransport {
    async fn fetch_feed(&self, _token: &str, feed_url: &str, query: &FeedQuery) -> Result<FeedPage> {
        self.record(Call::Fetch {
            feed: feed_url.to_string(),
            updated_min: query.updated_min.clone(),
            show_deleted: query.show_deleted,
        })?;

        let feeds = self.feeds.lock().unwrap();
        let matching: Vec<FeedItem> = feeds
            .get(feed_url)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|item| match (&query.updated_min, entry_updated(item)) {
                (Some(min), Some(updated)) => updated >= min.as_str(),
                (Some(_), None) => false,
                (None, _) => true,
            })
            .filter(|item| {
                query.show_deleted
                    || !matches!(item, FeedItem::Entry(entry) if entry.meta().deleted)
            })
            .collect();
        let limit = query.max_results.unwrap_or(usize::MAX);
        let has_more = matching.len() > limit;
        Ok(FeedPage {
            entries: matching.into_iter().take(limit).collect(),
            has_more,
        })
    }

    async fn create_entry(&self, _token: &str, create_url: &str, entry: &Entry) -> Result<Entry> {
        self.record(Call::Create {
            url: create_url.to_string(),
            entry: entry.clone(),
        })?;
        let sync_id = format!("s{}", self.next_number());
        Ok(Self::with_meta(
            entry,
            format!("{}/{}", create_url, sync_id),
            format!("{}/{}/v1", create_url, sync_id),
        ))
    }

    async fn update_entry(&self, _token: &str, edit_url: &str, entry: &Entry) -> Result<Entry> {
        self.record(Call::Update {
            url: edit_url.to_string(),
            entry: entry.clone(),
        })?;
        let base = edit_url
            .rsplit_once('/')
            .map(|(base, _)| base.to_string())
            .unwrap_or_else(|| edit_url.to_string());
        let version = format!("v{}", 100 + self.next_number());
        Ok(Self::with_meta(entry, base.clone(), format!("{}/{}", base, version)))
    }

    async fn delete_entry(&self, _token: &str, edit_url: &str) -> Result<()> {
        self.record(Call::Delete {
            url: edit_url.to_string(),
        })
    }

    async fn get_media(&self, _token: &str, url: &str) -> Result<Vec<u8>> {
        self.record(Call::GetMedia {
            url: url.to_string(),
        })?;
        self.media
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FeedSyncError::api(404, "no photo"))
    }

    async fn update_media(&self, _token: &str, edit_url: &str, data: Vec<u8>) -> Result<()> {
        self.record(Call::UpdateMedia {
            url: edit_url.to_string(),
            data,
        })
    }
}

pub struct FakeCredentials {
    token: Mutex<Option<String>>,
    invalidated: Mutex<Vec<String>>,
}

impl FakeCredentials {
    pub fn invalidated(&self) -> Vec<String> {
        self.invalidated.lock().unwrap().clone()
    }

    pub fn revoke(&self) {
        *self.token.lock().unwrap() = None;
    }
}

#[async_trait]
impl CredentialStore for FakeCredentials {
    async fn get_auth_token(&self, _account: &str) -> Result<String> {
        self.token
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| FeedSyncError::auth("no token"))
    }

    async fn invalidate_auth_token(&self, token: &str) {
        self.invalidated.lock().unwrap().push(token.to_string());
    }
}

#[derive(Default)]
pub struct RecordingRequester {
    requests: Mutex<Vec<(String, String)>>,
}

impl RecordingRequester {
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

impl SyncRequester for RecordingRequester {
    fn request_sync(&self, account: &str, feed: &str) {
        self.requests
            .lock()
            .unwrap()
            .push((account.to_string(), feed.to_string()));
    }
}

pub struct Harness {
    _dir: TempDir,
    pub transport: Arc<FakeTransport>,
    pub credentials: Arc<FakeCredentials>,
    pub requester: Arc<RecordingRequester>,
    pub contacts: Arc<ContactRepository>,
    pub photos: Arc<PhotoRepository>,
    pub sync_state: Arc<SyncStateRepository>,
    pub settings: Arc<SettingsRepository>,
    pub engine: ContactsSyncEngine,
}

impl Harness {
    pub fn contacts_feed(&self) -> String {
        self.engine.feeds().contacts_feed(ACCOUNT)
    }

    pub fn groups_feed(&self) -> String {
        self.engine.feeds().groups_feed(ACCOUNT)
    }

    pub fn photos_feed(&self) -> String {
        self.engine.feeds().photos_feed(ACCOUNT)
    }

    pub async fn sync_everything(&self, enabled: bool) {
        self.settings
            .set_setting(ACCOUNT, SYNC_EVERYTHING, if enabled { "1" } else { "0" })
            .await
            .expect("set setting");
    }

    pub fn contact_entry(&self, sync_id: &str, version: &str, updated: &str, name: &str) -> Entry {
        let feed = self.contacts_feed();
        Entry::Contact(ContactEntry {
            meta: EntryMeta {
                id: Some(format!("{}/{}", feed, sync_id)),
                edit_uri: Some(format!("{}/{}/{}", feed, sync_id, version)),
                updated: Some(updated.to_string()),
                deleted: false,
            },
            title: Some(name.to_string()),
            ..Default::default()
        })
    }

    pub fn group_entry(&self, sync_id: &str, updated: &str, name: &str) -> Entry {
        let feed = self.groups_feed();
        Entry::Group(GroupEntry {
            meta: EntryMeta {
                id: Some(format!("{}/{}", feed, sync_id)),
                edit_uri: Some(format!("{}/{}/gv1", feed, sync_id)),
                updated: Some(updated.to_string()),
                deleted: false,
            },
            title: Some(name.to_string()),
            ..Default::default()
        })
    }

    pub fn contact_tombstone(&self, sync_id: &str, updated: &str) -> Entry {
        let feed = self.contacts_feed();
        Entry::Contact(ContactEntry {
            meta: EntryMeta {
                id: Some(format!("{}/{}", feed, sync_id)),
                edit_uri: None,
                updated: Some(updated.to_string()),
                deleted: true,
            },
            ..Default::default()
        })
    }
}

pub fn test_config() -> SyncConfig {
    SyncConfig {
        feed_base_url: ROOT.to_string(),
        legacy_cleanup_title: Some(LEGACY_TITLE.to_string()),
        ..SyncConfig::default()
    }
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: SyncConfig) -> Harness {
    let dir = tempdir().expect("tempdir");
    let db_path = init(&dir.path().to_string_lossy()).expect("init db");
    run_migrations(&db_path).expect("migrate");
    let pool = create_pool(&db_path).expect("pool");
    let writer = spawn_writer(pool.as_ref().clone());

    let transport = Arc::new(FakeTransport::default());
    let credentials = Arc::new(FakeCredentials {
        token: Mutex::new(Some("token-1".to_string())),
        invalidated: Mutex::new(Vec::new()),
    });
    let requester = Arc::new(RecordingRequester::default());
    let contacts = Arc::new(ContactRepository::new(pool.clone(), writer.clone()));
    let photos = Arc::new(PhotoRepository::new(pool.clone(), writer.clone()));
    let sync_state = Arc::new(SyncStateRepository::new(pool.clone(), writer.clone()));
    let settings = Arc::new(SettingsRepository::new(pool, writer));

    let ports = EnginePorts {
        transport: transport.clone(),
        credentials: credentials.clone(),
        requester: requester.clone(),
        contacts: contacts.clone(),
        photos: photos.clone(),
        sync_state: sync_state.clone(),
        settings: settings.clone(),
    };

    Harness {
        _dir: dir,
        engine: ContactsSyncEngine::new(ports, config),
        transport,
        credentials,
        requester,
        contacts,
        photos,
        sync_state,
        settings,
    }
}
