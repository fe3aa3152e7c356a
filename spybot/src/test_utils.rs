//! In-memory fakes for the engine's collaborators.
//!
//! Shared by unit tests and the integration tests under `tests/`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use spybot_sources::{
    ActivityResult, GameSource, QuestionDetail, Snapshot, SourceError, SubmissionSource,
};
use tokio_util::sync::CancellationToken;

use crate::database::repositories::StateRepository;
use crate::domain::{SourceKind, Subscription, TrackedEntity};
use crate::notification::{ChatTransport, MessageFlags, MessageHandle};
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::store::WatermarkStore;
use crate::{Error, Result};

/// Install a test-friendly tracing subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("spybot=debug")
        .with_test_writer()
        .try_init();
}

/// Pops the next scripted reply; the last one repeats forever.
fn next_reply<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

// ========== Sources ==========

#[derive(Default)]
pub struct FakeSubmissionSource {
    snapshots: Mutex<HashMap<String, VecDeque<std::result::Result<Snapshot, SourceError>>>>,
    details: Mutex<HashMap<String, QuestionDetail>>,
    detail_delay: Mutex<Duration>,
    fetches: AtomicUsize,
}

impl FakeSubmissionSource {
    pub fn push_snapshot(&self, account: &str, snapshot: impl Into<Snapshot>) {
        self.snapshots
            .lock()
            .entry(account.to_string())
            .or_default()
            .push_back(Ok(snapshot.into()));
    }

    /// Replace any scripted replies with a single repeating snapshot.
    pub fn set_snapshot(&self, account: &str, snapshot: impl Into<Snapshot>) {
        self.snapshots
            .lock()
            .insert(account.to_string(), VecDeque::from([Ok(snapshot.into())]));
    }

    pub fn push_error(&self, account: &str, error: SourceError) {
        self.snapshots
            .lock()
            .entry(account.to_string())
            .or_default()
            .push_back(Err(error));
    }

    pub fn set_detail(&self, detail: QuestionDetail) {
        self.details
            .lock()
            .insert(detail.title_slug.clone(), detail);
    }

    /// Make every `fetch_item_detail` call take `delay` before answering.
    pub fn set_detail_delay(&self, delay: Duration) {
        *self.detail_delay.lock() = delay;
    }

    /// Number of `fetch_recent_items` calls so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubmissionSource for FakeSubmissionSource {
    async fn fetch_recent_items(&self, account: &str) -> std::result::Result<Snapshot, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut snapshots = self.snapshots.lock();
        match snapshots.get_mut(account).and_then(next_reply) {
            Some(reply) => reply,
            None => Ok(Snapshot::default()),
        }
    }

    async fn fetch_item_detail(&self, title_slug: &str) -> std::result::Result<QuestionDetail, SourceError> {
        let delay = *self.detail_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.details
            .lock()
            .get(title_slug)
            .cloned()
            .ok_or_else(|| SourceError::unavailable(format!("no details for {}", title_slug)))
    }
}

/// Scripted reply of the status endpoint for one account.
#[derive(Debug, Clone)]
pub enum StatusReply {
    Playing(String),
    Idle,
    NotFound,
    Fail(SourceError),
}

#[derive(Default)]
pub struct FakeGameSource {
    statuses: Mutex<HashMap<String, VecDeque<StatusReply>>>,
    games: Mutex<HashMap<String, VecDeque<std::result::Result<ActivityResult, SourceError>>>>,
    status_fetches: AtomicUsize,
    game_fetches: AtomicUsize,
}

impl FakeGameSource {
    pub fn push_status(&self, account: &str, reply: StatusReply) {
        self.statuses
            .lock()
            .entry(account.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Replace any scripted replies with a single repeating status.
    pub fn set_status(&self, account: &str, reply: StatusReply) {
        self.statuses
            .lock()
            .insert(account.to_string(), VecDeque::from([reply]));
    }

    pub fn push_game(&self, game_id: &str, reply: std::result::Result<ActivityResult, SourceError>) {
        self.games
            .lock()
            .entry(game_id.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn status_fetch_count(&self) -> usize {
        self.status_fetches.load(Ordering::SeqCst)
    }

    pub fn game_fetch_count(&self) -> usize {
        self.game_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GameSource for FakeGameSource {
    async fn fetch_entity_status(
        &self,
        accounts: &[String],
    ) -> std::result::Result<HashMap<String, Option<String>>, SourceError> {
        self.status_fetches.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock();
        let mut out = HashMap::new();
        for account in accounts {
            match statuses.get_mut(account).and_then(next_reply) {
                Some(StatusReply::Playing(game_id)) => {
                    out.insert(account.clone(), Some(game_id));
                }
                Some(StatusReply::Idle) | None => {
                    out.insert(account.clone(), None);
                }
                Some(StatusReply::NotFound) => {}
                Some(StatusReply::Fail(e)) => return Err(e),
            }
        }
        Ok(out)
    }

    async fn fetch_activity_detail(&self, game_id: &str) -> std::result::Result<ActivityResult, SourceError> {
        self.game_fetches.fetch_add(1, Ordering::SeqCst);
        let mut games = self.games.lock();
        match games.get_mut(game_id).and_then(next_reply) {
            Some(reply) => reply,
            None => Ok(ActivityResult::InProgress),
        }
    }
}

// ========== Transport ==========

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
    pub flags: MessageFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditedMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
}

#[derive(Default)]
pub struct FakeTransport {
    sent: Mutex<Vec<SentMessage>>,
    edits: Mutex<Vec<EditedMessage>>,
    next_id: AtomicI64,
    fail_sends: AtomicBool,
    fail_edits: AtomicBool,
}

impl FakeTransport {
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn edits(&self) -> Vec<EditedMessage> {
        self.edits.lock().clone()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        flags: MessageFlags,
    ) -> Result<MessageHandle> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::transport("send rejected"));
        }
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().push(SentMessage {
            chat_id,
            message_id,
            text: text.to_string(),
            flags,
        });
        Ok(MessageHandle {
            chat_id,
            message_id,
            text: text.to_string(),
        })
    }

    async fn edit_message(
        &self,
        handle: &MessageHandle,
        text: &str,
        _flags: MessageFlags,
    ) -> Result<()> {
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(Error::transport("edit rejected"));
        }
        self.edits.lock().push(EditedMessage {
            chat_id: handle.chat_id,
            message_id: handle.message_id,
            text: text.to_string(),
        });
        Ok(())
    }
}

// ========== Persistence ==========

/// StateRepository backed by a map; can be told to fail every write.
#[derive(Default)]
pub struct MemoryStateRepository {
    state: Mutex<BTreeMap<i64, Subscription>>,
    fail_writes: AtomicBool,
}

impl MemoryStateRepository {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> Vec<Subscription> {
        self.state.lock().values().cloned().collect()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(Error::Database("writes disabled".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StateRepository for MemoryStateRepository {
    async fn load_state(&self) -> Result<Vec<Subscription>> {
        Ok(self.snapshot().await)
    }

    async fn upsert_subscription(
        &self,
        chat_id: i64,
        active: bool,
        last_error: Option<&str>,
    ) -> Result<()> {
        self.check_writable()?;
        let mut state = self.state.lock();
        let sub = state
            .entry(chat_id)
            .or_insert_with(|| Subscription::new(chat_id));
        sub.active = active;
        sub.last_error = last_error.map(str::to_string);
        Ok(())
    }

    async fn upsert_entity(&self, chat_id: i64, entity: &TrackedEntity) -> Result<()> {
        self.check_writable()?;
        let mut state = self.state.lock();
        let sub = state
            .entry(chat_id)
            .or_insert_with(|| Subscription::new(chat_id));
        match sub
            .entities
            .iter_mut()
            .find(|e| e.source == entity.source && e.account == entity.account)
        {
            Some(existing) => *existing = entity.clone(),
            None => sub.entities.push(entity.clone()),
        }
        Ok(())
    }

    async fn delete_entity(&self, chat_id: i64, source: SourceKind, account: &str) -> Result<()> {
        self.check_writable()?;
        if let Some(sub) = self.state.lock().get_mut(&chat_id) {
            sub.entities
                .retain(|e| !(e.source == source && e.account == account));
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        self.check_writable()?;
        self.state.lock().clear();
        Ok(())
    }
}

// ========== Engine ==========

/// A store and scheduler wired to fakes.
pub struct TestHarness {
    pub repo: Arc<MemoryStateRepository>,
    pub store: Arc<WatermarkStore>,
    pub transport: Arc<FakeTransport>,
    pub submissions: Arc<FakeSubmissionSource>,
    pub games: Arc<FakeGameSource>,
    pub scheduler: Arc<Scheduler>,
    pub shutdown: CancellationToken,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self::assemble(
            config,
            Arc::new(MemoryStateRepository::default()),
            Arc::new(FakeTransport::default()),
            Arc::new(FakeSubmissionSource::default()),
            Arc::new(FakeGameSource::default()),
        )
    }

    fn assemble(
        config: SchedulerConfig,
        repo: Arc<MemoryStateRepository>,
        transport: Arc<FakeTransport>,
        submissions: Arc<FakeSubmissionSource>,
        games: Arc<FakeGameSource>,
    ) -> Self {
        let store = Arc::new(WatermarkStore::new(repo.clone()));
        let shutdown = CancellationToken::new();
        let scheduler = Arc::new(Scheduler::new(
            config,
            store.clone(),
            transport.clone(),
            submissions.clone(),
            games.clone(),
            shutdown.clone(),
        ));
        Self {
            repo,
            store,
            transport,
            submissions,
            games,
            scheduler,
            shutdown,
        }
    }

    /// Simulate a process restart: every task of this harness is stopped and
    /// a fresh store is hydrated from the same repository.
    pub async fn restart(&self) -> Result<Self> {
        self.shutdown.cancel();
        let next = Self::assemble(
            self.scheduler.config().clone(),
            self.repo.clone(),
            self.transport.clone(),
            self.submissions.clone(),
            self.games.clone(),
        );
        next.store.hydrate().await?;
        Ok(next)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
