use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, SeedableRng};
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time::Instant,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    attribute::Category,
    llm::{Message, Usage},
    outbound::ProductRecord,
};

/// How a turn ended. Only `Products` carries records for display; every
/// other variant shows the shopper a "no results" fallback while keeping the
/// cause visible to operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TurnOutcome {
    Products(Vec<ProductRecord>),
    NoResults,
    NoFilter,
    UnresolvedCategory,
    CompletionFailed { reason: String },
    CatalogUnavailable { status: Option<u16>, body: String },
    MalformedCatalog { reason: String },
}

impl TurnOutcome {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            TurnOutcome::Products(_) => "products",
            TurnOutcome::NoResults => "no-results",
            TurnOutcome::NoFilter => "no-filter",
            TurnOutcome::UnresolvedCategory => "unresolved-category",
            TurnOutcome::CompletionFailed { .. } => "completion-failed",
            TurnOutcome::CatalogUnavailable { .. } => "catalog-unavailable",
            TurnOutcome::MalformedCatalog { .. } => "malformed-catalog",
        }
    }

    pub(crate) fn products(&self) -> Option<&[ProductRecord]> {
        match self {
            TurnOutcome::Products(records) => Some(records),
            _ => None,
        }
    }
}

/// One user utterance and the system's answer to it.
#[derive(Debug, Clone)]
pub(crate) struct Turn {
    pub(crate) sequence: usize,
    pub(crate) text: String,
    pub(crate) category: Option<Category>,
    pub(crate) answer: Option<String>,
    pub(crate) url_key: Option<String>,
    pub(crate) outcome: TurnOutcome,
    pub(crate) usage: Usage,
    pub(crate) created_at: DateTime<Utc>,
}

/// Per-conversation state. Mutated only by the turn currently being
/// processed for it.
pub(crate) struct Session {
    pub(crate) id: Uuid,
    pub(crate) selected: Option<Category>,
    pub(crate) turns: Vec<Turn>,
    pub(crate) usage: Usage,
    pub(crate) history: Vec<Message>,
    pub(crate) rng: StdRng,
}

impl Session {
    pub(crate) fn new(selected: Option<Category>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            id: Uuid::new_v4(),
            selected,
            turns: Vec::new(),
            usage: Usage::default(),
            history: Vec::new(),
            rng,
        }
    }

    pub(crate) fn next_sequence(&self) -> usize {
        self.turns.len() + 1
    }

    /// Appends a finished turn and folds its usage into the session totals.
    pub(crate) fn record(&mut self, turn: Turn) -> &Turn {
        self.usage += turn.usage;
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    /// Forgets every turn but keeps the selected category.
    pub(crate) fn clear(&mut self) {
        self.turns.clear();
        self.history.clear();
        self.usage = Usage::default();
    }
}

struct Entry {
    session: Arc<Mutex<Session>>,
    last_seen: Instant,
}

/// Live sessions keyed by id. Each session sits behind its own lock so that
/// its turns run one at a time, in submission order. Sessions idle for
/// longer than `idle` are dropped by [`SessionStore::sweep`].
#[derive(Clone)]
pub(crate) struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Entry>>>,
    seed: Option<u64>,
    idle: Duration,
}

impl SessionStore {
    pub(crate) fn new(seed: Option<u64>, idle: Duration) -> Self {
        Self {
            sessions: Arc::default(),
            seed,
            idle,
        }
    }

    pub(crate) async fn start(&self, selected: Option<Category>) -> Uuid {
        let session = Session::new(selected, self.seed);
        let id = session.id;
        self.sessions.write().await.insert(
            id,
            Entry {
                session: Arc::new(Mutex::new(session)),
                last_seen: Instant::now(),
            },
        );
        info!(%id, "session started");
        id
    }

    pub(crate) async fn get(&self, id: &Uuid) -> Option<Arc<Mutex<Session>>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    pub(crate) async fn end(&self, id: &Uuid) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(%id, "session ended");
        }
        removed
    }

    /// Drops sessions that have been idle for at least `idle` and are not in
    /// use by a request. Returns how many were dropped.
    pub(crate) async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let keep = entry.last_seen.elapsed() < self.idle
                || Arc::strong_count(&entry.session) > 1;
            if !keep {
                info!(%id, "session expired");
            }
            keep
        });
        before - sessions.len()
    }

    /// Runs [`SessionStore::sweep`] every `every` until the runtime shuts down.
    pub(crate) fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let expired = store.sweep().await;
                if expired > 0 {
                    info!(expired, "idle sessions swept");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(sequence: usize, usage: Usage) -> Turn {
        Turn {
            sequence,
            text: "red bra".to_string(),
            category: Some(Category::Bra),
            answer: None,
            url_key: None,
            outcome: TurnOutcome::NoFilter,
            usage,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn record_accumulates_usage_and_sequence() {
        let mut session = Session::new(None, Some(1));
        assert_eq!(session.next_sequence(), 1);
        session.record(turn(1, Usage::new(10, 2)));
        session.record(turn(2, Usage::new(5, 1)));
        assert_eq!(session.next_sequence(), 3);
        assert_eq!(session.usage, Usage::new(15, 3));
    }

    #[test]
    fn clear_keeps_selection() {
        let mut session = Session::new(Some(Category::Panty), Some(1));
        session.record(turn(1, Usage::new(10, 2)));
        session.history.push(Message::user("hi"));
        session.clear();
        assert!(session.turns.is_empty());
        assert!(session.history.is_empty());
        assert_eq!(session.usage, Usage::default());
        assert_eq!(session.selected, Some(Category::Panty));
    }

    #[test]
    fn only_products_outcome_exposes_records() {
        assert!(TurnOutcome::Products(Vec::new()).products().is_some());
        assert!(TurnOutcome::NoResults.products().is_none());
        assert_eq!(
            TurnOutcome::CatalogUnavailable {
                status: Some(500),
                body: String::new()
            }
            .kind(),
            "catalog-unavailable"
        );
    }

    #[tokio::test]
    async fn store_tracks_session_lifecycle() {
        let store = SessionStore::new(Some(3), Duration::from_secs(60));
        let id = store.start(Some(Category::Bra)).await;
        let session = store.get(&id).await.unwrap();
        assert_eq!(session.lock().await.selected, Some(Category::Bra));
        assert!(store.end(&id).await);
        assert!(store.get(&id).await.is_none());
        assert!(!store.end(&id).await);
    }

    #[tokio::test]
    async fn idle_sessions_are_swept() {
        let store = SessionStore::new(None, Duration::from_millis(50));
        let idle = store.start(None).await;
        let held = store.start(None).await;
        let touched = store.start(None).await;
        let in_use = store.get(&held).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.get(&touched).await.is_some());

        assert_eq!(store.sweep().await, 1);
        assert!(store.get(&idle).await.is_none());
        assert!(store.get(&touched).await.is_some());

        drop(in_use);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.sweep().await, 2);
        assert!(store.get(&held).await.is_none());
    }

    #[tokio::test]
    async fn sweeper_runs_in_the_background() {
        let store = SessionStore::new(None, Duration::from_millis(20));
        let id = store.start(None).await;
        let sweeper = store.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(150)).await;
        sweeper.abort();
        assert!(store.get(&id).await.is_none());
    }
}
