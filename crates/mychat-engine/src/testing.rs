use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use mychat_core::{
    ChatStore, Message, MessageId, Room, RoomId, SharedStore, StoreError, User, UserId,
};
use mychat_store::{Database, SqliteChatStore};

use crate::engine::{ChatEngine, EngineConfig};

pub struct Fixture {
    pub db: Database,
    pub store: Arc<FlakyStore>,
    pub engine: ChatEngine,
    pub room: Room,
    pub alice: User,
    pub bob: User,
    pub carol: User,
}

pub fn fixture() -> Fixture {
    fixture_with(Duration::from_secs(5))
}

/// Fixture whose store calls, reads and writes alike, give up after `store_timeout`.
pub fn fixture_with(store_timeout: Duration) -> Fixture {
    let db = Database::in_memory().unwrap();
    let sqlite = SqliteChatStore::new(db.clone()).with_write_timeout(store_timeout);
    let room = sqlite
        .rooms()
        .ensure(&RoomId::from_raw("root"), "root")
        .unwrap();
    let alice = sqlite.users().create("alice").unwrap();
    let bob = sqlite.users().create("bob").unwrap();
    let carol = sqlite.users().create("carol").unwrap();

    let store = Arc::new(FlakyStore::new(sqlite));
    let shared: SharedStore = store.clone();
    let engine = ChatEngine::new(
        shared,
        EngineConfig {
            room_id: room.id.clone(),
            store_timeout,
        },
    );
    Fixture {
        db,
        store,
        engine,
        room,
        alice,
        bob,
        carol,
    }
}

/// Hold the connection on another thread for `hold`. Returns once it is taken.
pub fn hold_connection(db: &Database, hold: Duration) -> std::thread::JoinHandle<()> {
    let (taken_tx, taken_rx) = std::sync::mpsc::channel();
    let db = db.clone();
    let holder = std::thread::spawn(move || {
        db.with_conn(|_| {
            taken_tx.send(()).unwrap();
            std::thread::sleep(hold);
            Ok(())
        })
        .unwrap();
    });
    taken_rx.recv().unwrap();
    holder
}

/// SQLite-backed store whose writes can be switched off.
pub struct FlakyStore {
    inner: SqliteChatStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: SqliteChatStore) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatStore for FlakyStore {
    async fn find_user_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_id(id).await
    }

    async fn find_user_by_name(&self, name: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_name(name).await
    }

    async fn find_all_users(&self) -> Result<Vec<User>, StoreError> {
        self.inner.find_all_users().await
    }

    async fn find_room_by_id(&self, id: &RoomId) -> Result<Option<Room>, StoreError> {
        self.inner.find_room_by_id(id).await
    }

    async fn find_messages_by_room(&self, room_id: &RoomId) -> Result<Vec<Message>, StoreError> {
        self.inner.find_messages_by_room(room_id).await
    }

    async fn save_message(&self, message: &Message) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        self.inner.save_message(message).await
    }

    async fn find_message_by_id(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        self.inner.find_message_by_id(id).await
    }
}
