use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, instrument};

use mychat_core::segment::{resolve, tokenize};
use mychat_core::{
    ChatError, ContentSegment, Mention, Message, MessageId, Room, SharedStore, User,
};

use crate::bounded::bounded;

/// Builds and persists new messages.
pub struct MessageAssembler {
    store: SharedStore,
    store_timeout: Duration,
}

impl MessageAssembler {
    pub fn new(store: SharedStore, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    /// Segment `raw_text`, build the message for `roster` and persist it.
    ///
    /// The message is returned only after it has been saved.
    #[instrument(skip_all, fields(sender = %sender.id, room_id = %room.id))]
    pub async fn assemble(
        &self,
        sender: &User,
        raw_text: &str,
        room: &Room,
        roster: &[User],
    ) -> Result<Message, ChatError> {
        let contents = self.segment(raw_text).await?;
        let message = build_message(sender, room, contents, roster, Utc::now().timestamp_millis());
        self.store.save_message(&message).await?;
        debug!(
            message_id = %message.id,
            segments = message.contents.len(),
            mentions = message.mentions.len(),
            "message assembled"
        );
        Ok(message)
    }

    /// Segment text, resolving each distinct mention name once against the store.
    pub async fn segment(&self, raw_text: &str) -> Result<Vec<ContentSegment>, ChatError> {
        let tokens = tokenize(raw_text);
        let mut resolved: HashMap<&str, Option<User>> = HashMap::new();
        let mut segments = Vec::with_capacity(tokens.len());
        for token in &tokens {
            let user = match token.mention_name() {
                Some(name) => {
                    if let Some(hit) = resolved.get(name) {
                        hit.clone()
                    } else {
                        let hit =
                            bounded(self.store_timeout, self.store.find_user_by_name(name)).await?;
                        resolved.insert(name, hit.clone());
                        hit
                    }
                }
                None => None,
            };
            segments.push(resolve(token, user));
        }
        Ok(segments)
    }
}

/// Assemble a message from already-segmented content.
///
/// Every roster member starts unread; the sender is then forced to read.
pub fn build_message(
    sender: &User,
    room: &Room,
    contents: Vec<ContentSegment>,
    roster: &[User],
    created_at: i64,
) -> Message {
    let mentions = contents
        .iter()
        .filter_map(|segment| match segment {
            ContentSegment::Mention { user } => Some(Mention {
                user: user.clone(),
                is_read: false,
            }),
            ContentSegment::Text { .. } => None,
        })
        .collect();

    let mut read_users: BTreeMap<_, _> = roster.iter().map(|u| (u.id.clone(), false)).collect();
    read_users.insert(sender.id.clone(), true);

    Message {
        id: MessageId::new(),
        room_id: room.id.clone(),
        sender: sender.clone(),
        created_at,
        contents,
        mentions,
        read_users,
    }
}

#[cfg(test)]
mod tests {
    use mychat_core::StoreError;

    use super::*;
    use crate::testing::{fixture, fixture_with, hold_connection};

    #[test]
    fn read_users_covers_roster_with_sender_read() {
        let roster: Vec<User> = ["a", "b", "c", "d"].into_iter().map(User::new).collect();
        let room = Room {
            id: mychat_core::RoomId::from_raw("root"),
            name: "root".into(),
        };
        let sender = roster[2].clone();
        let msg = build_message(&sender, &room, vec![ContentSegment::text("x")], &roster, 0);

        assert_eq!(msg.read_users.len(), roster.len());
        assert_eq!(msg.is_read_by(&sender.id), Some(true));
        for other in roster.iter().filter(|u| u.id != sender.id) {
            assert_eq!(msg.is_read_by(&other.id), Some(false));
        }
        assert_eq!(msg.unread_count(), roster.len() - 1);
    }

    #[test]
    fn mentions_follow_mention_segments() {
        let alice = User::new("alice");
        let room = Room {
            id: mychat_core::RoomId::from_raw("root"),
            name: "root".into(),
        };
        let contents = vec![
            ContentSegment::mention(alice.clone()),
            ContentSegment::text(" and "),
            ContentSegment::mention(alice.clone()),
        ];
        let msg = build_message(&alice, &room, contents, &[alice.clone()], 0);
        assert_eq!(msg.mentions.len(), 2);
        assert!(msg.mentions.iter().all(|m| !m.is_read && m.user == alice));
    }

    #[tokio::test]
    async fn assemble_persists_resolved_message() {
        let f = fixture();
        let roster = vec![f.alice.clone(), f.bob.clone(), f.carol.clone()];
        let assembler = MessageAssembler::new(f.store.clone(), Duration::from_secs(5));

        let msg = assembler
            .assemble(&f.bob, "hi @alice", &f.room, &roster)
            .await
            .unwrap();

        assert_eq!(
            msg.contents,
            vec![ContentSegment::text("hi "), ContentSegment::mention(f.alice.clone())]
        );
        assert_eq!(msg.unread_count(), 2);
        let stored = f.engine.snapshot().await.unwrap();
        assert_eq!(stored, vec![msg]);
    }

    #[tokio::test]
    async fn unknown_names_stay_literal() {
        let f = fixture();
        let assembler = MessageAssembler::new(f.store.clone(), Duration::from_secs(5));
        let segments = assembler.segment("@ghost meets @alice").await.unwrap();
        assert_eq!(
            segments,
            vec![
                ContentSegment::text("@ghost"),
                ContentSegment::text(" meets "),
                ContentSegment::mention(f.alice.clone()),
            ]
        );
    }

    #[tokio::test]
    async fn failed_save_surfaces_retryable_error_and_persists_nothing() {
        let f = fixture();
        f.store.fail_writes(true);
        let assembler = MessageAssembler::new(f.store.clone(), Duration::from_secs(5));

        let err = assembler
            .assemble(&f.bob, "hello", &f.room, &[f.bob.clone()])
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(f.engine.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_blocked_past_deadline_persists_nothing() {
        let f = fixture_with(Duration::from_millis(50));
        let assembler = MessageAssembler::new(f.store.clone(), Duration::from_millis(50));
        let holder = hold_connection(&f.db, Duration::from_millis(300));

        let err = assembler
            .assemble(&f.bob, "hello", &f.room, &[f.bob.clone()])
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Storage(StoreError::Timeout(_))));

        holder.join().unwrap();
        assert!(f.engine.snapshot().await.unwrap().is_empty());
    }
}
