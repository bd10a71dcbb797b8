//! Memory storage
//!
//! Will be destroyed on system shutdown

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::notes::Note;
use crate::users::User;

use super::Context;
use super::CreateUserValues;
use super::Error;
use super::NoteRepository;
use super::Result;
use super::UserRepository;

/// An in-memory storage
///
/// Every map sits behind its own reader-writer lock, so concurrent readers never wait on each
/// other. The context is ignored, calls never block on anything but the lock.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    /// All users in storage
    users: Arc<RwLock<HashMap<Uuid, User>>>,

    /// All notes in storage
    notes: Arc<RwLock<HashMap<Uuid, Note>>>,
}

impl Memory {
    /// Create a new empty Memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a Memory storage with initial users and notes
    ///
    /// # Errors
    ///
    /// Will return [`Error::Config`] when an ID shows up more than once
    #[cfg(test)]
    pub fn seeded(users: Vec<User>, notes: Vec<Note>) -> Result<Self> {
        let users = index_by_id(users, |user| user.id, "user")?;
        let notes = index_by_id(notes, |note| note.id, "note")?;

        Ok(Self {
            users: Arc::new(RwLock::new(users)),
            notes: Arc::new(RwLock::new(notes)),
        })
    }
}

/// Build a map from ID to record, rejecting duplicate IDs
#[cfg(test)]
fn index_by_id<T>(
    records: Vec<T>,
    id_of: fn(&T) -> Uuid,
    kind: &str,
) -> Result<HashMap<Uuid, T>> {
    let mut map = HashMap::with_capacity(records.len());

    for record in records {
        let id = id_of(&record);

        if map.insert(id, record).is_some() {
            return Err(Error::Config(format!("duplicate {kind} ID [{id}]")));
        }
    }

    Ok(map)
}

#[async_trait]
impl NoteRepository for Memory {
    async fn create_note(&self, _ctx: &Context, note: &Note) -> Result<()> {
        match self.notes.write().await.entry(note.id) {
            Entry::Occupied(_) => Err(Error::AlreadyExists),
            Entry::Vacant(entry) => {
                entry.insert(note.clone());

                Ok(())
            }
        }
    }

    async fn update_note(&self, _ctx: &Context, note: &Note) -> Result<()> {
        self.notes
            .write()
            .await
            .get_mut(&note.id)
            .map(|stored| *stored = note.clone())
            .ok_or(Error::NotFound)
    }

    async fn delete_note(&self, _ctx: &Context, note_id: &Uuid) -> Result<()> {
        self.notes
            .write()
            .await
            .remove(note_id)
            .map(|_| ())
            .ok_or(Error::NotFound)
    }

    async fn find_single_note_by_id(&self, _ctx: &Context, note_id: &Uuid) -> Result<Note> {
        self.notes
            .read()
            .await
            .get(note_id)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn find_all_notes_by_user(&self, _ctx: &Context, user_id: &Uuid) -> Result<Vec<Note>> {
        Ok(self
            .notes
            .read()
            .await
            .values()
            .filter(|note| &note.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserRepository for Memory {
    async fn find_any_single_user(&self, _ctx: &Context) -> Result<Option<User>> {
        Ok(self.users.read().await.values().next().cloned())
    }

    async fn find_single_user_by_id(&self, _ctx: &Context, user_id: &Uuid) -> Result<User> {
        self.users
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn create_user(&self, _ctx: &Context, values: &CreateUserValues<'_>) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            name: values.name.to_string(),
            email: values.email.to_string(),
        };

        self.users.write().await.insert(user.id, user.clone());

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use tokio::task::JoinSet;

    use super::*;

    fn note(user_id: Uuid, title: &str) -> Note {
        Note {
            id: Uuid::new_v4(),
            title: title.to_string(),
            content: format!("{title} content"),
            user_id,
        }
    }

    fn user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{name}@example.com"),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_note() {
        let ctx = Context::background();
        let memory = Memory::new();
        let note = note(Uuid::new_v4(), "first");

        memory.create_note(&ctx, &note).await.unwrap();

        let found = memory.find_single_note_by_id(&ctx, &note.id).await.unwrap();
        assert_eq!(note, found);
    }

    #[tokio::test]
    async fn test_create_note_twice() {
        let ctx = Context::background();
        let memory = Memory::new();
        let note = note(Uuid::new_v4(), "first");

        memory.create_note(&ctx, &note).await.unwrap();

        let result = memory.create_note(&ctx, &note).await;
        assert!(matches!(result, Err(Error::AlreadyExists)));
    }

    #[tokio::test]
    async fn test_update_note() {
        let ctx = Context::background();
        let original = note(Uuid::new_v4(), "first");
        let memory = Memory::seeded(Vec::new(), vec![original.clone()]).unwrap();

        let mut changed = original.clone();
        changed.title = "second".to_string();
        memory.update_note(&ctx, &changed).await.unwrap();

        let found = memory
            .find_single_note_by_id(&ctx, &original.id)
            .await
            .unwrap();
        assert_eq!("second", found.title);
        assert_eq!(original.content, found.content);
    }

    #[tokio::test]
    async fn test_update_missing_note() {
        let ctx = Context::background();
        let memory = Memory::new();

        let result = memory
            .update_note(&ctx, &note(Uuid::new_v4(), "missing"))
            .await;
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn test_delete_note_twice() {
        let ctx = Context::background();
        let note = note(Uuid::new_v4(), "first");
        let memory = Memory::seeded(Vec::new(), vec![note.clone()]).unwrap();

        memory.delete_note(&ctx, &note.id).await.unwrap();

        let result = memory.delete_note(&ctx, &note.id).await;
        assert!(matches!(result, Err(Error::NotFound)));

        let result = memory.find_single_note_by_id(&ctx, &note.id).await;
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn test_find_all_notes_by_user() {
        let ctx = Context::background();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        let owned = vec![note(owner, "one"), note(owner, "two"), note(owner, "three")];
        let mut notes = owned.clone();
        notes.push(note(other, "foreign"));

        let memory = Memory::seeded(Vec::new(), notes).unwrap();

        let found = memory.find_all_notes_by_user(&ctx, &owner).await.unwrap();
        let found = found.iter().map(|note| note.id).collect::<HashSet<_>>();
        let expected = owned.iter().map(|note| note.id).collect::<HashSet<_>>();
        assert_eq!(expected, found);

        let found = memory
            .find_all_notes_by_user(&ctx, &Uuid::new_v4())
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_seeded_rejects_duplicate_notes() {
        let note = note(Uuid::new_v4(), "twice");

        let result = Memory::seeded(Vec::new(), vec![note.clone(), note]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_seeded_rejects_duplicate_users() {
        let user = user("twice");

        let result = Memory::seeded(vec![user.clone(), user], Vec::new());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_users() {
        let ctx = Context::background();
        let memory = Memory::new();

        assert!(memory.find_any_single_user(&ctx).await.unwrap().is_none());

        let values = CreateUserValues {
            name: "someone",
            email: "someone@example.com",
        };
        let created = memory.create_user(&ctx, &values).await.unwrap();

        let found = memory
            .find_single_user_by_id(&ctx, &created.id)
            .await
            .unwrap();
        assert_eq!(created, found);

        let result = memory.find_single_user_by_id(&ctx, &Uuid::new_v4()).await;
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn test_ignores_cancelled_context() {
        let ctx = Context::background();
        ctx.cancel();

        let memory = Memory::new();
        let note = note(Uuid::new_v4(), "first");

        memory.create_note(&ctx, &note).await.unwrap();
        assert!(memory.find_single_note_by_id(&ctx, &note.id).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_single_writer() {
        const READERS: usize = 8;
        const WRITES: usize = 200;

        let owner = Uuid::new_v4();
        let memory = Memory::new();

        let mut set = JoinSet::new();

        let writer = memory.clone();
        set.spawn(async move {
            let ctx = Context::background();

            for i in 0..WRITES {
                writer
                    .create_note(&ctx, &note(owner, &format!("note {i}")))
                    .await
                    .unwrap();
            }

            WRITES
        });

        for _ in 0..READERS {
            let reader = memory.clone();
            set.spawn(async move {
                let ctx = Context::background();
                let mut last_seen = 0;

                for _ in 0..WRITES {
                    let notes = reader.find_all_notes_by_user(&ctx, &owner).await.unwrap();

                    // the writer only adds, a reader never sees the collection shrink
                    assert!(notes.len() >= last_seen);
                    assert!(notes.iter().all(|note| note.user_id == owner));
                    last_seen = notes.len();

                    tokio::task::yield_now().await;
                }

                last_seen
            });
        }

        while let Some(result) = set.join_next().await {
            assert!(result.unwrap() <= WRITES);
        }

        let ctx = Context::background();
        let notes = memory.find_all_notes_by_user(&ctx, &owner).await.unwrap();
        assert_eq!(WRITES, notes.len());
    }
}
