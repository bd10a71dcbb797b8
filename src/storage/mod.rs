//! All things related to the storage of users and notes

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::notes::Note;
use crate::users::User;

pub use context::Context;
pub use memory::Memory;
pub use postgres::Postgres;

mod context;
mod memory;
mod postgres;

/// Storage errors
#[derive(Debug, Error)]
pub enum Error {
    /// No record with the requested ID
    #[error("not found")]
    NotFound,

    /// A record with the same ID is already stored
    #[error("already exists")]
    AlreadyExists,

    /// Construction time invariant violated, only seeded storage checks any
    #[cfg_attr(not(test), allow(dead_code))]
    #[error("invalid storage configuration: {0}")]
    Config(String),

    /// The context got cancelled before the call finished
    #[error("cancelled")]
    Cancelled,

    /// The context deadline passed before the call finished
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Any other fault of the backend
    #[error("backend error: {0}")]
    Backend(#[source] sqlx::Error),

    /// Migrations could not be applied
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl Error {
    /// Is this a "no such record" error?
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Result type for all storage interactions
pub type Result<T> = core::result::Result<T, Error>;

/// Values to create a User
pub struct CreateUserValues<'a> {
    /// Display name
    pub name: &'a str,

    /// Email address
    pub email: &'a str,
}

/// Persistence of notes, keyed by note ID
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Store a new note
    ///
    /// Fails with [`Error::AlreadyExists`] when the note ID is taken
    async fn create_note(&self, ctx: &Context, note: &Note) -> Result<()>;

    /// Replace a stored note
    ///
    /// Fails with [`Error::NotFound`] when no note has that ID
    async fn update_note(&self, ctx: &Context, note: &Note) -> Result<()>;

    /// Remove a stored note
    ///
    /// Fails with [`Error::NotFound`] when no note has that ID
    async fn delete_note(&self, ctx: &Context, note_id: &Uuid) -> Result<()>;

    /// Find a single note by its ID
    async fn find_single_note_by_id(&self, ctx: &Context, note_id: &Uuid) -> Result<Note>;

    /// Find all notes owned by a user, in no particular order
    ///
    /// A user without notes gets an empty list
    async fn find_all_notes_by_user(&self, ctx: &Context, user_id: &Uuid) -> Result<Vec<Note>>;
}

/// Persistence of users
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find any single user
    async fn find_any_single_user(&self, ctx: &Context) -> Result<Option<User>>;

    /// Find a single user by its ID
    ///
    /// Fails with [`Error::NotFound`] when no user has that ID
    async fn find_single_user_by_id(&self, ctx: &Context, user_id: &Uuid) -> Result<User>;

    /// Create a single user
    async fn create_user(&self, ctx: &Context, values: &CreateUserValues<'_>) -> Result<User>;
}

/// The repositories the app runs on
#[derive(Clone)]
pub struct Storage {
    /// Note persistence
    pub notes: Arc<dyn NoteRepository>,

    /// User persistence
    pub users: Arc<dyn UserRepository>,
}

impl Storage {
    /// Use a single backend for both notes and users
    pub fn from_backend<B>(backend: B) -> Self
    where
        B: NoteRepository + UserRepository + 'static,
    {
        let backend = Arc::new(backend);

        Self {
            notes: backend.clone(),
            users: backend,
        }
    }
}

/// Setup the storage
///
/// An empty connection string selects the in-memory backend, anything else is handed to Postgres
///
/// # Errors
///
/// Will return `Err` when Postgres can not be reached or migrated
pub async fn setup(database_dsn: &str) -> Result<Storage> {
    if database_dsn.is_empty() {
        tracing::info!("No `DATABASE_URL` set, using in-memory storage");

        Ok(Storage::from_backend(Memory::new()))
    } else {
        tracing::info!("Using Postgres storage");

        Postgres::connect(database_dsn)
            .await
            .map(Storage::from_backend)
    }
}
