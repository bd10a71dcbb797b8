//! Notes and the operations on them
//!
//! The service sits between the HTTP handlers and the repositories. It checks that owners exist
//! and applies partial updates, it does not check who is calling: ownership is the business of the
//! endpoint that knows the authenticated user.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::storage;
use crate::storage::Context;
use crate::storage::NoteRepository;
use crate::users::UserService;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub user_id: Uuid,
}

/// Partial update of a note
///
/// `None` leaves the field alone, `Some("")` clears it
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateNote {
    pub title: Option<String>,
    pub content: Option<String>,
    pub user_id: Uuid,
}

impl Note {
    /// Apply the present fields of an update, the ID and owner never change
    fn apply(&mut self, values: &UpdateNote) {
        if let Some(title) = &values.title {
            self.title.clone_from(title);
        }

        if let Some(content) = &values.content {
            self.content.clone_from(content);
        }
    }
}

/// Note service errors
#[derive(Debug, Error)]
pub enum Error {
    /// The owner of a new note is not a known user
    #[error("createNote: owner [{0}] not found")]
    OwnerNotFound(Uuid),

    /// The repository failed, `id` is the note or user the operation was about
    #[error("{operation}: [{id}]: {source}")]
    Storage {
        operation: &'static str,
        id: Uuid,
        #[source]
        source: storage::Error,
    },
}

impl Error {
    fn storage(operation: &'static str, id: Uuid) -> impl FnOnce(storage::Error) -> Self {
        move |source| Self::Storage {
            operation,
            id,
            source,
        }
    }

    /// The underlying repository error, if any
    pub fn storage_error(&self) -> Option<&storage::Error> {
        match self {
            Self::OwnerNotFound(_) => None,
            Self::Storage { source, .. } => Some(source),
        }
    }

    /// Is this caused by a missing note?
    pub fn is_not_found(&self) -> bool {
        self.storage_error().is_some_and(storage::Error::is_not_found)
    }

    /// Name of the failed operation
    pub fn operation(&self) -> &'static str {
        match self {
            Self::OwnerNotFound(_) => "createNote",
            Self::Storage { operation, .. } => *operation,
        }
    }
}

/// Result type for all note operations
pub type Result<T> = core::result::Result<T, Error>;

/// Domain operations on notes
#[derive(Clone)]
pub struct NoteService {
    notes: Arc<dyn NoteRepository>,
    users: UserService,
}

impl NoteService {
    pub fn new(notes: Arc<dyn NoteRepository>, users: UserService) -> Self {
        Self { notes, users }
    }

    /// Create a note for an existing user
    ///
    /// Absent fields become empty, the note gets a fresh random ID
    pub async fn create(&self, ctx: &Context, values: &UpdateNote) -> Result<Note> {
        self.users
            .query_by_id(ctx, &values.user_id)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    Error::OwnerNotFound(values.user_id)
                } else {
                    Error::storage("createNote", values.user_id)(err)
                }
            })?;

        let note = Note {
            id: Uuid::new_v4(),
            title: values.title.clone().unwrap_or_default(),
            content: values.content.clone().unwrap_or_default(),
            user_id: values.user_id,
        };

        self.notes
            .create_note(ctx, &note)
            .await
            .map_err(Error::storage("createNote", note.id))?;

        Ok(note)
    }

    /// Update an existing note with the fields present in `values`
    pub async fn update(&self, ctx: &Context, note: &Note, values: &UpdateNote) -> Result<Note> {
        let mut updated = note.clone();
        updated.apply(values);

        self.notes
            .update_note(ctx, &updated)
            .await
            .map_err(Error::storage("updateNote", note.id))?;

        Ok(updated)
    }

    pub async fn delete(&self, ctx: &Context, note_id: &Uuid) -> Result<()> {
        self.notes
            .delete_note(ctx, note_id)
            .await
            .map_err(Error::storage("delete", *note_id))
    }

    pub async fn query_by_id(&self, ctx: &Context, note_id: &Uuid) -> Result<Note> {
        self.notes
            .find_single_note_by_id(ctx, note_id)
            .await
            .map_err(Error::storage("getNoteByID", *note_id))
    }

    /// All notes of a user, empty when the user has none
    pub async fn query_by_user(&self, ctx: &Context, user_id: &Uuid) -> Result<Vec<Note>> {
        self.notes
            .find_all_notes_by_user(ctx, user_id)
            .await
            .map_err(Error::storage("getNoteByUserID", *user_id))
    }
}
