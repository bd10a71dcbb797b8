use axum::Extension;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::notes;
use crate::notes::Note;
use crate::notes::NoteService;
use crate::notes::UpdateNote;
use crate::storage::Context;

use super::CurrentUser;
use super::Error;
use super::Form;
use super::PathParameters;
use super::Success;

#[derive(Debug, Serialize)]
pub struct NoteResponse {
    #[serde(rename = "ID")]
    pub id: Uuid,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(rename = "UserID")]
    pub user_id: Uuid,
}

impl NoteResponse {
    fn from_note(note: Note) -> Self {
        Self {
            id: note.id,
            title: note.title,
            content: note.content,
            user_id: note.user_id,
        }
    }

    fn from_note_multiple(notes: Vec<Note>) -> Vec<Self> {
        notes.into_iter().map(Self::from_note).collect()
    }
}

/// Body of create and update requests
///
/// A missing field stays `None`, an empty string is kept as is
#[derive(Debug, Deserialize)]
pub struct NoteForm {
    #[serde(default, alias = "Title")]
    title: Option<String>,
    #[serde(default, alias = "Content")]
    content: Option<String>,
}

impl NoteForm {
    fn into_update(self, user_id: Uuid) -> UpdateNote {
        UpdateNote {
            title: self.title,
            content: self.content,
            user_id,
        }
    }
}

pub async fn list(
    Extension(note_service): Extension<NoteService>,
    ctx: Context,
    current_user: CurrentUser,
    PathParameters(user_id): PathParameters<Uuid>,
) -> Result<Success<Vec<NoteResponse>>, Error> {
    current_user.ensure_is(&user_id)?;

    let notes = note_service
        .query_by_user(&ctx, &user_id)
        .await
        .map_err(|err| service_error(&err, &user_id, None))?;

    Ok(Success::ok(NoteResponse::from_note_multiple(notes)))
}

pub async fn single(
    Extension(note_service): Extension<NoteService>,
    ctx: Context,
    current_user: CurrentUser,
    PathParameters((user_id, note_id)): PathParameters<(Uuid, Uuid)>,
) -> Result<Success<NoteResponse>, Error> {
    current_user.ensure_is(&user_id)?;

    get_owned_note(&note_service, &ctx, &current_user, &note_id)
        .await
        .map(|note| Success::ok(NoteResponse::from_note(note)))
}

pub async fn create(
    Extension(note_service): Extension<NoteService>,
    ctx: Context,
    current_user: CurrentUser,
    PathParameters(user_id): PathParameters<Uuid>,
    Form(form): Form<NoteForm>,
) -> Result<Success<NoteResponse>, Error> {
    current_user.ensure_is(&user_id)?;

    let note = note_service
        .create(&ctx, &form.into_update(user_id))
        .await
        .map_err(|err| service_error(&err, &user_id, None))?;

    Ok(Success::accepted(NoteResponse::from_note(note)))
}

pub async fn update(
    Extension(note_service): Extension<NoteService>,
    ctx: Context,
    current_user: CurrentUser,
    PathParameters((user_id, note_id)): PathParameters<(Uuid, Uuid)>,
    Form(form): Form<NoteForm>,
) -> Result<Success<NoteResponse>, Error> {
    current_user.ensure_is(&user_id)?;

    let note = get_owned_note(&note_service, &ctx, &current_user, &note_id).await?;

    let note = note_service
        .update(&ctx, &note, &form.into_update(user_id))
        .await
        .map_err(|err| service_error(&err, &user_id, Some(&note_id)))?;

    Ok(Success::ok(NoteResponse::from_note(note)))
}

pub async fn delete(
    Extension(note_service): Extension<NoteService>,
    ctx: Context,
    current_user: CurrentUser,
    PathParameters((user_id, note_id)): PathParameters<(Uuid, Uuid)>,
) -> Result<Success<&'static str>, Error> {
    current_user.ensure_is(&user_id)?;

    let note = get_owned_note(&note_service, &ctx, &current_user, &note_id).await?;

    note_service
        .delete(&ctx, &note.id)
        .await
        .map_err(|err| service_error(&err, &user_id, Some(&note_id)))?;

    Ok(Success::<&'static str>::no_content())
}

/// Load a note and make sure the caller owns it
async fn get_owned_note(
    note_service: &NoteService,
    ctx: &Context,
    current_user: &CurrentUser,
    note_id: &Uuid,
) -> Result<Note, Error> {
    let note = note_service
        .query_by_id(ctx, note_id)
        .await
        .map_err(|err| service_error(&err, &current_user.id(), Some(note_id)))?;

    if note.user_id != current_user.id() {
        tracing::info!(
            user_id = %current_user.id(),
            note_id = %note_id,
            "Refused access to note of another user"
        );

        return Err(Error::forbidden("Not allowed to access"));
    }

    Ok(note)
}

/// Log a failed service call and turn it into a response
fn service_error(err: &notes::Error, user_id: &Uuid, note_id: Option<&Uuid>) -> Error {
    tracing::error!(
        operation = err.operation(),
        user_id = %user_id,
        note_id = note_id.map(tracing::field::display),
        error = %err,
        "Note operation failed"
    );

    if err.is_not_found() {
        Error::not_found("Note not found")
    } else if matches!(err, notes::Error::OwnerNotFound(_)) {
        Error::forbidden("Owner not found")
    } else {
        Error::internal_server_error("Could not handle note")
    }
}
