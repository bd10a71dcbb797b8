//! Postgres storage

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::notes::Note;
use crate::users::User;

use super::Context;
use super::CreateUserValues;
use super::Error;
use super::NoteRepository;
use super::Result;
use super::UserRepository;

/// Migrator to run migrations on startup
static MIGRATOR: Migrator = sqlx::migrate!();

/// Postgres storage
#[derive(Clone)]
pub struct Postgres {
    /// Pool of connections
    connection_pool: PgPool,
}

impl Postgres {
    /// Create Postgres storage from a connection string
    ///
    /// Migrations will be run
    ///
    /// # Errors
    ///
    /// Will return `Err` when no connection can be made or the migrations fail
    pub async fn connect(database_dsn: &str) -> Result<Self> {
        let connection_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_dsn)
            .await
            .map_err(backend_error)?;

        Self::new_with_pool(connection_pool).await
    }

    /// Create Postgres storage with existing pool
    ///
    /// Migrations will be run
    ///
    /// # Errors
    ///
    /// Will return `Err` when the migrations fail
    pub async fn new_with_pool(connection_pool: PgPool) -> Result<Self> {
        MIGRATOR.run(&connection_pool).await?;

        Ok(Self { connection_pool })
    }
}

/// Postgres version of a note, text columns are nullable
#[derive(sqlx::FromRow)]
struct PostgresNote {
    /// Note ID
    id: Uuid,

    /// Title
    title: Option<String>,

    /// Content
    content: Option<String>,

    /// Owner
    user_id: Uuid,
}

impl Note {
    /// Create note from postgres version
    fn from_postgres_note(note: PostgresNote) -> Self {
        Self {
            id: note.id,
            title: note.title.unwrap_or_default(),
            content: note.content.unwrap_or_default(),
            user_id: note.user_id,
        }
    }
}

/// Postgres version of a user
#[derive(sqlx::FromRow)]
struct PostgresUser {
    /// User ID
    id: Uuid,

    /// Display name
    name: String,

    /// Email address
    email: String,
}

impl User {
    /// Create user from postgres version
    fn from_postgres_user(user: PostgresUser) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

#[async_trait]
impl NoteRepository for Postgres {
    async fn create_note(&self, ctx: &Context, note: &Note) -> Result<()> {
        ctx.run(async {
            sqlx::query(
                r"
                INSERT INTO notes (id, title, content, user_id)
                VALUES ($1, $2, $3, $4)
                ",
            )
            .bind(note.id)
            .bind(&note.title)
            .bind(&note.content)
            .bind(note.user_id)
            .execute(&self.connection_pool)
            .await
            .map_err(backend_error)?;

            Ok(())
        })
        .await
    }

    async fn update_note(&self, ctx: &Context, note: &Note) -> Result<()> {
        ctx.run(async {
            let result = sqlx::query(
                r"
                UPDATE notes
                SET title = $1, content = $2, user_id = $3
                WHERE id = $4
                ",
            )
            .bind(&note.title)
            .bind(&note.content)
            .bind(note.user_id)
            .bind(note.id)
            .execute(&self.connection_pool)
            .await
            .map_err(backend_error)?;

            expect_affected(result.rows_affected())
        })
        .await
    }

    async fn delete_note(&self, ctx: &Context, note_id: &Uuid) -> Result<()> {
        ctx.run(async {
            let result = sqlx::query(
                r"
                DELETE FROM notes
                WHERE id = $1
                ",
            )
            .bind(note_id)
            .execute(&self.connection_pool)
            .await
            .map_err(backend_error)?;

            expect_affected(result.rows_affected())
        })
        .await
    }

    async fn find_single_note_by_id(&self, ctx: &Context, note_id: &Uuid) -> Result<Note> {
        ctx.run(async {
            sqlx::query_as::<_, PostgresNote>(
                r"
                SELECT id, title, content, user_id
                FROM notes
                WHERE id = $1
                LIMIT 1
                ",
            )
            .bind(note_id)
            .fetch_one(&self.connection_pool)
            .await
            .map(Note::from_postgres_note)
            .map_err(backend_error)
        })
        .await
    }

    async fn find_all_notes_by_user(&self, ctx: &Context, user_id: &Uuid) -> Result<Vec<Note>> {
        ctx.run(async {
            let notes = sqlx::query_as::<_, PostgresNote>(
                r"
                SELECT id, title, content, user_id
                FROM notes
                WHERE user_id = $1
                ",
            )
            .bind(user_id)
            .fetch_all(&self.connection_pool)
            .await
            .map_err(backend_error)?;

            Ok(notes.into_iter().map(Note::from_postgres_note).collect())
        })
        .await
    }
}

#[async_trait]
impl UserRepository for Postgres {
    async fn find_any_single_user(&self, ctx: &Context) -> Result<Option<User>> {
        ctx.run(async {
            sqlx::query_as::<_, PostgresUser>(
                r"
                SELECT id, name, email
                FROM users
                LIMIT 1
                ",
            )
            .fetch_optional(&self.connection_pool)
            .await
            .map(|user| user.map(User::from_postgres_user))
            .map_err(backend_error)
        })
        .await
    }

    async fn find_single_user_by_id(&self, ctx: &Context, user_id: &Uuid) -> Result<User> {
        ctx.run(async {
            sqlx::query_as::<_, PostgresUser>(
                r"
                SELECT id, name, email
                FROM users
                WHERE id = $1
                LIMIT 1
                ",
            )
            .bind(user_id)
            .fetch_one(&self.connection_pool)
            .await
            .map(User::from_postgres_user)
            .map_err(backend_error)
        })
        .await
    }

    async fn create_user(&self, ctx: &Context, values: &CreateUserValues<'_>) -> Result<User> {
        ctx.run(async {
            sqlx::query_as::<_, PostgresUser>(
                r"
                INSERT INTO users (id, name, email)
                VALUES ($1, $2, $3)
                RETURNING id, name, email
                ",
            )
            .bind(Uuid::new_v4())
            .bind(values.name)
            .bind(values.email)
            .fetch_one(&self.connection_pool)
            .await
            .map(User::from_postgres_user)
            .map_err(backend_error)
        })
        .await
    }
}

/// Updates and deletes address exactly one row by primary key
fn expect_affected(rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(Error::NotFound)
    } else {
        Ok(())
    }
}

/// Convert `SQLx` to storage error, keeping the kinds callers match on apart
fn backend_error(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::RowNotFound => Error::NotFound,
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Error::AlreadyExists,
        err => Error::Backend(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(user_id: Uuid) -> Note {
        Note {
            id: Uuid::new_v4(),
            title: "title".to_string(),
            content: "content".to_string(),
            user_id,
        }
    }

    #[test]
    fn test_expect_affected() {
        assert!(matches!(expect_affected(0), Err(Error::NotFound)));
        assert!(expect_affected(1).is_ok());
    }

    #[test]
    fn test_backend_error_row_not_found() {
        assert!(matches!(
            backend_error(sqlx::Error::RowNotFound),
            Error::NotFound
        ));
        assert!(matches!(
            backend_error(sqlx::Error::PoolTimedOut),
            Error::Backend(_)
        ));
    }

    #[sqlx::test]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn test_note_lifecycle(pool: PgPool) {
        let ctx = Context::background();
        let postgres = Postgres::new_with_pool(pool).await.unwrap();
        let owner = Uuid::new_v4();
        let mut note = note(owner);

        postgres.create_note(&ctx, &note).await.unwrap();

        let result = postgres.create_note(&ctx, &note).await;
        assert!(matches!(result, Err(Error::AlreadyExists)));

        let found = postgres
            .find_single_note_by_id(&ctx, &note.id)
            .await
            .unwrap();
        assert_eq!(note, found);

        note.content = String::new();
        postgres.update_note(&ctx, &note).await.unwrap();

        let found = postgres.find_all_notes_by_user(&ctx, &owner).await.unwrap();
        assert_eq!(vec![note.clone()], found);

        postgres.delete_note(&ctx, &note.id).await.unwrap();

        let result = postgres.delete_note(&ctx, &note.id).await;
        assert!(matches!(result, Err(Error::NotFound)));

        let result = postgres.update_note(&ctx, &note).await;
        assert!(matches!(result, Err(Error::NotFound)));

        let found = postgres.find_all_notes_by_user(&ctx, &owner).await.unwrap();
        assert!(found.is_empty());
    }

    #[sqlx::test]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn test_cancelled_query(pool: PgPool) {
        let ctx = Context::background();
        ctx.cancel();

        let postgres = Postgres::new_with_pool(pool).await.unwrap();

        let result = postgres.find_single_note_by_id(&ctx, &Uuid::new_v4()).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[sqlx::test]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn test_users(pool: PgPool) {
        let ctx = Context::background();
        let postgres = Postgres::new_with_pool(pool).await.unwrap();

        assert!(postgres.find_any_single_user(&ctx).await.unwrap().is_none());

        let values = CreateUserValues {
            name: "someone",
            email: "someone@example.com",
        };
        let created = postgres.create_user(&ctx, &values).await.unwrap();

        let found = postgres
            .find_single_user_by_id(&ctx, &created.id)
            .await
            .unwrap();
        assert_eq!(created, found);

        let result = postgres
            .find_single_user_by_id(&ctx, &Uuid::new_v4())
            .await;
        assert!(matches!(result, Err(Error::NotFound)));
    }
}
