use std::{str::FromStr, time::Duration};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Sqlite, SqlitePool, Transaction,
};

use crate::config::Config;

// ids are v7 uuids stored as 16 byte blobs, so blob order is creation order
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BLOB PRIMARY KEY NOT NULL,
    username TEXT NOT NULL UNIQUE COLLATE NOCASE,
    avatar_url TEXT
);

CREATE TABLE IF NOT EXISTS conversations (
    id BLOB PRIMARY KEY NOT NULL,
    last_message_id BLOB REFERENCES messages(id)
);

CREATE TABLE IF NOT EXISTS participants (
    user_id BLOB NOT NULL REFERENCES users(id),
    conversation_id BLOB NOT NULL REFERENCES conversations(id),
    messages_read_at TEXT NOT NULL,
    PRIMARY KEY (user_id, conversation_id)
);

CREATE INDEX IF NOT EXISTS participants_conversation ON participants (conversation_id);

CREATE TABLE IF NOT EXISTS messages (
    id BLOB PRIMARY KEY NOT NULL,
    content TEXT NOT NULL,
    user_id BLOB NOT NULL REFERENCES users(id),
    conversation_id BLOB NOT NULL REFERENCES conversations(id),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS messages_conversation ON messages (conversation_id, id DESC);
"#;

pub async fn connect(config: &Config) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    let db_pool = SqlitePoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect_with(options)
        .await?;

    migrate(&db_pool).await?;
    Ok(db_pool)
}

pub async fn migrate(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(db_pool).await?;
    Ok(())
}

/// Transaction that holds the write lock from its first statement.
///
/// A deferred transaction that reads before it writes cannot wait for the
/// lock: SQLite refuses its upgrade with `SQLITE_BUSY` as soon as another
/// writer is active. Anything that checks and then writes starts here.
pub async fn begin_write(db_pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    db_pool.begin_with("BEGIN IMMEDIATE").await
}

/// File-backed database in `dir`, opened the way the server opens it.
#[cfg(test)]
pub(crate) async fn on_disk(dir: &std::path::Path) -> SqlitePool {
    let url = format!("sqlite://{}?mode=rwc", dir.join("whisperline.db").display());
    let config = Config::from_lookup(|key| (key == "DATABASE_URL").then(|| url.clone())).unwrap();
    connect(&config).await.unwrap()
}

/// Single connection in-memory database with the schema applied.
#[cfg(test)]
pub(crate) async fn memory() -> SqlitePool {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&db_pool).await.unwrap();
    db_pool
}
