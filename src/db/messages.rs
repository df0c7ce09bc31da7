//! Chat message storage.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Sqlite};

use super::Author;
use super::page::push_page_clauses;
use crate::pagination::{Identified, PageQuery, RecordSource};

#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub chat_id: i64,
    pub author: Author,
    pub message: String,
    pub created_at: String,
}

impl Identified for ChatMessage {
    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    chat_id: i64,
    author_id: i64,
    author_nickname: String,
    message: String,
    created_at: String,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            chat_id: row.chat_id,
            author: Author {
                id: row.author_id,
                nickname: row.author_nickname,
            },
            message: row.message,
            created_at: row.created_at,
        }
    }
}

const MESSAGE_SELECT: &str = "SELECT m.id, m.chat_id, m.author_id, u.nickname AS author_nickname, \
     m.message, m.created_at FROM messages m JOIN users u ON u.id = m.author_id";

impl MessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a message and return it as persisted.
    pub async fn create(
        &self,
        chat_id: i64,
        author_id: i64,
        message: &str,
    ) -> Result<ChatMessage, sqlx::Error> {
        let result =
            sqlx::query("INSERT INTO messages (chat_id, author_id, message) VALUES (?, ?, ?)")
                .bind(chat_id)
                .bind(author_id)
                .bind(message)
                .execute(&self.pool)
                .await?;

        let row: MessageRow = sqlx::query_as(&format!("{} WHERE m.id = ?", MESSAGE_SELECT))
            .bind(result.last_insert_rowid())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    /// The messages of one chat as a pageable source.
    pub fn for_chat(&self, chat_id: i64) -> ChatMessages {
        ChatMessages {
            pool: self.pool.clone(),
            chat_id,
        }
    }
}

/// Messages of a single chat.
pub struct ChatMessages {
    pool: SqlitePool,
    chat_id: i64,
}

impl RecordSource for ChatMessages {
    type Item = ChatMessage;
    type Error = sqlx::Error;

    async fn fetch(&self, query: &PageQuery) -> Result<Vec<ChatMessage>, sqlx::Error> {
        let mut qb = QueryBuilder::<Sqlite>::new(MESSAGE_SELECT);
        qb.push(" WHERE m.chat_id = ").push_bind(self.chat_id);
        push_page_clauses(&mut qb, query, "m.id", "m.created_at");

        let rows: Vec<MessageRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }

    async fn count(&self) -> Result<u64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE chat_id = ?")
            .bind(self.chat_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
