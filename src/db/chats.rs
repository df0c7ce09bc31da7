//! Chat rooms and their members.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Sqlite};

use super::page::push_page_clauses;
use super::run_atomic;
use crate::pagination::{Identified, PageQuery, RecordSource};

#[derive(Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: i64,
    pub user_ids: Vec<i64>,
    pub created_at: String,
}

impl Identified for Chat {
    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(sqlx::FromRow)]
struct ChatRow {
    id: i64,
    user_ids: Option<String>,
    created_at: String,
}

impl From<ChatRow> for Chat {
    fn from(row: ChatRow) -> Self {
        let mut user_ids: Vec<i64> = row
            .user_ids
            .as_deref()
            .unwrap_or("")
            .split(',')
            .filter_map(|id| id.parse().ok())
            .collect();
        user_ids.sort_unstable();

        Self {
            id: row.id,
            user_ids,
            created_at: row.created_at,
        }
    }
}

const CHAT_SELECT: &str = "SELECT c.id, c.created_at, \
     (SELECT group_concat(cu.user_id) FROM chat_users cu WHERE cu.chat_id = c.id) AS user_ids \
     FROM chats c";

impl ChatStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a chat with the given members. Returns the chat ID.
    pub async fn create(&self, user_ids: &[i64]) -> Result<i64, sqlx::Error> {
        let mut members = user_ids.to_vec();
        members.sort_unstable();
        members.dedup();

        run_atomic(&self.pool, move |conn| {
            Box::pin(async move {
                let result = sqlx::query("INSERT INTO chats DEFAULT VALUES")
                    .execute(&mut *conn)
                    .await?;
                let chat_id = result.last_insert_rowid();

                for user_id in &members {
                    sqlx::query("INSERT INTO chat_users (chat_id, user_id) VALUES (?, ?)")
                        .bind(chat_id)
                        .bind(*user_id)
                        .execute(&mut *conn)
                        .await?;
                }

                Ok(chat_id)
            })
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Chat>, sqlx::Error> {
        let row: Option<ChatRow> = sqlx::query_as(&format!("{} WHERE c.id = ?", CHAT_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Chat::from))
    }

    pub async fn exists(&self, id: i64) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM chats WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn is_member(&self, chat_id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM chat_users WHERE chat_id = ? AND user_id = ?")
                .bind(chat_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }
}

impl RecordSource for ChatStore {
    type Item = Chat;
    type Error = sqlx::Error;

    async fn fetch(&self, query: &PageQuery) -> Result<Vec<Chat>, sqlx::Error> {
        let mut qb = QueryBuilder::<Sqlite>::new(CHAT_SELECT);
        qb.push(" WHERE 1 = 1");
        push_page_clauses(&mut qb, query, "c.id", "c.created_at");

        let rows: Vec<ChatRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Chat::from).collect())
    }

    async fn count(&self) -> Result<u64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chats")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
