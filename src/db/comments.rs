//! Comment storage. Comments always belong to a post.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Sqlite};

use super::page::push_page_clauses;
use super::run_atomic;
use super::Author;
use crate::pagination::{Identified, PageQuery, RecordSource};

#[derive(Clone)]
pub struct CommentStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author: Author,
    pub comment: String,
    pub like_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Identified for Comment {
    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    post_id: i64,
    author_id: i64,
    author_nickname: String,
    comment: String,
    like_count: i64,
    created_at: String,
    updated_at: String,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            author: Author {
                id: row.author_id,
                nickname: row.author_nickname,
            },
            comment: row.comment,
            like_count: row.like_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.author_id, u.nickname AS author_nickname, \
     c.comment, c.like_count, c.created_at, c.updated_at \
     FROM comments c JOIN users u ON u.id = c.author_id";

impl CommentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a comment and bump the post's comment count. Returns the comment ID.
    pub async fn create(
        &self,
        post_id: i64,
        author_id: i64,
        comment: &str,
    ) -> Result<i64, sqlx::Error> {
        let comment = comment.to_string();

        run_atomic(&self.pool, move |conn| {
            Box::pin(async move {
                let result = sqlx::query(
                    "INSERT INTO comments (post_id, author_id, comment) VALUES (?, ?, ?)",
                )
                .bind(post_id)
                .bind(author_id)
                .bind(&comment)
                .execute(&mut *conn)
                .await?;

                sqlx::query("UPDATE posts SET comment_count = comment_count + 1 WHERE id = ?")
                    .bind(post_id)
                    .execute(&mut *conn)
                    .await?;

                Ok(result.last_insert_rowid())
            })
        })
        .await
    }

    /// Get a comment of a given post.
    pub async fn get(&self, post_id: i64, id: i64) -> Result<Option<Comment>, sqlx::Error> {
        let row: Option<CommentRow> = sqlx::query_as(&format!(
            "{} WHERE c.post_id = ? AND c.id = ?",
            COMMENT_SELECT
        ))
        .bind(post_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Comment::from))
    }

    /// Update the given fields. Returns false if the comment doesn't exist on that post.
    pub async fn update(
        &self,
        post_id: i64,
        id: i64,
        comment: Option<&str>,
        like_count: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE comments SET comment = COALESCE(?, comment), \
             like_count = COALESCE(?, like_count), updated_at = datetime('now') \
             WHERE post_id = ? AND id = ?",
        )
        .bind(comment)
        .bind(like_count)
        .bind(post_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a comment and decrement the post's comment count.
    pub async fn delete(&self, post_id: i64, id: i64) -> Result<bool, sqlx::Error> {
        run_atomic(&self.pool, move |conn| {
            Box::pin(async move {
                let result = sqlx::query("DELETE FROM comments WHERE post_id = ? AND id = ?")
                    .bind(post_id)
                    .bind(id)
                    .execute(&mut *conn)
                    .await?;

                if result.rows_affected() == 0 {
                    return Ok(false);
                }

                sqlx::query(
                    "UPDATE posts SET comment_count = MAX(comment_count - 1, 0) WHERE id = ?",
                )
                .bind(post_id)
                .execute(&mut *conn)
                .await?;

                Ok(true)
            })
        })
        .await
    }

    /// Author of a comment, or None if the comment doesn't exist.
    pub async fn author_of(&self, id: i64) -> Result<Option<i64>, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT author_id FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }

    /// The comments of one post as a pageable source.
    pub fn for_post(&self, post_id: i64) -> PostComments {
        PostComments {
            pool: self.pool.clone(),
            post_id,
        }
    }
}

/// Comments of a single post.
pub struct PostComments {
    pool: SqlitePool,
    post_id: i64,
}

impl RecordSource for PostComments {
    type Item = Comment;
    type Error = sqlx::Error;

    async fn fetch(&self, query: &PageQuery) -> Result<Vec<Comment>, sqlx::Error> {
        let mut qb = QueryBuilder::<Sqlite>::new(COMMENT_SELECT);
        qb.push(" WHERE c.post_id = ").push_bind(self.post_id);
        push_page_clauses(&mut qb, query, "c.id", "c.created_at");

        let rows: Vec<CommentRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn count(&self) -> Result<u64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM comments WHERE post_id = ?")
            .bind(self.post_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::pagination::{Order, PageQuery, RecordSource, SortKey};

    async fn setup() -> (Database, i64, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let author = db
            .users()
            .create("alice@example.com", "alice", "hash")
            .await
            .unwrap();
        let post = db.posts().create(author, "t", "c", &[]).await.unwrap();
        (db, author, post)
    }

    #[tokio::test]
    async fn test_comment_count_follows_comments() {
        let (db, author, post) = setup().await;

        let id = db.comments().create(post, author, "first").await.unwrap();
        db.comments().create(post, author, "second").await.unwrap();
        assert_eq!(db.posts().get(post).await.unwrap().unwrap().comment_count, 2);

        assert!(db.comments().delete(post, id).await.unwrap());
        assert_eq!(db.posts().get(post).await.unwrap().unwrap().comment_count, 1);

        assert!(!db.comments().delete(post, id).await.unwrap());
        assert_eq!(db.posts().get(post).await.unwrap().unwrap().comment_count, 1);
    }

    #[tokio::test]
    async fn test_update_like_count() {
        let (db, author, post) = setup().await;
        let id = db.comments().create(post, author, "hi").await.unwrap();

        assert!(db.comments().update(post, id, None, Some(3)).await.unwrap());

        let comment = db.comments().get(post, id).await.unwrap().unwrap();
        assert_eq!(comment.comment, "hi");
        assert_eq!(comment.like_count, 3);
    }

    #[tokio::test]
    async fn test_for_post_is_scoped() {
        let (db, author, post) = setup().await;
        let other = db.posts().create(author, "t2", "c2", &[]).await.unwrap();
        db.comments().create(post, author, "a").await.unwrap();
        db.comments().create(other, author, "b").await.unwrap();
        db.comments().create(post, author, "c").await.unwrap();

        let source = db.comments().for_post(post);
        let query = PageQuery {
            id_bound: None,
            sort: SortKey::Id,
            order: Order::Asc,
            offset: 0,
            limit: 10,
        };
        let comments = source.fetch(&query).await.unwrap();

        let texts: Vec<&str> = comments.iter().map(|c| c.comment.as_str()).collect();
        assert_eq!(texts, vec!["a", "c"]);
        assert_eq!(source.count().await.unwrap(), 2);
    }
}
