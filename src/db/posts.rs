//! Post storage.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;

use super::page::push_page_clauses;
use super::run_atomic;
use crate::pagination::{Identified, PageQuery, RecordSource};

#[derive(Clone)]
pub struct PostStore {
    pool: SqlitePool,
}

/// Author summary embedded in posts, comments and messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Author {
    pub id: i64,
    pub nickname: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub author: Author,
    pub title: String,
    pub content: String,
    pub like_count: i64,
    pub comment_count: i64,
    /// Storage paths of already-uploaded images, in display order
    pub images: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Identified for Post {
    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    author_id: i64,
    author_nickname: String,
    title: String,
    content: String,
    like_count: i64,
    comment_count: i64,
    created_at: String,
    updated_at: String,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            author: Author {
                id: row.author_id,
                nickname: row.author_nickname,
            },
            title: row.title,
            content: row.content,
            like_count: row.like_count,
            comment_count: row.comment_count,
            images: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const POST_SELECT: &str = "SELECT p.id, p.author_id, u.nickname AS author_nickname, p.title, \
     p.content, p.like_count, p.comment_count, p.created_at, p.updated_at \
     FROM posts p JOIN users u ON u.id = p.author_id";

impl PostStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a post together with its image paths. Returns the post ID.
    pub async fn create(
        &self,
        author_id: i64,
        title: &str,
        content: &str,
        images: &[String],
    ) -> Result<i64, sqlx::Error> {
        let title = title.to_string();
        let content = content.to_string();
        let images = images.to_vec();

        run_atomic(&self.pool, move |conn| {
            Box::pin(async move {
                let result =
                    sqlx::query("INSERT INTO posts (author_id, title, content) VALUES (?, ?, ?)")
                        .bind(author_id)
                        .bind(&title)
                        .bind(&content)
                        .execute(&mut *conn)
                        .await?;
                let post_id = result.last_insert_rowid();

                for (position, path) in images.iter().enumerate() {
                    sqlx::query("INSERT INTO post_images (post_id, position, path) VALUES (?, ?, ?)")
                        .bind(post_id)
                        .bind(position as i64)
                        .bind(path)
                        .execute(&mut *conn)
                        .await?;
                }

                Ok(post_id)
            })
        })
        .await
    }

    /// Get a post with its images.
    pub async fn get(&self, id: i64) -> Result<Option<Post>, sqlx::Error> {
        let row: Option<PostRow> = sqlx::query_as(&format!("{} WHERE p.id = ?", POST_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut posts = vec![Post::from(row)];
        self.attach_images(&mut posts).await?;
        Ok(posts.pop())
    }

    /// Update the given fields. Returns false if the post doesn't exist.
    pub async fn update(
        &self,
        id: i64,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE posts SET title = COALESCE(?, title), content = COALESCE(?, content), \
             updated_at = datetime('now') WHERE id = ?",
        )
        .bind(title)
        .bind(content)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a post. Comments and images go with it.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Author of a post, or None if the post doesn't exist.
    pub async fn author_of(&self, id: i64) -> Result<Option<i64>, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT author_id FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }

    pub async fn exists(&self, id: i64) -> Result<bool, sqlx::Error> {
        Ok(self.author_of(id).await?.is_some())
    }

    async fn attach_images(&self, posts: &mut [Post]) -> Result<(), sqlx::Error> {
        if posts.is_empty() {
            return Ok(());
        }

        let mut qb =
            QueryBuilder::<Sqlite>::new("SELECT post_id, path FROM post_images WHERE post_id IN (");
        let mut separated = qb.separated(", ");
        for post in posts.iter() {
            separated.push_bind(post.id);
        }
        separated.push_unseparated(") ORDER BY post_id, position");

        let rows: Vec<(i64, String)> = qb.build_query_as().fetch_all(&self.pool).await?;

        let mut by_post: HashMap<i64, Vec<String>> = HashMap::new();
        for (post_id, path) in rows {
            by_post.entry(post_id).or_default().push(path);
        }
        for post in posts.iter_mut() {
            if let Some(images) = by_post.remove(&post.id) {
                post.images = images;
            }
        }

        Ok(())
    }
}

impl RecordSource for PostStore {
    type Item = Post;
    type Error = sqlx::Error;

    async fn fetch(&self, query: &PageQuery) -> Result<Vec<Post>, sqlx::Error> {
        let mut qb = QueryBuilder::<Sqlite>::new(POST_SELECT);
        qb.push(" WHERE 1 = 1");
        push_page_clauses(&mut qb, query, "p.id", "p.created_at");

        let rows: Vec<PostRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        let mut posts: Vec<Post> = rows.into_iter().map(Post::from).collect();
        self.attach_images(&mut posts).await?;
        Ok(posts)
    }

    async fn count(&self) -> Result<u64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::pagination::{IdBound, Order, PageQuery, RecordSource, SortKey};

    async fn setup() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let author = db
            .users()
            .create("alice@example.com", "alice", "hash")
            .await
            .unwrap();
        (db, author)
    }

    #[tokio::test]
    async fn test_create_with_images() {
        let (db, author) = setup().await;
        let images = vec!["a.png".to_string(), "b.png".to_string()];

        let id = db.posts().create(author, "Hello", "World", &images).await.unwrap();

        let post = db.posts().get(id).await.unwrap().unwrap();
        assert_eq!(post.title, "Hello");
        assert_eq!(post.author.nickname, "alice");
        assert_eq!(post.images, images);
    }

    #[tokio::test]
    async fn test_update_keeps_missing_fields() {
        let (db, author) = setup().await;
        let id = db.posts().create(author, "t", "c", &[]).await.unwrap();

        assert!(db.posts().update(id, Some("new"), None).await.unwrap());

        let post = db.posts().get(id).await.unwrap().unwrap();
        assert_eq!(post.title, "new");
        assert_eq!(post.content, "c");
    }

    #[tokio::test]
    async fn test_delete_and_author_of() {
        let (db, author) = setup().await;
        let id = db.posts().create(author, "t", "c", &[]).await.unwrap();

        assert_eq!(db.posts().author_of(id).await.unwrap(), Some(author));
        assert!(db.posts().delete(id).await.unwrap());
        assert_eq!(db.posts().author_of(id).await.unwrap(), None);
        assert!(!db.posts().delete(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_with_id_bound() {
        let (db, author) = setup().await;
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(
                db.posts()
                    .create(author, &format!("t{}", i), "c", &[])
                    .await
                    .unwrap(),
            );
        }

        let query = PageQuery {
            id_bound: Some(IdBound::Before(ids[3])),
            sort: SortKey::Id,
            order: Order::Desc,
            offset: 0,
            limit: 2,
        };
        let posts = db.posts().fetch(&query).await.unwrap();

        let got: Vec<i64> = posts.iter().map(|p| p.id).collect();
        assert_eq!(got, vec![ids[2], ids[1]]);
        assert_eq!(db.posts().count().await.unwrap(), 5);
    }
}
