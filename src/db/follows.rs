//! Follow relations between users.
//!
//! A follow starts unconfirmed. Confirming it bumps the followee's
//! `follower_count`; deleting a confirmed follow lowers it again. Both counter
//! updates happen in the same transaction as the relation change.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use super::run_atomic;

#[derive(Clone)]
pub struct FollowStore {
    pool: SqlitePool,
}

/// A follower of some user, as seen by that user.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Follow {
    pub id: i64,
    pub follower_id: i64,
    pub nickname: String,
    pub email: String,
    pub is_confirmed: bool,
}

impl FollowStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Request to follow. Returns false if a request already exists.
    pub async fn request(&self, follower_id: i64, followee_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO user_followers (follower_id, followee_id) VALUES (?, ?) \
             ON CONFLICT (follower_id, followee_id) DO NOTHING",
        )
        .bind(follower_id)
        .bind(followee_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Followers of `followee_id`, optionally including unconfirmed requests.
    pub async fn followers_of(
        &self,
        followee_id: i64,
        include_unconfirmed: bool,
    ) -> Result<Vec<Follow>, sqlx::Error> {
        let sql = if include_unconfirmed {
            "SELECT f.id, f.follower_id, u.nickname, u.email, f.is_confirmed \
             FROM user_followers f JOIN users u ON u.id = f.follower_id \
             WHERE f.followee_id = ? ORDER BY f.id"
        } else {
            "SELECT f.id, f.follower_id, u.nickname, u.email, f.is_confirmed \
             FROM user_followers f JOIN users u ON u.id = f.follower_id \
             WHERE f.followee_id = ? AND f.is_confirmed = 1 ORDER BY f.id"
        };

        sqlx::query_as(sql)
            .bind(followee_id)
            .fetch_all(&self.pool)
            .await
    }

    /// Confirm a pending request and increment the followee's follower count.
    /// Returns false if there is no pending request.
    pub async fn confirm_with_increment(
        &self,
        follower_id: i64,
        followee_id: i64,
    ) -> Result<bool, sqlx::Error> {
        run_atomic(&self.pool, move |conn| {
            Box::pin(async move {
                let result = sqlx::query(
                    "UPDATE user_followers SET is_confirmed = 1 \
                     WHERE follower_id = ? AND followee_id = ? AND is_confirmed = 0",
                )
                .bind(follower_id)
                .bind(followee_id)
                .execute(&mut *conn)
                .await?;

                if result.rows_affected() == 0 {
                    return Ok(false);
                }

                sqlx::query("UPDATE users SET follower_count = follower_count + 1 WHERE id = ?")
                    .bind(followee_id)
                    .execute(&mut *conn)
                    .await?;

                Ok(true)
            })
        })
        .await
    }

    /// Delete a follow. If it was confirmed, decrement the followee's follower count.
    /// Returns false if there was nothing to delete.
    pub async fn delete_with_decrement(
        &self,
        follower_id: i64,
        followee_id: i64,
    ) -> Result<bool, sqlx::Error> {
        run_atomic(&self.pool, move |conn| {
            Box::pin(async move {
                let existing: Option<(bool,)> = sqlx::query_as(
                    "SELECT is_confirmed FROM user_followers WHERE follower_id = ? AND followee_id = ?",
                )
                .bind(follower_id)
                .bind(followee_id)
                .fetch_optional(&mut *conn)
                .await?;

                let Some((was_confirmed,)) = existing else {
                    return Ok(false);
                };

                sqlx::query("DELETE FROM user_followers WHERE follower_id = ? AND followee_id = ?")
                    .bind(follower_id)
                    .bind(followee_id)
                    .execute(&mut *conn)
                    .await?;

                if was_confirmed {
                    sqlx::query(
                        "UPDATE users SET follower_count = MAX(follower_count - 1, 0) WHERE id = ?",
                    )
                    .bind(followee_id)
                    .execute(&mut *conn)
                    .await?;
                }

                Ok(true)
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    async fn setup() -> (Database, i64, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let alice = db.users().create("alice@example.com", "alice", "h").await.unwrap();
        let bob = db.users().create("bob@example.com", "bob", "h").await.unwrap();
        (db, alice, bob)
    }

    async fn follower_count(db: &Database, id: i64) -> i64 {
        db.users().get_by_id(id).await.unwrap().unwrap().follower_count
    }

    #[tokio::test]
    async fn test_request_is_idempotent() {
        let (db, alice, bob) = setup().await;

        assert!(db.follows().request(alice, bob).await.unwrap());
        assert!(!db.follows().request(alice, bob).await.unwrap());
    }

    #[tokio::test]
    async fn test_confirm_increments_once() {
        let (db, alice, bob) = setup().await;
        db.follows().request(alice, bob).await.unwrap();

        assert!(db.follows().confirm_with_increment(alice, bob).await.unwrap());
        assert!(!db.follows().confirm_with_increment(alice, bob).await.unwrap());

        assert_eq!(follower_count(&db, bob).await, 1);
        assert_eq!(follower_count(&db, alice).await, 0);
    }

    #[tokio::test]
    async fn test_confirm_without_request() {
        let (db, alice, bob) = setup().await;

        assert!(!db.follows().confirm_with_increment(alice, bob).await.unwrap());
        assert_eq!(follower_count(&db, bob).await, 0);
    }

    #[tokio::test]
    async fn test_followers_filter_unconfirmed() {
        let (db, alice, bob) = setup().await;
        db.follows().request(alice, bob).await.unwrap();

        assert!(db.follows().followers_of(bob, false).await.unwrap().is_empty());

        let all = db.follows().followers_of(bob, true).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].follower_id, alice);
        assert_eq!(all[0].nickname, "alice");
        assert!(!all[0].is_confirmed);
    }

    #[tokio::test]
    async fn test_delete_decrements_followee_only_when_confirmed() {
        let (db, alice, bob) = setup().await;

        db.follows().request(alice, bob).await.unwrap();
        assert!(db.follows().delete_with_decrement(alice, bob).await.unwrap());
        assert_eq!(follower_count(&db, bob).await, 0);

        db.follows().request(alice, bob).await.unwrap();
        db.follows().confirm_with_increment(alice, bob).await.unwrap();
        assert!(db.follows().delete_with_decrement(alice, bob).await.unwrap());
        assert_eq!(follower_count(&db, bob).await, 0);
        assert_eq!(follower_count(&db, alice).await, 0);

        assert!(!db.follows().delete_with_decrement(alice, bob).await.unwrap());
    }
}
