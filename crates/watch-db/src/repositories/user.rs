//! PostgreSQL implementation of UserRepository

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use watch_core::{RepoResult, RoomId, RoomMember, User, UserId, UserRepository};

use crate::models::{RoomMemberRow, UserModel};

use super::error::map_db_error;

/// PostgreSQL implementation of UserRepository
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: UserId) -> RepoResult<Option<User>> {
        let result = sqlx::query_as::<_, UserModel>(
            r"
            SELECT u.id, u.username, d.value AS discriminator, u.avatar
            FROM users u
            LEFT JOIN discriminators d ON d.owner_id = u.id
            WHERE u.id = $1
            ",
        )
        .bind(id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result.map(User::from))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn find_room_members(&self, ids: &[UserId], room_id: RoomId) -> RepoResult<Vec<RoomMember>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let raw_ids: Vec<i64> = ids.iter().map(|id| id.into_inner()).collect();

        // WITH ORDINALITY keeps the caller's ordering
        let rows = sqlx::query_as::<_, RoomMemberRow>(
            r"
            SELECT u.id, u.username, d.value AS discriminator, u.avatar,
                   COALESCE(
                       ARRAY_AGG(ur.role_id ORDER BY ur.id) FILTER (WHERE ur.role_id IS NOT NULL),
                       '{}'
                   ) AS role_ids
            FROM UNNEST($1::BIGINT[]) WITH ORDINALITY AS wanted(id, ord)
            JOIN users u ON u.id = wanted.id
            LEFT JOIN discriminators d ON d.owner_id = u.id
            LEFT JOIN user_roles ur ON ur.user_id = u.id AND ur.room_id = $2
            GROUP BY u.id, u.username, d.value, u.avatar, wanted.ord
            ORDER BY wanted.ord
            ",
        )
        .bind(&raw_ids)
        .bind(room_id.into_inner())
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(rows.into_iter().map(RoomMember::from).collect())
    }
}
