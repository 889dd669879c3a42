//! PostgreSQL implementation of RoleRepository

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use watch_core::{RepoResult, RoleId, RoleRepository, RoomId, UserId, UserRole};

use crate::models::UserRoleModel;

use super::error::map_db_error;

/// PostgreSQL implementation of RoleRepository
#[derive(Clone)]
pub struct PgRoleRepository {
    pool: PgPool,
}

impl PgRoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleRepository for PgRoleRepository {
    #[instrument(skip(self))]
    async fn find_user_roles(&self, user_id: UserId, room_id: RoomId) -> RepoResult<Vec<RoleId>> {
        let results = sqlx::query_as::<_, UserRoleModel>(
            r"
            SELECT id, user_id, room_id, role_id
            FROM user_roles
            WHERE user_id = $1 AND room_id = $2
            ORDER BY id ASC
            ",
        )
        .bind(user_id.into_inner())
        .bind(room_id.into_inner())
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(results
            .into_iter()
            .map(|model| UserRole::from(model).role_id)
            .collect())
    }

    #[instrument(skip(self))]
    async fn add(&self, user_role: &UserRole) -> RepoResult<()> {
        sqlx::query(
            r"
            INSERT INTO user_roles (user_id, room_id, role_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, room_id, role_id) DO NOTHING
            ",
        )
        .bind(user_role.user_id.into_inner())
        .bind(user_role.room_id.into_inner())
        .bind(user_role.role_id.into_inner())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, user_role: &UserRole) -> RepoResult<()> {
        sqlx::query(
            r"
            DELETE FROM user_roles
            WHERE user_id = $1 AND room_id = $2 AND role_id = $3
            ",
        )
        .bind(user_role.user_id.into_inner())
        .bind(user_role.room_id.into_inner())
        .bind(user_role.role_id.into_inner())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }
}
