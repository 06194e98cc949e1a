use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use atelier_core::repository::DesignerDirectory;
use atelier_core::{DesignerPatch, DesignerProfile, DesignerStatus, StoreError, StoreResult};

use crate::database::{decode, encode};

pub struct StoreDesignerRepository {
    pool: PgPool,
}

impl StoreDesignerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DesignerRow {
    user_id: Uuid,
    specialties: Vec<String>,
    skill_level: String,
    max_capacity: i32,
    current_load: i32,
    rating: f64,
    status: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DesignerRow> for DesignerProfile {
    type Error = StoreError;

    fn try_from(row: DesignerRow) -> StoreResult<Self> {
        Ok(DesignerProfile {
            user_id: row.user_id,
            specialties: row.specialties,
            skill_level: decode(&row.skill_level)?,
            max_capacity: row.max_capacity,
            current_load: row.current_load,
            rating: row.rating,
            status: decode(&row.status)?,
            updated_at: row.updated_at,
        })
    }
}

const DESIGNER_COLUMNS: &str = "user_id, specialties, skill_level, max_capacity, current_load, rating, status, updated_at";

#[async_trait]
impl DesignerDirectory for StoreDesignerRepository {
    async fn get_designer(&self, user_id: Uuid) -> StoreResult<Option<DesignerProfile>> {
        let sql = format!("SELECT {} FROM designer_profiles WHERE user_id = $1", DESIGNER_COLUMNS);
        sqlx::query_as::<_, DesignerRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?
            .map(DesignerProfile::try_from)
            .transpose()
    }

    async fn list_by_status(&self, status: DesignerStatus) -> StoreResult<Vec<DesignerProfile>> {
        let sql = format!("SELECT {} FROM designer_profiles WHERE status = $1", DESIGNER_COLUMNS);
        let rows = sqlx::query_as::<_, DesignerRow>(&sql)
            .bind(encode(&status)?)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        rows.into_iter().map(DesignerProfile::try_from).collect()
    }

    async fn insert_designer(&self, profile: &DesignerProfile) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO designer_profiles (user_id, specialties, skill_level, max_capacity, current_load, rating, status, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(profile.user_id)
        .bind(&profile.specialties)
        .bind(encode(&profile.skill_level)?)
        .bind(profile.max_capacity)
        .bind(profile.current_load)
        .bind(profile.rating)
        .bind(encode(&profile.status)?)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn update_designer(&self, user_id: Uuid, patch: &DesignerPatch) -> StoreResult<Option<DesignerProfile>> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;
        let sql = format!("SELECT {} FROM designer_profiles WHERE user_id = $1 FOR UPDATE", DESIGNER_COLUMNS);
        let row = sqlx::query_as::<_, DesignerRow>(&sql)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::backend)?;
        let Some(mut profile) = row.map(DesignerProfile::try_from).transpose()? else {
            return Ok(None);
        };

        if let Some(max) = patch.max_capacity {
            if max < profile.current_load {
                return Err(StoreError::Conflict(format!(
                    "max capacity {} is below current load {}",
                    max, profile.current_load
                )));
            }
        }
        patch.apply(&mut profile);

        sqlx::query(
            r#"
            UPDATE designer_profiles
            SET specialties = $2, skill_level = $3, max_capacity = $4, rating = $5, status = $6, updated_at = $7
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(&profile.specialties)
        .bind(encode(&profile.skill_level)?)
        .bind(profile.max_capacity)
        .bind(profile.rating)
        .bind(encode(&profile.status)?)
        .bind(profile.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        tx.commit().await.map_err(StoreError::backend)?;
        Ok(Some(profile))
    }
}
