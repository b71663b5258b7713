use std::time::Instant;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{Gym, GymCandidate, ImportResult};
use crate::utils::haversine_miles;

/// Miles per degree of latitude, used to narrow distance queries
const MILES_PER_DEGREE_LAT: f64 = 69.0;

/// Run database migrations / 运行数据库迁移
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gyms (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            address TEXT NOT NULL,
            phone TEXT,
            website TEXT,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            rating REAL,
            review_count INTEGER,
            sources TEXT NOT NULL DEFAULT '[]',
            confidence REAL NOT NULL DEFAULT 0,
            source_city TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_gyms_source_city ON gyms(source_city)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_gyms_name_address ON gyms(name, address)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Gym persistence used by the search driver and the API
#[async_trait]
pub trait GymStore: Send + Sync {
    /// Whether any gym was already stored for this search location
    async fn has_gyms_for_city(&self, city: &str) -> Result<bool>;

    /// Insert new gyms and refresh known ones, matched on (name, address)
    async fn upsert_gyms(&self, city: &str, gyms: &[GymCandidate]) -> Result<ImportResult>;

    async fn list_by_city(&self, city: &str, limit: u32) -> Result<Vec<Gym>>;

    async fn get_gym(&self, id: &str) -> Result<Option<Gym>>;

    /// Every stored gym within `radius_miles` of a point
    async fn list_near(&self, latitude: f64, longitude: f64, radius_miles: f64) -> Result<Vec<Gym>>;
}

/// SQLite-backed gym store
#[derive(Clone)]
pub struct SqliteGymStore {
    pool: SqlitePool,
}

impl SqliteGymStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns true when an existing row was updated
    async fn upsert_one(&self, city: &str, gym: &GymCandidate) -> Result<bool> {
        if gym.name.trim().is_empty() {
            bail!("gym name is empty");
        }
        if !(-90.0..=90.0).contains(&gym.latitude) || !(-180.0..=180.0).contains(&gym.longitude) {
            bail!("invalid coordinates ({}, {})", gym.latitude, gym.longitude);
        }

        let now = Utc::now().to_rfc3339();
        let sources = serde_json::to_string(&gym.sources)?;

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT id FROM gyms WHERE name = ? AND address = ?")
                .bind(&gym.name)
                .bind(&gym.address)
                .fetch_optional(&self.pool)
                .await?;

        if let Some((id,)) = existing {
            sqlx::query(
                "UPDATE gyms SET confidence = ?, rating = ?, review_count = ?, sources = ?, updated_at = ? WHERE id = ?",
            )
            .bind(gym.confidence)
            .bind(gym.rating)
            .bind(gym.review_count)
            .bind(&sources)
            .bind(&now)
            .bind(&id)
            .execute(&self.pool)
            .await?;
            return Ok(true);
        }

        sqlx::query(
            r#"INSERT INTO gyms (id, name, address, phone, website, latitude, longitude,
               rating, review_count, sources, confidence, source_city, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&gym.name)
        .bind(&gym.address)
        .bind(&gym.phone)
        .bind(&gym.website)
        .bind(gym.latitude)
        .bind(gym.longitude)
        .bind(gym.rating)
        .bind(gym.review_count)
        .bind(&sources)
        .bind(gym.confidence)
        .bind(city)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(false)
    }
}

const GYM_COLUMNS: &str = "id, name, address, phone, website, latitude, longitude, rating, \
    review_count, sources, confidence, source_city, created_at, updated_at";

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid timestamp {}", value))?
        .with_timezone(&Utc))
}

fn row_to_gym(row: &sqlx::sqlite::SqliteRow) -> Result<Gym> {
    let sources: String = row.try_get("sources")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Gym {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        phone: row.try_get("phone")?,
        website: row.try_get("website")?,
        rating: row.try_get("rating")?,
        review_count: row.try_get("review_count")?,
        sources: serde_json::from_str(&sources)
            .with_context(|| format!("invalid sources column {:?}", sources))?,
        confidence: row.try_get("confidence")?,
        source_city: row.try_get("source_city")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait]
impl GymStore for SqliteGymStore {
    async fn has_gyms_for_city(&self, city: &str) -> Result<bool> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM gyms WHERE source_city = ? LIMIT 1")
            .bind(city)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn upsert_gyms(&self, city: &str, gyms: &[GymCandidate]) -> Result<ImportResult> {
        let started = Instant::now();
        let mut gyms_imported = 0;
        let mut gyms_updated = 0;
        let mut errors = Vec::new();

        for gym in gyms {
            match self.upsert_one(city, gym).await {
                Ok(true) => gyms_updated += 1,
                Ok(false) => gyms_imported += 1,
                Err(e) => {
                    tracing::warn!("Failed to import gym {}: {}", gym.name, e);
                    errors.push(format!("Failed to import {}: {}", gym.name, e));
                }
            }
        }

        tracing::info!(
            "Stored gyms for {}: {} new, {} updated, {} failed",
            city,
            gyms_imported,
            gyms_updated,
            errors.len()
        );

        Ok(ImportResult {
            success: errors.is_empty(),
            gyms_imported,
            gyms_updated,
            errors,
            import_duration_seconds: started.elapsed().as_secs_f64(),
        })
    }

    async fn list_by_city(&self, city: &str, limit: u32) -> Result<Vec<Gym>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM gyms WHERE source_city = ? ORDER BY confidence DESC, name LIMIT ?",
            GYM_COLUMNS
        ))
        .bind(city)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_gym).collect()
    }

    async fn get_gym(&self, id: &str) -> Result<Option<Gym>> {
        let row = sqlx::query(&format!("SELECT {} FROM gyms WHERE id = ?", GYM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_gym).transpose()
    }

    async fn list_near(&self, latitude: f64, longitude: f64, radius_miles: f64) -> Result<Vec<Gym>> {
        // Latitude band first, exact distance after
        let delta = radius_miles / MILES_PER_DEGREE_LAT;
        let rows = sqlx::query(&format!(
            "SELECT {} FROM gyms WHERE latitude BETWEEN ? AND ? ORDER BY confidence DESC, name",
            GYM_COLUMNS
        ))
        .bind(latitude - delta)
        .bind(latitude + delta)
        .fetch_all(&self.pool)
        .await?;

        let mut gyms = Vec::new();
        for row in &rows {
            let gym = row_to_gym(row)?;
            if haversine_miles(latitude, longitude, gym.latitude, gym.longitude) <= radius_miles {
                gyms.push(gym);
            }
        }
        Ok(gyms)
    }
}
