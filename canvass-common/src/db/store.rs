//! Submission Store
//!
//! The authoritative record of every submission and its sync markers. The
//! marker columns double as the work queue for the reconcilers: selection
//! queries claim rows by stamping a short lease so overlapping runs never pick
//! up the same submission twice. Every claim also stamps `last_attempt_at`,
//! and claims prefer the least recently attempted rows, so a batch of rows
//! that keep failing cannot hold the queue.
//!
//! Marker updates are monotonic. Each `mark_*`/`set_*` call only writes a
//! column that is still unset and returns `Ok(false)` when there was nothing
//! left to do.

use super::models::{
    MirrorSheet, OperatorSet, PhotoReference, Submission, SyncMarkers,
};
use crate::locality::{Coordinates, Locality};
use crate::time::{parse_rfc3339, to_db_timestamp, to_millis};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const SUBMISSION_COLUMNS: &str = "id, created_at, salesperson, customer_name, customer_address, \
    house_number, locality, postal_code, village, district, city, province, coordinates, \
    latitude, longitude, building_type, operators, remarks, all_mirror_written_at, \
    fs_mirror_written_at, coverage_bot_id, coverage_bot_finished";

const UNREGISTERED: &str = "includes_fs = 1 AND coverage_bot_id IS NULL";
const UNRESOLVED: &str = "coverage_bot_id IS NOT NULL AND coverage_bot_finished = 0";
const UNMIRRORED: &str =
    "(all_mirror_written_at IS NULL OR (includes_fs = 1 AND fs_mirror_written_at IS NULL))";

/// A claim ticket.
///
/// Rows stamped with a lease stay away from other claimers until `until`.
/// Only the holder of the same token can release them early, so a pass that
/// outlived its lease cannot drop a newer claimer's hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    token: Uuid,
    started: DateTime<Utc>,
    until: DateTime<Utc>,
}

impl Lease {
    /// A fresh lease running from `now` for `duration`
    pub fn new(now: DateTime<Utc>, duration: Duration) -> Result<Self> {
        let until = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| {
                Error::InvalidInput(format!("lease of {}s is out of range", duration.as_secs()))
            })?;

        Ok(Self {
            token: Uuid::new_v4(),
            started: now,
            until,
        })
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn until(&self) -> DateTime<Utc> {
        self.until
    }
}

/// Outstanding sync work, as visible from the marker columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncBacklog {
    pub total: i64,
    pub unmirrored: i64,
    pub unregistered: i64,
    pub unresolved: i64,
}

/// Handle to the submission database, created once per process and shared
#[derive(Debug, Clone)]
pub struct SubmissionStore {
    pool: SqlitePool,
}

impl SubmissionStore {
    /// Open (or create) the database at `db_path` and bootstrap the schema
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = super::init::init_database(db_path).await?;
        Ok(Self { pool })
    }

    /// Wrap an already-initialized pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all connections. Later calls fail with a database error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert a submission and its photo references in one transaction.
    ///
    /// `lease` lets the caller hold the row away from the reconcilers while it
    /// performs the ingestion-time fan-out.
    pub async fn insert(&self, submission: &Submission, lease: Option<&Lease>) -> Result<()> {
        let operators = serde_json::to_string(&submission.operators)
            .map_err(|e| Error::Internal(format!("Failed to serialize operators: {}", e)))?;
        let id = submission.id.to_string();
        let markers = &submission.markers;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO submissions (
                id, created_at, salesperson, customer_name, customer_address,
                house_number, locality, postal_code, village, district, city, province,
                coordinates, latitude, longitude, building_type, operators, includes_fs,
                remarks, all_mirror_written_at, fs_mirror_written_at, coverage_bot_id,
                coverage_bot_finished, lease_until, lease_token
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(to_db_timestamp(submission.created_at))
        .bind(&submission.salesperson)
        .bind(&submission.customer_name)
        .bind(&submission.customer_address)
        .bind(&submission.house_number)
        .bind(&submission.locality_raw)
        .bind(&submission.locality.postal_code)
        .bind(&submission.locality.village)
        .bind(&submission.locality.district)
        .bind(&submission.locality.city)
        .bind(&submission.locality.province)
        .bind(&submission.coordinates_raw)
        .bind(&submission.coordinates.latitude)
        .bind(&submission.coordinates.longitude)
        .bind(&submission.building_type)
        .bind(&operators)
        .bind(submission.includes_fs())
        .bind(&submission.remarks)
        .bind(markers.all_mirror_written_at.map(to_db_timestamp))
        .bind(markers.fs_mirror_written_at.map(to_db_timestamp))
        .bind(&markers.coverage_bot_id)
        .bind(markers.coverage_bot_finished)
        .bind(lease.map(|l| to_millis(l.until)))
        .bind(lease.map(|l| l.token.to_string()))
        .execute(&mut *tx)
        .await?;

        for (position, photo) in submission.photos.iter().enumerate() {
            sqlx::query(
                "INSERT INTO submission_photos (submission_id, position, filename) VALUES (?, ?, ?)",
            )
            .bind(&id)
            .bind(position as i64)
            .bind(&photo.filename)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(submission_id = %submission.id, photos = submission.photos.len(), "Submission stored");
        Ok(())
    }

    /// Load a submission with its photos
    pub async fn get(&self, id: Uuid) -> Result<Option<Submission>> {
        let sql = format!("SELECT {} FROM submissions WHERE id = ?", SUBMISSION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let photos = self.photos(id).await?;
                Ok(Some(row_to_submission(&row, photos)?))
            }
            None => Ok(None),
        }
    }

    /// Photo references of a submission, in upload order
    pub async fn photos(&self, id: Uuid) -> Result<Vec<PhotoReference>> {
        let filenames: Vec<String> = sqlx::query_scalar(
            "SELECT filename FROM submission_photos WHERE submission_id = ? ORDER BY position",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(filenames
            .into_iter()
            .map(|filename| PhotoReference {
                submission_id: id,
                filename,
            })
            .collect())
    }

    /// Stamp the mirror marker for `sheet`. The FS marker is refused for
    /// submissions without the FS operator.
    pub async fn mark_mirror_written(
        &self,
        id: Uuid,
        sheet: MirrorSheet,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let sql = match sheet {
            MirrorSheet::AllOperators => {
                "UPDATE submissions SET all_mirror_written_at = ? \
                 WHERE id = ? AND all_mirror_written_at IS NULL"
            }
            MirrorSheet::Fs => {
                "UPDATE submissions SET fs_mirror_written_at = ? \
                 WHERE id = ? AND includes_fs = 1 AND fs_mirror_written_at IS NULL"
            }
        };

        let updated = sqlx::query(sql)
            .bind(to_db_timestamp(at))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated > 0 {
            return Ok(true);
        }

        let (includes_fs, _) = self.coverage_columns(id).await?;
        if sheet == MirrorSheet::Fs && !includes_fs {
            return Err(Error::InvalidInput(format!(
                "submission {} has no FS operator; FS mirror marker not allowed",
                id
            )));
        }
        Ok(false)
    }

    /// Record the coverage correlation id. Never overwrites an existing id.
    pub async fn set_coverage_bot_id(&self, id: Uuid, bot_id: &str) -> Result<bool> {
        if bot_id.trim().is_empty() {
            return Err(Error::InvalidInput("coverage bot id must not be empty".to_string()));
        }

        let updated = sqlx::query(
            "UPDATE submissions SET coverage_bot_id = ? \
             WHERE id = ? AND includes_fs = 1 AND coverage_bot_id IS NULL",
        )
        .bind(bot_id)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated > 0 {
            return Ok(true);
        }

        let (includes_fs, _) = self.coverage_columns(id).await?;
        if !includes_fs {
            return Err(Error::InvalidInput(format!(
                "submission {} has no FS operator; coverage registration not allowed",
                id
            )));
        }
        Ok(false)
    }

    /// Flip `coverage_bot_finished` to true. Only registered submissions can finish.
    pub async fn mark_coverage_finished(&self, id: Uuid) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE submissions SET coverage_bot_finished = 1 \
             WHERE id = ? AND coverage_bot_id IS NOT NULL AND coverage_bot_finished = 0",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated > 0 {
            return Ok(true);
        }

        let (_, bot_id) = self.coverage_columns(id).await?;
        if bot_id.is_none() {
            return Err(Error::InvalidInput(format!(
                "submission {} is not registered with the coverage service",
                id
            )));
        }
        Ok(false)
    }

    /// Claim up to `limit` FS submissions that have no coverage id yet
    pub async fn claim_unregistered(&self, limit: u32, lease: &Lease) -> Result<Vec<Submission>> {
        self.claim(UNREGISTERED, limit, lease).await
    }

    /// Claim up to `limit` registered submissions whose coverage check is unresolved
    pub async fn claim_unresolved(&self, limit: u32, lease: &Lease) -> Result<Vec<Submission>> {
        self.claim(UNRESOLVED, limit, lease).await
    }

    /// Claim up to `limit` submissions missing at least one applicable mirror marker
    pub async fn claim_unmirrored(&self, limit: u32, lease: &Lease) -> Result<Vec<Submission>> {
        self.claim(UNMIRRORED, limit, lease).await
    }

    /// Drop `lease` on a submission so the next run can pick it up.
    ///
    /// Returns `Ok(false)` when the row is no longer held by this lease.
    pub async fn release(&self, id: Uuid, lease: &Lease) -> Result<bool> {
        let released = sqlx::query(
            "UPDATE submissions SET lease_until = NULL, lease_token = NULL \
             WHERE id = ? AND lease_token = ?",
        )
        .bind(id.to_string())
        .bind(lease.token.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if released == 0 {
            debug!(submission_id = %id, "Lease already expired or taken over");
        }
        Ok(released > 0)
    }

    /// Remember which spreadsheet row holds a submission
    pub async fn record_mirror_row(&self, id: Uuid, sheet: MirrorSheet, row: u32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO mirror_rows (submission_id, sheet, row_number, recorded_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(submission_id, sheet) DO UPDATE SET
                row_number = excluded.row_number,
                recorded_at = excluded.recorded_at
            "#,
        )
        .bind(id.to_string())
        .bind(sheet.as_str())
        .bind(i64::from(row))
        .bind(to_db_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Indexed spreadsheet row for a submission, if known
    pub async fn mirror_row(&self, id: Uuid, sheet: MirrorSheet) -> Result<Option<u32>> {
        let row: Option<i64> = sqlx::query_scalar(
            "SELECT row_number FROM mirror_rows WHERE submission_id = ? AND sheet = ?",
        )
        .bind(id.to_string())
        .bind(sheet.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            u32::try_from(r).map_err(|_| Error::Internal(format!("Invalid row number {}", r)))
        })
        .transpose()
    }

    /// Count outstanding work per marker
    pub async fn backlog(&self) -> Result<SyncBacklog> {
        let sql = format!(
            "SELECT COUNT(*), \
                    COALESCE(SUM(CASE WHEN {} THEN 1 ELSE 0 END), 0), \
                    COALESCE(SUM(CASE WHEN {} THEN 1 ELSE 0 END), 0), \
                    COALESCE(SUM(CASE WHEN {} THEN 1 ELSE 0 END), 0) \
             FROM submissions",
            UNMIRRORED, UNREGISTERED, UNRESOLVED
        );
        let (total, unmirrored, unregistered, unresolved) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(&sql)
                .fetch_one(&self.pool)
                .await?;

        Ok(SyncBacklog {
            total,
            unmirrored,
            unregistered,
            unresolved,
        })
    }

    async fn claim(&self, selection: &str, limit: u32, lease: &Lease) -> Result<Vec<Submission>> {
        let now_ms = to_millis(lease.started);

        // Single statement, so two claimers can never both win the same row.
        // Never-attempted rows first, then the least recently attempted.
        let sql = format!(
            "UPDATE submissions SET lease_until = ?, lease_token = ?, last_attempt_at = ? \
             WHERE id IN ( \
                 SELECT id FROM submissions \
                 WHERE {} AND (lease_until IS NULL OR lease_until <= ?) \
                 ORDER BY last_attempt_at IS NOT NULL, last_attempt_at, created_at, id \
                 LIMIT ? \
             ) RETURNING id",
            selection
        );

        let ids: Vec<String> = sqlx::query_scalar(&sql)
            .bind(to_millis(lease.until))
            .bind(lease.token.to_string())
            .bind(now_ms)
            .bind(now_ms)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            let id = parse_id(&id)?;
            if let Some(submission) = self.get(id).await? {
                claimed.push(submission);
            }
        }
        claimed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(claimed)
    }

    async fn coverage_columns(&self, id: Uuid) -> Result<(bool, Option<String>)> {
        sqlx::query_as::<_, (bool, Option<String>)>(
            "SELECT includes_fs, coverage_bot_id FROM submissions WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("submission {}", id)))
    }
}

fn parse_id(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid submission id '{}': {}", value, e)))
}

fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_rfc3339).transpose()
}

fn row_to_submission(row: &SqliteRow, photos: Vec<PhotoReference>) -> Result<Submission> {
    let id: String = row.try_get("id")?;
    let created_at: String = row.try_get("created_at")?;
    let operators: String = row.try_get("operators")?;
    let operators: OperatorSet = serde_json::from_str(&operators)
        .map_err(|e| Error::Internal(format!("Failed to deserialize operators: {}", e)))?;

    Ok(Submission {
        id: parse_id(&id)?,
        created_at: parse_rfc3339(&created_at)?,
        salesperson: row.try_get("salesperson")?,
        customer_name: row.try_get("customer_name")?,
        customer_address: row.try_get("customer_address")?,
        house_number: row.try_get("house_number")?,
        locality_raw: row.try_get("locality")?,
        locality: Locality {
            postal_code: row.try_get("postal_code")?,
            village: row.try_get("village")?,
            district: row.try_get("district")?,
            city: row.try_get("city")?,
            province: row.try_get("province")?,
        },
        coordinates_raw: row.try_get("coordinates")?,
        coordinates: Coordinates {
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
        },
        building_type: row.try_get("building_type")?,
        operators,
        remarks: row.try_get("remarks")?,
        photos,
        markers: SyncMarkers {
            all_mirror_written_at: parse_optional_timestamp(row.try_get("all_mirror_written_at")?)?,
            fs_mirror_written_at: parse_optional_timestamp(row.try_get("fs_mirror_written_at")?)?,
            coverage_bot_id: row.try_get("coverage_bot_id")?,
            coverage_bot_finished: row.try_get("coverage_bot_finished")?,
        },
    })
}
