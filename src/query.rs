//! Leaderboard read-models.
//!
//! Sled documents are projected to Arrow record batches and registered with
//! a DataFusion session, so each leaderboard is one SQL aggregation. Nothing
//! is cached: every call projects and queries the current data.

use arrow::array::{Array, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use datafusion::execution::context::SessionContext;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{ApiError, Result};
use crate::storage::Storage;

pub const CITIZEN_DEFAULT_LIMIT: usize = 10;
pub const CITIZEN_MAX_LIMIT: usize = 200;
pub const CITIZEN_LIST_DEFAULT_LIMIT: usize = 50;
pub const CITIZEN_LIST_MAX_LIMIT: usize = 500;
pub const CSR_DEFAULT_LIMIT: usize = 10;
pub const CSR_MAX_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CitizenSort {
    Points,
    Reports,
}

impl CitizenSort {
    /// Unknown values fall back to `default`.
    pub fn parse(raw: Option<&str>, default: CitizenSort) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("points") => CitizenSort::Points,
            Some("reports") => CitizenSort::Reports,
            _ => default,
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            CitizenSort::Points => "points DESC, total_reports DESC, user_id ASC",
            CitizenSort::Reports => "total_reports DESC, points DESC, user_id ASC",
        }
    }
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// `points` or `reports`
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CitizenRow {
    pub user_id: String,
    pub name: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub points: i64,
    pub total_reports: i64,
    pub last_active: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CitizenPage {
    pub total: i64,
    pub offset: usize,
    pub limit: usize,
    pub sort: CitizenSort,
    pub rows: Vec<CitizenRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CsrRow {
    pub csr_id: String,
    pub company_name: String,
    pub logo_url: Option<String>,
    pub total_donations: f64,
    pub problems_sponsored: i64,
    pub last_donation: Option<String>,
    pub csr_score: f64,
}

/// Clamps a requested page size into `1..=max`.
pub fn clamp_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested.unwrap_or(default).clamp(1, max)
}

/// LeaderboardEngine wraps a DataFusion SessionContext over the current data
pub struct LeaderboardEngine {
    ctx: SessionContext,
    // Upper bound on ranked citizens.
    user_count: usize,
}

impl LeaderboardEngine {
    /// Projects users, reports and csrs into the `users`, `reports` and `csrs` tables.
    pub async fn new(storage: &Storage) -> Result<Self> {
        let ctx = SessionContext::new();
        let users = storage.users_batch()?;
        let user_count = users.num_rows();
        ctx.register_batch("users", users)?;
        ctx.register_batch("reports", storage.reports_batch()?)?;
        ctx.register_batch("csrs", storage.csrs_batch()?)?;
        Ok(Self { ctx, user_count })
    }

    async fn run(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        let df = self.ctx.sql(sql).await?;
        Ok(df.collect().await?)
    }

    /// Reports grouped per reporter, joined to the reporter's points.
    pub async fn citizens(&self, sort: CitizenSort, offset: usize, limit: usize) -> Result<Vec<CitizenRow>> {
        if offset >= self.user_count {
            return Ok(vec![]);
        }
        let sql = format!(
            "SELECT u.id AS user_id, u.full_name AS name, u.username AS username, \
                    u.avatar_url AS avatar_url, u.points AS points, \
                    r.total_reports AS total_reports, u.updated_at AS last_active \
             FROM (SELECT reported_by, COUNT(*) AS total_reports FROM reports GROUP BY reported_by) r \
             JOIN users u ON u.id = r.reported_by \
             ORDER BY {} \
             LIMIT {limit} OFFSET {offset}",
            sort.order_by()
        );

        let mut rows = vec![];
        for batch in self.run(&sql).await? {
            let user_ids = strings(&batch, "user_id")?;
            let names = strings(&batch, "name")?;
            let usernames = strings(&batch, "username")?;
            let avatars = strings(&batch, "avatar_url")?;
            let points = integers(&batch, "points")?;
            let totals = integers(&batch, "total_reports")?;
            let last_active = strings(&batch, "last_active")?;

            for i in 0..batch.num_rows() {
                rows.push(CitizenRow {
                    user_id: user_ids[i].clone().unwrap_or_default(),
                    name: names[i].clone().unwrap_or_default(),
                    username: usernames[i].clone().unwrap_or_default(),
                    avatar_url: avatars[i].clone(),
                    points: points[i],
                    total_reports: totals[i],
                    last_active: last_active[i].clone().unwrap_or_default(),
                });
            }
        }
        Ok(rows)
    }

    /// Distinct reporters, for pagination.
    pub async fn citizen_total(&self) -> Result<i64> {
        let batches = self
            .run("SELECT COUNT(DISTINCT reported_by) AS total FROM reports")
            .await?;
        Ok(batches
            .iter()
            .find(|batch| batch.num_rows() > 0)
            .map(|batch| integers(batch, "total"))
            .transpose()?
            .and_then(|totals| totals.first().copied())
            .unwrap_or(0))
    }

    /// Sponsors ranked by `0.6 × donations + 100 × problems sponsored`.
    pub async fn csrs(&self, limit: usize) -> Result<Vec<CsrRow>> {
        let sql = format!(
            "SELECT id AS csr_id, company_name, logo_url, total_donations, problems_sponsored, last_donation, \
                    0.6 * total_donations + 100.0 * CAST(problems_sponsored AS DOUBLE) AS csr_score \
             FROM csrs \
             ORDER BY csr_score DESC, total_donations DESC, csr_id ASC \
             LIMIT {limit}"
        );

        let mut rows = vec![];
        for batch in self.run(&sql).await? {
            let ids = strings(&batch, "csr_id")?;
            let names = strings(&batch, "company_name")?;
            let logos = strings(&batch, "logo_url")?;
            let donations = floats(&batch, "total_donations")?;
            let sponsored = integers(&batch, "problems_sponsored")?;
            let last_donation = strings(&batch, "last_donation")?;
            let scores = floats(&batch, "csr_score")?;

            for i in 0..batch.num_rows() {
                rows.push(CsrRow {
                    csr_id: ids[i].clone().unwrap_or_default(),
                    company_name: names[i].clone().unwrap_or_default(),
                    logo_url: logos[i].clone(),
                    total_donations: donations[i],
                    problems_sponsored: sponsored[i],
                    last_donation: last_donation[i].clone(),
                    csr_score: scores[i],
                });
            }
        }
        Ok(rows)
    }
}

fn column(batch: &RecordBatch, name: &str, to: &DataType) -> Result<std::sync::Arc<dyn Array>> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| ApiError::Internal(format!("leaderboard query lost column {name}")))?;
    Ok(cast(column.as_ref(), to)?)
}

fn strings(batch: &RecordBatch, name: &str) -> Result<Vec<Option<String>>> {
    let array = column(batch, name, &DataType::Utf8)?;
    let array = array
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| ApiError::Internal(format!("column {name} is not text")))?;
    Ok(array.iter().map(|value| value.map(str::to_owned)).collect())
}

fn integers(batch: &RecordBatch, name: &str) -> Result<Vec<i64>> {
    let array = column(batch, name, &DataType::Int64)?;
    let array = array
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| ApiError::Internal(format!("column {name} is not an integer")))?;
    Ok(array.iter().map(|value| value.unwrap_or(0)).collect())
}

fn floats(batch: &RecordBatch, name: &str) -> Result<Vec<f64>> {
    let array = column(batch, name, &DataType::Float64)?;
    let array = array
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| ApiError::Internal(format!("column {name} is not a number")))?;
    Ok(array.iter().map(|value| value.unwrap_or(0.0)).collect())
}
