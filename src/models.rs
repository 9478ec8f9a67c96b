use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A file held by the media store. `public_id` is the handle used to destroy it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredMedia {
    pub url: String,
    pub public_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub profile_photo: Option<StoredMedia>,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub shorts: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Authority {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub designation: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Corporate sponsor. `issues_sponsored` holds ids of reports whose tender it accepted.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Csr {
    pub id: String,
    pub company_name: String,
    pub company_email: String,
    pub company_description: String,
    pub password_hash: String,
    pub logo: Option<StoredMedia>,
    #[serde(default)]
    pub total_donations: f64,
    #[serde(default)]
    pub issues_sponsored: Vec<String>,
    pub last_donation: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Csr {
    pub fn problems_sponsored(&self) -> i64 {
        self.issues_sponsored.len() as i64
    }
}

/// GeoJSON point; `coordinates` is `[longitude, latitude]`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<f64>,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: vec![longitude, latitude],
        }
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates.first().copied().unwrap_or_default()
    }

    pub fn latitude(&self) -> f64 {
        self.coordinates.get(1).copied().unwrap_or_default()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Reported,
    Resolved,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tender {
    pub details: String,
    pub released_by: String,
    pub released_at: DateTime<Utc>,
    pub accepted_by: Option<String>,
    pub accepted_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub description: String,
    pub department: String,
    pub category: String,
    pub reported_by: String,
    pub photos: Vec<StoredMedia>,
    pub location: GeoPoint,
    pub address: String,
    pub status: ReportStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub tender: Option<Tender>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    pub fn has_open_tender(&self) -> bool {
        matches!(&self.tender, Some(tender) if tender.accepted_by.is_none())
    }
}

/// Short-form video report. Vote lists behave as sets.
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Shorts {
    pub id: String,
    pub title: String,
    pub description: String,
    pub video: StoredMedia,
    pub posted_by: String,
    #[serde(default)]
    pub upvotes: Vec<String>,
    #[serde(default)]
    pub downvotes: Vec<String>,
    #[serde(default)]
    pub shares: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Public views (never expose password hashes) ---

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub profile_photo: Option<StoredMedia>,
    pub points: i64,
    pub shorts: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            full_name: user.full_name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            profile_photo: user.profile_photo.clone(),
            points: user.points,
            shorts: user.shorts.clone(),
            created_at: user.created_at,
        }
    }
}

/// Reporter details attached to triage listings.
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReporterSummary {
    pub id: String,
    pub full_name: String,
    pub username: String,
    pub profile_photo: Option<StoredMedia>,
}

impl From<&User> for ReporterSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            full_name: user.full_name.clone(),
            username: user.username.clone(),
            profile_photo: user.profile_photo.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorityProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub designation: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Authority> for AuthorityProfile {
    fn from(authority: &Authority) -> Self {
        Self {
            id: authority.id.clone(),
            name: authority.name.clone(),
            email: authority.email.clone(),
            designation: authority.designation.clone(),
            category: authority.category.clone(),
            created_at: authority.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CsrProfile {
    pub id: String,
    pub company_name: String,
    pub company_email: String,
    pub company_description: String,
    pub logo: Option<StoredMedia>,
    pub total_donations: f64,
    pub issues_sponsored: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Csr> for CsrProfile {
    fn from(csr: &Csr) -> Self {
        Self {
            id: csr.id.clone(),
            company_name: csr.company_name.clone(),
            company_email: csr.company_email.clone(),
            company_description: csr.company_description.clone(),
            logo: csr.logo.clone(),
            total_donations: csr.total_donations,
            issues_sponsored: csr.issues_sponsored.clone(),
            created_at: csr.created_at,
        }
    }
}

/// Which secret a token was issued under.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Csr,
}

/// JWT payload. `sub` is the principal id.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthPayload {
    pub sub: String,
    pub kind: TokenKind,
    pub iat: usize,
    pub exp: usize,
}

/// Which collection a token resolved against.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Authority,
    Csr,
}

/// The authenticated caller, as resolved by the auth middleware.
#[derive(Debug, Clone)]
pub enum Principal {
    User(User),
    Authority(Authority),
    Csr(Csr),
}
