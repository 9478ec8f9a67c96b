use std::marker::PhantomData;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sled::Db;
use tracing::{debug, warn};

use crate::error::{ApiError, Result};
use crate::models::{Authority, Csr, Report, Shorts, User};
use crate::workflow::{self, Vote, RESOLUTION_AWARD};

/// One JSON document per key in a Sled tree.
pub struct Collection<T> {
    tree: sled::Tree,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Collection<T> {
    fn open(db: &Db, name: &str) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(name)?,
            _marker: PhantomData,
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<T>> {
        match self.tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn insert(&self, id: &str, doc: &T) -> Result<()> {
        self.tree.insert(id.as_bytes(), serde_json::to_vec(doc)?)?;
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<Option<T>> {
        match self.tree.remove(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn all(&self) -> Result<Vec<T>> {
        let mut docs = vec![];
        for item in self.tree.iter() {
            let (_, value) = item?;
            docs.push(serde_json::from_slice(&value)?);
        }
        Ok(docs)
    }

    pub fn filter(&self, mut keep: impl FnMut(&T) -> bool) -> Result<Vec<T>> {
        Ok(self.all()?.into_iter().filter(|doc| keep(doc)).collect())
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Read-modify-write with compare-and-swap. `apply` sees the latest stored
    /// version and is re-run if another writer got in between. Returns `None`
    /// if the document does not exist; an error from `apply` aborts the write.
    pub fn update(
        &self,
        id: &str,
        mut apply: impl FnMut(&mut T) -> Result<()>,
    ) -> Result<Option<T>> {
        loop {
            let Some(current) = self.tree.get(id.as_bytes())? else {
                return Ok(None);
            };

            let mut doc: T = serde_json::from_slice(&current)?;
            apply(&mut doc)?;
            let next = serde_json::to_vec(&doc)?;

            match self.tree.compare_and_swap(id.as_bytes(), Some(current), Some(next))? {
                Ok(()) => return Ok(Some(doc)),
                Err(_) => debug!(id, "concurrent write detected, retrying update"),
            }
        }
    }
}

/// Unique-key scopes in the index tree.
#[derive(Debug, Clone, Copy)]
pub enum UniqueKey {
    Username,
    UserEmail,
    AuthorityEmail,
    CsrEmail,
    CsrName,
}

impl UniqueKey {
    fn prefix(self) -> &'static str {
        match self {
            UniqueKey::Username => "user.username",
            UniqueKey::UserEmail => "user.email",
            UniqueKey::AuthorityEmail => "authority.email",
            UniqueKey::CsrEmail => "csr.email",
            UniqueKey::CsrName => "csr.name",
        }
    }

    fn key(self, value: &str) -> Vec<u8> {
        format!("{}:{}", self.prefix(), value.trim().to_lowercase()).into_bytes()
    }
}

/// Document store for every collection, backed by one Sled database.
#[derive(Clone)]
pub struct Storage {
    db: Db,
    pub users: Collection<User>,
    pub authorities: Collection<Authority>,
    pub csrs: Collection<Csr>,
    pub reports: Collection<Report>,
    pub shorts: Collection<Shorts>,
    unique: sled::Tree,
}

impl Storage {
    /// Open or create the Sled database at the given path.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory database removed on drop.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            users: Collection::open(&db, "users")?,
            authorities: Collection::open(&db, "authorities")?,
            csrs: Collection::open(&db, "csrs")?,
            reports: Collection::open(&db, "reports")?,
            shorts: Collection::open(&db, "shorts")?,
            unique: db.open_tree("unique_keys")?,
            db,
        })
    }

    pub async fn flush(&self) -> Result<usize> {
        Ok(self.db.flush_async().await?)
    }

    // --- Unique keys ---

    /// Claims `value` for `owner_id`. Returns false if someone else holds it.
    pub fn claim(&self, key: UniqueKey, value: &str, owner_id: &str) -> Result<bool> {
        let result = self.unique.compare_and_swap(
            key.key(value),
            None as Option<&[u8]>,
            Some(owner_id.as_bytes()),
        )?;
        Ok(result.is_ok())
    }

    pub fn release(&self, key: UniqueKey, value: &str) -> Result<()> {
        self.unique.remove(key.key(value))?;
        Ok(())
    }

    pub fn lookup(&self, key: UniqueKey, value: &str) -> Result<Option<String>> {
        match self.unique.get(key.key(value))? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }

    fn claim_all(&self, claims: &[(UniqueKey, &str, &str)]) -> Result<()> {
        for (index, (key, value, owner)) in claims.iter().enumerate() {
            if !self.claim(*key, value, owner)? {
                self.release_all(&claims[..index]);
                return Err(ApiError::conflict(conflict_message(*key)));
            }
        }
        Ok(())
    }

    fn release_all(&self, claims: &[(UniqueKey, &str, &str)]) {
        for (key, value, _) in claims {
            if let Err(e) = self.release(*key, value) {
                warn!(error = %e, ?key, value, "failed to release unique key");
            }
        }
    }

    /// Claims every key, then runs `write`. The claims are given back if the
    /// write fails.
    fn claimed<R>(
        &self,
        claims: &[(UniqueKey, &str, &str)],
        write: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        self.claim_all(claims)?;
        write().inspect_err(|_| self.release_all(claims))
    }

    // --- Users ---

    pub fn create_user(&self, user: &User) -> Result<()> {
        self.claimed(
            &[
                (UniqueKey::Username, &user.username, &user.id),
                (UniqueKey::UserEmail, &user.email, &user.id),
            ],
            || self.users.insert(&user.id, user),
        )
    }

    /// Resolves a login identifier that may be a username or an email.
    pub fn find_user_by_login(&self, identifier: &str) -> Result<Option<User>> {
        let id = match self.lookup(UniqueKey::Username, identifier)? {
            Some(id) => Some(id),
            None => self.lookup(UniqueKey::UserEmail, identifier)?,
        };
        match id {
            Some(id) => self.users.get(&id),
            None => Ok(None),
        }
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.lookup(UniqueKey::Username, username)? {
            Some(id) => self.users.get(&id),
            None => Ok(None),
        }
    }

    /// Updates profile fields, moving the email index entry when it changes.
    pub fn update_user_profile(
        &self,
        user_id: &str,
        full_name: Option<&str>,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let current = self
            .users
            .get(user_id)?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        let new_email = email
            .map(|email| email.trim().to_lowercase())
            .filter(|email| *email != current.email);

        let claims: Vec<(UniqueKey, &str, &str)> = new_email
            .iter()
            .map(|email| (UniqueKey::UserEmail, email.as_str(), user_id))
            .collect();

        let updated = self.claimed(&claims, || {
            self.users
                .update(user_id, |user| {
                    if let Some(full_name) = full_name {
                        user.full_name = full_name.trim().to_string();
                    }
                    if let Some(email) = &new_email {
                        user.email = email.clone();
                    }
                    user.updated_at = now;
                    Ok(())
                })?
                .ok_or_else(|| ApiError::not_found("User not found"))
        })?;

        if new_email.is_some() {
            self.release(UniqueKey::UserEmail, &current.email)?;
        }
        Ok(updated)
    }

    pub fn award_points(&self, user_id: &str, points: i64) -> Result<Option<User>> {
        self.users.update(user_id, |user| {
            user.points += points;
            user.updated_at = Utc::now();
            Ok(())
        })
    }

    // --- Authorities ---

    pub fn create_authority(&self, authority: &Authority) -> Result<()> {
        self.claimed(
            &[(UniqueKey::AuthorityEmail, &authority.email, &authority.id)],
            || self.authorities.insert(&authority.id, authority),
        )
    }

    pub fn find_authority_by_email(&self, email: &str) -> Result<Option<Authority>> {
        match self.lookup(UniqueKey::AuthorityEmail, email)? {
            Some(id) => self.authorities.get(&id),
            None => Ok(None),
        }
    }

    // --- CSR sponsors ---

    pub fn create_csr(&self, csr: &Csr) -> Result<()> {
        self.claimed(
            &[
                (UniqueKey::CsrName, &csr.company_name, &csr.id),
                (UniqueKey::CsrEmail, &csr.company_email, &csr.id),
            ],
            || self.csrs.insert(&csr.id, csr),
        )
    }

    pub fn find_csr_by_email(&self, email: &str) -> Result<Option<Csr>> {
        match self.lookup(UniqueKey::CsrEmail, email)? {
            Some(id) => self.csrs.get(&id),
            None => Ok(None),
        }
    }

    // --- Reports ---

    /// Every report, newest first.
    pub fn reports_newest_first(&self) -> Result<Vec<Report>> {
        let mut reports = self.reports.all()?;
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    pub fn reports_by(&self, user_id: &str) -> Result<Vec<Report>> {
        let mut reports = self.reports.filter(|report| report.reported_by == user_id)?;
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    pub fn update_description(
        &self,
        report_id: &str,
        owner_id: &str,
        old_description: &str,
        new_description: &str,
    ) -> Result<Report> {
        workflow::validate_description_edit(old_description, new_description)?;
        let now = Utc::now();
        self.reports
            .update(report_id, |report| {
                workflow::edit_description(report, owner_id, old_description, new_description, now)
            })?
            .ok_or_else(|| ApiError::not_found("Report not found or not authorized"))
    }

    /// Marks a report resolved and awards the reporter.
    pub fn resolve_report(&self, report_id: &str) -> Result<Report> {
        let now = Utc::now();
        let report = self
            .reports
            .update(report_id, |report| workflow::mark_resolved(report, now))?
            .ok_or_else(|| ApiError::not_found("Report not found"))?;

        if self.award_points(&report.reported_by, RESOLUTION_AWARD)?.is_none() {
            warn!(report_id, user_id = %report.reported_by, "reporter no longer exists, no points awarded");
        }

        Ok(report)
    }

    pub fn release_tender(&self, report_id: &str, authority_id: &str, details: &str) -> Result<Report> {
        let now = Utc::now();
        self.reports
            .update(report_id, |report| {
                workflow::release_tender(report, authority_id, details, now)
            })?
            .ok_or_else(|| ApiError::not_found("Report not found"))
    }

    /// Accepts the tender on `report_id` for `csr_id` and records the
    /// sponsorship on the CSR document.
    pub fn accept_tender(&self, report_id: &str, csr_id: &str) -> Result<Report> {
        let now = Utc::now();
        let report = self
            .reports
            .update(report_id, |report| workflow::accept_tender(report, csr_id, now))?
            .ok_or_else(|| ApiError::not_found("Tender not found for this report"))?;

        self.csrs.update(csr_id, |csr| {
            if !csr.issues_sponsored.iter().any(|id| id == report_id) {
                csr.issues_sponsored.push(report_id.to_string());
            }
            csr.updated_at = now;
            Ok(())
        })?;

        Ok(report)
    }

    pub fn released_tenders(&self) -> Result<Vec<Report>> {
        let mut reports = self.reports.filter(Report::has_open_tender)?;
        reports.sort_by(|a, b| {
            let released = |r: &Report| r.tender.as_ref().map(|t| t.released_at);
            released(b).cmp(&released(a))
        });
        Ok(reports)
    }

    // --- Shorts ---

    pub fn create_shorts(&self, shorts: &Shorts) -> Result<()> {
        self.shorts.insert(&shorts.id, shorts)?;
        self.users.update(&shorts.posted_by, |user| {
            user.shorts.push(shorts.id.clone());
            Ok(())
        })?;
        Ok(())
    }

    pub fn delete_shorts(&self, shorts_id: &str, owner_id: &str) -> Result<Option<Shorts>> {
        let removed = self.shorts.remove(shorts_id)?;
        self.users.update(owner_id, |user| {
            user.shorts.retain(|id| id != shorts_id);
            Ok(())
        })?;
        Ok(removed)
    }

    pub fn vote_shorts(&self, shorts_id: &str, user_id: &str, vote: Vote) -> Result<Shorts> {
        let now = Utc::now();
        self.shorts
            .update(shorts_id, |shorts| {
                workflow::cast_vote(shorts, user_id, vote, now);
                Ok(())
            })?
            .ok_or_else(|| ApiError::not_found("Shorts not found"))
    }

    pub fn share_shorts(&self, shorts_id: &str) -> Result<Shorts> {
        self.shorts
            .update(shorts_id, |shorts| {
                shorts.shares += 1;
                Ok(())
            })?
            .ok_or_else(|| ApiError::not_found("Shorts not found"))
    }

    // --- Arrow projections for the leaderboard SQL ---

    /// `users(id, full_name, username, avatar_url, points, updated_at)`
    pub fn users_batch(&self) -> Result<RecordBatch> {
        let users = self.users.all()?;

        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("full_name", DataType::Utf8, false),
            Field::new("username", DataType::Utf8, false),
            Field::new("avatar_url", DataType::Utf8, true),
            Field::new("points", DataType::Int64, false),
            Field::new("updated_at", DataType::Utf8, false),
        ]));

        let ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
        let names: Vec<&str> = users.iter().map(|u| u.full_name.as_str()).collect();
        let usernames: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
        let avatars: Vec<Option<&str>> = users
            .iter()
            .map(|u| u.profile_photo.as_ref().map(|p| p.url.as_str()))
            .collect();
        let points: Vec<i64> = users.iter().map(|u| u.points).collect();
        let updated: Vec<String> = users.iter().map(|u| u.updated_at.to_rfc3339()).collect();

        Ok(RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(ids)) as ArrayRef,
                Arc::new(StringArray::from(names)) as ArrayRef,
                Arc::new(StringArray::from(usernames)) as ArrayRef,
                Arc::new(StringArray::from(avatars)) as ArrayRef,
                Arc::new(Int64Array::from(points)) as ArrayRef,
                Arc::new(StringArray::from(updated)) as ArrayRef,
            ],
        )?)
    }

    /// `reports(id, reported_by)`
    pub fn reports_batch(&self) -> Result<RecordBatch> {
        let reports = self.reports.all()?;

        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("reported_by", DataType::Utf8, false),
        ]));

        let ids: Vec<&str> = reports.iter().map(|r| r.id.as_str()).collect();
        let reporters: Vec<&str> = reports.iter().map(|r| r.reported_by.as_str()).collect();

        Ok(RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(ids)) as ArrayRef,
                Arc::new(StringArray::from(reporters)) as ArrayRef,
            ],
        )?)
    }

    /// `csrs(id, company_name, logo_url, total_donations, problems_sponsored, last_donation)`
    pub fn csrs_batch(&self) -> Result<RecordBatch> {
        let csrs = self.csrs.all()?;

        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("company_name", DataType::Utf8, false),
            Field::new("logo_url", DataType::Utf8, true),
            Field::new("total_donations", DataType::Float64, false),
            Field::new("problems_sponsored", DataType::Int64, false),
            Field::new("last_donation", DataType::Utf8, true),
        ]));

        let ids: Vec<&str> = csrs.iter().map(|c| c.id.as_str()).collect();
        let names: Vec<&str> = csrs.iter().map(|c| c.company_name.as_str()).collect();
        let logos: Vec<Option<&str>> = csrs
            .iter()
            .map(|c| c.logo.as_ref().map(|l| l.url.as_str()))
            .collect();
        let donations: Vec<f64> = csrs.iter().map(|c| c.total_donations).collect();
        let sponsored: Vec<i64> = csrs.iter().map(Csr::problems_sponsored).collect();
        let last_donation: Vec<Option<String>> = csrs
            .iter()
            .map(|c| c.last_donation.map(|d| d.to_rfc3339()))
            .collect();

        Ok(RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(ids)) as ArrayRef,
                Arc::new(StringArray::from(names)) as ArrayRef,
                Arc::new(StringArray::from(logos)) as ArrayRef,
                Arc::new(Float64Array::from(donations)) as ArrayRef,
                Arc::new(Int64Array::from(sponsored)) as ArrayRef,
                Arc::new(StringArray::from(last_donation)) as ArrayRef,
            ],
        )?)
    }
}

fn conflict_message(key: UniqueKey) -> &'static str {
    match key {
        UniqueKey::Username => "User with this username already exists",
        UniqueKey::UserEmail => "User with this email already exists",
        UniqueKey::AuthorityEmail => "Authority with this email already exists",
        UniqueKey::CsrEmail => "Company with this email already exists",
        UniqueKey::CsrName => "Company with this name already exists",
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::models::{GeoPoint, ReportStatus, StoredMedia};

    pub fn user(id: &str, username: &str, points: i64) -> User {
        let now = Utc::now();
        User {
            id: id.into(),
            full_name: format!("{username} full"),
            username: username.into(),
            email: format!("{username}@example.com"),
            password_hash: "x".into(),
            profile_photo: None,
            points,
            shorts: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn csr(id: &str, name: &str, donations: f64, sponsored: usize) -> Csr {
        let now = Utc::now();
        Csr {
            id: id.into(),
            company_name: name.into(),
            company_email: format!("{}@corp.example", name.to_lowercase()),
            company_description: "Sponsor".into(),
            password_hash: "x".into(),
            logo: None,
            total_donations: donations,
            issues_sponsored: (0..sponsored).map(|i| format!("{id}-r{i}")).collect(),
            last_donation: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn report(id: &str, reporter: &str) -> Report {
        let now = Utc::now();
        Report {
            id: id.into(),
            description: format!("Issue {id}"),
            department: "Roads".into(),
            category: "Pothole".into(),
            reported_by: reporter.into(),
            photos: vec![StoredMedia {
                url: format!("http://media/{id}.jpg"),
                public_id: format!("{id}.jpg"),
            }],
            location: GeoPoint::new(-122.4, 37.7),
            address: "Main St".into(),
            status: ReportStatus::Reported,
            resolved_at: None,
            tender: None,
            created_at: now,
            updated_at: now,
        }
    }
}
