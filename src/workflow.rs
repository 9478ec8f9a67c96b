//! Report and shorts state transitions.
//!
//! Every function here mutates a document in place and either succeeds or
//! leaves it untouched. Storage runs them inside compare-and-swap updates,
//! so a transition that rejects (already resolved, already accepted) is
//! decided against the latest stored version of the document.

use chrono::{DateTime, Utc};

use crate::error::{ApiError, Result};
use crate::models::{GeoPoint, Report, ReportStatus, Shorts, Tender};

/// Points a citizen earns when one of their reports is resolved.
pub const RESOLUTION_AWARD: i64 = 5;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Checks that apply before the stored report is even looked at.
pub fn validate_description_edit(old_description: &str, new_description: &str) -> Result<()> {
    if old_description.trim().is_empty() || new_description.trim().is_empty() {
        return Err(ApiError::validation("Descriptions cannot be empty"));
    }

    if old_description == new_description {
        return Err(ApiError::validation("New description must be different"));
    }

    Ok(())
}

/// Replaces the description if `owner_id` reported it and the caller's idea
/// of the current text still matches.
pub fn edit_description(
    report: &mut Report,
    owner_id: &str,
    old_description: &str,
    new_description: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    if report.reported_by != owner_id {
        return Err(ApiError::not_found("Report not found or not authorized"));
    }

    if report.description != old_description {
        return Err(ApiError::validation(
            "Old description does not match the current report description",
        ));
    }

    report.description = new_description.to_string();
    report.updated_at = now;
    Ok(())
}

pub fn mark_resolved(report: &mut Report, now: DateTime<Utc>) -> Result<()> {
    if report.status == ReportStatus::Resolved {
        return Err(ApiError::conflict("Report already resolved"));
    }

    report.status = ReportStatus::Resolved;
    report.resolved_at = Some(now);
    report.updated_at = now;
    Ok(())
}

/// Attaches (or re-issues) an unaccepted tender. An accepted tender is final.
pub fn release_tender(
    report: &mut Report,
    authority_id: &str,
    details: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    if details.trim().is_empty() {
        return Err(ApiError::validation("Tender details are required"));
    }

    if matches!(&report.tender, Some(tender) if tender.accepted_by.is_some()) {
        return Err(ApiError::conflict("Tender already accepted"));
    }

    report.tender = Some(Tender {
        details: details.trim().to_string(),
        released_by: authority_id.to_string(),
        released_at: now,
        accepted_by: None,
        accepted_at: None,
    });
    report.updated_at = now;
    Ok(())
}

/// First acceptance wins; later ones are a conflict.
pub fn accept_tender(report: &mut Report, csr_id: &str, now: DateTime<Utc>) -> Result<()> {
    let tender = report
        .tender
        .as_mut()
        .ok_or_else(|| ApiError::not_found("Tender not found for this report"))?;

    if tender.accepted_by.is_some() {
        return Err(ApiError::conflict("Tender already accepted"));
    }

    tender.accepted_by = Some(csr_id.to_string());
    tender.accepted_at = Some(now);
    report.updated_at = now;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Up,
    Down,
}

/// Toggles `user_id`'s vote. Casting a vote removes the opposite one; casting
/// the same vote twice withdraws it.
pub fn cast_vote(shorts: &mut Shorts, user_id: &str, vote: Vote, now: DateTime<Utc>) {
    let (target, opposite) = match vote {
        Vote::Up => (&mut shorts.upvotes, &mut shorts.downvotes),
        Vote::Down => (&mut shorts.downvotes, &mut shorts.upvotes),
    };

    opposite.retain(|id| id != user_id);

    if let Some(position) = target.iter().position(|id| id == user_id) {
        target.remove(position);
    } else {
        target.push(user_id.to_string());
    }

    shorts.updated_at = now;
}

/// Parses a form coordinate and checks it lies within `[-limit, limit]`.
pub fn parse_coordinate(raw: &str, name: &str, limit: f64) -> Result<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::validation(format!("{name} must be a number")))?;
    check_coordinate(value, name, limit)
}

pub fn check_coordinate(value: f64, name: &str, limit: f64) -> Result<f64> {
    if !value.is_finite() || value.abs() > limit {
        return Err(ApiError::validation(format!(
            "{name} must be between -{limit} and {limit}"
        )));
    }
    Ok(value)
}

/// Great-circle distance between a stored point and a latitude/longitude pair.
pub fn distance_km(point: &GeoPoint, latitude: f64, longitude: f64) -> f64 {
    let (lat1, lat2) = (point.latitude().to_radians(), latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lng = (longitude - point.longitude()).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
