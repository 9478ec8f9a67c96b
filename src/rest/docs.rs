use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::{authority, blog, csr, leaderboard, reports, shorts, users};
use crate::models::{
    AuthorityProfile, CsrProfile, GeoPoint, Report, ReportStatus, ReporterSummary, Shorts,
    StoredMedia, Tender, UserProfile,
};
use crate::query::{CitizenPage, CitizenRow, CitizenSort, CsrRow};

#[derive(OpenApi)]
#[openapi(
    info(title = "civic_hub", description = "Civic issue reporting API"),
    paths(
        users::register,
        users::login,
        users::logout,
        users::change_password,
        users::update_profile,
        users::update_profile_photo,
        users::current_user,
        users::channel_profile,
        reports::submit_report,
        reports::update_description,
        reports::delete_report,
        reports::get_report,
        reports::my_reports,
        reports::feed,
        reports::nearby,
        authority::register,
        authority::login,
        authority::list_issues,
        authority::resolve_issue,
        authority::release_tender,
        csr::register,
        csr::login,
        csr::list_tenders,
        csr::accept_tender,
        leaderboard::citizens,
        leaderboard::citizen_list,
        leaderboard::csr_leaderboard,
        shorts::upload_shorts,
        shorts::shorts_feed,
        shorts::share_shorts,
        shorts::upvote_shorts,
        shorts::downvote_shorts,
        shorts::delete_shorts,
        blog::stale_reports,
    ),
    components(schemas(
        StoredMedia,
        GeoPoint,
        ReportStatus,
        Tender,
        Report,
        Shorts,
        UserProfile,
        ReporterSummary,
        AuthorityProfile,
        CsrProfile,
        CitizenSort,
        CitizenRow,
        CitizenPage,
        CsrRow,
        users::LoginRequest,
        users::ChangePasswordRequest,
        users::UpdateProfileRequest,
        users::RegisterUserForm,
        users::UserSession,
        users::PrincipalView,
        users::ChannelProfile,
        reports::SubmitReportForm,
        reports::UpdateDescriptionRequest,
        reports::ReportFeed,
        reports::NearbyReport,
        authority::RegisterAuthorityRequest,
        authority::AuthorityLoginRequest,
        authority::ReleaseTenderRequest,
        authority::AuthoritySession,
        authority::Issue,
        csr::RegisterCsrRequest,
        csr::CsrLoginRequest,
        csr::CsrSession,
        shorts::UploadShortsForm,
        shorts::ShortsFeed,
        shorts::VoteTally,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "users", description = "Citizen accounts"),
        (name = "reports", description = "Issue reports"),
        (name = "authority", description = "Triage by authorities"),
        (name = "csr", description = "Tenders for CSR sponsors"),
        (name = "leaderboard", description = "Rankings"),
        (name = "shorts", description = "Short video reports"),
        (name = "blog", description = "Public feed of stale issues"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
