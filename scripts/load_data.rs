//! Seed script for civic_hub
//!
//! Populates the Sled store with demo citizens, one authority, two CSR
//! sponsors and a handful of reports in different states (open, resolved,
//! open tender, accepted tender, stale), then prints the leaderboards.
//! Run: cargo run --bin load_data
//! Every demo account uses the same password (`--password`).

use chrono::{Duration, Utc};
use clap::Parser;

use civic_hub::auth::Auth;
use civic_hub::models::{Authority, Csr, GeoPoint, Report, ReportStatus, StoredMedia, User};
use civic_hub::query::{CitizenSort, LeaderboardEngine};
use civic_hub::storage::Storage;

#[derive(Parser)]
#[command(name = "load_data", about = "Seed civic_hub with demo data")]
struct Args {
    #[arg(long, env = "CIVIC_DATA_DIR", default_value = "civic_data")]
    data_dir: std::path::PathBuf,

    #[arg(long, env = "CIVIC_PUBLIC_URL", default_value = "http://localhost:11111")]
    public_url: String,

    #[arg(long, default_value = "civic-demo")]
    password: String,
}

struct SeedReport {
    reporter: usize,
    description: &'static str,
    department: &'static str,
    category: &'static str,
    lat: f64,
    lng: f64,
    address: &'static str,
    age_days: i64,
}

const REPORTS: &[SeedReport] = &[
    SeedReport {
        reporter: 0,
        description: "Deep pothole in the bus lane",
        department: "Roads",
        category: "Pothole",
        lat: 37.7749,
        lng: -122.4194,
        address: "Market St & 5th St, San Francisco",
        age_days: 2,
    },
    SeedReport {
        reporter: 0,
        description: "Streetlight out for a week",
        department: "Electricity",
        category: "Streetlight",
        lat: 37.7790,
        lng: -122.4177,
        address: "Civic Center Plaza, San Francisco",
        age_days: 9,
    },
    SeedReport {
        reporter: 1,
        description: "Overflowing garbage bins",
        department: "Sanitation",
        category: "Garbage",
        lat: 37.7599,
        lng: -122.4148,
        address: "Mission St & 20th St, San Francisco",
        age_days: 4,
    },
    SeedReport {
        reporter: 1,
        description: "Broken water main flooding the sidewalk",
        department: "Water",
        category: "Water leakage",
        lat: 37.7694,
        lng: -122.4862,
        address: "Golden Gate Park, San Francisco",
        age_days: 12,
    },
    SeedReport {
        reporter: 2,
        description: "Collapsed drain cover",
        department: "Roads",
        category: "Pothole",
        lat: 37.8024,
        lng: -122.4058,
        address: "Columbus Ave, San Francisco",
        age_days: 45,
    },
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let storage = Storage::open(&args.data_dir)?;

    if storage.find_user_by_username("asha")?.is_some() {
        println!("Demo data already present in {}", args.data_dir.display());
        return Ok(());
    }

    let auth = Auth::new("unused", "unused", 0, bcrypt::DEFAULT_COST);
    let password_hash = auth.hash_password(&args.password)?;
    let now = Utc::now();

    let mut citizens = vec![];
    for (username, full_name) in [("asha", "Asha Rao"), ("ben", "Ben Okafor"), ("chen", "Chen Wei")] {
        let user = User {
            id: format!("seed-user-{username}"),
            full_name: full_name.to_string(),
            username: username.to_string(),
            email: format!("{username}@demo.civic"),
            password_hash: password_hash.clone(),
            profile_photo: None,
            points: 0,
            shorts: vec![],
            created_at: now,
            updated_at: now,
        };
        storage.create_user(&user)?;
        citizens.push(user);
    }

    let authority = Authority {
        id: "seed-authority-roads".to_string(),
        name: "City Roads Department".to_string(),
        email: "roads@demo.civic".to_string(),
        password_hash: password_hash.clone(),
        designation: "Ward Engineer".to_string(),
        category: "Pothole".to_string(),
        created_at: now,
        updated_at: now,
    };
    storage.create_authority(&authority)?;

    let mut sponsors = vec![];
    for (slug, name, donations) in [("acme", "Acme Infra", 25_000.0), ("beta", "Beta Foods", 10_000.0)] {
        let csr = Csr {
            id: format!("seed-csr-{slug}"),
            company_name: name.to_string(),
            company_email: format!("csr@{slug}.demo.civic"),
            company_description: format!("{name} community fund"),
            password_hash: password_hash.clone(),
            logo: None,
            total_donations: donations,
            issues_sponsored: vec![],
            last_donation: Some(now),
            created_at: now,
            updated_at: now,
        };
        storage.create_csr(&csr)?;
        sponsors.push(csr);
    }

    let public_url = args.public_url.trim_end_matches('/');
    let mut report_ids = vec![];
    for (i, seed) in REPORTS.iter().enumerate() {
        let created_at = now - Duration::days(seed.age_days);
        let public_id = format!("images/seed-report-{i}.jpg");
        let report = Report {
            id: format!("seed-report-{i}"),
            description: seed.description.to_string(),
            department: seed.department.to_string(),
            category: seed.category.to_string(),
            reported_by: citizens[seed.reporter].id.clone(),
            photos: vec![StoredMedia {
                url: format!("{public_url}/media/{public_id}"),
                public_id,
            }],
            location: GeoPoint::new(seed.lng, seed.lat),
            address: seed.address.to_string(),
            status: ReportStatus::Reported,
            resolved_at: None,
            tender: None,
            created_at,
            updated_at: created_at,
        };
        storage.reports.insert(&report.id, &report)?;
        report_ids.push(report.id);
    }
    println!("✅ Seeded {} citizens, 1 authority, {} sponsors, {} reports", citizens.len(), sponsors.len(), report_ids.len());

    // Resolutions award points; tenders give the sponsors something to accept.
    storage.resolve_report(&report_ids[1])?;
    storage.resolve_report(&report_ids[2])?;
    storage.release_tender(&report_ids[0], &authority.id, "Resurface 40m of the bus lane")?;
    storage.release_tender(&report_ids[3], &authority.id, "Replace the broken water main")?;
    storage.accept_tender(&report_ids[3], &sponsors[0].id)?;
    println!("✅ Resolved 2 reports, released 2 tenders, {} accepted one", sponsors[0].company_name);

    let engine = LeaderboardEngine::new(&storage).await?;
    for row in engine.citizens(CitizenSort::Points, 0, 10).await? {
        println!("   citizen {:<6} points={:<3} reports={}", row.username, row.points, row.total_reports);
    }
    for row in engine.csrs(10).await? {
        println!("   sponsor {:<12} score={:.1}", row.company_name, row.csr_score);
    }

    storage.flush().await?;
    println!("✅ Demo password for every account: {}", args.password);
    Ok(())
}
