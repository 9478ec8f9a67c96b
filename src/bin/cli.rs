use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "civic-cli")]
#[command(about = "CLI for the civic_hub REST API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, env = "CIVIC_URL", default_value = "http://localhost:11111")]
    url: String,

    /// Where the access token from `login` is kept
    #[arg(long, default_value = ".civic_token")]
    token_file: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    User,
    Authority,
    Csr,
}

#[derive(Clone, Copy, ValueEnum)]
enum Board {
    Citizens,
    CitizenList,
    Csr,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a citizen account
    Register {
        #[arg(long)]
        full_name: String,
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    /// Log in and save the token
    Login {
        #[arg(short, long, value_enum, default_value_t = Role::User)]
        role: Role,
        /// Username or email for citizens, email for authorities and sponsors
        #[arg(short, long)]
        login: String,
        #[arg(short, long)]
        password: String,
    },
    SubmitReport {
        #[arg(short, long)]
        description: String,
        #[arg(long)]
        department: String,
        #[arg(short, long)]
        category: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(short, long)]
        image: PathBuf,
    },
    MyReports,
    Feed {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Authority: list reports with their reporters
    Issues,
    /// Authority: mark a report resolved
    Resolve {
        #[arg(short, long)]
        report_id: String,
    },
    /// Authority: release a tender for a report
    ReleaseTender {
        #[arg(short, long)]
        report_id: String,
        #[arg(short, long)]
        details: String,
    },
    /// Open tenders
    Tenders,
    /// Sponsor: accept the tender on a report
    AcceptTender {
        #[arg(short, long)]
        report_id: String,
    },
    Leaderboard {
        #[arg(value_enum, default_value_t = Board::Citizens)]
        board: Board,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
        /// `points` or `reports`
        #[arg(short, long)]
        sort: Option<String>,
    },
    Logout,
}

fn file_part(path: &Path) -> CliResult<Part> {
    let bytes = fs::read(path)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(Part::bytes(bytes).file_name(file_name))
}

fn authed(request: RequestBuilder, token_file: &Path) -> RequestBuilder {
    let token = fs::read_to_string(token_file).unwrap_or_default();
    request.bearer_auth(token.trim())
}

async fn print_response(res: Response) -> CliResult {
    let status = res.status();
    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(body) => println!("{status}\n{}", serde_json::to_string_pretty(&body)?),
        Err(_) => println!("{status}\n{text}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();
    let client = Client::new();
    let api = format!("{}/api/v1", cli.url.trim_end_matches('/'));
    let token_file = cli.token_file.as_path();

    match cli.command {
        Commands::Register { full_name, username, email, password, photo } => {
            let mut form = Form::new()
                .text("fullName", full_name)
                .text("username", username)
                .text("email", email)
                .text("password", password);
            if let Some(photo) = photo {
                form = form.part("profilePhoto", file_part(&photo)?);
            }
            let res = client
                .post(format!("{api}/users/register"))
                .multipart(form)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Login { role, login, password } => {
            let (path, body) = match role {
                Role::User => {
                    let key = if login.contains('@') { "email" } else { "username" };
                    let mut body = json!({ "password": password });
                    body[key] = json!(login);
                    ("users/login", body)
                }
                Role::Authority => ("authority/login", json!({ "email": login, "password": password })),
                Role::Csr => ("csr/login", json!({ "companyEmail": login, "password": password })),
            };
            let res = client.post(format!("{api}/{path}")).json(&body).send().await?;
            if res.status().is_success() {
                let body: Value = res.json().await?;
                let token = body["data"]["accessToken"].as_str().unwrap_or_default();
                fs::write(token_file, token)?;
                println!("Logged in. Token saved to {}", token_file.display());
            } else {
                println!("Login failed: {}", res.text().await?);
            }
        }
        Commands::SubmitReport { description, department, category, lat, lng, image } => {
            let form = Form::new()
                .text("description", description)
                .text("department", department)
                .text("category", category)
                .text("latitude", lat.to_string())
                .text("longitude", lng.to_string())
                .part("image", file_part(&image)?);
            let res = authed(client.post(format!("{api}/report/submitReport")), token_file)
                .multipart(form)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::MyReports => {
            let res = authed(client.get(format!("{api}/report/mine")), token_file)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Feed { page, limit } => {
            let res = authed(client.get(format!("{api}/report/feed")), token_file)
                .query(&[("page", page), ("limit", limit)])
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Issues => {
            let res = authed(client.get(format!("{api}/authority/issues")), token_file)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Resolve { report_id } => {
            let res = authed(
                client.patch(format!("{api}/authority/issues/{report_id}/resolve")),
                token_file,
            )
            .send()
            .await?;
            print_response(res).await?;
        }
        Commands::ReleaseTender { report_id, details } => {
            let res = authed(
                client.post(format!("{api}/authority/issues/{report_id}/release-tender")),
                token_file,
            )
            .json(&json!({ "tenderDetails": details }))
            .send()
            .await?;
            print_response(res).await?;
        }
        Commands::Tenders => {
            let res = authed(client.get(format!("{api}/csr/tenders")), token_file)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::AcceptTender { report_id } => {
            let res = authed(
                client.post(format!("{api}/csr/tenders/{report_id}/accept")),
                token_file,
            )
            .send()
            .await?;
            print_response(res).await?;
        }
        Commands::Leaderboard { board, limit, offset, sort } => {
            let path = match board {
                Board::Citizens => "leaderboard/citizens",
                Board::CitizenList => "leaderboard/citizens/list",
                Board::Csr => "leaderboard/csr",
            };
            let mut query: Vec<(&str, String)> = vec![];
            if let Some(limit) = limit {
                query.push(("limit", limit.to_string()));
            }
            if let Some(offset) = offset {
                query.push(("offset", offset.to_string()));
            }
            if let Some(sort) = sort {
                query.push(("sort", sort));
            }
            let res = client.get(format!("{api}/{path}")).query(&query).send().await?;
            print_response(res).await?;
        }
        Commands::Logout => {
            let _ = fs::remove_file(token_file);
            println!("Logged out. Token removed");
        }
    }

    Ok(())
}
