//! CLI tool for operating on the quota ledger
//!
//! # Usage
//!
//! ```bash
//! # Start a subscriber on a plan
//! quota-admin init user-42 professional --db sqlite://quota.db
//!
//! # Show the current cycle
//! quota-admin status user-42
//!
//! # Check and repair the cached count
//! quota-admin validate user-42
//! quota-admin repair user-42
//!
//! # Platform connections needing attention in the next day
//! quota-admin credentials user-42
//! quota-admin expiring-credentials --within-hours 24
//!
//! # Issue an API token
//! quota-admin token user-42 --secret "$QUOTA__AUTH__JWT_SECRET"
//! ```

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use quota_rs::api::JwtConfig;
use quota_rs::config::DatabaseConfig;
use quota_rs::db;
use quota_rs::platform::{CredentialStore, PlatformCredential};
use quota_rs::quota::{QuotaService, QuotaStatus, SubscriptionPlan};
use sqlx::SqlitePool;

/// Tokens expiring this close to now are refreshed ahead of time
const REFRESH_SKEW_MINUTES: i64 = 10;

#[derive(Parser)]
#[command(name = "quota-admin")]
#[command(about = "Manage subscriber post quotas", long_about = None)]
struct Cli {
    /// Database URL (e.g., sqlite://quota.db)
    #[arg(short, long, env = "QUOTA__DATABASE__URL", default_value = "sqlite://quota.db")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the quota ledger for a user
    Init {
        user_id: String,
        /// starter, growth or professional
        plan: SubscriptionPlan,
    },
    /// Show the current quota cycle
    Status { user_id: String },
    /// Compare the cached count with the post table
    Validate { user_id: String },
    /// Rebuild the cached count from the post table
    Repair { user_id: String },
    /// Switch plan and start a new cycle
    ChangePlan {
        user_id: String,
        plan: SubscriptionPlan,
    },
    /// List a user's platform connections
    Credentials { user_id: String },
    /// List connections of all users whose token expires soon
    ExpiringCredentials {
        #[arg(long, default_value_t = 24)]
        within_hours: i64,
    },
    /// Issue a bearer token for the HTTP API
    Token {
        user_id: String,
        /// JWT signing secret
        #[arg(long, env = "QUOTA__AUTH__JWT_SECRET")]
        secret: String,
        /// Token lifetime in hours
        #[arg(long, default_value_t = 24)]
        ttl_hours: u64,
    },
}

fn print_status(status: &QuotaStatus) {
    println!("User:      {}", status.user_id);
    println!("Plan:      {}", status.plan);
    println!("Cycle:     {} -> {}", status.cycle_start, status.cycle_end);
    println!(
        "Published: {} / {} ({} remaining)",
        status.published_posts, status.total_posts, status.remaining_posts
    );
}

fn credential_state(credential: &PlatformCredential, now: DateTime<Utc>) -> &'static str {
    if credential.is_expired(now) {
        "expired"
    } else if credential.needs_refresh(now, Duration::minutes(REFRESH_SKEW_MINUTES)) {
        "refresh due"
    } else {
        "ok"
    }
}

fn print_credential(user_id: &str, credential: &PlatformCredential, now: DateTime<Utc>) {
    let expires = credential
        .expires_at
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "{:<20} {:<10} expires {:<32} {}",
        user_id,
        credential.platform,
        expires,
        credential_state(credential, now)
    );
}

async fn open_pool(url: &str) -> anyhow::Result<SqlitePool> {
    let pool = db::connect(&DatabaseConfig {
        url: url.to_string(),
        max_connections: 1,
    })
    .await?;
    db::init_schema(&pool).await?;
    Ok(pool)
}

async fn open_service(url: &str) -> anyhow::Result<QuotaService> {
    Ok(QuotaService::new(open_pool(url).await?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { user_id, plan } => {
            let service = open_service(&cli.db).await?;
            let status = service.initialize_quota(&user_id, plan).await?;
            println!("✓ Quota initialized");
            print_status(&status);
        }
        Commands::Status { user_id } => {
            let service = open_service(&cli.db).await?;
            print_status(&service.get_quota_status(&user_id).await?);
        }
        Commands::Validate { user_id } => {
            let service = open_service(&cli.db).await?;
            let validation = service.validate_quota(&user_id).await?;
            if validation.valid {
                println!("✓ Quota ledger for {} is consistent", user_id);
            } else {
                eprintln!("✗ Quota ledger for {} is inconsistent:", user_id);
                for issue in &validation.issues {
                    eprintln!("  - {}", issue);
                }
                std::process::exit(1);
            }
        }
        Commands::Repair { user_id } => {
            let service = open_service(&cli.db).await?;
            let status = service.repair_quota(&user_id).await?;
            println!("✓ Quota ledger repaired");
            print_status(&status);
        }
        Commands::ChangePlan { user_id, plan } => {
            let service = open_service(&cli.db).await?;
            let status = service.change_plan(&user_id, plan).await?;
            println!("✓ Plan changed");
            print_status(&status);
        }
        Commands::Credentials { user_id } => {
            let store = CredentialStore::new(open_pool(&cli.db).await?);
            let now = Utc::now();
            for credential in store.list_for_user(&user_id).await? {
                print_credential(&user_id, &credential, now);
            }
        }
        Commands::ExpiringCredentials { within_hours } => {
            let store = CredentialStore::new(open_pool(&cli.db).await?);
            let now = Utc::now();
            let expiring = store
                .list_expiring(now + Duration::hours(within_hours))
                .await?;
            if expiring.is_empty() {
                println!("✓ No credentials expire within {} hours", within_hours);
            }
            for (user_id, credential) in &expiring {
                print_credential(user_id, credential, now);
            }
        }
        Commands::Token {
            user_id,
            secret,
            ttl_hours,
        } => {
            let jwt = JwtConfig::new(secret, ttl_hours);
            println!("{}", jwt.create_token(&user_id)?);
        }
    }

    Ok(())
}
