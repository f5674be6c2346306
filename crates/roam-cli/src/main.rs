//! Roam CLI - Offline-first travel companion from the terminal
//!
//! Favorites, reviews, and routes land in the local database instantly;
//! syncing with the remote document store happens on demand or in watch
//! mode, and works the same whether the network is there or not.

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, shells};
use roam_core::config::SyncSettings;
use roam_core::db::{Database, FavoriteRepository, ReviewRepository, RouteRepository};
use roam_core::models::{MAX_RATING, MIN_RATING};
use roam_core::sync::{EntityKind, PhaseOutcome, SyncOutcome, SyncService};
use roam_core::{Favorite, FavoriteId, Review, ReviewId, RouteId, RouteStop, TravelRoute};
use serde::Serialize;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "roam")]
#[command(about = "Save places, reviews, and routes that sync when they can")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage favorite places
    #[command(subcommand)]
    Favorite(FavoriteCommands),
    /// Manage place reviews
    #[command(subcommand)]
    Review(ReviewCommands),
    /// Manage travel routes
    #[command(subcommand)]
    Route(RouteCommands),
    /// Push pending records to the remote store (and pull recent reviews)
    Sync {
        /// Sync a single entity instead of all of them
        #[arg(long, value_enum)]
        entity: Option<SyncEntity>,
    },
    /// Show how many records wait for the next push
    Status {
        /// Also count this user's documents in the remote store
        #[arg(long)]
        remote: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep running and sync periodically until interrupted
    Watch,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum FavoriteCommands {
    /// Save a place as a favorite
    Add {
        /// Place identifier
        place_id: String,
        /// Display name of the place
        name: Vec<String>,
        /// Optional category, e.g. food or outdoors
        #[arg(long)]
        category: Option<String>,
    },
    /// List favorites, newest first
    List {
        /// Number of favorites to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a favorite by id or unique id prefix
    Remove {
        /// Favorite ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
enum ReviewCommands {
    /// Write a review for a place
    Add {
        /// Place identifier
        place_id: String,
        /// Rating between 0.5 and 5.0
        rating: String,
        /// Review text
        comment: Vec<String>,
    },
    /// List reviews, newest first
    List {
        /// Number of reviews to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change the rating or text of an existing review
    Edit {
        /// Review ID or unique ID prefix
        id: String,
        /// New rating between 0.5 and 5.0
        rating: String,
        /// New review text
        comment: Vec<String>,
    },
    /// Remove a review by id or unique id prefix
    Remove {
        /// Review ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
enum RouteCommands {
    /// Create a route from an ordered list of stops
    Create {
        /// Route name
        name: String,
        /// Stops in visit order, formatted as 'place-id:Stop name' (repeatable)
        #[arg(long = "stop", value_name = "SPEC")]
        stops: Vec<String>,
        /// Optional route summary
        #[arg(long)]
        summary: Option<String>,
    },
    /// List routes, newest first
    List {
        /// Number of routes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a route by id or unique id prefix
    Remove {
        /// Route ID or unique ID prefix
        id: String,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] roam_core::Error),
    #[error(transparent)]
    LibSql(#[from] libsql::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Place ID cannot be empty")]
    EmptyPlaceId,
    #[error("Place name cannot be empty")]
    EmptyPlaceName,
    #[error("Route name cannot be empty")]
    EmptyRouteName,
    #[error("Record ID cannot be empty")]
    EmptyRecordId,
    #[error("{0}")]
    InvalidRating(String),
    #[error("Invalid stop '{0}': expected 'place-id:Stop name'")]
    InvalidStopSpec(String),
    #[error("No record found for id/prefix: {0}")]
    RecordNotFound(String),
    #[error("{0}")]
    AmbiguousRecordId(String),
    #[error(
        "Sync is not configured. Set ROAM_REMOTE_URL (and optionally ROAM_API_KEY, ROAM_USER_ID) to enable `roam sync`."
    )]
    SyncNotConfigured,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum SyncEntity {
    Favorites,
    Reviews,
    Routes,
}

impl From<SyncEntity> for EntityKind {
    fn from(entity: SyncEntity) -> Self {
        match entity {
            SyncEntity::Favorites => Self::Favorite,
            SyncEntity::Reviews => Self::Review,
            SyncEntity::Routes => Self::Route,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("roam_core=info".parse().unwrap())
                .add_directive("roam_cli=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Favorite(command) => run_favorite(command, &db_path).await?,
        Commands::Review(command) => run_review(command, &db_path).await?,
        Commands::Route(command) => run_route(command, &db_path).await?,
        Commands::Sync { entity } => {
            let ctx = build_context(&db_path).await?;
            run_sync(&ctx, entity).await?;
        }
        Commands::Status { remote, json } => {
            let ctx = build_context(&db_path).await?;
            run_status(&ctx, remote, json).await?;
        }
        Commands::Watch => {
            let ctx = build_context(&db_path).await?;
            run_watch(&ctx).await?;
        }
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}

async fn run_favorite(command: FavoriteCommands, db_path: &Path) -> Result<(), CliError> {
    let ctx = build_context(db_path).await?;
    match command {
        FavoriteCommands::Add {
            place_id,
            name,
            category,
        } => run_favorite_add(&ctx, &place_id, &name, category).await,
        FavoriteCommands::List { limit, json } => run_favorite_list(&ctx, limit, json).await,
        FavoriteCommands::Remove { id } => run_favorite_remove(&ctx, &id).await,
    }
}

async fn run_review(command: ReviewCommands, db_path: &Path) -> Result<(), CliError> {
    let ctx = build_context(db_path).await?;
    match command {
        ReviewCommands::Add {
            place_id,
            rating,
            comment,
        } => run_review_add(&ctx, &place_id, &rating, &comment).await,
        ReviewCommands::List { limit, json } => run_review_list(&ctx, limit, json).await,
        ReviewCommands::Edit {
            id,
            rating,
            comment,
        } => run_review_edit(&ctx, &id, &rating, &comment).await,
        ReviewCommands::Remove { id } => run_review_remove(&ctx, &id).await,
    }
}

async fn run_route(command: RouteCommands, db_path: &Path) -> Result<(), CliError> {
    let ctx = build_context(db_path).await?;
    match command {
        RouteCommands::Create {
            name,
            stops,
            summary,
        } => run_route_create(&ctx, &name, &stops, summary).await,
        RouteCommands::List { limit, json } => run_route_list(&ctx, limit, json).await,
        RouteCommands::Remove { id } => run_route_remove(&ctx, &id).await,
    }
}

// Favorites -----------------------------------------------------------------

async fn run_favorite_add(
    ctx: &CliContext,
    place_id: &str,
    name_parts: &[String],
    category: Option<String>,
) -> Result<(), CliError> {
    let place_id = require_value(place_id, CliError::EmptyPlaceId)?;
    let place_name = require_value(&name_parts.join(" "), CliError::EmptyPlaceName)?;

    let favorite = if let Some(service) = &ctx.service {
        service.add_favorite(&place_id, &place_name, category).await?
    } else {
        favorites_repo(ctx)
            .create(&ctx.user_id, &place_id, &place_name, normalize_optional(category))
            .await?
    };

    println!("{}", favorite.id);
    Ok(())
}

async fn run_favorite_list(ctx: &CliContext, limit: usize, as_json: bool) -> Result<(), CliError> {
    let favorites = favorites_repo(ctx).list(limit, 0).await?;

    if as_json {
        let items = favorites
            .iter()
            .map(favorite_to_list_item)
            .collect::<Vec<FavoriteListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_favorite_lines(&favorites) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn run_favorite_remove(ctx: &CliContext, raw_id: &str) -> Result<(), CliError> {
    let resolved = resolve_record_id(&ctx.db, "favorites", raw_id).await?;
    let id: FavoriteId = resolved
        .parse()
        .map_err(|_| CliError::RecordNotFound(raw_id.to_string()))?;

    if let Some(service) = &ctx.service {
        service.remove_favorite(&id).await?;
    } else {
        favorites_repo(ctx).delete(&id).await?;
    }

    println!("{resolved}");
    Ok(())
}

// Reviews -------------------------------------------------------------------

async fn run_review_add(
    ctx: &CliContext,
    place_id: &str,
    rating_raw: &str,
    comment_parts: &[String],
) -> Result<(), CliError> {
    let place_id = require_value(place_id, CliError::EmptyPlaceId)?;
    let rating = parse_rating(rating_raw)?;
    let comment = comment_parts.join(" ");

    let review = if let Some(service) = &ctx.service {
        service.add_review(&place_id, rating, &comment).await?
    } else {
        reviews_repo(ctx)
            .create(&ctx.user_id, &place_id, rating, comment.trim())
            .await?
    };

    println!("{}", review.id);
    Ok(())
}

async fn run_review_list(ctx: &CliContext, limit: usize, as_json: bool) -> Result<(), CliError> {
    let reviews = reviews_repo(ctx).list(limit, 0).await?;

    if as_json {
        let items = reviews
            .iter()
            .map(review_to_list_item)
            .collect::<Vec<ReviewListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_review_lines(&reviews) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn run_review_edit(
    ctx: &CliContext,
    raw_id: &str,
    rating_raw: &str,
    comment_parts: &[String],
) -> Result<(), CliError> {
    let rating = parse_rating(rating_raw)?;
    let resolved = resolve_record_id(&ctx.db, "reviews", raw_id).await?;
    let id: ReviewId = resolved
        .parse()
        .map_err(|_| CliError::RecordNotFound(raw_id.to_string()))?;
    let comment = comment_parts.join(" ");

    let review = if let Some(service) = &ctx.service {
        service.update_review(&id, rating, &comment).await?
    } else {
        reviews_repo(ctx).update(&id, rating, comment.trim()).await?
    };

    println!("{}", review.id);
    Ok(())
}

async fn run_review_remove(ctx: &CliContext, raw_id: &str) -> Result<(), CliError> {
    let resolved = resolve_record_id(&ctx.db, "reviews", raw_id).await?;
    let id: ReviewId = resolved
        .parse()
        .map_err(|_| CliError::RecordNotFound(raw_id.to_string()))?;

    if let Some(service) = &ctx.service {
        service.remove_review(&id).await?;
    } else {
        reviews_repo(ctx).delete(&id).await?;
    }

    println!("{resolved}");
    Ok(())
}

// Routes --------------------------------------------------------------------

async fn run_route_create(
    ctx: &CliContext,
    name: &str,
    stop_specs: &[String],
    summary: Option<String>,
) -> Result<(), CliError> {
    let name = require_value(name, CliError::EmptyRouteName)?;
    let stops = parse_stop_specs(stop_specs)?;

    let route = if let Some(service) = &ctx.service {
        service.create_route(&name, summary, stops).await?
    } else {
        routes_repo(ctx)
            .create(&ctx.user_id, &name, normalize_optional(summary), stops)
            .await?
    };

    println!("{}", route.id);
    Ok(())
}

async fn run_route_list(ctx: &CliContext, limit: usize, as_json: bool) -> Result<(), CliError> {
    let routes = routes_repo(ctx).list(limit, 0).await?;

    if as_json {
        let items = routes
            .iter()
            .map(route_to_list_item)
            .collect::<Vec<RouteListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_route_lines(&routes) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn run_route_remove(ctx: &CliContext, raw_id: &str) -> Result<(), CliError> {
    let resolved = resolve_record_id(&ctx.db, "routes", raw_id).await?;
    let id: RouteId = resolved
        .parse()
        .map_err(|_| CliError::RecordNotFound(raw_id.to_string()))?;

    if let Some(service) = &ctx.service {
        service.remove_route(&id).await?;
    } else {
        routes_repo(ctx).delete(&id).await?;
    }

    println!("{resolved}");
    Ok(())
}

// Sync ----------------------------------------------------------------------

async fn run_sync(ctx: &CliContext, entity: Option<SyncEntity>) -> Result<(), CliError> {
    let service = require_service(ctx)?;

    let outcomes = match entity {
        Some(entity) => vec![service.sync_now(entity.into()).await?],
        None => service.sync_all_now().await?,
    };

    for outcome in &outcomes {
        println!("{}", format_outcome(outcome));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusCounts {
    favorites: usize,
    reviews: usize,
    routes: usize,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    pending: StatusCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote: Option<StatusCounts>,
}

async fn run_status(ctx: &CliContext, include_remote: bool, as_json: bool) -> Result<(), CliError> {
    let pending = StatusCounts {
        favorites: favorites_repo(ctx).count_unsynced().await?,
        reviews: reviews_repo(ctx).count_unsynced().await?,
        routes: routes_repo(ctx).count_unsynced().await?,
    };

    let remote = if include_remote {
        let counts = require_service(ctx)?.remote_counts().await?;
        Some(StatusCounts {
            favorites: counts.favorites,
            reviews: counts.reviews,
            routes: counts.routes,
        })
    } else {
        None
    };

    if as_json {
        let report = StatusReport { pending, remote };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Pending push: favorites {}, reviews {}, routes {}",
            pending.favorites, pending.reviews, pending.routes
        );
        if let Some(remote) = remote {
            println!(
                "Remote documents: favorites {}, reviews {}, routes {}",
                remote.favorites, remote.reviews, remote.routes
            );
        }
    }
    Ok(())
}

async fn run_watch(ctx: &CliContext) -> Result<(), CliError> {
    let service = require_service(ctx)?;

    service.enable_periodic_sync()?;
    println!(
        "Syncing every {:?}; local edits sync shortly after they happen. Press Ctrl-C to stop.",
        service.settings().sync_interval
    );

    tokio::signal::ctrl_c().await?;
    service.shutdown();
    println!("Stopped");
    Ok(())
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();
    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut command, "roam", &mut buffer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut command, "roam", &mut buffer),
        CompletionShell::Fish => generate(shells::Fish, &mut command, "roam", &mut buffer),
    }

    match output_path {
        Some(path) => {
            std::fs::write(path, &buffer)?;
            println!("{}", path.display());
        }
        None => io::stdout().write_all(&buffer)?,
    }

    Ok(())
}

// Output formatting ---------------------------------------------------------

#[derive(Debug, Serialize)]
struct FavoriteListItem {
    id: String,
    place_id: String,
    place_name: String,
    category: Option<String>,
    created_at: i64,
    synced: bool,
}

#[derive(Debug, Serialize)]
struct ReviewListItem {
    id: String,
    place_id: String,
    rating: f64,
    comment: String,
    helpful_count: i64,
    updated_at: i64,
    synced: bool,
}

#[derive(Debug, Serialize)]
struct RouteStopItem {
    place_id: String,
    name: String,
    position: i64,
}

#[derive(Debug, Serialize)]
struct RouteListItem {
    id: String,
    name: String,
    summary: Option<String>,
    stops: Vec<RouteStopItem>,
    updated_at: i64,
    synced: bool,
}

fn favorite_to_list_item(favorite: &Favorite) -> FavoriteListItem {
    FavoriteListItem {
        id: favorite.id.as_str(),
        place_id: favorite.place_id.clone(),
        place_name: favorite.place_name.clone(),
        category: favorite.category.clone(),
        created_at: favorite.created_at,
        synced: favorite.synced,
    }
}

fn review_to_list_item(review: &Review) -> ReviewListItem {
    ReviewListItem {
        id: review.id.as_str(),
        place_id: review.place_id.clone(),
        rating: review.rating,
        comment: review.comment.clone(),
        helpful_count: review.helpful_count,
        updated_at: review.updated_at,
        synced: review.synced,
    }
}

fn route_to_list_item(route: &TravelRoute) -> RouteListItem {
    RouteListItem {
        id: route.id.as_str(),
        name: route.name.clone(),
        summary: route.summary.clone(),
        stops: route
            .stops
            .iter()
            .map(|stop| RouteStopItem {
                place_id: stop.place_id.clone(),
                name: stop.name.clone(),
                position: stop.position,
            })
            .collect(),
        updated_at: route.updated_at,
        synced: route.synced,
    }
}

fn format_favorite_lines(favorites: &[Favorite]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    favorites
        .iter()
        .map(|favorite| {
            let short_id = short_id(&favorite.id.as_str());
            let name = preview(&favorite.place_name, 32);
            let when = format_relative_time(favorite.created_at, now_ms);
            let pending = pending_marker(favorite.synced);
            format!("{short_id:<13}  {name:<32}  {when}{pending}")
        })
        .collect()
}

fn format_review_lines(reviews: &[Review]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    reviews
        .iter()
        .map(|review| {
            let short_id = short_id(&review.id.as_str());
            let place = preview(&review.place_id, 16);
            let rating = format!("{:.1}", review.rating);
            let comment = preview(&review.comment, 36);
            let when = format_relative_time(review.updated_at, now_ms);
            let pending = pending_marker(review.synced);
            format!("{short_id:<13}  {place:<16}  {rating}  {comment:<36}  {when}{pending}")
        })
        .collect()
}

fn format_route_lines(routes: &[TravelRoute]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    routes
        .iter()
        .map(|route| {
            let short_id = short_id(&route.id.as_str());
            let name = preview(&route.name, 28);
            let stops = route.stops.len();
            let when = format_relative_time(route.updated_at, now_ms);
            let pending = pending_marker(route.synced);
            format!("{short_id:<13}  {name:<28}  {stops:>2} stops  {when}{pending}")
        })
        .collect()
}

fn format_outcome(outcome: &SyncOutcome) -> String {
    let collection = outcome.entity.collection();
    let push = match &outcome.push {
        PhaseOutcome::Skipped => "nothing to push".to_string(),
        PhaseOutcome::Completed { records } => format!("pushed {records}"),
        PhaseOutcome::Failed { reason } => format!("push failed ({reason})"),
    };

    match &outcome.pull {
        Some(PhaseOutcome::Skipped) => format!("{collection}: {push}, nothing to pull"),
        Some(PhaseOutcome::Completed { records }) => {
            format!("{collection}: {push}, pulled {records}")
        }
        Some(PhaseOutcome::Failed { reason }) => {
            format!("{collection}: {push}, pull failed ({reason})")
        }
        None => format!("{collection}: {push}"),
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

fn pending_marker(synced: bool) -> &'static str {
    if synced {
        ""
    } else {
        "  (pending)"
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let mut truncated: String = collapsed.chars().take(max_chars.saturating_sub(3)).collect();
        truncated.push_str("...");
        truncated
    }
}

fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    const MINUTE: i64 = 60_000;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;

    let diff = now_ms.saturating_sub(timestamp_ms);
    if diff < MINUTE {
        "just now".to_string()
    } else if diff < HOUR {
        format!("{}m ago", diff / MINUTE)
    } else if diff < DAY {
        format!("{}h ago", diff / HOUR)
    } else if diff < 28 * DAY {
        format!("{}d ago", diff / DAY)
    } else {
        chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
            || "long ago".to_string(),
            |when| when.format("%Y-%m-%d").to_string(),
        )
    }
}

// Input parsing -------------------------------------------------------------

fn require_value(raw: &str, error: CliError) -> Result<String, CliError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(error)
    } else {
        Ok(trimmed.to_string())
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_rating(raw: &str) -> Result<f64, CliError> {
    let rating: f64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid_rating(raw))?;
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(rating)
    } else {
        Err(invalid_rating(raw))
    }
}

fn invalid_rating(raw: &str) -> CliError {
    CliError::InvalidRating(format!(
        "Invalid rating '{}': expected a number between {MIN_RATING} and {MAX_RATING}",
        raw.trim()
    ))
}

/// Build stops from repeated `--stop` flags; flag order is visit order
fn parse_stop_specs(specs: &[String]) -> Result<Vec<RouteStop>, CliError> {
    specs
        .iter()
        .zip(0i64..)
        .map(|(spec, position)| parse_stop_spec(spec, position))
        .collect()
}

fn parse_stop_spec(spec: &str, position: i64) -> Result<RouteStop, CliError> {
    let (place_id, name) = spec
        .split_once(':')
        .ok_or_else(|| CliError::InvalidStopSpec(spec.to_string()))?;
    let place_id = place_id.trim();
    let name = name.trim();
    if place_id.is_empty() || name.is_empty() {
        return Err(CliError::InvalidStopSpec(spec.to_string()));
    }

    Ok(RouteStop {
        place_id: place_id.to_string(),
        name: name.to_string(),
        position,
    })
}

/// Resolve a full record id from an exact id or unique prefix
async fn resolve_record_id(db: &Database, table: &str, raw: &str) -> Result<String, CliError> {
    let prefix = raw.trim();
    if prefix.is_empty() {
        return Err(CliError::EmptyRecordId);
    }

    let sql =
        format!("SELECT id FROM {table} WHERE id LIKE ?1 ORDER BY updated_at DESC LIMIT 3");
    let mut rows = db
        .connection()
        .query(&sql, libsql::params![format!("{prefix}%")])
        .await?;

    let mut matches = Vec::new();
    while let Some(row) = rows.next().await? {
        matches.push(row.get::<String>(0)?);
    }

    match matches.len() {
        0 => Err(CliError::RecordNotFound(prefix.to_string())),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .map(|id| short_id(id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousRecordId(format!(
                "ID prefix '{prefix}' is ambiguous; matches: {options}"
            )))
        }
    }
}

// Context -------------------------------------------------------------------

struct CliContext {
    db: Database,
    service: Option<SyncService>,
    user_id: String,
}

async fn build_context(db_path: &Path) -> Result<CliContext, CliError> {
    let db = Database::open(db_path).await?;
    let user_id = resolve_user_id();
    let service = match SyncSettings::from_env() {
        Some(settings) => {
            tracing::debug!("Remote sync configured against {}", settings.base_url);
            Some(SyncService::new(&db, settings)?)
        }
        None => None,
    };

    Ok(CliContext {
        db,
        service,
        user_id,
    })
}

fn require_service(ctx: &CliContext) -> Result<&SyncService, CliError> {
    ctx.service.as_ref().ok_or(CliError::SyncNotConfigured)
}

fn favorites_repo(ctx: &CliContext) -> FavoriteRepository {
    FavoriteRepository::new(ctx.db.connection().clone())
}

fn reviews_repo(ctx: &CliContext) -> ReviewRepository {
    ReviewRepository::new(ctx.db.connection().clone())
}

fn routes_repo(ctx: &CliContext) -> RouteRepository {
    RouteRepository::new(ctx.db.connection().clone())
}

fn resolve_user_id() -> String {
    env::var("ROAM_USER_ID")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("ROAM_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("roam")
        .join("roam.db")
}
