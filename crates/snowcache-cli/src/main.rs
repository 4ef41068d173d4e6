//! snowcache - headless driver for the offline-first resort data layer.
//!
//! Hydrates from the local cache, syncs with the backend and edits
//! preferences from a terminal, printing what a UI would show.

use std::io;
use std::path::Path;

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use snowcache_core::auth::SessionData;
use snowcache_core::models::{DistanceUnit, TemperatureUnit};
use snowcache_core::utils::truncate_string;
use snowcache_core::{Category, Config, DataStatus, RefreshOutcome, RefreshTrigger, SnowCache};

// ============================================================================
// Constants
// ============================================================================

/// Overrides `api_base_url` from the config file
const API_URL_ENV: &str = "SNOWCACHE_API_URL";

/// Seeds the session with a bearer token
const TOKEN_ENV: &str = "SNOWCACHE_TOKEN";

const LOG_FILE_PREFIX: &str = "snowcache.log";

/// Resorts listed under the status table
const MAX_LISTED_RESORTS: usize = 20;

const USAGE: &str = "\
Usage: snowcache <command>

Commands:
  status [--region <name>]       Show cached data without touching the network
  sync [--manual]                Refresh everything and wait for it to finish
  favorite <resort-id>           Mark a resort as a favorite
  unfavorite <resort-id>         Remove a favorite
  units <celsius|fahrenheit> <metric|imperial>
  clear-cache                    Delete every cached entry
  cleanup                        Delete entries past their hard expiry";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr (filtered by `RUST_LOG`, default `warn`) and to a
/// daily-rolling file in `log_dir`. The returned guard flushes the file
/// writer when dropped.
fn init_tracing(log_dir: &Path) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        Err(e) => {
            eprintln!("Logging to file disabled: {}", e);
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn load_config() -> Result<Config> {
    let mut config = Config::load()?;
    if let Ok(url) = std::env::var(API_URL_ENV) {
        config.api_base_url = url;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        println!("{}", USAGE);
        return Ok(());
    };
    if matches!(command, "-h" | "--help" | "help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = load_config()?;
    let _log_guard = init_tracing(&config.data_dir()?.join("logs"));
    info!(command, "snowcache starting");

    let mut cache = SnowCache::new(config)?;
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        cache.session().update(SessionData::new(token));
    }

    let result = run(&mut cache, command, &args[1..]).await;
    cache.shutdown().await;
    result
}

async fn run(cache: &mut SnowCache, command: &str, rest: &[String]) -> Result<()> {
    match command {
        "status" => {
            let region = match rest {
                [flag, region, ..] if flag == "--region" => Some(region.as_str()),
                [flag] if flag == "--region" => bail!("--region needs a name\n\n{}", USAGE),
                _ => None,
            };
            cache.hydrate();
            print_status(cache, region);
        }
        "sync" => {
            let outcome = if rest.iter().any(|arg| arg == "--manual") {
                cache.hydrate();
                cache.refresh_all(RefreshTrigger::Manual)
            } else {
                cache.launch().1
            };
            match outcome {
                RefreshOutcome::Started(categories) => {
                    let names: Vec<&str> = categories.iter().map(|c| c.display_name()).collect();
                    println!("Refreshing {}...", names.join(", "));
                    cache.run_until_idle().await;
                }
                RefreshOutcome::UpToDate => println!("Everything is up to date."),
                RefreshOutcome::AlreadyInFlight => println!("A refresh is already running."),
                RefreshOutcome::RateLimited { retry_after } => {
                    println!("Refreshed moments ago. Try again in {}s.", retry_after.as_secs().max(1));
                }
            }
            print_status(cache, None);
        }
        "favorite" | "unfavorite" => {
            let Some(resort_id) = rest.first() else {
                bail!("{} needs a resort id\n\n{}", command, USAGE);
            };
            let favorite = command == "favorite";
            let prefs = cache.mutate_preferences(|prefs| {
                if favorite {
                    prefs.favorite_resort_ids.insert(resort_id.clone());
                } else {
                    prefs.favorite_resort_ids.remove(resort_id);
                }
            });
            println!("Favorites: {}", format_list(prefs.favorite_resort_ids.iter()));
        }
        "units" => {
            let (Some(temperature), Some(distance)) = (rest.first(), rest.get(1)) else {
                bail!("units needs a temperature and a distance unit\n\n{}", USAGE);
            };
            let temperature = match temperature.as_str() {
                "celsius" | "c" => TemperatureUnit::Celsius,
                "fahrenheit" | "f" => TemperatureUnit::Fahrenheit,
                other => bail!("Unknown temperature unit: {}", other),
            };
            let distance = match distance.as_str() {
                "metric" => DistanceUnit::Metric,
                "imperial" => DistanceUnit::Imperial,
                other => bail!("Unknown distance unit: {}", other),
            };
            let prefs = cache.mutate_preferences(|prefs| {
                prefs.units.temperature = temperature;
                prefs.units.distance = distance;
            });
            println!("Units: {:?} / {:?}", prefs.units.temperature, prefs.units.distance);
        }
        "clear-cache" => {
            cache.clear_cache()?;
            println!("Cache cleared.");
        }
        "cleanup" => {
            let removed = cache.cleanup();
            println!("Removed {} expired entries.", removed);
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
    Ok(())
}

fn print_status(cache: &SnowCache, region: Option<&str>) {
    let board = cache.board();
    for category in Category::ALL {
        println!("{:<22} {}", category.display_name(), describe(board.get(category)));
    }

    let resorts: Vec<_> = cache
        .resorts()
        .into_iter()
        .filter(|resort| region.map_or(true, |region| resort.is_in_region(region)))
        .collect();
    if resorts.is_empty() {
        return;
    }
    let prefs = cache.preferences();
    let now = Utc::now();
    println!();
    for resort in resorts.iter().take(MAX_LISTED_RESORTS) {
        let star = if prefs.is_favorite(&resort.id) { "*" } else { " " };
        let quality = cache
            .read_snow_quality(&resort.id)
            .map(|view| format!("{} ({})", view.data.overall_quality, view.age_display(now)))
            .unwrap_or_else(|| "-".to_string());
        let drop = resort
            .vertical_drop_m()
            .map(|m| format!("{}m", m))
            .unwrap_or_default();
        println!(
            "{} {:<30} {:<20} {:>6}",
            star,
            truncate_string(&resort.name, 30),
            quality,
            drop
        );
    }
    if resorts.len() > MAX_LISTED_RESORTS {
        println!("  ... and {} more", resorts.len() - MAX_LISTED_RESORTS);
    }

    let diagnostics = cache.store_diagnostics();
    if diagnostics.decode_failures > 0 {
        println!("\n{} cached entries could not be read.", diagnostics.decode_failures);
    }
}

fn describe(status: &DataStatus) -> String {
    if status.unable_to_load {
        return format!(
            "unable to load ({})",
            status.last_error_summary.as_deref().unwrap_or("unknown error")
        );
    }
    if !status.has_data {
        return "no data".to_string();
    }

    let mut parts = vec![status.age_description.clone().unwrap_or_default()];
    if status.is_stale {
        parts.push("stale".to_string());
    }
    if status.is_using_cached_data {
        parts.push("offline copy".to_string());
    }
    if let Some(ref error) = status.last_error_summary {
        parts.push(error.clone());
    }
    parts.join(", ")
}

fn format_list<'a>(items: impl Iterator<Item = &'a String>) -> String {
    let items: Vec<&str> = items.map(String::as_str).collect();
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_offline_copy() {
        let status = DataStatus {
            has_data: true,
            is_stale: true,
            is_using_cached_data: true,
            unable_to_load: false,
            age_description: Some("~2h ago".to_string()),
            last_error_summary: Some("Network error. Check your connection.".to_string()),
        };
        assert_eq!(
            describe(&status),
            "~2h ago, stale, offline copy, Network error. Check your connection."
        );
    }

    #[test]
    fn test_describe_unable_to_load() {
        let status = DataStatus {
            unable_to_load: true,
            last_error_summary: Some("The server took too long to respond.".to_string()),
            ..DataStatus::default()
        };
        assert_eq!(describe(&status), "unable to load (The server took too long to respond.)");
        assert_eq!(describe(&DataStatus::default()), "no data");
    }

    #[test]
    fn test_format_list() {
        let empty: Vec<String> = Vec::new();
        assert_eq!(format_list(empty.iter()), "(none)");
        let ids = vec!["aspen".to_string(), "vail".to_string()];
        assert_eq!(format_list(ids.iter()), "aspen, vail");
    }
}
