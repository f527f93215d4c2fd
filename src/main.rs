use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use profile_feed::cache::{CacheLayer, FreshnessPolicy, KeyValueStore, NoopStore, SqliteStore};
use profile_feed::config::{self, Config};
use profile_feed::feed::{
  EntityId, FavoriteGuard, FavoriteOutcome, FeedController, FeedView, FetchOutcome, Profile,
};
use profile_feed::remote::HttpProfileClient;

#[derive(Parser, Debug)]
#[command(name = "profile-feed")]
#[command(about = "Browse profiles with an offline cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/profile-feed/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// List context to use (default: `default_context` from the config)
  #[arg(long)]
  context: Option<String>,

  /// Never contact the service; serve the saved list whatever its age
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Load pages into the list and print it
  Browse {
    /// Number of pages to load this session
    #[arg(short, long, default_value_t = 1)]
    pages: u32,
  },
  /// Add profiles to favorites
  Favorite {
    #[arg(required = true)]
    ids: Vec<EntityId>,
  },
  /// Print the last saved list without contacting the service
  ShowCached,
  /// Remove the saved list for the context
  ClearCache,
  /// Print one cached profile
  Profile { id: EntityId },
}

type Controller = FeedController<Box<dyn KeyValueStore>>;

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = init_logging();

  let context = config.resolve_context(args.context.as_deref())?;
  let store = open_store(&config)?;
  let cache = CacheLayer::new(store).with_freshness(FreshnessPolicy::new(config.ttl()));
  let mut feed = FeedController::new(context, cache)
    .with_page_size(config.api.page_size)
    .with_fetch_timeout(config.timeout());

  match args.command {
    Command::Browse { .. } if args.offline => {
      if !feed.retry_show_cached() {
        println!("No cached data for '{}'.", feed.context());
        return Ok(());
      }
      print_feed(&feed);
    }
    Command::Browse { pages } => {
      let api = HttpProfileClient::new(&config)?;
      feed.hydrate_if_fresh();
      for _ in 0..pages {
        match feed.request_next_page(&api).await {
          FetchOutcome::Merged { is_last_page, .. } if !is_last_page => continue,
          _ => break,
        }
      }
      print_feed(&feed);
    }
    Command::Favorite { .. } if args.offline => {
      return Err(eyre!("Favorites need the service; drop --offline"));
    }
    Command::Favorite { ids } => {
      let api = HttpProfileClient::new(&config)?;
      let guard = FavoriteGuard::new().with_timeout(config.timeout());

      // Repeated ids on the command line are submitted once
      let results = join_all(ids.iter().map(|id| guard.favorite_with(&api, id.clone()))).await;
      for (id, result) in ids.iter().zip(results) {
        match result {
          Ok(FavoriteOutcome::Confirmed) => println!("{}: added to favorites", id),
          Ok(FavoriteOutcome::AlreadyPending) | Ok(FavoriteOutcome::AlreadyConfirmed) => {
            println!("{}: already submitted", id)
          }
          Err(e) => println!("{}: {}", id, e),
        }
      }
    }
    Command::ShowCached => {
      if !feed.retry_show_cached() {
        println!("No cached data for '{}'.", feed.context());
        return Ok(());
      }
      print_feed(&feed);
    }
    Command::ClearCache => {
      feed.clear_cache();
      println!("Cleared cached list for '{}'.", feed.context());
    }
    Command::Profile { id } => match feed.cached_profile(&id) {
      Some(profile) => print_profile_detail(&profile),
      None => return Err(eyre!("Profile {} is not cached", id)),
    },
  }

  Ok(())
}

fn open_store(config: &Config) -> Result<Box<dyn KeyValueStore>> {
  if !config.cache.enabled {
    return Ok(Box::new(NoopStore));
  }

  let store = match &config.cache.path {
    Some(path) => SqliteStore::open_at(path)?,
    None => SqliteStore::open()?,
  };
  Ok(Box::new(store))
}

/// Log to a file so stdout stays readable. Level comes from PROFILE_FEED_LOG.
fn init_logging() -> Option<WorkerGuard> {
  let filter = EnvFilter::try_from_env("PROFILE_FEED_LOG")
    .unwrap_or_else(|_| EnvFilter::new("profile_feed=info"));

  let dir = config::data_dir()?;
  std::fs::create_dir_all(&dir).ok()?;

  let appender = tracing_appender::rolling::never(dir, "profile-feed.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .ok()?;

  Some(guard)
}

fn print_feed(feed: &Controller) {
  let view = feed.view();

  if view.is_degraded {
    println!("Showing cached data. Live data unavailable.");
  }

  for profile in feed.profiles() {
    print_profile_line(profile);
  }

  print_footer(&view);
}

fn print_footer(view: &FeedView) {
  if view.offer_show_cached {
    println!("Unable to load '{}' right now.", view.context);
    if let Some(error) = &view.error {
      println!("  {}", error);
    }
    println!("Run `profile-feed show-cached` to see the last saved list.");
  } else if view.len == 0 {
    println!("No profiles found.");
  } else if view.can_load_more && !view.is_degraded {
    println!("{} profiles; more available (use --pages).", view.len);
  } else {
    println!("{} profiles.", view.len);
  }
}

fn print_profile_line(profile: &Profile) {
  let details: Vec<String> = ["age", "religion", "currentCity"]
    .iter()
    .filter_map(|field| profile.field_text(field))
    .collect();
  println!(
    "{:>8}  {:<20} {}",
    profile.id,
    profile.display_name(),
    details.join(", ")
  );
}

fn print_profile_detail(profile: &Profile) {
  println!("{} (ID: {})", profile.display_name(), profile.id);
  for (name, value) in &profile.fields {
    if name.starts_with("profilePhoto") {
      continue;
    }
    println!("  {}: {}", name, value);
  }
}
