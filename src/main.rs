use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use shopsync::actions::{self, ClickTarget};
use shopsync::app::App;
use shopsync::cache::InstallOutcome;
use shopsync::catalog::Products;
use shopsync::config::Config;
use shopsync::event::{Event, EventHandler};
use shopsync::net::Request;
use shopsync::notify::PushNotification;
use shopsync::outbox::RecordKind;
use shopsync::sync::{SubmitOutcome, SyncTrigger};

#[derive(Parser, Debug)]
#[command(name = "shopsync")]
#[command(about = "Offline sync engine for an e-commerce storefront")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/shopsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Server base URL, overrides the config file
  #[arg(short, long)]
  server: Option<String>,

  /// Directory for the local stores, overrides the config file
  #[arg(short, long)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run the event loop: connectivity probe, periodic sync, cache updates
  Run,
  /// Drain the outbox once
  Sync {
    #[arg(short, long)]
    kind: Option<Kind>,
  },
  /// Show pending outbox records and cart size
  Status,
  /// Fetch a URL through the request router
  Fetch {
    url: String,
    /// Treat as a page navigation (enables the offline fallback)
    #[arg(short, long)]
    navigate: bool,
  },
  /// Submit a write, queueing it if the server cannot take it now
  Submit { kind: Kind, payload: String },
  /// Refresh and list products
  Products {
    #[arg(short, long)]
    category: Option<String>,
  },
  /// Classify a click and dispatch the resulting action
  Click {
    #[arg(long)]
    id: Option<String>,
    /// Classes of the clicked element and its ancestors, innermost first
    #[arg(long = "class")]
    classes: Vec<String>,
    #[arg(long)]
    product: Option<String>,
  },
  /// Present a push payload and route a click on it
  Push {
    payload: Option<String>,
    /// Addresses of currently open views
    #[arg(long = "view")]
    views: Vec<String>,
  },
  /// Register a push subscription descriptor with the server
  Subscribe { descriptor: String },
  /// Install the configured cache generation
  Install,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
  Order,
  Activity,
}

impl From<Kind> for RecordKind {
  fn from(kind: Kind) -> Self {
    match kind {
      Kind::Order => RecordKind::Order,
      Kind::Activity => RecordKind::Activity,
    }
  }
}

fn init_logging(config: &Config) -> Option<WorkerGuard> {
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_deref().unwrap_or("shopsync=info")));

  match &config.log_dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, "shopsync.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Some(guard)
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      None
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration, then apply command line overrides
  let mut config = Config::load(args.config.as_deref())?;
  if let Some(server) = args.server {
    config.server.base_url = server;
  }
  if let Some(dir) = args.data_dir {
    config.data_dir = Some(dir);
  }

  let _guard = init_logging(&config);

  let mut events = EventHandler::new();
  let command = args.command.unwrap_or(Command::Run);
  let views = match &command {
    Command::Push { views, .. } => views.clone(),
    _ => Vec::new(),
  };
  let mut app = App::new(config, &events, views)?;

  match command {
    Command::Run => {
      events.spawn_probe(
        Arc::clone(app.transport()),
        app.config().sync.probe_path.clone(),
        Duration::from_secs(app.config().sync.probe_secs.max(1)),
      );
      events.spawn_timer(Duration::from_secs(app.config().sync.periodic_secs.max(1)));

      let shutdown = events.sender();
      tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
          shutdown.send(Event::Shutdown);
        }
      });

      app.run(&mut events).await;
    }
    Command::Sync { kind } => {
      let trigger = match kind {
        Some(kind) => SyncTrigger::BackgroundSync(kind.into()),
        None => SyncTrigger::Manual,
      };
      for report in app.sync().on_trigger(trigger).await {
        println!(
          "{}: {} pending, {} delivered, {} unconfirmed, {} failed",
          report.kind,
          report.pending,
          report.delivered.len(),
          report.unconfirmed.len(),
          report.failed.len()
        );
        for (id, failure) in &report.failed {
          println!("  {} {:?}", id, failure);
        }
      }
    }
    Command::Status => {
      for kind in RecordKind::ALL {
        println!("{}: {} pending", kind, app.sync().outbox().pending_count(kind)?);
      }
      println!("cart: {} items", app.catalog().cart_items()?.len());
    }
    Command::Fetch { url, navigate } => {
      let request = if navigate {
        Request::navigate(url)
      } else {
        Request::get(url)
      };
      let routed = app.router().handle(&request).await;
      eprintln!("{} ({:?})", routed.response.status, routed.source);
      println!("{}", String::from_utf8_lossy(&routed.response.body));
    }
    Command::Submit { kind, payload } => {
      let payload: serde_json::Value =
        serde_json::from_str(&payload).map_err(|e| eyre!("Invalid JSON payload: {}", e))?;
      let kind = RecordKind::from(kind);
      match app.submitter().submit(kind, &payload).await {
        Ok(outcome) => {
          if let Some(message) = outcome.user_message(kind) {
            println!("{}", message);
          } else if let SubmitOutcome::Queued(id) = outcome {
            println!("queued as {}", id);
          }
        }
        Err(e) => return Err(eyre!("{}", e.user_message())),
      }
    }
    Command::Products { category } => {
      let products = match app.catalog().load_products().await {
        Products::Fresh(products) => products,
        Products::Cached(products) => {
          eprintln!("offline, showing cached products");
          products
        }
        Products::Unavailable => return Err(eyre!("No products available offline")),
      };
      let products = match category {
        Some(category) => app.catalog().products_in_category(&category)?,
        None => products,
      };
      for product in products {
        println!("{}\t{}\t{}\t{}", product.id, product.category, product.price, product.name);
      }
    }
    Command::Click {
      id,
      classes,
      product,
    } => {
      let target = ClickTarget {
        element_id: id,
        classes,
        product_id: product,
      };
      let Some(action) = actions::classify(&target) else {
        println!("no action");
        return Ok(());
      };
      let dispatched = app.dispatch(&action).await;
      if let Some(message) = dispatched.message {
        println!("{}", message);
      }
      if let Some(page) = dispatched.page {
        eprintln!("{} ({:?})", page.response.status, page.source);
      }
    }
    Command::Push { payload, .. } => {
      let raw = payload.map(String::into_bytes);
      let notification = PushNotification::decode(raw.as_deref()).to_notification();
      app.handle_event(Event::Push(raw)).await;
      app
        .handle_event(Event::NotificationClick(notification))
        .await;
    }
    Command::Subscribe { descriptor } => {
      let descriptor: serde_json::Value =
        serde_json::from_str(&descriptor).map_err(|e| eyre!("Invalid subscription descriptor: {}", e))?;
      app.subscribe(&descriptor).await?;
      println!("push subscription registered");
    }
    Command::Install => match app.update_cache().await? {
      InstallOutcome::AlreadyCurrent => println!("cache already current"),
      InstallOutcome::Installed(count) => println!("cached {} assets", count),
    },
  }

  Ok(())
}
