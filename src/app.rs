use crate::actions::Action;
use crate::cache::{CacheError, CacheLayer, InstallOutcome, SqliteStorage};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::db::Database;
use crate::event::{Connectivity, Event, EventHandler};
use crate::net::{HttpTransport, Request, Transport};
use crate::notify::{
  register_subscription, ClientViews, ListedViews, LogPresenter, NotificationDispatcher, Presenter,
  SubscriptionError,
};
use crate::outbox::{Outbox, RecordKind};
use crate::router::{RequestRouter, Routed};
use crate::sync::{SubmitOutcome, Submitter, SyncCoordinator, SyncScheduler, SyncTrigger};
use chrono::Utc;
use color_eyre::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

const EMPTY_CART: &str = "Your cart is empty";

/// Result of dispatching one user action
#[derive(Debug, Default)]
pub struct Dispatched {
  /// Message to show the user, if any
  pub message: Option<String>,
  /// Page loaded as part of the action
  pub page: Option<Routed>,
}

/// Everything the engine needs, wired once per process
pub struct App<T, P = LogPresenter, V = ListedViews>
where
  T: Transport + Clone + 'static,
  P: Presenter,
  V: ClientViews,
{
  config: Config,
  transport: T,
  /// Opened once; every component shares this handle
  db: Arc<Database>,
  cache: CacheLayer<SqliteStorage>,
  router: RequestRouter<SqliteStorage, T>,
  sync: Arc<SyncCoordinator<T>>,
  submitter: Submitter<T>,
  catalog: Catalog<T>,
  notifier: NotificationDispatcher<P, V>,
  connectivity: Connectivity,
  /// Drains and cache updates in flight, off the event path
  background: JoinSet<()>,
}

impl App<Arc<HttpTransport>> {
  /// Open the stores under the configured data dir and connect to the server.
  /// Background-sync requests are fed back into `events`.
  pub fn new(config: Config, events: &EventHandler, views: Vec<String>) -> Result<Self> {
    let data_dir = config.data_dir()?;
    info!(data_dir = %data_dir.display(), server = %config.server.base_url, "starting");

    let db = Arc::new(Database::open(&data_dir)?);
    let storage = SqliteStorage::open(&data_dir)?;
    let transport = Arc::new(HttpTransport::new(
      &config.server.base_url,
      Duration::from_secs(config.server.timeout_secs),
    )?);

    Self::with_parts(
      config,
      db,
      storage,
      transport,
      LogPresenter,
      ListedViews::new(views),
      Some(Arc::new(events.sender())),
    )
  }
}

impl<T, P, V> App<T, P, V>
where
  T: Transport + Clone + 'static,
  P: Presenter,
  V: ClientViews,
{
  pub fn with_parts(
    config: Config,
    db: Arc<Database>,
    storage: SqliteStorage,
    transport: T,
    presenter: P,
    views: V,
    scheduler: Option<Arc<dyn SyncScheduler>>,
  ) -> Result<Self> {
    let api_prefix = config.server.api_prefix.clone();
    let cache = CacheLayer::new(storage, config.cache.generation.clone());
    let outbox = Outbox::new(Arc::clone(&db));

    let router = RequestRouter::new(cache.clone(), transport.clone(), config.route_rules()?);
    let sync = Arc::new(SyncCoordinator::new(
      outbox.clone(),
      transport.clone(),
      api_prefix.clone(),
    ));
    let mut submitter = Submitter::new(outbox, transport.clone(), api_prefix.clone());
    if let Some(scheduler) = scheduler {
      submitter = submitter.with_scheduler(scheduler);
    }
    let catalog = Catalog::new(Arc::clone(&db), transport.clone(), api_prefix);

    Ok(Self {
      config,
      transport,
      db,
      cache,
      router,
      sync,
      submitter,
      catalog,
      notifier: NotificationDispatcher::new(presenter, views),
      connectivity: Connectivity::Unknown,
      background: JoinSet::new(),
    })
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn db(&self) -> &Arc<Database> {
    &self.db
  }

  pub fn router(&self) -> &RequestRouter<SqliteStorage, T> {
    &self.router
  }

  pub fn sync(&self) -> &SyncCoordinator<T> {
    &self.sync
  }

  pub fn submitter(&self) -> &Submitter<T> {
    &self.submitter
  }

  pub fn catalog(&self) -> &Catalog<T> {
    &self.catalog
  }

  pub fn notifier(&self) -> &NotificationDispatcher<P, V> {
    &self.notifier
  }

  pub fn transport(&self) -> &T {
    &self.transport
  }

  /// Install the configured cache generation and drop older ones. A failed
  /// install keeps whatever generation was serving before.
  pub async fn update_cache(&self) -> Result<InstallOutcome, CacheError> {
    let outcome = self
      .cache
      .upgrade(&self.transport, &self.config.cache.manifest)
      .await?;
    debug!(?outcome, generation = %self.cache.generation(), "cache up to date");
    Ok(outcome)
  }

  fn spawn_cache_update(&mut self) {
    let cache = self.cache.clone();
    let transport = self.transport.clone();
    let manifest = self.config.cache.manifest.clone();
    self.background.spawn(async move {
      match cache.upgrade(&transport, &manifest).await {
        Ok(outcome) => debug!(?outcome, generation = %cache.generation(), "cache up to date"),
        Err(e) => warn!(error = %e, "cache install failed, keeping previous generation"),
      }
    });
  }

  fn spawn_drain(&mut self, trigger: SyncTrigger) {
    let sync = Arc::clone(&self.sync);
    self.background.spawn(async move {
      sync.on_trigger(trigger).await;
    });
  }

  fn reap_background(&mut self) {
    while let Some(result) = self.background.try_join_next() {
      if let Err(e) = result {
        error!(error = %e, "background task failed");
      }
    }
  }

  /// Wait for every drain and cache update started so far.
  pub async fn settle(&mut self) {
    while let Some(result) = self.background.join_next().await {
      if let Err(e) = result {
        error!(error = %e, "background task failed");
      }
    }
  }

  pub async fn subscribe(
    &self,
    descriptor: &serde_json::Value,
  ) -> Result<serde_json::Value, SubscriptionError> {
    register_subscription(&self.transport, &self.config.server.api_prefix, descriptor).await
  }

  /// Handle one event. Returns false when the loop should stop.
  ///
  /// Drains and cache updates run as background tasks; pushes and clicks are
  /// handled before this returns.
  pub async fn handle_event(&mut self, event: Event) -> bool {
    self.reap_background();
    match event {
      Event::Online => {
        info!("back online, syncing pending data");
        self.connectivity = Connectivity::Online;
        self.spawn_drain(SyncTrigger::Online);
      }
      Event::Offline => {
        info!("connection lost, writes will be queued");
        self.connectivity = Connectivity::Offline;
      }
      Event::SyncRequested(kind) => {
        if self.connectivity == Connectivity::Offline {
          // The next Online event drains every kind.
          debug!(%kind, "offline, deferring background sync");
        } else {
          self.spawn_drain(SyncTrigger::BackgroundSync(kind));
        }
      }
      Event::Tick => {
        self.spawn_drain(SyncTrigger::Periodic);
        self.spawn_cache_update();
      }
      Event::Push(raw) => {
        if let Err(e) = self.notifier.on_push(raw.as_deref()).await {
          error!(error = %e, "failed to show notification");
        }
      }
      Event::NotificationClick(notification) => {
        if let Err(e) = self.notifier.route_click(&notification).await {
          error!(error = %e, url = %notification.url, "failed to route notification click");
        }
      }
      Event::Shutdown => return false,
    }
    true
  }

  /// Main loop
  pub async fn run(&mut self, events: &mut EventHandler) {
    self.spawn_cache_update();

    while let Some(event) = events.next().await {
      if !self.handle_event(event).await {
        break;
      }
    }
    // In-flight work is dropped; the outbox still holds anything unsent.
    info!(in_flight = self.background.len(), "event loop stopped");
  }

  /// Dispatch a classified user action.
  pub async fn dispatch(&self, action: &Action) -> Dispatched {
    match action {
      Action::Checkout => Dispatched {
        message: Some(self.checkout().await),
        page: None,
      },
      Action::AddToCart { product_id } => {
        match self.catalog.add_to_cart(product_id) {
          Ok(Some(item)) => info!(product = %product_id, quantity = item.quantity, "added to cart"),
          Ok(None) => warn!(product = %product_id, "product not in local catalog"),
          Err(e) => error!(product = %product_id, error = %e, "failed to update cart"),
        }
        Dispatched {
          message: self.record_activity(action).await,
          page: None,
        }
      }
      Action::ViewProduct { .. } | Action::ToggleWishlist { .. } => {
        let message = self.record_activity(action).await;
        let page = match action.navigation() {
          Some(path) => Some(self.router.handle(&Request::navigate(path)).await),
          None => None,
        };
        Dispatched { message, page }
      }
    }
  }

  /// Submit the cart as an order. The cart is cleared only once the server
  /// has confirmed it.
  async fn checkout(&self) -> String {
    let items = match self.catalog.cart_items() {
      Ok(items) => items,
      Err(e) => {
        error!(error = %e, "failed to read cart");
        return "Could not process your order. Please try again later.".to_string();
      }
    };
    if items.is_empty() {
      return EMPTY_CART.to_string();
    }

    let order = json!({
      "items": items,
      "timestamp": Utc::now().to_rfc3339(),
      "status": "pending",
    });

    match self.submitter.submit(RecordKind::Order, &order).await {
      Ok(outcome) => {
        if let SubmitOutcome::Delivered { .. } = outcome {
          if let Err(e) = self.catalog.clear_cart() {
            error!(error = %e, "failed to clear cart after checkout");
          }
        }
        outcome
          .user_message(RecordKind::Order)
          .unwrap_or_else(|| "Order submitted.".to_string())
      }
      Err(e) => {
        error!(error = %e, "order lost");
        e.user_message().to_string()
      }
    }
  }

  /// Activity writes are fire-and-forget for the user unless even queuing
  /// failed.
  async fn record_activity(&self, action: &Action) -> Option<String> {
    let activity = action.activity()?;
    match self.submitter.submit(RecordKind::Activity, &activity).await {
      Ok(_) => None,
      Err(e) => {
        error!(error = %e, "activity lost");
        Some(e.user_message().to_string())
      }
    }
  }
}
