//! Presenting notifications and routing clicks to client views.

use std::future::Future;
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

use super::payload::{Notification, PushNotification};

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct PresentError(pub String);

/// Shows a notification to the user. The returned future must not resolve
/// until the notification is actually shown: the host may stop the process
/// as soon as the push is considered handled.
pub trait Presenter: Send + Sync {
  fn present(
    &self,
    notification: &Notification,
  ) -> impl Future<Output = Result<(), PresentError>> + Send;
}

/// An open client view (window/tab) and its current address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientView {
  pub id: String,
  pub url: String,
}

/// Host access to open client views.
pub trait ClientViews: Send + Sync {
  fn list(&self) -> impl Future<Output = Vec<ClientView>> + Send;
  fn focus(&self, view: &ClientView) -> impl Future<Output = Result<(), PresentError>> + Send;
  fn open(&self, url: &str) -> impl Future<Output = Result<(), PresentError>> + Send;
}

/// Exactly one of these happens per click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  Focused(String),
  Opened(String),
}

pub struct NotificationDispatcher<P: Presenter, V: ClientViews> {
  presenter: P,
  views: V,
}

impl<P: Presenter, V: ClientViews> NotificationDispatcher<P, V> {
  pub fn new(presenter: P, views: V) -> Self {
    Self { presenter, views }
  }

  pub fn presenter(&self) -> &P {
    &self.presenter
  }

  pub fn views(&self) -> &V {
    &self.views
  }

  /// Decode a push and present it. Resolves only after presentation.
  pub async fn on_push(&self, raw: Option<&[u8]>) -> Result<Notification, PresentError> {
    let push = PushNotification::decode(raw);
    let notification = push.to_notification();
    info!(tag = %notification.tag, url = %notification.url, "push notification received");

    self.presenter.present(&notification).await?;
    Ok(notification)
  }

  /// Focus a view already at the notification's target, else open one.
  pub async fn route_click(&self, notification: &Notification) -> Result<ClickOutcome, PresentError> {
    let target = notification.url.as_str();
    let open = self.views.list().await;

    if let Some(view) = open.iter().find(|v| v.url == target) {
      info!(view = %view.id, url = %target, "focusing existing view");
      self.views.focus(view).await?;
      return Ok(ClickOutcome::Focused(view.id.clone()));
    }

    info!(url = %target, "opening new view");
    self.views.open(target).await?;
    Ok(ClickOutcome::Opened(target.to_string()))
  }
}

/// Presenter that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
  async fn present(&self, notification: &Notification) -> Result<(), PresentError> {
    info!(
      title = %notification.title,
      body = %notification.body,
      url = %notification.url,
      "notification shown"
    );
    Ok(())
  }
}

/// Views known up front (e.g. passed on the command line). Opening adds a
/// view so later clicks on the same target focus it.
#[derive(Debug, Default)]
pub struct ListedViews {
  views: Mutex<Vec<ClientView>>,
}

impl ListedViews {
  pub fn new(urls: impl IntoIterator<Item = String>) -> Self {
    let views = urls
      .into_iter()
      .enumerate()
      .map(|(i, url)| ClientView {
        id: format!("view-{}", i + 1),
        url,
      })
      .collect();
    Self {
      views: Mutex::new(views),
    }
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<ClientView>>, PresentError> {
    self
      .views
      .lock()
      .map_err(|_| PresentError("view list lock poisoned".to_string()))
  }
}

impl ClientViews for ListedViews {
  async fn list(&self) -> Vec<ClientView> {
    self.lock().map(|v| v.clone()).unwrap_or_default()
  }

  async fn focus(&self, _view: &ClientView) -> Result<(), PresentError> {
    Ok(())
  }

  async fn open(&self, url: &str) -> Result<(), PresentError> {
    let mut views = self.lock()?;
    let id = format!("view-{}", views.len() + 1);
    views.push(ClientView {
      id,
      url: url.to_string(),
    });
    Ok(())
  }
}
