//! Scripted fakes shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::net::{NetworkError, Request, Response, Transport};
use crate::notify::{ClientView, ClientViews, Notification, PresentError, Presenter};
use crate::outbox::RecordKind;
use crate::sync::SyncScheduler;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
  Respond(Response),
  Fail,
}

#[derive(Default)]
struct Script {
  /// One-shot replies consumed in order before `sticky`
  queued: HashMap<String, VecDeque<Reply>>,
  sticky: HashMap<String, Reply>,
  offline: bool,
  /// Time a request to the path takes before its reply arrives
  delays: HashMap<String, Duration>,
  calls: Vec<Request>,
}

/// Transport that answers from a per-path script and records every call.
/// Paths without a script fail as unreachable.
#[derive(Default)]
pub struct FakeTransport {
  script: Mutex<Script>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Answer every request for `path` with `response`.
  pub fn respond(&self, path: &str, response: Response) {
    self.lock().sticky.insert(path.to_string(), Reply::Respond(response));
  }

  /// Make every request for `path` fail as unreachable.
  pub fn fail(&self, path: &str) {
    self.lock().sticky.insert(path.to_string(), Reply::Fail);
  }

  /// Answer the next request for `path` with `reply`, then fall back.
  pub fn queue(&self, path: &str, reply: Reply) {
    self
      .lock()
      .queued
      .entry(path.to_string())
      .or_default()
      .push_back(reply);
  }

  /// Make every request for `path` take `delay` before replying.
  pub fn delay(&self, path: &str, delay: Duration) {
    self.lock().delays.insert(path.to_string(), delay);
  }

  /// While offline every request fails regardless of script.
  pub fn set_offline(&self, offline: bool) {
    self.lock().offline = offline;
  }

  pub fn calls(&self) -> Vec<Request> {
    self.lock().calls.clone()
  }

  /// Bodies of every call made to `path`, parsed as JSON.
  pub fn posted(&self, path: &str) -> Vec<serde_json::Value> {
    self
      .calls()
      .into_iter()
      .filter(|r| r.url == path)
      .filter_map(|r| r.body)
      .filter_map(|b| serde_json::from_slice(&b).ok())
      .collect()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
    self.script.lock().unwrap()
  }
}

impl Transport for FakeTransport {
  async fn send(&self, request: &Request) -> Result<Response, NetworkError> {
    let (reply, delay) = {
      let mut script = self.lock();
      script.calls.push(request.clone());

      if script.offline {
        return Err(NetworkError::Unreachable("offline".to_string()));
      }

      let queued = script
        .queued
        .get_mut(&request.url)
        .and_then(|q| q.pop_front());
      let reply = queued.or_else(|| script.sticky.get(&request.url).cloned());
      (reply, script.delays.get(&request.url).copied())
    };

    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    match reply {
      Some(Reply::Respond(response)) => Ok(response),
      Some(Reply::Fail) | None => Err(NetworkError::Unreachable(request.url.clone())),
    }
  }
}

/// Presenter that records what it showed.
#[derive(Default)]
pub struct RecordingPresenter {
  pub shown: Mutex<Vec<Notification>>,
  pub fail: bool,
}

impl Presenter for RecordingPresenter {
  async fn present(&self, notification: &Notification) -> Result<(), PresentError> {
    if self.fail {
      return Err(PresentError("display unavailable".to_string()));
    }
    self.shown.lock().unwrap().push(notification.clone());
    Ok(())
  }
}

/// Client views backed by a list; records focus/open calls.
#[derive(Default)]
pub struct FakeViews {
  pub open: Mutex<Vec<ClientView>>,
  pub focused: Mutex<Vec<String>>,
  pub opened: Mutex<Vec<String>>,
}

impl FakeViews {
  pub fn with_urls(urls: &[&str]) -> Self {
    let views = Self::default();
    {
      let mut open = views.open.lock().unwrap();
      for (i, url) in urls.iter().enumerate() {
        open.push(ClientView {
          id: format!("view-{}", i),
          url: url.to_string(),
        });
      }
    }
    views
  }
}

impl ClientViews for FakeViews {
  async fn list(&self) -> Vec<ClientView> {
    self.open.lock().unwrap().clone()
  }

  async fn focus(&self, view: &ClientView) -> Result<(), PresentError> {
    self.focused.lock().unwrap().push(view.id.clone());
    Ok(())
  }

  async fn open(&self, url: &str) -> Result<(), PresentError> {
    self.opened.lock().unwrap().push(url.to_string());
    Ok(())
  }
}

/// Scheduler that records which kinds asked for a background sync.
#[derive(Default)]
pub struct RecordingScheduler {
  requested: Mutex<Vec<RecordKind>>,
}

impl RecordingScheduler {
  pub fn requested(&self) -> Vec<RecordKind> {
    self.requested.lock().unwrap().clone()
  }
}

impl SyncScheduler for RecordingScheduler {
  fn request_sync(&self, kind: RecordKind) {
    self.requested.lock().unwrap().push(kind);
  }
}
