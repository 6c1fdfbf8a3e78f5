//! Inbound push notifications: decode, present, and route clicks.

mod dispatcher;
mod payload;
mod subscription;

pub use dispatcher::{
  ClickOutcome, ClientView, ClientViews, ListedViews, LogPresenter, NotificationDispatcher,
  PresentError, Presenter,
};
pub use payload::{Notification, PushNotification};
pub use subscription::{register_subscription, SubscriptionError};
