//! Client services for farmhaul.
//!
//! [`DeliveryClient`] wires the pieces together for one process:
//!
//! - [`SessionStore`] holds the actor and credential.
//! - [`DeliveryManager`] owns job state and runs the status machine.
//! - [`NotificationChannel`] keeps one live connection per session and
//!   reconnects with [`Backoff`].
//! - [`UnreadLedger`] tracks the unread count.
//!
//! The backend is reached through the [`DeliveryApi`] / [`NotificationApi`]
//! traits and the [`Connector`] trait, with [`HttpApi`] and [`WsConnector`]
//! as the production implementations.

mod api;
mod backoff;
mod channel;
mod client;
mod config;
mod dedup;
mod dispatch;
mod http;
mod ledger;
mod lifecycle;
mod session;
mod transport;

#[cfg(test)]
mod test_support;

pub use api::{ApiError, DeliveryApi, NotificationApi};
pub use backoff::Backoff;
pub use channel::NotificationChannel;
pub use client::DeliveryClient;
pub use config::{ClientConfig, ConfigError};
pub use dispatch::{DispatchedEvent, EventFilter, EventSink, SubscriptionId};
pub use http::HttpApi;
pub use ledger::UnreadLedger;
pub use lifecycle::{next_status, DeliveryManager, LifecycleError};
pub use session::{Session, SessionError, SessionStore};
pub use transport::{ChannelError, Connector, FrameStream, WsConnector};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock, ignoring poisoning. State behind these mutexes is always left
/// consistent before any call that could panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
