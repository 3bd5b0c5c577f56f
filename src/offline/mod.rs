//! Offline-first support around the proxy core.
//!
//! Two pieces live here. The [`ReplayRegistrar`] records tagged units of
//! deferred work while the client is offline and fires them once on each
//! reconnect. The [`NotificationCenter`] delivers push-style payloads to a
//! presenter and routes clicks back into the client, one active notification
//! per tag.

pub mod notify;
pub mod replay;

pub use notify::{
    ClientRouter, Interaction, NotificationAction, NotificationCenter, NotificationPayload,
    NotificationPresenter, NotifyError,
};
pub use replay::{NoopReplayHandler, ReplayHandler, ReplayRegistrar, ReplayTask};
