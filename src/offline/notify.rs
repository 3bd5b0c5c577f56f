//! Push-style notification delivery and interaction routing.
//!
//! Payloads arrive as JSON from the application, keyed by a tag. Delivering
//! under an already-active tag replaces the visible notification instead of
//! stacking a second one. Interactions consume the active entry: a click
//! with a target URL is routed to the client, a dismissal is dropped.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// A button attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub label: String,
    pub id: String,
}

/// Wire form of a notification, as produced by the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
}

/// How the user responded to a delivered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Clicked { action_id: Option<String> },
    Dismissed,
}

/// Shows a notification to the user. The default implementation only logs;
/// a real client installs its own presenter.
pub trait NotificationPresenter: Send + Sync {
    fn present(&self, tag: &str, payload: &NotificationPayload);
}

/// Opens a URL in the client when a notification click carries a target.
pub trait ClientRouter: Send + Sync {
    fn open(&self, url: &str);
}

/// Log-only presenter used until a client hooks in.
#[derive(Debug, Default)]
pub struct LoggingPresenter;

impl NotificationPresenter for LoggingPresenter {
    fn present(&self, tag: &str, payload: &NotificationPayload) {
        info!(
            target = "scorta::notify",
            tag,
            title = %payload.title,
            "Presenting notification"
        );
    }
}

/// Log-only router counterpart to [`LoggingPresenter`].
#[derive(Debug, Default)]
pub struct LoggingRouter;

impl ClientRouter for LoggingRouter {
    fn open(&self, url: &str) {
        info!(target = "scorta::notify", url, "Opening notification target");
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to parse notification payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("no active notification for tag '{tag}'")]
    UnknownTag { tag: String },
}

/// Tracks active notifications by tag and routes interactions on them.
pub struct NotificationCenter {
    presenter: Box<dyn NotificationPresenter>,
    router: Box<dyn ClientRouter>,
    active: DashMap<String, NotificationPayload>,
}

impl NotificationCenter {
    pub fn new(presenter: Box<dyn NotificationPresenter>, router: Box<dyn ClientRouter>) -> Self {
        Self {
            presenter,
            router,
            active: DashMap::new(),
        }
    }

    /// Present a payload under the given tag, replacing any notification
    /// already active under it.
    pub fn deliver(&self, tag: &str, payload: NotificationPayload) {
        if self.active.insert(tag.to_string(), payload.clone()).is_some() {
            debug!(target = "scorta::notify", tag, "Replacing active notification");
        }
        self.presenter.present(tag, &payload);
    }

    /// Parse a JSON payload and deliver it.
    pub fn deliver_json(&self, tag: &str, raw: &[u8]) -> Result<(), NotifyError> {
        let payload: NotificationPayload = serde_json::from_slice(raw)?;
        self.deliver(tag, payload);
        Ok(())
    }

    /// Consume the active notification for a tag and act on the interaction.
    /// A click routes to the payload's target URL when one is set; clicks
    /// without a target and dismissals are dropped.
    pub fn interact(&self, tag: &str, interaction: Interaction) -> Result<(), NotifyError> {
        let Some((_, payload)) = self.active.remove(tag) else {
            return Err(NotifyError::UnknownTag {
                tag: tag.to_string(),
            });
        };

        match interaction {
            Interaction::Clicked { action_id } => {
                if let Some(url) = payload.target_url.as_deref() {
                    info!(
                        target = "scorta::notify",
                        tag,
                        action_id = action_id.as_deref(),
                        url,
                        "Notification clicked"
                    );
                    self.router.open(url);
                } else {
                    debug!(target = "scorta::notify", tag, "Notification click had no target");
                }
            }
            Interaction::Dismissed => {
                debug!(target = "scorta::notify", tag, "Notification dismissed");
            }
        }
        Ok(())
    }

    pub fn active_tags(&self) -> Vec<String> {
        self.active.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(Box::new(LoggingPresenter), Box::new(LoggingRouter))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingPresenter {
        shown: Mutex<Vec<(String, String)>>,
    }

    impl NotificationPresenter for RecordingPresenter {
        fn present(&self, tag: &str, payload: &NotificationPayload) {
            self.shown
                .lock()
                .expect("shown lock")
                .push((tag.to_string(), payload.title.clone()));
        }
    }

    #[derive(Default)]
    struct RecordingRouter {
        opened: Mutex<Vec<String>>,
    }

    impl ClientRouter for RecordingRouter {
        fn open(&self, url: &str) {
            self.opened.lock().expect("opened lock").push(url.to_string());
        }
    }

    fn payload(title: &str, target_url: Option<&str>) -> NotificationPayload {
        NotificationPayload {
            title: title.to_string(),
            body: "body".to_string(),
            target_url: target_url.map(str::to_string),
            actions: Vec::new(),
        }
    }

    fn center_with_recorders() -> (
        NotificationCenter,
        std::sync::Arc<RecordingPresenter>,
        std::sync::Arc<RecordingRouter>,
    ) {
        struct SharedPresenter(std::sync::Arc<RecordingPresenter>);
        impl NotificationPresenter for SharedPresenter {
            fn present(&self, tag: &str, payload: &NotificationPayload) {
                self.0.present(tag, payload);
            }
        }
        struct SharedRouter(std::sync::Arc<RecordingRouter>);
        impl ClientRouter for SharedRouter {
            fn open(&self, url: &str) {
                self.0.open(url);
            }
        }

        let presenter = std::sync::Arc::new(RecordingPresenter::default());
        let router = std::sync::Arc::new(RecordingRouter::default());
        let center = NotificationCenter::new(
            Box::new(SharedPresenter(std::sync::Arc::clone(&presenter))),
            Box::new(SharedRouter(std::sync::Arc::clone(&router))),
        );
        (center, presenter, router)
    }

    #[test]
    fn delivering_under_an_active_tag_replaces_it() {
        let (center, presenter, _) = center_with_recorders();

        center.deliver("order-42", payload("Order placed", None));
        center.deliver("order-42", payload("Order shipped", None));

        assert_eq!(center.active_count(), 1);
        let shown = presenter.shown.lock().expect("shown lock").clone();
        assert_eq!(
            shown,
            vec![
                ("order-42".to_string(), "Order placed".to_string()),
                ("order-42".to_string(), "Order shipped".to_string()),
            ]
        );
    }

    #[test]
    fn clicking_routes_to_the_target_url() {
        let (center, _, router) = center_with_recorders();
        center.deliver("order-42", payload("Order shipped", Some("/orders/42")));

        center
            .interact("order-42", Interaction::Clicked { action_id: None })
            .expect("interaction should resolve");

        assert_eq!(
            router.opened.lock().expect("opened lock").clone(),
            vec!["/orders/42".to_string()]
        );
        assert_eq!(center.active_count(), 0);
    }

    #[test]
    fn dismissal_never_routes() {
        let (center, _, router) = center_with_recorders();
        center.deliver("order-42", payload("Order shipped", Some("/orders/42")));

        center
            .interact("order-42", Interaction::Dismissed)
            .expect("interaction should resolve");

        assert!(router.opened.lock().expect("opened lock").is_empty());
        assert_eq!(center.active_count(), 0);
    }

    #[test]
    fn a_targetless_click_consumes_without_routing() {
        let (center, _, router) = center_with_recorders();
        center.deliver("promo", payload("Sale starts now", None));

        center
            .interact("promo", Interaction::Clicked { action_id: None })
            .expect("interaction should resolve");

        assert!(router.opened.lock().expect("opened lock").is_empty());
        assert_eq!(center.active_count(), 0);
    }

    #[test]
    fn interacting_with_an_unknown_tag_errors() {
        let center = NotificationCenter::default();

        let result = center.interact("missing", Interaction::Dismissed);

        assert!(matches!(
            result,
            Err(NotifyError::UnknownTag { tag }) if tag == "missing"
        ));
    }

    #[test]
    fn payloads_parse_from_camel_case_json() {
        let raw = br#"{
            "title": "Order shipped",
            "body": "Your order is on the way",
            "targetUrl": "/orders/42",
            "actions": [{"label": "Track", "id": "track"}]
        }"#;

        let payload: NotificationPayload =
            serde_json::from_slice(raw).expect("payload should parse");
        assert_eq!(payload.target_url.as_deref(), Some("/orders/42"));
        assert_eq!(payload.actions[0].id, "track");

        let serialized = serde_json::to_string(&payload).expect("payload should serialize");
        assert!(serialized.contains("\"targetUrl\""));
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let raw = br#"{"title": "Hi", "body": "there"}"#;

        let payload: NotificationPayload =
            serde_json::from_slice(raw).expect("payload should parse");
        assert!(payload.target_url.is_none());
        assert!(payload.actions.is_empty());

        let serialized = serde_json::to_string(&payload).expect("payload should serialize");
        assert!(!serialized.contains("targetUrl"));
    }

    #[test]
    fn malformed_payloads_error() {
        let center = NotificationCenter::default();

        let result = center.deliver_json("order-42", b"{\"title\": 17}");

        assert!(matches!(result, Err(NotifyError::Payload(_))));
        assert_eq!(center.active_count(), 0);
    }
}
