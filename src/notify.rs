//! Session-expiry broadcast decoupling pipeline failures from UI navigation.
//!
//! The pipeline fires one [`SessionExpired`] event per terminal refresh batch; what happens
//! next (redirecting to a login screen, remembering the current path) is up to the
//! subscribers. Handlers run synchronously on the notifying task and must not block.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{_prelude::*, error::AuthExpiredReason};

/// Payload delivered to subscribers when the session can no longer be renewed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionExpired {
	/// Why the session ended.
	pub error: AuthExpiredReason,
	/// Human-readable summary suitable for a toast or log line.
	pub message: String,
}
impl SessionExpired {
	/// Stable event kind shared by every expiry notification; emitted as the `kind` field of
	/// the `session expired` log event.
	pub const KIND: &'static str = "auth_expired";

	/// Builds an event whose message is derived from `error`.
	pub fn new(error: AuthExpiredReason) -> Self {
		let message = format!("Session expired: {error}.");

		Self { error, message }
	}
}

/// Receiver of [`SessionExpired`] events.
pub trait SessionExpiryHandler
where
	Self: Send + Sync,
{
	/// Called once per notification.
	fn on_session_expired(&self, event: &SessionExpired);
}
impl<F> SessionExpiryHandler for F
where
	F: Fn(&SessionExpired) + Send + Sync,
{
	fn on_session_expired(&self, event: &SessionExpired) {
		self(event)
	}
}

/// Handle identifying a subscription; pass it to [`SessionExpiryNotifier::unsubscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Fire-and-forget observer list for session expiry.
#[derive(Clone, Default)]
pub struct SessionExpiryNotifier(Arc<NotifierInner>);
impl SessionExpiryNotifier {
	/// Registers `handler` and returns its subscription handle.
	pub fn subscribe(&self, handler: impl 'static + SessionExpiryHandler) -> SubscriptionId {
		let id = SubscriptionId(self.0.next_id.fetch_add(1, Ordering::Relaxed));

		self.0.handlers.write().push((id, Arc::new(handler)));

		id
	}

	/// Removes a subscription; returns `false` when it was already gone.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let mut handlers = self.0.handlers.write();
		let before = handlers.len();

		handlers.retain(|(existing, _)| *existing != id);

		handlers.len() != before
	}

	/// Delivers `event` to every current subscriber.
	///
	/// Safe to call repeatedly; each call is one notification.
	pub fn notify(&self, event: SessionExpired) {
		let handlers: Vec<_> =
			self.0.handlers.read().iter().map(|(_, handler)| Arc::clone(handler)).collect();

		self.0.notifications.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "tracing")]
		tracing::warn!(
			kind = SessionExpired::KIND,
			reason = %event.error,
			subscribers = handlers.len(),
			"session expired"
		);

		for handler in handlers {
			handler.on_session_expired(&event);
		}
	}

	/// Total notifications fired so far.
	pub fn notifications(&self) -> u64 {
		self.0.notifications.load(Ordering::Relaxed)
	}

	/// Number of live subscriptions.
	pub fn subscriber_count(&self) -> usize {
		self.0.handlers.read().len()
	}
}
impl Debug for SessionExpiryNotifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionExpiryNotifier")
			.field("subscribers", &self.subscriber_count())
			.field("notifications", &self.notifications())
			.finish()
	}
}

#[derive(Default)]
struct NotifierInner {
	handlers: RwLock<Vec<(SubscriptionId, Arc<dyn SessionExpiryHandler>)>>,
	next_id: AtomicU64,
	notifications: AtomicU64,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn notify_reaches_every_subscriber() {
		let notifier = SessionExpiryNotifier::default();
		let seen = Arc::new(Mutex::new(Vec::new()));
		let first = Arc::clone(&seen);
		let second = Arc::clone(&seen);

		notifier.subscribe(move |event: &SessionExpired| first.lock().push(("a", event.clone())));
		notifier.subscribe(move |event: &SessionExpired| second.lock().push(("b", event.clone())));
		notifier.notify(SessionExpired::new(AuthExpiredReason::MissingRefreshToken));

		let seen = seen.lock();

		assert_eq!(seen.len(), 2);
		assert_eq!(seen[0].0, "a");
		assert_eq!(seen[1].1.error, AuthExpiredReason::MissingRefreshToken);
		assert_eq!(seen[1].1.message, "Session expired: no refresh token is available.");
		assert_eq!(notifier.notifications(), 1);
	}

	#[test]
	fn unsubscribed_handlers_stop_receiving() {
		let notifier = SessionExpiryNotifier::default();
		let hits = Arc::new(AtomicU64::new(0));
		let counter = Arc::clone(&hits);
		let id = notifier.subscribe(move |_: &SessionExpired| {
			counter.fetch_add(1, Ordering::Relaxed);
		});

		notifier.notify(SessionExpired::new(AuthExpiredReason::AlreadyRetried));

		assert!(notifier.unsubscribe(id));
		assert!(!notifier.unsubscribe(id));

		notifier.notify(SessionExpired::new(AuthExpiredReason::AlreadyRetried));

		assert_eq!(hits.load(Ordering::Relaxed), 1);
		assert_eq!(notifier.notifications(), 2);
		assert_eq!(notifier.subscriber_count(), 0);
	}

	#[test]
	fn handlers_may_subscribe_while_being_notified() {
		let notifier = SessionExpiryNotifier::default();
		let inner = notifier.clone();

		notifier.subscribe(move |_: &SessionExpired| {
			inner.subscribe(|_: &SessionExpired| {});
		});
		notifier.notify(SessionExpired::new(AuthExpiredReason::AlreadyRetried));

		assert_eq!(notifier.subscriber_count(), 2);
	}
}
