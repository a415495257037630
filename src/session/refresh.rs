//! Single-flight token refresh with a FIFO queue of waiting callers.
//!
//! Every caller that observes a 401 enqueues itself as a [`PendingCall`] and, in the same
//! critical section, either joins the refresh cycle already in flight or installs a new
//! one (`Idle -> Refreshing`), so two callers can never both start a cycle. The cycle is a
//! shared future owned by the coordinator: every claimant awaits it, and it keeps running
//! as long as any of them is still polling. A caller that gives up (its own timeout, a
//! dropped task) only loses its own settlement. A cycle whose claimants all went away
//! resumes when the next 401 joins it.
//!
//! Settling swaps the queue for an empty one and returns to `Idle` atomically, then hands
//! each parked caller either a [`ReplayTicket`] (new access token, retry mark set) or the
//! batch's failure reason. A failed batch clears the store and fires exactly one
//! session-expiry notification.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::mem;
// crates.io
use futures::{
	channel::oneshot,
	future::{BoxFuture, FutureExt, Shared},
};
// self
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
	error::AuthExpiredReason,
	http::{ApiRequest, ApiResponse, HttpTransport},
	notify::SessionExpired,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::SessionClient,
	store::TokenStore,
};

/// Phase of the refresh state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CoordinatorState {
	/// No refresh call is in flight.
	#[default]
	Idle,
	/// A refresh cycle is in flight; new 401s join it.
	Refreshing,
}

/// Request released by a successful refresh, ready to be replayed exactly once.
#[derive(Debug)]
pub struct ReplayTicket {
	/// Original request with its retry mark set.
	pub request: ApiRequest,
	/// Access token issued by the refresh that released the request.
	pub access_token: TokenSecret,
}

type Settlement = Result<ReplayTicket, AuthExpiredReason>;
type RefreshCycle = Shared<BoxFuture<'static, ()>>;

/// Caller parked until the in-flight cycle settles.
struct PendingCall {
	request: ApiRequest,
	continuation: oneshot::Sender<Settlement>,
}

#[derive(Default)]
struct CoordinatorInner {
	in_flight: Option<RefreshCycle>,
	queue: Vec<PendingCall>,
}

/// Per-client single-flight refresh state: the in-flight cycle plus the pending queue.
#[derive(Default)]
pub struct RefreshCoordinator {
	inner: Mutex<CoordinatorInner>,
}
impl RefreshCoordinator {
	/// Current phase.
	pub fn state(&self) -> CoordinatorState {
		match self.inner.lock().in_flight {
			Some(_) => CoordinatorState::Refreshing,
			None => CoordinatorState::Idle,
		}
	}

	/// Number of callers waiting on the in-flight refresh.
	pub fn queued(&self) -> usize {
		self.inner.lock().queue.len()
	}

	/// Queues `request` behind the in-flight cycle, installing the one built by `start` when
	/// the coordinator is idle. `start` runs inside the critical section and must not poll.
	pub(crate) fn enqueue<F>(&self, request: &ApiRequest, start: F) -> Claim
	where
		F: FnOnce() -> BoxFuture<'static, ()>,
	{
		let (continuation, settlement) = oneshot::channel();
		let mut inner = self.inner.lock();

		inner.queue.push(PendingCall { request: request.clone(), continuation });

		match &inner.in_flight {
			Some(cycle) => Claim { cycle: cycle.clone(), settlement, started: false },
			None => {
				let cycle = start().shared();

				inner.in_flight = Some(cycle.clone());

				Claim { cycle, settlement, started: true }
			},
		}
	}

	/// Ends the cycle and hands every queued caller its settlement in arrival order.
	fn settle(&self, outcome: &Result<TokenSecret, AuthExpiredReason>) -> usize {
		let drained = {
			let mut inner = self.inner.lock();

			inner.in_flight = None;

			mem::take(&mut inner.queue)
		};
		let released = drained.len();

		for pending in drained {
			let settlement = match outcome {
				Ok(access_token) => Ok(ReplayTicket {
					request: pending.request.mark_retried(),
					access_token: access_token.clone(),
				}),
				Err(reason) => Err(reason.clone()),
			};

			// A receiver dropped by its caller has nothing left to replay.
			let _ = pending.continuation.send(settlement);
		}

		released
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let inner = self.inner.lock();
		let state = match inner.in_flight {
			Some(_) => CoordinatorState::Refreshing,
			None => CoordinatorState::Idle,
		};

		f.debug_struct("RefreshCoordinator")
			.field("state", &state)
			.field("queued", &inner.queue.len())
			.finish()
	}
}

/// Handle returned by [`RefreshCoordinator::enqueue`].
pub(crate) struct Claim {
	cycle: RefreshCycle,
	settlement: oneshot::Receiver<Settlement>,
	started: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
	refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
	token: String,
	refresh_token: String,
}

impl<T> SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Recovers a request that was answered with HTTP 401.
	///
	/// Exactly one refresh call is made per cycle no matter how many callers arrive while
	/// it is in flight; every caller then replays its own request once with the new access
	/// token, or fails with the cycle's [`AuthExpiredReason`].
	pub async fn handle_unauthorized(&self, request: ApiRequest) -> Result<ApiResponse> {
		if request.is_retried() {
			return Err(Error::AuthExpired(AuthExpiredReason::AlreadyRetried));
		}

		let span = FlowSpan::new(FlowKind::Refresh, "handle_unauthorized");
		let Claim { cycle, settlement, started } =
			self.coordinator.enqueue(&request, || self.refresh_cycle());

		if !started {
			self.refresh_metrics.record_queued();

			#[cfg(feature = "tracing")]
			tracing::debug!(path = %request.path, "refresh in flight; request queued");
		}

		span.instrument(cycle).await;

		// The cycle settles every queued caller before it completes.
		let ticket = settlement
			.await
			.unwrap_or_else(|_| {
				Err(AuthExpiredReason::RefreshFailed {
					status: None,
					message: "refresh cycle ended without settling the request".into(),
				})
			})
			.map_err(Error::AuthExpired)?;

		self.replay(ticket).await
	}

	fn refresh_cycle(&self) -> BoxFuture<'static, ()> {
		let client = self.clone();
		let span = FlowSpan::new(FlowKind::Refresh, "refresh_cycle");

		span.instrument(async move { client.run_refresh().await }).boxed()
	}

	async fn run_refresh(&self) {
		const KIND: FlowKind = FlowKind::Refresh;

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let outcome = self.rotate_tokens().await;

		let cleared = match &outcome {
			Ok(_) => Ok(()),
			Err(_) => self.store.clear().await,
		};

		if let Err(e) = cleared {
			#[cfg(feature = "tracing")]
			tracing::error!(error = %e, "failed to clear token store after refresh failure");
			#[cfg(not(feature = "tracing"))]
			let _ = e;
		}

		let released = self.coordinator.settle(&outcome);

		obs::record_refresh_batch(released);

		match outcome {
			Ok(_) => {
				#[cfg(feature = "tracing")]
				tracing::info!(released, "token refresh succeeded");

				obs::record_flow_outcome(KIND, FlowOutcome::Success);
				self.refresh_metrics.record_success();
			},
			Err(reason) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(%reason, released, "token refresh failed");

				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				self.refresh_metrics.record_failure();
				self.notifier.notify(SessionExpired::new(reason));
			},
		}
	}

	async fn rotate_tokens(&self) -> Result<TokenSecret, AuthExpiredReason> {
		let refresh_token = match <dyn TokenStore>::refresh_token(self.store.as_ref()).await {
			Ok(Some(secret)) => secret,
			Ok(None) => return Err(AuthExpiredReason::MissingRefreshToken),
			Err(e) => {
				return Err(AuthExpiredReason::RefreshFailed { status: None, message: e.to_string() });
			},
		};

		self.refresh_metrics.record_attempt();

		let pair = self.request_new_pair(&refresh_token).await?;

		self.store.set(pair.clone()).await.map_err(|e| AuthExpiredReason::RefreshFailed {
			status: None,
			message: format!("rotated tokens could not be stored: {e}"),
		})?;

		Ok(pair.access_token)
	}

	async fn request_new_pair(
		&self,
		refresh_token: &TokenSecret,
	) -> Result<TokenPair, AuthExpiredReason> {
		let path = self.config.refresh_path.as_str();
		let failed = |status: Option<u16>, message: String| AuthExpiredReason::RefreshFailed {
			status,
			message,
		};
		let url = self.config.endpoint(path).map_err(|e| failed(None, e.to_string()))?;
		let request = ApiRequest::post(path)
			.json(&RefreshRequest { refresh_token: refresh_token.expose() })
			.map_err(|e| failed(None, e.to_string()))?;
		let response =
			self.transport.execute(url, request).await.map_err(|e| failed(None, e.to_string()))?;
		let status = Some(response.status.as_u16());

		if !response.is_success() {
			return Err(failed(status, format!("refresh endpoint returned HTTP {}", response.status)));
		}

		let body: RefreshResponse = response.json(path).map_err(|e| failed(status, e.to_string()))?;

		if body.token.is_empty() || body.refresh_token.is_empty() {
			return Err(failed(status, "refresh endpoint returned an empty token".into()));
		}

		Ok(TokenPair::new(body.token, body.refresh_token))
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use futures::future;
	// self
	use super::*;

	fn request(path: &str) -> ApiRequest {
		ApiRequest::get(path)
	}

	fn idle_cycle() -> BoxFuture<'static, ()> {
		future::ready(()).boxed()
	}

	#[test]
	fn first_claim_starts_a_cycle_and_later_claims_join_it() {
		let coordinator = RefreshCoordinator::default();
		let first = coordinator.enqueue(&request("/users"), idle_cycle);

		assert!(first.started);
		assert_eq!(coordinator.state(), CoordinatorState::Refreshing);

		let second = coordinator
			.enqueue(&request("/courses"), || panic!("A cycle is already in flight."));

		assert!(!second.started);
		assert_eq!(coordinator.queued(), 2);
	}

	#[test]
	fn success_releases_queue_in_fifo_order_with_retry_mark() {
		let coordinator = RefreshCoordinator::default();
		let receivers: Vec<_> = ["/users", "/courses", "/exams", "/events"]
			.into_iter()
			.map(|path| coordinator.enqueue(&request(path), idle_cycle).settlement)
			.collect();

		assert_eq!(coordinator.settle(&Ok(TokenSecret::new("token2"))), 4);
		assert_eq!(coordinator.state(), CoordinatorState::Idle);
		assert_eq!(coordinator.queued(), 0);

		let paths: Vec<_> = receivers
			.into_iter()
			.map(|mut receiver| {
				let ticket = receiver
					.try_recv()
					.expect("Sender should not be cancelled.")
					.expect("Settlement should be delivered.")
					.expect("Successful refresh should release a ticket.");

				assert!(ticket.request.is_retried());
				assert_eq!(ticket.access_token.expose(), "token2");

				ticket.request.path
			})
			.collect();

		assert_eq!(paths, ["/users", "/courses", "/exams", "/events"]);
	}

	#[test]
	fn failure_rejects_every_queued_caller_with_the_same_reason() {
		let coordinator = RefreshCoordinator::default();
		let mut receivers: Vec<_> = ["/users", "/courses"]
			.into_iter()
			.map(|path| coordinator.enqueue(&request(path), idle_cycle).settlement)
			.collect();
		let reason = AuthExpiredReason::RefreshFailed { status: Some(500), message: "boom".into() };

		assert_eq!(coordinator.settle(&Err(reason.clone())), 2);

		for receiver in &mut receivers {
			let settlement = receiver
				.try_recv()
				.expect("Sender should not be cancelled.")
				.expect("Settlement should be delivered.");

			assert_eq!(settlement.expect_err("Failed refresh must reject the batch."), reason);
		}
	}

	#[test]
	fn next_cycle_starts_fresh_after_settlement() {
		let coordinator = RefreshCoordinator::default();

		coordinator.enqueue(&request("/users"), idle_cycle);
		coordinator.settle(&Ok(TokenSecret::new("token2")));

		assert!(coordinator.enqueue(&request("/late"), idle_cycle).started);
		assert_eq!(coordinator.queued(), 1);
	}

	#[test]
	fn dropped_claim_leaves_the_cycle_for_the_others() {
		let coordinator = RefreshCoordinator::default();
		let first = coordinator.enqueue(&request("/users"), idle_cycle);
		let mut second = coordinator.enqueue(&request("/courses"), idle_cycle);

		drop(first);

		assert_eq!(coordinator.state(), CoordinatorState::Refreshing);
		assert_eq!(coordinator.settle(&Ok(TokenSecret::new("token2"))), 2);

		let ticket = second
			.settlement
			.try_recv()
			.expect("Sender should not be cancelled.")
			.expect("Settlement should be delivered.")
			.expect("Remaining caller should still be released.");

		assert_eq!(ticket.request.path, "/courses");
	}
}
