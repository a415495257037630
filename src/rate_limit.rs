//! Dual-window token-bucket guard for the login route.
//!
//! Two independent buckets accrue tokens continuously (fractional, time-derived, no fixed
//! ticks). An attempt draws from the minute bucket first and falls back to the hour bucket
//! only when the minute bucket is empty. Both refill independently, so attempts spaced to
//! let the minute bucket recover can exceed the hour bucket's capacity per hour.

// self
use crate::_prelude::*;

// Absorbs rounding from incremental fractional accrual.
const TOKEN_EPSILON: f64 = 1e-9;

/// Capacity and refill window of one bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
	/// Maximum tokens held; also the number of tokens accrued per `per`.
	pub capacity: u32,
	/// Time needed to refill from empty to `capacity`.
	pub per: Duration,
}
impl BucketConfig {
	/// Creates a bucket refilling `capacity` tokens every `per`.
	pub const fn new(capacity: u32, per: Duration) -> Self {
		Self { capacity, per }
	}

	fn accrued(&self, elapsed: Duration) -> f64 {
		let per = self.per.as_seconds_f64();

		if per <= 0.0 {
			return f64::from(self.capacity);
		}

		elapsed.as_seconds_f64() * f64::from(self.capacity) / per
	}

	fn time_for(&self, tokens: f64) -> Duration {
		if self.capacity == 0 {
			return Duration::MAX;
		}

		Duration::seconds_f64(tokens * self.per.as_seconds_f64() / f64::from(self.capacity))
	}
}

/// Limits applied by [`LoginRateLimiter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
	/// Short window, consulted first.
	pub minute: BucketConfig,
	/// Long window, consulted when the short window is empty.
	pub hour: BucketConfig,
}
impl Default for RateLimitConfig {
	fn default() -> Self {
		Self {
			minute: BucketConfig::new(2, Duration::minutes(1)),
			hour: BucketConfig::new(12, Duration::hours(1)),
		}
	}
}

/// Continuously refilling token bucket.
#[derive(Clone, Debug)]
pub struct TokenBucket {
	config: BucketConfig,
	tokens: f64,
	last_refill: OffsetDateTime,
}
impl TokenBucket {
	/// Creates a full bucket observed at `now`.
	pub fn full(config: BucketConfig, now: OffsetDateTime) -> Self {
		Self { config, tokens: f64::from(config.capacity), last_refill: now }
	}

	/// Accrues tokens for the time elapsed since the previous observation.
	///
	/// A clock that moves backwards accrues nothing and keeps the later observation.
	pub fn refill(&mut self, now: OffsetDateTime) {
		let elapsed = now - self.last_refill;

		if elapsed.is_positive() {
			let capacity = f64::from(self.config.capacity);

			self.tokens = (self.tokens + self.config.accrued(elapsed)).min(capacity);
			self.last_refill = now;
		}
	}

	/// Tokens currently held (may be fractional).
	pub fn available(&self) -> f64 {
		self.tokens
	}

	/// Returns `true` when at least one whole token is held.
	pub fn has_token(&self) -> bool {
		self.tokens >= 1.0 - TOKEN_EPSILON
	}

	fn try_take(&mut self) -> bool {
		if self.has_token() {
			self.tokens = (self.tokens - 1.0).max(0.0);

			true
		} else {
			false
		}
	}

	fn time_until_token(&self) -> Duration {
		if self.has_token() { Duration::ZERO } else { self.config.time_for(1.0 - self.tokens) }
	}
}

/// Token levels observed at an instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BucketLevels {
	/// Tokens in the minute bucket.
	pub minute: f64,
	/// Tokens in the hour bucket.
	pub hour: f64,
}

/// Result of [`LoginRateLimiter::acquire_at`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// A token was consumed; the attempt may proceed.
	Allow,
	/// Both buckets are empty; the attempt must be rejected.
	Delay(RetryDirective),
}

/// Advises callers when to retry after a [`RateLimitDecision::Delay`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant when a token accrues in either bucket.
	pub earliest_retry_at: OffsetDateTime,
	/// Duration until `earliest_retry_at`.
	pub recommended_backoff: Duration,
}

#[derive(Debug)]
struct RateLimiterState {
	minute_bucket: TokenBucket,
	hour_bucket: TokenBucket,
}
impl RateLimiterState {
	fn refill(&mut self, now: OffsetDateTime) {
		self.minute_bucket.refill(now);
		self.hour_bucket.refill(now);
	}

	fn time_until_token(&self) -> Duration {
		self.minute_bucket.time_until_token().min(self.hour_bucket.time_until_token())
	}
}

/// Process-wide guard in front of the login endpoint.
#[derive(Debug)]
pub struct LoginRateLimiter {
	state: Mutex<RateLimiterState>,
}
impl LoginRateLimiter {
	/// Creates a limiter with both buckets full as of now.
	pub fn new(config: RateLimitConfig) -> Self {
		Self::starting_at(config, OffsetDateTime::now_utc())
	}

	/// Creates a limiter with both buckets full as of `now`.
	pub fn starting_at(config: RateLimitConfig, now: OffsetDateTime) -> Self {
		Self {
			state: Mutex::new(RateLimiterState {
				minute_bucket: TokenBucket::full(config.minute, now),
				hour_bucket: TokenBucket::full(config.hour, now),
			}),
		}
	}

	/// Returns `true` if either bucket holds a whole token right now.
	pub fn can_attempt(&self) -> bool {
		self.can_attempt_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` if either bucket holds a whole token at `now`.
	pub fn can_attempt_at(&self, now: OffsetDateTime) -> bool {
		let mut state = self.state.lock();

		state.refill(now);

		state.minute_bucket.has_token() || state.hour_bucket.has_token()
	}

	/// Removes one token (minute bucket first, then hour bucket).
	pub fn consume(&self) -> bool {
		self.consume_at(OffsetDateTime::now_utc())
	}

	/// Removes one token at `now`; returns whether a token was removed.
	pub fn consume_at(&self, now: OffsetDateTime) -> bool {
		let mut state = self.state.lock();

		state.refill(now);

		state.minute_bucket.try_take() || state.hour_bucket.try_take()
	}

	/// Time until either bucket holds a whole token; zero when an attempt is allowed now.
	pub fn retry_after(&self) -> Duration {
		self.retry_after_at(OffsetDateTime::now_utc())
	}

	/// Time, measured from `now`, until either bucket holds a whole token.
	pub fn retry_after_at(&self, now: OffsetDateTime) -> Duration {
		let mut state = self.state.lock();

		state.refill(now);

		state.time_until_token()
	}

	/// Consumes a token or explains when the next one accrues.
	pub fn acquire(&self) -> RateLimitDecision {
		self.acquire_at(OffsetDateTime::now_utc())
	}

	/// Consumes a token at `now` or explains when the next one accrues.
	pub fn acquire_at(&self, now: OffsetDateTime) -> RateLimitDecision {
		let mut state = self.state.lock();

		state.refill(now);

		if state.minute_bucket.try_take() || state.hour_bucket.try_take() {
			return RateLimitDecision::Allow;
		}

		let backoff = state.time_until_token();

		RateLimitDecision::Delay(RetryDirective {
			earliest_retry_at: now.saturating_add(backoff),
			recommended_backoff: backoff,
		})
	}

	/// Token levels at `now`.
	pub fn levels_at(&self, now: OffsetDateTime) -> BucketLevels {
		let mut state = self.state.lock();

		state.refill(now);

		BucketLevels { minute: state.minute_bucket.available(), hour: state.hour_bucket.available() }
	}
}
impl Default for LoginRateLimiter {
	fn default() -> Self {
		Self::new(RateLimitConfig::default())
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	const T0: OffsetDateTime = macros::datetime!(2025-11-10 12:00 UTC);

	fn at(secs: i64) -> OffsetDateTime {
		T0 + Duration::seconds(secs)
	}

	#[test]
	fn minute_bucket_drains_before_hour_bucket() {
		let limiter = LoginRateLimiter::starting_at(RateLimitConfig::default(), T0);

		assert!(limiter.consume_at(at(0)));
		assert!(limiter.consume_at(at(0)));

		let levels = limiter.levels_at(at(0));

		assert_eq!(levels.minute, 0.0);
		assert_eq!(levels.hour, 12.0);
		assert!(limiter.can_attempt_at(at(0)), "Hour bucket still holds tokens.");
	}

	#[test]
	fn exhausting_both_buckets_blocks_attempts() {
		let limiter = LoginRateLimiter::starting_at(RateLimitConfig::default(), T0);

		for attempt in 0..14 {
			assert!(limiter.consume_at(at(0)), "Attempt {attempt} should be admitted.");
		}

		assert!(!limiter.consume_at(at(0)));
		assert!(!limiter.can_attempt_at(at(0)));
	}

	#[test]
	fn one_refill_interval_readmits_an_attempt() {
		let limiter = LoginRateLimiter::starting_at(RateLimitConfig::default(), T0);

		while limiter.consume_at(at(0)) {}

		assert!(!limiter.can_attempt_at(at(29)));
		assert!(limiter.can_attempt_at(at(30)), "Half a minute accrues one minute-bucket token.");
		assert!(limiter.consume_at(at(30)));
		assert!(!limiter.can_attempt_at(at(30)));
	}

	#[test]
	fn login_attempt_timeline() {
		let limiter = LoginRateLimiter::starting_at(RateLimitConfig::default(), T0);

		assert!(limiter.consume_at(at(0)));
		assert!(limiter.consume_at(at(10)));
		assert!(limiter.levels_at(at(10)).minute < 1.0);

		assert!(limiter.consume_at(at(15)), "Third attempt falls back to the hour bucket.");

		let after_fallback = limiter.levels_at(at(15));

		assert!(after_fallback.minute < 1.0);
		assert!(after_fallback.hour < 12.0);

		let hour_before = after_fallback.hour;

		assert!(limiter.consume_at(at(65)), "Fourth attempt draws from the refilled minute bucket.");

		let after_refill = limiter.levels_at(at(65));

		assert!((after_refill.minute - 1.0).abs() < 1e-9);
		assert!(after_refill.hour >= hour_before, "Hour bucket must not be drawn from.");
	}

	#[test]
	fn delay_reports_time_until_next_token() {
		let limiter = LoginRateLimiter::starting_at(RateLimitConfig::default(), T0);

		while limiter.consume_at(at(0)) {}

		match limiter.acquire_at(at(0)) {
			RateLimitDecision::Delay(directive) => {
				assert_eq!(directive.recommended_backoff, Duration::seconds(30));
				assert_eq!(directive.earliest_retry_at, at(30));
			},
			RateLimitDecision::Allow => panic!("Exhausted limiter must not admit attempts."),
		}

		let drift = (limiter.retry_after_at(at(20)) - Duration::seconds(10)).abs();

		assert!(drift < Duration::MILLISECOND);
		assert_eq!(limiter.acquire_at(at(30)), RateLimitDecision::Allow);
		assert_eq!(limiter.retry_after_at(at(30)), Duration::seconds(30));
		assert_eq!(limiter.retry_after_at(at(60)), Duration::ZERO);
	}

	#[test]
	fn backwards_clock_accrues_nothing() {
		let mut bucket = TokenBucket::full(BucketConfig::new(2, Duration::minutes(1)), at(60));

		assert!(bucket.try_take());
		assert!(bucket.try_take());

		bucket.refill(at(0));

		assert_eq!(bucket.available(), 0.0);

		bucket.refill(at(90));

		assert!((bucket.available() - 1.0).abs() < 1e-9);
	}
}
