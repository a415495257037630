// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span wrapping one session flow.
///
/// Request flows also carry the HTTP method and path so replays can be correlated with
/// the refresh cycle that released them.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a span tagged with the provided flow kind and stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"session_gate.flow",
				flow = kind.as_str(),
				stage,
				method = tracing::field::Empty,
				path = tracing::field::Empty,
				retried = tracing::field::Empty,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Creates a request span annotated with the call's method, path, and retry mark.
	pub fn request(stage: &'static str, method: &str, path: &str, retried: bool) -> Self {
		let span = Self::new(FlowKind::Request, stage);

		#[cfg(feature = "tracing")]
		{
			span.span.record("method", method);
			span.span.record("path", path);
			span.span.record("retried", retried);
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (method, path, retried);
		}

		span
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn request_span_wraps_future() {
		let span = FlowSpan::request("send", "GET", "/courses", false);
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}

	#[tokio::test]
	async fn refresh_span_passes_output_through() {
		let span = FlowSpan::new(FlowKind::Refresh, "handle_unauthorized");
		let value = span.instrument(async { "drained" }).await;

		assert_eq!(value, "drained");
	}
}
