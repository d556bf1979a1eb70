//! Monitor cycle span helpers.

use tracing::Span;

use crate::model::{BlockNumber, ScopeMode};

/// Start a span for one monitor cycle.
///
/// The `cycle.unworked` field is declared empty and filled in by
/// [`record_unworked`] once the cycle knows its result.
pub fn start_cycle_span(block: BlockNumber, mode: ScopeMode) -> Span {
    tracing::info_span!(
        "monitor.cycle",
        "cycle.block" = block,
        "cycle.scope_mode" = %mode,
        "cycle.unworked" = tracing::field::Empty,
    )
}

/// Record how many jobs crossed the threshold in this cycle.
pub fn record_unworked(span: &Span, unworked: usize) {
    span.record("cycle.unworked", unworked as u64);
}
