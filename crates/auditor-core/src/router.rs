//! Conditional routing after the evidence fan-in.
//!
//! The router is the pipeline's only branch point. Both continuations lead to
//! the same scoring group; the branch only decides whether a diagnostic is
//! appended to the error accumulator.

use serde::{Deserialize, Serialize};

use crate::state::{merge, PipelineState, StageErrorKind, StageErrorRecord, StateUpdate};

/// Stage name recorded on the degraded-path diagnostic.
pub const ROUTER_STAGE: &str = "router";

/// Message of the degraded-path diagnostic.
pub const DEGRADED_DIAGNOSTIC: &str =
    "evidence collection incomplete: scoring continues in degraded mode";

/// The continuation chosen after evidence aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Normal,
    Degraded,
}

/// Pure predicate over the merged state: degraded when any stage error was
/// recorded or no evidence at all was collected.
pub fn route(state: &PipelineState) -> Route {
    if state.has_errors() || state.has_no_evidence() {
        Route::Degraded
    } else {
        Route::Normal
    }
}

/// Apply the chosen continuation. `Degraded` appends exactly one diagnostic;
/// `Normal` returns the state untouched.
pub fn apply_route(route: Route, state: PipelineState) -> PipelineState {
    match route {
        Route::Normal => state,
        Route::Degraded => merge(
            state,
            StateUpdate::empty().with_error(StageErrorRecord::new(
                ROUTER_STAGE,
                StageErrorKind::Diagnostic,
                DEGRADED_DIAGNOSTIC,
                0,
            )),
        ),
    }
}
