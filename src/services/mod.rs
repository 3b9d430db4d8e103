//! Orchestration services.

pub mod approval_service;
pub mod conflict_resolver;
pub mod dispatcher;
pub mod escalation;
pub mod event_bus;
pub mod hollon_orchestrator;
pub mod hollon_registry;
pub mod quality_gate;
pub mod task_pool;

#[cfg(test)]
pub(crate) mod test_support;

pub use approval_service::ApprovalService;
pub use conflict_resolver::{ConflictContext, ConflictDetectionResult, ConflictResolver};
pub use dispatcher::{DispatchRound, HollonDispatcher};
pub use escalation::{EscalationService, FirstCandidateSelector, HelperSelector};
pub use event_bus::{EventBus, EventBusConfig, EventCategory, EventPayload, EventSeverity, UnifiedEvent};
pub use hollon_orchestrator::{CycleOutcome, HollonOrchestrator, OrchestratorPorts};
pub use hollon_registry::HollonRegistry;
pub use quality_gate::{QualityGate, QualityGateResult, TaskCategory};
pub use task_pool::{PullReason, PullResult, TaskPool};

/// Pull the JSON object out of a Brain response.
///
/// Accepts a ```json fenced block, any fenced block, or a `{...}` span of
/// the raw text. Spans are matched by brace depth outside string literals,
/// so fences or braces inside JSON strings do not cut the object short.
/// Among bare spans the first that parses as JSON wins. Returns `None` when
/// nothing object-shaped is present; the caller's typed decode decides
/// whether it is valid.
pub fn extract_json_from_response(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    for marker in ["```json", "```JSON", "```"] {
        if let Some(start) = trimmed.find(marker) {
            let body = trimmed[start + marker.len()..].trim_start();
            if body.starts_with('{') {
                if let Some(object) = balanced_object(body) {
                    return Some(object);
                }
            }
        }
    }

    let mut first = None;
    for (start, _) in trimmed.match_indices('{') {
        if let Some(object) = balanced_object(&trimmed[start..]) {
            if serde_json::from_str::<serde_json::Value>(object).is_ok() {
                return Some(object);
            }
            first.get_or_insert(object);
        }
    }
    first
}

/// The `{...}` span opening at the start of `text`.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
