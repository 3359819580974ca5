//! Turns "push one utterance, get one bounded reply" into a race between the
//! session's idle, terminal and escalation signals.

use std::time::{Duration, Instant};

use super::types::{ExchangeRequest, ExchangeResponse, Utterance};
use crate::sessions::SessionContainer;

/// Which signal ended the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The program consumed the input and is blocked on the next one.
    Idle,
    /// The program task reached a terminal state.
    Finished,
    /// An out-of-context handler asked the caller to take over.
    Escalated,
    /// None of the above within the turn bound.
    TimedOut,
}

/// Serve one exchange against `container`.
///
/// Exchanges on the same container are serialized. `turn_timeout` bounds the
/// wait; `None` waits until one of the session signals fires.
pub async fn reconcile(
    container: &SessionContainer,
    request: &ExchangeRequest,
    turn_timeout: Option<Duration>,
) -> ExchangeResponse {
    let started = Instant::now();
    let _exclusive = container.lock_exchange().await;
    let state = container.state();

    if container.escalation().supply_input() {
        tracing::debug!(session = %container.key(), "resuming out-of-context handler");
    }
    if let Some(code) = &request.source_language_code {
        state.memory_set("source_language_code", code.clone());
    }
    state.memory_merge(request.context.clone());
    state.push_user_input(request.user_input.clone());

    let outcome = wait_for_turn(container, turn_timeout).await;
    if outcome == TurnOutcome::TimedOut {
        tracing::warn!(
            session = %container.key(),
            timeout_secs = turn_timeout.map_or(0, |t| t.as_secs()),
            "conversation program did not reach a turn boundary in time"
        );
    }

    let texts = container.collect_and_clear_output();
    let status = container.status();
    let outputs = status.outputs().unwrap_or_default();
    let component_done = status.is_terminal();
    let escalation = container.escalation();
    let out_of_context = escalation.is_requested();
    escalation.clear_requested();

    tracing::debug!(
        session = %container.key(),
        outcome = ?outcome,
        responses = texts.len(),
        component_done,
        out_of_context,
        "exchange served"
    );

    ExchangeResponse {
        response: texts.join(" "),
        responses: texts.into_iter().map(Utterance::text).collect(),
        component_done,
        component_failed: component_done && !outputs.success,
        out_of_context,
        updated_context: state.memory_snapshot(),
        outputs: outputs.outputs,
        response_time: started.elapsed().as_secs_f64(),
    }
}

/// First-completed-wins wait. The losing waits are dropped without touching
/// their signals, so they can be re-armed by the next exchange.
pub async fn wait_for_turn(container: &SessionContainer, turn_timeout: Option<Duration>) -> TurnOutcome {
    let bound = async {
        match turn_timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        () = container.state().turns().await_next_request() => TurnOutcome::Idle,
        () = container.wait_finished() => TurnOutcome::Finished,
        () = container.escalation().wait_requested() => TurnOutcome::Escalated,
        () = bound => TurnOutcome::TimedOut,
    }
}
