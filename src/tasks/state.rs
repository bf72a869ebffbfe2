use super::types::State;

/// Legal transition relation for the task state machine.
///
/// Scheduled and Running accept themselves (idempotent re-submission of the
/// same intent). Completed and Failed are terminal except for an explicit
/// restart, which re-promotes to Scheduled. Nothing transitions back to
/// Pending.
pub fn valid_state_transition(src: State, dst: State) -> bool {
    match src {
        State::Pending => matches!(dst, State::Scheduled | State::Failed),
        State::Scheduled => matches!(dst, State::Scheduled | State::Running | State::Failed),
        State::Running => matches!(dst, State::Running | State::Completed | State::Failed),
        State::Completed | State::Failed => matches!(dst, State::Scheduled),
    }
}
