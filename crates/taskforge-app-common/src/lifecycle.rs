/// Trait for lifecycle states
///
/// Every status enum in the workspace (task, claim, transaction) implements
/// this so transitions are validated against an explicit table instead of
/// ad hoc string comparison.
pub trait LifecycleState: Send + Sync + Clone + std::fmt::Debug {
    /// Check if this is a terminal state
    fn is_terminal(&self) -> bool;

    /// Check if transition to another state is valid
    fn can_transition_to(&self, next: &Self) -> bool;
}
