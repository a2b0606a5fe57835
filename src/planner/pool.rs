//! Resource-pool membership transitions.

/// The membership change a reconcile has to apply for one guest.
///
/// Membership is exclusive, so a move is always remove-then-add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolChange {
    Nop,
    Add(String),
    Remove(String),
    Move { from: String, to: String },
}

impl PoolChange {
    /// Derives the transition from the previous and requested pool ids.
    pub fn plan(old: Option<&str>, new: Option<&str>) -> Self {
        match (old, new) {
            (None, None) => PoolChange::Nop,
            (None, Some(to)) => PoolChange::Add(to.to_string()),
            (Some(from), None) => PoolChange::Remove(from.to_string()),
            (Some(from), Some(to)) if from == to => PoolChange::Nop,
            (Some(from), Some(to)) => PoolChange::Move {
                from: from.to_string(),
                to: to.to_string(),
            },
        }
    }

    pub fn is_nop(&self) -> bool {
        matches!(self, PoolChange::Nop)
    }
}
