//! The unit of work dispatched to updaters and effects.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::primitives::BlockNumber;

/// A single event or transaction item inside a [`Block`](super::block::Block).
///
/// `type_` selects which registered updaters and effects fire for this
/// action; `payload` is opaque to the core and handed unmodified to whatever
/// updater/effect functions are registered for `type_`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Discriminates which registered updaters/effects this action triggers.
    #[serde(rename = "type")]
    pub type_: String,
    /// Opaque, action-type-specific data. The core never inspects this.
    pub payload: Value,
    pub block_number: BlockNumber,
    pub transaction_id: String,
    pub action_index: u32,
}

impl Action {
    /// The sort key mandated by the data model: actions within a block are
    /// totally ordered by `(transaction_id, action_index)`. The core trusts
    /// callers to supply `Block::actions` already in this order; this key
    /// exists for assertions and tests, not for runtime re-sorting.
    #[must_use]
    pub fn order_key(&self) -> (&str, u32) {
        (self.transaction_id.as_str(), self.action_index)
    }
}

impl PartialOrd for Action {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for Action {}

impl Ord for Action {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn action(tx: &str, idx: u32) -> Action {
        Action {
            type_: "noop".to_string(),
            payload: Value::Null,
            block_number: BlockNumber(1),
            transaction_id: tx.to_string(),
            action_index: idx,
        }
    }

    #[test]
    fn orders_by_transaction_then_index() {
        let mut actions = vec![action("b", 0), action("a", 1), action("a", 0)];
        actions.sort();
        assert_eq!(
            actions.iter().map(Action::order_key).collect::<Vec<_>>(),
            vec![("a", 0), ("a", 1), ("b", 0)]
        );
    }
}
