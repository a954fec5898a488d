use std::cmp::Ordering;

use crate::types::AgentAddress;

/// A staking validator, created when its stake transaction confirms and
/// removed again on exit confirmation. Deposits are denominated in the
/// smallest raw unit, so `u128` covers any realistic total supply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    pub address: AgentAddress,
    pub deposit: u128,
    pub registered_height: u64,
    pub registered_at: u64,
    /// Hash of the transaction that registered or last changed this agent.
    pub identity_tx_hash: Vec<u8>,
}

/// A pending deposit change that has not been folded into an [`Agent`] yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub agent: AgentAddress,
    pub new_deposit: u128,
    pub height: u64,
    pub occurred_at: u64,
}

/// The packing order comparator: deposit descending, then registration
/// height ascending, then registration time ascending, then identity hash
/// bytes ascending. A strict total order as long as identity hashes are
/// unique, so the same agent snapshot always yields the same order no
/// matter how it was iterated.
pub fn compare_agents(a: &Agent, b: &Agent) -> Ordering {
    b.deposit
        .cmp(&a.deposit)
        .then_with(|| a.registered_height.cmp(&b.registered_height))
        .then_with(|| a.registered_at.cmp(&b.registered_at))
        .then_with(|| a.identity_tx_hash.cmp(&b.identity_tx_hash))
}

/// Ordering for pending deposit-change events: confirmation height first,
/// then occurrence time. Earlier events apply first.
pub fn compare_deposit_events(a: &DepositEvent, b: &DepositEvent) -> Ordering {
    a.height
        .cmp(&b.height)
        .then_with(|| a.occurred_at.cmp(&b.occurred_at))
}
