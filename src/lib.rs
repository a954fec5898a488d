//! Round-based consensus voting engine for proof-of-credit networks.
//!
//! Validator nodes ("agents") are ranked by staked deposit and take turns
//! producing blocks; agreement on each block is reached through a weighted
//! two-stage Byzantine vote. This crate implements the voting core:
//! deterministic agent ordering, the weighted-majority threshold, the
//! two-stage vote aggregation state machine, bounded result and candidate
//! caches, and the request/future matching used while resolving orphan
//! blocks.
//!
//! ## How it works
//!
//! At each round boundary the current agent set is snapshotted and sorted
//! into a packing schedule. The scheduled agent proposes a block; every
//! agent casts a stage-one vote for the candidate it saw. Once one hash
//! gathers more than two thirds of the total deposit weight it is locked
//! in, each node commits with a stage-two vote, and a second weighted
//! majority finalizes the block.
//!
//! The main entry point is [`service::ConsensusService`], which partitions
//! all state per chain, handles inbound votes synchronously, and runs the
//! background loops (reward settlement, stale-candidate sweeping, height
//! stall monitoring). Transport, block validation, persistence and
//! signature aggregation are collaborators plugged in at the trait seams.

pub mod agent;
pub mod aggregator;
pub mod block_requests;
pub mod candidates;
pub mod chain;
pub mod config;
pub mod dedup;
pub mod error;
pub mod events;
pub mod result_cache;
pub mod rewards;
pub mod round;
pub mod service;
pub mod stats;
pub mod types;
pub mod utils;
