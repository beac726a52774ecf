//! Fuzzy deduplication of match records.
//!
//! - **key**: order-independent grouping keys
//! - **equality**: structural equality plus timestamp tolerance
//! - **engine**: adjacent-run collapse and the Local/Global phases
//! - **partition**: deterministic key to reducer routing

pub mod engine;
pub mod equality;
pub mod key;
pub mod partition;

pub use engine::{
    collapse, global_phase, local_phase, CollapseStats, EngineError, GroupState, KeyGroup,
    KeyedRecord, OutputRecord, PhaseOutput,
};
pub use equality::{EqualityModel, Verdict, DEFAULT_TOLERANCE_SECS};
pub use key::build_key;
pub use partition::reducer_for;
