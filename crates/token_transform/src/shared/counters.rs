//! Optional counters for instrumentation.

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub tokens_transformed: u64,
    pub transforms_invoked: u64,
    pub deferrals: u64,
    pub restarts: u64,
    pub accum_nodes: u64,
    pub expansions: u64,
    pub integrity_repairs: u64,
}
