//! [`ScoreLedger`] – objectives reported by behaviors.
//!
//! Bookkeeping only.  The arbiter never reads the ledger when choosing a
//! behavior.

use std::collections::BTreeMap;

use botcore_types::BehaviorId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectiveRecord {
    pub behavior: BehaviorId,
    pub behavior_name: String,
    pub objective: String,
    pub score: u32,
    pub tick: u64,
}

#[derive(Debug, Default)]
pub struct ScoreLedger {
    records: Vec<ObjectiveRecord>,
    totals: BTreeMap<BehaviorId, u64>,
}

impl ScoreLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        behavior: BehaviorId,
        behavior_name: &str,
        objective: &str,
        score: u32,
        tick: u64,
    ) {
        *self.totals.entry(behavior).or_default() += u64::from(score);
        self.records.push(ObjectiveRecord {
            behavior,
            behavior_name: behavior_name.to_string(),
            objective: objective.to_string(),
            score,
            tick,
        });
    }

    pub fn total_for(&self, behavior: BehaviorId) -> u64 {
        self.totals.get(&behavior).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.totals.values().sum()
    }

    pub fn records(&self) -> &[ObjectiveRecord] {
        &self.records
    }

    /// How many times `objective` was achieved, by any behavior.
    pub fn count(&self, objective: &str) -> usize {
        self.records
            .iter()
            .filter(|r| r.objective == objective)
            .count()
    }
}
