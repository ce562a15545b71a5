//! Query planning context.
//!
//! [`PlanCtx`] carries the per-compilation settings the analyzer passes need:
//! team, storage mode and row limit. One instance per compile call.

use std::fmt;

use crate::config::CompilerConfig;

#[derive(Debug, Clone)]
pub struct PlanCtx {
    team_id: i64,
    /// Person fields are read from flattened columns on events instead of joins.
    person_on_events: bool,
    /// Upper bound for LIMIT; also the default when the query has none.
    max_limit: u64,
}

impl PlanCtx {
    pub fn new(team_id: i64, person_on_events: bool, max_limit: u64) -> Self {
        PlanCtx {
            team_id,
            person_on_events,
            max_limit,
        }
    }

    pub fn from_config(config: &CompilerConfig) -> Self {
        Self::new(config.team_id, config.person_on_events, config.max_limit)
    }

    pub fn team_id(&self) -> i64 {
        self.team_id
    }

    pub fn person_on_events(&self) -> bool {
        self.person_on_events
    }

    pub fn max_limit(&self) -> u64 {
        self.max_limit
    }
}

impl fmt::Display for PlanCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PlanCtx(team_id={}, person_on_events={}, max_limit={})",
            self.team_id, self.person_on_events, self.max_limit
        )
    }
}
