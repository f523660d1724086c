//! Residual ploidy tracking for every SV breakend in a cluster
//!

use std::collections::BTreeMap;

use simple_error::{SimpleResult, bail};

use crate::breakend::{BreakendId, BreakendSide};
use crate::ploidy::{MIN_UNLINKED_PLOIDY, format_ploidy, is_exhausted};

/// Ploidy budget for one breakend
///
#[derive(Clone, Debug)]
pub struct BreakendPloidy {
    pub total: f64,
    pub uncertainty: f64,

    /// Ploidy explained by committed links so far. This value never decreases.
    consumed: f64,
}

impl BreakendPloidy {
    pub fn new(total: f64, uncertainty: f64) -> Self {
        Self {
            total,
            uncertainty,
            consumed: 0.0,
        }
    }

    pub fn consumed(&self) -> f64 {
        self.consumed
    }

    pub fn unlinked(&self) -> f64 {
        (self.total - self.consumed).max(0.0)
    }

    /// Maximum consumed ploidy which can be accepted for this breakend
    pub fn consumption_limit(&self) -> f64 {
        self.total + self.uncertainty
    }

    pub fn can_consume(&self, ploidy: f64) -> bool {
        self.consumed + ploidy <= self.consumption_limit() + MIN_UNLINKED_PLOIDY
    }
}

/// Connection state for all breakends of one SV
///
#[derive(Clone, Debug)]
pub struct SvConnectionState {
    ends: Vec<BreakendPloidy>,
}

impl SvConnectionState {
    pub fn new(ends: Vec<BreakendPloidy>) -> Self {
        assert!((1..=2).contains(&ends.len()));
        Self { ends }
    }

    pub fn end(&self, side: BreakendSide) -> Option<&BreakendPloidy> {
        self.ends.get(side as usize)
    }
}

/// Connection state for every SV of a cluster, indexed by SV index
///
#[derive(Default)]
pub struct ConnectionStateTable {
    states: Vec<SvConnectionState>,
}

impl ConnectionStateTable {
    pub fn push(&mut self, state: SvConnectionState) -> usize {
        self.states.push(state);
        self.states.len() - 1
    }

    pub fn get(&self, breakend: BreakendId) -> Option<&BreakendPloidy> {
        self.states.get(breakend.sv_index)?.end(breakend.side)
    }

    /// Unlinked ploidy of a breakend, or zero if the breakend does not exist
    pub fn unlinked(&self, breakend: BreakendId) -> f64 {
        self.get(breakend).map_or(0.0, |x| x.unlinked())
    }

    pub fn uncertainty(&self, breakend: BreakendId) -> f64 {
        self.get(breakend).map_or(0.0, |x| x.uncertainty)
    }

    pub fn is_exhausted(&self, breakend: BreakendId) -> bool {
        is_exhausted(self.unlinked(breakend))
    }

    pub fn breakend_count(&self) -> usize {
        self.states.iter().map(|x| x.ends.len()).sum()
    }

    pub fn total_unlinked(&self) -> f64 {
        self.states
            .iter()
            .flat_map(|x| x.ends.iter())
            .map(|x| x.unlinked())
            .sum()
    }

    /// Iterate over all breakends with their ploidy state, in breakend id order
    pub fn iter(&self) -> impl Iterator<Item = (BreakendId, &BreakendPloidy)> {
        self.states.iter().enumerate().flat_map(|(sv_index, state)| {
            state
                .ends
                .iter()
                .zip([BreakendSide::Start, BreakendSide::End])
                .map(move |(x, side)| (BreakendId::new(sv_index, side), x))
        })
    }

    /// Check that the full set of requested ploidy consumption can be applied
    ///
    /// Any request which would push a breakend's consumed ploidy above its total plus
    /// uncertainty is an error, reflecting an inconsistent ploidy computed by a chaining rule.
    ///
    pub fn check_consumption(&self, consumption: &BTreeMap<BreakendId, f64>) -> SimpleResult<()> {
        for (&breakend, &ploidy) in consumption.iter() {
            let Some(state) = self.get(breakend) else {
                bail!("Link refers to unknown breakend {breakend:?}");
            };
            if !ploidy.is_finite() || ploidy <= 0.0 {
                bail!(
                    "Invalid link ploidy {} for breakend {breakend:?}",
                    format_ploidy(ploidy)
                );
            }
            if !state.can_consume(ploidy) {
                bail!(
                    "Link ploidy {} exceeds breakend {breakend:?} limit: consumed {} total {} uncertainty {}",
                    format_ploidy(ploidy),
                    format_ploidy(state.consumed),
                    format_ploidy(state.total),
                    format_ploidy(state.uncertainty)
                );
            }
        }
        Ok(())
    }

    /// Apply ploidy consumption to all requested breakends
    ///
    /// The full request is checked before any breakend is updated, so that a rejected request
    /// leaves the table unchanged.
    ///
    pub fn consume(&mut self, consumption: &BTreeMap<BreakendId, f64>) -> SimpleResult<()> {
        self.check_consumption(consumption)?;
        for (&breakend, &ploidy) in consumption.iter() {
            let state = &mut self.states[breakend.sv_index].ends[breakend.side as usize];
            state.consumed += ploidy;
        }
        Ok(())
    }
}
