use simple_error::{SimpleResult, bail};
use strum::IntoEnumIterator;

use super::ChainingContext;
use super::rules::{RuleStage, propose};
use crate::log_utils::debug_msg;
use crate::ploidy::{MIN_UNLINKED_PLOIDY, format_ploidy};
use crate::proposed_links::{ProposedLinks, cull_by_priority};

/// Run every rule stage in priority order, culling the proposals after each stage
///
/// The first stage producing any proposals seeds the batch, and all later stages annotate or
/// restrict it. Returns the culled proposals, best first.
///
pub fn propose_all(ctx: &ChainingContext) -> Vec<ProposedLinks> {
    let mut proposals = Vec::new();
    for stage in RuleStage::iter() {
        proposals = propose(ctx, stage, proposals);
        cull_by_priority(&mut proposals);
    }
    proposals
}

impl ChainingContext {
    /// Maximum number of commits allowed for this cluster
    fn max_iterations(&self) -> usize {
        self.connections.breakend_count() + self.pairs.len() + 1
    }

    /// Assemble chains by repeatedly committing the best proposal until no rule proposes a link
    ///
    /// Returns the number of commits made.
    ///
    pub fn assemble(&mut self) -> SimpleResult<usize> {
        let cluster_index = self.settings.cluster_index;
        let max_iterations = self.max_iterations();

        let mut commit_count = 0;
        loop {
            let proposals = propose_all(self);
            let Some(proposal) = proposals.into_iter().next() else {
                break;
            };

            if commit_count >= max_iterations {
                bail!(
                    "Cluster {cluster_index}: chain assembly exceeded {max_iterations} iterations"
                );
            }

            let unlinked_before = self.connections.total_unlinked();
            self.commit(&proposal)?;
            let unlinked_after = self.connections.total_unlinked();
            if unlinked_after > unlinked_before - MIN_UNLINKED_PLOIDY {
                bail!(
                    "Cluster {cluster_index}: commit of {proposal:?} did not reduce unlinked ploidy ({} -> {})",
                    format_ploidy(unlinked_before),
                    format_ploidy(unlinked_after)
                );
            }
            commit_count += 1;
        }

        debug_msg!(
            self.settings.debug,
            "Cluster {cluster_index}: assembly complete after {commit_count} commits, {} chains",
            self.chains.len()
        );
        Ok(commit_count)
    }
}
