//! Ensemble loop and member export

use crate::core::config::FailurePolicy;
use crate::core::timing::StepTally;
use crate::models::event::DriverEvent;
use crate::models::state::SimulationState;
use crate::orchestrator::driver::{Driver, DriverError, MemberReport};
use tracing::{info, warn};

impl Driver {
    /// Run members `1..=ensemble_size` in order
    ///
    /// Under [`FailurePolicy::Abort`] the first failing member ends the run.
    /// Under [`FailurePolicy::SkipMember`] the failure is recorded and the
    /// next member starts from freshly re-initialized state.
    pub fn run_ensemble(
        &mut self,
        state: &mut SimulationState,
        tally: StepTally,
    ) -> Result<(Vec<MemberReport>, StepTally), DriverError> {
        let size = self.config().ensemble_size;
        let policy = self.config().failure_policy;
        let mut tally = tally;
        let mut members = Vec::with_capacity(size);

        info!("Ensemble of {} run(s)", size);

        for member in 1..=size {
            match self.run_member(member, state, tally) {
                Ok((report, updated)) => {
                    tally = updated;
                    members.push(report);
                }
                Err(failure) if policy == FailurePolicy::SkipMember => {
                    warn!("Run {} failed, skipping: {}", member, failure.error);
                    tally = failure.tally;
                    let reason = failure.error.to_string();
                    self.log_event(DriverEvent::MemberFailed {
                        member,
                        reason: reason.clone(),
                    });
                    members.push(MemberReport::failed(
                        member,
                        reason,
                        failure.linear_substeps,
                        state,
                    ));
                }
                Err(failure) => return Err(failure.error),
            }
        }

        Ok((members, tally))
    }

    /// Write the series of every completed member through the exporter
    pub fn export_members(&mut self, members: &[MemberReport]) -> Result<(), DriverError> {
        for report in members.iter().filter(|m| m.is_completed()) {
            self.exporter
                .export_member(report.member, &report.series)
                .map_err(DriverError::Export)?;
        }
        Ok(())
    }
}
