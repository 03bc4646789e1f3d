use crate::aggregator::CheckIntake;
use crate::termination::QuitListener;
use hostpulse_checks::Checker;
use hostpulse_common::types::{CheckReport, CheckStatus};
use std::sync::Arc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// What to do with one check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub forward: bool,
    /// Wake the aggregator now instead of at its next ceiling.
    pub immediate: bool,
}

/// Runs one checker on its interval and filters its reports.
pub struct CheckerRunner {
    checker: Arc<dyn Checker>,
    last_status: CheckStatus,
    last_message: String,
}

impl CheckerRunner {
    pub fn new(checker: Arc<dyn Checker>) -> Self {
        Self {
            checker,
            last_status: CheckStatus::Undefined,
            last_message: String::new(),
        }
    }

    pub fn last_status(&self) -> CheckStatus {
        self.last_status
    }

    /// Compares `report` to the previous result and remembers it.
    ///
    /// An OK result identical to the previous one is not forwarded. A status
    /// change escalates, except the first OK after startup.
    pub fn observe(&mut self, report: &CheckReport) -> Decision {
        if report.status == CheckStatus::Ok
            && report.status == self.last_status
            && report.message == self.last_message
        {
            return Decision {
                forward: false,
                immediate: false,
            };
        }

        let immediate = report.status != self.last_status
            && !(self.last_status == CheckStatus::Undefined && report.status == CheckStatus::Ok);

        self.last_status = report.status;
        self.last_message.clone_from(&report.message);
        Decision {
            forward: true,
            immediate,
        }
    }

    pub async fn run(mut self, intake: CheckIntake, mut quit: QuitListener) {
        let period = self.checker.interval();
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = quit.wait() => break,
            }

            let result = tokio::select! {
                result = self.checker.check() => result,
                _ = quit.wait() => break,
            };
            let report = match result {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(check = self.checker.name(), error = %format!("{e:#}"), "Check failed to run");
                    continue;
                }
            };

            let decision = self.observe(&report);
            tracing::debug!(
                check = %report.name,
                status = %report.status,
                forward = decision.forward,
                immediate = decision.immediate,
                "Check finished"
            );
            if !decision.forward {
                continue;
            }
            if !intake.forward(report) {
                break;
            }
            if decision.immediate {
                intake.escalate();
            }
        }
        tracing::debug!(check = self.checker.name(), "Checker stopped");
    }
}
