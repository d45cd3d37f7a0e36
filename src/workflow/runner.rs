//! Drives a build run: the forward pass over the steps, then the
//! compensation pass.
//!
//! The runner owns failure accounting. A step that halts marks the run
//! failed; cleanup always executes exactly once afterwards and decides
//! per compensation whether it applies to a failed or a successful run.

use tracing::debug;

use crate::api;
use crate::config::Config;
use crate::error::KilnError;
use crate::reporter::Reporter;

use super::auth::AuthStep;
use super::create_image::CreateImageStep;
use super::create_vm::CreateVmStep;
use super::provision::{ProvisionStep, Provisioner};
use super::{Compensation, RunContext, RunState, Step, StepOutcome};

/// What a completed (non-failed) run produced.
#[derive(Debug)]
pub struct RunSummary {
    /// Name of the created image, when the run produced one.
    pub image: Option<String>,
    /// Id of the builder VM the run used.
    pub vm_id: String,
}

pub struct Runner<'a> {
    config: &'a Config,
    api: &'a api::Client,
    reporter: &'a dyn Reporter,
    steps: Vec<Box<dyn Step>>,
}

impl<'a> Runner<'a> {
    /// The standard build: authenticate, create and deploy the builder
    /// VM, run the provisioning hook, persist the image.
    pub fn new(
        config: &'a Config,
        api: &'a api::Client,
        reporter: &'a dyn Reporter,
        provisioner: Option<Box<dyn Provisioner>>,
    ) -> Self {
        Self::with_steps(
            config,
            api,
            reporter,
            vec![
                Box::new(AuthStep),
                Box::new(CreateVmStep),
                Box::new(ProvisionStep::new(provisioner)),
                Box::new(CreateImageStep),
            ],
        )
    }

    /// Custom step list. Used by tests to script outcomes.
    pub fn with_steps(
        config: &'a Config,
        api: &'a api::Client,
        reporter: &'a dyn Reporter,
        steps: Vec<Box<dyn Step>>,
    ) -> Self {
        Self {
            config,
            api,
            reporter,
            steps,
        }
    }

    pub async fn run(mut self) -> Result<RunSummary, KilnError> {
        let mut ctx = RunContext {
            config: self.config,
            api: self.api,
            reporter: self.reporter,
            state: RunState::default(),
        };

        for step in &mut self.steps {
            debug!(step = step.name(), "running step");
            match step.run(&mut ctx).await {
                StepOutcome::Continue => {}
                StepOutcome::Skip => {
                    debug!(step = step.name(), "step skipped");
                }
                StepOutcome::Halt => {
                    ctx.state.failed = true;
                    if ctx.state.error.is_none() {
                        ctx.state.error = Some(KilnError::Halted {
                            step: step.name().into(),
                        });
                    }
                    break;
                }
            }
        }

        cleanup(&ctx).await;

        if ctx.state.failed {
            return Err(ctx.state.error.take().unwrap_or_else(|| KilnError::Halted {
                step: "build".into(),
            }));
        }

        let image = if self.config.builder.no_create_image {
            None
        } else {
            Some(self.config.image.destination.clone())
        };
        Ok(RunSummary {
            image,
            vm_id: std::mem::take(&mut ctx.state.vm_id),
        })
    }
}

// ── Compensation pass ───────────────────────────────────────────────

/// Walk the registered compensations in reverse. Which ones apply
/// depends on how the run ended: a failed run deletes the pre-copied
/// image and leaves any builder VM up for inspection, a successful run
/// purges the builder VM and keeps the image it produced.
async fn cleanup(ctx: &RunContext<'_>) {
    let reporter = ctx.reporter;
    let builder = &ctx.config.builder;

    if builder.no_delete_vm {
        reporter.say(&format!(
            "Leaving builder VM [{}] in place because no_delete_vm is set",
            builder.vm_name
        ));
        let copied = ctx
            .state
            .compensations
            .iter()
            .any(|c| matches!(c, Compensation::DeleteCopiedImage { .. }));
        if copied {
            reporter.say(&format!(
                "Pre-copied image [{}] is left in place as well",
                ctx.config.image.destination
            ));
        }
        return;
    }

    let Some(token) = ctx.state.auth_token.clone() else {
        // Nothing can have materialized without a login.
        if ctx.state.failed {
            reporter.say("Nothing to clean up: the run failed before logging in");
        }
        return;
    };

    for compensation in ctx.state.compensations.iter().rev() {
        match compensation {
            Compensation::DeleteCopiedImage { image } if ctx.state.failed => {
                reporter.say(&format!("Cleaning up pre-copied image [{image}]"));
                match ctx.api.delete_image(&token, image).await {
                    Ok(()) => reporter.say(&format!("Pre-copied image [{image}] deleted")),
                    Err(e) => {
                        reporter.error(&e.to_string());
                        return;
                    }
                }
            }
            Compensation::PurgeVm { name } if !ctx.state.failed => {
                reporter.say(&format!(
                    "Removing builder VM [{name}] and its configuration"
                ));
                // Best effort: a failed purge is reported, never escalated.
                match ctx.api.purge_vm(&token, name).await {
                    Ok(()) => reporter.say(&format!("Builder VM [{name}] purged")),
                    Err(e) => reporter.error(&e.to_string()),
                }
            }
            _ => {}
        }
    }

    if ctx.state.failed {
        if ctx.state.vm_id.is_empty() {
            reporter.say("Nothing else to clean up: the run failed before the builder VM was deployed");
        } else {
            reporter.say(&format!(
                "Leaving builder VM [{}] in place for inspection",
                builder.vm_name
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::reporter::MemoryReporter;

    /// Step stub that records its execution and returns a fixed outcome.
    struct ScriptedStep {
        name: &'static str,
        outcome: StepOutcome,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Step for ScriptedStep {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&mut self, ctx: &mut RunContext<'_>) -> StepOutcome {
            self.log.lock().unwrap().push(self.name);
            if self.outcome == StepOutcome::Halt {
                return ctx.halt_with(KilnError::Validation {
                    message: format!("{} failed", self.name),
                });
            }
            self.outcome
        }
    }

    fn scripted(
        name: &'static str,
        outcome: StepOutcome,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Box<dyn Step> {
        Box::new(ScriptedStep {
            name,
            outcome,
            log: log.clone(),
        })
    }

    /// Halts without recording an error, to exercise the backstop.
    struct SilentHaltStep;

    #[async_trait]
    impl Step for SilentHaltStep {
        fn name(&self) -> &'static str {
            "silent"
        }

        async fn run(&mut self, _ctx: &mut RunContext<'_>) -> StepOutcome {
            StepOutcome::Halt
        }
    }

    fn test_setup() -> (crate::config::Config, api::Client) {
        let config = crate::config::tests::test_config();
        let client = api::Client::new(&config.api.endpoint).unwrap();
        (config, client)
    }

    #[tokio::test]
    async fn halt_stops_forward_progress() {
        let (config, client) = test_setup();
        let reporter = MemoryReporter::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let runner = Runner::with_steps(
            &config,
            &client,
            &reporter,
            vec![
                scripted("one", StepOutcome::Continue, &log),
                scripted("two", StepOutcome::Halt, &log),
                scripted("three", StepOutcome::Continue, &log),
            ],
        );
        let err = runner.run().await.unwrap_err();

        assert_eq!(*log.lock().unwrap(), vec!["one", "two"]);
        match err {
            KilnError::Validation { message } => assert_eq!(message, "two failed"),
            other => panic!("expected the halting step's error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn skip_advances_to_the_next_step() {
        let (config, client) = test_setup();
        let reporter = MemoryReporter::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let runner = Runner::with_steps(
            &config,
            &client,
            &reporter,
            vec![
                scripted("one", StepOutcome::Skip, &log),
                scripted("two", StepOutcome::Continue, &log),
            ],
        );
        runner.run().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn successful_run_reports_the_image() {
        let (config, client) = test_setup();
        let reporter = MemoryReporter::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let runner = Runner::with_steps(
            &config,
            &client,
            &reporter,
            vec![scripted("only", StepOutcome::Continue, &log)],
        );
        let summary = runner.run().await.unwrap();

        assert_eq!(summary.image.as_deref(), Some("ci-agent.img"));
    }

    #[tokio::test]
    async fn no_create_image_run_reports_no_image() {
        let (mut config, client) = test_setup();
        config.builder.no_create_image = true;
        let reporter = MemoryReporter::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let runner = Runner::with_steps(
            &config,
            &client,
            &reporter,
            vec![scripted("only", StepOutcome::Continue, &log)],
        );
        let summary = runner.run().await.unwrap();

        assert_eq!(summary.image, None);
    }

    #[tokio::test]
    async fn silent_halt_yields_backstop_error() {
        let (config, client) = test_setup();
        let reporter = MemoryReporter::new();

        let runner =
            Runner::with_steps(&config, &client, &reporter, vec![Box::new(SilentHaltStep)]);
        let err = runner.run().await.unwrap_err();

        match err {
            KilnError::Halted { step } => assert_eq!(step, "silent"),
            other => panic!("expected backstop error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_delete_vm_skips_compensations_entirely() {
        let (mut config, client) = test_setup();
        config.builder.no_delete_vm = true;
        let reporter = MemoryReporter::new();

        /// Registers a pre-copy compensation, then halts.
        struct CopyThenHalt;

        #[async_trait]
        impl Step for CopyThenHalt {
            fn name(&self) -> &'static str {
                "copy-then-halt"
            }

            async fn run(&mut self, ctx: &mut RunContext<'_>) -> StepOutcome {
                ctx.state.auth_token = Some("tok".into());
                ctx.state
                    .compensations
                    .push(Compensation::DeleteCopiedImage {
                        image: "ci-agent.img".into(),
                    });
                StepOutcome::Halt
            }
        }

        let runner =
            Runner::with_steps(&config, &client, &reporter, vec![Box::new(CopyThenHalt)]);
        runner.run().await.unwrap_err();

        // No HTTP was attempted: the unreachable endpoint would have
        // surfaced as a reported error.
        assert!(reporter.errors().is_empty());
        let said = reporter.said();
        assert!(said.iter().any(|l| l.contains("no_delete_vm is set")));
        assert!(said.iter().any(|l| l.contains("left in place as well")));
    }
}
