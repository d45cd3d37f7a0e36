//! Persist the provisioned VM as an image.
//!
//! Two modes: with pre-copy the VM's disk state is committed back onto
//! the copied boot image; without it the state is saved as a new named
//! image. A refused commit is reported but does not fail the run (the
//! builder VM still holds the state); a refused save does.

use async_trait::async_trait;

use crate::error::KilnError;

use super::{RunContext, Step, StepOutcome};

pub struct CreateImageStep;

#[async_trait]
impl Step for CreateImageStep {
    fn name(&self) -> &'static str {
        "create-image"
    }

    async fn run(&mut self, ctx: &mut RunContext<'_>) -> StepOutcome {
        if ctx.config.builder.no_create_image {
            ctx.reporter
                .say("Skipping image creation because no_create_image is set");
            return StepOutcome::Skip;
        }

        let Some(token) = ctx.state.auth_token.clone() else {
            return ctx.halt_with(KilnError::Validation {
                message: "no auth token; authenticate must run first".into(),
            });
        };
        if ctx.state.vm_id.is_empty() {
            return ctx.halt_with(KilnError::Validation {
                message: "no deployed VM; create-vm must run first".into(),
            });
        }

        let destination = &ctx.config.image.destination;
        if ctx.config.image.precopy {
            ctx.reporter.say(&format!(
                "Committing changes onto pre-copied image [{destination}] (this can take a few minutes)"
            ));
            match ctx.api.commit_image(&token, &ctx.state.vm_id).await {
                Ok(message) => {
                    ctx.reporter.say(&ack_line("Image committed", &message));
                    StepOutcome::Continue
                }
                Err(e @ KilnError::Response { .. }) => {
                    // A commit refusal leaves the builder VM as the only
                    // holder of the provisioned state; the run still
                    // finishes and cleans up normally.
                    ctx.reporter.error(&e.to_string());
                    StepOutcome::Continue
                }
                Err(e) => ctx.halt_with(e),
            }
        } else {
            ctx.reporter.say(&format!(
                "Saving new image [{destination}] (this can take a few minutes)"
            ));
            match ctx
                .api
                .save_image(&token, &ctx.state.vm_id, destination)
                .await
            {
                Ok(message) => {
                    ctx.reporter.say(&ack_line("Image saved", &message));
                    StepOutcome::Continue
                }
                Err(e) => ctx.halt_with(e),
            }
        }
    }
}

fn ack_line(action: &str, message: &str) -> String {
    if message.is_empty() {
        action.to_string()
    } else {
        format!("{action}: {message}")
    }
}
