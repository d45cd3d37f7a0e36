//! Authenticate against the VM cluster and stash the bearer token.

use async_trait::async_trait;

use super::{RunContext, Step, StepOutcome};

pub struct AuthStep;

#[async_trait]
impl Step for AuthStep {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    async fn run(&mut self, ctx: &mut RunContext<'_>) -> StepOutcome {
        let api_config = &ctx.config.api;
        ctx.reporter.say(&format!(
            "Logging in to the VM API at [{}]",
            api_config.endpoint
        ));

        match ctx.api.login(&api_config.user, &api_config.password).await {
            Ok(token) => {
                ctx.state.auth_token = Some(token);
                ctx.reporter.say("Logged in");
                StepOutcome::Continue
            }
            Err(e) => ctx.halt_with(e),
        }
    }
}
