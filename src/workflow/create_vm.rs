//! Create and deploy the builder VM.
//!
//! Optionally pre-copies the source image first, so the builder VM boots
//! from (and mutates) the copy instead of the pristine source. Publishes
//! the deployed VM's id and SSH coordinates into the run state.

use async_trait::async_trait;

use crate::error::KilnError;

use super::{Compensation, RunContext, Step, StepOutcome};

pub struct CreateVmStep;

#[async_trait]
impl Step for CreateVmStep {
    fn name(&self) -> &'static str {
        "create-vm"
    }

    async fn run(&mut self, ctx: &mut RunContext<'_>) -> StepOutcome {
        let Some(token) = ctx.state.auth_token.clone() else {
            return ctx.halt_with(KilnError::Validation {
                message: "no auth token; authenticate must run first".into(),
            });
        };
        let config = ctx.config;
        let image = &config.image;
        let builder = &config.builder;

        // When pre-copy runs, the copy becomes the boot image.
        let mut boot_image = image.source.clone();
        if image.precopy && builder.no_create_image {
            ctx.reporter
                .say("Skipping source image pre-copy because no_create_image is set");
        } else if image.precopy {
            ctx.reporter.say(&format!(
                "Pre-copying source image [{}] to [{}] (this can take a while)",
                image.source, image.destination
            ));
            // An attempted copy can leave an image behind, so the
            // compensation is registered before the result is known.
            ctx.state
                .compensations
                .push(Compensation::DeleteCopiedImage {
                    image: image.destination.clone(),
                });
            if let Err(e) = ctx
                .api
                .copy_image(&token, &image.source, &image.destination)
                .await
            {
                return ctx.halt_with(e);
            }
            ctx.reporter.say(&format!(
                "Builder VM will boot from pre-copied image [{}]",
                image.destination
            ));
            boot_image = image.destination.clone();
        } else {
            ctx.reporter.say(&format!(
                "Builder VM will boot from base image [{}]",
                image.source
            ));
        }

        ctx.reporter.say(&format!(
            "Creating builder VM configuration [{}]",
            builder.vm_name
        ));
        if let Err(e) = ctx
            .api
            .create_vm(&token, &builder.vm_name, &boot_image, builder.cpu_cores)
            .await
        {
            return ctx.halt_with(e);
        }

        ctx.reporter
            .say(&format!("Deploying builder VM [{}]", builder.vm_name));
        let deployed = match ctx.api.deploy_vm(&token, &builder.vm_name).await {
            Ok(d) => d,
            Err(e) => return ctx.halt_with(e),
        };
        if deployed.vm_id.is_empty() {
            return ctx.halt_with(KilnError::Parse {
                what: "deploy response".into(),
                message: "vmId missing or empty".into(),
            });
        }
        let port = match parse_ssh_port(&deployed.ssh_port) {
            Ok(p) => p,
            Err(e) => return ctx.halt_with(e),
        };

        ctx.state.vm_id = deployed.vm_id;
        ctx.state.ssh_host = Some(deployed.ip.clone());
        ctx.state.ssh_port = Some(port);
        ctx.state.compensations.push(Compensation::PurgeVm {
            name: builder.vm_name.clone(),
        });

        ctx.reporter
            .say(&format!("Created VM [{}]", ctx.state.vm_id));
        ctx.reporter.say(&format!(
            "SSH server available at [{}:{}]",
            deployed.ip, port
        ));

        StepOutcome::Continue
    }
}

fn parse_ssh_port(raw: &str) -> Result<u16, KilnError> {
    raw.parse().map_err(|_| KilnError::Parse {
        what: "deploy response".into(),
        message: format!("sshPort '{raw}' is not a valid port number"),
    })
}
