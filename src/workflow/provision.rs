//! Hand the deployed VM's SSH endpoint to the provisioning hook.
//!
//! Provisioning itself is not kiln's business: the hook gets the SSH
//! coordinates and does whatever it wants with them. A hook failure is a
//! terminal failure of the run.

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::KilnError;
use crate::reporter::Reporter;

use super::{RunContext, SshEndpoint, Step, StepOutcome};

/// Runs the user's provisioning logic against the deployed builder VM.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(
        &self,
        vm_id: &str,
        endpoint: &SshEndpoint,
        reporter: &dyn Reporter,
    ) -> Result<(), KilnError>;
}

/// Shell-command hook: runs `sh -c <command>` with the endpoint exported
/// as `KILN_SSH_HOST`, `KILN_SSH_PORT` and `KILN_VM_ID`, stdio inherited.
pub struct CommandProvisioner {
    command: String,
}

impl CommandProvisioner {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Provisioner for CommandProvisioner {
    async fn provision(
        &self,
        vm_id: &str,
        endpoint: &SshEndpoint,
        reporter: &dyn Reporter,
    ) -> Result<(), KilnError> {
        reporter.say(&format!("Running provisioning command [{}]", self.command));
        let status = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("KILN_SSH_HOST", &endpoint.host)
            .env("KILN_SSH_PORT", endpoint.port.to_string())
            .env("KILN_VM_ID", vm_id)
            .status()
            .await
            .map_err(|e| KilnError::Provision {
                message: format!("failed to run '{}': {e}", self.command),
            })?;
        if !status.success() {
            return Err(KilnError::Provision {
                message: format!("'{}' exited with {status}", self.command),
            });
        }
        Ok(())
    }
}

/// Step wiring: skips when no hook is configured.
pub struct ProvisionStep {
    provisioner: Option<Box<dyn Provisioner>>,
}

impl ProvisionStep {
    pub fn new(provisioner: Option<Box<dyn Provisioner>>) -> Self {
        Self { provisioner }
    }
}

#[async_trait]
impl Step for ProvisionStep {
    fn name(&self) -> &'static str {
        "provision"
    }

    async fn run(&mut self, ctx: &mut RunContext<'_>) -> StepOutcome {
        let Some(provisioner) = &self.provisioner else {
            ctx.reporter.say("No provisioning configured, skipping");
            return StepOutcome::Skip;
        };
        let Some(endpoint) = ctx.state.ssh_endpoint() else {
            return ctx.halt_with(KilnError::Provision {
                message: "no SSH endpoint published; deploy must run first".into(),
            });
        };
        match provisioner
            .provision(&ctx.state.vm_id, &endpoint, ctx.reporter)
            .await
        {
            Ok(()) => {
                ctx.reporter.say("Provisioning complete");
                StepOutcome::Continue
            }
            Err(e) => ctx.halt_with(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::MemoryReporter;

    fn endpoint() -> SshEndpoint {
        SshEndpoint {
            host: "10.0.0.5".into(),
            port: 2222,
        }
    }

    #[tokio::test]
    async fn command_provisioner_exports_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("env.txt");
        let command = format!(
            "echo \"$KILN_SSH_HOST:$KILN_SSH_PORT:$KILN_VM_ID\" > '{}'",
            out.display()
        );
        let provisioner = CommandProvisioner::new(command);
        let reporter = MemoryReporter::new();

        provisioner
            .provision("vm-1", &endpoint(), &reporter)
            .await
            .unwrap();

        let content = std::fs::read_to_string(&out).unwrap();
        assert_eq!(content.trim(), "10.0.0.5:2222:vm-1");
    }

    #[tokio::test]
    async fn command_provisioner_fails_on_nonzero_exit() {
        let provisioner = CommandProvisioner::new("exit 3");
        let reporter = MemoryReporter::new();

        let err = provisioner
            .provision("vm-1", &endpoint(), &reporter)
            .await
            .unwrap_err();
        match err {
            KilnError::Provision { message } => assert!(message.contains("exit")),
            other => panic!("expected Provision error, got {other:?}"),
        }
    }
}
