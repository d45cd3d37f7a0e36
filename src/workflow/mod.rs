//! Sequential image-baking workflow.
//!
//! A build run is an ordered list of [`Step`]s driven by the runner:
//! authenticate, create and deploy the builder VM, hand its SSH endpoint
//! to the provisioning hook, persist the result as an image. Steps record
//! compensating actions as resources materialize; after the forward pass
//! ends (for any reason) the runner walks those compensations in reverse.

pub mod auth;
pub mod create_image;
pub mod create_vm;
pub mod provision;
pub mod runner;

use async_trait::async_trait;

use crate::api;
use crate::config::Config;
use crate::error::KilnError;
use crate::reporter::Reporter;

// ── Step outcome ────────────────────────────────────────────────────

/// What a step's forward pass decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Work done; advance to the next step.
    Continue,
    /// Terminal failure; stop forward progress and go to cleanup.
    Halt,
    /// Nothing to do for this configuration; advance to the next step.
    Skip,
}

// ── Step trait ──────────────────────────────────────────────────────

/// One stage of the build run.
#[async_trait]
pub trait Step: Send {
    /// Name used in logs and the halt backstop error.
    fn name(&self) -> &'static str;

    async fn run(&mut self, ctx: &mut RunContext<'_>) -> StepOutcome;
}

// ── Compensations ───────────────────────────────────────────────────

/// Cleanup actions registered as resources materialize. Cleanup walks
/// the list in reverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Remove the pre-copied destination image. Fires only when the run
    /// failed; on success the copy is the build product.
    DeleteCopiedImage { image: String },
    /// Purge the builder VM and its configuration. Fires only when the
    /// run succeeded; a failed run's VM stays up for inspection.
    PurgeVm { name: String },
}

// ── Run state ───────────────────────────────────────────────────────

/// SSH coordinates published for the provisioning hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshEndpoint {
    pub host: String,
    pub port: u16,
}

/// Everything a run accumulates.
#[derive(Debug, Default)]
pub struct RunState {
    /// Bearer token, set once authentication succeeds.
    pub auth_token: Option<String>,
    /// Non-empty iff deploy succeeded. Consumers must check for emptiness.
    pub vm_id: String,
    pub ssh_host: Option<String>,
    pub ssh_port: Option<u16>,
    /// Set by the runner when any step halts. Once true, no further
    /// forward steps execute.
    pub failed: bool,
    /// First terminal error of the run.
    pub error: Option<KilnError>,
    pub compensations: Vec<Compensation>,
}

impl RunState {
    pub fn ssh_endpoint(&self) -> Option<SshEndpoint> {
        match (&self.ssh_host, self.ssh_port) {
            (Some(host), Some(port)) => Some(SshEndpoint {
                host: host.clone(),
                port,
            }),
            _ => None,
        }
    }
}

// ── Run context ─────────────────────────────────────────────────────

/// Explicit context handed to every step: configuration, API access, the
/// reporting sink, and the run's accumulated state.
pub struct RunContext<'a> {
    pub config: &'a Config,
    pub api: &'a api::Client,
    pub reporter: &'a dyn Reporter,
    pub state: RunState,
}

impl RunContext<'_> {
    /// Report a terminal error, record the first one, and halt.
    pub fn halt_with(&mut self, error: KilnError) -> StepOutcome {
        self.reporter.error(&error.to_string());
        if self.state.error.is_none() {
            self.state.error = Some(error);
        }
        StepOutcome::Halt
    }
}
