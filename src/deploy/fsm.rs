//! Phase machine for deployment runs.
//!
//! A plan is an ordered table of steps. Each step names the phase it drives,
//! the checkpoint emitted when it starts, an optional checkpoint emitted when
//! it finishes, and what a failure means for the run.

use crate::models::DeploymentKind;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Building,
    Packaging,
    Connecting,
    Transferring,
    Installing,
    StartingService,
    InstallingProxy,
    ConfiguringProxy,
    ProvisioningTls,
    Completed,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Building => "building",
            Self::Packaging => "packaging",
            Self::Connecting => "connecting",
            Self::Transferring => "transferring",
            Self::Installing => "installing",
            Self::StartingService => "starting_service",
            Self::InstallingProxy => "installing_proxy",
            Self::ConfiguringProxy => "configuring_proxy",
            Self::ProvisioningTls => "provisioning_tls",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub message: &'static str,
    pub percentage: u8,
}

const fn checkpoint(message: &'static str, percentage: u8) -> Checkpoint {
    Checkpoint {
        message,
        percentage,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Failure ends the run.
    Fatal,
    /// Failure becomes a warning plus a hint line; the run goes on.
    Advisory {
        warning: &'static str,
        hint: &'static str,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub phase: Phase,
    pub start: Checkpoint,
    pub finish: Option<Checkpoint>,
    pub policy: FailurePolicy,
}

const fn fatal(phase: Phase, start: Checkpoint, finish: Option<Checkpoint>) -> Step {
    Step {
        phase,
        start,
        finish,
        policy: FailurePolicy::Fatal,
    }
}

const TLS_ADVISORY: FailurePolicy = FailurePolicy::Advisory {
    warning: "SSL certificate setup warning",
    hint: "You may need to configure DNS first and retry: sudo certbot --nginx",
};

#[derive(Debug)]
pub struct Plan {
    pub kind: DeploymentKind,
    pub opening: Checkpoint,
    pub steps: &'static [Step],
    pub closing: Checkpoint,
    /// Prefix of the `error` event when a fatal step fails.
    pub failure_prefix: &'static str,
}

impl Plan {
    pub fn for_kind(kind: DeploymentKind) -> &'static Plan {
        match kind {
            DeploymentKind::Deployment => &FULL_DEPLOY,
            DeploymentKind::NginxConfig => &NGINX_SETUP,
        }
    }

    /// Every percentage the plan can emit, in emission order.
    pub fn checkpoints(&self) -> Vec<u8> {
        let mut out = vec![self.opening.percentage];
        for step in self.steps {
            out.push(step.start.percentage);
            if let Some(finish) = step.finish {
                out.push(finish.percentage);
            }
        }
        out.push(self.closing.percentage);
        out
    }

    pub fn includes(&self, phase: Phase) -> bool {
        self.steps.iter().any(|step| step.phase == phase)
    }
}

pub static FULL_DEPLOY: Plan = Plan {
    kind: DeploymentKind::Deployment,
    opening: checkpoint("Initializing", 5),
    steps: &[
        fatal(
            Phase::Building,
            checkpoint("Building frontend and backend", 20),
            Some(checkpoint("Build complete", 40)),
        ),
        fatal(
            Phase::Packaging,
            checkpoint("Creating deployment archive", 50),
            Some(checkpoint("Archive created", 60)),
        ),
        fatal(Phase::Connecting, checkpoint("Connecting to VPS", 65), None),
        fatal(
            Phase::Transferring,
            checkpoint("Transferring files to VPS", 70),
            Some(checkpoint("Files transferred", 80)),
        ),
        fatal(Phase::Installing, checkpoint("Installing dependencies", 85), None),
        fatal(
            Phase::StartingService,
            checkpoint("Setting up application", 90),
            None,
        ),
        fatal(
            Phase::ConfiguringProxy,
            checkpoint("Configuring web server", 95),
            None,
        ),
        Step {
            phase: Phase::ProvisioningTls,
            start: checkpoint("Installing SSL certificate", 98),
            finish: None,
            policy: TLS_ADVISORY,
        },
    ],
    closing: checkpoint("Deployment complete", 100),
    failure_prefix: "Deployment failed",
};

pub static NGINX_SETUP: Plan = Plan {
    kind: DeploymentKind::NginxConfig,
    opening: checkpoint("Starting nginx and SSL setup...", 0),
    steps: &[
        fatal(Phase::Connecting, checkpoint("Connecting to VPS", 10), None),
        fatal(
            Phase::InstallingProxy,
            checkpoint("Installing nginx and certbot", 30),
            None,
        ),
        fatal(
            Phase::ConfiguringProxy,
            checkpoint("Executing nginx setup", 50),
            None,
        ),
        Step {
            phase: Phase::ProvisioningTls,
            start: checkpoint("Setting up SSL certificate", 80),
            finish: None,
            policy: TLS_ADVISORY,
        },
    ],
    closing: checkpoint("Setup complete", 100),
    failure_prefix: "Setup failed",
};

/// Cursor over a plan. Moves forward only, ends in `Completed` or `Failed`.
#[derive(Debug)]
pub struct RunMachine {
    plan: &'static Plan,
    next: usize,
    phase: Phase,
}

impl RunMachine {
    pub fn new(plan: &'static Plan) -> Self {
        Self {
            plan,
            next: 0,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Enter the next step. `None` once the table is exhausted or the run is terminal.
    pub fn advance(&mut self) -> Option<&'static Step> {
        if self.phase.is_terminal() {
            return None;
        }
        let step = self.plan.steps.get(self.next)?;
        self.next += 1;
        self.phase = step.phase;
        Some(step)
    }

    pub fn fail(&mut self) {
        self.phase = Phase::Failed;
    }

    /// Only valid after the last step; earlier calls leave the phase alone.
    pub fn complete(&mut self) -> bool {
        if self.phase == Phase::Failed || self.next < self.plan.steps.len() {
            return false;
        }
        self.phase = Phase::Completed;
        true
    }
}
