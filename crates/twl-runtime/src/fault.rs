#![forbid(unsafe_code)]

//! Failure isolation: per-module health and the system fallback state.
//!
//! # State Machine
//!
//! ```text
//! per module:  Healthy --render/init failure--> Degraded
//!              Degraded --next successful render--> Healthy
//!
//! system:      Healthy --init failure--> Fallback   (terminal)
//! ```
//!
//! A degraded module's layer is omitted and an inline notice is kept for
//! its panel; every other module continues normally. `Fallback` bypasses
//! orchestration for the rest of the session - recovery from it requires
//! a full reload, which is outside this layer.
//!
//! Every transition emits a structured tracing event and updates the
//! degrade/recover counters, so the escalation history is reconstructible
//! from logs alone.

use std::fmt;

use ahash::AHashMap;
use tracing::{error, info, warn};

use crate::module::ModuleId;

/// Health of a single module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleHealth {
    /// Rendering normally.
    #[default]
    Healthy,
    /// Last render or init failed; layer omitted.
    Degraded,
}

impl ModuleHealth {
    /// Stable string for log output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
        }
    }
}

/// Health of the orchestration layer as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemHealth {
    /// Orchestration is in charge.
    #[default]
    Healthy,
    /// Orchestration is bypassed in favor of the static configuration.
    /// Terminal for the session.
    Fallback,
}

impl SystemHealth {
    /// Stable string for log output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Fallback => "fallback",
        }
    }
}

/// Decision made for one health observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthDecision {
    /// No transition.
    Hold,
    /// Module moved `Healthy -> Degraded`.
    Degrade,
    /// Module moved `Degraded -> Healthy`.
    Recover,
}

impl HealthDecision {
    /// Stable string for log output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hold => "hold",
            Self::Degrade => "degrade",
            Self::Recover => "recover",
        }
    }
}

/// Record emitted for each health decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthEvidence {
    /// The observed module.
    pub module: ModuleId,
    /// Decision taken.
    pub decision: HealthDecision,
    /// Health before the observation.
    pub before: ModuleHealth,
    /// Health after the observation.
    pub after: ModuleHealth,
    /// Failure message, for degradations.
    pub message: Option<String>,
}

/// Tracks per-module and system health.
#[derive(Debug, Default)]
pub struct HealthTracker {
    states: AHashMap<ModuleId, ModuleHealth>,
    notices: AHashMap<ModuleId, String>,
    system: SystemHealth,
    total_degrades: u64,
    total_recoveries: u64,
    last_evidence: Option<HealthEvidence>,
}

impl HealthTracker {
    /// Create a tracker with every module healthy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A module's render or init failed.
    ///
    /// Returns `Degrade` on the `Healthy -> Degraded` transition and
    /// `Hold` if the module was already degraded (the notice is updated
    /// either way).
    pub fn mark_failure(&mut self, id: &ModuleId, message: impl Into<String>) -> HealthDecision {
        let message = message.into();
        let before = self.module(id);
        let decision = match before {
            ModuleHealth::Healthy => {
                self.states.insert(id.clone(), ModuleHealth::Degraded);
                self.total_degrades += 1;
                warn!(module = %id, %message, "module degraded");
                HealthDecision::Degrade
            }
            ModuleHealth::Degraded => HealthDecision::Hold,
        };
        self.notices.insert(id.clone(), message.clone());
        self.record(id, decision, before, Some(message));
        decision
    }

    /// A module rendered successfully.
    ///
    /// Returns `Recover` on the `Degraded -> Healthy` transition.
    pub fn mark_success(&mut self, id: &ModuleId) -> HealthDecision {
        let before = self.module(id);
        let decision = match before {
            ModuleHealth::Degraded => {
                self.states.insert(id.clone(), ModuleHealth::Healthy);
                self.notices.remove(id);
                self.total_recoveries += 1;
                info!(module = %id, "module recovered");
                HealthDecision::Recover
            }
            ModuleHealth::Healthy => HealthDecision::Hold,
        };
        if decision != HealthDecision::Hold {
            self.record(id, decision, before, None);
        }
        decision
    }

    /// Current health of a module (healthy if never observed).
    #[must_use]
    pub fn module(&self, id: &ModuleId) -> ModuleHealth {
        self.states.get(id).copied().unwrap_or_default()
    }

    /// Whether a module is degraded.
    #[must_use]
    pub fn is_degraded(&self, id: &ModuleId) -> bool {
        self.module(id) == ModuleHealth::Degraded
    }

    /// The inline notice for a degraded module's panel.
    #[must_use]
    pub fn notice(&self, id: &ModuleId) -> Option<&str> {
        self.notices.get(id).map(String::as_str)
    }

    /// Declare system fallback. Idempotent; the state is terminal.
    pub fn declare_fallback(&mut self, reason: &str) {
        if self.system == SystemHealth::Fallback {
            return;
        }
        self.system = SystemHealth::Fallback;
        error!(reason, "orchestration bypassed; static configuration in effect");
    }

    /// Current system health.
    #[must_use]
    pub fn system(&self) -> SystemHealth {
        self.system
    }

    /// Total `Healthy -> Degraded` transitions observed.
    #[must_use]
    pub fn total_degrades(&self) -> u64 {
        self.total_degrades
    }

    /// Total `Degraded -> Healthy` transitions observed.
    #[must_use]
    pub fn total_recoveries(&self) -> u64 {
        self.total_recoveries
    }

    /// The most recent evidence record.
    #[must_use]
    pub fn last_evidence(&self) -> Option<&HealthEvidence> {
        self.last_evidence.as_ref()
    }

    fn record(
        &mut self,
        id: &ModuleId,
        decision: HealthDecision,
        before: ModuleHealth,
        message: Option<String>,
    ) {
        self.last_evidence = Some(HealthEvidence {
            module: id.clone(),
            decision,
            before,
            after: self.module(id),
            message,
        });
    }
}

impl fmt::Display for HealthEvidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({} -> {})",
            self.module,
            self.decision.as_str(),
            self.before.as_str(),
            self.after.as_str()
        )
    }
}
