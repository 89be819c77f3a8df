//! Disaster-Recovery Protocol state machine.
//!
//! Drives NORMAL / DEGRADED / DEFENSIVE / EMERGENCY / RECOVERY / HIBERNATE
//! transitions from the DQS, hard-gate outcomes and infrastructure faults.
//! Recovery from EMERGENCY goes through a cause-dependent warm-up during
//! which new entries stay blocked; excessive flapping between strict states
//! parks the engine in HIBERNATE until the timer expires and an operator
//! acknowledges.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::DrpConfig;
use crate::domain::DrpState;

/// Why an EMERGENCY was entered; sets the warm-up length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmergencyCause {
    DataGlitch,
    Liquidity,
    Depeg,
    Other,
}

/// External conditions evaluated on every bar/decision.
#[derive(Debug, Clone, Copy)]
pub struct DrpInputs {
    pub dqs: f64,
    pub hard_gate_triggered: bool,
    /// Composite crisis index in [0, 1].
    pub crisis_index: f64,
    pub compounding_violation: bool,
    pub reservation_expired_fill: bool,
    pub adl_critical: bool,
    /// Lift the target to at least DEFENSIVE (stale correlation matrix,
    /// degraded ancillary infrastructure).
    pub defensive_floor: bool,
    pub atr_z_short: f64,
    pub emergency_cause: Option<EmergencyCause>,
    /// A bar closed cleanly since the last evaluation (decrements warm-up).
    pub successful_bar_completed: bool,
    /// Operator acknowledged the hibernate incident.
    pub operator_ack: bool,
    pub now_ms: i64,
}

/// Result of one transition evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrpTransition {
    pub previous_state: DrpState,
    pub new_state: DrpState,
    pub warmup_bars_remaining: u32,
    pub flap_count: u32,
    pub hibernate_until_ts_ms: Option<i64>,
    pub transition_occurred: bool,
    pub reason: &'static str,
}

/// DRP state machine with sliding-window anti-flapping.
#[derive(Debug, Clone)]
pub struct DrpStateMachine {
    cfg: DrpConfig,
    state: DrpState,
    warmup_bars_remaining: u32,
    hibernate_until_ts_ms: Option<i64>,
    /// Cause recorded at EMERGENCY entry; sets the recovery warm-up length.
    last_emergency_cause: Option<EmergencyCause>,
    /// Timestamps of recent strict-state transitions.
    transition_history: Vec<i64>,
}

impl DrpStateMachine {
    pub fn new(cfg: DrpConfig) -> Self {
        Self {
            cfg,
            state: DrpState::Normal,
            warmup_bars_remaining: 0,
            hibernate_until_ts_ms: None,
            last_emergency_cause: None,
            transition_history: Vec::new(),
        }
    }

    /// Rebuild from a persisted portfolio snapshot.
    pub fn restore(
        cfg: DrpConfig,
        state: DrpState,
        warmup_bars_remaining: u32,
        hibernate_until_ts_ms: Option<i64>,
    ) -> Self {
        Self {
            cfg,
            state,
            warmup_bars_remaining,
            hibernate_until_ts_ms,
            last_emergency_cause: None,
            transition_history: Vec::new(),
        }
    }

    pub fn state(&self) -> DrpState {
        self.state
    }

    pub fn warmup_bars_remaining(&self) -> u32 {
        self.warmup_bars_remaining
    }

    /// Evaluate one step of the protocol.
    pub fn evaluate(&mut self, inputs: &DrpInputs) -> DrpTransition {
        let previous = self.state;

        // HIBERNATE holds until the timer expires AND the operator acks.
        if self.state == DrpState::Hibernate {
            let expired = self
                .hibernate_until_ts_ms
                .map(|until| inputs.now_ms >= until)
                .unwrap_or(false);
            if expired && inputs.operator_ack {
                self.state = DrpState::Normal;
                self.hibernate_until_ts_ms = None;
                self.transition_history.clear();
                info!(target: "riskgate::drp", "hibernate released by operator ack");
                return self.result(previous, true, "hibernate_released");
            }
            return self.result(previous, false, "in_hibernate");
        }

        let target = self.target_state(inputs);

        // RECOVERY: run the warm-up down, re-escalate on fresh emergencies.
        if self.state == DrpState::Recovery {
            if target == DrpState::Emergency {
                self.last_emergency_cause = inputs.emergency_cause;
                self.warmup_bars_remaining = self.warmup_bars(inputs.emergency_cause);
                return self.enter_strict(previous, DrpState::Emergency, inputs, "emergency_during_recovery");
            }
            if inputs.successful_bar_completed && self.warmup_bars_remaining > 0 {
                self.warmup_bars_remaining -= 1;
            }
            if self.warmup_bars_remaining == 0 && target == DrpState::Normal {
                self.state = DrpState::Normal;
                self.note_transition(previous, DrpState::Normal, inputs);
                if self.flap_count() >= self.cfg.flap_to_hibernate_threshold {
                    return self.enter_hibernate(previous, inputs);
                }
                return self.result(previous, true, "warmup_completed");
            }
            return self.result(previous, false, "in_warmup");
        }

        // EMERGENCY clears into RECOVERY once the cause is gone.
        if self.state == DrpState::Emergency {
            if target != DrpState::Emergency {
                // warm-up length derives from what caused the emergency
                self.warmup_bars_remaining = self.warmup_bars(self.last_emergency_cause);
                self.state = DrpState::Recovery;
                self.note_transition(previous, DrpState::Recovery, inputs);
                if self.flap_count() >= self.cfg.flap_to_hibernate_threshold {
                    return self.enter_hibernate(previous, inputs);
                }
                info!(
                    target: "riskgate::drp",
                    warmup_bars = self.warmup_bars_remaining,
                    "emergency cleared, entering recovery"
                );
                return self.result(previous, true, "emergency_to_recovery");
            }
            return self.result(previous, false, "in_emergency");
        }

        // Escalation into EMERGENCY from any non-strict state.
        if target == DrpState::Emergency {
            self.last_emergency_cause = inputs.emergency_cause;
            self.warmup_bars_remaining = self.warmup_bars(inputs.emergency_cause);
            return self.enter_strict(previous, DrpState::Emergency, inputs, "to_emergency");
        }

        // NORMAL <-> DEFENSIVE moves.
        if target != self.state && matches!(target, DrpState::Normal | DrpState::Defensive) {
            self.state = target;
            self.note_transition(previous, target, inputs);
            if self.flap_count() >= self.cfg.flap_to_hibernate_threshold {
                return self.enter_hibernate(previous, inputs);
            }
            return self.result(previous, true, "dqs_based_transition");
        }

        self.result(previous, false, "no_transition")
    }

    /// Force EMERGENCY from an out-of-band infrastructure fault.
    pub fn force_emergency(&mut self, cause: EmergencyCause, now_ms: i64) -> DrpTransition {
        let previous = self.state;
        error!(target: "riskgate::drp", ?cause, "forced EMERGENCY");
        self.last_emergency_cause = Some(cause);
        self.warmup_bars_remaining = self.warmup_bars(Some(cause));
        self.state = DrpState::Emergency;
        self.transition_history.push(now_ms);
        self.result(previous, previous != DrpState::Emergency, "forced_emergency")
    }

    /// Force HIBERNATE (risk-floor trigger, repeated infra faults).
    pub fn force_hibernate(&mut self, now_ms: i64) -> DrpTransition {
        let previous = self.state;
        self.state = DrpState::Hibernate;
        self.hibernate_until_ts_ms =
            Some(now_ms + (self.cfg.hibernate_min_duration_sec * 1_000.0) as i64);
        error!(target: "riskgate::drp", %previous, "forced HIBERNATE");
        self.result(previous, previous != DrpState::Hibernate, "forced_hibernate")
    }

    /// Force DEFENSIVE unless a stricter state already holds.
    ///
    /// Advisory escalations (stale correlation matrix, repeated heartbeat
    /// loss) do not count toward the flap window; they can recur every
    /// decision without parking the engine in HIBERNATE.
    pub fn force_defensive(&mut self, _now_ms: i64) -> DrpTransition {
        let previous = self.state;
        if self.state.priority() < DrpState::Defensive.priority() {
            self.state = DrpState::Defensive;
            return self.result(previous, true, "forced_defensive");
        }
        self.result(previous, false, "already_stricter")
    }

    fn target_state(&self, inputs: &DrpInputs) -> DrpState {
        if inputs.hard_gate_triggered
            || inputs.compounding_violation
            || inputs.reservation_expired_fill
            || inputs.adl_critical
            || inputs.crisis_index >= self.cfg.crisis_emergency_threshold
            || inputs.dqs < self.cfg.dqs_emergency_threshold
        {
            return DrpState::Emergency;
        }
        if inputs.dqs < self.cfg.dqs_degraded_threshold || inputs.defensive_floor {
            DrpState::Defensive
        } else {
            DrpState::Normal
        }
    }

    fn warmup_bars(&self, cause: Option<EmergencyCause>) -> u32 {
        match cause.unwrap_or(EmergencyCause::Other) {
            EmergencyCause::DataGlitch => self.cfg.warmup_bars_data_glitch,
            EmergencyCause::Liquidity => self.cfg.warmup_bars_liquidity,
            EmergencyCause::Depeg => self.cfg.warmup_bars_depeg,
            EmergencyCause::Other => {
                let bars =
                    self.cfg.warmup_bars_base + (self.cfg.recovery_hold_minutes / 60.0).floor() as u32;
                bars.clamp(self.cfg.warmup_bars_min, self.cfg.warmup_bars_max)
            }
        }
    }

    fn enter_strict(
        &mut self,
        previous: DrpState,
        state: DrpState,
        inputs: &DrpInputs,
        reason: &'static str,
    ) -> DrpTransition {
        self.state = state;
        self.note_transition(previous, state, inputs);
        if self.flap_count() >= self.cfg.flap_to_hibernate_threshold {
            return self.enter_hibernate(previous, inputs);
        }
        error!(target: "riskgate::drp", %previous, new = %state, reason, "strict transition");
        self.result(previous, true, reason)
    }

    fn enter_hibernate(&mut self, previous: DrpState, inputs: &DrpInputs) -> DrpTransition {
        self.state = DrpState::Hibernate;
        self.hibernate_until_ts_ms =
            Some(inputs.now_ms + (self.cfg.hibernate_min_duration_sec * 1_000.0) as i64);
        error!(
            target: "riskgate::drp",
            flap_count = self.flap_count(),
            until = ?self.hibernate_until_ts_ms,
            "anti-flapping: entering HIBERNATE"
        );
        self.result(previous, true, "anti_flapping_hibernate")
    }

    /// Record a transition in the flap window if either endpoint is strict.
    fn note_transition(&mut self, from: DrpState, to: DrpState, inputs: &DrpInputs) {
        if from == to || (!from.is_strict() && !to.is_strict()) {
            return;
        }
        // window tightens when short-horizon volatility spikes
        let window_minutes = (self.cfg.flap_window_minutes_base / inputs.atr_z_short.max(1.0))
            .clamp(self.cfg.flap_window_minutes_min, self.cfg.flap_window_minutes_max);
        let cutoff = inputs.now_ms - (window_minutes * 60_000.0) as i64;
        self.transition_history.push(inputs.now_ms);
        self.transition_history.retain(|&ts| ts >= cutoff);
    }

    fn flap_count(&self) -> u32 {
        self.transition_history.len() as u32
    }

    fn result(&self, previous: DrpState, occurred: bool, reason: &'static str) -> DrpTransition {
        DrpTransition {
            previous_state: previous,
            new_state: self.state,
            warmup_bars_remaining: self.warmup_bars_remaining,
            flap_count: self.flap_count(),
            hibernate_until_ts_ms: self.hibernate_until_ts_ms,
            transition_occurred: occurred,
            reason,
        }
    }
}
