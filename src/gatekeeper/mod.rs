//! The Gatekeeper: a fixed-order chain of admission gates answering one
//! question per signal - may this order be sent, and at what size?
//!
//! The decision path is logically single-threaded per signal and pure
//! against its input snapshots: no I/O, no awaits, no portfolio mutation.
//! Gate 16 places a scalar reservation; everything else only reads.
//!
//! Chain: 0 warm-up/DQS -> 1 kill-switch -> 2 regime -> 3 compatibility ->
//! 4 sanity -> 5 pre-sizing -> 6 MLE (SHADOW exits here) -> 7 liquidity ->
//! 8 gap/glitch -> 9 funding -> 10 basis/exposure -> 11 net RR ->
//! 12 bankruptcy -> 13 sequential risk -> 14 sizing -> 15 impact ->
//! 16 reservation -> 17 actual risk. Gate 18 (partial fills) runs after the
//! first fill through [`Gatekeeper::evaluate_partial_fill`].

mod decision;
pub mod gates;

pub use decision::{
    AdmissionDecision, DecisionDiagnostics, FundingDiagnostics, GateId, GateTrace, RejectReason,
    RemDiagnostics,
};
pub use gates::{GlitchSeverity, PartialFillDecision, PartialFillInputs, PricePoint};

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::config::EngineConfig;
use crate::corr::CorrMatrixSnapshot;
use crate::domain::{BaselineClass, EngineSignal, MarketState, MleOutput, MrcResult, PortfolioState};
use crate::drp::{DrpStateMachine, EmergencyCause};
use crate::errors::DomainViolation;
use crate::reservation::{OrderType, ReservationLedger};

/// Rolling KPI sample used by the Kelly cap.
#[derive(Debug, Clone, Copy)]
pub struct KpiStats {
    pub win_rate: f64,
    pub avg_rr: f64,
    /// Sample large and stable enough to trust.
    pub valid: bool,
}

/// Everything one admission decision reads, frozen at intake.
pub struct GateInputs<'a> {
    pub mrc: MrcResult,
    pub baseline: BaselineClass,
    pub signal: &'a EngineSignal,
    pub mle: Option<&'a MleOutput>,
    pub market: &'a MarketState,
    pub portfolio: &'a PortfolioState,
    pub corr: Option<&'a CorrMatrixSnapshot>,
    pub price_history: &'a [PricePoint],
    pub kpi: Option<KpiStats>,
    pub conflict_count_in_window: u32,
    pub crisis_index: f64,
    /// Snapshot-registry latch: a market timestamp outran the logical clock.
    /// Floors the DRP target at DEFENSIVE through gate 0.
    pub clock_behind_market: bool,
    pub snapshot_id: u64,
    pub logical_clock_ms: i64,
    pub now_ms: i64,
    pub cluster_id: u32,
    pub order_type: OrderType,
    pub operator_ack: bool,
    pub successful_bar_completed: bool,
    pub writer_queue_depth: usize,
    pub orphan_sweep_in_progress: bool,
    /// Milliseconds already spent on this decision when gate 16 runs.
    pub preexec_elapsed_ms: i64,
}

/// The admission pipeline.
pub struct Gatekeeper {
    cfg: Arc<EngineConfig>,
    drp: DrpStateMachine,
    ledger: Arc<Mutex<ReservationLedger>>,
    /// Consecutive sub-floor admissions; trips the hibernation trigger.
    low_risk_streak: u32,
}

impl Gatekeeper {
    pub fn new(cfg: Arc<EngineConfig>, ledger: Arc<Mutex<ReservationLedger>>) -> Self {
        let drp = DrpStateMachine::new(cfg.drp.clone());
        Self {
            cfg,
            drp,
            ledger,
            low_risk_streak: 0,
        }
    }

    /// Current DRP state (for telemetry and the writer).
    pub fn drp_state(&self) -> crate::domain::DrpState {
        self.drp.state()
    }

    /// Out-of-band EMERGENCY escalation (infra faults, expired-fill events).
    pub fn force_emergency(&mut self, cause: EmergencyCause, now_ms: i64) {
        self.drp.force_emergency(cause, now_ms);
    }

    /// Numerical domain violation observed outside the chain (equity
    /// tracker, KPI replay): EMERGENCY plus a standing reject.
    pub fn record_domain_violation(&mut self, violation: &DomainViolation, now_ms: i64) {
        tracing::error!(target: "riskgate::gatekeeper", %violation, "domain violation");
        self.drp.force_emergency(EmergencyCause::Other, now_ms);
    }

    /// Evaluate one entry signal against frozen snapshots.
    pub fn evaluate_entry_signal(&mut self, inp: &GateInputs<'_>) -> AdmissionDecision {
        let cfg = Arc::clone(&self.cfg);
        let mut st = DecisionDiagnostics {
            config_version: cfg.config_version,
            snapshot_id: inp.snapshot_id,
            portfolio_id: inp.portfolio.portfolio_id,
            logical_clock_ms: inp.logical_clock_ms,
            regime_risk_mult: 1.0,
            liquidity_mult: 1.0,
            ..Default::default()
        };

        // snapshot age check precedes everything: a stale snapshot admits nothing
        if inp.now_ms - inp.market.ts_utc_ms > cfg.snapshot_max_age_ms {
            st.trace.push(GateTrace {
                gate: GateId::G00WarmupDqs,
                blocked: true,
                reason: Some(RejectReason::SnapshotStaleBlock),
                risk_mult: None,
            });
            return AdmissionDecision::rejected(RejectReason::SnapshotStaleBlock, st);
        }

        // correlation snapshot staleness floors the DRP target at DEFENSIVE
        // (through gate 0) and degrades the risk multiplier in gate 13
        st.corr_matrix_stale = match inp.corr {
            Some(snap) => !snap.usable_at(inp.now_ms, cfg.corr.matrix_max_age_sec),
            None => true,
        };

        macro_rules! gate {
            ($id:expr, $risk_mult:expr, $eval:expr) => {{
                let result: Result<(), RejectReason> = $eval;
                match result {
                    Ok(()) => {
                        let risk_mult = $risk_mult(&st);
                        st.trace.push(GateTrace {
                            gate: $id,
                            blocked: false,
                            reason: None,
                            risk_mult,
                        });
                    }
                    Err(reason) => {
                        st.trace.push(GateTrace {
                            gate: $id,
                            blocked: true,
                            reason: Some(reason),
                            risk_mult: None,
                        });
                        info!(
                            target: "riskgate::gatekeeper",
                            gate = ?$id,
                            reason = %reason,
                            instrument = %inp.signal.instrument,
                            "admission rejected"
                        );
                        return AdmissionDecision::rejected(reason, st);
                    }
                }
            }};
        }
        let no_mult = |_: &DecisionDiagnostics| None::<f64>;

        gate!(
            GateId::G00WarmupDqs,
            |s: &DecisionDiagnostics| s.dqs.as_ref().map(|d| d.dqs_mult),
            gates::warmup_dqs::evaluate(inp, &mut st, &cfg, &mut self.drp)
        );
        gate!(GateId::G01KillSwitch, no_mult, gates::kill_switch::evaluate(inp, &mut st, &cfg));
        gate!(
            GateId::G02RegimeResolution,
            |s: &DecisionDiagnostics| Some(s.regime_risk_mult),
            gates::regime::evaluate_gate2(inp, &mut st, &cfg)
        );
        gate!(GateId::G03StrategyCompat, no_mult, gates::regime::evaluate_gate3(inp, &mut st, &cfg));
        gate!(GateId::G04SignalSanity, no_mult, gates::signal_sanity::evaluate(inp, &mut st, &cfg));
        gate!(GateId::G05PreSizing, no_mult, gates::pre_sizing::evaluate(inp, &mut st, &cfg));
        gate!(
            GateId::G06MleDecision,
            |s: &DecisionDiagnostics| s.mle_decision.map(|d| d.risk_mult()),
            gates::mle_decision::evaluate(inp, &mut st, &cfg)
        );

        // SHADOW mode: the model pipeline has been fully exercised; stop
        // before anything with execution-side consequences
        if st.is_shadow {
            st.trace.push(GateTrace {
                gate: GateId::G06MleDecision,
                blocked: true,
                reason: Some(RejectReason::ShadowModeNoTrade),
                risk_mult: None,
            });
            return AdmissionDecision::rejected(RejectReason::ShadowModeNoTrade, st);
        }

        gate!(
            GateId::G07Liquidity,
            |s: &DecisionDiagnostics| Some(s.liquidity_mult),
            gates::liquidity::evaluate(inp, &mut st, &cfg)
        );
        gate!(GateId::G08GapGlitch, no_mult, gates::gap_glitch::evaluate(inp, &mut st, &cfg));
        gate!(
            GateId::G09Funding,
            |s: &DecisionDiagnostics| Some(s.funding.funding_risk_mult),
            gates::funding::evaluate(inp, &mut st, &cfg)
        );
        gate!(
            GateId::G10BasisExposure,
            |s: &DecisionDiagnostics| Some(s.basis_risk_mult.min(s.correlation_exposure_mult)),
            gates::basis_exposure::evaluate(inp, &mut st, &cfg)
        );
        gate!(GateId::G11NetRr, no_mult, gates::net_rr::evaluate(inp, &mut st, &cfg));
        gate!(GateId::G12Bankruptcy, no_mult, gates::bankruptcy::evaluate(inp, &mut st, &cfg));
        gate!(
            GateId::G13SequentialRisk,
            |s: &DecisionDiagnostics| Some(s.rem.combined_total),
            gates::sequential_risk::evaluate(inp, &mut st, &cfg, &mut self.drp, &mut self.low_risk_streak)
        );
        gate!(GateId::G14Sizing, no_mult, gates::sizing_gate::evaluate_gate14(inp, &mut st, &cfg));
        gate!(GateId::G15ImpactLimits, no_mult, gates::sizing_gate::evaluate_gate15(inp, &mut st, &cfg));
        gate!(
            GateId::G16Reservation,
            no_mult,
            gates::reservation_gate::evaluate_gate16(inp, &mut st, &cfg, &self.ledger)
        );
        gate!(GateId::G17ActualRisk, no_mult, gates::reservation_gate::evaluate_gate17(inp, &mut st, &cfg));

        let sizing = st.sizing.clone().expect("gate 14 ran");
        let size_notional = sizing.qty_rounded * inp.signal.levels.entry_price;
        info!(
            target: "riskgate::gatekeeper",
            instrument = %inp.signal.instrument,
            qty = sizing.qty_rounded,
            size_notional,
            risk_pct = sizing.risk_pct_actual,
            "admission allowed"
        );

        AdmissionDecision {
            allowed: true,
            size_notional,
            qty: sizing.qty_rounded,
            rejection_reason: String::new(),
            diagnostics: st,
        }
    }

    /// Gate 18: partial-fill economics after the first fill.
    pub fn evaluate_partial_fill(&self, inp: &PartialFillInputs) -> PartialFillDecision {
        gates::partial_fill::evaluate(inp, &self.cfg)
    }
}
