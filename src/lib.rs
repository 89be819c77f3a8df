//! # riskgate
//!
//! Risk-admission engine for crypto derivatives. For each candidate trading
//! signal the [`gatekeeper::Gatekeeper`] answers a single question - may
//! this order be sent, and at what size? - by threading the signal through
//! a fixed-order chain of admission gates over frozen market and portfolio
//! snapshots.
//!
//! The engine is deterministic on its inputs: the same snapshots and config
//! always produce the same decision, bit-exact between live and backtest.
//!
//! Major pieces:
//! - [`num`] / [`units`]: safe numerics, R-unit conversions, all-in
//!   effective prices
//! - [`domain`]: immutable snapshot entities
//! - [`corr`]: correlation algebra (shrinkage, Higham PSD, stress, blend)
//!   and the background snapshot publisher
//! - [`dqs`] / [`drp`]: data-quality scoring and the disaster-recovery
//!   protocol state machine
//! - [`heat`]: matrix-weighted portfolio risk and candidate admission
//! - [`sizing`]: the final sizing solver
//! - [`reservation`]: the risk-reservation ledger and single-writer commit
//! - [`gatekeeper`]: gates 0-18 and the admission contract

#![deny(unreachable_pub)]

pub mod clock;
pub mod config;
pub mod corr;
pub mod domain;
pub mod dqs;
pub mod drp;
pub mod errors;
pub mod gatekeeper;
pub mod heat;
pub mod kpi;
pub mod logging;
pub mod num;
pub mod reservation;
pub mod sizing;
pub mod units;

#[cfg(test)]
pub(crate) mod testkit;

pub use clock::{DecisionSnapshot, LogicalClock, SnapshotRegistry};
pub use config::EngineConfig;
pub use corr::{CorrMatrixSnapshot, CorrPublisher, StressMode};
pub use domain::{
    BaselineClass, DrpState, EngineKind, EngineSignal, FinalRegime, MarketState, MleDecision,
    MleOutput, MrcClass, MrcResult, PortfolioState, Position, TradingMode,
};
pub use drp::{DrpStateMachine, EmergencyCause};
pub use errors::{DomainViolation, ReservationError, ValidationError};
pub use gatekeeper::{
    AdmissionDecision, GateId, GateInputs, Gatekeeper, KpiStats, PartialFillInputs, PricePoint,
    RejectReason,
};
pub use kpi::KpiSample;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use reservation::{
    Fill, OrderType, PortfolioWriter, Reservation, ReservationLedger, ReservationState,
};
pub use units::{CostModelBps, Direction, EffectivePrices};
