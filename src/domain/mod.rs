//! Immutable domain snapshots consumed by the admission pipeline.
//!
//! Every entity here is a frozen value object: updates produce a new version
//! under a fresh snapshot id. All entities are serde round-trippable and
//! carry a `schema_version` for wire compatibility (additive-only for
//! optional fields; breaking changes bump the version).

mod market_state;
mod mle_output;
mod portfolio_state;
mod regime;
mod signal;

pub use market_state::{
    CorrelationView, DataQualityView, DerivativesState, LiquidityState, MarketState, PriceState,
    VolatilityState,
};
pub use mle_output::{MleDecision, MleOutput};
pub use portfolio_state::{
    DrpState, MlopsState, PortfolioState, Position, TradingMode, MARKET_STATE_SCHEMA_VERSION,
    PORTFOLIO_STATE_SCHEMA_VERSION,
};
pub use regime::{BaselineClass, FinalRegime, MrcClass, MrcResult, RegimeConflict};
pub use signal::{EngineKind, EngineSignal, SignalConstraints, SignalContext, SignalLevels};
