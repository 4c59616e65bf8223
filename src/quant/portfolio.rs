//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Portfolio risk, input validation and minimum-variance / efficient-frontier optimization.

pub mod engine;
pub mod optimizers;
pub mod risk;
pub mod types;
pub mod validate;

pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use optimizers::efficient_frontier;
pub use optimizers::equal_weight;
pub use optimizers::inverse_volatility;
pub use optimizers::max_sharpe;
pub use optimizers::mean_variance;
pub use optimizers::min_variance;
pub use optimizers::min_variance_for_target;
pub use optimizers::optimize_with_method;
pub use risk::RiskContributions;
pub use risk::diversification_ratio;
pub use risk::portfolio_return;
pub use risk::portfolio_variance;
pub use risk::portfolio_variance_by_hand;
pub use risk::portfolio_volatility;
pub use risk::risk_contributions;
pub use types::EfficientFrontier;
pub use types::FrontierPoint;
pub use types::OptimizerConfig;
pub use types::OptimizerMethod;
pub use types::PortfolioResult;
pub use types::WeightConstraints;
