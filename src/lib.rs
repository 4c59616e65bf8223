//! # volfolio
//!
//! $$
//! \sigma_p = \sqrt{\mathbf{w}^\top \Sigma \mathbf{w}}
//! $$
//!
//! Portfolio volatility toolkit: by-hand moments, covariance estimation,
//! rolling volatility over dated return series, closed-form portfolio risk
//! and minimum-variance / efficient-frontier optimization.

pub mod dashboard;
pub mod data;
pub mod quant;
pub mod stats;
pub mod traits;
pub mod visualization;

pub use quant::portfolio;
