//! # Quant
//!
//! $$
//! \mathbf{w}^\* = \arg\min_{\mathbf{w}:\,\mathbf{1}^\top\mathbf{w}=1} \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
pub mod portfolio;
