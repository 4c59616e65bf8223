//! # Stats
//!
//! $$
//! s^2 = \frac{1}{n-\delta}\sum_{t=1}^{n}(x_t-\bar x)^2
//! $$
//!
pub mod moments;
pub mod returns;
pub mod rolling;
