//! Row models and DTOs, one module per table family.

pub mod audit;
pub mod run;
pub mod setting;
pub mod status;
