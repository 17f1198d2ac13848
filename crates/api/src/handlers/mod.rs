pub mod audit;
pub mod rules;
pub mod runs;
pub mod settings;
pub mod triggers;
pub mod usage;
