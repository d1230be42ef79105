pub mod backend_params;
pub mod bands;
pub mod calibrators;
pub mod config;
pub mod constants;
pub mod conversion;
pub mod coordinates;
pub mod engine;
pub mod lookup;
pub mod observation;
pub mod ref_system;
pub mod resolver;
pub mod sb_errors;
pub mod synthesis;

pub use engine::SbEngine;
pub use sb_errors::SbError;
