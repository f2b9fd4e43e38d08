pub mod artifact_store;
pub mod error;
pub mod resample;
