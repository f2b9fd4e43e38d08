pub mod client;
pub mod error;
pub mod observation;
pub(crate) mod parse;
