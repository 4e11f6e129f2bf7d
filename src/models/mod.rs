pub mod digest;
pub mod signal;
