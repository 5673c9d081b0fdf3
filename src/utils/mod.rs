pub mod constants;
pub mod ids;
