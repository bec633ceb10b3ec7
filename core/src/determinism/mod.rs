pub mod canonical;
pub mod ids;
