pub mod cors;
pub mod https;
