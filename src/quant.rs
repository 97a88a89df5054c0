pub mod portfolio;
#[cfg(feature = "yahoo")]
pub mod yahoo;
