#[cfg(feature = "slack")]
pub mod slack;
