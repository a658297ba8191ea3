#[cfg(feature = "integration_mealie")]
pub mod mealie;
