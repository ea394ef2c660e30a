pub mod ambient;
pub mod error;
pub mod naming;
pub mod request;
pub mod resolve;
pub mod safety;
pub mod settings;

pub use error::ConfigError;
