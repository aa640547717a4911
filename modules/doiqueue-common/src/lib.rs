pub mod config;
pub mod telemetry;
pub mod token;

pub use config::AppConfig;
pub use token::{TokenClaims, TokenService};
