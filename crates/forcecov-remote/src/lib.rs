//! forcecov Remote - HTTP clients
//!
//! - [`ForceClient`]: SOAP login, metadata deploy, SOQL and Tooling queries
//! - [`CoverallsClient`]: job upload to the Coveralls API

#![warn(unreachable_pub)]

pub mod archive;
pub mod client;
pub mod coveralls;
pub mod soap;
mod wire;

pub use archive::package_directory;
pub use client::{ClientConfig, ForceClient, DEFAULT_API_VERSION};
pub use coveralls::{CoverallsClient, DEFAULT_COVERALLS_ENDPOINT};
pub use soap::{login_envelope, parse_login_response, LoginResult};
