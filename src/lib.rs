//! Async Rust client for the Ed-Fi ODS REST API.
//!
//! Provides the two-step OAuth token lifecycle (authorization code +
//! exchange, cached with transparent refresh), profile content-type
//! negotiation, and a lazy response tree that normalizes wire casing and
//! resolves `_reference` hypermedia links into live sub-resources on
//! demand.
//!
//! # Modules
//!
//! - [`client`] — `EdFiClient`: authenticated CRUD verbs, header merging,
//!   outbound key camelization, response wrapping.
//! - [`error`] — Typed error hierarchy (`EdFiError`) for all library
//!   operations.
//! - [`inflect`] — Key-casing conversions between wire camelCase and
//!   programmatic lower_snake.
//! - [`profile`] — Profile MIME formatting and Accept/Content-Type
//!   builders.
//! - [`response`] — `Response` tree: field access, reference resolution
//!   with per-node caching, client rebinding, pure serialization.
//! - [`token`] — `AccessToken` value object and the `TokenManager`
//!   refresh protocol.
//! - [`transport`] — The `Transport` seam and its reqwest-backed default.
//!
//! # Quick Start
//!
//! ```ignore
//! use edfi_client::client::EdFiClient;
//! use edfi_client::transport::QueryMap;
//! use reqwest::header::HeaderMap;
//!
//! let client = EdFiClient::connect("https://api.ed-fi.example/v3", "key", "secret")?;
//! let student = client.get("/students/1", HeaderMap::new(), &QueryMap::new()).await?;
//! let school = student.resolve_reference("school").await?;
//! println!("{}", school.get("name_of_institution")?.as_str().unwrap_or(""));
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod inflect;
pub mod profile;
pub mod response;
pub mod token;
pub mod transport;

pub use client::EdFiClient;
pub use error::{EdFiError, Result};
pub use response::Response;
pub use token::{AccessToken, TokenManager};
pub use transport::{HttpTransport, QueryMap, Transport};
