//! Issuance pipeline for Ecuadorian SRI electronic documents (access keys, canonical
//! XML, structural validation, and the reception/authorization flow).
//!
//! # Examples
//! ```rust
//! use sri_core::access_key::{AccessKey, AccessKeyFields};
//!
//! let key = AccessKey::generate(&AccessKeyFields {
//!     emission_date: "06012026".into(),
//!     document_type: "01".into(),
//!     ruc: "0999999999001".into(),
//!     environment: "1".into(),
//!     series: "001001".into(),
//!     sequential: "000000001".into(),
//!     numeric_code: "12345678".into(),
//!     emission_type: "1".into(),
//! })?;
//! assert_eq!(key.check_digit(), 7);
//! # Ok::<(), sri_core::access_key::MalformedFieldError>(())
//! ```
pub mod access_key;
pub mod api;
pub mod config;
pub mod document;
pub mod pipeline;
pub mod sign;
pub mod submission;

use thiserror::Error;

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    AccessKey(#[from] access_key::MalformedFieldError),
    #[error(transparent)]
    Environment(#[from] config::EnvironmentParseError),
    #[error(transparent)]
    Document(#[from] document::DocumentError),
    #[error(transparent)]
    Xml(#[from] document::xml::SchemaMappingError),
    #[error(transparent)]
    Signing(#[from] sign::SigningError),
    #[error(transparent)]
    Gateway(#[from] api::GatewayError),
    #[error(transparent)]
    Decode(#[from] api::ResponseDecodeError),
    #[error(transparent)]
    Submission(#[from] submission::SubmissionError),
    #[error(transparent)]
    Issue(#[from] pipeline::IssueError),
}
