//! Signing port.
//!
//! The XAdES-BES signature itself is produced outside this crate. Implementations of
//! [`XmlSigner`] receive the canonical bytes and the caller's credentials and return
//! the enveloped-signature document.
use crate::access_key::AccessKey;
use crate::config::CredentialBundle;
use crate::document::xml::CanonicalXml;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use std::sync::Arc;
use thiserror::Error;

/// Signing failures. Fatal to the attempt; the pipeline never retries them.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("credentials rejected: {0}")]
    Credential(String),
    #[error("certificate unusable: {0}")]
    Certificate(String),
    #[error("document cannot be signed: {0}")]
    MalformedInput(String),
    #[error("signing failed: {0}")]
    Other(String),
}

#[async_trait]
pub trait XmlSigner: Send + Sync {
    async fn sign(
        &self,
        xml: &[u8],
        credentials: &CredentialBundle,
    ) -> Result<Vec<u8>, SigningError>;
}

#[async_trait]
impl<S> XmlSigner for &S
where
    S: XmlSigner + ?Sized,
{
    async fn sign(
        &self,
        xml: &[u8],
        credentials: &CredentialBundle,
    ) -> Result<Vec<u8>, SigningError> {
        (**self).sign(xml, credentials).await
    }
}

#[async_trait]
impl<S> XmlSigner for Arc<S>
where
    S: XmlSigner + ?Sized,
{
    async fn sign(
        &self,
        xml: &[u8],
        credentials: &CredentialBundle,
    ) -> Result<Vec<u8>, SigningError> {
        (**self).sign(xml, credentials).await
    }
}

/// Signed document bytes, tied to the access key of the unsigned original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedXml {
    bytes: Vec<u8>,
    access_key: AccessKey,
}

impl SignedXml {
    pub fn new(bytes: Vec<u8>, access_key: AccessKey) -> Self {
        Self { bytes, access_key }
    }

    /// Sign `canonical` with `signer`; an empty result counts as a signer failure.
    pub async fn sign<S>(
        canonical: &CanonicalXml,
        signer: &S,
        credentials: &CredentialBundle,
    ) -> Result<Self, SigningError>
    where
        S: XmlSigner + ?Sized,
    {
        let bytes = signer.sign(canonical.as_bytes(), credentials).await?;
        if bytes.is_empty() {
            return Err(SigningError::Other("signer returned no content".to_string()));
        }
        Ok(Self::new(bytes, canonical.access_key().clone()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn access_key(&self) -> &AccessKey {
        &self.access_key
    }

    /// Payload of the reception request.
    pub fn to_base64(&self) -> String {
        Base64::encode_string(&self.bytes)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
