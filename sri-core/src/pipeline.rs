//! Issuance flow: key, build, validate, sign, submit, authorize.
use crate::access_key::{AccessKey, MalformedFieldError, NumericCode};
use crate::api::SriGateway;
use crate::config::{Config, CredentialBundle, IssuerIdentity};
use crate::document::validation::{validate_model, validate_xml, ValidationIssue};
use crate::document::xml::{self, CanonicalXml, SchemaMappingError};
use crate::document::Document;
use crate::sign::{SignedXml, SigningError, XmlSigner};
use crate::submission::{
    AuthorizationOutcome, SubmissionError, SubmissionOutcome, SubmissionState,
    SubmissionStateMachine,
};

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("issuer identity is unusable: {}", .0.join("; "))]
    Issuer(Vec<String>),
    #[error("access key could not be generated: {0}")]
    AccessKey(#[from] MalformedFieldError),
    #[error("document failed validation with {} issue(s)", .0.len())]
    Validation(Vec<ValidationIssue>),
    #[error(transparent)]
    Schema(#[from] SchemaMappingError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ArtifactKind {
    Unsigned,
    Signed,
    Authorized,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Unsigned => "unsigned",
            ArtifactKind::Signed => "signed",
            ArtifactKind::Authorized => "authorized",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// XML produced at one stage of the flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub access_key: AccessKey,
    pub xml: String,
}

impl Artifact {
    /// `<kind>-<access key>.xml`
    pub fn file_name(&self) -> String {
        format!("{}-{}.xml", self.kind, self.access_key)
    }
}

/// Keyed, built and validated document.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    document: Document,
    xml: CanonicalXml,
}

impl PreparedDocument {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn xml(&self) -> &CanonicalXml {
        &self.xml
    }

    pub fn access_key(&self) -> &AccessKey {
        self.xml.access_key()
    }

    pub fn artifact(&self) -> Artifact {
        Artifact {
            kind: ArtifactKind::Unsigned,
            access_key: self.access_key().clone(),
            xml: self.xml.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignedDocument {
    prepared: PreparedDocument,
    signed: SignedXml,
}

impl SignedDocument {
    pub fn prepared(&self) -> &PreparedDocument {
        &self.prepared
    }

    pub fn signed_xml(&self) -> &SignedXml {
        &self.signed
    }

    pub fn artifact(&self) -> Artifact {
        Artifact {
            kind: ArtifactKind::Signed,
            access_key: self.signed.access_key().clone(),
            xml: String::from_utf8_lossy(self.signed.as_bytes()).into_owned(),
        }
    }
}

/// Everything one issuance attempt produced.
#[derive(Debug, Clone, Serialize)]
pub struct IssueReport {
    pub access_key: AccessKey,
    pub state: SubmissionState,
    pub reception: SubmissionOutcome,
    pub authorization: Option<AuthorizationOutcome>,
    pub artifacts: Vec<Artifact>,
}

impl IssueReport {
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.artifacts.iter().find(|artifact| artifact.kind == kind)
    }
}

/// Runs documents through the issuance flow with one configuration, issuer,
/// credential set, signer and gateway.
pub struct DocumentIssuer<S, G> {
    config: Config,
    issuer: IssuerIdentity,
    credentials: CredentialBundle,
    signer: S,
    gateway: G,
}

impl<S, G> DocumentIssuer<S, G>
where
    S: XmlSigner,
    G: SriGateway,
{
    pub fn new(
        config: Config,
        issuer: IssuerIdentity,
        credentials: CredentialBundle,
        signer: S,
        gateway: G,
    ) -> Self {
        Self {
            config,
            issuer,
            credentials,
            signer,
            gateway,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn issuer(&self) -> &IssuerIdentity {
        &self.issuer
    }

    /// Check the issuer, fill its header defaults, assign the access key, build the
    /// XML, and run both validation passes.
    ///
    /// # Errors
    /// Fails closed with [`IssueError::Issuer`] on an unusable issuer identity and
    /// with [`IssueError::Validation`] on any model or XML issue.
    pub fn prepare(
        &self,
        mut document: Document,
        numeric_code: NumericCode,
    ) -> Result<PreparedDocument, IssueError> {
        let problems = self.issuer.check();
        if !problems.is_empty() {
            warn!(ruc = %self.issuer.ruc, problems = problems.len(), "issuer identity rejected");
            return Err(IssueError::Issuer(problems));
        }
        document.apply_issuer_defaults(&self.issuer);

        let key = document.assign_access_key(&numeric_code)?.clone();

        let model_issues = validate_model(&document);
        if !model_issues.is_empty() {
            warn!(access_key = %key, issues = model_issues.len(), "document model rejected");
            return Err(IssueError::Validation(model_issues));
        }

        let canonical = xml::build(&document)?;
        let xml_issues = validate_xml(canonical.as_str());
        if !xml_issues.is_empty() {
            warn!(access_key = %key, issues = xml_issues.len(), "rendered XML rejected");
            return Err(IssueError::Validation(xml_issues));
        }

        info!(access_key = %key, document_type = document.document_type().code(), "document prepared");
        Ok(PreparedDocument {
            document,
            xml: canonical,
        })
    }

    /// Sign a prepared document. Signer errors are returned unchanged.
    pub async fn sign(&self, prepared: PreparedDocument) -> Result<SignedDocument, IssueError> {
        let signed = SignedXml::sign(&prepared.xml, &self.signer, &self.credentials)
            .await
            .map_err(|err| {
                warn!(access_key = %prepared.access_key(), error = %err, "signing failed");
                err
            })?;
        info!(access_key = %signed.access_key(), "document signed");
        Ok(SignedDocument { prepared, signed })
    }

    /// Full attempt: prepare, sign, submit, then a single authorization query when
    /// the document was received.
    pub async fn issue(
        &self,
        document: Document,
        numeric_code: NumericCode,
    ) -> Result<IssueReport, IssueError> {
        let prepared = self.prepare(document, numeric_code)?;
        let signed = self.sign(prepared).await?;
        let mut artifacts = vec![signed.prepared.artifact(), signed.artifact()];

        let mut machine =
            SubmissionStateMachine::new(&self.gateway, &self.config, signed.signed.clone());
        let reception = machine.submit().await?;
        let authorization = match reception {
            SubmissionOutcome::Received { .. } => Some(machine.authorize().await?),
            _ => None,
        };

        if let Some(AuthorizationOutcome::Authorized { authorized_xml, .. }) = &authorization {
            artifacts.push(Artifact {
                kind: ArtifactKind::Authorized,
                access_key: machine.access_key().clone(),
                xml: authorized_xml.clone(),
            });
        }

        info!(access_key = %machine.access_key(), state = %machine.state(), "issuance attempt finished");
        Ok(IssueReport {
            access_key: machine.access_key().clone(),
            state: machine.state(),
            reception,
            authorization,
            artifacts,
        })
    }
}
