//! Client identity (certificate + private key) resolution for mTLS.
//!
//! Resolvers hand back opaque PEM bytes; only [`crate::kafka::tls`] parses them.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::ClientIdentityConfig;
use crate::{Error, Result};

/// File name of the client certificate inside a deployment directory
pub const CERTIFICATE_FILE: &str = "client.crt";

/// File name of the client private key inside a deployment directory
pub const PRIVATE_KEY_FILE: &str = "client.key";

/// Identifies which deployment a client identity belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialScope {
    pub project: String,
    pub site: String,
    pub deployment: String,
}

impl CredentialScope {
    pub fn new(
        project: impl Into<String>,
        site: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            site: site.into(),
            deployment: deployment.into(),
        }
    }
}

/// Certificate and private key, both PEM encoded.
#[derive(Clone)]
pub struct ClientIdentity {
    pub certificate: Bytes,
    pub private_key: Bytes,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("certificate", &format_args!("{} bytes", self.certificate.len()))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Source of client identities.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, scope: &CredentialScope) -> Result<ClientIdentity>;
}

/// Reads one fixed certificate/key pair from disk, whatever the scope.
#[derive(Debug, Clone)]
pub struct FileCredentialResolver {
    certificate: PathBuf,
    private_key: PathBuf,
}

impl FileCredentialResolver {
    pub fn new(certificate: impl Into<PathBuf>, private_key: impl Into<PathBuf>) -> Self {
        Self {
            certificate: certificate.into(),
            private_key: private_key.into(),
        }
    }
}

#[async_trait]
impl CredentialResolver for FileCredentialResolver {
    async fn resolve(&self, _scope: &CredentialScope) -> Result<ClientIdentity> {
        load_pair(&self.certificate, &self.private_key).await
    }
}

/// Looks identities up under `<base>/<project>/<site>/<deployment>/`.
#[derive(Debug, Clone)]
pub struct DirectoryCredentialResolver {
    base_path: PathBuf,
}

impl DirectoryCredentialResolver {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn scope_dir(&self, scope: &CredentialScope) -> Result<PathBuf> {
        for part in [&scope.project, &scope.site, &scope.deployment] {
            if part.is_empty() || part.contains(['/', '\\']) || part == ".." || part == "." {
                return Err(Error::Credentials(format!(
                    "Invalid credential scope component: {:?}",
                    part
                )));
            }
        }
        Ok(self
            .base_path
            .join(&scope.project)
            .join(&scope.site)
            .join(&scope.deployment))
    }
}

#[async_trait]
impl CredentialResolver for DirectoryCredentialResolver {
    async fn resolve(&self, scope: &CredentialScope) -> Result<ClientIdentity> {
        let dir = self.scope_dir(scope)?;
        load_pair(&dir.join(CERTIFICATE_FILE), &dir.join(PRIVATE_KEY_FILE)).await
    }
}

/// Build the resolver and scope described by configuration.
pub fn from_config(config: &ClientIdentityConfig) -> (Box<dyn CredentialResolver>, CredentialScope) {
    match config {
        ClientIdentityConfig::Files { certificate, key } => (
            Box::new(FileCredentialResolver::new(certificate, key)),
            CredentialScope::new("", "", ""),
        ),
        ClientIdentityConfig::Directory {
            base_path,
            project,
            site,
            deployment,
        } => (
            Box::new(DirectoryCredentialResolver::new(base_path)),
            CredentialScope::new(project, site, deployment),
        ),
    }
}

async fn load_pair(certificate: &Path, private_key: &Path) -> Result<ClientIdentity> {
    let certificate_bytes = read_file(certificate).await?;
    let private_key_bytes = read_file(private_key).await?;
    debug!(
        "Loaded client identity from {} and {}",
        certificate.display(),
        private_key.display()
    );
    Ok(ClientIdentity {
        certificate: certificate_bytes,
        private_key: private_key_bytes,
    })
}

async fn read_file(path: &Path) -> Result<Bytes> {
    let data = tokio::fs::read(path).await.map_err(|e| {
        Error::Credentials(format!("Failed to read {}: {}", path.display(), e))
    })?;
    if data.is_empty() {
        return Err(Error::Credentials(format!("{} is empty", path.display())));
    }
    Ok(Bytes::from(data))
}
