//! `POST /init-sandbox` (§6): writes `{key: value}` pairs under
//! `$HOME/.secrets/<key>` with mode 0600, backing up the previous content
//! under a timestamp suffix when it changes.
//!
//! Grounded on `examples/original_source/` init-sandbox handler (secret
//! provisioning with backup-on-change) and the teacher's pattern of flat
//! synchronous `std::fs` calls for small, one-shot filesystem operations.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::HostResult;

pub struct SecretProvisioner {
    secrets_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitSandboxRequest {
    pub secrets: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitSandboxResult {
    pub status: &'static str,
    pub written: Vec<String>,
    pub backed_up: Vec<String>,
}

impl SecretProvisioner {
    pub fn new(secrets_dir: PathBuf) -> Self {
        Self { secrets_dir }
    }

    pub fn apply(&self, request: InitSandboxRequest) -> HostResult<InitSandboxResult> {
        std::fs::create_dir_all(&self.secrets_dir)?;
        std::fs::set_permissions(&self.secrets_dir, std::fs::Permissions::from_mode(0o700))?;

        let mut written = Vec::new();
        let mut backed_up = Vec::new();

        for (key, value) in &request.secrets {
            let path = self.secrets_dir.join(key);
            if let Some(existing) = read_if_exists(&path)? {
                if existing != *value {
                    let backup_path = self.secrets_dir.join(format!("{key}.{}", timestamp()));
                    std::fs::rename(&path, &backup_path)?;
                    backed_up.push(key.clone());
                }
            }
            std::fs::write(&path, value)?;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
            written.push(key.clone());
        }

        Ok(InitSandboxResult {
            status: "success",
            written,
            backed_up,
        })
    }
}

fn read_if_exists(path: &Path) -> HostResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn writes_new_secret_with_0600_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = SecretProvisioner::new(dir.path().to_path_buf());
        let mut secrets = HashMap::new();
        secrets.insert("api_key".to_string(), "abc123".to_string());

        let result = provisioner.apply(InitSandboxRequest { secrets }).unwrap();
        assert_eq!(result.written, vec!["api_key"]);
        assert!(result.backed_up.is_empty());

        let path = dir.path().join("api_key");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "abc123");
    }

    #[test]
    fn backs_up_previous_content_when_changed() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = SecretProvisioner::new(dir.path().to_path_buf());

        let mut first = HashMap::new();
        first.insert("token".to_string(), "old".to_string());
        provisioner.apply(InitSandboxRequest { secrets: first }).unwrap();

        let mut second = HashMap::new();
        second.insert("token".to_string(), "new".to_string());
        let result = provisioner.apply(InitSandboxRequest { secrets: second }).unwrap();

        assert_eq!(result.backed_up, vec!["token"]);
        assert_eq!(std::fs::read_to_string(dir.path().join("token")).unwrap(), "new");

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("token.") && n != "token")
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[test]
    fn rewriting_identical_content_does_not_back_up() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = SecretProvisioner::new(dir.path().to_path_buf());
        let mut secrets = HashMap::new();
        secrets.insert("k".to_string(), "same".to_string());

        provisioner.apply(InitSandboxRequest { secrets: secrets.clone() }).unwrap();
        let result = provisioner.apply(InitSandboxRequest { secrets }).unwrap();
        assert!(result.backed_up.is_empty());
    }
}
