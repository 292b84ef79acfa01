use std::path::PathBuf;

/// Process-wide configuration, resolved once at startup from the environment.
///
/// Mirrors the environment variables the original service reads (§6 of the spec):
/// `WORKSPACE_DIR`, `HOME`, `CHROME_INSTANCE_PATH`, `BROWSER_USE_LOGGING_LEVEL`,
/// `ANONYMIZED_TELEMETRY`.
#[derive(Debug, Clone)]
pub struct Config {
    pub workspace_dir: PathBuf,
    pub home_dir: PathBuf,
    pub port: u16,
    pub chrome_instance_path: Option<String>,
    pub anonymized_telemetry: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let home_dir = std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/root"));

        let workspace_dir = std::env::var("WORKSPACE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::current_dir().unwrap_or_default().join("workspace"));

        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8330);

        let chrome_instance_path = std::env::var("CHROME_INSTANCE_PATH").ok();

        let anonymized_telemetry = std::env::var("ANONYMIZED_TELEMETRY")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            workspace_dir,
            home_dir,
            port,
            chrome_instance_path,
            anonymized_telemetry,
        }
    }

    pub fn local_storage_dir(&self) -> PathBuf {
        self.home_dir.join("local_storage")
    }

    pub fn secrets_dir(&self) -> PathBuf {
        self.home_dir.join(".secrets")
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.home_dir.join("upload")
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.workspace_dir.join("screenshots")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_when_env_is_empty() {
        // SAFETY: test runs single-threaded per-process env mutation is acceptable here.
        unsafe {
            std::env::remove_var("WORKSPACE_DIR");
            std::env::remove_var("PORT");
        }
        let cfg = Config::from_env();
        assert!(cfg.workspace_dir.ends_with("workspace"));
        assert_eq!(cfg.port, 8330);
    }
}
