use crate::config::SshConfig;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStatus {
    Generated(PathBuf),
    Existing(PathBuf),
}

impl KeyStatus {
    pub fn path(&self) -> &Path {
        match self {
            KeyStatus::Generated(p) | KeyStatus::Existing(p) => p,
        }
    }
}

/// Provisions a named key pair and uses it to reach `<user>@<ip>` on a port.
///
/// Host key verification is switched off (`StrictHostKeyChecking=no`, known
/// hosts sent to /dev/null). This suits short-lived rented machines whose host
/// keys change on every rebuild; it offers no protection against a
/// man-in-the-middle and should not be pointed at long-lived hosts.
pub struct SshManager {
    config: SshConfig,
}

impl SshManager {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    pub fn key_path(&self, key_name: &str) -> PathBuf {
        self.config.dir.join(key_name)
    }

    pub fn public_key_path(&self, key_name: &str) -> PathBuf {
        self.config.dir.join(format!("{}.pub", key_name))
    }

    pub fn ensure_ssh_dir(&self) -> Result<()> {
        let dir = &self.config.dir;
        if dir.exists() {
            return Ok(());
        }
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create SSH directory: {}", dir.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }

    /// Generate the key pair unless a private key with this name is already present.
    pub async fn generate_key(&self, key_name: &str) -> Result<KeyStatus> {
        validate_key_name(key_name)?;
        self.ensure_ssh_dir()?;
        let key_path = self.key_path(key_name);

        if key_path.exists() {
            println!("SSH key {} already exists", key_name);
            return Ok(KeyStatus::Existing(key_path));
        }

        let bits = self.config.key_bits.to_string();
        tracing::debug!(path = %key_path.display(), bits = %bits, "running ssh-keygen");
        let output = Command::new("ssh-keygen")
            .args(["-t", "rsa", "-b", bits.as_str(), "-f"])
            .arg(&key_path)
            .args(["-N", "", "-C", self.config.key_comment.as_str(), "-q"])
            .stdin(Stdio::null())
            .output()
            .await
            .context("Failed to run ssh-keygen (is OpenSSH installed?)")?;

        if !output.status.success() {
            let err = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("ssh-keygen failed: {}", err.trim()));
        }

        restrict_to_owner(&key_path)?;

        println!("✅ Generated SSH key: {}", key_path.display());
        Ok(KeyStatus::Generated(key_path))
    }

    pub fn public_key(&self, key_name: &str) -> Result<String> {
        validate_key_name(key_name)?;
        let path = self.public_key_path(key_name);
        let content = fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read public key {} (run 'nodeshift-ssh generate' first)",
                path.display()
            )
        })?;
        Ok(content.trim().to_string())
    }

    /// Arguments shared by every ssh invocation; `batch` adds the non-interactive probe options.
    pub fn ssh_args(&self, key_name: &str, ip: &str, port: u16, batch: bool) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            self.key_path(key_name).display().to_string(),
            "-p".to_string(),
            port.to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
        ];
        if batch {
            args.push("-o".to_string());
            args.push(format!("ConnectTimeout={}", self.config.connect_timeout_secs));
            args.push("-o".to_string());
            args.push("BatchMode=yes".to_string());
        }
        args.push(format!("{}@{}", self.config.user, ip));
        args
    }

    /// Attach an interactive session; returns once the remote shell exits.
    pub async fn connect(&self, key_name: &str, ip: &str, port: u16) -> Result<ExitStatus> {
        validate_key_name(key_name)?;
        println!("🔗 Connecting to {}:{}", ip, port);

        let mut child = Command::new("ssh")
            .args(self.ssh_args(key_name, ip, port, false))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .context("Failed to spawn SSH process")?;

        let status = child.wait().await.context("Failed to wait for SSH process")?;
        tracing::debug!(%status, "ssh session ended");
        Ok(status)
    }

    /// Run a trivial remote echo in batch mode. Any failure, including a
    /// missing ssh binary or the overall timeout, yields `false`.
    pub async fn test_connection(&self, key_name: &str, ip: &str, port: u16) -> bool {
        if let Err(e) = validate_key_name(key_name) {
            println!("❌ Connection to {}:{} failed: {}", ip, port, e);
            return false;
        }
        let mut args = self.ssh_args(key_name, ip, port, true);
        args.push("echo \"Connection successful\"".to_string());

        let probe = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.config.test_timeout(), probe).await {
            Ok(Ok(output)) if output.status.success() => {
                println!("✅ Connection to {}:{} successful", ip, port);
                true
            }
            Ok(Ok(output)) => {
                let err = String::from_utf8_lossy(&output.stderr);
                println!("❌ Connection to {}:{} failed: {}", ip, port, err.trim());
                false
            }
            Ok(Err(e)) => {
                println!("❌ Connection to {}:{} failed: {}", ip, port, e);
                false
            }
            Err(_) => {
                println!("⏰ Connection to {}:{} timed out", ip, port);
                false
            }
        }
    }
}

/// Key names are plain file names inside the SSH directory.
pub fn validate_key_name(key_name: &str) -> Result<()> {
    if key_name.is_empty()
        || key_name == "."
        || key_name == ".."
        || key_name.contains(|c: char| c == '/' || c == '\\')
    {
        return Err(anyhow!(
            "Invalid key name '{}': must be a file name without path separators",
            key_name
        ));
    }
    Ok(())
}

fn restrict_to_owner(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_in(dir: &Path) -> SshManager {
        SshManager::new(SshConfig {
            dir: dir.to_path_buf(),
            ..SshConfig::default()
        })
    }

    fn has_ssh_keygen() -> bool {
        std::process::Command::new("ssh-keygen")
            .arg("-?")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    fn has_ssh() -> bool {
        std::process::Command::new("ssh")
            .arg("-V")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    #[test]
    fn test_validate_key_name() {
        assert!(validate_key_name("nodeshift_auto").is_ok());
        assert!(validate_key_name("lab.rsa").is_ok());
        assert!(validate_key_name("").is_err());
        assert!(validate_key_name("..").is_err());
        assert!(validate_key_name("../x").is_err());
        assert!(validate_key_name("keys/lab").is_err());
        assert!(validate_key_name("/tmp/lab").is_err());
        assert!(validate_key_name("keys\\lab").is_err());
    }

    #[tokio::test]
    async fn test_generate_key_rejects_path_outside_ssh_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ssh_dir = dir.path().join(".ssh");
        let manager = manager_in(&ssh_dir);

        let err = manager.generate_key("../escaped").await.unwrap_err();
        assert!(err.to_string().contains("Invalid key name"));
        assert!(!dir.path().join("escaped").exists());
        assert!(!ssh_dir.exists());
        assert!(manager.public_key("../escaped").is_err());
    }

    #[tokio::test]
    async fn test_connection_with_bad_key_name_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(dir.path());
        assert!(!manager.test_connection("a/b", "127.0.0.1", 22).await);
    }

    #[test]
    fn test_ssh_args_interactive() {
        let manager = manager_in(Path::new("/keys"));
        let args = manager.ssh_args("lab", "10.0.0.5", 2222, false);
        assert_eq!(
            args,
            vec![
                "-i",
                "/keys/lab",
                "-p",
                "2222",
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/dev/null",
                "root@10.0.0.5",
            ]
        );
    }

    #[test]
    fn test_ssh_args_batch_adds_timeout_and_batch_mode() {
        let manager = manager_in(Path::new("/keys"));
        let args = manager.ssh_args("lab", "10.0.0.5", 22, true);
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert_eq!(args.last().unwrap(), "root@10.0.0.5");
    }

    #[test]
    fn test_public_key_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lab.pub"), "ssh-rsa AAAA test@host\n\n").unwrap();
        let manager = manager_in(dir.path());
        assert_eq!(manager.public_key("lab").unwrap(), "ssh-rsa AAAA test@host");
    }

    #[test]
    fn test_public_key_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(dir.path());
        let err = manager.public_key("nothing").unwrap_err();
        assert!(err.to_string().contains("nothing.pub"));
    }

    #[test]
    fn test_ensure_ssh_dir_creates_owner_only_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ssh_dir = dir.path().join("nested").join(".ssh");
        let manager = manager_in(&ssh_dir);
        manager.ensure_ssh_dir().unwrap();
        assert!(ssh_dir.is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&ssh_dir).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[tokio::test]
    async fn test_generate_key_existing_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("lab");
        fs::write(&key, "not really a key").unwrap();

        let manager = manager_in(dir.path());
        let status = manager.generate_key("lab").await.unwrap();

        assert_eq!(status, KeyStatus::Existing(key.clone()));
        assert_eq!(fs::read_to_string(&key).unwrap(), "not really a key");
        assert!(!dir.path().join("lab.pub").exists());
    }

    #[tokio::test]
    async fn test_generate_key_is_idempotent() {
        if !has_ssh_keygen() {
            println!("ssh-keygen not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let manager = SshManager::new(SshConfig {
            dir: dir.path().to_path_buf(),
            key_bits: 2048,
            ..SshConfig::default()
        });

        let first = manager.generate_key("lab").await.unwrap();
        assert!(matches!(first, KeyStatus::Generated(_)));
        let private = fs::read(first.path()).unwrap();
        let public = manager.public_key("lab").unwrap();
        assert!(public.starts_with("ssh-rsa "));
        assert!(public.ends_with("auto-generated@leverageai.network"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(first.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let second = manager.generate_key("lab").await.unwrap();
        assert_eq!(second, KeyStatus::Existing(first.path().to_path_buf()));
        assert_eq!(fs::read(second.path()).unwrap(), private);
        assert_eq!(manager.public_key("lab").unwrap(), public);
    }

    #[tokio::test]
    async fn test_connection_refused_is_false() {
        // Bind then drop to get a local port with nothing listening.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(dir.path());
        assert!(!manager.test_connection("lab", "127.0.0.1", port).await);
    }

    #[tokio::test]
    async fn test_connection_timeout_is_false() {
        // Accepts TCP but never sends an SSH banner, so only the overall timeout ends the wait.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let dir = tempfile::tempdir().unwrap();
        let manager = SshManager::new(SshConfig {
            dir: dir.path().to_path_buf(),
            test_timeout_secs: 1,
            ..SshConfig::default()
        });

        let started = std::time::Instant::now();
        let ok = manager.test_connection("lab", "127.0.0.1", port).await;
        let elapsed = started.elapsed();
        drop(listener);

        assert!(!ok);
        if has_ssh() {
            assert!(
                elapsed >= std::time::Duration::from_millis(900),
                "returned after {:?}, before the timeout",
                elapsed
            );
        }
        assert!(elapsed < std::time::Duration::from_secs(5), "took {:?}", elapsed);
    }
}
