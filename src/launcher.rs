//! Launching bound targets
//!
//! A target is either an absolute URI, opened with the OS default handler,
//! or a program path started as a new process. A path that exists but
//! cannot be executed (an `.app` bundle, a folder, a document) is handed to
//! the default handler as well.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tracing::{debug, info};
use url::Url;

/// What a target string resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Opened through the default handler for its scheme
    Uri(Url),
    /// Started as a new process
    Program(PathBuf),
}

impl Target {
    /// Classify a target string
    ///
    /// One-letter schemes are Windows drive letters, not URIs.
    pub fn classify(target: &str) -> Self {
        let trimmed = target.trim();
        match Url::parse(trimmed) {
            Ok(url) if url.scheme().len() > 1 => Target::Uri(url),
            _ => Target::Program(PathBuf::from(trimmed)),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Uri(url) => write!(f, "{}", url),
            Target::Program(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Errors that can occur while launching a target
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("target is empty")]
    Empty,

    #[error("failed to open {uri}: {source}")]
    OpenUri {
        uri: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to open {}: {source}", .path.display())]
    OpenPath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start {}: {source}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Starts targets on behalf of the dispatcher
///
/// Called from a blocking task, never from the dispatcher loop itself.
pub trait Launcher: Send + Sync {
    fn launch(&self, target: &str) -> Result<Target, LaunchError>;
}

/// Launches targets through the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, target: &str) -> Result<Target, LaunchError> {
        if target.trim().is_empty() {
            return Err(LaunchError::Empty);
        }

        let target = Target::classify(target);
        match &target {
            Target::Uri(url) => {
                debug!(%url, "opening URI with default handler");
                open::that(url.as_str()).map_err(|source| LaunchError::OpenUri {
                    uri: url.to_string(),
                    source,
                })?;
            }
            Target::Program(path) if start_mode(path) == StartMode::Open => {
                debug!(path = %path.display(), "opening path with default handler");
                open::that(path).map_err(|source| LaunchError::OpenPath {
                    path: path.clone(),
                    source,
                })?;
            }
            Target::Program(path) => {
                debug!(path = %path.display(), "starting process");
                // The child is not awaited; tokio reaps it once it exits.
                let child = tokio::process::Command::new(path)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .map_err(|source| LaunchError::Spawn {
                        path: path.clone(),
                        source,
                    })?;
                info!(pid = ?child.id(), path = %path.display(), "process started");
            }
        }
        Ok(target)
    }
}

/// How a program target is started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartMode {
    /// Run it as a new process
    Spawn,
    /// Hand it to the default handler
    Open,
}

/// Paths that do not exist go to `Spawn` so bare names resolve through `PATH`
fn start_mode(path: &Path) -> StartMode {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() || !is_executable(path, &meta) => StartMode::Open,
        _ => StartMode::Spawn,
    }
}

#[cfg(unix)]
fn is_executable(_path: &Path, meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(windows)]
fn is_executable(path: &Path, _meta: &fs::Metadata) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "exe" | "com" | "bat" | "cmd"))
        .unwrap_or(false)
}

#[cfg(not(any(unix, windows)))]
fn is_executable(_path: &Path, _meta: &fs::Metadata) -> bool {
    true
}

#[cfg(test)]
pub mod recording {
    //! Launcher that records targets instead of starting them

    use std::sync::Mutex;

    use tokio::sync::mpsc;

    use super::{LaunchError, Launcher, Target};

    pub struct RecordingLauncher {
        launched: Mutex<Vec<String>>,
        notify: mpsc::UnboundedSender<String>,
        fail: bool,
    }

    impl RecordingLauncher {
        pub fn new(fail: bool) -> (Self, mpsc::UnboundedReceiver<String>) {
            let (notify, rx) = mpsc::unbounded_channel();
            let launcher = Self {
                launched: Mutex::new(Vec::new()),
                notify,
                fail,
            };
            (launcher, rx)
        }

        pub fn launched(&self) -> Vec<String> {
            self.launched.lock().unwrap().clone()
        }
    }

    impl Launcher for RecordingLauncher {
        fn launch(&self, target: &str) -> Result<Target, LaunchError> {
            self.launched.lock().unwrap().push(target.to_string());
            let _ = self.notify.send(target.to_string());
            if self.fail {
                return Err(LaunchError::Spawn {
                    path: target.into(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                });
            }
            Ok(Target::classify(target))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_is_uri() {
        let target = Target::classify("https://example.com");
        assert!(matches!(target, Target::Uri(ref url) if url.host_str() == Some("example.com")));
    }

    #[test]
    fn test_other_schemes_are_uris() {
        assert!(matches!(Target::classify("mailto:someone@example.com"), Target::Uri(_)));
        assert!(matches!(Target::classify("steam://run/440"), Target::Uri(_)));
        assert!(matches!(Target::classify("file:///tmp/notes.txt"), Target::Uri(_)));
    }

    #[test]
    fn test_plain_names_are_programs() {
        assert_eq!(
            Target::classify("notepad.exe"),
            Target::Program(PathBuf::from("notepad.exe"))
        );
        assert_eq!(
            Target::classify("/usr/bin/firefox"),
            Target::Program(PathBuf::from("/usr/bin/firefox"))
        );
    }

    #[test]
    fn test_drive_letter_is_program() {
        assert_eq!(
            Target::classify(r"C:\Windows\notepad.exe"),
            Target::Program(PathBuf::from(r"C:\Windows\notepad.exe"))
        );
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        assert!(matches!(Target::classify("  https://example.com "), Target::Uri(_)));
    }

    #[test]
    fn test_empty_target_is_error() {
        assert!(matches!(SystemLauncher.launch("   "), Err(LaunchError::Empty)));
    }

    #[test]
    fn test_missing_path_is_spawned() {
        assert_eq!(start_mode(Path::new("notepad.exe")), StartMode::Spawn);
        assert_eq!(
            start_mode(Path::new("/nonexistent/keylaunch-test-binary")),
            StartMode::Spawn
        );
    }

    #[test]
    fn test_bundle_directory_is_opened() {
        let dir = tempfile::TempDir::new().unwrap();
        let bundle = dir.path().join("Calculator.app");
        fs::create_dir(&bundle).unwrap();
        assert_eq!(start_mode(&bundle), StartMode::Open);
    }

    #[cfg(unix)]
    #[test]
    fn test_documents_are_opened_and_executables_spawned() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let document = dir.path().join("notes.txt");
        fs::write(&document, "hello").unwrap();
        fs::set_permissions(&document, fs::Permissions::from_mode(0o644)).unwrap();
        assert_eq!(start_mode(&document), StartMode::Open);

        let script = dir.path().join("run.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(start_mode(&script), StartMode::Spawn);
    }

    #[tokio::test]
    async fn test_missing_program_reports_error() {
        let result = tokio::task::spawn_blocking(|| {
            SystemLauncher.launch("/nonexistent/keylaunch-test-binary")
        })
        .await
        .unwrap();

        let err = result.unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
        assert!(err.to_string().contains("keylaunch-test-binary"));
    }
}
