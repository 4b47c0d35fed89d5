//! Hash allowlist owned by the privileged governor.
//!
//! Each registered daemon has exactly one entry: the canonical wrapper path,
//! the SHA-256 of its contents at registration time, and the user the
//! registration was made for. The governor refuses to exec a wrapper whose
//! current hash differs from the recorded one.

use crate::error::{DaemonError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub path: PathBuf,
    pub hash: String,
    pub run_as: String,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct Allowlist {
    #[serde(default)]
    pub scripts: BTreeMap<String, Registration>,
}

/// Outcome of checking one registration against the file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    Modified,
    Missing,
}

/// Wrapper content that matched its registration.
#[derive(Debug, Clone)]
pub struct VerifiedScript {
    pub registration: Registration,
    pub content: Vec<u8>,
}

impl VerifiedScript {
    /// Program and arguments that run the verified content.
    ///
    /// The interpreter comes from the shebang (`/bin/sh` without one) and
    /// receives the content through `-c`, with the wrapper path as `$0`.
    pub fn command_line(&self) -> Result<(PathBuf, Vec<OsString>)> {
        if self.content.contains(&0) {
            return Err(DaemonError::ValidationFailure {
                detail: format!("{} contains NUL bytes", self.registration.path.display()),
            });
        }

        let text = String::from_utf8_lossy(&self.content);
        let shebang = text
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("#!"))
            .map(str::trim)
            .filter(|line| !line.is_empty());

        let (program, mut args) = match shebang {
            Some(line) => {
                let (program, arg) = match line.split_once(char::is_whitespace) {
                    Some((program, arg)) => (program, Some(arg.trim())),
                    None => (line, None),
                };
                let args: Vec<OsString> = arg
                    .filter(|a| !a.is_empty())
                    .map(OsString::from)
                    .into_iter()
                    .collect();
                (PathBuf::from(program), args)
            }
            None => (PathBuf::from(DEFAULT_INTERPRETER), Vec::new()),
        };

        args.push(OsString::from("-c"));
        args.push(content_arg(&self.content));
        args.push(self.registration.path.clone().into_os_string());
        Ok((program, args))
    }

    /// Command that runs the verified content, not the file.
    pub fn command(&self) -> Result<std::process::Command> {
        let (program, args) = self.command_line()?;
        let mut command = std::process::Command::new(program);
        command.args(args);
        Ok(command)
    }
}

const DEFAULT_INTERPRETER: &str = "/bin/sh";

#[cfg(unix)]
fn content_arg(content: &[u8]) -> OsString {
    use std::os::unix::ffi::OsStrExt;
    std::ffi::OsStr::from_bytes(content).to_os_string()
}

#[cfg(not(unix))]
fn content_arg(content: &[u8]) -> OsString {
    OsString::from(String::from_utf8_lossy(content).into_owned())
}

pub struct TrustStore {
    path: PathBuf,
}

impl TrustStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The system-wide allowlist.
    pub fn system() -> Self {
        Self::new(crate::clienv::allowlist_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Allowlist> {
        if !self.path.exists() {
            return Ok(Allowlist::default());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Replace the whole allowlist via write-then-rename.
    fn save(&self, allowlist: &Allowlist) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(allowlist)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o644))?;
        }

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Registration> {
        self.load()?
            .scripts
            .remove(name)
            .ok_or_else(|| DaemonError::NotFound(name.to_string()))
    }

    /// Record the current hash of `artifact` as the only one allowed for `name`.
    pub fn register(&self, name: &str, artifact: &Path, run_as: &str) -> Result<Registration> {
        let path = artifact.canonicalize()?;
        let registration = Registration {
            hash: hash_file(&path)?,
            path,
            run_as: run_as.to_string(),
        };

        let mut allowlist = self.load()?;
        if allowlist.scripts.get(name) == Some(&registration) {
            tracing::debug!(name, "Registration unchanged");
            return Ok(registration);
        }

        allowlist.scripts.insert(name.to_string(), registration.clone());
        self.save(&allowlist)?;
        tracing::info!(name, hash = %registration.hash, "Registered wrapper");
        Ok(registration)
    }

    pub fn unregister(&self, name: &str) -> Result<bool> {
        let mut allowlist = self.load()?;
        let removed = allowlist.scripts.remove(name).is_some();
        if removed {
            self.save(&allowlist)?;
        }
        Ok(removed)
    }

    /// Check `artifact` against the registration for `name`.
    pub fn verify(&self, name: &str, artifact: &Path) -> Result<Registration> {
        self.prepare_run(name, artifact).map(|script| script.registration)
    }

    /// Read `artifact` once and check those exact bytes against the
    /// registration for `name`.
    ///
    /// The returned script carries the verified content; running it never
    /// goes back to the file, so a swap after the check cannot be executed.
    pub fn prepare_run(&self, name: &str, artifact: &Path) -> Result<VerifiedScript> {
        let registration = self.get(name)?;
        let integrity_failure = || DaemonError::IntegrityFailure {
            name: name.to_string(),
            path: artifact.to_path_buf(),
        };

        let path = artifact.canonicalize().map_err(|_| integrity_failure())?;
        if path != registration.path {
            tracing::warn!(name, expected = %registration.path.display(), actual = %path.display(), "Wrapper path differs from registration");
            return Err(integrity_failure());
        }

        let content = fs::read(&path).map_err(|_| integrity_failure())?;
        if hash_bytes(&content) != registration.hash {
            return Err(integrity_failure());
        }
        Ok(VerifiedScript {
            registration,
            content,
        })
    }

    /// Verdict for every registration, for diagnostics.
    pub fn audit(&self) -> Result<Vec<(String, Registration, Verdict)>> {
        Ok(self
            .load()?
            .scripts
            .into_iter()
            .map(|(name, registration)| {
                let verdict = match hash_file(&registration.path) {
                    Ok(hash) if hash == registration.hash => Verdict::Verified,
                    Ok(_) => Verdict::Modified,
                    Err(_) => Verdict::Missing,
                };
                (name, registration, verdict)
            })
            .collect())
    }
}

/// Hex SHA-256 of a buffer.
pub fn hash_bytes(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Hex SHA-256 of a file's contents.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
