//! Path utilities.
//!
//! Resolution and containment checks for the trusted root. File tools resolve
//! every candidate path here before touching the filesystem.

use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Maximum number of symlinks followed while resolving a single path.
const MAX_SYMLINK_HOPS: usize = 40;

/// Get the locode configuration directory.
///
/// - `$XDG_CONFIG_HOME/locode` if set
/// - `~/.config/locode` otherwise
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("locode"))
}

/// Get the locode logs directory.
pub fn logs_dir() -> Option<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|p| p.join("locode").join("logs"))
}

/// Resolve an absolute path to its real location.
///
/// Symlinks are followed and `..` is collapsed against the already-resolved
/// prefix, so `link/..` means the parent of the link target. Components that
/// do not exist yet are kept as written. Unlike `canonicalize`, the path does
/// not have to exist.
///
/// Returns `None` when the symlink hop limit is exceeded.
pub fn resolve(path: &Path) -> Option<PathBuf> {
    let mut hops = 0;
    resolve_inner(path, &mut hops)
}

fn resolve_inner(path: &Path, hops: &mut usize) -> Option<PathBuf> {
    let mut resolved = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);

                let is_symlink = std::fs::symlink_metadata(&resolved)
                    .map(|meta| meta.file_type().is_symlink())
                    .unwrap_or(false);
                if is_symlink {
                    *hops += 1;
                    if *hops > MAX_SYMLINK_HOPS {
                        return None;
                    }
                    let target = std::fs::read_link(&resolved).ok()?;
                    resolved.pop();
                    // An absolute target replaces the prefix entirely.
                    let joined = resolved.join(target);
                    resolved = resolve_inner(&joined, hops)?;
                }
            }
        }
    }

    Some(resolved)
}

/// The directory boundary that file tools must stay inside.
///
/// Captured once per agent and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedRoot {
    path: PathBuf,
}

impl TrustedRoot {
    /// Create a trusted root from a directory path.
    ///
    /// Relative paths are taken relative to the process working directory.
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let resolved = resolve(&absolute).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("too many symlinks in {}", absolute.display()),
            )
        })?;

        if !resolved.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("trusted root is not a directory: {}", resolved.display()),
            ));
        }

        Ok(Self { path: resolved })
    }

    /// Capture the process working directory as the trusted root.
    pub fn current() -> io::Result<Self> {
        Self::new(std::env::current_dir()?)
    }

    /// The resolved root directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a candidate path, returning it only if it stays inside the root.
    ///
    /// Relative candidates are joined onto the root.
    pub fn resolve(&self, candidate: impl AsRef<Path>) -> Option<PathBuf> {
        let joined = self.path.join(candidate);
        let resolved = resolve(&joined)?;
        resolved.starts_with(&self.path).then_some(resolved)
    }

    /// Check whether a candidate path resolves inside the root.
    pub fn contains(&self, candidate: impl AsRef<Path>) -> bool {
        self.resolve(candidate).is_some()
    }
}

impl fmt::Display for TrustedRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Check if `candidate` resolves to `root` or somewhere below it.
///
/// Both paths are resolved (symlinks followed, `..` collapsed) before the
/// comparison. A root that cannot be resolved to a directory is never safe.
pub fn is_safe(root: &Path, candidate: &Path) -> bool {
    match TrustedRoot::new(root) {
        Ok(root) => root.contains(candidate),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_dir() {
        let dir = config_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with("locode"));
    }

    #[test]
    fn test_root_is_safe() {
        let dir = tempdir().unwrap();
        assert!(is_safe(dir.path(), dir.path()));
        assert!(is_safe(dir.path(), Path::new(".")));
    }

    #[test]
    fn test_descendants_are_safe() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();

        assert!(is_safe(dir.path(), Path::new("src/main.rs")));
        assert!(is_safe(dir.path(), &dir.path().join("src/nested")));
        // Targets that do not exist yet are still checked.
        assert!(is_safe(dir.path(), Path::new("new/dir/file.txt")));
        assert!(is_safe(dir.path(), Path::new("src/../README.md")));
    }

    #[test]
    fn test_traversal_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(!is_safe(dir.path(), Path::new("../../etc/passwd")));
        assert!(!is_safe(dir.path(), Path::new("missing/../../escape.txt")));
        assert!(!is_safe(dir.path(), Path::new("/etc/passwd")));
    }

    #[test]
    fn test_sibling_with_common_prefix_is_rejected() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("proj");
        let sibling = dir.path().join("proj2");
        std::fs::create_dir(&project).unwrap();
        std::fs::create_dir(&sibling).unwrap();

        assert!(!is_safe(&project, &sibling.join("file.txt")));
        assert!(!is_safe(&project, Path::new("../proj2/file.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let outside = tempdir().unwrap();
        let root = tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();

        assert!(!is_safe(root.path(), Path::new("link/secret.txt")));
        assert!(!is_safe(root.path(), Path::new("link")));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_escape_is_rejected() {
        let outside = tempdir().unwrap();
        let root = tempdir().unwrap();
        let target = outside.path().join("not-yet-created.txt");
        std::os::unix::fs::symlink(&target, root.path().join("dangling")).unwrap();

        assert!(!is_safe(root.path(), Path::new("dangling")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_root_is_safe() {
        let root = tempdir().unwrap();
        std::fs::create_dir(root.path().join("real")).unwrap();
        std::os::unix::fs::symlink(root.path().join("real"), root.path().join("alias")).unwrap();

        assert!(is_safe(root.path(), Path::new("alias/file.txt")));
        // `..` applies to the link target, which is still inside the root.
        assert!(is_safe(root.path(), Path::new("alias/../other.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_rejected() {
        let root = tempdir().unwrap();
        std::os::unix::fs::symlink(root.path().join("b"), root.path().join("a")).unwrap();
        std::os::unix::fs::symlink(root.path().join("a"), root.path().join("b")).unwrap();

        assert!(!is_safe(root.path(), Path::new("a/file.txt")));
    }

    #[test]
    fn test_trusted_root_resolve() {
        let dir = tempdir().unwrap();
        let root = TrustedRoot::new(dir.path()).unwrap();

        let resolved = root.resolve("hello.txt").unwrap();
        assert_eq!(resolved, root.path().join("hello.txt"));
        assert!(root.resolve("../hello.txt").is_none());
    }

    #[test]
    fn test_trusted_root_must_be_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();

        assert!(TrustedRoot::new(&file).is_err());
        assert!(!is_safe(&file, &file));
    }
}
