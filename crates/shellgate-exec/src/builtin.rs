//! Builtins answered without spawning a process

use std::path::{Component, Path, PathBuf};

/// Resolve `target` against `cwd` and check it is an existing directory.
///
/// `None` and `~` go to `home`. The result is normalized lexically, so `..`
/// never escapes through a symlink the caller cannot see.
pub async fn change_directory(
    cwd: &Path,
    target: Option<&str>,
    home: &str,
) -> std::result::Result<PathBuf, String> {
    let shown = target.unwrap_or("~");
    let requested = match target {
        None | Some("~") => PathBuf::from(home),
        Some(t) if t.starts_with("~/") => Path::new(home).join(&t[2..]),
        Some(t) => cwd.join(t),
    };
    let resolved = normalize(&requested);

    match tokio::fs::metadata(&resolved).await {
        Ok(meta) if meta.is_dir() => Ok(resolved),
        Ok(_) => Err(format!("cd: {shown}: Not a directory")),
        Err(_) => Err(format!("cd: {shown}: No such file or directory")),
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push("/");
    }
    out
}
