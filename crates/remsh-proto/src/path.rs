//! Remote path helpers and receiver command lines
//!
//! Remote paths always use `/` separators regardless of the local platform,
//! so these work on strings rather than [`std::path::Path`].

use std::borrow::Cow;

/// Flags that put `scp` into quiet sink mode
pub const SINK_FLAGS: &str = "-qt";

/// Last element of a remote path.
///
/// Trailing slashes are ignored; an empty path yields `.` and a path of only
/// slashes yields `/`.
pub fn remote_base_name(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    match trimmed.rfind('/') {
        Some(idx) => trimmed[idx + 1..].to_string(),
        None => trimmed.to_string(),
    }
}

/// Everything but the last element of a remote path, lexically cleaned.
///
/// `/tmp/out.bin` gives `/tmp`, `out.bin` gives `.`.
pub fn remote_dir(path: &str) -> String {
    let dir = match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "",
    };
    clean(dir)
}

/// Command line that starts a sink receiving into `dir`
pub fn receiver_command(program: &str, dir: &str) -> String {
    format!("{} {} {}", program, SINK_FLAGS, shell_escape::unix::escape(Cow::Borrowed(dir)))
}

fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            part => parts.push(part),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
