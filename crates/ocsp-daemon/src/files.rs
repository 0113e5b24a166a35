//! Bundle discovery and `.ocsp` file management.
//!
//! Next to each certificate bundle `<bundle>` the daemon keeps
//! `<bundle>.ocsp`, the raw DER of the latest response. The file's
//! mtime is set to the response's `thisUpdate` so a restarted daemon
//! can tell how old its cache is. Issuer certificates may live in
//! `<bundle>.issuer`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use filetime::FileTime;
use ocsp_proto::{needs_refresh_at, parse_response, Response};
use tracing::debug;

/// Suffixes that never denote a certificate bundle: our own output
/// (`.ocsp`), detached issuers (`.issuer`), signed certificate
/// timestamp lists (`.sctl`, HAProxy), and private keys (`.key`).
const IGNORED_SUFFIXES: &[&str] = &[".ocsp", ".issuer", ".sctl", ".key"];

/// Whether directory scanning should skip this file name.
pub fn should_ignore_file_name(name: &str) -> bool {
    IGNORED_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// `<bundle>.ocsp`, the cache file for a bundle's latest response.
pub fn ocsp_file(bundle: &Path) -> PathBuf {
    let mut os = bundle.as_os_str().to_os_string();
    os.push(".ocsp");
    PathBuf::from(os)
}

/// Expands command-line arguments into bundle files and the
/// directories to watch.
///
/// A directory argument contributes all its regular files except those
/// with ignored suffixes. Arguments that do not exist are skipped.
pub fn expand_paths(args: &[PathBuf]) -> io::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for arg in args {
        let meta = match fs::metadata(arg) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if meta.is_dir() {
            dirs.push(arg.clone());
            for dir_entry in fs::read_dir(arg)? {
                let dir_entry = dir_entry?;
                let name = dir_entry.file_name();
                if should_ignore_file_name(&name.to_string_lossy()) {
                    continue;
                }
                match dir_entry.metadata() {
                    Ok(meta) if meta.is_file() => files.push(dir_entry.path()),
                    // Entries disappearing mid-scan are treated as if
                    // they never existed.
                    _ => {}
                }
            }
        } else if meta.is_file() {
            files.push(arg.clone());
        }
    }
    Ok((files, dirs))
}

/// Loads the cached response for a bundle, if a usable one is on disk.
///
/// The file's mtime is carried as the `Last-Modified` validator. When
/// the bytes no longer parse (or fail verification against the issuer)
/// the cache is ignored entirely; when they cannot be read but the file
/// exists, the mtime alone is still a useful validator.
pub fn load_cached_response(bundle: &Path, issuer_der: &[u8]) -> Option<Response> {
    let path = ocsp_file(bundle);
    let meta = fs::metadata(&path).ok()?;
    let last_modified = meta.modified().ok().map(DateTime::<Utc>::from);

    let raw = match fs::read(&path) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "unreadable .ocsp file");
            return Some(Response {
                last_modified,
                ..Response::default()
            });
        }
    };
    match parse_response(&raw, issuer_der) {
        Ok(ocsp) => Some(Response {
            ocsp: Some(ocsp),
            raw,
            max_age: None,
            etag: None,
            last_modified,
        }),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "stale .ocsp file does not parse");
            None
        }
    }
}

/// Writes a refreshed response next to its bundle and stamps the file
/// with the response's `thisUpdate`.
pub fn persist_response(
    bundle: &Path,
    raw: &[u8],
    this_update: DateTime<Utc>,
) -> io::Result<()> {
    let path = ocsp_file(bundle);
    fs::write(&path, raw)?;
    let mtime = FileTime::from_unix_time(this_update.timestamp(), 0);
    filetime::set_file_mtime(&path, mtime)?;
    Ok(())
}

/// Applies the refresh heuristic to an on-disk `.ocsp` file.
///
/// A missing, unreadable, or unparsable file always needs a refresh.
pub fn needs_refresh_file(bundle: &Path, issuer_der: &[u8], period: Duration) -> bool {
    let path = ocsp_file(bundle);
    let Ok(meta) = fs::metadata(&path) else {
        return true;
    };
    let Ok(raw) = fs::read(&path) else {
        return true;
    };
    let Ok(ocsp) = parse_response(&raw, issuer_der) else {
        return true;
    };
    let mtime = meta.modified().ok().map(DateTime::<Utc>::from);
    needs_refresh_at(&ocsp, mtime, period, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignored_suffixes() {
        assert!(should_ignore_file_name("example.com.pem.ocsp"));
        assert!(should_ignore_file_name("example.com.pem.issuer"));
        assert!(should_ignore_file_name("example.com.pem.sctl"));
        assert!(should_ignore_file_name("example.com.key"));
        assert!(!should_ignore_file_name("example.com.pem"));
    }

    #[test]
    fn test_ocsp_file_name() {
        assert_eq!(
            ocsp_file(Path::new("/etc/ssl/site.pem")),
            Path::new("/etc/ssl/site.pem.ocsp")
        );
    }

    #[test]
    fn test_expand_paths_skips_ignored_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.pem"), b"x").unwrap();
        fs::write(dir.path().join("a.pem.ocsp"), b"x").unwrap();
        fs::write(dir.path().join("a.pem.issuer"), b"x").unwrap();
        fs::write(dir.path().join("b.pem"), b"x").unwrap();

        let args = vec![
            dir.path().to_path_buf(),
            dir.path().join("missing.pem"),
        ];
        let (mut files, dirs) = expand_paths(&args).unwrap();
        files.sort();
        assert_eq!(
            files,
            vec![dir.path().join("a.pem"), dir.path().join("b.pem")]
        );
        assert_eq!(dirs, vec![dir.path().to_path_buf()]);
    }

    #[test]
    fn test_load_cached_response_absent_and_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("site.pem");
        assert!(load_cached_response(&bundle, b"issuer").is_none());

        // Unparsable cache bytes are discarded entirely.
        fs::write(ocsp_file(&bundle), b"garbage").unwrap();
        assert!(load_cached_response(&bundle, b"issuer").is_none());
    }

    #[test]
    fn test_persist_sets_mtime_to_this_update() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("site.pem");
        let this_update = DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        persist_response(&bundle, b"raw-der", this_update).unwrap();

        let meta = fs::metadata(ocsp_file(&bundle)).unwrap();
        let mtime = DateTime::<Utc>::from(meta.modified().unwrap());
        assert_eq!(mtime, this_update);
        assert_eq!(fs::read(ocsp_file(&bundle)).unwrap(), b"raw-der");
    }

    #[test]
    fn test_needs_refresh_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("site.pem");
        assert!(needs_refresh_file(&bundle, b"issuer", Duration::from_secs(3600)));
    }
}
