//! Utility functions for file naming, moves and disk space

use std::path::{Path, PathBuf};

/// Suggested file name of an HTTP download
///
/// Tries the `Content-Disposition` header first (`filename=` and the RFC 5987
/// `filename*=` form), then the last segment of the URL path. The extension is
/// kept. Returns `None` when neither yields a usable name.
///
/// # Examples
///
/// ```ignore
/// let response = reqwest::get("https://download.kiwix.org/zim/wikipedia_en_ray_charles.zim").await?;
/// let name = suggested_filename(&response, response.url().as_str());
/// // Some("wikipedia_en_ray_charles.zim")
/// ```
pub fn suggested_filename(response: &reqwest::Response, url: &str) -> Option<String> {
    if let Some(content_disposition) = response.headers().get("content-disposition")
        && let Ok(value) = content_disposition.to_str()
        && let Some(name) = filename_from_content_disposition(value)
    {
        return Some(name);
    }

    // Fall back to extracting from URL path
    if let Ok(parsed_url) = url::Url::parse(url)
        && let Some(mut segments) = parsed_url.path_segments()
        && let Some(last_segment) = segments.next_back()
        && !last_segment.is_empty()
    {
        let decoded = urlencoding::decode(last_segment)
            .map(|name| name.into_owned())
            .unwrap_or_else(|_| last_segment.to_string());
        return sanitize_file_name(&decoded);
    }

    None
}

/// File name carried by a `Content-Disposition` header value
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    // Format: attachment; filename="file.zim" or filename*=UTF-8''file.zim
    for part in value.split(';') {
        let part = part.trim();
        if let Some(encoded) = part.strip_prefix("filename*=") {
            // Format is: charset'lang'encoded-filename
            if let Some(idx) = encoded.rfind('\'')
                && let Ok(decoded) = urlencoding::decode(&encoded[idx + 1..])
            {
                return sanitize_file_name(&decoded);
            }
        } else if let Some(name) = part.strip_prefix("filename=") {
            return sanitize_file_name(name.trim_matches('"'));
        }
    }
    None
}

/// Final path component of `name`, or `None` when nothing usable is left
///
/// Strips directories so a hostile header cannot escape the target directory.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let name = name.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

/// Move `from` to `to`, replacing an existing file at `to`
///
/// Tries a rename first. When the rename fails (typically across file
/// systems) the file is copied to a temporary sibling of `to` and renamed over
/// it, so `to` is either the complete new file or untouched.
pub async fn move_replacing(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }

    let staging = staging_path(to);
    if let Err(e) = tokio::fs::copy(from, &staging).await {
        tokio::fs::remove_file(&staging).await.ok();
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&staging, to).await {
        tokio::fs::remove_file(&staging).await.ok();
        return Err(e);
    }
    if let Err(e) = tokio::fs::remove_file(from).await {
        tracing::warn!(path = %from.display(), error = %e, "Failed to remove moved file source");
    }
    Ok(())
}

/// Hidden sibling used while copying into place
fn staging_path(to: &Path) -> PathBuf {
    let name = to
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    to.with_file_name(format!(".{}.partial", name))
}

/// Available disk space on the file system holding `path`
///
/// Walks up to the nearest existing ancestor, so a directory that has not
/// been created yet reports the space of its parent.
pub fn available_space_for(path: &Path) -> std::io::Result<u64> {
    let existing = path
        .ancestors()
        .find(|ancestor| ancestor.exists())
        .unwrap_or_else(|| Path::new("."));
    get_available_space(existing)
}

/// Get available disk space for a given path
///
/// Returns the number of bytes available to unprivileged users on the file
/// system holding `path`, which must exist.
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid, null-terminated C string, stat is zeroed
        // before the call and only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail is available blocks for unprivileged users
            let available_bytes = stat.f_bavail.saturating_mul(stat.f_frsize);
            Ok(available_bytes)
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is null-terminated and every output pointer refers
        // to a live, aligned u64 that is only read after a successful call.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut _total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut _total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}
