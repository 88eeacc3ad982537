//! URL classification.
//!
//! Decides, from the URL alone, whether the input points at a video or
//! a source-code repository, and parses out the identifier the matching
//! extractor needs. Pure string work, no I/O.

/// Classification outcome for an input URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// A video-hosting link, with the extracted video id.
    Video { video_id: String },
    /// A code-hosting repository link.
    Repository { owner: String, repo: String },
    /// Neither; the pipeline halts without any network call.
    Unrecognized,
}

/// Classify a URL as video, repository, or unrecognized.
pub fn classify(url: &str) -> SourceKind {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return SourceKind::Unrecognized;
    }

    if let Some(video_id) = extract_video_id(trimmed) {
        return SourceKind::Video { video_id };
    }

    if let Some((owner, repo)) = extract_repo(trimmed) {
        return SourceKind::Repository { owner, repo };
    }

    SourceKind::Unrecognized
}

/// Valid characters of a YouTube video id.
fn is_video_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Read an 11-character video id starting at `rest`.
fn take_video_id(rest: &str) -> Option<String> {
    let id: String = rest.chars().take(11).collect();
    if id.len() == 11 && id.chars().all(is_video_id_char) {
        Some(id)
    } else {
        None
    }
}

/// Extract a video id from the known YouTube URL shapes:
/// `watch?v=`, `youtu.be/`, `shorts/`, and `embed/`.
pub fn extract_video_id(url: &str) -> Option<String> {
    // ASCII lowering keeps byte offsets valid for slicing `url`.
    let lower = url.to_ascii_lowercase();
    if !lower.contains("youtube.com") && !lower.contains("youtu.be") {
        return None;
    }

    for marker in ["v=", "youtu.be/", "/shorts/", "/embed/"] {
        if let Some(pos) = lower.find(marker) {
            // Index into the original string so the id keeps its case.
            let rest = &url[pos + marker.len()..];
            if let Some(id) = take_video_id(rest) {
                return Some(id);
            }
        }
    }
    None
}

/// Extract `(owner, repo)` from a GitHub repository URL.
pub fn extract_repo(url: &str) -> Option<(String, String)> {
    let lower = url.to_ascii_lowercase();
    let pos = lower.find("github.com/")?;
    let rest = &url[pos + "github.com/".len()..];

    let mut parts = rest
        .trim_end_matches('/')
        .split('/')
        .filter(|p| !p.is_empty());
    let owner = parts.next()?;
    let repo = parts.next()?;

    let repo = repo
        .split(&['?', '#'][..])
        .next()
        .unwrap_or(repo)
        .trim_end_matches(".git");

    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}
