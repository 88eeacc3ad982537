//! Repository content extraction.
//!
//! [`RepoHost`] abstracts the code-hosting API; [`GithubClient`] is the
//! shipped implementation over the GitHub REST contents API. The
//! extractor walks the tree breadth-first with an explicit queue,
//! draining every page of every directory listing, classifies files as
//! binary or text, and fetches text contents in priority order (README
//! first, then shallowest-path-first) under a total byte budget.

use async_trait::async_trait;
use base64::Engine;
use globset::{Glob, GlobSet, GlobSetBuilder};
use log::{debug, warn};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use crate::config::RepositoryConfig;
use crate::error::ExtractError;
use crate::models::{NodeKind, RepoContent, RepoNode};
use crate::transcript::with_retries;

/// Bytes sampled from a file head when sniffing for binary content.
const BINARY_SAMPLE_BYTES: usize = 8192;

/// Extensions that are always treated as binary without sampling.
const BINARY_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".ico", ".bmp", ".webp", ".pdf", ".zip", ".tar", ".gz",
    ".bz2", ".xz", ".7z", ".exe", ".dll", ".so", ".dylib", ".bin", ".o", ".a", ".class", ".jar",
    ".woff", ".woff2", ".ttf", ".eot", ".otf", ".mp3", ".mp4", ".avi", ".mov", ".webm", ".wav",
    ".flac", ".wasm", ".sqlite", ".db", ".pyc",
];

/// One entry of a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Posix path relative to the repository root.
    pub path: String,
    pub kind: NodeKind,
    pub size_bytes: u64,
}

/// The repository's README, located by the host.
#[derive(Debug, Clone)]
pub struct ReadmeFile {
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Read-only access to a hosted repository.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// List one directory. Implementations must drain all pages; a
    /// partial listing is a contract violation.
    async fn list_dir(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Vec<DirEntry>, ExtractError>;

    /// Locate and fetch the repository README, if it has one.
    async fn readme(
        &self,
        owner: &str,
        repo: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<ReadmeFile>, ExtractError>;

    /// Fetch the raw bytes of one file.
    async fn file_bytes(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Vec<u8>, ExtractError>;
}

/// True when the path's extension is on the known-binary list.
pub fn has_binary_extension(path: &str) -> bool {
    let lower = path.to_lowercase();
    BINARY_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Sniff file bytes for binary content: a null byte in the sampled
/// head, or more than 10% of sampled bytes failing UTF-8 decoding.
/// Deterministic for a given byte sequence.
pub fn looks_binary(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(BINARY_SAMPLE_BYTES)];
    if sample.contains(&0) {
        return true;
    }

    let mut invalid = 0usize;
    let mut rest = sample;
    while !rest.is_empty() {
        match std::str::from_utf8(rest) {
            Ok(_) => break,
            Err(e) => {
                let valid = e.valid_up_to();
                match e.error_len() {
                    Some(len) => {
                        invalid += len;
                        rest = &rest[valid + len..];
                    }
                    // A char truncated by the sample boundary, not corruption.
                    None => break,
                }
            }
        }
    }

    invalid * 10 > sample.len()
}

/// Directory depth of a path ("a/b/c.txt" → 2).
fn depth(path: &str) -> usize {
    path.matches('/').count()
}

/// Render the tree as an indented outline for the structure digest.
pub fn tree_outline(tree: &[RepoNode]) -> String {
    let mut nodes: Vec<&RepoNode> = tree.iter().collect();
    nodes.sort_by(|a, b| a.path.cmp(&b.path));

    let mut out = String::new();
    for node in nodes {
        match node.kind {
            NodeKind::Directory => out.push_str(&format!("{}/\n", node.path)),
            NodeKind::File => {
                if node.is_binary {
                    out.push_str(&format!("{} ({} bytes, binary)\n", node.path, node.size_bytes));
                } else {
                    out.push_str(&format!("{} ({} bytes)\n", node.path, node.size_bytes));
                }
            }
        }
    }
    out
}

/// Walks a [`RepoHost`] and assembles [`RepoContent`].
pub struct RepositoryExtractor<'a> {
    host: &'a dyn RepoHost,
    config: &'a RepositoryConfig,
    include: GlobSet,
    exclude: GlobSet,
}

impl<'a> RepositoryExtractor<'a> {
    pub fn new(host: &'a dyn RepoHost, config: &'a RepositoryConfig) -> anyhow::Result<Self> {
        let include = build_globset(&config.include_globs)?;

        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/node_modules/**".to_string(),
            "**/target/**".to_string(),
            "**/*.lock".to_string(),
            "**/package-lock.json".to_string(),
        ];
        default_excludes.extend(config.exclude_globs.clone());
        let exclude = build_globset(&default_excludes)?;

        Ok(Self {
            host,
            config,
            include,
            exclude,
        })
    }

    /// Extract the full tree and budgeted text contents.
    pub async fn extract(
        &self,
        owner: &str,
        repo: &str,
        git_ref: Option<&str>,
    ) -> Result<RepoContent, ExtractError> {
        let mut tree: Vec<RepoNode> = Vec::new();
        let mut files: Vec<DirEntry> = Vec::new();

        // Breadth-first walk; the queue keeps shallower directories
        // ahead, which is also the content fetch priority.
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(String::new());

        while let Some(dir) = queue.pop_front() {
            let mut entries = with_retries(self.config.max_retries, || {
                self.host.list_dir(owner, repo, &dir, git_ref)
            })
            .await?;
            entries.sort_by(|a, b| a.path.cmp(&b.path));

            for entry in entries {
                match entry.kind {
                    NodeKind::Directory => {
                        tree.push(RepoNode {
                            path: entry.path.clone(),
                            kind: NodeKind::Directory,
                            is_binary: false,
                            size_bytes: 0,
                        });
                        queue.push_back(entry.path);
                    }
                    NodeKind::File => {
                        tree.push(RepoNode {
                            path: entry.path.clone(),
                            kind: NodeKind::File,
                            is_binary: has_binary_extension(&entry.path),
                            size_bytes: entry.size_bytes,
                        });
                        files.push(entry);
                    }
                }
            }
        }

        let mut texts: Vec<(String, String)> = Vec::new();
        let mut remaining = self.config.content_budget_bytes;
        let mut readme_path: Option<String> = None;

        // README first, included even when it alone exceeds the budget.
        let readme = with_retries(self.config.max_retries, || {
            self.host.readme(owner, repo, git_ref)
        })
        .await?;
        if let Some(readme) = readme {
            let text = String::from_utf8_lossy(&readme.bytes).into_owned();
            remaining = remaining.saturating_sub(text.len() as u64);
            readme_path = Some(readme.path.clone());
            texts.push((readme.path, text));
        } else {
            debug!("{}/{} has no README", owner, repo);
        }

        // Remaining text candidates, shallowest path first.
        let mut candidates: Vec<&DirEntry> = files
            .iter()
            .filter(|f| Some(&f.path) != readme_path.as_ref())
            .filter(|f| !has_binary_extension(&f.path))
            .filter(|f| f.size_bytes <= self.config.max_file_bytes)
            .filter(|f| self.include.is_match(&f.path) && !self.exclude.is_match(&f.path))
            .collect();
        candidates.sort_by(|a, b| depth(&a.path).cmp(&depth(&b.path)).then(a.path.cmp(&b.path)));

        for file in candidates {
            if file.size_bytes > remaining {
                continue;
            }

            let bytes = with_retries(self.config.max_retries, || {
                self.host.file_bytes(owner, repo, &file.path, git_ref)
            })
            .await?;

            if looks_binary(&bytes) {
                // Extension said text, content says otherwise.
                if let Some(node) = tree.iter_mut().find(|n| n.path == file.path) {
                    node.is_binary = true;
                }
                continue;
            }

            remaining = remaining.saturating_sub(bytes.len() as u64);
            texts.push((file.path.clone(), String::from_utf8_lossy(&bytes).into_owned()));
        }

        tree.sort_by(|a, b| a.path.cmp(&b.path));

        if texts.is_empty() && tree.is_empty() {
            return Err(ExtractError::NotFound(format!(
                "{}/{} has no readable content",
                owner, repo
            )));
        }

        Ok(RepoContent {
            tree,
            texts,
            readme_path,
        })
    }
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

// ============ GitHub backend ============

/// GitHub REST v3 client over the contents API.
///
/// Directory listings are paginated with `per_page=100`; every page is
/// fetched until a short page arrives, so a listing is never truncated.
pub struct GithubClient {
    api_base: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl GithubClient {
    /// Create a client from configuration. The bearer token is read
    /// from the configured environment variable; unauthenticated access
    /// works for public repositories at a much lower rate limit.
    pub fn new(config: &RepositoryConfig) -> anyhow::Result<Self> {
        let token = std::env::var(&config.token_env).ok();
        if token.is_none() {
            warn!(
                "{} not set; using unauthenticated GitHub access",
                config.token_env
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("linkbrief")
            .build()?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, ExtractError> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExtractError::Network(e.to_string()))?;

        let status = response.status();
        match status.as_u16() {
            404 => return Err(ExtractError::NotFound(url.to_string())),
            403 | 429 => {
                // Primary rate limit exhaustion also arrives as 403.
                let reset: Option<i64> = response
                    .headers()
                    .get("x-ratelimit-reset")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                let remaining: Option<u64> = response
                    .headers()
                    .get("x-ratelimit-remaining")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                if status.as_u16() == 429 || remaining == Some(0) {
                    let retry_after_secs = reset
                        .map(|r| (r - chrono::Utc::now().timestamp()).max(0) as u64)
                        .unwrap_or(3600);
                    return Err(ExtractError::RateLimited {
                        service: "github".to_string(),
                        retry_after_secs,
                    });
                }
                return Err(ExtractError::NotFound(format!("{} returned 403", url)));
            }
            _ => {}
        }
        if !status.is_success() {
            return Err(ExtractError::Network(format!("{} returned {}", url, status)));
        }

        response
            .json()
            .await
            .map_err(|e| ExtractError::Network(e.to_string()))
    }

    fn ref_query(git_ref: Option<&str>) -> String {
        match git_ref {
            Some(r) => format!("&ref={}", r),
            None => String::new(),
        }
    }
}

/// Directory listing page size.
const LIST_PAGE_SIZE: usize = 100;

/// One page of a directory listing. `raw_len` is the item count before
/// filtering, which is what decides whether another page exists.
struct ListingPage {
    entries: Vec<DirEntry>,
    raw_len: usize,
}

/// Fetch pages until a short one arrives. Stopping is driven by the raw
/// page length, so a full page of skipped entries still continues and a
/// listing is never cut short.
async fn drain_pages<F, Fut>(mut fetch_page: F) -> Result<Vec<DirEntry>, ExtractError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<ListingPage, ExtractError>>,
{
    let mut entries = Vec::new();
    let mut page = 1u32;
    loop {
        let listing = fetch_page(page).await?;
        let last = listing.raw_len < LIST_PAGE_SIZE;
        entries.extend(listing.entries);
        if last {
            return Ok(entries);
        }
        page += 1;
    }
}

/// Parse one contents-API directory page. Symlinks and submodules are
/// skipped but still counted toward `raw_len`.
fn parse_dir_listing(json: &serde_json::Value, path: &str) -> Result<ListingPage, ExtractError> {
    let items = json.as_array().ok_or_else(|| {
        ExtractError::Network(format!("expected a directory listing at {}", path))
    })?;

    let mut entries = Vec::new();
    for item in items {
        let item_path = item["path"].as_str().unwrap_or("").to_string();
        if item_path.is_empty() {
            continue;
        }
        let kind = match item["type"].as_str() {
            Some("dir") => NodeKind::Directory,
            Some("file") => NodeKind::File,
            _ => continue,
        };
        entries.push(DirEntry {
            path: item_path,
            kind,
            size_bytes: item["size"].as_u64().unwrap_or(0),
        });
    }

    Ok(ListingPage {
        entries,
        raw_len: items.len(),
    })
}

/// Decode a contents-API base64 payload (newline-separated chunks).
fn decode_content(value: &serde_json::Value) -> Result<Vec<u8>, ExtractError> {
    let raw = value["content"].as_str().unwrap_or("");
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| ExtractError::Network(format!("bad base64 content: {}", e)))
}

#[async_trait]
impl RepoHost for GithubClient {
    async fn list_dir(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Vec<DirEntry>, ExtractError> {
        drain_pages(|page| {
            let url = format!(
                "{}/repos/{}/{}/contents/{}?per_page={}&page={}{}",
                self.api_base,
                owner,
                repo,
                path,
                LIST_PAGE_SIZE,
                page,
                Self::ref_query(git_ref),
            );
            async move {
                let json = self.get_json(&url).await?;
                parse_dir_listing(&json, path)
            }
        })
        .await
    }

    async fn readme(
        &self,
        owner: &str,
        repo: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<ReadmeFile>, ExtractError> {
        let url = format!(
            "{}/repos/{}/{}/readme?page=1{}",
            self.api_base,
            owner,
            repo,
            Self::ref_query(git_ref),
        );
        let json = match self.get_json(&url).await {
            Ok(json) => json,
            Err(ExtractError::NotFound(_)) => return Ok(None),
            Err(other) => return Err(other),
        };

        let path = json["path"].as_str().unwrap_or("README.md").to_string();
        let bytes = decode_content(&json)?;
        Ok(Some(ReadmeFile { path, bytes }))
    }

    async fn file_bytes(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Vec<u8>, ExtractError> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}?page=1{}",
            self.api_base,
            owner,
            repo,
            path,
            Self::ref_query(git_ref),
        );
        let json = self.get_json(&url).await?;
        decode_content(&json)
    }
}
