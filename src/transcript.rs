//! Video transcript extraction.
//!
//! [`TranscriptSource`] abstracts the caption backend; the shipped
//! implementation, [`YoutubeTranscripts`], lists a video's caption
//! tracks from the watch page and fetches the selected track in json3
//! format. Track selection prefers the requested language (manual over
//! auto-generated), then any manual track, then anything at all.

use async_trait::async_trait;
use log::{debug, warn};
use std::future::Future;
use std::time::Duration;

use crate::config::TranscriptConfig;
use crate::error::ExtractError;
use crate::models::{TranscriptSegment, VideoInfo};

/// Assumed length of a final segment that carries no explicit end time.
const DEFAULT_LAST_SEGMENT_SECS: f64 = 5.0;

/// One available caption track for a video.
#[derive(Debug, Clone)]
pub struct TranscriptTrack {
    /// BCP-47 primary subtag, e.g. `"en"`.
    pub language: String,
    /// True for speech-recognition ("asr") tracks.
    pub auto_generated: bool,
    /// Opaque fetch handle (the track's base URL for the real backend).
    pub fetch_url: String,
}

/// Read-only caption source for a video identifier.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Fetch title/author metadata for the video.
    async fn video_info(&self, video_id: &str) -> Result<VideoInfo, ExtractError>;

    /// List the caption tracks available for the video.
    async fn list_tracks(&self, video_id: &str) -> Result<Vec<TranscriptTrack>, ExtractError>;

    /// Fetch the ordered segments of one track.
    async fn fetch_track(&self, track: &TranscriptTrack)
        -> Result<Vec<TranscriptSegment>, ExtractError>;
}

/// Pick the best track for a preferred language.
///
/// Order: manual track in the preferred language, auto-generated track
/// in the preferred language, any manual track, any track at all.
pub fn select_track<'a>(
    tracks: &'a [TranscriptTrack],
    preferred_language: &str,
) -> Option<&'a TranscriptTrack> {
    let lang = preferred_language.to_lowercase();
    tracks
        .iter()
        .find(|t| t.language.to_lowercase() == lang && !t.auto_generated)
        .or_else(|| tracks.iter().find(|t| t.language.to_lowercase() == lang))
        .or_else(|| tracks.iter().find(|t| !t.auto_generated))
        .or_else(|| tracks.first())
}

/// Fill in missing durations: a segment without an explicit end runs to
/// the next segment's start; the last one gets a default length.
pub fn infer_end_times(segments: &mut [TranscriptSegment]) {
    let starts: Vec<f64> = segments.iter().map(|s| s.start_seconds).collect();
    for (i, seg) in segments.iter_mut().enumerate() {
        if seg.duration_seconds.is_none() {
            let inferred = starts
                .get(i + 1)
                .map(|next| (next - seg.start_seconds).max(0.0))
                .unwrap_or(DEFAULT_LAST_SEGMENT_SECS);
            seg.duration_seconds = Some(inferred);
        }
    }
}

/// Run `op` with bounded exponential backoff. Only [`ExtractError::Network`]
/// is retried; rate limits and hard failures surface immediately.
pub async fn with_retries<T, F, Fut>(max_retries: u32, mut op: F) -> Result<T, ExtractError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExtractError>>,
{
    let mut last_err = None;
    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1u64 << (attempt - 1).min(5));
            debug!("transient failure, retrying in {:?}", delay);
            tokio::time::sleep(delay).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(ExtractError::Network(msg)) => {
                last_err = Some(ExtractError::Network(msg));
            }
            Err(other) => return Err(other),
        }
    }
    Err(last_err.unwrap_or_else(|| ExtractError::Network("retries exhausted".to_string())))
}

/// Extract the transcript for a video: list tracks, select by language
/// preference, fetch, and normalize timing.
pub async fn extract_transcript(
    source: &dyn TranscriptSource,
    config: &TranscriptConfig,
    video_id: &str,
) -> Result<(VideoInfo, Vec<TranscriptSegment>), ExtractError> {
    let info = with_retries(config.max_retries, || source.video_info(video_id)).await?;

    let tracks = with_retries(config.max_retries, || source.list_tracks(video_id)).await?;
    if tracks.is_empty() {
        return Err(ExtractError::NotAvailable(format!(
            "video {} has no caption tracks",
            video_id
        )));
    }

    let track = select_track(&tracks, &config.language).ok_or_else(|| {
        ExtractError::NotAvailable(format!("video {} has no usable caption track", video_id))
    })?;
    debug!(
        "selected '{}' track for {} (auto_generated: {})",
        track.language, video_id, track.auto_generated
    );

    let mut segments = with_retries(config.max_retries, || source.fetch_track(track)).await?;
    if segments.is_empty() {
        return Err(ExtractError::NotAvailable(format!(
            "caption track for {} is empty",
            video_id
        )));
    }

    segments.sort_by(|a, b| {
        a.start_seconds
            .partial_cmp(&b.start_seconds)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    infer_end_times(&mut segments);

    Ok((info, segments))
}

// ============ YouTube backend ============

/// Caption source backed by YouTube's public endpoints: oEmbed for
/// metadata, the watch page for the track list, and the per-track base
/// URL (json3 format) for segments.
pub struct YoutubeTranscripts {
    client: reqwest::Client,
}

impl YoutubeTranscripts {
    pub fn new(config: &TranscriptConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    async fn get_text(&self, url: &str) -> Result<String, ExtractError> {
        let response = self
            .client
            .get(url)
            .header("Accept-Language", "en-US")
            .send()
            .await
            .map_err(|e| ExtractError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600);
            return Err(ExtractError::RateLimited {
                service: "youtube".to_string(),
                retry_after_secs,
            });
        }
        if status.as_u16() == 404 {
            return Err(ExtractError::NotAvailable(format!("{} returned 404", url)));
        }
        if !status.is_success() {
            return Err(ExtractError::Network(format!("{} returned {}", url, status)));
        }

        response
            .text()
            .await
            .map_err(|e| ExtractError::Network(e.to_string()))
    }
}

#[async_trait]
impl TranscriptSource for YoutubeTranscripts {
    async fn video_info(&self, video_id: &str) -> Result<VideoInfo, ExtractError> {
        let url = format!(
            "https://www.youtube.com/oembed?url=https://www.youtube.com/watch?v={}&format=json",
            video_id
        );
        let body = self.get_text(&url).await?;
        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ExtractError::Network(format!("bad oembed response: {}", e)))?;

        Ok(VideoInfo {
            title: json["title"].as_str().unwrap_or("").to_string(),
            author: json["author_name"].as_str().unwrap_or("").to_string(),
        })
    }

    async fn list_tracks(&self, video_id: &str) -> Result<Vec<TranscriptTrack>, ExtractError> {
        let url = format!("https://www.youtube.com/watch?v={}", video_id);
        let page = self.get_text(&url).await?;
        parse_caption_tracks(&page)
    }

    async fn fetch_track(
        &self,
        track: &TranscriptTrack,
    ) -> Result<Vec<TranscriptSegment>, ExtractError> {
        let url = format!("{}&fmt=json3", track.fetch_url);
        let body = self.get_text(&url).await?;
        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ExtractError::Network(format!("bad caption payload: {}", e)))?;
        Ok(parse_json3_events(&json))
    }
}

/// Pull the `captionTracks` array out of a watch-page HTML blob.
///
/// The player config embeds it as JSON; we slice out the array by
/// bracket matching rather than parsing the whole page.
pub fn parse_caption_tracks(page: &str) -> Result<Vec<TranscriptTrack>, ExtractError> {
    let marker = "\"captionTracks\":";
    let start = match page.find(marker) {
        Some(pos) => pos + marker.len(),
        None => return Ok(Vec::new()),
    };

    let rest = &page[start..];
    let array = slice_json_array(rest).ok_or_else(|| {
        ExtractError::Network("malformed captionTracks block in watch page".to_string())
    })?;

    let tracks: serde_json::Value = serde_json::from_str(array)
        .map_err(|e| ExtractError::Network(format!("bad captionTracks JSON: {}", e)))?;

    let mut out = Vec::new();
    if let Some(items) = tracks.as_array() {
        for item in items {
            let base_url = match item["baseUrl"].as_str() {
                Some(u) => u.replace("\\u0026", "&"),
                None => continue,
            };
            let language = item["languageCode"].as_str().unwrap_or("").to_string();
            let auto_generated = item["kind"].as_str() == Some("asr");
            out.push(TranscriptTrack {
                language,
                auto_generated,
                fetch_url: base_url,
            });
        }
    }

    if out.is_empty() {
        warn!("watch page contained a captionTracks block with no usable tracks");
    }
    Ok(out)
}

/// Return the balanced `[...]` array at the start of `s`, respecting
/// string literals and escapes.
fn slice_json_array(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'[') {
        return None;
    }

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Convert a json3 caption payload into ordered segments.
pub fn parse_json3_events(json: &serde_json::Value) -> Vec<TranscriptSegment> {
    let mut segments = Vec::new();

    if let Some(events) = json["events"].as_array() {
        for event in events {
            let start_ms = match event["tStartMs"].as_f64() {
                Some(ms) => ms,
                None => continue,
            };
            let duration = event["dDurationMs"].as_f64().map(|ms| ms / 1000.0);

            let text: String = event["segs"]
                .as_array()
                .map(|segs| {
                    segs.iter()
                        .filter_map(|s| s["utf8"].as_str())
                        .collect::<String>()
                })
                .unwrap_or_default();

            let text = text.replace('\n', " ").trim().to_string();
            if text.is_empty() {
                continue;
            }

            segments.push(TranscriptSegment {
                start_seconds: start_ms / 1000.0,
                duration_seconds: duration,
                text,
            });
        }
    }

    segments
}
