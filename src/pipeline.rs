//! End-to-end orchestration: classify, extract, normalize, synthesize.
//!
//! [`Pipeline`] owns the three capability backends behind trait
//! objects, so tests can run the whole flow against in-memory fakes.
//! One call to [`Pipeline::run`] handles one URL under the configured
//! overall deadline; export is deliberately not part of the run, a
//! finished analysis survives any export failure.

use log::info;
use std::time::Duration;

use crate::classify::{classify, SourceKind};
use crate::config::Config;
use crate::document;
use crate::error::{ExtractError, PipelineError};
use crate::llm::{LanguageModel, OpenAiChat};
use crate::models::AnalysisResult;
use crate::repo::{GithubClient, RepoHost, RepositoryExtractor};
use crate::synthesize::{SourceData, Synthesizer};
use crate::transcript::{extract_transcript, TranscriptSource, YoutubeTranscripts};

pub struct Pipeline {
    config: Config,
    transcripts: Box<dyn TranscriptSource>,
    repos: Box<dyn RepoHost>,
    model: Box<dyn LanguageModel>,
}

impl Pipeline {
    /// Assemble a pipeline from explicit backends. Tests use this with
    /// in-memory fakes.
    pub fn new(
        config: Config,
        transcripts: Box<dyn TranscriptSource>,
        repos: Box<dyn RepoHost>,
        model: Box<dyn LanguageModel>,
    ) -> Self {
        Self {
            config,
            transcripts,
            repos,
            model,
        }
    }

    /// Assemble a pipeline with the real YouTube, GitHub, and OpenAI
    /// backends.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let transcripts = YoutubeTranscripts::new(&config.transcript)?;
        let repos = GithubClient::new(&config.repository)?;
        let model = OpenAiChat::new(&config.model)?;
        Ok(Self::new(
            config,
            Box::new(transcripts),
            Box::new(repos),
            Box::new(model),
        ))
    }

    /// Process one URL to a finished analysis, or fail with the first
    /// unrecoverable error. The whole run is bounded by the configured
    /// overall timeout.
    pub async fn run(&self, url: &str) -> Result<AnalysisResult, PipelineError> {
        let deadline = Duration::from_secs(self.config.pipeline.overall_timeout_secs);
        match tokio::time::timeout(deadline, self.run_inner(url)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout(
                self.config.pipeline.overall_timeout_secs,
            )),
        }
    }

    async fn run_inner(&self, url: &str) -> Result<AnalysisResult, PipelineError> {
        let (doc, source) = match classify(url) {
            SourceKind::Unrecognized => {
                return Err(PipelineError::Unrecognized(url.to_string()));
            }
            SourceKind::Video { video_id } => {
                info!("extracting transcript for video {}", video_id);
                let (video_info, segments) = extract_transcript(
                    self.transcripts.as_ref(),
                    &self.config.transcript,
                    &video_id,
                )
                .await?;
                let doc = document::from_transcript(&segments);
                (
                    doc,
                    SourceData::Video {
                        info: video_info,
                        segments,
                    },
                )
            }
            SourceKind::Repository { owner, repo } => {
                info!("extracting repository {}/{}", owner, repo);
                // Glob patterns are validated at config load, so this
                // construction cannot fail on a loaded config.
                let extractor =
                    RepositoryExtractor::new(self.repos.as_ref(), &self.config.repository)
                        .map_err(|e| ExtractError::NotAvailable(e.to_string()))?;
                let content = extractor.extract(&owner, &repo, None).await?;
                let doc = document::from_repo(&content);
                (
                    doc,
                    SourceData::Repository {
                        owner,
                        repo,
                        content,
                    },
                )
            }
        };

        info!(
            "synthesizing {} blocks with {}",
            doc.blocks.len(),
            self.model.model_name()
        );
        let synthesizer =
            Synthesizer::new(self.model.as_ref(), &self.config.model, &self.config.chunking);
        let result = synthesizer.synthesize(url, &doc, &source).await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SynthesisError;
    use crate::models::{TranscriptSegment, VideoInfo};
    use crate::repo::{DirEntry, ReadmeFile};
    use crate::transcript::TranscriptTrack;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTranscripts {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TranscriptSource for CountingTranscripts {
        async fn video_info(&self, _video_id: &str) -> Result<VideoInfo, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(VideoInfo::default())
        }

        async fn list_tracks(&self, _video_id: &str) -> Result<Vec<TranscriptTrack>, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn fetch_track(
            &self,
            _track: &TranscriptTrack,
        ) -> Result<Vec<TranscriptSegment>, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    struct CountingRepos {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RepoHost for CountingRepos {
        async fn list_dir(
            &self,
            _owner: &str,
            _repo: &str,
            _path: &str,
            _git_ref: Option<&str>,
        ) -> Result<Vec<DirEntry>, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn readme(
            &self,
            _owner: &str,
            _repo: &str,
            _git_ref: Option<&str>,
        ) -> Result<Option<ReadmeFile>, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn file_bytes(
            &self,
            _owner: &str,
            _repo: &str,
            _path: &str,
            _git_ref: Option<&str>,
        ) -> Result<Vec<u8>, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    struct NoModel;

    #[async_trait]
    impl LanguageModel for NoModel {
        fn model_name(&self) -> &str {
            "none"
        }

        async fn complete(
            &self,
            _system: &str,
            _user: &str,
            _max_output_tokens: u32,
        ) -> Result<String, SynthesisError> {
            Err(SynthesisError::ModelUnavailable("unused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_unrecognized_url_touches_no_backend() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(
            Config::minimal(),
            Box::new(CountingTranscripts {
                calls: calls.clone(),
            }),
            Box::new(CountingRepos {
                calls: calls.clone(),
            }),
            Box::new(NoModel),
        );

        let err = pipeline.run("https://example.com/article").await.unwrap_err();
        assert!(matches!(err, PipelineError::Unrecognized(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_video_without_captions_is_not_available() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(
            Config::minimal(),
            Box::new(CountingTranscripts {
                calls: calls.clone(),
            }),
            Box::new(CountingRepos {
                calls: calls.clone(),
            }),
            Box::new(NoModel),
        );

        let err = pipeline
            .run("https://www.youtube.com/watch?v=abc123def45")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Extract(ExtractError::NotAvailable(_))
        ));
    }

    #[tokio::test]
    async fn test_overall_deadline() {
        struct StallingTranscripts;

        #[async_trait]
        impl TranscriptSource for StallingTranscripts {
            async fn video_info(&self, _video_id: &str) -> Result<VideoInfo, ExtractError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(VideoInfo::default())
            }

            async fn list_tracks(
                &self,
                _video_id: &str,
            ) -> Result<Vec<TranscriptTrack>, ExtractError> {
                Ok(Vec::new())
            }

            async fn fetch_track(
                &self,
                _track: &TranscriptTrack,
            ) -> Result<Vec<TranscriptSegment>, ExtractError> {
                Ok(Vec::new())
            }
        }

        let mut config = Config::minimal();
        config.pipeline.overall_timeout_secs = 1;

        let pipeline = Pipeline::new(
            config,
            Box::new(StallingTranscripts),
            Box::new(CountingRepos {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(NoModel),
        );

        let err = pipeline
            .run("https://youtu.be/abc123def45")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(1)));
    }
}
