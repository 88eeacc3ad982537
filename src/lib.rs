//! # Linkbrief
//!
//! A URL content ingestion and synthesis pipeline.
//!
//! Linkbrief takes a single URL, figures out what kind of content lives
//! behind it (a YouTube video or a GitHub repository), extracts the
//! substance (transcript segments or repository tree and file
//! contents), normalizes it into a uniform document, and synthesizes a
//! structured analysis with a language model: summary, topic tags, and
//! timestamped chapters for videos or a structure digest for
//! repositories. Finished analyses can optionally be exported to a
//! Capacities space as weblink notes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────┐   ┌───────────────┐
//! │ Classify │──▶│   Extractors     │──▶│ ContentDocument│
//! │   URL    │   │ YouTube/GitHub  │   │   (uniform)    │
//! └──────────┘   └─────────────────┘   └───────┬───────┘
//!                                              │
//!                          ┌───────────────────┤
//!                          ▼                   ▼
//!                    ┌──────────┐       ┌──────────┐
//!                    │Synthesize│──────▶│  Export   │
//!                    │  (LLM)   │       │Capacities │
//!                    └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lbr classify "https://youtu.be/dQw4w9WgXcQ"
//! lbr analyze "https://youtu.be/dQw4w9WgXcQ"
//! lbr analyze "https://github.com/rust-lang/mdBook" --json
//! lbr analyze "https://youtu.be/dQw4w9WgXcQ" --export
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`classify`] | URL classification |
//! | [`transcript`] | YouTube transcript extraction |
//! | [`repo`] | GitHub repository extraction |
//! | [`document`] | Normalization into [`models::ContentDocument`] |
//! | [`chunk`] | Block-atomic document chunking |
//! | [`llm`] | Language model abstraction |
//! | [`synthesize`] | Summary, tags, chapters, structure digest |
//! | [`chapters`] | Anchor-to-timestamp chapter alignment |
//! | [`export`] | Capacities note export |
//! | [`pipeline`] | End-to-end orchestration |
//! | [`error`] | Error taxonomy |

pub mod chapters;
pub mod chunk;
pub mod classify;
pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod repo;
pub mod synthesize;
pub mod transcript;
