//! Core library for doctriage
//!
//! This crate implements the **Functional Core** of the doctriage application,
//! following the Functional Core - Imperative Shell architectural pattern.
//!
//! # Architecture Overview
//!
//! The doctriage project splits its work across three crates:
//!
//! - **`doctriage_core`** (this crate): the document model and the seven
//!   triage heuristics, with no network or process I/O
//! - **`pdf`**: PDF parsing and page rasterization
//! - **`doctriage`**: loading, OCR, parallel dispatch, CLI and MCP server
//!   (the Imperative Shell)
//!
//! ## Functional Core Principles
//!
//! Every heuristic in this crate is a function of the decoded pages, its
//! arguments and an [`AnalysisContext`]:
//!
//! - **Deterministic**: the same pages and arguments give the same result
//! - **Read-only**: tools borrow the [`Document`]; the only interior
//!   mutability is the once-per-page text memo
//! - **Testable**: tests build synthetic pages in memory, no PDF or OCR needed
//!
//! OCR is reached through the [`TextRecognizer`] trait, so the shell decides
//! which engine (if any) runs.
//!
//! # Module Organization
//!
//! - [`document`]: [`Document`], [`Page`] and lazy, memoized page text
//! - [`tools`]: the closed [`ToolName`] registry and one module per heuristic
//! - [`result`]: the [`ToolResult`] envelope and the [`HintsAggregate`]
//! - [`config`]: tunable thresholds, loadable from TOML
//! - [`raster`]: grayscale measurements shared by the heuristics
//! - [`text`]: per-page text extraction and search
//! - [`validation`]: SIN, postal code, email, phone and date range validators
//! - [`normalization`]: date, amount, name and address normalizers
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use doctriage_core::{AnalysisContext, Document, NoOcr, Page, ToolName};
//!
//! let document = Document::new("memory://scan", vec![Page::new(image)], Arc::new(NoOcr))?;
//! let ctx = AnalysisContext::new(Default::default(), 2024);
//!
//! let result = ToolName::DetectBlankPages.analyze(&document, &serde_json::Value::Null, &ctx);
//! assert!(result.success);
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod normalization;
pub mod raster;
pub mod result;
pub mod text;
pub mod tools;
pub mod validation;

pub use config::{AnalysisContext, TriageConfig};
pub use document::{Document, NoOcr, Page, TextRecognizer};
pub use error::{ConfigError, LoadError, OcrError, ToolError, UnknownTool};
pub use result::{Analysis, HintsAggregate, ToolResult};
pub use tools::{ToolName, ToolRequest};
