//! Shared pieces of the `visage-train` and `visage-recognize` programs.

/// Drawing identified faces onto frames.
pub mod annotate;
/// Command-line argument definitions.
pub mod args;
/// Settings loading and CLI overrides.
pub mod config;
/// Exit statuses and failure reporting.
pub mod exit;
/// Recognition session, camera and headless loop.
pub mod recognize;
/// Training workflow.
pub mod train;
/// Live recognition window.
pub mod viewer;
