//! Error types for configuration validation and report I/O

use thiserror::Error;

/// Errors surfaced by the reduction pipeline.
///
/// Configuration variants are rejected before any pixel processing begins.
/// Numeric edge cases inside the engines (empty clusters, zero-count buckets)
/// recover locally and never surface here.
#[derive(Debug, Error)]
pub enum ReduceError {
	/// A buffer dimension was zero
	#[error("image dimensions cannot be zero")]
	ZeroDimension,

	/// The byte buffer does not match `width * height * 4`
	#[error("pixel buffer length {len} does not match dimensions {width}x{height}")]
	BufferSizeMismatch {
		/// Provided buffer length in bytes
		len: usize,
		/// Expected width in pixels
		width: u32,
		/// Expected height in pixels
		height: u32,
	},

	/// The cluster count is zero or exceeds the pixel count
	#[error("cluster count {k} must be in 1..={pixels} (the pixel count)")]
	InvalidClusterCount {
		/// Requested cluster count
		k: u32,
		/// Number of pixels in the population
		pixels: usize,
	},

	/// The palette size is zero
	#[error("palette size must be at least 1, got {0}")]
	InvalidPaletteSize(u32),

	/// The tolerance is outside the per-channel range
	#[error("tolerance must be in 1..=255, got {0}")]
	InvalidTolerance(u32),

	/// The iteration limit is zero
	#[error("max iterations must be at least 1, got {0}")]
	InvalidIterationLimit(u32),

	/// The batch size is zero
	#[error("batch size must be at least 1, got {0}")]
	InvalidBatchSize(usize),

	/// Both `max_palette` and `tolerance` were specified
	#[error("max_palette and tolerance select different reduction strategies and cannot be combined")]
	ConflictingReductions,

	/// Writing an analysis report failed
	#[error("failed to write analysis report: {0}")]
	Io(#[from] std::io::Error),
}
