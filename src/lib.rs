//! Reduce the number of distinct colors in an RGBA pixel buffer.
//!
//! The input is a decoded pixel buffer; decoding and re-encoding image files
//! is left to an external codec. Three reduction strategies are available,
//! selected through [`Reduction`]:
//!
//! - [`Reduction::Kmeans`] clusters the full pixel population around k
//!   centroid colors and replaces each pixel with its centroid.
//! - [`Reduction::PaletteDistance`] keeps the most frequent colors as a
//!   fixed palette and remaps everything else to the nearest kept color,
//!   optionally blending merged colors into their palette entry.
//! - [`Reduction::ToleranceMerge`] folds colors into nearby representatives
//!   without a fixed palette size, merging only near-duplicates.
//!
//! An ordered list of [`PostFilter`]s can follow any reduction.
//!
//! # Examples
//!
//! ## Cluster a buffer down to 8 colors.
//!
//! ```
//! use pixquant::{KmeansParams, PixelBuffer, Reduction};
//!
//! let bytes = vec![0x7f; 6 * 4 * 4];
//! let buffer = PixelBuffer::from_rgba_bytes(6, 4, &bytes)?;
//!
//! let params = KmeansParams { k: 8, ..KmeansParams::default() };
//! let reduced = pixquant::reduce(&buffer, &Reduction::Kmeans(params))?;
//! assert_eq!(reduced.width(), 6);
//! # Ok::<(), pixquant::ReduceError>(())
//! ```
//!
//! ## Run the full pipeline from a flag-style option set.
//!
//! ```
//! use pixquant::{PixelBuffer, ReduceOptions};
//!
//! let bytes = vec![0xff; 4 * 4 * 4];
//! let buffer = PixelBuffer::from_rgba_bytes(4, 4, &bytes)?;
//!
//! let options = ReduceOptions {
//! 	max_palette: Some(16),
//! 	blend_palette: true,
//! 	alpha_clip: Some(4),
//! 	..ReduceOptions::default()
//! };
//! let output = pixquant::run(&buffer, &options.into_config()?)?;
//! assert_eq!(output.pixels().len(), 16);
//! # Ok::<(), pixquant::ReduceError>(())
//! ```
//!
//! # Arguments
//!
//! ## K
//!
//! The number of clusters for [`Reduction::Kmeans`], `1..=pixel count`.
//!
//! Lower values run faster but lose more color detail. A k at or above the
//! number of distinct input colors degenerates into a near-identity mapping.
//!
//! ## Max Iterations
//!
//! The upper bound on k-means refinement passes.
//!
//! Iteration normally stops earlier, once the centroids move less than a
//! small threshold between passes or collapse onto fewer distinct colors
//! than requested. The bound exists so pathological inputs cannot spin.
//!
//! ## Batch Size
//!
//! The number of pixels assigned to centroids per batch.
//!
//! Batching bounds the peak working memory of the assignment step; each
//! batch's intermediate distances are discarded before the next batch runs.
//! With the `threads` feature enabled, batches run on the rayon pool. The
//! batch size never changes the result, only the memory/throughput balance.
//!
//! ## Palette Size
//!
//! The number of most-frequent colors [`Reduction::PaletteDistance`] keeps.
//!
//! Every other color is redirected to the nearest kept color by squared
//! channel distance. A size at or above the distinct color count leaves the
//! buffer unchanged.
//!
//! ## Blending
//!
//! With blending on, each kept palette color drifts toward the
//! occurrence-weighted average of the colors merged into it, so dropped
//! colors still pull the final palette their way.
//!
//! ## Tolerance
//!
//! The per-channel deviation [`Reduction::ToleranceMerge`] accepts when
//! folding a color into a representative, `1..=255`. The alpha channel is
//! allowed twice the tolerance. Unlike the other strategies there is no
//! target color count; only near-duplicates merge.
//!
//! ## Seed
//!
//! Seeds the random generator used for centroid initialization and
//! empty-cluster reseeding, making every run reproducible. Provide any
//! arbitrary value like `0`, `42`, or `123456789`.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::cargo)]
#![warn(clippy::use_debug, clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![warn(clippy::unwrap_used, clippy::unwrap_in_result)]
#![warn(clippy::unneeded_field_pattern, clippy::rest_pat_in_fully_bound_structs)]
#![warn(clippy::unnecessary_self_imports)]
#![warn(clippy::str_to_string, clippy::string_to_string, clippy::string_slice)]
#![warn(missing_docs, clippy::missing_docs_in_private_items, rustdoc::all)]
#![warn(clippy::float_cmp_const, clippy::lossy_float_literal)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::enum_glob_use)]
#![allow(clippy::unreadable_literal)]

use std::path::PathBuf;

pub mod analysis;
pub mod color;
pub mod error;
pub mod filters;
pub mod frequency;
pub mod kmeans;
pub mod palette_reduce;
pub mod tolerance;

pub use analysis::{analyze, AnalysisReport};
pub use error::ReduceError;
pub use filters::PostFilter;
pub use frequency::{FrequencyTable, PaletteEntry};
pub use kmeans::{InitStrategy, KmeansParams, KmeansResult};
pub use palette_reduce::PaletteParams;
pub use tolerance::ToleranceParams;

/// A decoded image as a flat, row-major sequence of packed RGBA colors.
///
/// Reductions never mutate their input; they produce a new buffer with the
/// same dimensions where pixel `i` corresponds to input pixel `i`. Only the
/// crop post-filter changes a buffer's height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
	/// Width in pixels
	width: u32,
	/// Height in pixels
	height: u32,
	/// Packed colors, row-major, `width * height` long
	pixels: Vec<u32>,
}

impl PixelBuffer {
	/// Builds a buffer from `width * height * 4` bytes of row-major RGBA.
	///
	/// # Errors
	///
	/// Returns [`ReduceError::ZeroDimension`] for an empty dimension and
	/// [`ReduceError::BufferSizeMismatch`] when the byte length does not
	/// match the dimensions.
	pub fn from_rgba_bytes(width: u32, height: u32, bytes: &[u8]) -> Result<Self, ReduceError> {
		if width == 0 || height == 0 {
			return Err(ReduceError::ZeroDimension);
		}
		if bytes.len() as u64 != u64::from(width) * u64::from(height) * 4 {
			return Err(ReduceError::BufferSizeMismatch { len: bytes.len(), width, height });
		}

		let pixels = bytes
			.chunks_exact(4)
			.map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
			.collect();

		Ok(Self { width, height, pixels })
	}

	/// Builds a buffer from pixels the caller already sized correctly.
	pub(crate) fn from_raw(width: u32, height: u32, pixels: Vec<u32>) -> Self {
		debug_assert_eq!(pixels.len() as u64, u64::from(width) * u64::from(height));
		Self { width, height, pixels }
	}

	/// Width in pixels.
	#[must_use]
	pub const fn width(&self) -> u32 {
		self.width
	}

	/// Height in pixels.
	#[must_use]
	pub const fn height(&self) -> u32 {
		self.height
	}

	/// The packed colors in row-major order.
	#[must_use]
	pub fn pixels(&self) -> &[u32] {
		&self.pixels
	}

	/// Mutable access to the packed colors.
	pub fn pixels_mut(&mut self) -> &mut [u32] {
		&mut self.pixels
	}

	/// Serializes back to row-major RGBA bytes.
	#[must_use]
	pub fn into_rgba_bytes(self) -> Vec<u8> {
		self.pixels.into_iter().flat_map(u32::to_be_bytes).collect()
	}

	/// Canonicalizes every fully transparent pixel to `0x0000_0000` in place.
	pub fn normalize_transparent(&mut self) {
		for pixel in &mut self.pixels {
			*pixel = color::normalize_transparent(*pixel);
		}
	}

	/// Iterates over the pixels with transparent colors canonicalized.
	pub(crate) fn normalized_pixels(&self) -> impl Iterator<Item = u32> + '_ {
		self.pixels.iter().map(|&pixel| color::normalize_transparent(pixel))
	}

	/// Removes `rows` full rows from the top of the buffer.
	pub(crate) fn drop_top_rows(&mut self, rows: u32) {
		debug_assert!(rows < self.height);
		self.pixels.drain(..rows as usize * self.width as usize);
		self.height -= rows;
	}
}

/// The reduction strategy for one invocation, chosen at the call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
	/// Iterative centroid refinement over the full pixel population
	Kmeans(KmeansParams),
	/// Frequency-ranked palette with nearest-color reassignment
	PaletteDistance(PaletteParams),
	/// Greedy merging of colors within a per-channel tolerance
	ToleranceMerge(ToleranceParams),
}

/// One exact color substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replacement {
	/// Color to match
	pub from: u32,
	/// Color written in its place
	pub to: u32,
}

/// The recognized flag-style options, one field per flag.
///
/// This mirrors a configuration file or command line surface; convert it
/// into a [`ReduceConfig`] with [`ReduceOptions::into_config`] before
/// running. `max_palette` and `tolerance` select different reduction
/// strategies, so setting both is rejected rather than silently preferring
/// one.
#[derive(Debug, Clone, Default)]
pub struct ReduceOptions {
	/// Reduce to this many palette entries
	pub max_palette: Option<u32>,
	/// Merge colors within this per-channel tolerance
	pub tolerance: Option<u32>,
	/// Blend merged colors into their palette entry
	pub blend_palette: bool,
	/// Zero out pixels with alpha at or below this
	pub alpha_clip: Option<u8>,
	/// Exact color substitutions, applied in order
	pub replace: Vec<Replacement>,
	/// Crop fully transparent rows from the top
	pub crop_top: bool,
	/// Write a frequency report for the input to this path
	pub analyze: Option<PathBuf>,
	/// Write a frequency report for the output to this path
	pub post_analysis: Option<PathBuf>,
}

impl ReduceOptions {
	/// Assembles the validated configuration for one pipeline run.
	///
	/// # Errors
	///
	/// Returns [`ReduceError::ConflictingReductions`] when both
	/// `max_palette` and `tolerance` are set.
	pub fn into_config(self) -> Result<ReduceConfig, ReduceError> {
		let reduction = match (self.max_palette, self.tolerance) {
			(Some(_), Some(_)) => return Err(ReduceError::ConflictingReductions),
			(Some(size), None) => {
				Some(Reduction::PaletteDistance(PaletteParams { size, blend: self.blend_palette }))
			},
			(None, Some(tolerance)) => Some(Reduction::ToleranceMerge(ToleranceParams { tolerance })),
			(None, None) => None,
		};

		let mut filters = Vec::new();
		if let Some(threshold) = self.alpha_clip {
			filters.push(PostFilter::AlphaClip { threshold });
		}
		for replacement in &self.replace {
			filters.push(PostFilter::ColorReplace { from: replacement.from, to: replacement.to });
		}
		if self.crop_top {
			filters.push(PostFilter::CropTransparentTop);
		}

		Ok(ReduceConfig {
			reduction,
			filters,
			analyze: self.analyze,
			post_analysis: self.post_analysis,
		})
	}
}

/// A validated pipeline configuration, assembled once before the run.
///
/// The engines read nothing but this; there is no ambient configuration.
#[derive(Debug, Clone, Default)]
pub struct ReduceConfig {
	/// The primary reduction, or `None` to only run filters and analysis
	pub reduction: Option<Reduction>,
	/// Post-filters in application order
	pub filters: Vec<PostFilter>,
	/// Write a frequency report for the input to this path
	pub analyze: Option<PathBuf>,
	/// Write a frequency report for the output to this path
	pub post_analysis: Option<PathBuf>,
}

/// Applies one reduction strategy to a buffer, producing a new buffer.
///
/// # Errors
///
/// Returns a configuration error when the strategy's parameters are invalid
/// for this buffer; no pixels are processed in that case.
pub fn reduce(buffer: &PixelBuffer, reduction: &Reduction) -> Result<PixelBuffer, ReduceError> {
	match reduction {
		Reduction::Kmeans(params) => kmeans::reduce(buffer, params),
		Reduction::PaletteDistance(params) => palette_reduce::reduce(buffer, params),
		Reduction::ToleranceMerge(params) => tolerance::reduce(buffer, params),
	}
}

/// Runs the full pipeline: analysis, reduction, post-filters, post-analysis.
///
/// # Errors
///
/// Returns configuration errors before any pixel processing and I/O errors
/// from writing the analysis reports.
pub fn run(buffer: &PixelBuffer, config: &ReduceConfig) -> Result<PixelBuffer, ReduceError> {
	if let Some(path) = &config.analyze {
		analysis::analyze(buffer).write_to(path)?;
	}

	let mut output = match &config.reduction {
		Some(reduction) => reduce(buffer, reduction)?,
		None => buffer.clone(),
	};

	filters::apply_all(&mut output, &config.filters);

	if let Some(path) = &config.post_analysis {
		analysis::analyze(&output).write_to(path)?;
	}

	Ok(output)
}
