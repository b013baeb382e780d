//! Post-reduction pixel filters
//!
//! Filters are independent transforms applied in the order the caller lists
//! them; reordering alpha clipping and color replacement changes the result.

use crate::color::{alpha, TRANSPARENT};
use crate::PixelBuffer;
use log::debug;

/// A single post-reduction transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostFilter {
	/// Zero out every pixel whose alpha is at or below the threshold
	AlphaClip {
		/// Inclusive alpha cutoff
		threshold: u8,
	},
	/// Replace one exact packed color with another
	ColorReplace {
		/// Color to match
		from: u32,
		/// Color written in its place
		to: u32,
	},
	/// Remove the fully transparent rows at the top of the buffer
	CropTransparentTop,
}

/// Applies filters to a buffer in the given order.
pub fn apply_all(buffer: &mut PixelBuffer, filters: &[PostFilter]) {
	for filter in filters {
		apply(buffer, filter);
	}
}

/// Applies one filter to a buffer.
pub fn apply(buffer: &mut PixelBuffer, filter: &PostFilter) {
	match *filter {
		PostFilter::AlphaClip { threshold } => alpha_clip(buffer, threshold),
		PostFilter::ColorReplace { from, to } => color_replace(buffer, from, to),
		PostFilter::CropTransparentTop => crop_transparent_top(buffer),
	}
}

/// Zeroes every pixel with alpha at or below the threshold.
fn alpha_clip(buffer: &mut PixelBuffer, threshold: u8) {
	for pixel in buffer.pixels_mut() {
		if alpha(*pixel) <= threshold {
			*pixel = TRANSPARENT;
		}
	}
}

/// Replaces every exact occurrence of `from` with `to`.
fn color_replace(buffer: &mut PixelBuffer, from: u32, to: u32) {
	for pixel in buffer.pixels_mut() {
		if *pixel == from {
			*pixel = to;
		}
	}
}

/// Drops the run of fully transparent rows at the top of the buffer.
///
/// Only the top edge is cropped. A buffer with no visible pixel at all keeps
/// its final row, so the result always has at least one row.
fn crop_transparent_top(buffer: &mut PixelBuffer) {
	let width = buffer.width() as usize;
	let height = buffer.height();

	let visible_row = buffer
		.pixels()
		.chunks_exact(width)
		.position(|row| row.iter().any(|&pixel| alpha(pixel) > 0));

	#[allow(clippy::cast_possible_truncation)]
	let cropped = match visible_row {
		Some(row) => row as u32,
		None => height - 1,
	};

	if cropped > 0 {
		debug!("cropping {cropped} transparent rows from the top");
		buffer.drop_top_rows(cropped);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::color::compose;

	fn buffer_from(pixels: &[u32], width: u32, height: u32) -> PixelBuffer {
		let bytes = pixels.iter().flat_map(|p| p.to_be_bytes()).collect::<Vec<_>>();
		PixelBuffer::from_rgba_bytes(width, height, &bytes).unwrap()
	}

	#[test]
	fn alpha_clip_zero_only_touches_fully_transparent_pixels() {
		let pixels = [compose(10, 20, 30, 1), compose(10, 20, 30, 0), compose(1, 2, 3, 255), 0x0000_0000];
		let mut buffer = buffer_from(&pixels, 2, 2);

		apply(&mut buffer, &PostFilter::AlphaClip { threshold: 0 });

		assert_eq!(buffer.pixels()[0], compose(10, 20, 30, 1));
		assert_eq!(buffer.pixels()[1], TRANSPARENT);
		assert_eq!(buffer.pixels()[2], compose(1, 2, 3, 255));
		assert_eq!(buffer.pixels()[3], TRANSPARENT);
	}

	#[test]
	fn alpha_clip_max_zeroes_every_pixel() {
		let pixels = [compose(10, 20, 30, 255), compose(50, 60, 70, 128), compose(1, 2, 3, 4), 0xffff_ffff];
		let mut buffer = buffer_from(&pixels, 2, 2);

		apply(&mut buffer, &PostFilter::AlphaClip { threshold: 255 });

		assert!(buffer.pixels().iter().all(|&pixel| pixel == TRANSPARENT));
	}

	#[test]
	fn alpha_clip_threshold_is_inclusive() {
		let pixels = [compose(9, 9, 9, 16), compose(9, 9, 9, 17)];
		let mut buffer = buffer_from(&pixels, 2, 1);

		apply(&mut buffer, &PostFilter::AlphaClip { threshold: 16 });

		assert_eq!(buffer.pixels()[0], TRANSPARENT);
		assert_eq!(buffer.pixels()[1], compose(9, 9, 9, 17));
	}

	#[test]
	fn color_replace_substitutes_exact_matches_only() {
		let from = compose(10, 20, 30, 255);
		let near = compose(10, 20, 31, 255);
		let to = compose(0, 0, 0, 255);
		let mut buffer = buffer_from(&[from, near, from, near], 2, 2);

		apply(&mut buffer, &PostFilter::ColorReplace { from, to });

		assert_eq!(buffer.pixels(), &[to, near, to, near]);
	}

	#[test]
	fn replacements_apply_in_the_order_given() {
		let a = compose(1, 1, 1, 255);
		let b = compose(2, 2, 2, 255);
		let c = compose(3, 3, 3, 255);
		let mut buffer = buffer_from(&[a, a], 2, 1);

		// a -> b first, then b -> c sees the pixels a just became
		apply_all(&mut buffer, &[
			PostFilter::ColorReplace { from: a, to: b },
			PostFilter::ColorReplace { from: b, to: c },
		]);

		assert_eq!(buffer.pixels(), &[c, c]);
	}

	#[test]
	fn crop_removes_leading_transparent_rows() {
		let clear = 0x0000_0000;
		let solid = compose(5, 5, 5, 255);
		let pixels = [clear, clear, clear, clear, solid, clear, clear, solid];
		let mut buffer = buffer_from(&pixels, 2, 4);

		apply(&mut buffer, &PostFilter::CropTransparentTop);

		assert_eq!(buffer.height(), 2);
		assert_eq!(buffer.pixels(), &[solid, clear, clear, solid]);
	}

	#[test]
	fn crop_keeps_a_buffer_with_a_visible_first_row_intact() {
		let solid = compose(5, 5, 5, 255);
		let pixels = [solid, 0x0000_0000, 0x0000_0000, 0x0000_0000];
		let mut buffer = buffer_from(&pixels, 2, 2);

		apply(&mut buffer, &PostFilter::CropTransparentTop);

		assert_eq!(buffer.height(), 2);
	}

	#[test]
	fn crop_on_a_fully_transparent_buffer_keeps_the_last_row() {
		let mut buffer = buffer_from(&[0x0000_0000; 6], 2, 3);

		apply(&mut buffer, &PostFilter::CropTransparentTop);

		assert_eq!(buffer.height(), 1);
		assert_eq!(buffer.pixels().len(), 2);
	}
}
