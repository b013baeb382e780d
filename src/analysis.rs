//! Frequency analysis report for estimating palette-encoding savings
//!
//! The report is a diagnostic side product: no reduction depends on it. The
//! size estimate assumes palette indices get cheaper the fewer entries an
//! encoder has to address, stepping at each power-of-eight index width.

use crate::error::ReduceError;
use crate::frequency::FrequencyTable;
use crate::PixelBuffer;
use std::fmt;
use std::fs;
use std::path::Path;

/// Byte savings per pixel by palette rank: entries addressable with fewer
/// index bits save more of their 4-byte pixels
const SAVINGS_LADDER: [(usize, f64); 8] = [
	(8, 3.5),
	(72, 3.0),
	(584, 2.5),
	(4680, 2.0),
	(37_448, 1.5),
	(299_592, 1.0),
	(2_396_744, 0.5),
	(17_013_960, 0.0),
];

/// Frequency statistics and a compression estimate for one buffer.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
	/// Buffer size in bytes
	original_bytes: usize,
	/// Colors occurring more than once, with counts, most frequent first
	entries: Vec<(u32, u32)>,
	/// Number of colors occurring exactly once
	singles: usize,
	/// Total pixels covered by the repeated colors
	duplicates: u64,
	/// Cost of storing the palette itself, 4 bytes per entry
	palette_bytes: usize,
	/// Estimated byte delta from palette encoding, palette cost included
	size_adjust: i64,
}

impl AnalysisReport {
	/// Number of colors that would earn a palette entry.
	#[must_use]
	pub fn entry_count(&self) -> usize {
		self.entries.len()
	}

	/// Number of colors occurring exactly once.
	#[must_use]
	pub fn single_count(&self) -> usize {
		self.singles
	}

	/// Estimated size in bytes after palette encoding.
	#[must_use]
	#[allow(clippy::cast_possible_wrap)]
	pub fn estimated_bytes(&self) -> i64 {
		self.original_bytes as i64 + self.size_adjust
	}

	/// Writes the rendered report to a file.
	///
	/// # Errors
	///
	/// Returns [`ReduceError::Io`] when the file cannot be written.
	pub fn write_to(&self, path: &Path) -> Result<(), ReduceError> {
		fs::write(path, self.to_string())?;
		Ok(())
	}
}

/// Builds a frequency report for a buffer.
#[must_use]
pub fn analyze(buffer: &PixelBuffer) -> AnalysisReport {
	let table = FrequencyTable::build(buffer.pixels());

	let mut entries = Vec::new();
	let mut singles = 0_usize;
	let mut duplicates = 0_u64;
	for (color, count) in table.iter() {
		if count > 1 {
			entries.push((color, count));
			duplicates += u64::from(count);
		} else {
			singles += 1;
		}
	}
	entries.sort_by(|x, y| y.1.cmp(&x.1));

	let palette_bytes = entries.len() * 4;
	let mut savings = 0.0_f64;
	for (i, &(_, count)) in entries.iter().enumerate() {
		let rate = SAVINGS_LADDER
			.iter()
			.find(|&&(limit, _)| i < limit)
			.map(|&(_, rate)| rate);
		match rate {
			Some(rate) => savings -= rate * f64::from(count),
			// Beyond any sensible index width the entry costs extra
			None => savings += f64::from(count),
		}
	}

	#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
	let size_adjust = savings.floor() as i64 + palette_bytes as i64;

	AnalysisReport {
		original_bytes: buffer.pixels().len() * 4,
		entries,
		singles,
		duplicates,
		palette_bytes,
		size_adjust,
	}
}

impl fmt::Display for AnalysisReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "palette entries: {}", self.entries.len())?;
		writeln!(f, "palette bytes: {}", self.palette_bytes)?;
		writeln!(f, "original size: {}", self.original_bytes)?;
		writeln!(f, "singles: {}", self.singles)?;
		writeln!(f, "duplicates: {}", self.duplicates)?;
		writeln!(f, "total: {}", self.singles as u64 + self.duplicates)?;
		writeln!(f, "size adjust: {}", self.size_adjust)?;
		writeln!(f, "estimated size: {}", self.estimated_bytes())?;
		#[allow(clippy::cast_precision_loss)]
		let percent = self.estimated_bytes() as f64 / self.original_bytes as f64 * 100.0;
		writeln!(f, "estimated %: {percent:.2}")?;

		for (i, &(color, count)) in self.entries.iter().enumerate() {
			writeln!(f, "{:>5}.) 0x{color:08x}: {count}", i + 1)?;
		}

		Ok(())
	}
}
