// Copyright 2025 Muvon Un Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Recursive character-splitting chunker (§4.5): language-agnostic, splits on a
//! priority list of separators and honors `chunk_size`/`chunk_overlap` in
//! characters.

use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::constants::language_for_suffix;

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
	pub content: String,
	pub line_start: usize,
	pub line_end: usize,
	pub char_start: usize,
	pub char_end: usize,
	pub content_hash: String,
	pub file_type: String,
	pub language: String,
}

pub fn content_hash(text: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(text.as_bytes());
	format!("{:x}", hasher.finalize())
}

fn suffix_of(file_name: &str) -> String {
	std::path::Path::new(file_name)
		.extension()
		.and_then(|e| e.to_str())
		.unwrap_or("")
		.to_string()
}

/// Split `text` into merged pieces of at most `chunk_size` characters using the
/// first separator in `separators` that actually occurs (the empty string
/// always "occurs", splitting per character as the final fallback), then
/// recursing on oversized merged pieces with the remaining separator list.
fn split_text(text: &str, separators: &[String], chunk_size: usize) -> Vec<String> {
	if text.is_empty() {
		return vec![];
	}

	let (sep, rest) = match separators.split_first() {
		Some((first, rest)) => (first.clone(), rest),
		None => return vec![text.to_string()],
	};

	let pieces: Vec<&str> = if sep.is_empty() {
		// Per-character fallback split.
		text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect()
	} else {
		text.split(sep.as_str()).collect()
	};

	// Greedily merge consecutive pieces, rejoining with `sep`, staying at/under chunk_size.
	let mut merged: Vec<String> = Vec::new();
	let mut current = String::new();
	for (idx, piece) in pieces.iter().enumerate() {
		let candidate_len = if current.is_empty() {
			piece.chars().count()
		} else {
			current.chars().count() + sep.chars().count() + piece.chars().count()
		};

		if !current.is_empty() && candidate_len > chunk_size {
			merged.push(current.clone());
			current.clear();
		}

		if !current.is_empty() {
			current.push_str(&sep);
		}
		current.push_str(piece);
		let _ = idx;
	}
	if !current.is_empty() {
		merged.push(current);
	}

	// Recurse into any merged piece still over budget, using the narrower separator list.
	let mut out = Vec::new();
	for piece in merged {
		if piece.chars().count() > chunk_size && !rest.is_empty() {
			out.extend(split_text(&piece, rest, chunk_size));
		} else {
			out.push(piece);
		}
	}
	out
}

/// Compute 1-based inclusive line numbers spanning `[start, end)` char offsets
/// (offsets are char indices, not byte indices) within `text`.
fn line_range_for(chars: &[char], start: usize, end: usize) -> (usize, usize) {
	let mut line = 1usize;
	let mut line_start = 1usize;
	for (i, c) in chars.iter().enumerate().take(start) {
		if *c == '\n' {
			line += 1;
		}
		let _ = i;
	}
	line_start = line;
	let mut line_end = line_start;
	for c in chars.iter().take(end.min(chars.len())).skip(start) {
		if *c == '\n' {
			line_end += 1;
		}
	}
	(line_start, line_end)
}

/// Chunk `content` (the text of one file) per §4.5. Empty or whitespace-only
/// input yields no chunks.
pub fn chunk_file(content: &str, file_name: &str, config: &ChunkingConfig) -> Vec<Chunk> {
	if content.trim().is_empty() {
		return vec![];
	}

	let suffix = suffix_of(file_name);
	let language = language_for_suffix(&suffix);

	let pieces = split_text(content, &config.separators, config.chunk_size);

	let chars: Vec<char> = content.chars().collect();
	let step = std::cmp::max(1, config.chunk_size.saturating_sub(config.chunk_overlap));

	let mut chunks = Vec::with_capacity(pieces.len());
	let mut search_from = 0usize;

	for piece in pieces {
		if piece.trim().is_empty() {
			continue;
		}
		let piece_chars: Vec<char> = piece.chars().collect();

		// Locate this piece's start by searching forward from the expected
		// position (previous chunk's start + step), falling back to a full
		// forward scan if the fast guess misses (merge pass can shift offsets).
		let char_start = find_piece_start(&chars, &piece_chars, search_from.saturating_sub(0).min(chars.len()))
			.or_else(|| find_piece_start(&chars, &piece_chars, 0))
			.unwrap_or(search_from.min(chars.len()));
		let char_end = (char_start + piece_chars.len()).min(chars.len());

		let (line_start, line_end) = line_range_for(&chars, char_start, char_end);

		chunks.push(Chunk {
			content: piece,
			line_start,
			line_end,
			char_start,
			char_end,
			content_hash: content_hash(&chars[char_start..char_end].iter().collect::<String>()),
			file_type: suffix.clone(),
			language: language.clone(),
		});

		search_from = char_start + step;
	}

	if chunks.is_empty() {
		// A chunking exception (or a text that produced no non-empty pieces, e.g.
		// purely separator-only content) yields one chunk covering the whole file.
		let (line_start, line_end) = line_range_for(&chars, 0, chars.len());
		chunks.push(Chunk {
			content: content.to_string(),
			line_start,
			line_end,
			char_start: 0,
			char_end: chars.len(),
			content_hash: content_hash(content),
			file_type: suffix,
			language,
		});
	}

	chunks
}

fn find_piece_start(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
	if needle.is_empty() {
		return Some(from.min(haystack.len()));
	}
	if from > haystack.len() {
		return None;
	}
	haystack[from..].windows(needle.len()).position(|w| w == needle).map(|p| p + from)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cfg(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
		ChunkingConfig {
			chunk_size,
			chunk_overlap,
			separators: vec!["\n\n".into(), "\n".into(), ". ".into(), " ".into(), "".into()],
		}
	}

	#[test]
	fn empty_input_yields_no_chunks() {
		assert!(chunk_file("", "a.py", &cfg(100, 20)).is_empty());
		assert!(chunk_file("   \n\t  ", "a.py", &cfg(100, 20)).is_empty());
	}

	#[test]
	fn small_file_is_a_single_chunk_with_correct_lines() {
		let text = "def hello():\n    return 'world'\n";
		let chunks = chunk_file(text, "a.py", &cfg(3000, 500));
		assert_eq!(chunks.len(), 1);
		assert_eq!(chunks[0].line_start, 1);
		assert_eq!(chunks[0].line_end, 3);
		assert_eq!(chunks[0].content_hash, content_hash(&chunks[0].content));
	}

	#[test]
	fn line_start_never_exceeds_line_end() {
		let text = "line one\nline two\nline three\nline four\n".repeat(20);
		let chunks = chunk_file(&text, "a.txt", &cfg(50, 10));
		for c in &chunks {
			assert!(c.line_start <= c.line_end);
			assert!(c.char_start <= c.char_end);
		}
	}

	#[test]
	fn large_file_produces_multiple_overlapping_chunks() {
		let text = "word ".repeat(2000);
		let chunks = chunk_file(&text, "a.txt", &cfg(200, 50));
		assert!(chunks.len() > 1);
	}

	#[test]
	fn language_label_is_derived_from_suffix() {
		let chunks = chunk_file("fn main() {}", "main.rs", &cfg(3000, 500));
		assert_eq!(chunks[0].language, "rust");
		assert_eq!(chunks[0].file_type, "rs");
	}

	#[test]
	fn unknown_suffix_falls_back_to_suffix_verbatim() {
		let chunks = chunk_file("hello", "a.xyz123", &cfg(3000, 500));
		assert_eq!(chunks[0].language, "xyz123");
	}
}
