//! Anchored `*` wildcard matching for override identifiers.

// self
use crate::_prelude::*;

/// Token that matches zero or more characters.
pub const WILDCARD: char = '*';

const PATTERN_MAX_LEN: usize = 255;

/// Errors produced for patterns that cannot be evaluated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum PatternError {
	/// Empty patterns never describe a usable override.
	#[error("Wildcard pattern cannot be empty.")]
	Empty,
	/// Pattern exceeded the supported length.
	#[error("Wildcard pattern exceeds {max} bytes.")]
	TooLong {
		/// Maximum permitted byte length.
		max: usize,
	},
}

/// Returns true when the pattern contains at least one wildcard token.
pub fn is_wildcard(pattern: &str) -> bool {
	pattern.contains(WILDCARD)
}

/// Checks whether `identifier` matches `pattern` in full.
///
/// Each `*` matches any run of characters, including an empty one; every other character must
/// match literally. The literal run before the first `*` anchors the start and the run after the
/// last `*` anchors the end. Runs in between are taken at their leftmost occurrence, which is
/// enough because a `*` on either side absorbs whatever a later choice would have skipped.
pub fn matches(identifier: &str, pattern: &str) -> Result<bool, PatternError> {
	validate(pattern)?;

	let segments: Vec<&str> = pattern.split(WILDCARD).collect();
	let Some((head, rest)) = segments.split_first() else {
		return Ok(false);
	};
	let Some(remaining) = identifier.strip_prefix(head) else {
		return Ok(false);
	};
	let Some((tail, middle)) = rest.split_last() else {
		return Ok(remaining.is_empty());
	};
	let Some(mut remaining) = remaining.strip_suffix(tail) else {
		return Ok(false);
	};

	for segment in middle {
		match remaining.find(segment) {
			Some(at) => remaining = &remaining[at + segment.len()..],
			None => return Ok(false),
		}
	}

	Ok(true)
}

fn validate(pattern: &str) -> Result<(), PatternError> {
	match pattern.len() {
		0 => Err(PatternError::Empty),
		len if len > PATTERN_MAX_LEN => Err(PatternError::TooLong { max: PATTERN_MAX_LEN }),
		_ => Ok(()),
	}
}
