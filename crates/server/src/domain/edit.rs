//! The text-edit algorithm shared by `ApplyEdits` and `ProposeEdits` (§4.2).
//!
//! Positions are `(line, character)` in Unicode code-point units. Editors on
//! a single file are resolved to absolute offsets, then applied highest
//! `start_offset` first (ties broken by larger `end_offset` first) so that
//! earlier edits do not invalidate the offsets of later ones.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// A nil `range` replaces the entire content.
#[derive(Debug, Clone, Deserialize)]
pub struct Edit {
    pub range: Option<Range>,
    pub new_text: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("edit range end is before its start")]
    EndBeforeStart,
    #[error("edit range is out of bounds")]
    OutOfBounds,
}

fn line_start_offsets(chars: &[char]) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (i, &c) in chars.iter().enumerate() {
        if c == '\n' {
            starts.push(i + 1);
        }
    }
    starts
}

fn position_to_offset(chars: &[char], starts: &[usize], pos: Position) -> Result<usize, EditError> {
    let line = pos.line as usize;
    let line_start = *starts.get(line).ok_or(EditError::OutOfBounds)?;
    let line_end = starts.get(line + 1).map(|&s| s - 1).unwrap_or(chars.len());
    let offset = line_start + pos.character as usize;
    if offset > line_end {
        return Err(EditError::OutOfBounds);
    }
    Ok(offset)
}

/// Resolve `edits` against `content` and apply them, returning the new
/// content. Concurrent edits on the same file must already be gathered
/// into a single `edits` slice before calling this (§4.2 "Concurrent edits
/// on a single file URI are grouped into one resolved list").
pub fn apply_edits(content: &str, edits: &[Edit]) -> Result<String, EditError> {
    let chars: Vec<char> = content.chars().collect();
    let starts = line_start_offsets(&chars);

    let mut resolved = Vec::with_capacity(edits.len());
    for edit in edits {
        let (start, end) = match edit.range {
            None => (0, chars.len()),
            Some(range) => {
                let start = position_to_offset(&chars, &starts, range.start)?;
                let end = position_to_offset(&chars, &starts, range.end)?;
                if end < start {
                    return Err(EditError::EndBeforeStart);
                }
                (start, end)
            }
        };
        resolved.push((start, end, edit.new_text.as_str()));
    }

    // Highest start first; ties broken by larger end first.
    resolved.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

    let mut result = chars;
    for (start, end, new_text) in resolved {
        let replacement: Vec<char> = new_text.chars().collect();
        result.splice(start..end, replacement);
    }
    Ok(result.into_iter().collect())
}
