//! Conflict hunk handling for governed files
//!
//! The base branch is always "ours" and upstream "theirs". Governed files take
//! the upstream side of every hunk; the ledger then re-applies the downstream
//! edits on top.

use crate::core::error::{MergeError, RailError, RailResult};
use std::path::Path;

const OURS: &str = "<<<<<<<";
const BASE: &str = "|||||||";
const SEP: &str = "=======";
const THEIRS: &str = ">>>>>>>";

fn is_marker(line: &str, marker: &str) -> bool {
  let line = line.trim_end_matches(['\n', '\r']);
  match line.strip_prefix(marker) {
    Some(rest) => rest.is_empty() || rest.starts_with(' '),
    None => false,
  }
}

/// True if `content` holds at least one opening conflict marker
pub fn has_conflict_markers(content: &str) -> bool {
  content.split_inclusive('\n').any(|l| is_marker(l, OURS))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
  Outside,
  Ours,
  Base,
  Theirs,
}

/// Resolve every conflict hunk to its upstream side
///
/// Understands both `merge` and `diff3` conflict styles. Returns the number of
/// hunks resolved alongside the content.
pub fn take_upstream(path: &Path, content: &str) -> RailResult<(String, usize)> {
  let malformed = |reason: &str| {
    RailError::Merge(MergeError::UnresolvableConflict {
      path: path.to_path_buf(),
      rule: None,
      reason: reason.to_string(),
    })
  };

  let mut out = String::with_capacity(content.len());
  let mut section = Section::Outside;
  let mut hunks = 0;

  for line in content.split_inclusive('\n') {
    section = match section {
      Section::Outside if is_marker(line, OURS) => Section::Ours,
      Section::Outside => {
        out.push_str(line);
        Section::Outside
      }
      Section::Ours if is_marker(line, BASE) => Section::Base,
      Section::Ours | Section::Base if is_marker(line, SEP) => Section::Theirs,
      Section::Ours | Section::Base => {
        if is_marker(line, OURS) {
          return Err(malformed("nested conflict marker"));
        }
        section
      }
      Section::Theirs if is_marker(line, THEIRS) => {
        hunks += 1;
        Section::Outside
      }
      Section::Theirs => {
        if is_marker(line, OURS) || is_marker(line, SEP) {
          return Err(malformed("nested conflict marker"));
        }
        out.push_str(line);
        Section::Theirs
      }
    };
  }

  if section != Section::Outside {
    return Err(malformed("unterminated conflict hunk"));
  }

  Ok((out, hunks))
}
