//! Rendering of local and remote definitions and the unified diff shown
//! to users.

use crate::models::ConfigEntry;
use serde_json::Value;
use std::collections::BTreeMap;

pub const SENSITIVE_PLACEHOLDER: &str = "<sensitive>";

const CONTEXT_LINES: usize = 3;

/// Largest LCS table built for the changed block; bigger blocks are shown
/// as a plain delete-then-insert replacement
const MAX_LCS_CELLS: usize = 1 << 20;

/// Remote config values for `keys` only, with sensitive values masked.
/// A key the cluster reports without a value stays `None` and renders as
/// `null`, distinct from an empty string.
pub fn config_view<'a>(
    entries: &[ConfigEntry],
    keys: impl IntoIterator<Item = &'a str>,
) -> BTreeMap<String, Option<String>> {
    keys.into_iter()
        .filter_map(|key| entries.iter().find(|entry| entry.name == key))
        .map(|entry| {
            let value = if entry.is_sensitive {
                Some(SENSITIVE_PLACEHOLDER.to_string())
            } else {
                entry.value.clone()
            };
            (entry.name.clone(), value)
        })
        .collect()
}

/// Render a view as YAML; `null` renders as nothing
pub fn render(value: &Value) -> String {
    if value.is_null() {
        return String::new();
    }
    serde_yaml::to_string(value).unwrap_or_else(|_| value.to_string())
}

/// Diff the redacted remote view against the local view
pub fn definition_diff(remote: &Value, local: &Value) -> String {
    unified_diff(&render(remote), &render(local), "remote", "local")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Equal,
    Delete,
    Insert,
}

#[derive(Debug, Clone, Copy)]
struct Edit<'a> {
    tag: Tag,
    line: &'a str,
    old_line: usize,
    new_line: usize,
}

fn edit_script<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<Edit<'a>> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let (old_end, new_end) = (old.len() - suffix, new.len() - suffix);

    let mut edits = Vec::with_capacity(old.len() + new.len());
    for index in 0..prefix {
        edits.push(Edit {
            tag: Tag::Equal,
            line: old[index],
            old_line: index,
            new_line: index,
        });
    }

    let old_mid = &old[prefix..old_end];
    let new_mid = &new[prefix..new_end];
    let cells = (old_mid.len() + 1).saturating_mul(new_mid.len() + 1);
    if cells > MAX_LCS_CELLS {
        replace_block(old_mid, new_mid, prefix, prefix, &mut edits);
    } else {
        lcs_block(old_mid, new_mid, prefix, prefix, &mut edits);
    }

    for offset in 0..suffix {
        edits.push(Edit {
            tag: Tag::Equal,
            line: old[old_end + offset],
            old_line: old_end + offset,
            new_line: new_end + offset,
        });
    }
    edits
}

/// Minimal edit script for a block starting at `old_base`/`new_base`
fn lcs_block<'a>(old: &[&'a str], new: &[&'a str], old_base: usize, new_base: usize, edits: &mut Vec<Edit<'a>>) {
    // lcs[i][j]: longest common subsequence of old[i..] and new[j..]
    let mut lcs = vec![vec![0usize; new.len() + 1]; old.len() + 1];
    for i in (0..old.len()).rev() {
        for j in (0..new.len()).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < old.len() || j < new.len() {
        let edit = |tag, line| Edit {
            tag,
            line,
            old_line: old_base + i,
            new_line: new_base + j,
        };
        if i < old.len() && j < new.len() && old[i] == new[j] {
            edits.push(edit(Tag::Equal, old[i]));
            i += 1;
            j += 1;
        } else if i < old.len() && (j == new.len() || lcs[i + 1][j] >= lcs[i][j + 1]) {
            edits.push(edit(Tag::Delete, old[i]));
            i += 1;
        } else {
            edits.push(edit(Tag::Insert, new[j]));
            j += 1;
        }
    }
}

fn replace_block<'a>(old: &[&'a str], new: &[&'a str], old_base: usize, new_base: usize, edits: &mut Vec<Edit<'a>>) {
    for (offset, line) in old.iter().enumerate() {
        edits.push(Edit {
            tag: Tag::Delete,
            line,
            old_line: old_base + offset,
            new_line: new_base,
        });
    }
    for (offset, line) in new.iter().enumerate() {
        edits.push(Edit {
            tag: Tag::Insert,
            line,
            old_line: old_base + old.len(),
            new_line: new_base + offset,
        });
    }
}

/// Line-based unified diff with three lines of context; empty when the
/// inputs are equal
pub fn unified_diff(old: &str, new: &str, old_label: &str, new_label: &str) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let edits = edit_script(&old_lines, &new_lines);

    let changed: Vec<usize> = edits
        .iter()
        .enumerate()
        .filter(|(_, edit)| edit.tag != Tag::Equal)
        .map(|(index, _)| index)
        .collect();
    if changed.is_empty() {
        return String::new();
    }

    let mut hunks: Vec<(usize, usize)> = Vec::new();
    for index in changed {
        let start = index.saturating_sub(CONTEXT_LINES);
        let end = (index + CONTEXT_LINES + 1).min(edits.len());
        match hunks.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => hunks.push((start, end)),
        }
    }

    let mut out = format!("--- {}\n+++ {}\n", old_label, new_label);
    for (start, end) in hunks {
        let hunk = &edits[start..end];
        let old_count = hunk.iter().filter(|e| e.tag != Tag::Insert).count();
        let new_count = hunk.iter().filter(|e| e.tag != Tag::Delete).count();
        let old_start = hunk[0].old_line + usize::from(old_count > 0);
        let new_start = hunk[0].new_line + usize::from(new_count > 0);
        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            old_start, old_count, new_start, new_count
        ));
        for edit in hunk {
            let marker = match edit.tag {
                Tag::Equal => ' ',
                Tag::Delete => '-',
                Tag::Insert => '+',
            };
            out.push(marker);
            out.push_str(edit.line);
            out.push('\n');
        }
    }
    out
}
