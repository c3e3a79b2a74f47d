//! Command word expansion.
//!
//! Argv words are assembled from literal and interpolated pieces, then
//! unquoted words get tilde expansion and shell-style glob expansion
//! (`*`, `?`, `[...]`) against the current directory. A pattern with no
//! matches stays in argv as the literal word.

use std::cell::Cell;

use conch_types::{ErrorCode, RuntimeError};

use crate::ast::{CmdPiece, CmdWord};
use crate::interpreter::{ExecCtx, SymbolTableStack};
use crate::object::{cmd_value, ObjectRef, Repr};

/// Backtracking budget for glob matching. Bounds total work so adversarial
/// patterns like `*a*a*a...` can't pin the CPU.
const MAX_MATCH_CALLS: usize = 100_000;

/// Expand a word list to argv strings.
pub(crate) fn expand_words(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    words: &[CmdWord],
) -> Result<Vec<String>, RuntimeError> {
    let mut argv = Vec::with_capacity(words.len());
    for word in words {
        argv.extend(expand_word(ctx, stack, word)?);
    }
    Ok(argv)
}

fn expand_word(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    word: &CmdWord,
) -> Result<Vec<String>, RuntimeError> {
    // a bare `$xs` where xs is an array or tuple splices one argv entry
    // per element
    if let [CmdPiece::Var(name)] = word.pieces.as_slice() {
        let value = lookup(stack, name)?;
        match &value.repr {
            Repr::Array(items) => {
                let items = items.borrow();
                let mut out = Vec::with_capacity(items.len());
                for item in items.iter() {
                    out.push(cmd_value(ctx, item)?);
                }
                return Ok(out);
            }
            Repr::Tuple(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(cmd_value(ctx, item)?);
                }
                return Ok(out);
            }
            _ => {}
        }
    }

    let mut assembled = String::new();
    for piece in &word.pieces {
        match piece {
            CmdPiece::Literal(text) => assembled.push_str(text),
            CmdPiece::Var(name) => {
                let value = lookup(stack, name)?;
                assembled.push_str(&cmd_value(ctx, &value)?);
            }
        }
    }

    if word.quoted {
        return Ok(vec![assembled]);
    }

    let assembled = expand_tilde(&assembled);
    if contains_glob(&assembled) {
        let matches = glob_expand(&assembled);
        if !matches.is_empty() {
            return Ok(matches);
        }
    }
    Ok(vec![assembled])
}

fn lookup(stack: &SymbolTableStack, name: &str) -> Result<ObjectRef, RuntimeError> {
    stack.shared_access(name).ok_or_else(|| {
        RuntimeError::new(
            ErrorCode::SymbolNotFound,
            format!("undefined symbol '{name}'"),
        )
    })
}

/// Expand a leading tilde to `$HOME`.
pub(crate) fn expand_tilde(s: &str) -> String {
    if s == "~" {
        std::env::var("HOME").unwrap_or_else(|_| "~".to_string())
    } else if let Some(rest) = s.strip_prefix("~/") {
        match std::env::var("HOME") {
            Ok(home) => format!("{home}/{rest}"),
            Err(_) => s.to_string(),
        }
    } else {
        s.to_string()
    }
}

/// Check if a string contains glob metacharacters.
pub(crate) fn contains_glob(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}

/// Expand a glob pattern against the current directory.
///
/// Patterns with a path separator are left to the caller as literals, and
/// dotfiles only match patterns that name the leading dot, as in a shell.
fn glob_expand(pattern: &str) -> Vec<String> {
    if pattern.contains('/') {
        return Vec::new();
    }
    let Ok(entries) = std::fs::read_dir(".") else {
        return Vec::new();
    };
    let mut matches: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !(name.starts_with('.') && !pattern.starts_with('.')))
        .filter(|name| glob_match(pattern, name))
        .collect();
    matches.sort();
    matches
}

/// Match a string against a glob pattern.
///
/// `*` matches any run of characters, `?` exactly one, `[abc]`/`[a-z]` a
/// set or range, `[!...]`/`[^...]` the complement.
pub(crate) fn glob_match(pattern: &str, input: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let input: Vec<char> = input.chars().collect();
    let calls = Cell::new(0usize);
    match_at(&pattern, 0, &input, 0, &calls)
}

fn match_at(pattern: &[char], p: usize, input: &[char], i: usize, calls: &Cell<usize>) -> bool {
    if calls.get() > MAX_MATCH_CALLS {
        return false;
    }
    calls.set(calls.get() + 1);

    if p == pattern.len() {
        return i == input.len();
    }
    match pattern[p] {
        '*' => {
            // try every split point, longest tail first is irrelevant here
            for skip in 0..=(input.len() - i) {
                if match_at(pattern, p + 1, input, i + skip, calls) {
                    return true;
                }
            }
            false
        }
        '?' => i < input.len() && match_at(pattern, p + 1, input, i + 1, calls),
        '[' => {
            let Some((matched, next_p)) = match_set(pattern, p, input.get(i).copied()) else {
                // malformed set: treat '[' literally
                return i < input.len()
                    && input[i] == '['
                    && match_at(pattern, p + 1, input, i + 1, calls);
            };
            matched && match_at(pattern, next_p, input, i + 1, calls)
        }
        c => i < input.len() && input[i] == c && match_at(pattern, p + 1, input, i + 1, calls),
    }
}

/// Match a `[...]` set at `pattern[p]` against one input character.
///
/// Returns `(matched, index after the closing bracket)`, or `None` when the
/// set is unterminated.
fn match_set(pattern: &[char], p: usize, input: Option<char>) -> Option<(bool, usize)> {
    let mut at = p + 1;
    let negated = matches!(pattern.get(at), Some('!') | Some('^'));
    if negated {
        at += 1;
    }
    let mut found = false;
    let mut first = true;
    loop {
        let c = *pattern.get(at)?;
        if c == ']' && !first {
            at += 1;
            break;
        }
        first = false;
        if pattern.get(at + 1) == Some(&'-') && pattern.get(at + 2).is_some_and(|&e| e != ']') {
            let end = pattern[at + 2];
            if let Some(input_char) = input {
                if c <= input_char && input_char <= end {
                    found = true;
                }
            }
            at += 3;
        } else {
            if input == Some(c) {
                found = true;
            }
            at += 1;
        }
    }
    input?;
    Some((found != negated, at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("*.rs", "main.rs", true)]
    #[case("*.rs", "main.go", false)]
    #[case("test?", "test1", true)]
    #[case("test?", "test", false)]
    #[case("[abc]", "b", true)]
    #[case("[abc]", "d", false)]
    #[case("[a-z]x", "cx", true)]
    #[case("[!a-z]", "A", true)]
    #[case("[!a-z]", "a", false)]
    #[case("*", "", true)]
    #[case("a*b*c", "axxbyyc", true)]
    fn glob_cases(#[case] pattern: &str, #[case] input: &str, #[case] expected: bool) {
        assert_eq!(glob_match(pattern, input), expected);
    }

    #[test]
    fn adversarial_pattern_terminates() {
        let pattern = "*a*a*a*a*a*a*a*a*a*a*a*ab";
        let input = "a".repeat(60);
        // must return (false) without spinning forever
        assert!(!glob_match(pattern, &input));
    }

    #[test]
    fn contains_glob_detects_metacharacters() {
        assert!(contains_glob("*.rs"));
        assert!(contains_glob("file?"));
        assert!(contains_glob("[ab]"));
        assert!(!contains_glob("plain.txt"));
    }

    #[test]
    fn tilde_expansion() {
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expand_tilde("~"), home);
            assert_eq!(expand_tilde("~/x"), format!("{home}/x"));
        }
        assert_eq!(expand_tilde("a~b"), "a~b");
    }
}
