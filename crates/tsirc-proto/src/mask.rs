//! Wildcard mask matching.
//!
//! Ban masks and hostmask patterns use `*` (any run, possibly empty) and
//! `?` (any single character), compared under RFC 1459 casemapping.
//! The matcher is iterative with single-star backtracking, so a
//! pathological mask cannot blow the stack.

use crate::casemap::irc_lower_char;

/// Returns true if `input` matches the wildcard `pattern`.
pub fn match_mask(pattern: &str, input: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let inp: Vec<char> = input.chars().collect();

    let (mut p, mut i) = (0usize, 0usize);
    // Position to resume from after a failed match past a '*'.
    let mut star: Option<(usize, usize)> = None;

    while i < inp.len() {
        if p < pat.len() && (pat[p] == '?' || irc_lower_char(pat[p]) == irc_lower_char(inp[i])) {
            p += 1;
            i += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some((p, i));
            p += 1;
        } else if let Some((sp, si)) = star {
            // Let the last '*' absorb one more input character.
            p = sp + 1;
            i = si + 1;
            star = Some((sp, si + 1));
        } else {
            return false;
        }
    }

    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_and_case_fold() {
        assert!(match_mask("nick!user@host", "nick!user@host"));
        assert!(match_mask("NICK!User@HOST", "nick!user@host"));
        assert!(match_mask("n[x]!u@h", "n{x}!u@h"));
        assert!(!match_mask("nick!user@host", "nick!user@host2"));
    }

    #[test]
    fn star_matches_runs() {
        assert!(match_mask("*!*@*", "anyone!ident@example.net"));
        assert!(match_mask("*!*@*.example.net", "bob!b@irc.example.net"));
        assert!(!match_mask("*!*@*.example.net", "bob!b@example.net"));
        assert!(match_mask("*", ""));
    }

    #[test]
    fn question_matches_one() {
        assert!(match_mask("b?b!*@*", "bob!x@y"));
        assert!(!match_mask("b?b!*@*", "bb!x@y"));
    }

    #[test]
    fn backtracks_across_multiple_stars() {
        assert!(match_mask("*ab*ab*", "xxabyyabzz"));
        assert!(!match_mask("*ab*ab*", "xxabyy"));
    }

    #[test]
    fn trailing_star_only_pattern() {
        assert!(match_mask("bob!*", "bob!anything@at.all"));
        assert!(!match_mask("bob!*", "alice!x@y"));
    }
}
