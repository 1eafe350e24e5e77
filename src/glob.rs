//! Glob matching for key patterns and the `~=` operator.
//!
//! The grammar is deliberately small: `?` matches one character, `*` matches
//! a run of characters, `[abc]` and `[a-z]` match character classes with
//! optional `!`/`^` negation, and `\` escapes the five metacharacters. A
//! match must consume the pattern and the input completely.

/// Match `pattern` against `input`, case-sensitively.
pub fn matches(pattern: &str, input: &str) -> bool {
    if pattern == input {
        return true;
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let input: Vec<char> = input.chars().collect();
    let mut p = 0;
    let mut i = 0;
    while p < pattern.len() && i < input.len() {
        match pattern[p] {
            '*' => {
                p += 1;
                if !match_star(&pattern, &mut p, &input, &mut i) {
                    return false;
                }
            }
            '[' => {
                p += 1;
                if !match_class(&pattern, &mut p, input[i]) {
                    return false;
                }
                i += 1;
            }
            '?' => {
                p += 1;
                i += 1;
            }
            '\\' => {
                p += 1;
                let want = match pattern.get(p) {
                    Some(&c) if is_meta(c) => {
                        p += 1;
                        c
                    }
                    _ => '\\',
                };
                if input[i] != want {
                    return false;
                }
                i += 1;
            }
            c => {
                if input[i] != c {
                    return false;
                }
                p += 1;
                i += 1;
            }
        }
    }
    // Input exhausted: whatever pattern remains must be all stars.
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len() && i == input.len()
}

fn is_meta(c: char) -> bool {
    matches!(c, '\\' | '*' | '?' | '[' | ']')
}

/// `p` sits after a star. Collapse the run, then skip input forward until the
/// character following the run is found. A trailing star takes the rest.
fn match_star(pattern: &[char], p: &mut usize, input: &[char], i: &mut usize) -> bool {
    while *p < pattern.len() && pattern[*p] == '*' {
        *p += 1;
    }
    if *p == pattern.len() {
        *i = input.len();
        return true;
    }
    let next = pattern[*p];
    *p += 1;
    while *i < input.len() {
        let current = input[*i];
        *i += 1;
        if current == next {
            return true;
        }
    }
    false
}

/// `p` sits after the opening bracket. Ranges are only recognized when both
/// endpoints are letters or digits and the low end is smaller; a `-` anywhere
/// else is literal, as is `]` in the first position.
fn match_class(pattern: &[char], p: &mut usize, want: char) -> bool {
    let negate = matches!(pattern.get(*p), Some('!') | Some('^'));
    if negate {
        *p += 1;
    }
    let mut found = false;
    let mut first = true;
    let mut prev: Option<char> = None;
    while let Some(&current) = pattern.get(*p) {
        if current == ']' && !first {
            *p += 1;
            break;
        }
        *p += 1;
        first = false;
        if current == '-' {
            if let (Some(low), Some(&high)) = (prev, pattern.get(*p)) {
                if high != ']' && is_range(low, high) {
                    *p += 1;
                    if !found {
                        found = want >= low && want <= high;
                    }
                    prev = None;
                    continue;
                }
            }
        }
        if !found {
            found = current == want;
        }
        prev = Some(current);
    }
    if negate {
        !found
    } else {
        found
    }
}

fn is_range(low: char, high: char) -> bool {
    low < high && low.is_ascii_alphanumeric() && high.is_ascii_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::matches;

    #[test]
    fn test_exact() {
        assert!(matches("", ""));
        assert!(matches("foobar", "foobar"));
        assert!(!matches("foobar", "fOObar"));
        assert!(!matches("foobar", "foo"));
    }

    #[test]
    fn test_star() {
        assert!(matches("*", ""));
        assert!(matches("*", "anything"));
        assert!(matches("foo*", "foobar"));
        assert!(matches("foo***", "foobar"));
        assert!(matches("f**bar", "foobar"));
        assert!(!matches("f**-bar", "foobar"));
        assert!(matches("*@*.org", "midbel@foobar.org"));
    }

    #[test]
    fn test_question() {
        assert!(matches("f??bar", "foobar"));
        assert!(!matches("f??bar", "fobar"));
        assert!(!matches("?", ""));
    }

    #[test]
    fn test_class() {
        assert!(matches("f[oO][a-z]???", "foobar"));
        assert!(!matches("f[A-Z][a-z]???", "foobar"));
        assert!(!matches("f[!A-Z][^a-z]???", "foobar"));
        assert!(matches("f[!A-Z]obar", "foobar"));
        assert!(matches("f[-0-9]?[]a-z]*", "f--bar"));
    }

    #[test]
    fn test_escape() {
        assert!(!matches("f\\o\\obar", "foobar"));
        assert!(matches("f\\*\\**", "f**bar"));
        assert!(matches("a\\[b", "a[b"));
        assert!(matches("a\\\\b", "a\\b"));
    }

    #[test]
    fn test_star_skips_to_next() {
        assert!(matches("*bar", "foobar"));
        assert!(!matches("*zar", "foobar"));
        assert!(matches("[a-z]?e", "age"));
        assert!(!matches("[a-z]?e", "service"));
    }
}
