use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

pub const DEFAULT_PATTERNS: &str = "*.png,*.jpg,*.jpeg";

/// Split a comma-separated pattern list, dropping blanks.
pub fn parse_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyOne,
    Star,
    Class {
        negated: bool,
        ranges: Vec<(char, char)>,
    },
}

impl Token {
    fn matches(&self, ch: char) -> bool {
        match self {
            Self::Literal(expected) => *expected == ch,
            Self::AnyOne => true,
            Self::Star => false,
            Self::Class { negated, ranges } => {
                let hit = ranges.iter().any(|(lo, hi)| *lo <= ch && ch <= *hi);
                hit != *negated
            }
        }
    }
}

/// One compiled path-component pattern: `*`, `?` and bracket classes
/// (`[abc]`, `[a-z]`, `[!abc]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern {
    tokens: Vec<Token>,
}

impl WildcardPattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            tokens: tokenize(&fold_case(pattern)),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        let text = fold_case(text).chars().collect::<Vec<_>>();
        let tokens = &self.tokens;
        let (mut p, mut t) = (0usize, 0usize);
        let mut backtrack = None::<(usize, usize)>;

        while t < text.len() {
            if let Some(token) = tokens.get(p) {
                if *token == Token::Star {
                    backtrack = Some((p, t));
                    p += 1;
                    continue;
                }
                if token.matches(text[t]) {
                    p += 1;
                    t += 1;
                    continue;
                }
            }
            let Some((star_p, star_t)) = backtrack else {
                return false;
            };
            p = star_p + 1;
            t = star_t + 1;
            backtrack = Some((star_p, star_t + 1));
        }

        tokens[p..].iter().all(|token| *token == Token::Star)
    }
}

/// A pattern split into path components, matched against the path relative
/// to the scanned folder. Recursive scans match the trailing components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    components: Vec<WildcardPattern>,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            components: pattern
                .split(&['/', '\\'][..])
                .filter(|c| !c.is_empty() && *c != ".")
                .map(WildcardPattern::new)
                .collect(),
        }
    }

    pub fn depth(&self) -> usize {
        self.components.len()
    }

    fn matches_components(&self, rel: &[String], recursive: bool) -> bool {
        if self.components.is_empty() || rel.len() < self.components.len() {
            return false;
        }
        if !recursive && rel.len() != self.components.len() {
            return false;
        }
        let tail = &rel[rel.len() - self.components.len()..];
        self.components
            .iter()
            .zip(tail)
            .all(|(pattern, component)| pattern.matches(component))
    }
}

/// Every regular file under `folder` matched by any of `patterns`,
/// deduplicated and ordered by path.
pub fn collect_matches(
    folder: &Path,
    patterns: &[String],
    recursive: bool,
) -> Result<Vec<PathBuf>, std::io::Error> {
    let compiled = patterns
        .iter()
        .map(|p| PathPattern::new(p))
        .filter(|p| p.depth() > 0)
        .collect::<Vec<_>>();
    if compiled.is_empty() {
        return Ok(Vec::new());
    }

    let max_depth = if recursive {
        usize::MAX
    } else {
        compiled.iter().map(PathPattern::depth).max().unwrap_or(1)
    };

    let mut found = BTreeSet::new();
    walk(folder, &mut Vec::new(), max_depth, &mut |path, rel| {
        if compiled
            .iter()
            .any(|pattern| pattern.matches_components(rel, recursive))
        {
            found.insert(path.to_path_buf());
        }
    })?;

    Ok(found.into_iter().filter(|path| path.is_file()).collect())
}

fn walk(
    dir: &Path,
    rel: &mut Vec<String>,
    max_depth: usize,
    visit: &mut dyn FnMut(&Path, &[String]),
) -> Result<(), std::io::Error> {
    let listing = fs::read_dir(dir).and_then(|entries| entries.collect::<Result<Vec<_>, _>>());
    let mut entries = match listing {
        Ok(entries) => entries,
        Err(err) if rel.is_empty() => return Err(err),
        Err(err) => {
            warn!(path = %dir.display(), error = %err, "skipping unreadable directory");
            return Ok(());
        }
    };
    entries.sort_by_key(|entry| entry.file_name());
    for entry in entries {
        let path = entry.path();
        rel.push(entry.file_name().to_string_lossy().to_string());
        visit(path.as_path(), rel.as_slice());
        let descend = rel.len() < max_depth && entry.file_type()?.is_dir();
        if descend {
            walk(path.as_path(), rel, max_depth, visit)?;
        }
        rel.pop();
    }
    Ok(())
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let chars = pattern.chars().collect::<Vec<_>>();
    let mut tokens = Vec::with_capacity(chars.len());
    let mut i = 0usize;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                // Consecutive stars behave like one.
                if tokens.last() != Some(&Token::Star) {
                    tokens.push(Token::Star);
                }
                i += 1;
            }
            '?' => {
                tokens.push(Token::AnyOne);
                i += 1;
            }
            '[' => match parse_class(&chars, i) {
                Some((token, next)) => {
                    tokens.push(token);
                    i = next;
                }
                None => {
                    tokens.push(Token::Literal('['));
                    i += 1;
                }
            },
            ch => {
                tokens.push(Token::Literal(ch));
                i += 1;
            }
        }
    }
    tokens
}

/// Parses `[...]` starting at `open`; `None` when unterminated.
fn parse_class(chars: &[char], open: usize) -> Option<(Token, usize)> {
    let mut i = open + 1;
    let negated = matches!(chars.get(i), Some('!') | Some('^'));
    if negated {
        i += 1;
    }
    let body_start = i;
    let mut ranges = Vec::new();
    while i < chars.len() {
        let ch = chars[i];
        // A `]` right after the opening bracket is a literal member.
        if ch == ']' && i > body_start {
            return Some((Token::Class { negated, ranges }, i + 1));
        }
        if chars.get(i + 1) == Some(&'-') && chars.get(i + 2).is_some_and(|c| *c != ']') {
            ranges.push((ch, chars[i + 2]));
            i += 3;
        } else {
            ranges.push((ch, ch));
            i += 1;
        }
    }
    None
}

fn fold_case(value: &str) -> String {
    if cfg!(windows) {
        value.to_lowercase()
    } else {
        value.to_string()
    }
}
