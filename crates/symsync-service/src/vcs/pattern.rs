use regex::{Regex, RegexBuilder};

use super::VcsError;

/// A depot path with Perforce-style wildcards.
///
/// `...` matches any sequence of characters including `/`, while `*` stays within one path
/// segment. Matching ignores ASCII case, as depot paths of Windows builds are not consistently
/// cased.
#[derive(Debug, Clone)]
pub struct DepotPattern {
    raw: String,
    regex: Regex,
}

impl DepotPattern {
    pub fn new(pattern: &str) -> Result<Self, VcsError> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        let mut rest = pattern;
        while let Some(c) = rest.chars().next() {
            if let Some(tail) = rest.strip_prefix("...") {
                expr.push_str(".*");
                rest = tail;
                continue;
            }
            if c == '*' {
                expr.push_str("[^/]*");
            } else {
                expr.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
            }
            rest = &rest[c.len_utf8()..];
        }
        expr.push('$');

        let regex = RegexBuilder::new(&expr)
            .case_insensitive(true)
            .build()
            .map_err(|_| VcsError::InvalidPattern(pattern.to_owned()))?;

        Ok(Self {
            raw: pattern.to_owned(),
            regex,
        })
    }

    pub fn is_match(&self, depot_path: &str) -> bool {
        self.regex.is_match(depot_path)
    }

    /// The longest wildcard-free directory prefix of the pattern.
    ///
    /// Every matching path starts with this prefix, so it bounds the directories to scan.
    pub fn literal_dir(&self) -> &str {
        let end = match (self.raw.find('*'), self.raw.find("...")) {
            (Some(star), Some(dots)) => star.min(dots),
            (star, dots) => star.or(dots).unwrap_or(self.raw.len()),
        };
        match self.raw[..end].rfind('/') {
            Some(slash) => &self.raw[..slash],
            None => "",
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}
