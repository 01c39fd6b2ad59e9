//! Path globs used by configuration-driven middleware.
//!
//! A glob is matched against the whole request path. `**` stands for any
//! sequence of characters (slashes included); every other character is
//! literal. `/api/search/**` therefore matches `/api/search/docs` and
//! `/api/search/a/b`, but not `/api/searching`.

use std::fmt;

use regex::Regex;

/// A compiled path glob.
#[derive(Clone)]
pub struct Glob {
    source: String,
    regex: Regex,
}

impl Glob {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`regex::Error`] if the compiled expression exceeds the regex
    /// size limit. Literal segments are escaped, so ordinary patterns never fail.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let body = pattern
            .split("**")
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{body}$"))?;
        Ok(Self {
            source: pattern.to_owned(),
            regex,
        })
    }

    /// Returns `true` if the whole of `path` matches.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// The pattern as written in configuration.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Glob").field(&self.source).finish()
    }
}

/// Compiles every pattern, skipping (and logging) any that fail.
pub fn compile_all<I, S>(patterns: I) -> Vec<Glob>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .filter_map(|p| match Glob::new(p.as_ref()) {
            Ok(glob) => Some(glob),
            Err(e) => {
                tracing::warn!(pattern = p.as_ref(), error = %e, "ignoring invalid path pattern");
                None
            }
        })
        .collect()
}

/// Returns `true` if any glob in `globs` matches `path`.
pub fn any_match(globs: &[Glob], path: &str) -> bool {
    globs.iter().any(|g| g.matches(path))
}
