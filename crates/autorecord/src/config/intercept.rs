//! URL pattern the interceptor binds to.

use crate::error::{AutorecordError, Result};
use regex::{Regex, RegexBuilder};

/// Compiled `interceptPattern`.
///
/// A pattern written as `/body/flags` is a regular expression. Anything else
/// is a glob in which `*` matches any run of characters.
#[derive(Debug, Clone)]
pub enum InterceptPattern {
    Glob { source: String, regex: Regex },
    Regex(Regex),
}

impl InterceptPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        if let Some((body, flags)) = split_regex_literal(pattern) {
            let mut builder = RegexBuilder::new(body);
            for flag in flags.chars() {
                match flag {
                    'i' => {
                        builder.case_insensitive(true);
                    }
                    'm' => {
                        builder.multi_line(true);
                    }
                    's' => {
                        builder.dot_matches_new_line(true);
                    }
                    // Stateful and unicode-mode JS flags have no effect here
                    _ => {}
                }
            }
            let regex = builder
                .build()
                .map_err(|e| AutorecordError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                })?;
            return Ok(InterceptPattern::Regex(regex));
        }

        let translated = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{translated}$")).map_err(|e| {
            AutorecordError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(InterceptPattern::Glob {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            InterceptPattern::Glob { regex, .. } => regex.is_match(url),
            InterceptPattern::Regex(regex) => regex.is_match(url),
        }
    }
}

const REGEX_FLAGS: &str = "dgimsuvy";

/// Split `/body/flags` into its parts. Returns None for plain strings,
/// including paths such as `/api/users` whose tail is not a flag set.
fn split_regex_literal(pattern: &str) -> Option<(&str, &str)> {
    let rest = pattern.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    let (body, flags) = (&rest[..end], &rest[end + 1..]);
    if body.is_empty() || !flags.chars().all(|c| REGEX_FLAGS.contains(c)) {
        return None;
    }
    Some((body, flags))
}
