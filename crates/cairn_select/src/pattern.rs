//! Match patterns used by scope values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel value selecting everything.
pub const ANY_TARGET: &str = "*";

/// Sentinel value selecting nothing.
pub const NONE_TARGET: &str = "";

/// How a scope value matches a candidate target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pattern {
    /// Matches every target.
    Any,
    /// Matches no target.
    None,
    /// Matches targets equal to one of the values (raw name or short ref).
    Literals {
        /// The accepted values.
        values: Vec<String>,
    },
    /// Matches targets equal to, or nested under, one of the folder paths.
    Prefixes {
        /// The accepted folder prefixes.
        values: Vec<String>,
    },
    /// Matches targets by typed comparison against a single argument.
    Compare {
        /// The comparison operator.
        op: Comparator,
        /// The right-hand argument.
        arg: String,
    },
}

/// Comparison operators for [`Pattern::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// The target contains the argument as a substring.
    Contains,
    /// The target equals the argument.
    Equals,
    /// The target, parsed as a canonical UTC time, is after the argument.
    After,
    /// The target, parsed as a canonical UTC time, is before the argument.
    Before,
}

/// Collapses raw values into `Any`/`None` sentinels.
///
/// A [`NONE_TARGET`] anywhere in the set wins over [`ANY_TARGET`]: a scope
/// built with contradictory sentinels selects nothing.
fn collapse<I, S>(values: I) -> Result<Vec<String>, Pattern>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let values: Vec<String> = values.into_iter().map(Into::into).collect();

    if values.is_empty() || values.iter().any(|v| v == NONE_TARGET) {
        return Err(Pattern::None);
    }

    if values.iter().any(|v| v == ANY_TARGET) {
        return Err(Pattern::Any);
    }

    Ok(values)
}

impl Pattern {
    /// Builds a literal pattern, collapsing sentinel values.
    pub fn literals<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match collapse(values) {
            Ok(values) => Self::Literals { values },
            Err(p) => p,
        }
    }

    /// Builds a folder-prefix pattern, collapsing sentinel values.
    pub fn prefixes<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match collapse(values) {
            Ok(values) => Self::Prefixes { values },
            Err(p) => p,
        }
    }

    /// Builds a comparison pattern, collapsing sentinel arguments.
    pub fn compare(op: Comparator, arg: impl Into<String>) -> Self {
        let arg = arg.into();

        match arg.as_str() {
            NONE_TARGET => Self::None,
            ANY_TARGET => Self::Any,
            _ => Self::Compare { op, arg },
        }
    }

    /// Whether this pattern matches everything.
    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// Tests a single target.
    #[must_use]
    pub fn matches(&self, target: &str) -> bool {
        match self {
            Self::Any => true,
            Self::None => false,
            Self::Literals { values } => values.iter().any(|v| v == target),
            Self::Prefixes { values } => values.iter().any(|v| {
                target == v || target.strip_prefix(v.as_str()).is_some_and(|rest| rest.starts_with('/'))
            }),
            Self::Compare { op, arg } => compare(*op, arg, target),
        }
    }

    /// Tests a set of candidate targets; any match wins.
    pub fn matches_any<'a, I>(&self, targets: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        match self {
            Self::Any => true,
            Self::None => false,
            _ => targets.into_iter().any(|t| self.matches(t)),
        }
    }

    /// The literal values, when this is a literal pattern.
    #[must_use]
    pub fn literal_values(&self) -> Option<&[String]> {
        match self {
            Self::Literals { values } => Some(values),
            _ => None,
        }
    }
}

fn compare(op: Comparator, arg: &str, target: &str) -> bool {
    match op {
        Comparator::Contains => target.contains(arg),
        Comparator::Equals => target == arg,
        Comparator::After => match (parse_time(target), parse_time(arg)) {
            (Some(t), Some(a)) => t > a,
            _ => false,
        },
        Comparator::Before => match (parse_time(target), parse_time(arg)) {
            (Some(t), Some(a)) => t < a,
            _ => false,
        },
    }
}

/// Parses the canonical wire time format (RFC 3339, UTC).
fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_collapse() {
        assert_eq!(Pattern::literals(["*"]), Pattern::Any);
        assert_eq!(Pattern::literals(Vec::<String>::new()), Pattern::None);
        assert_eq!(Pattern::literals([""]), Pattern::None);
        // Contradictory Any + None collapses to None.
        assert_eq!(Pattern::literals(["*", ""]), Pattern::None);
    }

    #[test]
    fn literal_matching() {
        let p = Pattern::literals(["a", "b"]);
        assert!(p.matches("a"));
        assert!(!p.matches("c"));
        assert!(p.matches_any(["c", "b"]));
        assert!(!p.matches_any(["c", "d"]));
    }

    #[test]
    fn prefix_matching_is_element_wise() {
        let p = Pattern::prefixes(["Inbox"]);
        assert!(p.matches("Inbox"));
        assert!(p.matches("Inbox/sub"));
        assert!(!p.matches("Inbox2"));
        assert!(!p.matches("Archive/Inbox2"));
    }

    #[test]
    fn contains_and_equals() {
        assert!(Pattern::compare(Comparator::Contains, "nor").matches("fnord"));
        assert!(!Pattern::compare(Comparator::Contains, "xyz").matches("fnord"));
        assert!(Pattern::compare(Comparator::Equals, "true").matches("true"));
        assert!(!Pattern::compare(Comparator::Equals, "true").matches("false"));
    }

    #[test]
    fn time_ordering() {
        let after = Pattern::compare(Comparator::After, "2022-06-01T00:00:00Z");
        assert!(after.matches("2022-07-01T00:00:00Z"));
        assert!(!after.matches("2022-05-01T00:00:00Z"));

        let before = Pattern::compare(Comparator::Before, "2022-06-01T00:00:00Z");
        assert!(before.matches("2022-05-01T00:00:00Z"));
        assert!(!before.matches("2022-07-01T00:00:00Z"));
    }

    #[test]
    fn malformed_times_never_match() {
        let after = Pattern::compare(Comparator::After, "2022-06-01T00:00:00Z");
        assert!(!after.matches("not a time"));
        assert!(!Pattern::compare(Comparator::After, "garbage").matches("2022-07-01T00:00:00Z"));
    }

    #[test]
    fn compare_sentinels() {
        assert_eq!(Pattern::compare(Comparator::After, "*"), Pattern::Any);
        assert_eq!(Pattern::compare(Comparator::After, ""), Pattern::None);
    }
}
