use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::Error;

/// Composite key of a gauge: a name plus tags.
///
/// Tags keep their insertion order for display, but two names with the
/// same tags in a different order are equal.
#[derive(Debug, Clone)]
pub struct MetricName {
    name: String,
    tags: Vec<(String, String)>,
}

/// Starts building a metric name.
pub fn name(name: impl Into<String>) -> MetricNameBuilder {
    MetricNameBuilder {
        inner: MetricName {
            name: name.into(),
            tags: Vec::new(),
        },
    }
}

pub struct MetricNameBuilder {
    inner: MetricName,
}

impl MetricNameBuilder {
    pub fn r#type(self, value: impl Into<String>) -> Self {
        self.tag("type", value)
    }

    pub fn unit(self, value: impl Into<String>) -> Self {
        self.tag("unit", value)
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.set_tag(key.into(), value.into());
        self
    }

    pub fn build(self) -> MetricName {
        self.inner
    }
}

impl MetricName {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn set_tag(&mut self, key: String, value: String) {
        match self.tags.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.tags.push((key, value)),
        }
    }

    fn sorted_tags(&self) -> Vec<(&str, &str)> {
        let mut tags: Vec<(&str, &str)> = self
            .tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        tags.sort_unstable();
        tags
    }
}

impl PartialEq for MetricName {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.sorted_tags() == other.sorted_tags()
    }
}

impl Eq for MetricName {}

impl Hash for MetricName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.sorted_tags().hash(state);
    }
}

impl Ord for MetricName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.sorted_tags().cmp(&other.sorted_tags()))
    }
}

impl PartialOrd for MetricName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Characters that delimit the textual form and are escaped with `\`.
const DELIMITERS: &[char] = &['\\', '{', '}', ',', '='];

fn write_escaped(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    for c in text.chars() {
        if DELIMITERS.contains(&c) {
            f.write_str("\\")?;
        }
        write!(f, "{}", c)?;
    }
    Ok(())
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_escaped(f, &self.name)?;
        if self.tags.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (i, (key, value)) in self.tags.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write_escaped(f, key)?;
            f.write_str("=")?;
            write_escaped(f, value)?;
        }
        f.write_str("}")
    }
}

/// Walks the textual form, resolving `\` escapes.
struct Pieces<'a> {
    chars: std::str::Chars<'a>,
}

impl Pieces<'_> {
    /// Text up to the next unescaped delimiter, and that delimiter (`None`
    /// at the end). `None` overall for a dangling `\`.
    fn next_piece(&mut self) -> Option<(String, Option<char>)> {
        let mut text = String::new();
        while let Some(c) = self.chars.next() {
            match c {
                '\\' => text.push(self.chars.next()?),
                '{' | '}' | ',' | '=' => return Some((text, Some(c))),
                _ => text.push(c),
            }
        }
        Some((text, None))
    }
}

impl FromStr for MetricName {
    type Err = Error;

    /// Parses `name` or `name{key=value,...}`; `\` escapes a delimiter.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidMetricName(s.to_string());
        let mut pieces = Pieces {
            chars: s.trim().chars(),
        };

        let (metric, delimiter) = pieces.next_piece().ok_or_else(invalid)?;
        if metric.is_empty() {
            return Err(invalid());
        }
        let mut builder = name(metric);
        match delimiter {
            None => return Ok(builder.build()),
            Some('{') => {}
            Some(_) => return Err(invalid()),
        }

        loop {
            let (key, delimiter) = pieces.next_piece().ok_or_else(invalid)?;
            match delimiter {
                Some('=') if !key.is_empty() => {}
                // Empty entries such as `a{}` or `a{x=1,}` are skipped.
                Some(',') if key.is_empty() => continue,
                Some('}') if key.is_empty() => break,
                _ => return Err(invalid()),
            }
            let (value, delimiter) = pieces.next_piece().ok_or_else(invalid)?;
            builder = builder.tag(key, value);
            match delimiter {
                Some(',') => continue,
                Some('}') => break,
                _ => return Err(invalid()),
            }
        }

        match pieces.next_piece() {
            Some((rest, None)) if rest.is_empty() => Ok(builder.build()),
            _ => Err(invalid()),
        }
    }
}
