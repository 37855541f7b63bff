//! Pre-regex compilation
//!
//! A pre-regex is a regex with placeholders. `%(name)` placeholders are
//! replaced by constant text, `%(dim:kind[:custom=parser][:dummy])`
//! placeholders become capture groups feeding the coordinate `dim`.
//!
//! ```text
//! pregex       = "%(prefix)_%(time:Y)%(time:m).nc"
//! replacements = {"prefix": "SST"}
//! regex        = "^(?:SST_(?P<m0>\d{4})(?P<m1>\d{2}).nc)$"
//! ```
//!
//! Text outside placeholders keeps its regex meaning. Filenames are rebuilt
//! from [`Segments`]: the literal text found around each capture in a
//! matching filename.

use crate::errors::{FilecubeError, Result};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Parsing semantics of one placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatcherKind {
    /// `int`: integer value
    Int,
    /// `idx`: integer value (alias of `int`)
    Idx,
    /// `float`: signed decimal number
    Float,
    /// `Y`: four digit year
    Year,
    /// `m`: two digit month
    Month,
    /// `d`: two digit day of month
    Day,
    /// `j`: three digit day of year
    DayOfYear,
    /// `H`: two digit hour
    Hour,
    /// `M`: two digit minute
    Minute,
    /// `S`: two digit second
    Second,
    /// `x`: `YYYYmmdd`
    Date,
    /// `X`: `HHMMSS`
    Time,
    /// `F`: `YYYY-mm-dd`
    IsoDate,
    /// `B`: month name
    MonthName,
    /// `text`: letters, needs a custom parser
    Text,
    /// `char`: any non-space characters, needs a custom parser
    Char,
}

impl MatcherKind {
    pub fn from_code(code: &str) -> Option<Self> {
        let kind = match code {
            "int" => Self::Int,
            "idx" => Self::Idx,
            "float" => Self::Float,
            "Y" => Self::Year,
            "m" => Self::Month,
            "d" => Self::Day,
            "j" => Self::DayOfYear,
            "H" => Self::Hour,
            "M" => Self::Minute,
            "S" => Self::Second,
            "x" => Self::Date,
            "X" => Self::Time,
            "F" => Self::IsoDate,
            "B" => Self::MonthName,
            "text" => Self::Text,
            "char" => Self::Char,
            _ => return None,
        };
        Some(kind)
    }

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Idx => "idx",
            Self::Float => "float",
            Self::Year => "Y",
            Self::Month => "m",
            Self::Day => "d",
            Self::DayOfYear => "j",
            Self::Hour => "H",
            Self::Minute => "M",
            Self::Second => "S",
            Self::Date => "x",
            Self::Time => "X",
            Self::IsoDate => "F",
            Self::MonthName => "B",
            Self::Text => "text",
            Self::Char => "char",
        }
    }

    /// Regex replacing the placeholder
    #[must_use]
    pub const fn pattern(self) -> &'static str {
        match self {
            Self::Int | Self::Idx => r"\d+",
            Self::Float => r"[-+]?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?",
            Self::Year => r"\d{4}",
            Self::Month | Self::Day | Self::Hour | Self::Minute | Self::Second => r"\d{2}",
            Self::DayOfYear => r"\d{3}",
            Self::Date => r"\d{8}",
            Self::Time => r"\d{6}",
            Self::IsoDate => r"\d{4}-\d{2}-\d{2}",
            Self::MonthName => r"[A-Za-z]+",
            Self::Text => r"[A-Za-z]*",
            Self::Char => r"\S*",
        }
    }

    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Idx | Self::Float)
    }

    #[must_use]
    pub const fn is_date(self) -> bool {
        matches!(
            self,
            Self::Year
                | Self::Month
                | Self::Day
                | Self::DayOfYear
                | Self::Hour
                | Self::Minute
                | Self::Second
                | Self::Date
                | Self::Time
                | Self::IsoDate
                | Self::MonthName
        )
    }
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One placeholder occurrence in a pre-regex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    /// Position among the matchers, also the capture index
    pub idx: usize,
    /// Dimension fed by this matcher
    pub dim: String,
    pub kind: MatcherKind,
    /// Identifier of a registered custom parser
    pub custom: Option<String>,
    /// Matched but not used to find values
    pub dummy: bool,
}

impl Matcher {
    /// Name of the capture group in the compiled regex
    #[must_use]
    pub fn group_name(&self) -> String {
        format!("m{}", self.idx)
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%({}:{}", self.dim, self.kind)?;
        if let Some(custom) = &self.custom {
            write!(f, ":custom={custom}")?;
        }
        if self.dummy {
            f.write_str(":dummy")?;
        }
        f.write_str(")")
    }
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"%\(([^()]*)\)").unwrap_or_else(|e| unreachable!("placeholder regex: {e}"))
    })
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A pre-regex turned into a regex, with its matchers
#[derive(Debug, Clone)]
pub struct CompiledPregex {
    pregex: String,
    regex: Regex,
    matchers: Vec<Matcher>,
}

impl CompiledPregex {
    /// Compile a pre-regex, applying literal replacements.
    ///
    /// Replacements are inserted in a single pass: their text is never scanned
    /// for placeholders.
    pub fn compile(pregex: &str, replacements: &HashMap<String, String>) -> Result<Self> {
        let pregex = pregex.trim();
        let invalid = |message: String| FilecubeError::InvalidPregex {
            pregex: pregex.to_string(),
            message,
        };

        let mut regex = String::from("^(?:");
        let mut matchers = Vec::new();
        let mut last = 0;

        for caps in placeholder_regex().captures_iter(pregex) {
            let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            regex.push_str(&pregex[last..whole.start()]);
            last = whole.end();

            let mut parts = body.as_str().split(':').filter(|p| !p.is_empty());
            let name = parts.next().unwrap_or_default();
            if !is_identifier(name) {
                return Err(invalid(format!("bad placeholder '{}'", whole.as_str())));
            }

            let Some(code) = parts.next() else {
                let text = replacements.get(name).ok_or_else(|| {
                    FilecubeError::UnresolvedPlaceholder {
                        name: name.to_string(),
                        pregex: pregex.to_string(),
                    }
                })?;
                regex.push_str(text);
                continue;
            };

            let kind = MatcherKind::from_code(code)
                .ok_or_else(|| invalid(format!("unknown matcher kind '{code}'")))?;
            let mut custom = None;
            let mut dummy = false;
            for option in parts {
                if option == "dummy" {
                    dummy = true;
                } else if let Some(parser) = option.strip_prefix("custom=") {
                    custom = Some(parser.to_string());
                } else {
                    return Err(invalid(format!(
                        "unknown option '{option}' in '{}'",
                        whole.as_str()
                    )));
                }
            }

            let matcher = Matcher {
                idx: matchers.len(),
                dim: name.to_string(),
                kind,
                custom,
                dummy,
            };
            regex.push_str(&format!("(?P<{}>{})", matcher.group_name(), kind.pattern()));
            matchers.push(matcher);
        }
        regex.push_str(&pregex[last..]);
        regex.push_str(")$");

        let regex = Regex::new(&regex)?;
        tracing::debug!(pregex, regex = %regex, matchers = matchers.len(), "Compiled pre-regex");

        Ok(Self {
            pregex: pregex.to_string(),
            regex,
            matchers,
        })
    }

    /// Compile and check that every matcher feeds a dimension of `dims`
    pub fn compile_for<S: AsRef<str>>(
        pregex: &str,
        replacements: &HashMap<String, String>,
        dims: &[S],
        filegroup: &str,
    ) -> Result<Self> {
        let compiled = Self::compile(pregex, replacements)?;
        for matcher in &compiled.matchers {
            if !dims.iter().any(|d| d.as_ref() == matcher.dim) {
                return Err(FilecubeError::UnknownDimension {
                    filegroup: filegroup.to_string(),
                    dim: matcher.dim.clone(),
                });
            }
        }
        Ok(compiled)
    }

    /// The pre-regex, trimmed
    #[must_use]
    pub fn pregex(&self) -> &str {
        &self.pregex
    }

    #[must_use]
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    #[must_use]
    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    #[must_use]
    pub fn n_matchers(&self) -> usize {
        self.matchers.len()
    }

    /// Matchers feeding `dim`
    pub fn matchers_for<'a>(&'a self, dim: &'a str) -> impl Iterator<Item = &'a Matcher> + 'a {
        self.matchers.iter().filter(move |m| m.dim == dim)
    }

    #[must_use]
    pub fn captures<'t>(&self, filename: &'t str) -> Option<Captures<'t>> {
        self.regex.captures(filename)
    }

    /// Segments of `filename`, if it matches
    #[must_use]
    pub fn segments(&self, filename: &str) -> Option<Segments> {
        let caps = self.captures(filename)?;
        Segments::from_captures(&caps, self.matchers.len())
    }
}

/// Literal fragments of a filename around each matcher.
///
/// `segments[2 * i + 1]` holds the text captured by matcher `i`, the even
/// positions the text around captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segments(Vec<String>);

impl Segments {
    /// Split the matched string at the boundaries of the `n_matchers` capture groups
    #[must_use]
    pub fn from_captures(caps: &Captures<'_>, n_matchers: usize) -> Option<Self> {
        let whole = caps.get(0)?;
        let text = whole.as_str();
        let offset = whole.start();

        let mut seps = vec![0];
        for idx in 0..n_matchers {
            let group = caps.name(&format!("m{idx}"))?;
            seps.push(group.start() - offset);
            seps.push(group.end() - offset);
        }
        seps.push(text.len());

        let segments = seps.windows(2).map(|w| text[w[0]..w[1]].to_string()).collect();
        Some(Self(segments))
    }

    /// Text captured by matcher `idx`
    #[must_use]
    pub fn matched(&self, idx: usize) -> Option<&str> {
        self.0.get(2 * idx + 1).map(String::as_str)
    }

    /// Replace the text of matcher `idx`
    pub fn substitute(&mut self, idx: usize, text: &str) {
        if let Some(slot) = self.0.get_mut(2 * idx + 1) {
            text.clone_into(slot);
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn join(&self) -> String {
        self.0.concat()
    }
}

impl fmt::Display for Segments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join())
    }
}
