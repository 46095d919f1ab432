//! EPUB canonical fragment identifiers (CFI) and read-range normalization.
//!
//! Only the parts of the CFI grammar needed to order locations are
//! interpreted: steps (`/4`), indirection (`!`) and terminal character
//! offsets (`:12`). Bracketed assertions (`[chap01]`) are accepted and
//! dropped. Range CFIs use the `epubcfi(parent,start,end)` form.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// One `/n` step of a CFI path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfiStep {
    /// Child index.
    pub index: u32,
    /// Character offset, only on the terminal step.
    pub offset: Option<u32>,
    /// Whether the step is followed by an indirection (`!`).
    pub indirect: bool,
}

impl CfiStep {
    /// Orders by index then offset. A missing offset sorts just before `:0`
    /// and a plain step before an indirect one, so ordering agrees with
    /// equality.
    fn sort_key(&self) -> (u32, u32, bool, bool) {
        (
            self.index,
            self.offset.unwrap_or(0),
            self.offset.is_some(),
            self.indirect,
        )
    }
}

impl fmt::Display for CfiStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.index)?;
        if let Some(offset) = self.offset {
            write!(f, ":{offset}")?;
        }
        if self.indirect {
            f.write_str("!")?;
        }
        Ok(())
    }
}

/// A location in a book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfiPoint {
    steps: Vec<CfiStep>,
}

impl CfiPoint {
    /// Parses a point CFI such as `epubcfi(/6/4!/4/2/1:0)`.
    pub fn parse(cfi: &str) -> Option<Self> {
        let inner = unwrap_epubcfi(cfi)?;
        if split_top_level(inner, ',').len() != 1 {
            return None;
        }
        Self::parse_path(inner)
    }

    /// Parses a bare path such as `/6/4!/4/2/1:0`.
    pub fn parse_path(path: &str) -> Option<Self> {
        let tokens = split_top_level(path, '/');
        let mut tokens = tokens.into_iter();
        // A path starts with '/', so the first token is empty.
        if !tokens.next()?.is_empty() {
            return None;
        }

        let steps = tokens.map(parse_step).collect::<Option<Vec<_>>>()?;
        if steps.is_empty() {
            return None;
        }
        Some(Self { steps })
    }

    /// The steps of this point.
    pub fn steps(&self) -> &[CfiStep] {
        &self.steps
    }

    fn render(steps: &[CfiStep]) -> String {
        steps.iter().map(ToString::to_string).collect()
    }
}

impl Ord for CfiPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.steps.iter().zip(&other.steps) {
            match a.sort_key().cmp(&b.sort_key()) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        self.steps.len().cmp(&other.steps.len())
    }
}

impl PartialOrd for CfiPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CfiPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epubcfi({})", Self::render(&self.steps))
    }
}

/// A span of text between two locations, `start <= end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfiRange {
    /// First location.
    pub start: CfiPoint,
    /// Last location.
    pub end: CfiPoint,
}

impl CfiRange {
    /// Parses `epubcfi(parent,start,end)` or a point CFI (an empty range).
    pub fn parse(cfi: &str) -> Option<Self> {
        let inner = unwrap_epubcfi(cfi)?;
        let parts = split_top_level(inner, ',');
        let (start, end) = match parts.as_slice() {
            [point] => {
                let point = CfiPoint::parse_path(point)?;
                (point.clone(), point)
            }
            [parent, start, end] => (
                CfiPoint::parse_path(&format!("{parent}{start}"))?,
                CfiPoint::parse_path(&format!("{parent}{end}"))?,
            ),
            _ => return None,
        };

        if start <= end {
            Some(Self { start, end })
        } else {
            Some(Self {
                start: end,
                end: start,
            })
        }
    }

    /// Returns true if `other` starts inside or right at the end of `self`.
    pub fn touches(&self, other: &CfiRange) -> bool {
        other.start <= self.end && self.start <= other.end
    }
}

impl fmt::Display for CfiRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            return write!(f, "{}", self.start);
        }

        let start = &self.start.steps;
        let end = &self.end.steps;
        let shared = start
            .iter()
            .zip(end)
            .take_while(|(a, b)| a == b)
            .count()
            .min(start.len() - 1)
            .min(end.len() - 1);

        write!(
            f,
            "epubcfi({},{},{})",
            CfiPoint::render(&start[..shared]),
            CfiPoint::render(&start[shared..]),
            CfiPoint::render(&end[shared..]),
        )
    }
}

/// Sorts, coalesces and re-renders a set of read ranges.
///
/// Overlapping or adjacent ranges collapse into one. Strings that are not
/// valid CFIs are kept verbatim (deduplicated, sorted) after the parsed
/// ranges so no user data is dropped.
pub fn normalize_ranges<I, S>(ranges: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed = Vec::new();
    let mut unparsed = BTreeSet::new();

    for raw in ranges {
        let raw = raw.as_ref();
        match CfiRange::parse(raw) {
            Some(range) => parsed.push(range),
            None => {
                unparsed.insert(raw.to_string());
            }
        }
    }

    parsed.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end)));

    let mut coalesced: Vec<CfiRange> = Vec::with_capacity(parsed.len());
    for range in parsed {
        match coalesced.last_mut() {
            Some(current) if current.touches(&range) => {
                if range.end > current.end {
                    current.end = range.end;
                }
            }
            _ => coalesced.push(range),
        }
    }

    coalesced
        .iter()
        .map(ToString::to_string)
        .chain(unparsed)
        .collect()
}

/// Union of two range sets, re-normalized.
pub fn union_ranges(local: &[String], remote: &[String]) -> Vec<String> {
    normalize_ranges(local.iter().chain(remote))
}

fn unwrap_epubcfi(cfi: &str) -> Option<&str> {
    cfi.trim()
        .strip_prefix("epubcfi(")
        .and_then(|rest| rest.strip_suffix(')'))
}

/// Splits on `sep` outside of `[...]` assertions.
fn split_top_level(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn parse_step(token: &str) -> Option<CfiStep> {
    let mut rest = token;

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let index = rest[..digits].parse().ok()?;
    rest = skip_assertion(&rest[digits..])?;

    let mut offset = None;
    if let Some(after) = rest.strip_prefix(':') {
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        offset = Some(after[..digits].parse().ok()?);
        rest = skip_assertion(&after[digits..])?;
    }

    let indirect = match rest {
        "" => false,
        "!" => true,
        _ => return None,
    };

    Some(CfiStep {
        index,
        offset,
        indirect,
    })
}

fn skip_assertion(rest: &str) -> Option<&str> {
    match rest.strip_prefix('[') {
        Some(inner) => inner.find(']').map(|end| &inner[end + 1..]),
        None => Some(rest),
    }
}
