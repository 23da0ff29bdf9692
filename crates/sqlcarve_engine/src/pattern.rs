//! Matcher compilation.
//!
//! Every (table, scenario) pair compiles to a fixed sequence of [`Token`]s
//! that is evaluated against the buffer at each candidate offset. Tokens are
//! consumed strictly left to right with exact varint structure, so a matcher
//! either accepts one span at an offset or rejects it; there is no
//! backtracking and no alternative widths.
//!
//! Ranges on length fields are derived from the table's storage classes,
//! which rejects most random offsets before any decoding work is done.

use crate::filter::residual_range;
use crate::scenario::Scenario;
use crate::serial_type::{admits, class_bounds, payload_length};
use crate::varint::{read_varint, varint_len, MAX_VARINT_LEN};
use byteorder::{BigEndian, ByteOrder};
use sqlcarve_schema::{StorageClass, TableSpec};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Runs of NUL bytes at least this long disqualify blob and numeric content.
pub const NUL_RUN_LIMIT: usize = 10;

/// Size of a freeblock header (next pointer + length).
pub const FREEBLOCK_HEADER_LEN: u64 = 4;

/// One element of a compiled matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Bytes with no constraint (the next-freeblock pointer).
    Skip(usize),
    /// Big-endian u16 within `min..=max` (the freeblock length).
    U16 { min: u16, max: u16 },
    /// Varint within `min..=max`.
    Varint { min: u64, max: u64 },
    /// Single byte without a continuation bit, within `min..=max`.
    TailByte { min: u8, max: u8 },
    /// Trailing bytes of a varint whose leading bytes were overwritten:
    /// up to 7 continuation bytes followed by a terminator.
    VarintTail,
    /// Serial type code admissible for a storage class.
    SerialType(StorageClass),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Skip(n) => write!(f, "skip({n})"),
            Token::U16 { min, max } => write!(f, "u16[{min}..={max}]"),
            Token::Varint { min, max } if *max == u64::MAX => write!(f, "varint[{min}..]"),
            Token::Varint { min, max } => write!(f, "varint[{min}..={max}]"),
            Token::TailByte { min, max } => write!(f, "tail[{min}..={max}]"),
            Token::VarintTail => f.write_str("varint-tail"),
            Token::SerialType(class) => write!(f, "type({class})"),
        }
    }
}

/// Constraint applied to the bytes following the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadConstraint {
    None,
    /// Column bytes must be present and blob or numeric columns free of long
    /// NUL runs.
    Lookahead,
    /// Payload must contain the given bytes.
    Keyword(Vec<u8>),
}

/// Length bounds implied by a run of storage classes.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    type_min: u64,
    type_max: u64,
    payload_min: u64,
    payload_max: Option<u64>,
}

impl Bounds {
    fn of(classes: impl Iterator<Item = StorageClass>) -> Self {
        let mut bounds = Bounds {
            type_min: 0,
            type_max: 0,
            payload_min: 0,
            payload_max: Some(0),
        };
        for class in classes {
            let cb = class_bounds(class);
            bounds.type_min += 1;
            bounds.type_max += cb.max_code_bytes;
            bounds.payload_min += cb.min_payload;
            bounds.payload_max = match (bounds.payload_max, cb.max_payload) {
                (Some(a), Some(b)) => Some(a + b),
                _ => None,
            };
        }
        bounds
    }

    /// Smallest possible header length (includes its own varint).
    fn array_min(&self) -> u64 {
        self.type_min + 1
    }

    /// Largest possible header length.
    fn array_max(&self) -> u64 {
        self.type_max + varint_len(self.type_max + MAX_VARINT_LEN as u64) as u64
    }
}

fn plus(max: Option<u64>, extra: u64) -> Option<u64> {
    max.map(|m| m.saturating_add(extra))
}

/// Clamp a freeblock length range to what a u16 can hold.
fn u16_token(min: u64, max: Option<u64>) -> Option<Token> {
    let min = u16::try_from(min.max(FREEBLOCK_HEADER_LEN)).ok()?;
    let max = max.map_or(u16::MAX, |m| u16::try_from(m).unwrap_or(u16::MAX));
    (min <= max).then_some(Token::U16 { min, max })
}

/// Compiled matcher for one table under one scenario.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    table: Arc<TableSpec>,
    table_name: Arc<str>,
    scenario: Scenario,
    tokens: Vec<Token>,
    /// Index of the first [`Token::SerialType`].
    types_from: usize,
    constraint: PayloadConstraint,
}

impl CompiledMatcher {
    pub fn table(&self) -> &Arc<TableSpec> {
        &self.table
    }

    pub fn table_name(&self) -> &Arc<str> {
        &self.table_name
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn constraint(&self) -> &PayloadConstraint {
        &self.constraint
    }

    /// Storage classes covered by the serial type tokens, in order.
    pub fn type_classes(&self) -> impl Iterator<Item = StorageClass> + '_ {
        self.tokens[self.types_from..].iter().filter_map(|t| match t {
            Token::SerialType(class) => Some(*class),
            _ => None,
        })
    }

    /// Space separated token listing.
    pub fn describe(&self) -> String {
        self.tokens
            .iter()
            .map(Token::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Try to match at `offset`. Returns the exclusive end of the header span.
    pub fn match_at(&self, buf: &[u8], offset: usize) -> Option<usize> {
        let mut pos = offset;
        let mut type_start = offset;
        let mut content_len: u64 = 0;

        for (i, token) in self.tokens.iter().enumerate() {
            if i == self.types_from {
                type_start = pos;
            }
            match token {
                Token::Skip(n) => {
                    if buf.len() < pos + n {
                        return None;
                    }
                    pos += n;
                }
                Token::U16 { min, max } => {
                    let value = BigEndian::read_u16(buf.get(pos..pos + 2)?);
                    if value < *min || value > *max {
                        return None;
                    }
                    pos += 2;
                }
                Token::Varint { min, max } => {
                    let (value, n) = read_varint(buf.get(pos..)?).ok()?;
                    if value < *min || value > *max {
                        return None;
                    }
                    pos += n;
                }
                Token::TailByte { min, max } => {
                    let byte = *buf.get(pos)?;
                    if byte & 0x80 != 0 || byte < *min || byte > *max {
                        return None;
                    }
                    pos += 1;
                }
                Token::VarintTail => {
                    let mut consumed = 0;
                    loop {
                        let byte = *buf.get(pos + consumed)?;
                        consumed += 1;
                        if byte & 0x80 == 0 {
                            break;
                        }
                        if consumed == MAX_VARINT_LEN - 1 {
                            return None;
                        }
                    }
                    pos += consumed;
                }
                Token::SerialType(class) => {
                    let (code, n) = read_varint(buf.get(pos..)?).ok()?;
                    if !admits(*class, code) {
                        return None;
                    }
                    content_len = content_len.saturating_add(payload_length(code)?);
                    pos += n;
                }
            }
        }

        // A header of nothing but NULL codes carries no record.
        let types = &buf[type_start..pos];
        if types.is_empty() || types.iter().all(|&b| b == 0) {
            return None;
        }

        match &self.constraint {
            PayloadConstraint::None => {}
            PayloadConstraint::Lookahead => {
                if !self.payload_plausible(buf, type_start, pos, content_len) {
                    return None;
                }
            }
            PayloadConstraint::Keyword(keyword) => {
                let len = usize::try_from(content_len).ok()?;
                let payload = buf.get(pos..pos.checked_add(len)?)?;
                if !contains(payload, keyword) {
                    return None;
                }
            }
        }

        Some(pos)
    }

    fn payload_plausible(&self, buf: &[u8], type_start: usize, end: usize, total: u64) -> bool {
        let Ok(total) = usize::try_from(total) else {
            return false;
        };
        if end.checked_add(total).map_or(true, |stop| stop > buf.len()) {
            return false;
        }

        let mut cursor = type_start;
        let mut content = end;
        for class in self.type_classes() {
            let Ok((code, n)) = read_varint(&buf[cursor..end]) else {
                return false;
            };
            cursor += n;
            let len = payload_length(code).unwrap_or(0) as usize;
            if checks_content(class) && has_nul_run(&buf[content..content + len]) {
                return false;
            }
            content += len;
        }
        true
    }
}

/// Text may legitimately hold NUL padding; only opaque content is checked.
fn checks_content(class: StorageClass) -> bool {
    matches!(class.nullable(), StorageClass::Blob | StorageClass::Numeric)
}

fn has_nul_run(bytes: &[u8]) -> bool {
    let mut run = 0;
    for &b in bytes {
        if b == 0 {
            run += 1;
            if run >= NUL_RUN_LIMIT {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

pub(crate) fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// Compiles [`CompiledMatcher`]s from table specs.
#[derive(Debug, Clone, Default)]
pub struct PatternBuilder {
    keyword: Option<Vec<u8>>,
}

impl PatternBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict intact-cell matching to payloads containing `keyword`.
    pub fn with_keyword(mut self, keyword: impl AsRef<str>) -> Self {
        let keyword = keyword.as_ref();
        self.keyword = (!keyword.is_empty()).then(|| keyword.as_bytes().to_vec());
        self
    }

    pub fn keyword(&self) -> Option<&[u8]> {
        self.keyword.as_deref()
    }

    /// Compile every table under every requested scenario, skipping
    /// combinations that can never match.
    pub fn build_all(
        &self,
        tables: &[Arc<TableSpec>],
        scenarios: &[Scenario],
    ) -> Vec<CompiledMatcher> {
        let mut matchers = Vec::new();
        for table in tables {
            for scenario in scenarios {
                match self.build(table, *scenario) {
                    Some(m) => matchers.push(m),
                    None => debug!("No {} matcher for table '{}'", scenario, table.name),
                }
            }
        }
        matchers
    }

    /// Compile one matcher. Returns `None` when the table's shape makes the
    /// scenario impossible (for example a 1-byte header under
    /// [`Scenario::ArrayLengthSplit`]).
    pub fn build(&self, table: &Arc<TableSpec>, scenario: Scenario) -> Option<CompiledMatcher> {
        if table.columns.is_empty() {
            return None;
        }
        let all = Bounds::of(table.storage_classes());
        let type_tokens = |skip: usize| {
            table
                .storage_classes()
                .skip(skip)
                .map(Token::SerialType)
                .collect::<Vec<_>>()
        };
        let array_len = Token::Varint {
            min: all.array_min(),
            max: all.array_max(),
        };
        let fb = FREEBLOCK_HEADER_LEN;

        let mut tokens = match scenario {
            Scenario::Intact => vec![
                Token::Varint {
                    min: all.array_min() + all.payload_min,
                    max: plus(all.payload_max, all.array_max()).unwrap_or(u64::MAX),
                },
                Token::Varint { min: 0, max: u64::MAX },
                array_len,
            ],
            Scenario::FirstTypeOverwritten => {
                if table.column_count() < 2 {
                    return None;
                }
                let rest = Bounds::of(table.storage_classes().skip(1));
                let (first_min, first_max) = residual_range(table.first_class()?);
                vec![
                    Token::Skip(2),
                    u16_token(
                        fb + rest.type_min + rest.payload_min + first_min,
                        first_max
                            .and_then(|f| plus(rest.payload_max, f + fb + rest.type_max)),
                    )?,
                ]
            }
            Scenario::PrefixOverwritten => vec![
                Token::Skip(2),
                u16_token(
                    fb + all.type_min + all.payload_min,
                    plus(all.payload_max, fb + all.type_max),
                )?,
            ],
            Scenario::LengthAndRowidOverwritten => vec![
                Token::Skip(2),
                u16_token(
                    fb + all.array_min() + all.payload_min,
                    plus(all.payload_max, fb + all.array_max()),
                )?,
                array_len,
            ],
            Scenario::ArrayLengthSplit => {
                // The lost first byte is assumed to be 0x81: header 128..=255.
                let lo = all.array_min().max(128);
                let hi = all.array_max().min(255);
                if lo > hi {
                    return None;
                }
                vec![
                    Token::Skip(2),
                    u16_token(
                        fb - 1 + lo + all.payload_min,
                        plus(all.payload_max, fb - 1 + hi),
                    )?,
                    Token::TailByte {
                        min: (lo - 128) as u8,
                        max: (hi - 128) as u8,
                    },
                ]
            }
            Scenario::RowidSplit => vec![
                Token::Skip(2),
                u16_token(
                    fb + 1 + all.array_min() + all.payload_min,
                    plus(all.payload_max, fb + 8 + all.array_max()),
                )?,
                Token::VarintTail,
                array_len,
            ],
        };

        let types_from = tokens.len();
        tokens.extend(type_tokens(usize::from(
            scenario == Scenario::FirstTypeOverwritten,
        )));

        let constraint = match (scenario, &self.keyword) {
            (Scenario::Intact, Some(keyword)) => PayloadConstraint::Keyword(keyword.clone()),
            (Scenario::Intact, None) => PayloadConstraint::Lookahead,
            _ => PayloadConstraint::None,
        };

        Some(CompiledMatcher {
            table: Arc::clone(table),
            table_name: Arc::from(table.name.as_str()),
            scenario,
            tokens,
            types_from,
            constraint,
        })
    }
}
