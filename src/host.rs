//! Line-oriented encoding of host property changes and lifecycle events, used
//! to drive a producer from a recorded or piped event stream.

use crate::error::{Result, SubhistError};
use crate::producer::{PlayerEvent, Track};

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{space0, space1};
use nom::combinator::{all_consuming, map, opt, rest, value};
use nom::error::{convert_error, VerboseError};
use nom::number::complete::double;
use nom::sequence::preceded;
use nom::{Err, IResult};

pub struct HostEventParser {
    line: usize,
}

impl HostEventParser {
    pub fn new() -> Self {
        Self { line: 0 }
    }

    /// Parses the next line of the stream. Blank lines, comments and
    /// unavailable property values produce `Ok(None)`.
    pub fn parse_line(&mut self, input: &str) -> Result<Option<PlayerEvent>> {
        self.line += 1;
        let input = input.trim_end_matches(|c: char| c == '\n' || c == '\r');
        match all_consuming(host_line)(input) {
            Ok((_, event)) => Ok(event),
            Err(Err::Error(err)) | Err(Err::Failure(err)) => Err(SubhistError::HostEvent {
                line: self.line,
                message: convert_error(input, err),
            }),
            Err(Err::Incomplete(_)) => {
                unreachable!("Incomplete data received by non-streaming parser.")
            }
        }
    }
}

impl Default for HostEventParser {
    fn default() -> Self {
        Self::new()
    }
}

type ParseResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

fn host_line(input: &str) -> ParseResult<Option<PlayerEvent>> {
    let (input, _) = space0(input)?;
    alt((
        value(None, comment),
        value(None, blank),
        preceded(tag("prop"), preceded(space1, property)),
        map(preceded(tag("event"), preceded(space1, lifecycle)), Some),
    ))(input)
}

fn comment(input: &str) -> ParseResult<&str> {
    preceded(tag("#"), rest)(input)
}

fn blank(input: &str) -> ParseResult<&str> {
    if input.trim().is_empty() {
        Ok((&input[input.len()..], input))
    } else {
        Err(Err::Error(nom::error::make_error(
            input,
            nom::error::ErrorKind::Eof,
        )))
    }
}

fn property(input: &str) -> ParseResult<Option<PlayerEvent>> {
    alt((
        map(preceded(tag("secondary-sub-text"), sub_text), |text| {
            Some(PlayerEvent::SubtitleChanged {
                track: Track::Secondary,
                text,
            })
        }),
        map(preceded(tag("sub-text"), sub_text), |text| {
            Some(PlayerEvent::SubtitleChanged {
                track: Track::Primary,
                text,
            })
        }),
        preceded(tag("time-pos"), preceded(space1, position)),
    ))(input)
}

fn sub_text(input: &str) -> ParseResult<String> {
    let (input, text) = opt(preceded(tag(" "), rest))(input)?;
    Ok((input, unescape(text.unwrap_or(""))))
}

fn position(input: &str) -> ParseResult<Option<PlayerEvent>> {
    let (input, sample) = alt((
        value(None, tag("none")),
        map(double, Some),
    ))(input)?;
    let (input, _) = space0(input)?;
    Ok((input, sample.map(PlayerEvent::PositionSampled)))
}

fn lifecycle(input: &str) -> ParseResult<PlayerEvent> {
    let (input, name) = take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-')(input)?;
    let (input, _) = space0(input)?;
    match name {
        "file-loaded" => Ok((input, PlayerEvent::FileLoaded)),
        "seek" => Ok((input, PlayerEvent::SeekOccurred)),
        _ => Err(Err::Failure(nom::error::make_error(
            name,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
