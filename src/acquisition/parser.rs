//! Sensor board line parser
//!
//! Boards print one line per scan in one of two firmware formats:
//!
//! ```text
//! UNO3_C0:120 UNO3_C1:98 UNO3_C2=-4      (prefixed)
//! [UNO0] C0=400 C1=398 C2: 401           (bracketed)
//! ```
//!
//! Anything else (boot banners, partial lines, noise after a reset) is
//! discarded. Parsing never fails loudly; a rejected line just yields `None`.

use std::collections::BTreeMap;

use regex::Regex;

use crate::types::{BoardId, BoardReading};

/// Compiled patterns for both line formats
#[derive(Debug, Clone)]
pub struct BoardLineParser {
    prefixed: Regex,
    bracket: Regex,
    bracket_channel: Regex,
}

impl BoardLineParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            prefixed: Regex::new(r"(?i)\b(UNO[0-6])_C(\d+)\s*[:=]\s*(-?\d+)")?,
            bracket: Regex::new(r"(?i)\[\s*(UNO[0-6])\s*\]")?,
            bracket_channel: Regex::new(r"(?i)\bC\s*(\d+)\s*[:=]\s*(-?\d+)")?,
        })
    }

    /// Parse one raw line into a reading, or `None` if the line is rejected.
    pub fn parse(&self, line: &str) -> Option<BoardReading> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let parsed = self
            .parse_prefixed(line)
            .or_else(|| self.parse_bracketed(line));

        match parsed {
            Some((board, channels)) if !channels.is_empty() => Some(BoardReading::new(board, channels)),
            Some((board, _)) => {
                tracing::debug!(board = %board, line, "Discarding line with no channel values");
                None
            }
            None => {
                tracing::debug!(line, "Discarding unrecognized line");
                None
            }
        }
    }

    /// `BOARD_Ck:V` assignments. The first in-range board mentioned owns the line.
    fn parse_prefixed(&self, line: &str) -> Option<(BoardId, BTreeMap<u16, i32>)> {
        let mut captures = self.prefixed.captures_iter(line).peekable();
        let board = BoardId::parse(captures.peek()?.get(1)?.as_str())?;

        let mut channels = BTreeMap::new();
        for cap in captures {
            if BoardId::parse(&cap[1]) != Some(board) {
                continue;
            }
            insert_channel(&mut channels, &cap[2], &cap[3]);
        }
        Some((board, channels))
    }

    /// `[BOARD] Ck=V ...`
    fn parse_bracketed(&self, line: &str) -> Option<(BoardId, BTreeMap<u16, i32>)> {
        let header = self.bracket.captures(line)?;
        let board = BoardId::parse(header.get(1)?.as_str())?;

        let rest = &line[header.get(0)?.end()..];
        let mut channels = BTreeMap::new();
        for cap in self.bracket_channel.captures_iter(rest) {
            insert_channel(&mut channels, &cap[1], &cap[2]);
        }
        Some((board, channels))
    }
}

/// Channels or values that overflow are skipped individually.
fn insert_channel(channels: &mut BTreeMap<u16, i32>, index: &str, value: &str) {
    match (index.parse::<u16>(), value.parse::<i32>()) {
        (Ok(index), Ok(value)) => {
            channels.insert(index, value);
        }
        _ => tracing::debug!(index, value, "Skipping out-of-range channel assignment"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> BoardLineParser {
        BoardLineParser::new().unwrap()
    }

    #[test]
    fn test_prefixed_format() {
        let reading = parser().parse("UNO3_C0:120 UNO3_C1 = 98 UNO3_C2=-4").unwrap();
        assert_eq!(reading.board, BoardId::Uno3);
        assert_eq!(reading.channel(0), Some(120));
        assert_eq!(reading.channel(1), Some(98));
        assert_eq!(reading.channel(2), Some(-4));
        assert_eq!(reading.channels.len(), 3);
    }

    #[test]
    fn test_prefixed_is_case_insensitive() {
        let reading = parser().parse("uno0_c5:7").unwrap();
        assert_eq!(reading.board, BoardId::Uno0);
        assert_eq!(reading.channel(5), Some(7));
    }

    #[test]
    fn test_prefixed_first_board_owns_line() {
        let reading = parser().parse("UNO1_C0:5 UNO2_C0:9 UNO1_C1:6").unwrap();
        assert_eq!(reading.board, BoardId::Uno1);
        assert_eq!(reading.channels.len(), 2);
        assert_eq!(reading.channel(1), Some(6));
    }

    #[test]
    fn test_prefixed_skips_out_of_range_owner() {
        let reading = parser().parse("UNO7_C0:1 UNO3_C0:5 UNO3_C1:6").unwrap();
        assert_eq!(reading.board, BoardId::Uno3);
        assert_eq!(reading.channel(0), Some(5));
        assert_eq!(reading.channel(1), Some(6));
        assert_eq!(reading.channels.len(), 2);
    }

    #[test]
    fn test_bracketed_format() {
        let reading = parser().parse("[ UNO0 ] C0=400 C1: 398 c2=401").unwrap();
        assert_eq!(reading.board, BoardId::Uno0);
        assert_eq!(reading.channel(0), Some(400));
        assert_eq!(reading.channel(1), Some(398));
        assert_eq!(reading.channel(2), Some(401));
    }

    #[test]
    fn test_rejects_out_of_range_board() {
        assert!(parser().parse("UNO7_C0:1").is_none());
        assert!(parser().parse("[UNO9] C0=1").is_none());
    }

    #[test]
    fn test_rejects_noise() {
        let p = parser();
        assert!(p.parse("").is_none());
        assert!(p.parse("Booting sensor array v2.1").is_none());
        assert!(p.parse("UNO3_C").is_none());
        assert!(p.parse("[UNO2]").is_none());
        assert!(p.parse("\u{fffd}\u{fffd}3_C0:1").is_none());
    }

    #[test]
    fn test_overflowing_value_skips_only_that_channel() {
        let reading = parser().parse("UNO4_C0:99999999999 UNO4_C1:12").unwrap();
        assert_eq!(reading.channel(0), None);
        assert_eq!(reading.channel(1), Some(12));
    }
}
