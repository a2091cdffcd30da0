//! Go-style duration wire format.
//!
//! TTLs and retry periods travel as strings like `"300ms"`, `"10s"` or
//! `"1h30m"`: one or more `<number><unit>` terms, units `ns`, `us`, `µs`,
//! `ms`, `s`, `m`, `h`, with an optional fractional part per term. `"0"`
//! is accepted on its own.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

const NANOS_PER_US: i128 = 1_000;
const NANOS_PER_MS: i128 = 1_000_000;
const NANOS_PER_SEC: i128 = 1_000_000_000;

/// A duration carried on the wire as a Go-style duration string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(chrono::Duration);

impl Duration {
    /// The zero duration.
    pub fn zero() -> Self {
        Self(chrono::Duration::zero())
    }

    /// Create a duration from whole seconds.
    pub fn seconds(secs: i64) -> Self {
        Self(chrono::Duration::seconds(secs))
    }

    /// Create a duration from whole minutes.
    pub fn minutes(mins: i64) -> Self {
        Self(chrono::Duration::minutes(mins))
    }

    /// Create a duration from whole hours.
    pub fn hours(hours: i64) -> Self {
        Self(chrono::Duration::hours(hours))
    }

    /// Create a duration from whole milliseconds.
    pub fn milliseconds(ms: i64) -> Self {
        Self(chrono::Duration::milliseconds(ms))
    }

    /// View as a `chrono::Duration`.
    pub fn as_chrono(&self) -> chrono::Duration {
        self.0
    }

    /// Convert to `std::time::Duration`, clamping negatives to zero.
    pub fn to_std(&self) -> std::time::Duration {
        self.0.to_std().unwrap_or(std::time::Duration::ZERO)
    }

    fn from_nanos(ns: i128) -> Result<Self> {
        let ns = i64::try_from(ns)
            .map_err(|_| Error::invalid_duration(ns.to_string(), "out of range"))?;
        Ok(Self(chrono::Duration::nanoseconds(ns)))
    }

    fn nanos(&self) -> i64 {
        // chrono durations constructed from i64 nanoseconds always fit back
        self.0.num_nanoseconds().unwrap_or(i64::MAX)
    }
}

impl From<chrono::Duration> for Duration {
    fn from(d: chrono::Duration) -> Self {
        Self(d)
    }
}

impl FromStr for Duration {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let s = input.trim();
        if s.is_empty() {
            return Err(Error::invalid_duration(input, "empty string"));
        }
        let (negative, mut rest) = match s.strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, s),
        };
        if rest == "0" {
            return Ok(Self::zero());
        }
        let mut total_ns: i128 = 0;
        while !rest.is_empty() {
            let number_len = rest
                .find(|c: char| !c.is_ascii_digit() && c != '.')
                .unwrap_or(rest.len());
            if number_len == 0 {
                return Err(Error::invalid_duration(input, "expected a number"));
            }
            let (number, tail) = rest.split_at(number_len);
            let (unit_ns, unit_len) = parse_unit(tail)
                .ok_or_else(|| Error::invalid_duration(input, "unknown or missing unit"))?;
            if number.contains('.') {
                let value: f64 = number
                    .parse()
                    .map_err(|_| Error::invalid_duration(input, "malformed number"))?;
                total_ns += (value * unit_ns as f64).round() as i128;
            } else {
                let value: i128 = number
                    .parse()
                    .map_err(|_| Error::invalid_duration(input, "malformed number"))?;
                total_ns += value * unit_ns;
            }
            rest = &tail[unit_len..];
        }
        if negative {
            total_ns = -total_ns;
        }
        Self::from_nanos(total_ns)
    }
}

fn parse_unit(s: &str) -> Option<(i128, usize)> {
    // two-byte units first so "ms" is not read as minutes
    if s.starts_with("ns") {
        Some((1, 2))
    } else if s.starts_with("us") {
        Some((NANOS_PER_US, 2))
    } else if s.starts_with("µs") {
        Some((NANOS_PER_US, "µs".len()))
    } else if s.starts_with("ms") {
        Some((NANOS_PER_MS, 2))
    } else if s.starts_with('s') {
        Some((NANOS_PER_SEC, 1))
    } else if s.starts_with('m') {
        Some((60 * NANOS_PER_SEC, 1))
    } else if s.starts_with('h') {
        Some((3600 * NANOS_PER_SEC, 1))
    } else {
        None
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ns = self.nanos();
        if ns == 0 {
            return write!(f, "0s");
        }
        if ns < 0 {
            write!(f, "-")?;
            ns = ns.saturating_abs();
        }
        let ns = ns as i128;
        if ns < NANOS_PER_US {
            write!(f, "{ns}ns")
        } else if ns < NANOS_PER_MS {
            write_scaled(f, ns, NANOS_PER_US, "us")
        } else if ns < NANOS_PER_SEC {
            write_scaled(f, ns, NANOS_PER_MS, "ms")
        } else {
            let total_secs = ns / NANOS_PER_SEC;
            let hours = total_secs / 3600;
            let minutes = (total_secs % 3600) / 60;
            if hours > 0 {
                write!(f, "{hours}h")?;
            }
            if hours > 0 || minutes > 0 {
                write!(f, "{minutes}m")?;
            }
            write_scaled(f, ns % (60 * NANOS_PER_SEC), NANOS_PER_SEC, "s")
        }
    }
}

/// Write `ns / divisor` with the fractional part trimmed of trailing zeros.
fn write_scaled(f: &mut fmt::Formatter<'_>, ns: i128, divisor: i128, unit: &str) -> fmt::Result {
    let whole = ns / divisor;
    let frac = ns % divisor;
    if frac == 0 {
        return write!(f, "{whole}{unit}");
    }
    let width = divisor.ilog10() as usize;
    let digits = format!("{frac:0width$}");
    write!(f, "{whole}.{}{unit}", digits.trim_end_matches('0'))
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
