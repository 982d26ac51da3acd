//! UDUNITS-style units.
//!
//! Supports SI symbols and names with decimal prefixes, products,
//! quotients and integer powers (`kg m-2 s-1`, `W/m2`, `m^2`), plus
//! reference-time units (`days since 2000-01-01`) under the CF calendars.
//! Units strings that cannot be parsed are kept as opaque strings: they
//! are only equivalent to an identical string and only convert to
//! themselves.

use std::fmt;

use chrono::NaiveDate;

use crate::error::{ModelError, ModelResult};

/// Number of base dimensions: length, mass, time, temperature, current,
/// amount of substance, plane angle.
const DIMENSIONS: usize = 7;

type Dims = [i8; DIMENSIONS];

const NONE: Dims = [0, 0, 0, 0, 0, 0, 0];
const LENGTH: Dims = [1, 0, 0, 0, 0, 0, 0];
const MASS: Dims = [0, 1, 0, 0, 0, 0, 0];
const TIME: Dims = [0, 0, 1, 0, 0, 0, 0];
const TEMPERATURE: Dims = [0, 0, 0, 1, 0, 0, 0];
const CURRENT: Dims = [0, 0, 0, 0, 1, 0, 0];
const AMOUNT: Dims = [0, 0, 0, 0, 0, 1, 0];
const ANGLE: Dims = [0, 0, 0, 0, 0, 0, 1];
const VOLUME: Dims = [3, 0, 0, 0, 0, 0, 0];
const FORCE: Dims = [1, 1, -2, 0, 0, 0, 0];
const PRESSURE: Dims = [-1, 1, -2, 0, 0, 0, 0];
const ENERGY: Dims = [2, 1, -2, 0, 0, 0, 0];
const POWER: Dims = [2, 1, -3, 0, 0, 0, 0];

const DEGREE: f64 = std::f64::consts::PI / 180.0;

/// Unit symbols and names: (name, scale to base, offset to base, dims,
/// accepts a decimal prefix).
const SYMBOLS: &[(&str, f64, f64, Dims, bool)] = &[
    ("1", 1.0, 0.0, NONE, false),
    ("%", 0.01, 0.0, NONE, false),
    ("percent", 0.01, 0.0, NONE, false),
    ("ppm", 1e-6, 0.0, NONE, false),
    ("m", 1.0, 0.0, LENGTH, true),
    ("metre", 1.0, 0.0, LENGTH, true),
    ("metres", 1.0, 0.0, LENGTH, true),
    ("meter", 1.0, 0.0, LENGTH, true),
    ("meters", 1.0, 0.0, LENGTH, true),
    ("g", 1e-3, 0.0, MASS, true),
    ("gram", 1e-3, 0.0, MASS, true),
    ("grams", 1e-3, 0.0, MASS, true),
    ("s", 1.0, 0.0, TIME, true),
    ("sec", 1.0, 0.0, TIME, false),
    ("second", 1.0, 0.0, TIME, false),
    ("seconds", 1.0, 0.0, TIME, false),
    ("min", 60.0, 0.0, TIME, false),
    ("minute", 60.0, 0.0, TIME, false),
    ("minutes", 60.0, 0.0, TIME, false),
    ("h", 3600.0, 0.0, TIME, false),
    ("hr", 3600.0, 0.0, TIME, false),
    ("hour", 3600.0, 0.0, TIME, false),
    ("hours", 3600.0, 0.0, TIME, false),
    ("d", 86400.0, 0.0, TIME, false),
    ("day", 86400.0, 0.0, TIME, false),
    ("days", 86400.0, 0.0, TIME, false),
    ("K", 1.0, 0.0, TEMPERATURE, true),
    ("kelvin", 1.0, 0.0, TEMPERATURE, false),
    ("degC", 1.0, 273.15, TEMPERATURE, false),
    ("deg_C", 1.0, 273.15, TEMPERATURE, false),
    ("celsius", 1.0, 273.15, TEMPERATURE, false),
    ("degree_Celsius", 1.0, 273.15, TEMPERATURE, false),
    ("degrees_Celsius", 1.0, 273.15, TEMPERATURE, false),
    ("degF", 5.0 / 9.0, 459.67 * 5.0 / 9.0, TEMPERATURE, false),
    ("fahrenheit", 5.0 / 9.0, 459.67 * 5.0 / 9.0, TEMPERATURE, false),
    ("A", 1.0, 0.0, CURRENT, true),
    ("ampere", 1.0, 0.0, CURRENT, false),
    ("mol", 1.0, 0.0, AMOUNT, true),
    ("mole", 1.0, 0.0, AMOUNT, false),
    ("rad", 1.0, 0.0, ANGLE, false),
    ("radian", 1.0, 0.0, ANGLE, false),
    ("radians", 1.0, 0.0, ANGLE, false),
    ("degree", DEGREE, 0.0, ANGLE, false),
    ("degrees", DEGREE, 0.0, ANGLE, false),
    ("arc_degree", DEGREE, 0.0, ANGLE, false),
    ("degree_north", DEGREE, 0.0, ANGLE, false),
    ("degrees_north", DEGREE, 0.0, ANGLE, false),
    ("degree_N", DEGREE, 0.0, ANGLE, false),
    ("degrees_N", DEGREE, 0.0, ANGLE, false),
    ("degreeN", DEGREE, 0.0, ANGLE, false),
    ("degreesN", DEGREE, 0.0, ANGLE, false),
    ("degree_east", DEGREE, 0.0, ANGLE, false),
    ("degrees_east", DEGREE, 0.0, ANGLE, false),
    ("degree_E", DEGREE, 0.0, ANGLE, false),
    ("degrees_E", DEGREE, 0.0, ANGLE, false),
    ("degreeE", DEGREE, 0.0, ANGLE, false),
    ("degreesE", DEGREE, 0.0, ANGLE, false),
    ("L", 1e-3, 0.0, VOLUME, true),
    ("litre", 1e-3, 0.0, VOLUME, false),
    ("liter", 1e-3, 0.0, VOLUME, false),
    ("N", 1.0, 0.0, FORCE, true),
    ("newton", 1.0, 0.0, FORCE, false),
    ("Pa", 1.0, 0.0, PRESSURE, true),
    ("pascal", 1.0, 0.0, PRESSURE, false),
    ("bar", 1e5, 0.0, PRESSURE, true),
    ("atm", 101_325.0, 0.0, PRESSURE, false),
    ("J", 1.0, 0.0, ENERGY, true),
    ("joule", 1.0, 0.0, ENERGY, false),
    ("W", 1.0, 0.0, POWER, true),
    ("watt", 1.0, 0.0, POWER, false),
];

/// Decimal prefixes, longest first so that `da` wins over `d`.
const PREFIXES: &[(&str, f64)] = &[
    ("da", 1e1),
    ("h", 1e2),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("d", 1e-1),
    ("c", 1e-2),
    ("m", 1e-3),
    ("u", 1e-6),
    ("n", 1e-9),
];

/// Calendar attached to a reference-time unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Calendar {
    Standard,
    ProlepticGregorian,
    Julian,
    NoLeap,
    AllLeap,
    Day360,
    Other(String),
}

const MONTH_DAYS: [i64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

impl Calendar {
    /// Parse a CF calendar name. A missing name means the standard calendar.
    pub fn parse(name: Option<&str>) -> Self {
        let name = name.map(|s| s.trim().to_lowercase());
        match name.as_deref() {
            None | Some("") | Some("standard") | Some("gregorian") => Self::Standard,
            Some("proleptic_gregorian") => Self::ProlepticGregorian,
            Some("julian") => Self::Julian,
            Some("noleap") | Some("365_day") => Self::NoLeap,
            Some("all_leap") | Some("366_day") => Self::AllLeap,
            Some("360_day") => Self::Day360,
            Some(other) => Self::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Standard => "standard",
            Self::ProlepticGregorian => "proleptic_gregorian",
            Self::Julian => "julian",
            Self::NoLeap => "noleap",
            Self::AllLeap => "all_leap",
            Self::Day360 => "360_day",
            Self::Other(name) => name,
        }
    }

    /// Days between 1970-01-01 and the given date, both in this calendar.
    fn days_since_epoch(&self, year: i64, month: u32, day: u32) -> Option<i64> {
        if !(1..=12).contains(&month) || day == 0 {
            return None;
        }
        let m = (month - 1) as usize;
        let d = i64::from(day);
        match self {
            Self::Standard | Self::ProlepticGregorian => {
                let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
                let date = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?;
                Some(date.signed_duration_since(epoch).num_days())
            }
            Self::Julian => {
                if d > 31 {
                    return None;
                }
                let a = (14 - i64::from(month)) / 12;
                let y = year + 4800 - a;
                let mm = i64::from(month) + 12 * a - 3;
                let jdn = d + (153 * mm + 2) / 5 + 365 * y + y / 4 - 32083;
                Some(jdn - 2_440_588)
            }
            Self::NoLeap | Self::AllLeap => {
                let leap = matches!(self, Self::AllLeap);
                let length = |i: usize| MONTH_DAYS[i] + i64::from(leap && i == 1);
                if d > length(m) {
                    return None;
                }
                let year_days = if leap { 366 } else { 365 };
                let before: i64 = (0..m).map(length).sum();
                Some((year - 1970) * year_days + before + d - 1)
            }
            Self::Day360 => {
                if d > 30 {
                    return None;
                }
                Some((year - 1970) * 360 + (m as i64) * 30 + d - 1)
            }
            Self::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Parsed {
    Scaled { scale: f64, offset: f64, dims: Dims },
    Reference { scale: f64, origin: f64, calendar: Calendar },
}

/// A units specification, optionally with a calendar.
///
/// The default value has no units at all, which is distinct from the
/// dimensionless unit `"1"`.
#[derive(Debug, Clone, Default)]
pub struct Units {
    units: Option<String>,
    calendar: Option<String>,
    parsed: Option<Parsed>,
}

impl Units {
    /// Units that are not set.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(units: &str) -> Self {
        Self::with_calendar(units, None)
    }

    /// Build units from a units string and an optional calendar. Unparseable
    /// strings are kept as opaque units.
    pub fn with_calendar(units: &str, calendar: Option<&str>) -> Self {
        let normalised = units.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalised.is_empty() {
            return Self::none();
        }
        let calendar = calendar
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let parsed = parse_expression(&normalised, calendar.as_deref());
        Self {
            units: Some(normalised),
            calendar,
            parsed,
        }
    }

    /// Like [`Units::with_calendar`] but fails on unrecognised units.
    pub fn parse(units: &str, calendar: Option<&str>) -> ModelResult<Self> {
        let parsed = Self::with_calendar(units, calendar);
        if parsed.is_defined() && parsed.parsed.is_none() {
            return Err(ModelError::UnknownUnits(units.to_string()));
        }
        Ok(parsed)
    }

    pub fn is_defined(&self) -> bool {
        self.units.is_some()
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn calendar(&self) -> Option<&str> {
        self.calendar.as_deref()
    }

    pub fn is_reference_time(&self) -> bool {
        matches!(self.parsed, Some(Parsed::Reference { .. }))
    }

    /// Whether the units string was understood. Undefined units count as
    /// recognised.
    pub fn is_recognised(&self) -> bool {
        !self.is_defined() || self.parsed.is_some()
    }

    /// Whether values in these units can be converted to `other`.
    pub fn equivalent(&self, other: &Units) -> bool {
        if !self.is_defined() || !other.is_defined() {
            return self.is_defined() == other.is_defined();
        }
        match (&self.parsed, &other.parsed) {
            (Some(Parsed::Scaled { dims: a, .. }), Some(Parsed::Scaled { dims: b, .. })) => a == b,
            (
                Some(Parsed::Reference { calendar: a, .. }),
                Some(Parsed::Reference { calendar: b, .. }),
            ) => a == b,
            (None, None) => self.formatted() == other.formatted(),
            _ => false,
        }
    }

    /// Linear conversion `(a, b)` such that `value_in_other = value * a + b`.
    pub fn conversion(&self, to: &Units) -> ModelResult<(f64, f64)> {
        if !self.equivalent(to) {
            return Err(ModelError::incompatible_units(
                self.formatted(),
                to.formatted(),
            ));
        }
        match (&self.parsed, &to.parsed) {
            (
                Some(Parsed::Scaled {
                    scale: s1,
                    offset: o1,
                    ..
                }),
                Some(Parsed::Scaled {
                    scale: s2,
                    offset: o2,
                    ..
                }),
            ) => Ok((s1 / s2, (o1 - o2) / s2)),
            (
                Some(Parsed::Reference {
                    scale: s1,
                    origin: r1,
                    ..
                }),
                Some(Parsed::Reference {
                    scale: s2,
                    origin: r2,
                    ..
                }),
            ) => Ok((s1 / s2, (r1 - r2) / s2)),
            _ => Ok((1.0, 0.0)),
        }
    }

    pub fn convert_value(&self, value: f64, to: &Units) -> ModelResult<f64> {
        let (a, b) = self.conversion(to)?;
        Ok(value * a + b)
    }

    /// Canonical textual form: the normalised units string, followed by
    /// the calendar for reference-time units. Empty when undefined.
    pub fn formatted(&self) -> String {
        match (&self.units, &self.parsed) {
            (None, _) => String::new(),
            (Some(units), Some(Parsed::Reference { calendar, .. })) => {
                format!("{} calendar={}", units, calendar.name())
            }
            (Some(units), _) => units.clone(),
        }
    }
}

impl PartialEq for Units {
    fn eq(&self, other: &Self) -> bool {
        self.formatted() == other.formatted()
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

impl From<&str> for Units {
    fn from(units: &str) -> Self {
        Units::new(units)
    }
}

fn parse_expression(units: &str, calendar: Option<&str>) -> Option<Parsed> {
    if let Some(idx) = units.find(" since ") {
        let (scale, offset, dims) = parse_product(&units[..idx])?;
        if dims != TIME || offset != 0.0 {
            return None;
        }
        let calendar = Calendar::parse(calendar);
        let origin = parse_reference_date(&units[idx + " since ".len()..], &calendar)?;
        return Some(Parsed::Reference {
            scale,
            origin,
            calendar,
        });
    }
    let (scale, offset, dims) = parse_product(units)?;
    Some(Parsed::Scaled {
        scale,
        offset,
        dims,
    })
}

/// Parse a product/quotient of terms into (scale, offset, dims).
fn parse_product(expr: &str) -> Option<(f64, f64, Dims)> {
    let expr = expr.replace("**", "^");
    let mut scale = 1.0;
    let mut dims = NONE;
    let mut terms = Vec::new();

    for (i, part) in expr.split('/').enumerate() {
        let sign: i32 = if i == 0 { 1 } else { -1 };
        for chunk in part.split(|c: char| c.is_whitespace() || c == '*') {
            if chunk.is_empty() {
                continue;
            }
            if let Ok(number) = chunk.parse::<f64>() {
                scale *= number.powi(sign);
                terms.push((0.0, 0));
                continue;
            }
            for token in chunk.split('.').filter(|t| !t.is_empty()) {
                let (symbol, power) = split_exponent(token)?;
                let power = power * sign;
                let (s, offset, d) = lookup(symbol)?;
                scale *= s.powi(power);
                for (acc, base) in dims.iter_mut().zip(d.iter()) {
                    *acc += base * i8::try_from(power).ok()?;
                }
                terms.push((offset, power));
            }
        }
    }

    if terms.is_empty() {
        return None;
    }
    // An offset only applies to a lone unit such as `degC`.
    let offset = match terms.as_slice() {
        [(offset, 1)] => *offset,
        _ => 0.0,
    };
    Some((scale, offset, dims))
}

fn split_exponent(token: &str) -> Option<(&str, i32)> {
    if let Some((symbol, power)) = token.split_once('^') {
        return Some((symbol, power.parse().ok()?));
    }
    match token.find(|c: char| c.is_ascii_digit() || c == '-' || c == '+') {
        None => Some((token, 1)),
        Some(0) => None,
        Some(pos) => Some((&token[..pos], token[pos..].parse().ok()?)),
    }
}

fn lookup(symbol: &str) -> Option<(f64, f64, Dims)> {
    if let Some(&(_, scale, offset, dims, _)) = SYMBOLS.iter().find(|s| s.0 == symbol) {
        return Some((scale, offset, dims));
    }
    PREFIXES.iter().find_map(|&(prefix, factor)| {
        let rest = symbol.strip_prefix(prefix)?;
        SYMBOLS
            .iter()
            .find(|s| s.0 == rest && s.4)
            .map(|&(_, scale, offset, dims, _)| (scale * factor, offset, dims))
    })
}

/// Seconds between the calendar's 1970-01-01 and the reference date.
fn parse_reference_date(text: &str, calendar: &Calendar) -> Option<f64> {
    let text = text.trim();
    let text = text
        .strip_suffix("UTC")
        .or_else(|| text.strip_suffix('Z'))
        .unwrap_or(text)
        .trim();
    let (date, time) = match text.split_once(|c: char| c == ' ' || c == 'T') {
        Some((date, time)) => (date, Some(time.trim())),
        None => (text, None),
    };

    let mut parts = date.split('-');
    let year: i64 = parts.next()?.parse().ok()?;
    let month: u32 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 1,
    };
    let day: u32 = match parts.next() {
        Some(d) => d.parse().ok()?,
        None => 1,
    };

    let mut seconds = 0.0;
    if let Some(time) = time.filter(|t| !t.is_empty()) {
        // Time zone suffixes such as "+00:00" are ignored.
        let clock = time.split(['+', ' ']).next().unwrap_or(time);
        let mut hms = clock.split(':');
        let hours: f64 = hms.next()?.parse().ok()?;
        let minutes: f64 = hms.next().map_or(Some(0.0), |m| m.parse().ok())?;
        let secs: f64 = hms.next().map_or(Some(0.0), |s| s.parse().ok())?;
        seconds = hours * 3600.0 + minutes * 60.0 + secs;
    }

    let days = calendar.days_since_epoch(year, month, day)?;
    Some(days as f64 * 86400.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn test_prefixed_length_conversion() {
        let km = Units::new("km");
        let m = Units::new("m");
        assert!(km.equivalent(&m));
        assert!(close(km.convert_value(1.5, &m).unwrap(), 1500.0));
        assert!(close(m.convert_value(250.0, &km).unwrap(), 0.25));
    }

    #[test]
    fn test_temperature_offsets() {
        let c = Units::new("degC");
        let k = Units::new("K");
        assert!(close(c.convert_value(0.0, &k).unwrap(), 273.15));
        assert!(close(k.convert_value(300.0, &c).unwrap(), 26.85));
    }

    #[test]
    fn test_compound_units() {
        let flux = Units::new("kg m-2 s-1");
        let other = Units::new("g/m^2/s");
        assert!(flux.equivalent(&other));
        assert!(close(other.convert_value(1000.0, &flux).unwrap(), 1.0));
        assert!(Units::new("W m-2").equivalent(&Units::new("W/m2")));
        assert!(Units::new("hPa").equivalent(&Units::new("Pa")));
        assert!(close(Units::new("hPa").convert_value(1.0, &Units::new("Pa")).unwrap(), 100.0));
    }

    #[test]
    fn test_incompatible_units() {
        let err = Units::new("m").conversion(&Units::new("s")).unwrap_err();
        assert!(matches!(err, ModelError::IncompatibleUnits { .. }));
        assert!(!Units::new("m").equivalent(&Units::none()));
        assert!(Units::none().equivalent(&Units::none()));
    }

    #[test]
    fn test_reference_time_conversion() {
        let days = Units::new("days since 2000-01-01");
        let hours = Units::new("hours since 2000-01-02 00:00:00");
        assert!(days.is_reference_time());
        assert!(days.equivalent(&hours));
        assert!(close(days.convert_value(2.0, &hours).unwrap(), 24.0));
    }

    #[test]
    fn test_reference_time_calendars() {
        let standard = Units::new("days since 2000-01-01");
        let day360 = Units::with_calendar("days since 2000-01-01", Some("360_day"));
        assert!(!standard.equivalent(&day360));

        let a = Units::with_calendar("days since 2000-02-30", Some("360_day"));
        let b = Units::with_calendar("days since 2000-01-01", Some("360_day"));
        assert!(a.is_recognised());
        assert!(close(a.convert_value(0.0, &b).unwrap(), 59.0));

        let noleap = Units::with_calendar("days since 2001-01-01", Some("noleap"));
        let noleap0 = Units::with_calendar("days since 2000-01-01", Some("365_day"));
        assert!(close(noleap.convert_value(0.0, &noleap0).unwrap(), 365.0));
    }

    #[test]
    fn test_gregorian_is_standard() {
        let a = Units::with_calendar("days since 1970-01-01", Some("gregorian"));
        let b = Units::new("seconds since 1970-01-01T00:00:00Z");
        assert!(a.equivalent(&b));
        assert_eq!(a.formatted(), "days since 1970-01-01 calendar=standard");
    }

    #[test]
    fn test_opaque_units() {
        let odd = Units::new("furlongs per fortnight");
        assert!(odd.is_defined());
        assert!(!odd.is_recognised());
        assert!(odd.equivalent(&Units::new("furlongs  per fortnight")));
        assert!(!odd.equivalent(&Units::new("m")));
        assert!(Units::parse("furlongs", None).is_err());
    }
}
