//! `MesgTypeMask`: the bitmask that backs a [`crate::gate::LogGate`], and its
//! textual round-trip form `"<Name>[$hh]"`.

use crate::severity::Severity;
use std::fmt;

/// How a single [`Severity`] expands into bits when building a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskMode {
    /// Exactly the bit for that severity.
    Bit,
    /// That severity's bit plus every more-severe bit below it (Fatal down
    /// through the given severity).
    Level,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MesgTypeMask(pub(crate) i32);

impl MesgTypeMask {
    pub const NONE: MesgTypeMask = MesgTypeMask(0);
    pub const ALL: MesgTypeMask = MesgTypeMask(-1);

    pub fn from_severity(severity: Severity, mode: MaskMode) -> MesgTypeMask {
        match severity {
            Severity::None => MesgTypeMask::NONE,
            Severity::All => MesgTypeMask::ALL,
            s => {
                let bit = s.bit_index().expect("active severity has a bit index");
                match mode {
                    MaskMode::Bit => MesgTypeMask(1 << bit),
                    MaskMode::Level => {
                        // bits 0..=bit, i.e. (1 << (bit+1)) - 1
                        MesgTypeMask((1i64 << (bit as i64 + 1)).wrapping_sub(1) as i32)
                    }
                }
            }
        }
    }

    /// Raw signed bit pattern, exposed for callers that persist masks.
    pub fn bits(self) -> i32 {
        self.0
    }

    pub fn from_bits(bits: i32) -> MesgTypeMask {
        MesgTypeMask(bits)
    }

    pub fn union(self, other: MesgTypeMask) -> MesgTypeMask {
        MesgTypeMask(self.0 | other.0)
    }

    pub fn intersection(self, other: MesgTypeMask) -> MesgTypeMask {
        MesgTypeMask(self.0 & other.0)
    }

    /// `true` iff the bit for `severity` is set. `severity` must be one of
    /// the seven active severities; the sentinels never appear on a record
    /// and always answer `false`.
    pub fn allows(self, severity: Severity) -> bool {
        match severity.bit_index() {
            Some(bit) => (self.0 & (1 << bit)) != 0,
            None => false,
        }
    }

    fn matching_active(self, mode: MaskMode) -> Option<Severity> {
        Severity::ACTIVE
            .into_iter()
            .find(|&s| Self::from_severity(s, mode) == self)
    }

    /// `"<Name>[$hh]"` — `None`, `All`, a bare severity name (exact bit),
    /// `<Severity>+` (cumulative level mask, never used for `Fatal` since
    /// its level mask equals its bit mask), or `Custom` for anything else.
    pub fn format(self) -> String {
        let hex = format!("{:x}", self.0 as u32);
        if self == Self::NONE {
            return format!("None[${hex}]");
        }
        if self == Self::ALL {
            return format!("All[${hex}]");
        }
        if let Some(s) = self.matching_active(MaskMode::Bit) {
            return format!("{}[${hex}]", s.name());
        }
        if let Some(s) = self.matching_active(MaskMode::Level) {
            if s.bit_index() != Some(0) {
                return format!("{}+[${hex}]", s.name());
            }
        }
        format!("Custom[${hex}]")
    }

    pub fn parse(text: &str) -> Result<MesgTypeMask, MaskParseError> {
        let open = text.find('[').ok_or(MaskParseError::Malformed)?;
        if !text.ends_with(']') {
            return Err(MaskParseError::Malformed);
        }
        let name = &text[..open];
        let inner = &text[open + 1..text.len() - 1];
        let hex = inner.strip_prefix('$').ok_or(MaskParseError::Malformed)?;
        if hex.is_empty() {
            return Err(MaskParseError::Malformed);
        }
        let hex_val = u32::from_str_radix(hex, 16).map_err(|_| MaskParseError::Malformed)? as i32;

        let mask = match name {
            "None" => MesgTypeMask::NONE,
            "All" => MesgTypeMask::ALL,
            "Custom" => MesgTypeMask(hex_val),
            other => {
                let (sev_name, is_level) = match other.strip_suffix('+') {
                    Some(stripped) => (stripped, true),
                    None => (other, false),
                };
                let sev = Severity::from_name(sev_name).ok_or(MaskParseError::UnknownName)?;
                if is_level {
                    if sev.bit_index() == Some(0) {
                        return Err(MaskParseError::UnknownName);
                    }
                    MesgTypeMask::from_severity(sev, MaskMode::Level)
                } else {
                    MesgTypeMask::from_severity(sev, MaskMode::Bit)
                }
            }
        };

        if name != "Custom" && mask.0 != hex_val {
            return Err(MaskParseError::Mismatch);
        }
        Ok(mask)
    }
}

impl fmt::Display for MesgTypeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskParseError {
    Malformed,
    UnknownName,
    /// The hex suffix didn't match what the name implies.
    Mismatch,
}

impl fmt::Display for MaskParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskParseError::Malformed => write!(f, "malformed mask text"),
            MaskParseError::UnknownName => write!(f, "unknown mask name"),
            MaskParseError::Mismatch => write!(f, "hex suffix does not match name"),
        }
    }
}

impl std::error::Error for MaskParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_canonical_value() {
        let mut values = vec![MesgTypeMask::NONE, MesgTypeMask::ALL];
        for s in Severity::ACTIVE {
            values.push(MesgTypeMask::from_severity(s, MaskMode::Bit));
            if s.bit_index() != Some(0) {
                values.push(MesgTypeMask::from_severity(s, MaskMode::Level));
            }
        }
        for v in values {
            let text = v.format();
            let parsed = MesgTypeMask::parse(&text).unwrap();
            assert_eq!(parsed, v, "round trip failed for {text}");
        }
    }

    #[test]
    fn fatal_plus_is_never_produced() {
        let fatal_level = MesgTypeMask::from_severity(Severity::Fatal, MaskMode::Level);
        assert_eq!(fatal_level.format(), "Fatal[$1]");
    }

    #[test]
    fn custom_mask_formats_with_hex_and_round_trips() {
        let custom = MesgTypeMask::from_bits(0x2a);
        assert_eq!(custom.format(), "Custom[$2a]");
        assert_eq!(MesgTypeMask::parse("Custom[$2a]").unwrap(), custom);
    }

    #[test]
    fn mismatched_hex_is_rejected() {
        assert_eq!(
            MesgTypeMask::parse("Info[$ff]"),
            Err(MaskParseError::Mismatch)
        );
    }

    #[test]
    fn malformed_text_is_rejected() {
        assert!(MesgTypeMask::parse("Info").is_err());
        assert!(MesgTypeMask::parse("Info[zz]").is_err());
        assert!(MesgTypeMask::parse("Info[$zz]").is_err());
    }
}
