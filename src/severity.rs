//! The seven active message severities, plus the `None`/`All` sentinels used
//! only to build masks (never carried by an actual record).

/// Ordered from most to least severe, with the two sentinels bracketing the
/// range at either end. Declaration order doubles as the total order used by
/// level-mode gating and by [`Severity::ACTIVE`]'s bit indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    None,
    Fatal,
    Error,
    Warning,
    Signif,
    Info,
    Debug,
    Trace,
    All,
}

impl Severity {
    /// The seven severities a record can actually carry, in bit-index order.
    pub const ACTIVE: [Severity; 7] = [
        Severity::Fatal,
        Severity::Error,
        Severity::Warning,
        Severity::Signif,
        Severity::Info,
        Severity::Debug,
        Severity::Trace,
    ];

    /// Bit position within a [`crate::mask::MesgTypeMask`], or `None` for the
    /// two sentinels which never occupy a bit of their own.
    pub fn bit_index(self) -> Option<u8> {
        Self::ACTIVE.iter().position(|&s| s == self).map(|i| i as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            Severity::None => "None",
            Severity::Fatal => "Fatal",
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Signif => "Signif",
            Severity::Info => "Info",
            Severity::Debug => "Debug",
            Severity::Trace => "Trace",
            Severity::All => "All",
        }
    }

    pub fn from_name(name: &str) -> Option<Severity> {
        Self::ACTIVE
            .iter()
            .copied()
            .chain([Severity::None, Severity::All])
            .find(|s| s.name() == name)
    }

    /// The 3-letter code a rotating-file line carries instead of the full
    /// name. The sentinels never appear on a record, so they fall back to
    /// `"---"` rather than a code of their own.
    pub fn code3(self) -> &'static str {
        match self {
            Severity::Fatal => "Ftl",
            Severity::Error => "Err",
            Severity::Warning => "Wrn",
            Severity::Signif => "Sig",
            Severity::Info => "Inf",
            Severity::Debug => "Dbg",
            Severity::Trace => "Trc",
            Severity::None | Severity::All => "---",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_active_severity_has_a_distinct_three_letter_code() {
        let codes: Vec<&str> = Severity::ACTIVE.iter().map(|s| s.code3()).collect();
        for code in &codes {
            assert_eq!(code.len(), 3);
        }
        let mut sorted = codes.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len(), "codes must be distinct: {codes:?}");
    }
}
