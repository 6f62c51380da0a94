//! [`LogGate`]: the admit/reject test every emit call runs, and
//! [`LoggerConfig`]: the small immutable value published per logger name.

use crate::mask::{MaskMode, MesgTypeMask};
use crate::severity::Severity;
use std::fmt;

/// A gate is just a mask used in level mode: `None` never allows, `All`
/// always allows, and `LogGate::new(s)` allows `s` and everything more
/// severe than it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogGate(MesgTypeMask);

impl LogGate {
    pub const NONE: LogGate = LogGate(MesgTypeMask::NONE);
    pub const ALL: LogGate = LogGate(MesgTypeMask::ALL);

    pub fn new(severity: Severity) -> LogGate {
        LogGate(MesgTypeMask::from_severity(severity, MaskMode::Level))
    }

    pub fn from_mask(mask: MesgTypeMask) -> LogGate {
        LogGate(mask)
    }

    pub fn mask(self) -> MesgTypeMask {
        self.0
    }

    #[inline]
    pub fn allows(self, severity: Severity) -> bool {
        match severity {
            Severity::All => self.0 == MesgTypeMask::ALL,
            Severity::None => false,
            s => self.0.allows(s),
        }
    }

    /// At least as permissive as either operand: the union of what each
    /// side admits.
    pub fn or(self, other: LogGate) -> LogGate {
        LogGate(self.0.union(other.0))
    }

    /// Restricted to both operands: only what every side admits.
    pub fn and(self, other: LogGate) -> LogGate {
        LogGate(self.0.intersection(other.0))
    }
}

impl fmt::Display for LogGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The immutable value a [`crate::hub::Hub`] publishes per logger name.
/// Changing `group_name` is how a logger gets rebound to a different
/// distribution group without the logger itself being reconstructed.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggerConfig {
    pub group_name: String,
    pub gate: LogGate,
    pub record_call_site: bool,
    pub supports_refcounted_release: bool,
}

impl LoggerConfig {
    /// Admits nothing, captures no call site, not pool-safe. The canned
    /// starting point for a logger name nobody has configured yet.
    #[allow(non_upper_case_globals)]
    pub const None: LoggerConfig = LoggerConfig {
        group_name: String::new(),
        gate: LogGate::NONE,
        record_call_site: false,
        supports_refcounted_release: false,
    };

    /// Admits everything, without the overhead of call-site capture.
    #[allow(non_upper_case_globals)]
    pub const AllNoCallSite: LoggerConfig = LoggerConfig {
        group_name: String::new(),
        gate: LogGate::ALL,
        record_call_site: false,
        supports_refcounted_release: false,
    };

    /// Admits everything and captures the client call site on every record.
    #[allow(non_upper_case_globals)]
    pub const AllWithCallSite: LoggerConfig = LoggerConfig {
        group_name: String::new(),
        gate: LogGate::ALL,
        record_call_site: true,
        supports_refcounted_release: false,
    };

    pub fn new(group_name: impl Into<String>, gate: LogGate) -> LoggerConfig {
        LoggerConfig {
            group_name: group_name.into(),
            gate,
            record_call_site: true,
            supports_refcounted_release: false,
        }
    }

    /// At least as permissive as either operand: the gate widens to admit
    /// anything either side admits, and either side wanting call-site
    /// capture or declaring pool safety carries into the result. Keeps this
    /// config's `group_name`.
    pub fn or(&self, other: &LoggerConfig) -> LoggerConfig {
        LoggerConfig {
            group_name: self.group_name.clone(),
            gate: self.gate.or(other.gate),
            record_call_site: self.record_call_site || other.record_call_site,
            supports_refcounted_release: self.supports_refcounted_release || other.supports_refcounted_release,
        }
    }

    /// Restricted to both operands: the gate narrows to what both sides
    /// admit, and call-site capture / pool safety only survive if both
    /// sides already had them. Keeps this config's `group_name`.
    pub fn and(&self, other: &LoggerConfig) -> LoggerConfig {
        LoggerConfig {
            group_name: self.group_name.clone(),
            gate: self.gate.and(other.gate),
            record_call_site: self.record_call_site && other.record_call_site,
            supports_refcounted_release: self.supports_refcounted_release && other.supports_refcounted_release,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_admits_itself_and_more_severe() {
        let gate = LogGate::new(Severity::Info);
        assert!(gate.allows(Severity::Fatal));
        assert!(gate.allows(Severity::Error));
        assert!(gate.allows(Severity::Info));
        assert!(!gate.allows(Severity::Debug));
        assert!(!gate.allows(Severity::Trace));
    }

    #[test]
    fn none_never_admits_all_always_does() {
        assert!(!LogGate::NONE.allows(Severity::Fatal));
        assert!(LogGate::ALL.allows(Severity::Trace));
    }

    #[test]
    fn format_round_trips_through_mask() {
        let gate = LogGate::new(Severity::Error);
        let text = gate.to_string();
        assert!(text.starts_with("Error+") || text == "Error[$3]");
    }

    #[test]
    fn gate_or_is_the_union_and_and_is_the_intersection() {
        let warning = LogGate::new(Severity::Warning);
        let info = LogGate::new(Severity::Info);
        assert_eq!(warning.or(info), info);
        assert_eq!(warning.and(info), warning);
    }

    #[test]
    fn logger_config_or_widens_gate_and_unions_flags() {
        let a = LoggerConfig {
            record_call_site: true,
            supports_refcounted_release: false,
            ..LoggerConfig::new("a", LogGate::new(Severity::Warning))
        };
        let b = LoggerConfig {
            record_call_site: false,
            supports_refcounted_release: true,
            ..LoggerConfig::new("b", LogGate::new(Severity::Info))
        };
        let combined = a.or(&b);
        assert_eq!(combined.gate, LogGate::new(Severity::Info));
        assert!(combined.record_call_site);
        assert!(combined.supports_refcounted_release);
        assert_eq!(combined.group_name, "a");
    }

    #[test]
    fn logger_config_and_narrows_gate_and_intersects_flags() {
        let a = LoggerConfig {
            record_call_site: true,
            supports_refcounted_release: true,
            ..LoggerConfig::new("a", LogGate::new(Severity::Warning))
        };
        let b = LoggerConfig {
            record_call_site: false,
            supports_refcounted_release: true,
            ..LoggerConfig::new("b", LogGate::new(Severity::Info))
        };
        let combined = a.and(&b);
        assert_eq!(combined.gate, LogGate::new(Severity::Warning));
        assert!(!combined.record_call_site);
        assert!(combined.supports_refcounted_release);
    }

    #[test]
    fn canned_constants_match_spec_shape() {
        assert_eq!(LoggerConfig::None.gate, LogGate::NONE);
        assert!(!LoggerConfig::None.record_call_site);

        assert_eq!(LoggerConfig::AllNoCallSite.gate, LogGate::ALL);
        assert!(!LoggerConfig::AllNoCallSite.record_call_site);

        assert_eq!(LoggerConfig::AllWithCallSite.gate, LogGate::ALL);
        assert!(LoggerConfig::AllWithCallSite.record_call_site);
    }
}
