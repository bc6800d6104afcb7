//! Pattern-based pre-check for dangerous constructs.
//!
//! The scanner is independent of the allowlist sanitizer and runs before it. It never rewrites
//! anything; it only reports which checks fired.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

/// One check in the fixed scan list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    JavascriptUrl,
    VbscriptUrl,
    DataHtmlUrl,
    InlineEventHandler,
    ScriptTag,
    CssExpression,
    CssImport,
}

impl Check {
    /// Every check, in the order they run.
    pub const ALL: [Check; 7] = [
        Check::JavascriptUrl,
        Check::VbscriptUrl,
        Check::DataHtmlUrl,
        Check::InlineEventHandler,
        Check::ScriptTag,
        Check::CssExpression,
        Check::CssImport,
    ];

    /// The subset re-run at activation time when scripts are not allowed.
    pub const CLIENT: [Check; 6] = [
        Check::JavascriptUrl,
        Check::VbscriptUrl,
        Check::DataHtmlUrl,
        Check::InlineEventHandler,
        Check::ScriptTag,
        Check::CssExpression,
    ];

    pub fn reason(self) -> &'static str {
        match self {
            Check::JavascriptUrl => "javascript: URL detected",
            Check::VbscriptUrl => "vbscript: URL detected",
            Check::DataHtmlUrl => "data:text/html URL detected",
            Check::InlineEventHandler => "inline event handler attribute detected",
            Check::ScriptTag => "<script> tag detected",
            Check::CssExpression => "CSS expression() detected",
            Check::CssImport => "CSS @import detected",
        }
    }

    fn regex(self) -> &'static Regex {
        static RES: OnceLock<Vec<Regex>> = OnceLock::new();
        let all = RES.get_or_init(|| {
            Check::ALL
                .iter()
                .map(|c| Regex::new(c.pattern()).expect("valid regex"))
                .collect()
        });
        &all[self as usize]
    }

    fn pattern(self) -> &'static str {
        match self {
            Check::JavascriptUrl => r"(?i)javascript\s*:",
            Check::VbscriptUrl => r"(?i)vbscript\s*:",
            Check::DataHtmlUrl => r"(?i)data\s*:\s*text/html",
            // Attribute position only, so `?controls=0` in a URL does not count.
            Check::InlineEventHandler => r#"(?i)[\s"'/]on\w+\s*="#,
            Check::ScriptTag => r"(?i)<script",
            Check::CssExpression => r"(?i)expression\s*\(",
            Check::CssImport => r"(?i)@import",
        }
    }

    pub fn matches(self, html: &str) -> bool {
        self.regex().is_match(html)
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Result of a scan: every check that fired, in check order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub warnings: Vec<Check>,
}

/// Publication decision derived from a [`ScanReport`] and the caller's privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Nothing fired.
    Clean,
    /// Something fired, but the caller holds the script-authoring privilege.
    Warned,
    /// Something fired and the caller is not privileged; publication is blocked.
    Unsafe,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn reasons(&self) -> Vec<&'static str> {
        self.warnings.iter().map(|c| c.reason()).collect()
    }

    /// Escalates to [`Verdict::Unsafe`] only for non-privileged callers.
    pub fn verdict(&self, privileged: bool) -> Verdict {
        match (self.is_clean(), privileged) {
            (true, _) => Verdict::Clean,
            (false, true) => Verdict::Warned,
            (false, false) => Verdict::Unsafe,
        }
    }

    pub fn is_safe_for(&self, privileged: bool) -> bool {
        self.verdict(privileged) != Verdict::Unsafe
    }

    /// Only the warnings that the activation-time scan would also raise.
    pub fn client_subset(&self) -> ScanReport {
        let warnings = self
            .warnings
            .iter()
            .copied()
            .filter(|c| Check::CLIENT.contains(c))
            .collect();
        ScanReport { warnings }
    }
}

fn run(html: &str, checks: &[Check]) -> ScanReport {
    let warnings = checks.iter().copied().filter(|c| c.matches(html)).collect();
    ScanReport { warnings }
}

/// Runs every check. All checks run regardless of earlier matches.
pub fn scan(html: &str) -> ScanReport {
    run(html, &Check::ALL)
}

/// Runs the activation-time subset ([`Check::CLIENT`]).
pub fn scan_client(html: &str) -> ScanReport {
    run(html, &Check::CLIENT)
}
