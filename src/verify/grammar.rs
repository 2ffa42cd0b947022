//! Parser for the verifier's diagnostic stream.
//!
//! gpg has no machine-readable status on stderr, so this matches the fixed
//! phrases it prints. Two layouts of the "Signature made" line exist:
//!
//! ```text
//! gpg: Signature made <date> using RSA key ID ABCD1234
//! ```
//!
//! and, from gpg 2.1 on,
//!
//! ```text
//! gpg: Signature made <date>
//! gpg:                using RSA key 0123...4567
//! ```

use lazy_static::lazy_static;
use regex::Regex;

use super::{Exit, Verification};

/// Exit code gpg uses when a signature was found and is BAD.
pub const BAD_SIGNATURE_EXIT: i32 = 1;

const KEY_NOT_FOUND: &str = "Can't check signature: public key not found";
const NO_PUBLIC_KEY: &str = "Can't check signature: No public key";

lazy_static! {
    static ref SIGNATURE_ONE_LINE: Regex =
        Regex::new(r"(?m)^gpg: Signature made (.+) using \w+ key ID (\w+)$").unwrap();
    static ref SIGNATURE_MADE: Regex = Regex::new(r"(?m)^gpg: Signature made (.+)$").unwrap();
    static ref SIGNATURE_KEY: Regex = Regex::new(r"(?m)^gpg:\s+using \w+ key (\w+)$").unwrap();
    static ref ERROR: Regex = Regex::new(r"(?m)^gpg: ((?:Can't check signature|BAD ).*)$").unwrap();
    static ref UNTRUSTED: Regex =
        Regex::new(r"(?m)^gpg: WARNING: This key is not certified with a trusted signature")
            .unwrap();
}

/// What the diagnostic stream said.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub signed_at: Option<String>,
    pub key_id: Option<String>,
    /// First "Can't check signature" or "BAD ..." line, without the prefix.
    pub error: Option<String>,
    pub untrusted: bool,
}

impl Report {
    /// The signing key isn't in the local keyring.
    pub fn missing_key(&self) -> bool {
        matches!(self.error.as_deref(), Some(KEY_NOT_FOUND | NO_PUBLIC_KEY))
    }
}

pub fn parse(stderr: &str) -> Report {
    let text = stderr.replace("\r\n", "\n");
    let mut report = Report::default();

    if let Some(caps) = SIGNATURE_ONE_LINE.captures(&text) {
        report.signed_at = Some(caps[1].to_string());
        report.key_id = Some(caps[2].to_string());
    } else {
        report.signed_at = SIGNATURE_MADE
            .captures(&text)
            .map(|caps| caps[1].trim().to_string());
        report.key_id = SIGNATURE_KEY
            .captures(&text)
            .map(|caps| caps[1].to_string());
    }

    report.error = ERROR.captures(&text).map(|caps| caps[1].to_string());
    report.untrusted = UNTRUSTED.is_match(&text);
    report
}

/// Turn a parsed report and the process exit into an outcome.
pub fn classify(report: &Report, exit: Exit) -> Verification {
    let key_id = report.key_id.clone();
    match exit {
        Exit::Success if report.untrusted => Verification::SucceededUntrustedKey { key_id },
        Exit::Success => Verification::Succeeded { key_id },
        Exit::Code(BAD_SIGNATURE_EXIT) => Verification::SignatureBad { key_id },
        Exit::Code(_) if report.missing_key() => Verification::KeyNotFound { key_id },
        Exit::Code(_) => Verification::UnknownError {
            key_id,
            error: report.error.clone(),
        },
        Exit::Signal(signal) => Verification::ExecutionFailed {
            reason: format!("verifier killed by signal {signal}"),
        },
        Exit::Unknown => Verification::ExecutionFailed {
            reason: "verifier exited abnormally".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = include_str!("../../tests/fixtures/gpg/good.txt");
    const UNTRUSTED_KEY: &str = include_str!("../../tests/fixtures/gpg/untrusted.txt");
    const BAD: &str = include_str!("../../tests/fixtures/gpg/bad.txt");
    const MISSING_KEY: &str = include_str!("../../tests/fixtures/gpg/missing_key.txt");
    const MODERN_GOOD: &str = include_str!("../../tests/fixtures/gpg/modern_good.txt");
    const MODERN_MISSING_KEY: &str =
        include_str!("../../tests/fixtures/gpg/modern_missing_key.txt");
    const NO_SIGNATURE: &str = include_str!("../../tests/fixtures/gpg/no_signature.txt");

    fn key(id: &str) -> Option<String> {
        Some(id.to_string())
    }

    #[test]
    fn one_line_signature_made() {
        let report = parse(GOOD);
        assert_eq!(report.key_id, key("ABCD1234"));
        assert_eq!(
            report.signed_at.as_deref(),
            Some("Sun 05 Apr 2015 12:00:00 PM BST")
        );
        assert_eq!(report.error, None);
        assert!(!report.untrusted);
    }

    #[test]
    fn two_line_signature_made() {
        let report = parse(MODERN_GOOD);
        assert_eq!(report.key_id, key("0123456789ABCDEF0123456789ABCDEF01234567"));
        assert_eq!(
            report.signed_at.as_deref(),
            Some("Tue 14 May 2024 10:00:00 AM UTC")
        );
    }

    #[test]
    fn good_signature_with_zero_exit_succeeds() {
        assert_eq!(
            classify(&parse(GOOD), Exit::Success),
            Verification::Succeeded {
                key_id: key("ABCD1234")
            }
        );
    }

    #[test]
    fn trust_warning_marks_key_untrusted() {
        let report = parse(UNTRUSTED_KEY);
        assert!(report.untrusted);
        assert_eq!(
            classify(&report, Exit::Success),
            Verification::SucceededUntrustedKey {
                key_id: key("ABCD1234")
            }
        );
    }

    #[test]
    fn bad_signature_exit_code_is_signature_bad() {
        let report = parse(BAD);
        assert_eq!(
            report.error.as_deref(),
            Some("BAD signature from \"Alice Example <alice@example.com>\"")
        );
        assert_eq!(
            classify(&report, Exit::Code(BAD_SIGNATURE_EXIT)),
            Verification::SignatureBad {
                key_id: key("ABCD1234")
            }
        );
    }

    #[test]
    fn missing_key_is_recognised_in_both_layouts() {
        let old = parse(MISSING_KEY);
        assert!(old.missing_key());
        assert_eq!(
            classify(&old, Exit::Code(2)),
            Verification::KeyNotFound {
                key_id: key("ABCD1234")
            }
        );

        let modern = parse(MODERN_MISSING_KEY);
        assert!(modern.missing_key());
        assert_eq!(
            modern.key_id,
            key("89ABCDEF0123456789ABCDEF0123456789ABCDEF")
        );
    }

    #[test]
    fn no_signature_is_unknown_error() {
        let report = parse(NO_SIGNATURE);
        assert_eq!(report, Report::default());
        assert_eq!(
            classify(&report, Exit::Code(2)),
            Verification::UnknownError {
                key_id: None,
                error: None
            }
        );
    }

    #[test]
    fn success_exit_wins_over_error_lines() {
        // Exit status decides success; the BAD line alone does not.
        assert!(classify(&parse(BAD), Exit::Success).is_success());
    }

    #[test]
    fn killed_verifier_is_execution_failure() {
        assert!(matches!(
            classify(&parse(GOOD), Exit::Signal(9)),
            Verification::ExecutionFailed { .. }
        ));
    }

    #[test]
    fn crlf_output_parses() {
        let report = parse(&GOOD.replace('\n', "\r\n"));
        assert_eq!(report.key_id, key("ABCD1234"));
    }
}
