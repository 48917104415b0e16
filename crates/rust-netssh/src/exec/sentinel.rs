//! Per-command end markers for batched execution.

use crate::profile::SentinelStyle;

/// Every marker starts with this tag. Output lines containing it are never
/// part of a command's result.
pub(crate) const MARKER_TAG: &str = "__NETSSH_";

/// The end marker for one command of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Sentinel {
    marker: String,
    style: SentinelStyle,
}

impl Sentinel {
    /// A fresh marker for command `index`, carrying a random nonce.
    pub(crate) fn new(index: usize, style: SentinelStyle) -> Self {
        let nonce: u64 = rand::random();
        Self {
            marker: format!("{MARKER_TAG}DONE_{index}_{nonce:016x}__"),
            style,
        }
    }

    /// The marker text.
    pub(crate) fn marker(&self) -> &str {
        &self.marker
    }

    /// The line to send after the command.
    pub(crate) fn command(&self) -> String {
        match self.style {
            SentinelStyle::Echo => {
                let tail = &self.marker[MARKER_TAG.len()..];
                format!("echo {MARKER_TAG}\"\"{tail}")
            }
            SentinelStyle::Comment => format!("! {}", self.marker),
        }
    }

    /// Whether `line` is the marker emitted for this command.
    pub(crate) fn is_boundary(&self, line: &str) -> bool {
        let line = line.trim();
        match self.style {
            SentinelStyle::Echo => line == self.marker,
            SentinelStyle::Comment => {
                line == self.marker
                    || line
                        .strip_suffix(self.marker.as_str())
                        .is_some_and(|prefix| prefix.ends_with(' '))
            }
        }
    }
}

/// Whether `line` carries any marker or marker command, stale ones included.
pub(crate) fn appears_in(line: &str) -> bool {
    line.contains(MARKER_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonces_differ() {
        let a = Sentinel::new(0, SentinelStyle::Echo);
        let b = Sentinel::new(0, SentinelStyle::Echo);
        assert_ne!(a.marker(), b.marker());
        assert!(a.marker().starts_with("__NETSSH_DONE_0_"));
    }

    #[test]
    fn echo_command_never_matches_itself() {
        let s = Sentinel::new(4, SentinelStyle::Echo);
        let cmd = s.command();
        assert!(cmd.starts_with("echo __NETSSH_\"\"DONE_4_"));
        assert!(!s.is_boundary(&cmd));
        assert!(!s.is_boundary(&format!("user@host:~$ {cmd}")));
        assert!(s.is_boundary(&format!("{}\r\n", s.marker())));
        assert!(appears_in(&cmd));
    }

    #[test]
    fn echo_requires_exact_line() {
        let s = Sentinel::new(1, SentinelStyle::Echo);
        assert!(!s.is_boundary(&format!("prefix {}", s.marker())));
        assert!(!s.is_boundary(&format!("{}x", s.marker())));
    }

    #[test]
    fn comment_matches_after_prompt() {
        let s = Sentinel::new(2, SentinelStyle::Comment);
        assert_eq!(s.command(), format!("! {}", s.marker()));
        assert!(s.is_boundary(&format!("RP/0/RSP0/CPU0:core1#! {}\r\n", s.marker())));
        assert!(s.is_boundary(s.marker()));
        assert!(!s.is_boundary(&format!("{}_extra", s.marker())));
        assert!(!s.is_boundary(&format!("x{}", s.marker())));
    }

    #[test]
    fn other_indexes_do_not_match() {
        let zero = Sentinel::new(0, SentinelStyle::Comment);
        let one = Sentinel::new(1, SentinelStyle::Comment);
        assert!(!one.is_boundary(zero.marker()));
        assert!(appears_in(zero.marker()));
        assert!(!appears_in("interface GigabitEthernet0/0/0/1"));
    }
}
