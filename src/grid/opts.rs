// src/grid/opts.rs

//! Helpers for rendering scheduler command lines.

/// Value of a single command-line option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptValue {
    /// `--key` / `-k` with no value.
    Flag,
    /// `--key=value` / `-k value`.
    Value(String),
}

impl From<&str> for OptValue {
    fn from(s: &str) -> Self {
        OptValue::Value(s.to_string())
    }
}

impl From<String> for OptValue {
    fn from(s: String) -> Self {
        OptValue::Value(s)
    }
}

impl From<u64> for OptValue {
    fn from(n: u64) -> Self {
        OptValue::Value(n.to_string())
    }
}

/// Render options in order: multi-letter keys as `--key=value`, single-letter
/// keys as `-k value`. Values are inserted verbatim; quote them first with
/// [`shell_quote`] if they may contain shell metacharacters.
pub fn cmd_opts(opts: &[(&str, OptValue)]) -> String {
    opts.iter()
        .map(|(key, value)| {
            let long = key.len() > 1;
            match (value, long) {
                (OptValue::Flag, true) => format!("--{key}"),
                (OptValue::Flag, false) => format!("-{key}"),
                (OptValue::Value(v), true) => format!("--{key}={v}"),
                (OptValue::Value(v), false) => format!("-{key} {v}"),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Single-quote `s` for `/bin/sh`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Append `extra` (user-supplied raw arguments) to `cmd` if non-blank.
pub fn push_extra(cmd: &mut String, extra: &str) {
    let extra = extra.trim();
    if !extra.is_empty() {
        cmd.push(' ');
        cmd.push_str(extra);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_and_short_options_render_differently() {
        let s = cmd_opts(&[
            ("mem", 100u64.into()),
            ("n", 4u64.into()),
            ("export", "ALL".into()),
            ("v", OptValue::Flag),
        ]);
        assert_eq!(s, "--mem=100 -n 4 --export=ALL -v");
    }

    #[test]
    fn quoting_escapes_single_quotes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn blank_extra_args_are_ignored() {
        let mut cmd = "srun".to_string();
        push_extra(&mut cmd, "   ");
        assert_eq!(cmd, "srun");
        push_extra(&mut cmd, " --qos=long ");
        assert_eq!(cmd, "srun --qos=long");
    }
}
