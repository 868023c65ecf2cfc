//! Prompt detection, output cleaning and device error patterns for
//! IOS-style command shells. Pure helpers, unit-tested in isolation from
//! any live session.

use regex::Regex;
use std::sync::OnceLock;

fn prompt_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"[\w\-\.]+[>#]\s*$",             // exec prompt
            r"[\w\-\.]+\(config[^)]*\)#\s*$", // config mode prompt
            r"\[confirm\]\s*$",               // confirmation prompt
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static regex"))
        .collect()
    })
}

fn error_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(?i)% Invalid input detected",
            r"(?i)% Ambiguous command",
            r"(?i)% Incomplete command",
            r"(?i)% Unknown command",
            r"(?i)% Access denied",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static regex"))
        .collect()
    })
}

fn ansi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("static regex"))
}

/// Whether the last line of accumulated output looks like a device prompt.
pub(crate) fn ends_with_prompt(output: &str) -> bool {
    let last_line = output.lines().last().unwrap_or("").trim_end();
    prompt_res().iter().any(|re| re.is_match(last_line))
}

/// Whether the output is paused at a `--More--` paging prompt.
pub(crate) fn at_paging_prompt(output: &str) -> bool {
    output.trim_end().ends_with("--More--")
}

/// First device-reported error in the output, if any.
pub(crate) fn find_device_error(output: &str) -> Option<&str> {
    output
        .lines()
        .find(|line| error_res().iter().any(|re| re.is_match(line)))
        .map(str::trim)
}

/// Strip ANSI escapes, carriage returns, the echoed command and the
/// trailing prompt from raw session output.
pub(crate) fn clean_output(raw: &str, command: &str) -> String {
    let stripped = ansi_re().replace_all(raw, "");
    let stripped = stripped.replace('\r', "");

    let mut lines: Vec<&str> = stripped.lines().collect();

    // Drop the command echo.
    if let Some(first) = lines.first() {
        if !command.is_empty() && first.trim() == command.trim() {
            lines.remove(0);
        }
    }

    // Drop the trailing prompt line.
    if let Some(last) = lines.last() {
        let last_trimmed = last.trim_end();
        if prompt_res().iter().any(|re| re.is_match(last_trimmed)) {
            lines.pop();
        }
    }

    lines.join("\n").trim().to_string()
}

/// Commands that run in exec mode rather than configuration mode.
pub(crate) fn is_exec_command(command: &str) -> bool {
    let lowered = command.trim().to_lowercase();
    ["show", "ping", "traceroute", "telnet", "ssh", "copy", "write", "dir", "terminal"]
        .iter()
        .any(|prefix| lowered == *prefix || lowered.starts_with(&format!("{prefix} ")))
}
