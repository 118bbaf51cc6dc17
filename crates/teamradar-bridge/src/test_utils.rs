//! Test utilities for companion processes
//!
//! Tests stand in for the real companion with `sh -c <script>`. The script
//! sees any extra arguments (the credentials) as `$1`, `$2`, `$3`.

/// Shell used as a stand-in companion
pub const SHELL: &str = "sh";

/// Arguments that make [`SHELL`] run `script` as the companion.
///
/// `$0` is set to `teamradar` so positional parameters line up with the
/// arguments appended after these.
pub fn shell_args(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string(), "teamradar".to_string()]
}

/// A companion script that prints `lines` on stdout, then waits for `quit`.
pub fn scripted_companion(lines: &[&str]) -> String {
    let mut script = String::new();
    for line in lines {
        script.push_str("printf '%s\\n' '");
        script.push_str(&line.replace('\'', r"'\''"));
        script.push_str("'\n");
    }
    script.push_str("while read -r cmd; do\n");
    script.push_str("  case \"$cmd\" in quit|exit|logout) exit 0;; esac\n");
    script.push_str("done\n");
    script
}
