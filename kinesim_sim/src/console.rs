//! Line-oriented operator console.

use kinesim_core::RuntimeContext;
use std::io::{self, BufRead, Write};

/// Prompt written before each line when the console is interactive.
pub const PROMPT: &str = "kinesim> ";

/// Reads command lines until `exit` or end of input.
///
/// Each response is written as `ok: <text>` or `error: <text>`. Blocking:
/// run it on its own thread.
pub fn run_console<R: BufRead, W: Write>(rt: &RuntimeContext, input: R, mut output: W, prompt: bool) -> io::Result<()> {
    if prompt {
        write!(output, "{}", PROMPT)?;
        output.flush()?;
    }
    for line in input.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            let response = rt.execute(&line);
            let status = if response.success { "ok" } else { "error" };
            writeln!(output, "{}: {}", status, response.text)?;
            if rt.exit_requested() {
                break;
            }
        }
        if prompt {
            write!(output, "{}", PROMPT)?;
            output.flush()?;
        }
    }
    Ok(())
}
