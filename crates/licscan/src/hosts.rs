//! Host list input: command line, host file, or a single prompt.

use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::error::{Result, ScanError};

/// Host used when the prompt is answered with an empty line.
pub const DEFAULT_HOST: &str = "localhost";

/// Where the host list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSource {
    Args,
    File,
    Prompt,
}

/// Pick the host list: arguments if any, else the host file if it exists,
/// else ask once.
///
/// Arguments are passed through as given so blank entries are reported as
/// invalid by the scan. Blank lines in the host file are dropped; a host
/// file with no hosts is an error rather than an empty run.
pub fn collect_hosts<F>(args: &[String], host_file: &Path, prompt: F) -> Result<(Vec<String>, HostSource)>
where
    F: FnOnce() -> io::Result<String>,
{
    if !args.is_empty() {
        return Ok((args.iter().map(|h| h.trim().to_string()).collect(), HostSource::Args));
    }

    if host_file.exists() {
        let text = std::fs::read_to_string(host_file)?;
        let hosts = parse_host_file(&text);
        if hosts.is_empty() {
            return Err(ScanError::NoHosts);
        }
        return Ok((hosts, HostSource::File));
    }

    let answer = prompt()?;
    let answer = answer.trim();
    let host = if answer.is_empty() { DEFAULT_HOST } else { answer };
    Ok((vec![host.to_string()], HostSource::Prompt))
}

/// One host per line; surrounding whitespace and blank lines are ignored.
pub fn parse_host_file(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Interactive prompt on stdin.
pub fn prompt_stdin() -> io::Result<String> {
    print!("Enter hostname or IP: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}
