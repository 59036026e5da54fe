//! License query command and output parsing.
//!
//! The query is `slmgr.vbs /dli` run under `cscript //nologo`, either
//! directly on this machine or through the remote-execution transport.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use licscan_core::types::UNKNOWN;

use crate::runner::CommandSpec;

const EDITION_LABEL: &str = "Name:";
const STATUS_LABEL: &str = "License Status:";

/// Where the query command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Local,
    Remote,
}

/// Names that refer to the machine running the scan, compared lowercase.
#[derive(Debug, Clone)]
pub struct LocalAliases(HashSet<String>);

impl LocalAliases {
    /// `localhost`, `127.0.0.1`, `COMPUTERNAME` from the environment, plus extras.
    pub fn from_env(extra: &[String]) -> Self {
        let computer = std::env::var("COMPUTERNAME").ok();
        Self::new(computer.iter().chain(extra.iter()).map(String::as_str))
    }

    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut set: HashSet<String> = ["localhost", "127.0.0.1"]
            .into_iter()
            .map(String::from)
            .collect();
        set.extend(
            names
                .into_iter()
                .map(|n| n.trim().to_lowercase())
                .filter(|n| !n.is_empty()),
        );
        Self(set)
    }

    pub fn dispatch_for(&self, host: &str) -> Dispatch {
        if self.0.contains(&host.to_lowercase()) {
            Dispatch::Local
        } else {
            Dispatch::Remote
        }
    }
}

/// Builds the license query invocation for a host.
#[derive(Debug, Clone)]
pub struct QueryCommand {
    psexec_path: PathBuf,
    slmgr_path: String,
    work_dir: Option<PathBuf>,
}

impl QueryCommand {
    pub fn new(psexec_path: &Path, slmgr_path: &str, work_dir: Option<PathBuf>) -> Self {
        Self {
            psexec_path: psexec_path.to_path_buf(),
            slmgr_path: slmgr_path.to_string(),
            work_dir,
        }
    }

    pub fn build(&self, host: &str, dispatch: Dispatch) -> CommandSpec {
        let query = ["//nologo", self.slmgr_path.as_str(), "/dli"];
        let spec = match dispatch {
            Dispatch::Local => CommandSpec::new("cscript").args(query),
            Dispatch::Remote => CommandSpec::new(self.psexec_path.to_string_lossy())
                .arg("-accepteula")
                .arg(format!(r"\\{host}"))
                .arg("cscript")
                .args(query),
        };
        spec.current_dir(self.work_dir.clone())
    }
}

/// Edition and license status extracted from `slmgr /dli` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseInfo {
    pub edition: String,
    pub status: String,
}

/// Scan output line by line for the edition and status labels.
///
/// Missing lines leave the field as `Unknown`; the last matching line wins.
pub fn parse_license_output(output: &str) -> LicenseInfo {
    let mut info = LicenseInfo {
        edition: UNKNOWN.to_string(),
        status: UNKNOWN.to_string(),
    };

    for line in output.lines() {
        if line.contains(EDITION_LABEL) {
            info.edition = value_after_colon(line);
        } else if line.contains(STATUS_LABEL) {
            info.status = value_after_colon(line);
        }
    }

    info
}

fn value_after_colon(line: &str) -> String {
    line.split_once(':')
        .map(|(_, value)| value.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DLI_OUTPUT: &str = "\
Name: Windows(R), ServerStandard edition
Description: Windows(R) Operating System, VOLUME_KMSCLIENT channel
Partial Product Key: 3V66T
License Status: Licensed
Volume activation expiration: 259200 minute(s) (180 day(s))
";

    #[test]
    fn test_parse_dli_output() {
        let info = parse_license_output(DLI_OUTPUT);
        assert_eq!(info.edition, "Windows(R), ServerStandard edition");
        assert_eq!(info.status, "Licensed");
    }

    #[test]
    fn test_parse_missing_lines_default_unknown() {
        let info = parse_license_output("Error: 0xC004F069 On a computer running Microsoft Windows");
        assert_eq!(info.edition, "Unknown");
        assert_eq!(info.status, "Unknown");

        let info = parse_license_output("");
        assert_eq!(info, LicenseInfo { edition: "Unknown".into(), status: "Unknown".into() });
    }

    #[test]
    fn test_parse_keeps_text_after_first_colon() {
        let info = parse_license_output("License Status: Notification: grace expired\r\n");
        assert_eq!(info.status, "Notification: grace expired");
    }

    #[test]
    fn test_local_alias_dispatch() {
        let aliases = LocalAliases::new(["BUILDBOX"]);
        assert_eq!(aliases.dispatch_for("localhost"), Dispatch::Local);
        assert_eq!(aliases.dispatch_for("LOCALHOST"), Dispatch::Local);
        assert_eq!(aliases.dispatch_for("127.0.0.1"), Dispatch::Local);
        assert_eq!(aliases.dispatch_for("buildbox"), Dispatch::Local);
        assert_eq!(aliases.dispatch_for("web01"), Dispatch::Remote);
    }

    #[test]
    fn test_build_local_and_remote_commands() {
        let cmd = QueryCommand::new(
            Path::new(r"C:\tools\PsExec.exe"),
            r"C:\Windows\System32\slmgr.vbs",
            Some(PathBuf::from(r"C:\tools")),
        );

        let local = cmd.build("localhost", Dispatch::Local);
        assert_eq!(local.program, "cscript");
        assert_eq!(local.args, vec!["//nologo", r"C:\Windows\System32\slmgr.vbs", "/dli"]);
        assert_eq!(local.cwd, Some(PathBuf::from(r"C:\tools")));

        let remote = cmd.build("web01", Dispatch::Remote);
        assert_eq!(remote.program, r"C:\tools\PsExec.exe");
        assert_eq!(
            remote.args,
            vec![
                "-accepteula",
                r"\\web01",
                "cscript",
                "//nologo",
                r"C:\Windows\System32\slmgr.vbs",
                "/dli"
            ]
        );
    }
}
