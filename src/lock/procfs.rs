// src/lock/procfs.rs

//! Lock holder inspection through /proc

use super::LockOwner;
use crate::error::Result;
use nix::unistd::{Uid, User};
use std::fs;
use std::path::{Path, PathBuf};

/// Looks up who a process is
pub trait ProcessInspector {
    fn inspect(&self, pid: u32) -> Result<LockOwner>;
}

/// Inspector reading `<root>/<pid>/status` and `<root>/<pid>/cmdline`
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
    resolve_user: fn(u32) -> Option<String>,
}

impl ProcFs {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            resolve_user: system_user_name,
        }
    }

    /// Replace the uid to user name lookup
    pub fn with_user_resolver(mut self, resolve_user: fn(u32) -> Option<String>) -> Self {
        self.resolve_user = resolve_user;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcessInspector for ProcFs {
    fn inspect(&self, pid: u32) -> Result<LockOwner> {
        let proc_dir = self.root.join(pid.to_string());

        let status = fs::read_to_string(proc_dir.join("status"))?;
        let mut name = String::new();
        let mut uid = None;
        for line in status.lines() {
            if let Some(value) = line.strip_prefix("Name:") {
                name = value.trim().to_string();
            } else if let Some(value) = line.strip_prefix("Uid:") {
                // Real uid comes first
                uid = value.split_whitespace().next().and_then(|v| v.parse::<u32>().ok());
            }
        }

        let raw = fs::read(proc_dir.join("cmdline"))?;
        let argv: Vec<String> = raw
            .split(|b| *b == 0)
            .filter(|arg| !arg.is_empty())
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect();

        let (executable, command_line) = reconstruct_command(&name, &argv);

        let user = match uid {
            Some(uid) => (self.resolve_user)(uid).unwrap_or_else(|| uid.to_string()),
            None => "unknown".to_string(),
        };

        Ok(LockOwner {
            pid,
            executable,
            command_line,
            user,
        })
    }
}

/// Rebuild a readable command from a process name and its argv
///
/// Interpreted programs show up as `/usr/bin/python /usr/bin/tool args`, so
/// the executable is the first absolute path whose file name matches the
/// process name. The command is that name followed by the arguments after it.
/// The kernel truncates process names, so a prefix match on the file name is
/// accepted.
///
/// Returns `(executable, command_line)`.
pub fn reconstruct_command(name: &str, argv: &[String]) -> (String, String) {
    let matches_name = |token: &str| {
        token.starts_with('/')
            && !name.is_empty()
            && Path::new(token)
                .file_name()
                .and_then(|f| f.to_str())
                .is_some_and(|f| f.starts_with(name))
    };

    let (executable, rest) = match argv.iter().position(|t| matches_name(t)) {
        Some(i) => (argv[i].clone(), &argv[i + 1..]),
        None => match argv.split_first() {
            Some((first, rest)) => (first.clone(), rest),
            None => (name.to_string(), &argv[..0]),
        },
    };

    let head = if name.is_empty() {
        Path::new(&executable)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or(&executable)
            .to_string()
    } else {
        name.to_string()
    };

    let command_line = std::iter::once(head.as_str())
        .chain(rest.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    (executable, command_line)
}

fn system_user_name(uid: u32) -> Option<String> {
    User::from_uid(Uid::from_raw(uid))
        .ok()
        .flatten()
        .map(|user| user.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn fake_process(root: &Path, pid: u32, name: &str, uid: u32, cmdline: &[&str]) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("status"),
            format!("Name:\t{}\nUmask:\t0022\nState:\tS (sleeping)\nUid:\t{uid}\t{uid}\t{uid}\t{uid}\n", name),
        )
        .unwrap();
        let mut raw = cmdline.join("\0");
        raw.push('\0');
        fs::write(dir.join("cmdline"), raw).unwrap();
    }

    fn alice(uid: u32) -> Option<String> {
        (uid == 1000).then(|| "alice".to_string())
    }

    #[test]
    fn test_inspect_reports_user_and_command() {
        let temp_dir = TempDir::new().unwrap();
        fake_process(temp_dir.path(), 4321, "rpm", 1000, &["/usr/bin/rpm", "--install"]);

        let procfs = ProcFs::new(temp_dir.path()).with_user_resolver(alice);
        let owner = procfs.inspect(4321).unwrap();

        assert_eq!(owner.pid, 4321);
        assert_eq!(owner.user, "alice");
        assert_eq!(owner.executable, "/usr/bin/rpm");
        assert_eq!(owner.command_line, "rpm --install");

        let msg = owner.to_string();
        assert!(msg.contains("user: alice"));
        assert!(msg.contains("pid: 4321"));
        assert!(msg.contains("cmd: 'rpm --install'"));
    }

    #[test]
    fn test_unresolvable_uid_falls_back_to_number() {
        let temp_dir = TempDir::new().unwrap();
        fake_process(temp_dir.path(), 77, "rpm", 4242, &["/usr/bin/rpm", "-qa"]);

        let procfs = ProcFs::new(temp_dir.path()).with_user_resolver(alice);
        assert_eq!(procfs.inspect(77).unwrap().user, "4242");
    }

    #[test]
    fn test_missing_process_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let procfs = ProcFs::new(temp_dir.path());
        assert!(procfs.inspect(1).is_err());
    }

    #[test]
    fn test_interpreted_command() {
        let argv = args(&["/usr/bin/python3", "/usr/bin/pkgtool", "install", "foo"]);
        let (exe, cmd) = reconstruct_command("pkgtool", &argv);
        assert_eq!(exe, "/usr/bin/pkgtool");
        assert_eq!(cmd, "pkgtool install foo");
    }

    #[test]
    fn test_truncated_process_name() {
        let argv = args(&["/usr/libexec/packagekitd-helper", "--refresh"]);
        let (exe, cmd) = reconstruct_command("packagekitd-hel", &argv);
        assert_eq!(exe, "/usr/libexec/packagekitd-helper");
        assert_eq!(cmd, "packagekitd-hel --refresh");
    }

    #[test]
    fn test_relative_argv_falls_back_to_first() {
        let argv = args(&["rpm", "-e", "foo"]);
        let (exe, cmd) = reconstruct_command("rpm", &argv);
        assert_eq!(exe, "rpm");
        assert_eq!(cmd, "rpm -e foo");
    }

    #[test]
    fn test_empty_argv() {
        let (exe, cmd) = reconstruct_command("kworker", &[]);
        assert_eq!(exe, "kworker");
        assert_eq!(cmd, "kworker");
    }
}
