use crate::error::{Error, Result};
use crate::model::Entry;
use log::{debug, info};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

/// Splits an `Exec` value into words; double quotes group, `\` escapes.
fn split_exec(exec: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;
    let mut chars = exec.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            '\\' if quoted => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

/// Argument vector for launching `entry`, with field codes expanded and an
/// optional terminal prefix for `Terminal=true` entries.
pub fn command_line(entry: &Entry, terminal: Option<&str>) -> Vec<String> {
    let mut args = Vec::new();

    if entry.descriptor().is_some_and(|d| d.terminal) {
        if let Some(term) = terminal {
            args.extend(term.split_whitespace().map(str::to_string));
        }
    }

    for word in split_exec(entry.exec()) {
        match word.as_str() {
            "%f" | "%F" | "%u" | "%U" => {}
            "%i" => {
                let icon = entry.original_icon_id();
                if !icon.is_empty() {
                    args.push("--icon".to_string());
                    args.push(icon.to_string());
                }
            }
            "%c" => args.push(entry.title()),
            "%k" => args.push(entry.path_string()),
            _ => args.push(expand_inline(&word, entry)),
        }
    }
    args
}

fn expand_inline(word: &str, entry: &Entry) -> String {
    let mut out = String::with_capacity(word.len());
    let mut chars = word.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('c') => out.push_str(&entry.title()),
            Some('k') => out.push_str(&entry.path_string()),
            Some(_) | None => {}
        }
    }
    out
}

/// Starts the entry in its own process group, detached from our stdio.
pub fn spawn(entry: &Entry, terminal: Option<&str>) -> Result<u32> {
    let args = command_line(entry, terminal);
    let Some((program, rest)) = args.split_first() else {
        debug!("Nothing to run for {:?}", entry.path());
        return Ok(0);
    };

    let child = Command::new(program)
        .args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .map_err(|e| Error::io(program, e))?;

    info!("Launched {} (pid {})", entry.title(), child.id());
    Ok(child.id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::DesktopFileParser;
    use std::fs;
    use std::path::Path;

    fn entry(dir: &Path, extra: &str) -> Entry {
        let path = dir.join("viewer.desktop");
        fs::write(
            &path,
            format!("[Desktop Entry]\nType=Application\nName=Viewer\nIcon=viewer\n{}", extra),
        )
        .unwrap();
        Entry::from_descriptor(&path, &DesktopFileParser::default())
    }

    #[test]
    fn field_codes_are_expanded_and_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let e = entry(dir.path(), "Exec=viewer %i --name %c --file=%k %U\n");
        let path = dir.path().join("viewer.desktop").to_string_lossy().into_owned();
        assert_eq!(
            command_line(&e, None),
            vec![
                "viewer".to_string(),
                "--icon".into(),
                "viewer".into(),
                "--name".into(),
                "Viewer".into(),
                format!("--file={}", path),
            ]
        );
    }

    #[test]
    fn quoted_arguments_stay_together() {
        let dir = tempfile::tempdir().unwrap();
        let e = entry(dir.path(), "Exec=sh -c \"echo \\\"hi there\\\"\" 100%%\n");
        assert_eq!(command_line(&e, None), vec!["sh", "-c", "echo \"hi there\"", "100%"]);
    }

    #[test]
    fn terminal_entries_get_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let e = entry(dir.path(), "Exec=htop\nTerminal=true\n");
        assert_eq!(command_line(&e, Some("foot -e")), vec!["foot", "-e", "htop"]);
        assert_eq!(command_line(&e, None), vec!["htop"]);

        let plain = entry(dir.path(), "Exec=htop\n");
        assert_eq!(command_line(&plain, Some("foot -e")), vec!["htop"]);
    }
}
