//! External-editor round trip (spec.md §5): resolve `VISUAL`/`EDITOR`,
//! expand the buffer's active paste placeholders inline, block on the
//! editor process against a temp file, then re-collapse whichever pasted
//! blocks came back unchanged.
//!
//! Grounded on the teacher's own `external_editor.rs`: `resolve_editor_command`
//! (prefer `VISUAL` over `EDITOR`, `shlex::split` on unix / `which`-backed
//! resolution on windows) and `run_editor` (`tempfile::Builder`, blocking
//! process launch). This crate carries no async runtime (spec.md §5 scopes
//! the round trip as synchronous), so `run_editor` here uses
//! `std::process::Command` where the teacher uses `tokio::process::Command`.

use std::env;
use std::fs;
use std::process::Stdio;

use crate::error::EditorError;
use crate::state::BufferState;
use crate::state::CursorPosition;

/// Resolve the editor command line from `VISUAL`/`EDITOR`, preferring
/// `VISUAL`.
pub fn resolve_editor_command() -> Result<Vec<String>, EditorError> {
    let raw = env::var("VISUAL").or_else(|_| env::var("EDITOR")).map_err(|_| EditorError::MissingEditor)?;
    tracing::debug!(command = %raw, "resolved external editor command");
    let parts = {
        #[cfg(windows)]
        {
            winsplit::split(&raw)
        }
        #[cfg(not(windows))]
        {
            shlex::split(&raw).ok_or(EditorError::ParseFailed)?
        }
    };
    if parts.is_empty() {
        return Err(EditorError::EmptyCommand);
    }
    Ok(parts)
}

#[cfg(windows)]
fn resolve_windows_program(program: &str) -> std::path::PathBuf {
    which::which(program).unwrap_or_else(|_| std::path::PathBuf::from(program))
}

/// Write `seed` to a temp file, block on `editor_cmd` against it, and
/// return the file's contents afterwards.
pub fn run_editor(seed: &str, editor_cmd: &[String]) -> Result<String, EditorError> {
    if editor_cmd.is_empty() {
        return Err(EditorError::EmptyCommand);
    }

    let temp_path = tempfile::Builder::new().suffix(".md").tempfile().map_err(EditorError::TempFile)?.into_temp_path();
    fs::write(&temp_path, seed).map_err(EditorError::TempFile)?;

    let mut cmd = {
        #[cfg(windows)]
        {
            std::process::Command::new(resolve_windows_program(&editor_cmd[0]))
        }
        #[cfg(not(windows))]
        {
            std::process::Command::new(&editor_cmd[0])
        }
    };
    if editor_cmd.len() > 1 {
        cmd.args(&editor_cmd[1..]);
    }
    let status = cmd
        .arg(&temp_path)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(EditorError::Spawn)?;

    if !status.success() {
        return Err(EditorError::NonZeroExit(status));
    }

    fs::read_to_string(&temp_path).map_err(EditorError::ReadBack)
}

/// Run the whole round trip against `state`: expand placeholders inline,
/// launch the editor, and apply the result as a single undo step. Pasted
/// blocks that come back byte-for-byte unchanged are re-collapsed to their
/// original placeholder so a large paste doesn't permanently balloon the
/// buffer just for being round-tripped through an editor.
pub fn edit_in_external_editor(state: &mut BufferState) -> Result<(), EditorError> {
    let editor_cmd = resolve_editor_command()?;

    let mut seed = state.text();
    let mut placeholders: Vec<(String, String)> = Vec::new();
    for id in state.paste_registry.ids().map(str::to_string).collect::<Vec<_>>() {
        let Some(content) = state.paste_registry.get(&id).map(str::to_string) else { continue };
        if let Some(pos) = seed.find(id.as_str()) {
            seed.replace_range(pos..pos + id.len(), &content);
            placeholders.push((id, content));
        }
    }

    let edited = run_editor(&seed, &editor_cmd)?;

    // Longest content first, so a shorter paste's text can't match inside a
    // longer one that is still present verbatim.
    placeholders.sort_by_key(|(_, content)| std::cmp::Reverse(content.len()));

    let mut result = edited;
    for (id, content) in &placeholders {
        if let Some(pos) = result.find(content.as_str()) {
            tracing::debug!(id = %id, len = content.len(), "re-collapsing unchanged paste");
            result.replace_range(pos..pos + content.len(), id);
        }
    }

    state.set_text(&result, CursorPosition::End, true);
    state.prune_unused_pastes();
    Ok(())
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    struct EnvGuard {
        visual: Option<String>,
        editor: Option<String>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { visual: env::var("VISUAL").ok(), editor: env::var("EDITOR").ok() }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            restore_env("VISUAL", self.visual.take());
            restore_env("EDITOR", self.editor.take());
        }
    }

    fn restore_env(key: &str, value: Option<String>) {
        match value {
            Some(val) => unsafe { env::set_var(key, val) },
            None => unsafe { env::remove_var(key) },
        }
    }

    #[test]
    #[serial]
    fn resolve_editor_prefers_visual() {
        let _guard = EnvGuard::new();
        unsafe {
            env::set_var("VISUAL", "vis");
            env::set_var("EDITOR", "ed");
        }
        let cmd = resolve_editor_command().unwrap();
        assert_eq!(cmd, vec!["vis".to_string()]);
    }

    #[test]
    #[serial]
    fn resolve_editor_errors_when_unset() {
        let _guard = EnvGuard::new();
        unsafe {
            env::remove_var("VISUAL");
            env::remove_var("EDITOR");
        }
        assert!(matches!(resolve_editor_command(), Err(EditorError::MissingEditor)));
    }

    #[test]
    #[cfg(unix)]
    fn run_editor_returns_updated_content() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("edit.sh");
        fs::write(&script_path, "#!/bin/sh\nprintf \"edited\" > \"$1\"\n").unwrap();
        let mut perms = fs::metadata(&script_path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms).unwrap();

        let cmd = vec![script_path.to_string_lossy().to_string()];
        let result = run_editor("seed", &cmd).unwrap();
        assert_eq!(result, "edited".to_string());
    }

    #[test]
    #[serial]
    #[cfg(unix)]
    fn edit_in_external_editor_recollapses_unchanged_paste() {
        use crate::state::InsertOptions;

        let _guard = EnvGuard::new();
        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("noop.sh");
        // Echo the file back unchanged.
        fs::write(&script_path, "#!/bin/sh\ntrue\n").unwrap();
        let mut perms = fs::metadata(&script_path).unwrap().permissions();
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms).unwrap();
        unsafe {
            env::set_var("VISUAL", script_path.to_string_lossy().to_string());
        }

        let mut state = BufferState::new();
        state.set_viewport_width(80);
        state.insert("a\nb\nc\nd\ne\nf", true, &InsertOptions::default());
        let id = state.lines[0].clone();

        edit_in_external_editor(&mut state).unwrap();
        assert_eq!(state.lines, vec![id]);
    }
}
