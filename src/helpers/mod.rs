pub mod fzf_invoker;

use std::path::{Path, PathBuf};

use self::fzf_invoker::FzfInvoker;

#[derive(thiserror::Error, Debug)]
pub enum PickerError {
    #[error("terminal menu failed: {0}")]
    Terminal(String),
    #[error("no selection made")]
    Cancelled,
    #[error("nothing to choose from for '{0}'")]
    Empty(String),
}

/// Wrapper around the `termenu` picker that keeps the UX consistent across the
/// project. The entry at `default` is listed first so a plain Enter picks it.
pub fn choose_one<S: ToString>(title: &str, items: Vec<S>, default: usize) -> Result<String, PickerError> {
    let display_items = default_first(items.into_iter().map(|s| s.to_string()).collect(), default);
    if display_items.is_empty() {
        return Err(PickerError::Empty(title.to_string()));
    }
    let picker = FzfInvoker::new(title.to_string(), display_items);
    picker.invoke()?.ok_or(PickerError::Cancelled)
}

/// Move the item at `default` to the front, keeping the others in order.
pub fn default_first(mut items: Vec<String>, default: usize) -> Vec<String> {
    if default < items.len() {
        let item = items.remove(default);
        items.insert(0, item);
    }
    items
}

/// Catalog platform name matching `host_os` (as in `std::env::consts::OS`).
pub fn default_platform(choices: &[String], host_os: &str) -> usize {
    let wanted = match host_os {
        "linux" => "Linux",
        "windows" => "Windows",
        "macos" => "Mac",
        _ => return 0,
    };
    choices.iter().position(|c| c == wanted).unwrap_or(0)
}

pub fn default_hypervisor(choices: &[String]) -> usize {
    choices.iter().position(|c| c == "VirtualBox").unwrap_or(0)
}

/// The newest browser sorts last.
pub fn default_browser(choices: &[String]) -> usize {
    choices.len().saturating_sub(1)
}

pub fn default_download_path(choices: &[PathBuf]) -> usize {
    choices
        .iter()
        .position(|p| p.to_string_lossy().contains("Downloads"))
        .unwrap_or(0)
}

/// Candidate download directories: the working directory and the user's
/// Downloads folder, when they can be determined.
pub fn download_paths() -> Vec<PathBuf> {
    let home_var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    let downloads = std::env::var_os(home_var).map(|home| Path::new(&home).join("Downloads"));
    candidate_paths(std::env::current_dir().ok(), downloads)
}

fn candidate_paths(cwd: Option<PathBuf>, downloads: Option<PathBuf>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::new();
    for p in cwd.into_iter().chain(downloads) {
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}
