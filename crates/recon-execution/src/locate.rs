use std::path::{Path, PathBuf};

/// Windows-style extensions tried in addition to the bare candidate name.
/// The core does not branch on OS identity beyond this list — on
/// non-Windows systems these candidates simply never exist.
const EXTRA_SUFFIXES: &[&str] = &[".exe", ".bat"];

/// Try, in order: `tools_root/tool/tool`, `tools_root/bin/tool`,
/// `tools_root/tool`, then a PATH lookup. Each candidate is also tried with
/// `.exe`/`.bat` appended. Returns the first path that exists as a file.
pub fn locate_executable(tool: &str, tools_root: &Path) -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if !tools_root.as_os_str().is_empty() {
        candidates.push(tools_root.join(tool).join(tool));
        candidates.push(tools_root.join("bin").join(tool));
        candidates.push(tools_root.join(tool));
    }

    for dir in path_dirs() {
        candidates.push(dir.join(tool));
    }

    for candidate in &candidates {
        if is_executable_file(candidate) {
            return Some(candidate.clone());
        }
        for suffix in EXTRA_SUFFIXES {
            let mut with_suffix = candidate.clone().into_os_string();
            with_suffix.push(suffix);
            let with_suffix = PathBuf::from(with_suffix);
            if is_executable_file(&with_suffix) {
                return Some(with_suffix);
            }
        }
    }

    None
}

fn path_dirs() -> Vec<PathBuf> {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).collect())
        .unwrap_or_default()
}

fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}
