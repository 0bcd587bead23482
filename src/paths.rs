//! Module-prefix ↔ filesystem-prefix reconciliation (§4.H step 4, §9 open
//! question (c)). Generalizes the source's Go-module-specific logic to a
//! `module_prefix -> fs_prefix` map any language resolver can populate.

use std::path::Path;

/// `(module_prefix, fs_prefix)` — `module_prefix` is stripped from a stored
/// coverage path and `fs_prefix` is substituted in its place.
pub type ModuleMap = Vec<(String, String)>;

/// Scans every `go.mod` under `root` and records `module <name>` as mapping
/// to the directory containing that file (relative to `root`).
pub fn scan_go_modules(root: &Path) -> ModuleMap {
    let mut map = ModuleMap::new();
    walk(root, root, &mut map);
    map
}

fn walk(root: &Path, dir: &Path, map: &mut ModuleMap) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.file_name().and_then(|n| n.to_str()) == Some(".git") {
            continue;
        }
        if path.is_dir() {
            walk(root, &path, map);
        } else if path.file_name().and_then(|n| n.to_str()) == Some("go.mod") {
            if let Some(name) = read_module_name(&path) {
                let fs_prefix = path
                    .parent()
                    .unwrap_or(root)
                    .strip_prefix(root)
                    .unwrap_or(Path::new(""))
                    .to_string_lossy()
                    .replace('\\', "/");
                map.push((name, fs_prefix));
            }
        }
    }
}

fn read_module_name(go_mod: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(go_mod).ok()?;
    for line in contents.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("module ") {
            return Some(rest.trim().to_string());
        }
    }
    None
}

/// Finds the filesystem path corresponding to `stored_path` (as recorded in
/// a coverage trace) under `map`, by requiring either an exact match or a
/// `module_prefix + "/"` boundary before substituting `fs_prefix`. First
/// match in `map` wins.
pub fn convert_module_path_to_fs_path(stored_path: &str, map: &ModuleMap) -> Option<String> {
    for (module_prefix, fs_prefix) in map {
        if stored_path == module_prefix.as_str() {
            return Some(fs_prefix.clone());
        }
        let boundary = format!("{module_prefix}/");
        if let Some(rest) = stored_path.strip_prefix(&boundary) {
            return Some(if fs_prefix.is_empty() {
                rest.to_string()
            } else {
                format!("{fs_prefix}/{rest}")
            });
        }
    }
    None
}

/// Matches a diff path against a stored path by trying every `(module_prefix,
/// fs_prefix)` candidate; returns true on the first pair whose computed
/// filesystem path equals `diff_path`.
pub fn reconcile(stored_path: &str, diff_path: &str, map: &ModuleMap) -> bool {
    if stored_path == diff_path {
        return true;
    }
    convert_module_path_to_fs_path(stored_path, map).as_deref() == Some(diff_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_six_module_path_reconciliation() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("go.mod"), "module proj\n\ngo 1.21\n").unwrap();
        let map = scan_go_modules(dir.path());
        assert_eq!(map, vec![("proj".to_string(), String::new())]);

        assert!(reconcile("proj/pkg/a.go", "pkg/a.go", &map));
        assert!(!reconcile("proj/pkg/a.go", "pkg/b.go", &map));
    }

    #[test]
    fn nested_module_maps_to_its_own_subdirectory() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("services/billing")).unwrap();
        std::fs::write(
            dir.path().join("services/billing/go.mod"),
            "module billing\n",
        )
        .unwrap();
        let map = scan_go_modules(dir.path());
        assert_eq!(
            convert_module_path_to_fs_path("billing/internal/x.go", &map),
            Some("services/billing/internal/x.go".to_string())
        );
    }

    #[test]
    fn requires_a_path_boundary_not_an_arbitrary_prefix() {
        let map = vec![("proj".to_string(), String::new())];
        // "projectile.go" must not match the "proj" module prefix
        assert_eq!(convert_module_path_to_fs_path("projectile.go", &map), None);
    }
}
