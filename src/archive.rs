//! Local code archive handling: extraction and browsing.
//!
//! Archives are validated as a whole before anything is written, so a single
//! escaping entry leaves the destination exactly as it was.

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Files larger than this are cut off in the code files view.
pub const MAX_DISPLAY_FILE_BYTES: u64 = 100 * 1024;

pub const CLONE_INSTRUCTIONS_FILE: &str = "clone_instructions.txt";

/// Extensions shown in the code files view.
const CODE_EXTENSIONS: &[&str] = &[
    "js", "py", "go", "java", "php", "rb", "cs", "cpp", "c", "h", "hpp", "ts", "jsx", "tsx",
    "html", "css", "scss", "less", "json", "yaml", "yml", "xml", "md", "txt", "sh", "bat", "ps1",
    "sql", "r", "scala", "kt", "swift", "dart", "rs", "lua", "pl", "pm",
];

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive entry escapes the destination directory: {entry}")]
    PathTraversal { entry: String },
    #[error("corrupt archive: {0}")]
    Corrupt(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Resolve an archive entry name against `dest` without touching the disk.
///
/// Rejects absolute paths, drive prefixes, and any `..` that would climb above
/// `dest`.
pub fn resolve_entry_path(dest: &Path, entry: &str) -> Result<PathBuf, ArchiveError> {
    let traversal = || ArchiveError::PathTraversal {
        entry: entry.to_string(),
    };
    // Zip names use forward slashes, but some tools write backslashes.
    let normalized = entry.replace('\\', "/");

    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop().ok_or_else(traversal)?;
            }
            Component::RootDir | Component::Prefix(_) => return Err(traversal()),
        }
    }

    Ok(parts.iter().fold(dest.to_path_buf(), |path, part| path.join(part)))
}

/// Extract a zip archive into `dest`, overwriting existing files.
///
/// Returns the number of files written.
pub fn extract_zip(bytes: &[u8], dest: &Path) -> Result<usize, ArchiveError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let mut plan = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let file = archive.by_index_raw(index)?;
        let target = resolve_entry_path(dest, file.name())?;
        plan.push((index, target, file.is_dir()));
    }

    fs::create_dir_all(dest)?;
    let mut written = 0;
    for (index, target, is_dir) in plan {
        if is_dir {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = archive.by_index(index)?;
        let mut out = fs::File::create(&target)?;
        io::copy(&mut file, &mut out)?;
        written += 1;
    }
    Ok(written)
}

/// Per-function download directory under `root`.
///
/// Function names never contain separators; anything that would not stay a
/// single directory below `root` is refused.
pub fn function_dir(root: &Path, function: &str) -> Result<PathBuf, ArchiveError> {
    let dir = resolve_entry_path(root, function)?;
    if dir.parent() == Some(root) {
        Ok(dir)
    } else {
        Err(ArchiveError::PathTraversal {
            entry: function.to_string(),
        })
    }
}

pub fn clone_instructions(url: &str, deployed_url: Option<&str>) -> String {
    let mut text = format!("To clone this source repository:\n\nRepository URL: {url}\n");
    if let Some(deployed) = deployed_url {
        let _ = writeln!(text, "Deployed URL: {deployed}");
    }
    text.push_str(
        "\nCommands to clone:\n\
         1. Install the Google Cloud SDK if not already installed\n\
         2. Authenticate: gcloud auth login\n\
         3. Clone: gcloud source repos clone [REPO_NAME]\n",
    );
    text
}

fn is_code_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| CODE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(fs::DirEntry::path);
    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&path, out)?;
        } else if file_type.is_file() && is_code_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// Concatenate every allow-listed file below `dir` into one display buffer.
pub fn read_code_files(dir: &Path, function: &str) -> io::Result<String> {
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;

    if files.is_empty() {
        return Ok(format!(
            "No code files found for {function} in {}",
            dir.display()
        ));
    }

    let mut text = format!("━━━ Code Files for {function} ━━━\n");
    let _ = writeln!(text, "{} file(s) in {}\n", files.len(), dir.display());

    for path in files {
        let relative = path.strip_prefix(dir).unwrap_or(&path);
        let _ = writeln!(text, "═══ {} ═══", relative.display());

        let size = fs::metadata(&path)?.len();
        let mut bytes = Vec::new();
        fs::File::open(&path)?
            .take(MAX_DISPLAY_FILE_BYTES)
            .read_to_end(&mut bytes)?;
        text.push_str(&String::from_utf8_lossy(&bytes));
        if !text.ends_with('\n') {
            text.push('\n');
        }
        if size > MAX_DISPLAY_FILE_BYTES {
            let _ = writeln!(
                text,
                "... [truncated: showing {} KB of {} KB]",
                MAX_DISPLAY_FILE_BYTES / 1024,
                size.div_ceil(1024)
            );
        }
        text.push('\n');
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::FileOptions;

    use super::*;

    fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_resolve_entry_path() {
        let dest = Path::new("/tmp/dl/fn");
        assert_eq!(
            resolve_entry_path(dest, "src/index.js").unwrap(),
            dest.join("src/index.js")
        );
        assert_eq!(
            resolve_entry_path(dest, "./a/../b.txt").unwrap(),
            dest.join("b.txt")
        );
        assert!(resolve_entry_path(dest, "../evil.sh").is_err());
        assert!(resolve_entry_path(dest, "a/../../evil.sh").is_err());
        assert!(resolve_entry_path(dest, "/etc/passwd").is_err());
        assert!(resolve_entry_path(dest, "..\\evil.bat").is_err());
    }

    #[test]
    fn test_extract_writes_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = zip_with(&[("index.js", b"exports.h = 1"), ("lib/a/b.py", b"pass")]);

        let written = extract_zip(&bytes, dir.path()).unwrap();
        assert_eq!(written, 2);
        assert_eq!(fs::read_to_string(dir.path().join("lib/a/b.py")).unwrap(), "pass");
    }

    #[test]
    fn test_traversal_entry_aborts_before_writing_anything() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fn");
        let bytes = zip_with(&[("ok.txt", b"fine"), ("../escaped.txt", b"bad")]);

        let err = extract_zip(&bytes, &dest).unwrap_err();
        assert!(matches!(err, ArchiveError::PathTraversal { ref entry } if entry == "../escaped.txt"));
        assert!(!dest.join("ok.txt").exists());
        assert!(!dir.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_extract_overwrites_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.py"), "old").unwrap();

        extract_zip(&zip_with(&[("main.py", b"new")]), dir.path()).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("main.py")).unwrap(), "new");
    }

    #[test]
    fn test_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_zip(b"definitely not a zip", dir.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt(_)));
    }

    #[test]
    fn test_function_dir() {
        let root = Path::new("downloads");
        assert_eq!(function_dir(root, "fn-a").unwrap(), root.join("fn-a"));
        assert!(function_dir(root, "../fn-a").is_err());
        assert!(function_dir(root, "a/b").is_err());
        assert!(function_dir(root, "").is_err());
    }

    #[test]
    fn test_read_code_files_filters_sorts_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/b.py"), "print('b')").unwrap();
        fs::write(dir.path().join("a.js"), "console.log('a')").unwrap();
        fs::write(dir.path().join("logo.png"), [0_u8, 1, 2]).unwrap();
        let big = "x".repeat(usize::try_from(MAX_DISPLAY_FILE_BYTES).unwrap() + 10);
        fs::write(dir.path().join("z.txt"), &big).unwrap();

        let text = read_code_files(dir.path(), "fn-a").unwrap();
        assert!(text.starts_with("━━━ Code Files for fn-a ━━━"));
        let a = text.find("═══ a.js ═══").unwrap();
        let b = text.find("═══ src/b.py ═══").unwrap();
        let z = text.find("═══ z.txt ═══").unwrap();
        assert!(a < b && b < z);
        assert!(!text.contains("logo.png"));
        assert!(text.contains("[truncated: showing 100 KB of 101 KB]"));
    }

    #[test]
    fn test_read_code_files_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CLONE_INSTRUCTIONS_FILE), "clone me").unwrap();
        fs::write(dir.path().join("data.bin"), "x").unwrap();

        let text = read_code_files(dir.path(), "fn-b").unwrap();
        assert!(text.contains("clone me"));

        let empty = tempfile::tempdir().unwrap();
        let text = read_code_files(empty.path(), "fn-b").unwrap();
        assert!(text.starts_with("No code files found for fn-b"));
    }
}
