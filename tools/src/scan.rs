//! `scan_folder`: dump a folder's text files into one Markdown document.

use std::path::Path;

use ignore::WalkBuilder;
use mender_utils::atomic_write;
use tracing::{debug, info};

use crate::ToolError;
use crate::config::ScanConfig;

const TRUNCATED_NOTICE: &str = "\n\n... Content truncated due to size limitations ...\n";
const OMITTED_NOTICE: &str = "\n\n... Additional files omitted due to size limitations ...\n";

/// Text means valid UTF-8 with no NUL bytes.
fn read_text(path: &Path) -> std::io::Result<Option<String>> {
    let bytes = std::fs::read(path)?;
    if bytes.contains(&0) {
        return Ok(None);
    }
    Ok(String::from_utf8(bytes).ok())
}

fn take_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Walk `folder`, render each text file as a fenced section, and write the
/// document to `output` atomically.
pub fn scan_folder(folder: &Path, output: &Path, config: &ScanConfig) -> Result<String, ToolError> {
    if !folder.is_dir() {
        return Err(ToolError::io(
            folder,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let mut markdown = format!("# Folder Scan: {}\n\n", folder.display());
    let mut total_chars = markdown.chars().count();
    let max_chars = config.max_chars;
    let output_abs = std::path::absolute(output).unwrap_or_else(|_| output.to_path_buf());

    let ignored = config.ignored_folders.clone();
    let mut builder = WalkBuilder::new(folder);
    builder.standard_filters(false);
    builder.filter_entry(move |entry| {
        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        !(is_dir && entry.depth() > 0 && ignored.iter().any(|name| entry.file_name() == name.as_str()))
    });
    builder.sort_by_file_name(|a, b| a.cmp(b));

    for entry in builder.build().filter_map(Result::ok) {
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        if std::path::absolute(path).is_ok_and(|p| p == output_abs) {
            continue;
        }
        let relative = path
            .strip_prefix(folder)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let section = match read_text(path) {
            Ok(Some(content)) => format!("## {relative}\n\n```\n{content}\n```\n\n"),
            Ok(None) => {
                debug!(path = %relative, "Skipping non-text file");
                continue;
            }
            Err(e) => {
                let message = format!("## {relative}\n\nError reading file: {e}\n\n");
                let len = message.chars().count();
                if total_chars + len <= max_chars {
                    markdown.push_str(&message);
                    total_chars += len;
                }
                continue;
            }
        };

        let len = section.chars().count();
        if total_chars + len > max_chars {
            let remaining = max_chars.saturating_sub(total_chars);
            if remaining > 0 {
                markdown.push_str(take_chars(&section, remaining));
                markdown.push_str(TRUNCATED_NOTICE);
                total_chars = max_chars;
            } else {
                markdown.push_str(OMITTED_NOTICE);
            }
            break;
        }
        markdown.push_str(&section);
        total_chars += len;
    }

    atomic_write(output, markdown.as_bytes()).map_err(|e| ToolError::io(output, e))?;
    info!(folder = %folder.display(), output = %output.display(), total_chars, "Folder scan written");
    Ok(format!(
        "Folder scan complete. Markdown file created at: {}. Total characters: {total_chars}",
        output.display()
    ))
}
