use thiserror::Error;

pub const DEFAULT_LANGUAGE: &str = "text";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderTargetError {
    #[error("no extension on `{filepath}` to infer a language from")]
    MissingExtension { filepath: String },
    #[error("no language known for extension `{extension}`")]
    UnknownExtension { extension: String },
}

/// Maps a file extension to the highlighter language name.
pub fn language_for_extension(extension: &str) -> Option<&'static str> {
    let normalized = extension.trim().trim_start_matches('.').to_ascii_lowercase();
    let language = match normalized.as_str() {
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "jsx",
        "ts" | "tsx" => "typescript",
        "py" | "pyc" | "pyw" | "ipynb" => "python",
        "java" | "class" | "jar" => "java",
        "c" | "cpp" | "h" | "hpp" => "cpp",
        "cs" => "csharp",
        "html" | "htm" => "html",
        "css" | "scss" | "sass" | "less" => "css",
        "rb" | "erb" | "gemspec" => "ruby",
        "php" | "phtml" => "php",
        "swift" => "swift",
        "rs" | "rlib" => "rust",
        "go" => "go",
        "sql" => "sql",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "xml" => "markup",
        "md" | "markdown" => "markdown",
        "sh" | "bash" | "zsh" => "bash",
        "ps1" | "psm1" | "psd1" => "powershell",
        _ => return None,
    };
    Some(language)
}

/// Picks the language for a file: an explicit value wins, then the extension.
pub fn resolve_language(
    explicit: Option<&str>,
    extension: &str,
    filepath: &str,
) -> Result<String, RenderTargetError> {
    if let Some(language) = explicit.map(str::trim).filter(|value| !value.is_empty()) {
        return Ok(language.to_ascii_lowercase());
    }
    if extension.trim().is_empty() {
        return Err(RenderTargetError::MissingExtension {
            filepath: filepath.to_string(),
        });
    }
    language_for_extension(extension)
        .map(str::to_string)
        .ok_or_else(|| RenderTargetError::UnknownExtension {
            extension: extension.to_string(),
        })
}
