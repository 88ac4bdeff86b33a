use std::collections::HashSet;
use std::io;
use std::path::Path;

pub const GITIGNORE_FILE: &str = ".gitignore";
pub const DEFAULT_SKIP_FILES: &[&str] = &["package-lock.json", "yarn.lock"];

/// One line of a `.gitignore`, reduced to the three shapes the watcher honours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreRule {
    /// `build/`: the folder and everything below it.
    Folder(String),
    /// `*.log`: any path with that extension.
    Extension(String),
    /// Anything else. Names without a slash also match a single path segment.
    Exact(String),
}

impl IgnoreRule {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let line = line.trim_start_matches('/');
        if let Some(folder) = line.strip_suffix('/') {
            let folder = folder.trim_end_matches('/');
            return (!folder.is_empty()).then(|| IgnoreRule::Folder(folder.to_string()));
        }
        if let Some(ext) = line.strip_prefix("*.") {
            return (!ext.is_empty()).then(|| IgnoreRule::Extension(ext.to_string()));
        }
        (!line.is_empty()).then(|| IgnoreRule::Exact(line.to_string()))
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        match self {
            IgnoreRule::Folder(folder) => {
                rel_path == folder
                    || rel_path
                        .strip_prefix(folder.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            IgnoreRule::Extension(ext) => rel_path
                .rsplit_once('.')
                .is_some_and(|(stem, found)| !stem.is_empty() && found == ext),
            IgnoreRule::Exact(pattern) => {
                rel_path == pattern
                    || (!pattern.contains('/') && rel_path.split('/').any(|part| part == pattern))
            }
        }
    }
}

pub fn parse_gitignore(contents: &str) -> Vec<IgnoreRule> {
    contents.lines().filter_map(IgnoreRule::parse).collect()
}

/// Decides which relative paths are never streamed.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    rules: Vec<IgnoreRule>,
    skip: HashSet<String>,
}

impl PathFilter {
    pub fn new<I, S>(skip: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rules: Vec::new(),
            skip: skip.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_rules(mut self, rules: Vec<IgnoreRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &[IgnoreRule] {
        &self.rules
    }

    /// Re-reads `<root>/.gitignore`. A missing file clears the rules.
    pub fn reload(&mut self, root: &Path) -> io::Result<usize> {
        self.rules = match std::fs::read_to_string(root.join(GITIGNORE_FILE)) {
            Ok(contents) => parse_gitignore(&contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err),
        };
        Ok(self.rules.len())
    }

    pub fn is_ignored(&self, rel_path: &str) -> bool {
        if rel_path.is_empty() || rel_path == ".git" || rel_path.starts_with(".git/") {
            return true;
        }
        let basename = rel_path.rsplit('/').next().unwrap_or(rel_path);
        if self.skip.contains(basename) {
            return true;
        }
        self.rules.iter().any(|rule| rule.matches(rel_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(gitignore: &str) -> PathFilter {
        PathFilter::new(DEFAULT_SKIP_FILES.iter().copied()).with_rules(parse_gitignore(gitignore))
    }

    #[test]
    fn parses_the_three_rule_shapes() {
        let rules = parse_gitignore("# build output\n\ntarget/\n*.log\n/.env\nnode_modules\n");
        assert_eq!(
            rules,
            vec![
                IgnoreRule::Folder("target".to_string()),
                IgnoreRule::Extension("log".to_string()),
                IgnoreRule::Exact(".env".to_string()),
                IgnoreRule::Exact("node_modules".to_string()),
            ]
        );
    }

    #[test]
    fn folder_rules_match_whole_segments() {
        let filter = filter("build/\n");
        assert!(filter.is_ignored("build"));
        assert!(filter.is_ignored("build/out.js"));
        assert!(!filter.is_ignored("builder.rs"));
        assert!(!filter.is_ignored("src/build/x.rs"));
    }

    #[test]
    fn extension_and_exact_rules() {
        let filter = filter("*.log\nsecrets/key.pem\nnode_modules\n");
        assert!(filter.is_ignored("logs/app.log"));
        assert!(!filter.is_ignored("catalog"));
        assert!(filter.is_ignored("secrets/key.pem"));
        assert!(!filter.is_ignored("other/key.pem"));
        assert!(filter.is_ignored("web/node_modules/react/index.js"));
    }

    #[test]
    fn skip_list_matches_basenames_and_git_is_always_ignored() {
        let filter = filter("");
        assert!(filter.is_ignored("package-lock.json"));
        assert!(filter.is_ignored("web/yarn.lock"));
        assert!(filter.is_ignored(".git/HEAD"));
        assert!(!filter.is_ignored(".gitignore"));
        assert!(!filter.is_ignored("src/main.rs"));
    }

    #[test]
    fn reload_reads_and_clears_rules() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut filter = PathFilter::new(Vec::<String>::new());
        std::fs::write(dir.path().join(GITIGNORE_FILE), "dist/\n*.tmp\n").expect("write");
        assert_eq!(filter.reload(dir.path()).expect("reload"), 2);
        assert!(filter.is_ignored("dist/app.js"));

        std::fs::remove_file(dir.path().join(GITIGNORE_FILE)).expect("remove");
        assert_eq!(filter.reload(dir.path()).expect("reload"), 0);
        assert!(!filter.is_ignored("dist/app.js"));
    }
}
