pub mod table {
    fn width(s: &str) -> usize {
        s.chars().count()
    }

    fn sep(widths: &[usize]) -> String {
        let mut s = String::from("+");
        for w in widths {
            s.push_str(&"-".repeat(w + 2));
            s.push('+');
        }
        s
    }

    fn line(cells: &[String], widths: &[usize]) -> String {
        let mut s = String::from("|");
        for (cell, w) in cells.iter().zip(widths) {
            s.push(' ');
            s.push_str(cell);
            s.push_str(&" ".repeat(w.saturating_sub(width(cell))));
            s.push_str(" |");
        }
        s
    }

    /// Render an ASCII grid. Missing cells render empty, extra cells are dropped.
    #[must_use]
    pub fn render(headers: &[&str], rows: &[Vec<String>]) -> String {
        let cols = headers.len();
        let mut widths: Vec<usize> = headers.iter().map(|h| width(h)).collect();
        for row in rows {
            for (c, w) in widths.iter_mut().enumerate() {
                *w = (*w).max(row.get(c).map_or(0, |s| width(s)));
            }
        }

        let rule = sep(&widths);
        let mut out = String::new();
        out.push_str(&rule);
        out.push('\n');
        let header_cells: Vec<String> = headers.iter().map(|s| (*s).to_string()).collect();
        out.push_str(&line(&header_cells, &widths));
        out.push('\n');
        out.push_str(&rule);
        out.push('\n');
        for row in rows {
            let cells: Vec<String> = (0..cols).map(|i| row.get(i).cloned().unwrap_or_default()).collect();
            out.push_str(&line(&cells, &widths));
            out.push('\n');
        }
        out.push_str(&rule);
        out
    }
}

pub mod config {
    use serde::Deserialize;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::{Path, PathBuf};

    use crate::errors::DumpError;
    use crate::registry::{Dependency, Toggle};

    /// `[dump]` defaults; command-line flags win over these.
    #[derive(Debug, Clone, Deserialize, Default)]
    pub struct DumpConfig {
        pub format: Option<String>, // "json" | "text"
        pub indent: Option<usize>,
        pub depth: Option<usize>,
        pub limit: Option<usize>,
        pub generic_fields: Option<bool>,
        pub idtype: Option<String>, // "int" | "str"
    }

    /// `[dot]` layout defaults for `--dot` output.
    #[derive(Debug, Clone, Deserialize, Default)]
    pub struct DotConfig {
        pub clusters: Option<bool>,
        pub rankdir: Option<String>, // "LR" | "TB"
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct AdditionalSettings {
        pub name: Option<String>,
        pub r#type: String,
        pub field: String,
        #[serde(default)]
        pub dependency: Dependency,
    }

    /// One `[types."group.model"]` table.
    #[derive(Debug, Clone, Deserialize, Default)]
    pub struct TypeSettings {
        #[serde(default)]
        pub forward: Toggle,
        #[serde(default)]
        pub reverse: Toggle,
        #[serde(default)]
        pub many: Toggle,
        #[serde(default)]
        pub generic: Toggle,
        #[serde(default)]
        pub additional: Vec<AdditionalSettings>,
        pub fields: Option<Vec<String>>,
        pub exclude: Option<Vec<String>>,
        #[serde(default)]
        pub ignore: bool,
    }

    #[derive(Debug, Clone, Deserialize, Default)]
    pub struct Config {
        /// Store file, relative to the working directory.
        pub store: Option<String>,
        pub dump: Option<DumpConfig>,
        pub dot: Option<DotConfig>,
        #[serde(default)]
        pub types: BTreeMap<String, TypeSettings>,
    }

    fn default_config_path(root: &Path) -> PathBuf {
        root.join("object-dump.toml")
    }

    /// Load a config file that the user asked for explicitly.
    ///
    /// # Errors
    /// Returns `DumpError::Io` if the file cannot be read and
    /// `DumpError::Configuration` if it is not valid config TOML.
    pub fn load_config_at(path: &Path) -> Result<Config, DumpError> {
        let data = fs::read_to_string(path)?;
        toml::from_str::<Config>(&data)
            .map_err(|e| DumpError::Configuration(format!("{}: {e}", path.display())))
    }

    /// Look for `object-dump.toml` in `root`. A missing or unreadable file yields `None`.
    #[must_use]
    pub fn load_config_near(root: &Path) -> Option<Config> {
        let p = default_config_path(root);
        if !p.exists() {
            return None;
        }
        match load_config_at(&p) {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                log::warn!("ignoring {}: {e}", p.display());
                None
            }
        }
    }
}
