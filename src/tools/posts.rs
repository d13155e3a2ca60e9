use anyhow::Context;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Deserialize, Debug, Clone)]
pub struct PostsConfig {
    #[serde(rename = "posts_dir", default = "default_dir")]
    pub dir: String,
    #[serde(rename = "posts_slug", default = "default_slug")]
    pub slug: String,
}

impl Default for PostsConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            slug: default_slug(),
        }
    }
}

fn default_dir() -> String {
    "_posts".to_string()
}

fn default_slug() -> String {
    "market-analysis".to_string()
}

/// Writes finished posts as Jekyll markdown files.
#[derive(Debug, Clone)]
pub struct PostWriter {
    dir: PathBuf,
    slug: String,
}

impl PostWriter {
    pub fn new(config: PostsConfig) -> Self {
        let slug = config.slug.trim().trim_matches('-').to_string();
        Self {
            dir: PathBuf::from(config.dir),
            slug: if slug.is_empty() { default_slug() } else { slug },
        }
    }

    /// `YYYY-MM-DD-HHMMSS-<slug>.md`, so reruns on the same day never overwrite.
    pub fn file_name(&self, now: &DateTime<FixedOffset>) -> String {
        format!("{}-{}.md", now.format("%Y-%m-%d-%H%M%S"), self.slug)
    }

    pub fn write(&self, now: &DateTime<FixedOffset>, content: &str) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Creating {}", self.dir.display()))?;
        let path = self.dir.join(self.file_name(now));
        fs::write(&path, content).with_context(|| format!("Writing {}", path.display()))?;
        log::info!("saved post to {}", path.display());
        Ok(path)
    }
}
