// pydeps/src/cli/clean_cache.rs
use clap::Args;
use colored::Colorize;
use pydeps_common::cache::Cache;
use pydeps_common::error::Result;
use pydeps_common::Config;

#[derive(Args, Debug)]
pub struct CleanCache {
    /// Drop only the entry cached for this URL.
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,
}

impl CleanCache {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let cache = Cache::new(config)?;
        match &self.url {
            Some(url) => {
                cache.clear_url(url)?;
                println!("{} Removed cached entry for {url}", "==>".bold().blue());
            }
            None => {
                cache.clear_all()?;
                println!(
                    "{} Cleared cache at {}",
                    "==>".bold().blue(),
                    cache.get_dir().display()
                );
            }
        }
        Ok(())
    }
}
