//! `mirrorwatch check`: validate the configuration file.

use anyhow::Result;
use clap::Args;

use super::GlobalOpts;

/// Arguments for `mirrorwatch check`.
#[derive(Args, Debug)]
pub struct CheckArgs {}

impl CheckArgs {
    pub fn run(self, opts: &GlobalOpts) -> Result<()> {
        let config = opts.load_config()?;
        let files: usize = config.groups.iter().map(|group| group.files.len()).sum();
        println!(
            "✓ {} is valid: {} group(s), {} file(s), apply {}",
            opts.config_path.display(),
            config.groups.len(),
            files,
            if config.apply_enabled {
                "enabled"
            } else {
                "disabled"
            },
        );
        Ok(())
    }
}
