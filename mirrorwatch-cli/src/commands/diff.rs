//! `mirrorwatch diff`: show unified diffs between deployed and reference files.

use anyhow::{bail, Context, Result};
use clap::Args;

use mirrorwatch_core::types::GroupName;
use mirrorwatch_sync::diff_group;

use super::GlobalOpts;

/// Arguments for `mirrorwatch diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Limit output to this group.
    #[arg(long)]
    pub group: Option<String>,
}

impl DiffArgs {
    pub fn run(self, opts: &GlobalOpts) -> Result<()> {
        let config = opts.load_config()?;

        let groups: Vec<_> = match self.group.map(GroupName::from) {
            Some(name) => match config.find_group(&name) {
                Some(group) => vec![group],
                None => bail!("unknown group '{name}'"),
            },
            None => config.groups.iter().collect(),
        };

        let mut any = false;
        for group in groups {
            let result = diff_group(group)
                .with_context(|| format!("diff failed for '{}'", group.name))?;
            for diff in result.diffs {
                any = true;
                print!("{}", diff.unified_diff);
                if !diff.unified_diff.ends_with('\n') {
                    println!();
                }
            }
        }

        if !any {
            println!("No differences.");
        }
        Ok(())
    }
}
