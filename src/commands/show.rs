//! Show command - displays information.

use anyhow::Result;

use crate::config::Config;
use crate::kernel::{self, KernelDescriptor};

/// Show target for the show command.
pub enum ShowTarget {
    /// Effective configuration
    Config,
    /// Discovered kernels and whether they resolve
    Kernels,
}

/// Execute the show command.
pub fn cmd_show(config: &Config, target: ShowTarget) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Kernels => {
            let scheme = config.naming_scheme();
            let kernels = kernel::discover_kernels(&config.source.bootdir, &scheme.prefix)?;
            if kernels.is_empty() {
                println!("No kernels found in {}", config.source.bootdir.display());
            }
            for path in kernels {
                match KernelDescriptor::resolve(&path, &scheme) {
                    Ok(desc) => {
                        let variants: Vec<String> =
                            desc.variants().iter().map(|t| t.to_string()).collect();
                        println!("  ✓ {} [{}]", desc.version(), variants.join(", "));
                    }
                    Err(e) => println!("  ✗ {}: {}", path.display(), e),
                }
            }
        }
    }
    Ok(())
}
