use std::path::{Path, PathBuf};

use gridjob_core::ClientConfig;

/// Write `gridjob.toml` into `dir`. Refuses to overwrite an existing file.
pub fn init(dir: &Path, address: &str) -> anyhow::Result<()> {
    let output = write_scaffold(dir, address)?;
    println!("✓ Generated {}", output.display());
    Ok(())
}

fn write_scaffold(dir: &Path, address: &str) -> anyhow::Result<PathBuf> {
    let output = dir.join("gridjob.toml");
    if output.exists() {
        anyhow::bail!("{} already exists", output.display());
    }
    let content = ClientConfig::scaffold(address).to_toml_string()?;
    std::fs::create_dir_all(dir)?;
    std::fs::write(&output, content)?;
    Ok(output)
}
