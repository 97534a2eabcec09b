use std::path::Path;

use anyhow::Context as _;
use kb_core::Manifest;

use super::Context;

/// Parse a manifest document and store it, replacing any earlier copy.
pub async fn apply(ctx: &Context, file: &Path) -> anyhow::Result<()> {
    let manifest = read_manifest(file)?;
    ctx.client.apply(&ctx.namespace, &manifest).await?;
    println!(
        "✓ Stored manifest {} ({} bundles)",
        manifest.name,
        manifest.spec.bundles.len()
    );
    Ok(())
}

fn read_manifest(file: &Path) -> anyhow::Result<Manifest> {
    let doc = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let manifest: Manifest =
        serde_yaml::from_str(&doc).with_context(|| format!("parsing {}", file.display()))?;
    if manifest.name.trim().is_empty() {
        anyhow::bail!("manifest in {} has no name", file.display());
    }
    Ok(manifest)
}
