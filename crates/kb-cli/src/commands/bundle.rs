use std::path::Path;

use kb_bundle::{BundleRef, DirectorySource};

pub async fn publish(app: &Path, images: Option<&Path>, source_dir: &Path) -> anyhow::Result<()> {
    let dest = DirectorySource::new(source_dir);
    let bundle = kb_bundle::publish(app, images, &dest).await?;
    println!("✓ Published {} to {}", bundle.filename(), source_dir.display());
    Ok(())
}

pub async fn copy(bundles: &[String], from: &Path, to: &Path) -> anyhow::Result<()> {
    let refs: Vec<BundleRef> = bundles.iter().map(|b| BundleRef::parse(b)).collect();
    let copied = kb_bundle::copy(&refs, &DirectorySource::new(from), &DirectorySource::new(to)).await?;
    for bundle in &copied {
        println!("✓ Copied {bundle}");
    }
    if copied.len() < refs.len() {
        anyhow::bail!("{} of {} bundles could not be written", refs.len() - copied.len(), refs.len());
    }
    Ok(())
}
