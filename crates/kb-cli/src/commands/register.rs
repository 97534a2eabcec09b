use std::path::Path;

use kb_bundle::{BundleRef, DirectorySource, Source};
use kb_engine::RegisterManager;

use super::Context;

pub async fn register(ctx: &Context, bundles: &[String], source_dir: Option<&Path>) -> anyhow::Result<()> {
    let refs: Vec<BundleRef> = bundles.iter().map(|b| BundleRef::parse(b)).collect();
    let source: Box<dyn Source> = match source_dir {
        Some(dir) => Box::new(DirectorySource::new(dir)),
        None => Box::new(ctx.configured_sources()?),
    };

    let apps = RegisterManager::new(ctx.client.clone())
        .register_all(&refs, source.as_ref(), &ctx.namespace)
        .await?;
    for app in apps {
        println!("✓ Registered {}-{}", app.name, app.version);
    }
    Ok(())
}
