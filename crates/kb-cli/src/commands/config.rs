use kb_engine::{ConfigManager, InstallDescription};

use super::Context;

fn manager(ctx: &Context) -> ConfigManager {
    ConfigManager::new(ctx.client.clone(), &ctx.engine_config())
}

pub async fn get(ctx: &Context, install: &str, key: &str) -> anyhow::Result<()> {
    println!("{}", manager(ctx).get(&ctx.namespace, install, key).await?);
    Ok(())
}

pub async fn set(ctx: &Context, install: &str, key: &str, value: &str) -> anyhow::Result<()> {
    manager(ctx).set(&ctx.namespace, install, key, value).await?;
    println!("✓ Set {key} on {install}");
    Ok(())
}

pub async fn remove(ctx: &Context, install: &str, key: &str) -> anyhow::Result<()> {
    manager(ctx).remove(&ctx.namespace, install, key).await?;
    println!("✓ Removed {key} from {install}");
    Ok(())
}

pub async fn list(ctx: &Context, install: &str) -> anyhow::Result<()> {
    for (key, value) in manager(ctx).list(&ctx.namespace, install).await? {
        println!("{key}={value}");
    }
    Ok(())
}

pub async fn describe(ctx: &Context, install: Option<&str>, format: &str) -> anyhow::Result<()> {
    let descriptions = manager(ctx).describe(&ctx.namespace, install).await?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&descriptions)?),
        _ => {
            for description in &descriptions {
                println!("{}", format_description(description));
            }
        }
    }
    Ok(())
}

fn format_description(description: &InstallDescription) -> String {
    let mut out = format!(
        "{} ({} {})\n",
        description.name, description.application, description.version
    );
    for (name, param) in &description.parameters {
        out.push_str(&format!("  {name} = {:?}", param.value));
        if !param.default.is_empty() && param.default != param.value {
            out.push_str(&format!(" (default {:?})", param.default));
        }
        if !param.description.is_empty() {
            out.push_str(&format!("  # {}", param.description));
        }
        out.push('\n');
    }
    out
}
