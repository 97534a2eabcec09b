use kb_core::{AntiAffinity, Flavor};
use kb_engine::FlavorManager;

use super::Context;

fn manager(ctx: &Context) -> FlavorManager {
    FlavorManager::new(ctx.client.clone(), &ctx.namespace)
}

pub fn build(
    name: &str,
    quorum_replicas: u32,
    replication_replicas: u32,
    stateless_replicas: u32,
    anti_affinity: &str,
    minimum_nodes: u32,
) -> anyhow::Result<Flavor> {
    let anti_affinity = match anti_affinity {
        "required" => AntiAffinity::Required,
        "optional" => AntiAffinity::Optional,
        other => anyhow::bail!("anti-affinity must be 'required' or 'optional', got '{other}'"),
    };
    Ok(Flavor {
        name: name.to_string(),
        stateful_quorum_replicas: quorum_replicas,
        stateful_replication_replicas: replication_replicas,
        stateless_replicas,
        anti_affinity,
        minimum_nodes,
    })
}

pub async fn create(ctx: &Context, flavor: &Flavor) -> anyhow::Result<()> {
    if manager(ctx).create_if_absent(flavor).await? {
        println!("✓ Created flavor {}", flavor.name);
    } else {
        println!("Flavor {} already exists", flavor.name);
    }
    Ok(())
}

pub async fn get(ctx: &Context, name: &str) -> anyhow::Result<()> {
    let flavor = manager(ctx).get(name).await?;
    println!("{}", serde_json::to_string_pretty(&flavor)?);
    Ok(())
}

pub async fn list(ctx: &Context) -> anyhow::Result<()> {
    let flavors = manager(ctx);
    flavors.bootstrap_default_flavor().await?;
    for flavor in flavors.list().await? {
        println!(
            "{}\tnodes>={}\tstateless={}\tquorum={}\treplication={}",
            flavor.name,
            flavor.minimum_nodes,
            flavor.stateless_replicas,
            flavor.stateful_quorum_replicas,
            flavor.stateful_replication_replicas
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_parses_anti_affinity() {
        let flavor = build("ha", 3, 2, 2, "required", 3).unwrap();
        assert_eq!(flavor.anti_affinity, AntiAffinity::Required);
        assert_eq!(flavor.minimum_nodes, 3);
        assert!(build("ha", 3, 2, 2, "sometimes", 3).is_err());
    }
}
