//! Install-time admission checks against cluster capacity.
//!
//! Capacity shortfalls are soft: callers pass `force` to log and continue.
//! Unparseable quantities are configuration errors and always fatal.

use kb_cluster::ClusterRuntime;
use kb_core::{Flavor, ManifestSpec};

use crate::error::{EngineError, EngineResult};

/// The cluster must have at least as many nodes as the flavor asks for.
pub async fn verify_node_requirements(
    runtime: &dyn ClusterRuntime,
    flavor: &Flavor,
) -> EngineResult<()> {
    let nodes = runtime.list_nodes().await?;
    if (nodes.len() as u64) < u64::from(flavor.minimum_nodes) {
        return Err(EngineError::Admission(format!(
            "cluster node count {} is lower than minimum {} required by flavor {}",
            nodes.len(),
            flavor.minimum_nodes,
            flavor.name
        )));
    }
    Ok(())
}

/// Every node must offer at least the manifest's minimum CPU and memory.
pub async fn verify_resource_requirements(
    runtime: &dyn ClusterRuntime,
    spec: &ManifestSpec,
) -> EngineResult<()> {
    let min_cpu = match spec.cpu.trim() {
        "" => None,
        cpu => Some(parse_cpu_millis(cpu)?),
    };
    let min_memory = match spec.memory.trim() {
        "" => None,
        memory => Some(parse_memory_bytes(memory)?),
    };

    for node in runtime.list_nodes().await? {
        if let Some(min) = min_cpu.filter(|min| node.allocatable_cpu_millis < *min) {
            return Err(EngineError::Admission(format!(
                "insufficient CPU in cluster node {}: available {}m is less than required minimum {}m",
                node.name, node.allocatable_cpu_millis, min
            )));
        }
        if let Some(min) = min_memory.filter(|min| node.allocatable_memory_bytes < *min) {
            return Err(EngineError::Admission(format!(
                "insufficient memory in cluster node {}: available {} bytes is less than required minimum {} bytes",
                node.name, node.allocatable_memory_bytes, min
            )));
        }
    }
    Ok(())
}

/// `"2"` → 2000, `"500m"` → 500, `"1.5"` → 1500.
pub fn parse_cpu_millis(quantity: &str) -> EngineResult<u64> {
    let quantity = quantity.trim();
    let invalid = || EngineError::Config(format!("invalid CPU quantity '{quantity}'"));
    match quantity.strip_suffix('m') {
        Some(millis) => millis.parse::<u64>().map_err(|_| invalid()),
        None => {
            let cores: f64 = quantity.parse().map_err(|_| invalid())?;
            if !cores.is_finite() || cores < 0.0 {
                return Err(invalid());
            }
            Ok((cores * 1000.0).round() as u64)
        }
    }
}

/// Binary (`Ki`, `Mi`, `Gi`, `Ti`, `Pi`, `Ei`) and decimal (`k`, `M`, `G`,
/// `T`, `P`, `E`) suffixes; a bare number is bytes.
pub fn parse_memory_bytes(quantity: &str) -> EngineResult<u64> {
    const SUFFIXES: [(&str, f64); 12] = [
        ("Ki", 1024.0),
        ("Mi", 1_048_576.0),
        ("Gi", 1_073_741_824.0),
        ("Ti", 1_099_511_627_776.0),
        ("Pi", 1_125_899_906_842_624.0),
        ("Ei", 1_152_921_504_606_846_976.0),
        ("k", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
        ("P", 1e15),
        ("E", 1e18),
    ];

    let quantity = quantity.trim();
    let invalid = || EngineError::Config(format!("invalid memory quantity '{quantity}'"));
    let (number, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, multiplier)| {
            quantity
                .strip_suffix(suffix)
                .map(|number| (number, *multiplier))
        })
        .unwrap_or((quantity, 1.0));

    let value: f64 = number.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    Ok((value * multiplier).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_cluster::MemoryRuntime;

    #[test]
    fn cpu_quantities() {
        assert_eq!(parse_cpu_millis("2").unwrap(), 2000);
        assert_eq!(parse_cpu_millis("500m").unwrap(), 500);
        assert_eq!(parse_cpu_millis("1.5").unwrap(), 1500);
        assert!(parse_cpu_millis("lots").is_err());
    }

    #[test]
    fn memory_quantities() {
        assert_eq!(parse_memory_bytes("4Gi").unwrap(), 4u64 << 30);
        assert_eq!(parse_memory_bytes("512Mi").unwrap(), 512u64 << 20);
        assert_eq!(parse_memory_bytes("1G").unwrap(), 1_000_000_000);
        assert_eq!(parse_memory_bytes("2048").unwrap(), 2048);
        assert!(parse_memory_bytes("4Gb").is_err());
    }

    #[tokio::test]
    async fn node_count_below_flavor_minimum_is_rejected() {
        let runtime = MemoryRuntime::new();
        runtime.add_node("node-1", 4000, 8u64 << 30).await;
        let flavor = Flavor {
            name: "ha".to_string(),
            minimum_nodes: 3,
            ..Flavor::single_node()
        };

        let err = verify_node_requirements(&runtime, &flavor).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "admission check failed: cluster node count 1 is lower than minimum 3 required by flavor ha"
        );
        verify_node_requirements(&runtime, &Flavor::single_node())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn every_node_must_meet_resource_minimums() {
        let runtime = MemoryRuntime::new();
        runtime.add_node("big", 8000, 32u64 << 30).await;
        runtime.add_node("small", 1000, 2u64 << 30).await;

        let mut spec = ManifestSpec {
            cpu: "2".to_string(),
            ..Default::default()
        };
        let err = verify_resource_requirements(&runtime, &spec).await.unwrap_err();
        assert!(err.to_string().contains("insufficient CPU in cluster node small"));

        spec.cpu = "500m".to_string();
        spec.memory = "4Gi".to_string();
        let err = verify_resource_requirements(&runtime, &spec).await.unwrap_err();
        assert!(err.to_string().contains("insufficient memory in cluster node small"));

        spec.memory = "1Gi".to_string();
        verify_resource_requirements(&runtime, &spec).await.unwrap();
    }
}
