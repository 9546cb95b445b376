#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use vplexflow_core::MemoryArray;
use vplexflow_engine::{OrchestratorConfig, ProvisionRequest, WaitConfig};

pub const GB: u64 = 1024 * 1024 * 1024;
pub const PORT: &str = "P000000003CA00147-A0-FC00";

pub fn names(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{}{}", prefix, i)).collect()
}

/// Single-cluster array with `count` unclaimed volumes `sv1..svN`
pub fn local_array(count: usize) -> MemoryArray {
    names("sv", count)
        .iter()
        .fold(MemoryArray::new(&["cluster-1"]), |array, name| {
            array.with_storage_volume("cluster-1", name, 10 * GB)
        })
        .with_port("cluster-1", PORT)
}

/// Two-cluster array with `count` volumes per side (`sv*` and `tv*`)
pub fn metro_array(count: usize) -> MemoryArray {
    let array = names("sv", count)
        .iter()
        .fold(MemoryArray::new(&["cluster-1", "cluster-2"]), |array, name| {
            array.with_storage_volume("cluster-1", name, 10 * GB)
        });
    names("tv", count)
        .iter()
        .fold(array, |array, name| {
            array.with_storage_volume("cluster-2", name, 10 * GB)
        })
        .with_port("cluster-1", PORT)
}

pub fn local_request(count: usize) -> ProvisionRequest {
    ProvisionRequest::new("cluster-1", names("sv", count), "esx", vec![PORT.to_string()])
}

/// No delay between polls so rebuild waits finish instantly
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        wait: WaitConfig::new(5, Duration::ZERO),
        ..OrchestratorConfig::default()
    }
}

pub fn shared(array: MemoryArray) -> Arc<MemoryArray> {
    Arc::new(array)
}
