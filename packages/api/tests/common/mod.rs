#![allow(dead_code)]

use api::{JobService, JobSystem};
use db::DbConfig;
use serde_json::{Map, Value};

/// A job system over a fresh in-memory store.
pub async fn setup() -> Result<(JobSystem, JobService), Box<dyn std::error::Error>> {
    let system = JobSystem::init(&DbConfig::memory()).await?;
    let service = system.service();
    Ok((system, service))
}

pub fn payload(pairs: &[(&str, &str)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert(k.to_string(), Value::String(v.to_string()));
    }
    map
}
