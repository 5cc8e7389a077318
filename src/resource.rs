//! Arithmetic over CPU/memory/storage/scalar resource vectors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A resource vector. All fields are non-negative; subtraction that would go
/// negative is clamped to zero rather than treated as an error.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// CPU request/usage in millicores.
    pub milli_cpu: u64,
    /// Memory in bytes.
    pub memory: u64,
    /// Ephemeral storage in bytes.
    pub ephemeral_storage: u64,
    /// Maximum number of pods allowed on the node.
    pub allowed_pod_count: u64,
    /// Extended scalar resources (e.g. GPUs), keyed by resource name.
    pub scalar: HashMap<String, u64>,
}

impl Resource {
    pub fn new(milli_cpu: u64, memory: u64) -> Self {
        Self {
            milli_cpu,
            memory,
            ..Default::default()
        }
    }

    /// Componentwise addition.
    pub fn add(&mut self, other: &Resource) {
        self.milli_cpu += other.milli_cpu;
        self.memory += other.memory;
        self.ephemeral_storage += other.ephemeral_storage;
        self.allowed_pod_count += other.allowed_pod_count;
        for (name, value) in &other.scalar {
            *self.scalar.entry(name.clone()).or_insert(0) += value;
        }
    }

    /// Componentwise subtraction, clamped at zero per-field.
    pub fn sub(&mut self, other: &Resource) {
        self.milli_cpu = self.milli_cpu.saturating_sub(other.milli_cpu);
        self.memory = self.memory.saturating_sub(other.memory);
        self.ephemeral_storage = self.ephemeral_storage.saturating_sub(other.ephemeral_storage);
        self.allowed_pod_count = self.allowed_pod_count.saturating_sub(other.allowed_pod_count);
        for (name, value) in &other.scalar {
            if let Some(current) = self.scalar.get_mut(name) {
                *current = current.saturating_sub(*value);
            }
        }
    }

    pub fn plus(mut self, other: &Resource) -> Self {
        self.add(other);
        self
    }

    pub fn minus(mut self, other: &Resource) -> Self {
        self.sub(other);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_componentwise() {
        let mut a = Resource::new(500, 1024);
        let b = Resource::new(1500, 2048);
        a.add(&b);
        assert_eq!(a.milli_cpu, 2000);
        assert_eq!(a.memory, 3072);
    }

    #[test]
    fn sub_clamps_at_zero() {
        let mut a = Resource::new(500, 1024);
        let b = Resource::new(1500, 2048);
        a.sub(&b);
        assert_eq!(a.milli_cpu, 0);
        assert_eq!(a.memory, 0);
    }

    #[test]
    fn scalar_resources_track_independently() {
        let mut a = Resource::new(0, 0);
        a.scalar.insert("gpu".to_string(), 2);
        let mut b = Resource::new(0, 0);
        b.scalar.insert("gpu".to_string(), 1);
        b.scalar.insert("fpga".to_string(), 1);
        a.add(&b);
        assert_eq!(a.scalar.get("gpu"), Some(&3));
        assert_eq!(a.scalar.get("fpga"), Some(&1));
    }
}
