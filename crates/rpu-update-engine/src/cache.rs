// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Kernel list cache
//!
//! Kernel selection is pure, so the ordered list for a given launch shape is
//! computed once and reused until the update configuration changes.

use std::collections::HashMap;

use rpu_device::DeviceValue;
use tracing::debug;

use crate::accelerated::AcceleratedDevice;
use crate::kernel::{KernelDescriptor, UpdateConfig};

/// Inputs kernel selection depends on (besides the configuration)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelKey {
    pub m_batch: usize,
    pub n_k32: usize,
    pub use_bo64: bool,
    pub out_trans: bool,
}

#[derive(Debug, Clone)]
pub struct KernelCache {
    config: UpdateConfig,
    entries: HashMap<KernelKey, Vec<KernelDescriptor>>,
    hits: u64,
    misses: u64,
}

impl KernelCache {
    pub fn new(config: UpdateConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Replace the configuration, dropping every cached list if it changed
    pub fn set_config(&mut self, config: UpdateConfig) {
        if config != self.config {
            debug!("[KERNEL-SELECT] Update config changed, dropping {} cached kernel lists", self.entries.len());
            self.entries.clear();
            self.config = config;
        }
    }

    /// Cached kernel list for `key`, selecting it on first use
    pub fn get_or_select<T: DeviceValue>(&mut self, device: &AcceleratedDevice<T>, key: KernelKey) -> &[KernelDescriptor] {
        if self.entries.contains_key(&key) {
            self.hits += 1;
        } else {
            self.misses += 1;
            let kernels =
                device.select_update_kernels(key.m_batch, key.n_k32, key.use_bo64, key.out_trans, &self.config);
            self.entries.insert(key, kernels);
        }
        self.entries.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpu_device::{CustomDevice, CustomParameters};

    fn accelerated() -> AcceleratedDevice<f32> {
        let par = CustomParameters::deterministic(0.1, -1.0, 1.0);
        let device = CustomDevice::from_parameters(4, 4, par).unwrap();
        AcceleratedDevice::from_device(&device, 0)
    }

    fn key(m_batch: usize) -> KernelKey {
        KernelKey {
            m_batch,
            n_k32: 1,
            use_bo64: true,
            out_trans: false,
        }
    }

    #[test]
    fn test_cache_hits_after_first_selection() {
        let device = accelerated();
        let mut cache = KernelCache::new(UpdateConfig::default());

        let first = cache.get_or_select(&device, key(8)).to_vec();
        let second = cache.get_or_select(&device, key(8)).to_vec();

        assert_eq!(first, second);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_config_change_invalidates() {
        let device = accelerated();
        let mut cache = KernelCache::new(UpdateConfig::default());
        cache.get_or_select(&device, key(8));

        cache.set_config(UpdateConfig::default());
        assert_eq!(cache.len(), 1);

        cache.set_config(UpdateConfig {
            fixed_bl: false,
            ..Default::default()
        });
        assert!(cache.is_empty());
        let kernels = cache.get_or_select(&device, key(8));
        assert!(kernels.iter().all(|k| k.kind != crate::kernel::KernelKind::Batch64));
    }
}
