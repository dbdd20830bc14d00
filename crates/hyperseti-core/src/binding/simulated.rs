//! Host-memory stand-in for an accelerator
//!
//! Device allocations are plain byte vectors kept in a handle map, so a
//! "device" buffer really is a separate copy that host code cannot reach
//! without going through [`AcceleratorBinding::to_host`].

use super::{check_owner, next_binding_id, AcceleratorBinding};
use crate::buffer::{Buffer, DeviceHandle, Storage};
use crate::error::{Error, Result};
use hyperseti_tracing::performance::{record_transfer, TransferDirection};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

struct Arena {
    allocations: HashMap<u64, Vec<u8>>,
    next_id: u64,
}

/// Accelerator binding backed by host RAM
pub struct SimulatedDevice {
    id: u64,
    name: String,
    arena: Mutex<Arena>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        let id = next_binding_id();
        Self {
            id,
            name: format!("simulated:{id}"),
            arena: Mutex::new(Arena {
                allocations: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Number of live device allocations
    pub fn allocation_count(&self) -> usize {
        self.arena.lock().allocations.len()
    }

    /// Total bytes held in device allocations
    pub fn bytes_in_use(&self) -> usize {
        self.arena.lock().allocations.values().map(Vec::len).sum()
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AcceleratorBinding for SimulatedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn to_device(&self, buf: Buffer) -> Result<Buffer> {
        let (dtype, shape, storage) = buf.into_parts();
        let bytes = match storage {
            Storage::Host(bytes) => bytes,
            device @ Storage::Device(_) => return Buffer::from_parts(dtype, shape, device),
        };

        let start = Instant::now();
        let len_bytes = bytes.len();
        let handle = {
            let mut arena = self.arena.lock();
            let id = arena.next_id;
            arena.next_id += 1;
            arena.allocations.insert(id, bytes);
            DeviceHandle::new(self.id, id, len_bytes)
        };
        record_transfer(
            len_bytes,
            TransferDirection::HostToDevice,
            start.elapsed().as_micros() as u64,
        );

        Buffer::from_parts(dtype, shape, Storage::Device(handle))
    }

    fn to_host(&self, buf: Buffer) -> Result<Buffer> {
        let (dtype, shape, storage) = buf.into_parts();
        let handle = match storage {
            Storage::Device(handle) => handle,
            host @ Storage::Host(_) => return Buffer::from_parts(dtype, shape, host),
        };
        check_owner(self.id, &handle)?;

        let start = Instant::now();
        let bytes = self
            .arena
            .lock()
            .allocations
            .get(&handle.id())
            .cloned()
            .ok_or(Error::InvalidDeviceHandle(handle.id()))?;
        record_transfer(
            bytes.len(),
            TransferDirection::DeviceToHost,
            start.elapsed().as_micros() as u64,
        );

        Buffer::from_parts(dtype, shape, Storage::Host(bytes))
    }

    fn release(&self, handle: &DeviceHandle) -> Result<()> {
        check_owner(self.id, handle)?;
        self.arena
            .lock()
            .allocations
            .remove(&handle.id())
            .map(|_| ())
            .ok_or(Error::InvalidDeviceHandle(handle.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MemorySpace;

    #[test]
    fn round_trip_preserves_elements() {
        let device = SimulatedDevice::new();
        let data: Vec<f64> = (0..64).map(|i| i as f64 * 0.5 - 3.0).collect();
        let host = Buffer::from_slice(&data, &[8, 8]).unwrap();

        let on_device = device.to_device(host.clone()).unwrap();
        assert_eq!(on_device.space(), MemorySpace::Device);
        assert_eq!(on_device.shape(), &[8, 8]);
        assert_eq!(device.allocation_count(), 1);
        assert_eq!(device.bytes_in_use(), 64 * 8);

        let back = device.to_host(on_device).unwrap();
        assert_eq!(back, host);
        assert_eq!(back.to_vec::<f64>().unwrap(), data);
    }

    #[test]
    fn already_placed_buffers_are_not_copied() {
        let device = SimulatedDevice::new();
        let host = Buffer::vector(&[1.0f32, 2.0]);
        let same = device.to_host(host.clone()).unwrap();
        assert_eq!(same, host);

        let on_device = device.to_device(host).unwrap();
        let again = device.to_device(on_device.clone()).unwrap();
        assert_eq!(again.device_handle(), on_device.device_handle());
        assert_eq!(device.allocation_count(), 1);
    }

    #[test]
    fn rejects_foreign_and_released_handles() {
        let a = SimulatedDevice::new();
        let b = SimulatedDevice::new();
        let on_a = a.to_device(Buffer::vector(&[7u8; 4])).unwrap();

        assert!(matches!(b.to_host(on_a.clone()), Err(Error::ForeignAllocation { .. })));

        let handle = *on_a.device_handle().unwrap();
        a.release(&handle).unwrap();
        assert_eq!(a.allocation_count(), 0);
        assert!(matches!(a.to_host(on_a), Err(Error::InvalidDeviceHandle(_))));
        assert!(matches!(a.release(&handle), Err(Error::InvalidDeviceHandle(_))));
    }
}
