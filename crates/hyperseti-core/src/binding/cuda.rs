//! CUDA binding: device buffers live in `cudarc` allocations

use super::{check_owner, next_binding_id, AcceleratorBinding};
use crate::buffer::{Buffer, DeviceHandle, Storage};
use crate::error::{Error, Result};
use cudarc::driver::{CudaDevice as DriverDevice, CudaSlice};
use hyperseti_tracing::performance::{record_transfer, TransferDirection};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

struct Allocations {
    slices: HashMap<u64, CudaSlice<u8>>,
    next_id: u64,
}

/// Accelerator binding for one CUDA device
pub struct CudaDevice {
    id: u64,
    name: String,
    device: Arc<DriverDevice>,
    allocations: Mutex<Allocations>,
}

impl CudaDevice {
    /// Open the device with the given ordinal.
    pub fn new(ordinal: usize) -> Result<Self> {
        let device = DriverDevice::new(ordinal)
            .map_err(|e| Error::BackendUnavailable(format!("failed to open CUDA device {ordinal}: {e}")))?;
        tracing::info!(ordinal, "opened CUDA device");
        Ok(Self {
            id: next_binding_id(),
            name: format!("cuda:{ordinal}"),
            device,
            allocations: Mutex::new(Allocations {
                slices: HashMap::new(),
                next_id: 1,
            }),
        })
    }
}

impl AcceleratorBinding for CudaDevice {
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
        let slice = self
            .device
            .htod_sync_copy(&bytes)
            .map_err(|e| Error::transfer(format!("CUDA host-to-device copy failed: {e}")))?;
        record_transfer(
            bytes.len(),
            TransferDirection::HostToDevice,
            start.elapsed().as_micros() as u64,
        );

        let handle = {
            let mut allocations = self.allocations.lock();
            let id = allocations.next_id;
            allocations.next_id += 1;
            allocations.slices.insert(id, slice);
            DeviceHandle::new(self.id, id, bytes.len())
        };
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
        let bytes = {
            let allocations = self.allocations.lock();
            let slice = allocations
                .slices
                .get(&handle.id())
                .ok_or(Error::InvalidDeviceHandle(handle.id()))?;
            self.device
                .dtoh_sync_copy(slice)
                .map_err(|e| Error::transfer(format!("CUDA device-to-host copy failed: {e}")))?
        };
        record_transfer(
            bytes.len(),
            TransferDirection::DeviceToHost,
            start.elapsed().as_micros() as u64,
        );

        Buffer::from_parts(dtype, shape, Storage::Host(bytes))
    }

    fn release(&self, handle: &DeviceHandle) -> Result<()> {
        check_owner(self.id, handle)?;
        // CUDA memory is freed when the CudaSlice is dropped
        self.allocations
            .lock()
            .slices
            .remove(&handle.id())
            .map(|_| ())
            .ok_or(Error::InvalidDeviceHandle(handle.id()))
    }
}
