//! Buffer management
//!
//! General buffer creation bound to a single device memory allocation, plus
//! the baseline staging buffer the bring-up sequence ends with.

use ash::{vk, Device};
use std::mem;

use crate::context::{VulkanError, VulkanResult};
use crate::memory::DeviceAllocation;

/// Buffer with its backing memory allocation
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    allocation: DeviceAllocation,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer and bind it to a fresh device memory allocation.
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let allocation =
            DeviceAllocation::allocate(device.clone(), memory_properties, requirements, properties)
                .map_err(|e| {
                    unsafe { device.destroy_buffer(buffer, None) };
                    e
                })?;

        unsafe {
            if let Err(e) = device.bind_buffer_memory(buffer, allocation.handle(), 0) {
                device.destroy_buffer(buffer, None);
                return Err(VulkanError::Api(e));
            }
        }

        Ok(Self {
            device,
            buffer,
            allocation,
            size,
        })
    }

    /// Map the backing memory for host access
    pub fn map_memory(&self) -> VulkanResult<*mut std::ffi::c_void> {
        unsafe {
            self.device
                .map_memory(
                    self.allocation.handle(),
                    0,
                    self.size,
                    vk::MemoryMapFlags::empty(),
                )
                .map_err(VulkanError::Api)
        }
    }

    /// Unmap the backing memory
    pub fn unmap_memory(&self) {
        unsafe {
            self.device.unmap_memory(self.allocation.handle());
        }
    }

    /// Copy `data` into the buffer through a transient mapping.
    ///
    /// Writes larger than the buffer fail with
    /// [`VulkanError::WriteTooLarge`] before anything is mapped.
    pub fn write_data<T>(&self, data: &[T]) -> VulkanResult<()> {
        let size = check_write_size(data.len() * mem::size_of::<T>(), self.size)?;
        let data_ptr = self.map_memory()?;

        unsafe {
            let src_ptr = data.as_ptr().cast::<std::ffi::c_void>();
            std::ptr::copy_nonoverlapping(src_ptr, data_ptr, size);
        }

        self.unmap_memory();
        Ok(())
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get the buffer size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            // The allocation field frees its memory after the buffer is gone
            self.device.destroy_buffer(self.buffer, None);
        }
    }
}

/// Reject host writes that do not fit the destination buffer.
fn check_write_size(requested: usize, capacity: vk::DeviceSize) -> VulkanResult<usize> {
    if requested as vk::DeviceSize > capacity {
        return Err(VulkanError::WriteTooLarge {
            requested: requested as vk::DeviceSize,
            capacity,
        });
    }
    Ok(requested)
}

/// Host-visible staging buffer for upload traffic
pub struct StagingBuffer {
    buffer: Buffer,
}

impl StagingBuffer {
    /// Create a host-visible, host-coherent transfer-source buffer.
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            device,
            memory_properties,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        Ok(Self { buffer })
    }

    /// Copy `data` into the staging buffer.
    ///
    /// Writes larger than the staging buffer are rejected.
    pub fn write_data<T>(&self, data: &[T]) -> VulkanResult<()> {
        self.buffer.write_data(data)
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get the buffer size
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_writes_up_to_capacity() {
        assert_eq!(check_write_size(0, 16).unwrap(), 0);
        assert_eq!(check_write_size(16, 16).unwrap(), 16);
    }

    #[test]
    fn rejects_write_larger_than_buffer() {
        let result = check_write_size(17, 16);
        assert!(matches!(
            result,
            Err(VulkanError::WriteTooLarge {
                requested: 17,
                capacity: 16,
            })
        ));

        // A slice one element past a full staging buffer must not map.
        let staging_size = 16 * 1024 * 1024;
        let oversize = staging_size as usize + mem::size_of::<u32>();
        assert!(check_write_size(oversize, staging_size).is_err());
    }
}
