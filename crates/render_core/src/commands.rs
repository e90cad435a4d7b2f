//! Command pool and primary command buffer management
//!
//! The pool is bound to the queue family actually selected during device
//! bring-up, not a hardcoded index.

use ash::{vk, Device};

use crate::context::{VulkanError, VulkanResult};

/// Command pool wrapper owning the primary command buffer
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
    primary: vk::CommandBuffer,
}

impl CommandPool {
    /// Create a transient, individually-resettable command pool on the given
    /// queue family and allocate one primary command buffer from it.
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::CommandPoolCreation)?
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }.map_err(|e| {
            unsafe { device.destroy_command_pool(command_pool, None) };
            VulkanError::CommandPoolCreation(e)
        })?;

        Ok(Self {
            device,
            command_pool,
            primary: buffers[0],
        })
    }

    /// Allocate additional primary command buffers from the pool
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Get the primary command buffer allocated at creation
    pub fn primary_buffer(&self) -> vk::CommandBuffer {
        self.primary
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Outstanding command buffers must be finished before the pool goes
            let _ = self.device.device_wait_idle();
            // Destroying the pool frees all buffers allocated from it
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
