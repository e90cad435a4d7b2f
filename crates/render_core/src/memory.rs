//! Minimal device memory allocation
//!
//! One native allocation per call; no pooling or coalescing. A production
//! allocator would pool above this primitive.

use ash::{vk, Device};

use crate::context::{VulkanError, VulkanResult};

/// Find the lowest-indexed memory type set in `type_bits` whose property
/// flags are a superset of `flags`.
///
/// Returns `None` when no type qualifies.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        type_bits & (1 << i) != 0
            && memory_properties.memory_types[i as usize]
                .property_flags
                .contains(flags)
    })
}

/// A single device memory allocation, freed exactly once on drop
///
/// Each allocation is independently owned by its caller; the caller must
/// ensure no GPU work references the memory when the allocation drops.
pub struct DeviceAllocation {
    device: Device,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl DeviceAllocation {
    /// Allocate memory satisfying `requirements` with the given properties.
    ///
    /// The type lookup is checked before any native call; an unsatisfiable
    /// request fails with [`VulkanError::NoSuitableMemoryType`].
    pub fn allocate(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        requirements: vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let memory_type_index =
            find_memory_type(memory_properties, requirements.memory_type_bits, flags).ok_or(
                VulkanError::NoSuitableMemoryType {
                    type_bits: requirements.memory_type_bits,
                    flags,
                },
            )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            device
                .allocate_memory(&alloc_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            memory,
            size: requirements.size,
        })
    }

    /// Get the device memory handle
    pub fn handle(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Get the allocation size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for DeviceAllocation {
    fn drop(&mut self) {
        unsafe {
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &property_flags) in flags.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags,
                heap_index: 0,
            };
        }
        props
    }

    #[test]
    fn finds_lowest_matching_index() {
        let props = table(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let found = find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert_eq!(found, Some(1));
    }

    #[test]
    fn respects_type_bitmask() {
        let props = table(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);

        // Type 0 qualifies by flags but is excluded by the mask.
        let found = find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert_eq!(found, Some(1));
    }

    #[test]
    fn requires_flag_superset() {
        let props = table(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type(&props, 0b11, wanted), Some(1));
    }

    #[test]
    fn returns_none_when_nothing_qualifies() {
        let props = table(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);

        // No type carries LAZILY_ALLOCATED.
        let found = find_memory_type(&props, 0b11, vk::MemoryPropertyFlags::LAZILY_ALLOCATED);
        assert_eq!(found, None);

        // Empty mask excludes every type regardless of flags.
        let found = find_memory_type(&props, 0, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert_eq!(found, None);
    }

    #[test]
    fn empty_table_yields_none() {
        let props = table(&[]);
        assert_eq!(
            find_memory_type(&props, u32::MAX, vk::MemoryPropertyFlags::empty()),
            None
        );
    }
}
