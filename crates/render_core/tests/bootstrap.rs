//! Bring-up decision logic tests that run without a Vulkan driver.

use ash::vk;
use render_core::{find_memory_type, RendererConfig, SurfaceError, SurfaceProvider, VulkanError};

/// Surface provider double that fails the extension query.
struct BrokenProvider;

impl SurfaceProvider for BrokenProvider {
    fn required_extensions(&self) -> Result<Vec<String>, SurfaceError> {
        Err(SurfaceError::ExtensionQueryFailed)
    }

    fn create_surface(&mut self, _instance: vk::Instance) -> Result<vk::SurfaceKHR, SurfaceError> {
        Ok(vk::SurfaceKHR::null())
    }

    fn framebuffer_extent(&self) -> (u32, u32) {
        (640, 480)
    }
}

#[test]
fn extension_query_failure_aborts_before_instance_creation() {
    let mut provider = BrokenProvider;
    let config = RendererConfig::default();

    let result = render_core::VulkanContext::new(&mut provider, &config);

    assert!(matches!(result, Err(VulkanError::ExtensionQuery(_))));
}

#[test]
fn launch_args_drive_validation_for_the_context_lifetime() {
    let config = RendererConfig::from_args(["engine", "-vkdebug", "+map start"]);
    assert!(config.validation);

    let config = RendererConfig::from_args(["engine", "+map start"]);
    assert!(!config.validation);
}

#[test]
fn staging_allocation_request_is_satisfiable_on_a_typical_device() {
    // Device-local type first, then the host-visible one staging wants.
    let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
        memory_type_count: 2,
        ..Default::default()
    };
    memory_properties.memory_types[0] = vk::MemoryType {
        property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        heap_index: 0,
    };
    memory_properties.memory_types[1] = vk::MemoryType {
        property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT,
        heap_index: 1,
    };

    let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
    assert_eq!(find_memory_type(&memory_properties, 0b11, wanted), Some(1));

    // A device exposing only device-local memory cannot satisfy staging.
    memory_properties.memory_type_count = 1;
    assert_eq!(find_memory_type(&memory_properties, 0b1, wanted), None);
}
