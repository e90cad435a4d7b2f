//! Vulkan surface management
//!
//! Wraps the presentation surface created through the windowing collaborator
//! and the surface-capability queries the device and swapchain layers need.

use ash::extensions::khr;
use ash::{vk, Entry, Instance};

use crate::context::{VulkanError, VulkanResult};
use crate::window::SurfaceProvider;

/// Vulkan surface wrapper for presentation
pub struct Surface {
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
}

impl Surface {
    /// Create the native surface through the windowing collaborator.
    pub fn new(
        provider: &mut dyn SurfaceProvider,
        entry: &Entry,
        instance: &Instance,
    ) -> VulkanResult<Self> {
        let surface_loader = khr::Surface::new(entry, instance);

        let surface = provider
            .create_surface(instance.handle())
            .map_err(|e| VulkanError::SurfaceCreation(e.to_string()))?;

        Ok(Self {
            surface_loader,
            surface,
        })
    }

    /// Get the underlying surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get the surface loader
    pub fn loader(&self) -> &khr::Surface {
        &self.surface_loader
    }

    /// Get current surface capabilities for a physical device
    pub fn capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VulkanResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .map_err(VulkanError::Api)
        }
    }

    /// Get supported surface formats for a physical device
    pub fn formats(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VulkanResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .map_err(VulkanError::Api)
        }
    }

    /// Get supported present modes for a physical device
    pub fn present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VulkanResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
                .map_err(VulkanError::Api)
        }
    }

    /// Check if a queue family supports presentation to this surface
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> VulkanResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(physical_device, queue_family_index, self.surface)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
