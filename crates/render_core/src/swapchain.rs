//! Vulkan swapchain management
//!
//! Handles swapchain creation and recreation together with the per-image
//! views and framebuffers. The three per-image sequences always have equal
//! length, equal to the queried image count; recreation with an unchanged
//! image count reuses the existing storage.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Instance};

use crate::context::{PhysicalDeviceInfo, VulkanError, VulkanResult};
use crate::surface::Surface;

/// Fixed surface format used for the swapchain and render pass.
///
/// Not yet negotiated from the queried format list; the supported formats are
/// enumerated for diagnostics only.
pub const SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Number of images requested on top of the capability minimum.
const EXTRA_IMAGES: u32 = 3;

/// Requested minimum image count: capability minimum plus a headroom of
/// three, clamped to the capability maximum when one is declared (0 means
/// unbounded).
fn select_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + EXTRA_IMAGES;
    if caps.max_image_count != 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// Clear per-image storage, reusing the allocation when the count is
/// unchanged and replacing it otherwise.
fn reset_image_storage<T>(storage: &mut Vec<T>, prev_count: usize, new_count: usize) {
    if new_count == prev_count {
        storage.clear();
    } else {
        *storage = Vec::with_capacity(new_count);
    }
}

/// Swapchain state with its per-image views and framebuffers
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    surface_caps: vk::SurfaceCapabilitiesKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
}

impl Swapchain {
    /// Create the swapchain and its per-image resources.
    pub fn new(
        instance: &Instance,
        device: Device,
        surface: &Surface,
        physical_device: &PhysicalDeviceInfo,
        render_pass: vk::RenderPass,
    ) -> VulkanResult<Self> {
        let loader = SwapchainLoader::new(instance, &device);

        let mut swapchain = Self {
            device,
            loader,
            swapchain: vk::SwapchainKHR::null(),
            format: SURFACE_FORMAT,
            extent: vk::Extent2D::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            surface_caps: vk::SurfaceCapabilitiesKHR::default(),
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
        };
        swapchain.recreate(surface, physical_device, render_pass)?;
        Ok(swapchain)
    }

    /// (Re)create the swapchain against the current surface state.
    ///
    /// Re-entrant: on recreation the previous handle is passed as
    /// `old_swapchain` so the driver can reuse resources, and the per-image
    /// storage is reused when the image count did not change.
    pub fn recreate(
        &mut self,
        surface: &Surface,
        physical_device: &PhysicalDeviceInfo,
        render_pass: vk::RenderPass,
    ) -> VulkanResult<()> {
        let present_modes = surface
            .present_modes(physical_device.device)
            .map_err(as_swapchain_error)?;
        log::debug!("Supported surface present modes: {}", present_modes.len());
        for (i, mode) in present_modes.iter().enumerate() {
            log::debug!("\t{}: {:?}", i, mode);
        }

        let surface_formats = surface
            .formats(physical_device.device)
            .map_err(as_swapchain_error)?;
        log::debug!("Supported surface formats: {}", surface_formats.len());
        for (i, format) in surface_formats.iter().enumerate() {
            log::debug!("\t{}: {:?} {:?}", i, format.format, format.color_space);
        }

        self.surface_caps = surface
            .capabilities(physical_device.device)
            .map_err(as_swapchain_error)?;

        self.extent = self.surface_caps.current_extent;
        self.present_mode = vk::PresentModeKHR::FIFO;
        let min_image_count = select_image_count(&self.surface_caps);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(min_image_count)
            .image_format(self.format.format)
            .image_color_space(self.format.color_space)
            .image_extent(self.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(self.surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(self.swapchain);

        let new_swapchain = unsafe {
            self.loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::SwapchainCreation)?
        };

        // The old per-image objects reference the replaced swapchain
        let prev_count = self.images.len();
        unsafe {
            self.release_per_image_objects();
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
            }
        }
        self.swapchain = new_swapchain;

        let images = unsafe {
            self.loader
                .get_swapchain_images(self.swapchain)
                .map_err(VulkanError::SwapchainCreation)?
        };
        let image_count = images.len();
        if image_count != prev_count && prev_count != 0 {
            log::debug!("Swapchain image count changed: {prev_count} -> {image_count}");
        }

        reset_image_storage(&mut self.images, prev_count, image_count);
        reset_image_storage(&mut self.image_views, prev_count, image_count);
        reset_image_storage(&mut self.framebuffers, prev_count, image_count);
        self.images.extend_from_slice(&images);

        for &image in &self.images {
            let view_create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe {
                self.device
                    .create_image_view(&view_create_info, None)
                    .map_err(VulkanError::SwapchainCreation)?
            };
            self.image_views.push(view);

            let attachments = [view];
            let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);

            let framebuffer = unsafe {
                self.device
                    .create_framebuffer(&framebuffer_create_info, None)
                    .map_err(VulkanError::SwapchainCreation)?
            };
            self.framebuffers.push(framebuffer);
        }

        debug_assert_eq!(self.images.len(), self.image_views.len());
        debug_assert_eq!(self.images.len(), self.framebuffers.len());

        log::info!(
            "Swapchain {}x{} {:?}, {} images ({} requested)",
            self.extent.width,
            self.extent.height,
            self.format.format,
            image_count,
            min_image_count,
        );

        Ok(())
    }

    /// Destroy the per-image views and framebuffers, leaving the vectors
    /// empty. Does not touch `images`; those are owned by the swapchain.
    unsafe fn release_per_image_objects(&mut self) {
        for view in self.image_views.drain(..) {
            self.device.destroy_image_view(view, None);
        }
        for framebuffer in self.framebuffers.drain(..) {
            self.device.destroy_framebuffer(framebuffer, None);
        }
        self.images.clear();
    }

    /// Get the swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Get the swapchain loader
    pub fn loader(&self) -> &SwapchainLoader {
        &self.loader
    }

    /// Get the current extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get the surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get the present mode
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Get the surface capability snapshot from the last (re)creation
    pub fn surface_caps(&self) -> &vk::SurfaceCapabilitiesKHR {
        &self.surface_caps
    }

    /// Get the current image count
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Get the swapchain images
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Get the per-image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Get the framebuffer for a swapchain image index
    pub fn framebuffer(&self, image_index: usize) -> vk::Framebuffer {
        self.framebuffers[image_index]
    }

    /// Get the per-image framebuffers
    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.release_per_image_objects();
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
            }
        }
    }
}

fn as_swapchain_error(err: VulkanError) -> VulkanError {
    match err {
        VulkanError::Api(result) => VulkanError::SwapchainCreation(result),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[test]
    fn requests_three_images_above_minimum() {
        assert_eq!(select_image_count(&caps(2, 0)), 5);
        assert_eq!(select_image_count(&caps(1, 0)), 4);
    }

    #[test]
    fn clamps_to_declared_maximum() {
        assert_eq!(select_image_count(&caps(2, 3)), 3);
        assert_eq!(select_image_count(&caps(2, 8)), 5);
    }

    #[test]
    fn zero_maximum_means_unbounded() {
        assert_eq!(select_image_count(&caps(8, 0)), 11);
    }

    #[test]
    fn unchanged_count_reuses_storage() {
        let mut storage = vec![vk::Image::null(); 3];
        let ptr = storage.as_ptr();

        reset_image_storage(&mut storage, 3, 3);

        assert!(storage.is_empty());
        assert_eq!(storage.capacity(), 3);
        assert_eq!(storage.as_ptr(), ptr);
    }

    #[test]
    fn changed_count_replaces_storage() {
        let mut storage = vec![vk::Image::null(); 3];

        reset_image_storage(&mut storage, 3, 5);

        assert!(storage.is_empty());
        assert!(storage.capacity() >= 5);
    }

    #[test]
    fn initial_population_allocates() {
        let mut storage: Vec<vk::ImageView> = Vec::new();

        reset_image_storage(&mut storage, 0, 4);

        assert!(storage.is_empty());
        assert!(storage.capacity() >= 4);
    }
}
