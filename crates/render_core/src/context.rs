//! Vulkan context management
//!
//! Owns the instance, selected device, and every baseline resource the
//! rendering layers build on. Creation order is instance, debug messenger,
//! surface, physical device, logical device, render pass, swapchain, command
//! pool, staging buffer; teardown mirrors it exactly through field drop order.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Entry, Instance};
use std::ffi::{CStr, CString};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::buffer::StagingBuffer;
use crate::commands::CommandPool;
use crate::config::RendererConfig;
use crate::loader::{load_proc_table, ProcEntry};
use crate::memory::DeviceAllocation;
use crate::render_pass::RenderPass;
use crate::surface::Surface;
use crate::swapchain::Swapchain;
use crate::sync::{Fence, Semaphore};
use crate::window::SurfaceProvider;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// The Vulkan loader library could not be loaded
    #[error("cannot load Vulkan library: {0}")]
    LibraryLoad(String),

    /// The surface provider could not enumerate required instance extensions
    #[error("cannot query required surface extensions: {0}")]
    ExtensionQuery(String),

    /// Instance creation returned a non-success status
    #[error("instance creation failed: {0:?}")]
    InstanceCreation(vk::Result),

    /// Surface creation through the windowing collaborator failed
    #[error("surface creation failed: {0}")]
    SurfaceCreation(String),

    /// No physical device offers a graphics queue family that can present
    #[error("no physical device offers a graphics queue family with present support")]
    NoSuitableDevice,

    /// Logical device creation returned a non-success status
    #[error("device creation failed: {0:?}")]
    DeviceCreation(vk::Result),

    /// Render pass creation returned a non-success status
    #[error("render pass creation failed: {0:?}")]
    RenderPassCreation(vk::Result),

    /// Swapchain creation or a call in its bring-up path failed
    #[error("swapchain creation failed: {0:?}")]
    SwapchainCreation(vk::Result),

    /// Command pool creation or command buffer allocation failed
    #[error("command pool creation failed: {0:?}")]
    CommandPoolCreation(vk::Result),

    /// A mandatory entry point could not be resolved
    #[error("mandatory function {0} was not loaded")]
    FunctionNotFound(String),

    /// A shader file could not be read
    #[error("cannot read shader file {path}: {source}")]
    ShaderLoad {
        /// Path of the shader file that failed to load
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Shader bytecode violates the 4-byte SPIR-V size requirement
    #[error("shader bytecode length {len} is not a multiple of 4 bytes")]
    ShaderAlignment {
        /// Actual byte length of the rejected bytecode
        len: usize,
    },

    /// Host write larger than the destination buffer
    #[error("write of {requested} bytes exceeds buffer capacity of {capacity} bytes")]
    WriteTooLarge {
        /// Requested write size in bytes
        requested: vk::DeviceSize,
        /// Destination buffer capacity in bytes
        capacity: vk::DeviceSize,
    },

    /// No memory type satisfies the requirement bitmask and property flags
    #[error("no memory type satisfies mask {type_bits:#x} with flags {flags:?}")]
    NoSuitableMemoryType {
        /// Memory type bitmask from the resource requirements
        type_bits: u32,
        /// Requested memory property flags
        flags: vk::MemoryPropertyFlags,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

const VALIDATION_LAYER: &[u8] = b"VK_LAYER_KHRONOS_validation\0";

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
}

impl VulkanInstance {
    /// Create a new instance with the surface provider's required extensions.
    ///
    /// When `config.validation` is set, the debug utils extension and the
    /// Khronos validation layer are enabled in addition.
    pub fn new(required_extensions: &[String], config: &RendererConfig) -> VulkanResult<Self> {
        let validation = config.validation;
        let entry =
            unsafe { Entry::load() }.map_err(|e| VulkanError::LibraryLoad(e.to_string()))?;

        match entry.try_enumerate_instance_version() {
            Ok(Some(version)) => log::info!(
                "Vulkan instance version {}.{}.{}",
                vk::api_version_major(version),
                vk::api_version_minor(version),
                vk::api_version_patch(version)
            ),
            // Pre-1.1 loaders do not expose the version query.
            Ok(None) => log::info!("Vulkan instance version 1.0.0"),
            Err(e) => return Err(VulkanError::Api(e)),
        }

        let app_name = CString::new(config.app_name.as_str()).unwrap_or_default();
        let engine_name = CString::new(config.engine_name.as_str()).unwrap_or_default();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let extensions = assemble_instance_extensions(required_extensions, validation);
        log::debug!("Requesting {} instance extensions:", extensions.len());
        for (i, ext) in extensions.iter().enumerate() {
            log::debug!("\t{}: {}", i, ext.to_string_lossy());
        }
        let extension_ptrs: Vec<*const i8> = extensions.iter().map(|ext| ext.as_ptr()).collect();

        let layer_ptrs: Vec<*const i8> = if validation {
            log::warn!("Using Vulkan validation layers, expect severely degraded performance");
            vec![VALIDATION_LAYER.as_ptr().cast()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::InstanceCreation)?
        };

        Ok(Self { entry, instance })
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            self.instance.destroy_instance(None);
        }
    }
}

/// Assemble the instance extension list: surface-provider extensions plus the
/// debug utils extension when validation is enabled.
fn assemble_instance_extensions(required: &[String], validation: bool) -> Vec<CString> {
    let mut extensions: Vec<CString> = required
        .iter()
        .filter_map(|ext| CString::new(ext.as_str()).ok())
        .collect();
    if validation {
        extensions.push(DebugUtils::name().to_owned());
    }
    extensions
}

/// Debug utils messenger with RAII cleanup
///
/// Probed and installed only when validation is enabled; the extension entry
/// points are resolved through the generic proc table loader first, so a
/// loader without the extension degrades to a warning instead of an error.
pub struct DebugMessenger {
    debug_utils: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    /// Probe the debug utils entry points and install the messenger.
    ///
    /// Returns `Ok(None)` when the messenger functions are unavailable.
    pub fn install(entry: &Entry, instance: &Instance) -> VulkanResult<Option<Self>> {
        let procs = [
            ProcEntry::optional(
                CStr::from_bytes_with_nul(b"vkCreateDebugUtilsMessengerEXT\0").unwrap(),
            ),
            ProcEntry::optional(
                CStr::from_bytes_with_nul(b"vkDestroyDebugUtilsMessengerEXT\0").unwrap(),
            ),
        ];
        let instance_handle = instance.handle();
        let slots = load_proc_table(
            |name| unsafe {
                (entry.static_fn().get_instance_proc_addr)(instance_handle, name.as_ptr())
            },
            &procs,
        )?;

        if slots.iter().any(Option::is_none) {
            log::warn!("Vulkan debug utils messenger is not available");
            return Ok(None);
        }

        let debug_utils = DebugUtils::new(entry, instance);
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Some(Self {
            debug_utils,
            messenger,
        }))
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe {
            self.debug_utils
                .destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

/// Validation layer callback; surfaces only error-severity messages.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();
        log::error!("Validation: {}", message);
    }
    vk::FALSE
}

/// Selected physical device with queried property snapshots
///
/// Immutable after device creation.
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties snapshot
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory properties snapshot used by the allocator
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family offering graphics and present support
    pub queue_family_index: u32,
}

impl PhysicalDeviceInfo {
    /// Select the first physical device offering a graphics queue family with
    /// present support against the surface.
    ///
    /// Selection is first-match, not best-match; no qualifying device is a
    /// hard failure.
    pub fn select(instance: &Instance, surface: &Surface) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        log::debug!("Have {} physical devices:", devices.len());
        for device in devices {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            log_device(&properties);

            let queue_families =
                unsafe { instance.get_physical_device_queue_family_properties(device) };
            let picked = pick_queue_family(&queue_families, |index| {
                surface.supports_present(device, index)
            })?;

            if let Some(queue_family_index) = picked {
                let memory_properties =
                    unsafe { instance.get_physical_device_memory_properties(device) };
                log::info!(
                    "Picked device: {} (queue family {})",
                    device_name(&properties),
                    queue_family_index
                );
                return Ok(Self {
                    device,
                    properties,
                    memory_properties,
                    queue_family_index,
                });
            }
        }

        Err(VulkanError::NoSuitableDevice)
    }
}

/// First queue family advertising graphics capability and present support.
fn pick_queue_family(
    queue_families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> VulkanResult<bool>,
) -> VulkanResult<Option<u32>> {
    for (index, family) in queue_families.iter().enumerate() {
        let index = index as u32;
        if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            continue;
        }
        if supports_present(index)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn device_name(properties: &vk::PhysicalDeviceProperties) -> String {
    unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned()
    }
}

fn log_device(properties: &vk::PhysicalDeviceProperties) {
    log::debug!(
        "\t{:04x}:{:04x} {:?} {} driver {}.{}.{} api {}.{}.{}",
        properties.vendor_id,
        properties.device_id,
        properties.device_type,
        device_name(properties),
        vk::api_version_major(properties.driver_version),
        vk::api_version_minor(properties.driver_version),
        vk::api_version_patch(properties.driver_version),
        vk::api_version_major(properties.api_version),
        vk::api_version_minor(properties.api_version),
        vk::api_version_patch(properties.api_version),
    );
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// The single graphics+present queue
    pub queue: vk::Queue,
    /// Queue family the queue was created against
    pub queue_family_index: u32,
}

impl LogicalDevice {
    /// Create the logical device with one queue and the swapchain extension.
    pub fn new(instance: &Instance, physical_device: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let priorities = [1.0];
        let queue_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(physical_device.queue_family_index)
            .queue_priorities(&priorities)
            .build();
        let queue_infos = [queue_info];

        let required_extensions = [SwapchainLoader::name().as_ptr()];
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions);

        let device = unsafe {
            instance
                .create_device(physical_device.device, &create_info, None)
                .map_err(VulkanError::DeviceCreation)?
        };

        let queue = unsafe { device.get_device_queue(physical_device.queue_family_index, 0) };

        Ok(Self {
            device,
            queue,
            queue_family_index: physical_device.queue_family_index,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            // Ensure no work references device children before destruction
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Core Vulkan context owning all bootstrap resources
///
/// Field order is teardown order: staging buffer, command pool, swapchain
/// (views and framebuffers first), render pass, device, debug messenger,
/// surface, instance.
pub struct VulkanContext {
    staging: StagingBuffer,
    commands: CommandPool,
    swapchain: Swapchain,
    render_pass: RenderPass,
    device: LogicalDevice,
    physical_device: PhysicalDeviceInfo,
    messenger: Option<DebugMessenger>,
    surface: Surface,
    instance: VulkanInstance,
    validation: bool,
}

impl VulkanContext {
    /// Bring up the full Vulkan core against the given surface provider.
    ///
    /// A failure at any step drops everything acquired so far in reverse
    /// order before the error propagates.
    pub fn new(provider: &mut dyn SurfaceProvider, config: &RendererConfig) -> VulkanResult<Self> {
        let validation = config.validation;

        let required_extensions = provider
            .required_extensions()
            .map_err(|e| VulkanError::ExtensionQuery(e.to_string()))?;

        let instance = VulkanInstance::new(&required_extensions, config)?;

        let messenger = if validation {
            DebugMessenger::install(&instance.entry, &instance.instance)?
        } else {
            None
        };

        let surface = Surface::new(provider, &instance.entry, &instance.instance)?;

        let physical_device = PhysicalDeviceInfo::select(&instance.instance, &surface)?;

        let device = LogicalDevice::new(&instance.instance, &physical_device)?;

        let render_pass = RenderPass::new_present_pass(
            device.device.clone(),
            crate::swapchain::SURFACE_FORMAT.format,
        )?;

        let swapchain = Swapchain::new(
            &instance.instance,
            device.device.clone(),
            &surface,
            &physical_device,
            render_pass.handle(),
        )?;

        let commands = CommandPool::new(device.device.clone(), device.queue_family_index)?;

        let staging = StagingBuffer::new(
            device.device.clone(),
            &physical_device.memory_properties,
            config.staging_size,
        )?;

        Ok(Self {
            staging,
            commands,
            swapchain,
            render_pass,
            device,
            physical_device,
            messenger,
            surface,
            instance,
            validation,
        })
    }

    /// Recreate the swapchain, e.g. after a window resize.
    ///
    /// Waits for the device to go idle first; the per-image storage is reused
    /// when the image count did not change.
    pub fn recreate_swapchain(&mut self) -> VulkanResult<()> {
        unsafe {
            self.device
                .device
                .device_wait_idle()
                .map_err(VulkanError::Api)?;
        }
        self.swapchain.recreate(
            &self.surface,
            &self.physical_device,
            self.render_pass.handle(),
        )
    }

    /// Create a semaphore owned by the caller.
    pub fn create_semaphore(&self) -> VulkanResult<Semaphore> {
        Semaphore::new(self.device.device.clone())
    }

    /// Create a fence owned by the caller.
    pub fn create_fence(&self, signaled: bool) -> VulkanResult<Fence> {
        Fence::new(self.device.device.clone(), signaled)
    }

    /// Allocate device memory satisfying the requirements and property flags.
    pub fn allocate_device_memory(
        &self,
        requirements: vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> VulkanResult<DeviceAllocation> {
        DeviceAllocation::allocate(
            self.device.device.clone(),
            &self.physical_device.memory_properties,
            requirements,
            flags,
        )
    }

    /// Get a reference to the Vulkan entry
    pub fn entry(&self) -> &Entry {
        &self.instance.entry
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the raw device handle
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// Get the logical device
    pub fn device(&self) -> &LogicalDevice {
        &self.device
    }

    /// Get the physical device record
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Get the graphics+present queue
    pub fn queue(&self) -> vk::Queue {
        self.device.queue
    }

    /// Get the selected queue family index
    pub fn queue_family_index(&self) -> u32 {
        self.device.queue_family_index
    }

    /// Get the presentation surface
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Get the render pass
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Get the swapchain state
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Get the command pool
    pub fn command_pool(&self) -> &CommandPool {
        &self.commands
    }

    /// Get the staging buffer
    pub fn staging(&self) -> &StagingBuffer {
        &self.staging
    }

    /// Whether validation layers were enabled at startup
    pub fn validation(&self) -> bool {
        self.validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn picks_first_graphics_family_with_present_support() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let picked = pick_queue_family(&families, |_| Ok(true)).unwrap();
        assert_eq!(picked, Some(1));
    }

    #[test]
    fn skips_graphics_families_without_present_support() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let picked = pick_queue_family(&families, |index| Ok(index == 1)).unwrap();
        assert_eq!(picked, Some(1));
    }

    #[test]
    fn reports_no_family_when_nothing_qualifies() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
        ];
        let picked = pick_queue_family(&families, |_| Ok(true)).unwrap();
        assert_eq!(picked, None);

        let graphics_only = [family(vk::QueueFlags::GRAPHICS)];
        let picked = pick_queue_family(&graphics_only, |_| Ok(false)).unwrap();
        assert_eq!(picked, None);
    }

    #[test]
    fn present_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = pick_queue_family(&families, |_| {
            Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))
        });
        assert!(matches!(result, Err(VulkanError::Api(_))));
    }

    #[test]
    fn validation_appends_debug_utils_extension() {
        let required = vec!["VK_KHR_surface".to_owned(), "VK_KHR_xcb_surface".to_owned()];

        let plain = assemble_instance_extensions(&required, false);
        assert_eq!(plain.len(), 2);

        let with_debug = assemble_instance_extensions(&required, true);
        assert_eq!(with_debug.len(), 3);
        assert_eq!(
            with_debug.last().unwrap().as_c_str(),
            DebugUtils::name(),
        );
    }
}
