//! Vulkan device and swapchain bootstrap layer
//!
//! Discovers a suitable GPU, creates the logical device, establishes the
//! presentation surface and swapchain, and provides the baseline resources
//! (render pass, command pool, staging buffer, synchronization primitives,
//! device memory allocation) that rendering layers build on.
//!
//! [`context::VulkanContext`] owns every bootstrap resource; creation runs
//! instance → surface → device → render pass → swapchain → command pool →
//! staging buffer, and teardown mirrors it exactly through RAII drop order.
//! The windowing side is abstracted behind [`window::SurfaceProvider`];
//! [`window::GlfwWindow`] is the stock implementation.

/// Buffer creation and the baseline staging buffer
pub mod buffer;
/// Command pool and primary command buffer
pub mod commands;
/// Renderer configuration
pub mod config;
/// Core context, instance, and device selection
pub mod context;
/// Entry point resolution for optional/mandatory procedures
pub mod loader;
/// Logging front
pub mod logging;
/// Minimal device memory allocation
pub mod memory;
/// Presentation render pass
pub mod render_pass;
/// SPIR-V shader module loading
pub mod shader;
/// Presentation surface wrapper
pub mod surface;
/// Swapchain and per-image resources
pub mod swapchain;
/// Semaphore and fence wrappers
pub mod sync;
/// Surface provider seam and GLFW window
pub mod window;

pub use buffer::{Buffer, StagingBuffer};
pub use commands::CommandPool;
pub use config::{ConfigError, RendererConfig};
pub use context::{
    DebugMessenger, LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanInstance,
    VulkanResult,
};
pub use loader::{load_proc_table, ProcEntry};
pub use memory::{find_memory_type, DeviceAllocation};
pub use render_pass::RenderPass;
pub use shader::ShaderModule;
pub use surface::Surface;
pub use swapchain::Swapchain;
pub use sync::{Fence, Semaphore};
pub use window::{GlfwWindow, SurfaceError, SurfaceProvider};
