//! Window management using GLFW
//!
//! The Vulkan core only depends on the [`SurfaceProvider`] seam; the GLFW
//! window is one implementation of it. Test doubles can drive the core
//! through the same trait.

use ash::vk;
use thiserror::Error;

/// Surface provider errors
#[derive(Error, Debug)]
pub enum SurfaceError {
    /// GLFW initialization failed
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// Window creation failed
    #[error("window creation failed")]
    CreationFailed,

    /// The provider cannot enumerate required instance extensions
    #[error("cannot query required instance extensions")]
    ExtensionQueryFailed,

    /// Native surface creation failed
    #[error("surface creation failed: {0:?}")]
    SurfaceCreationFailed(vk::Result),
}

/// Result type for surface provider operations
pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// Windowing collaborator the Vulkan core builds its surface from
pub trait SurfaceProvider {
    /// Instance extensions the provider requires for surface creation
    fn required_extensions(&self) -> SurfaceResult<Vec<String>>;

    /// Create the native surface against the given instance
    fn create_surface(&mut self, instance: vk::Instance) -> SurfaceResult<vk::SurfaceKHR>;

    /// Current framebuffer extent in pixels
    fn framebuffer_extent(&self) -> (u32, u32);
}

/// GLFW window wrapper with proper resource management
pub struct GlfwWindow {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl GlfwWindow {
    /// Create a window configured for Vulkan rendering
    pub fn new(title: &str, width: u32, height: u32) -> SurfaceResult<Self> {
        let mut glfw =
            glfw::init(glfw::fail_on_errors).map_err(|_| SurfaceError::InitializationFailed)?;

        // No OpenGL context; Vulkan drives the surface
        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(SurfaceError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        Ok(Self {
            glfw,
            window,
            events,
        })
    }

    /// Whether the user requested the window to close
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Pump the platform event queue
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
    }

    /// Drain buffered window events
    pub fn flush_events(&self) -> glfw::FlushedMessages<(f64, glfw::WindowEvent)> {
        glfw::flush_messages(&self.events)
    }

    /// Request the window to close
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }
}

impl SurfaceProvider for GlfwWindow {
    fn required_extensions(&self) -> SurfaceResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or(SurfaceError::ExtensionQueryFailed)
    }

    fn create_surface(&mut self, instance: vk::Instance) -> SurfaceResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(SurfaceError::SurfaceCreationFailed(result))
        }
    }

    fn framebuffer_extent(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width as u32, height as u32)
    }
}
