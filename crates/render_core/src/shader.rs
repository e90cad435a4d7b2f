//! SPIR-V shader module loading
//!
//! Bytecode length must be a multiple of 4 bytes; the check runs before any
//! native call. Decoding into `u32` words also guarantees the 4-byte base
//! alignment the binary format requires.

use ash::{vk, Device};
use std::fs;
use std::path::Path;

use crate::context::{VulkanError, VulkanResult};

/// Validate and decode SPIR-V bytecode into 32-bit words.
pub(crate) fn decode_spirv(bytes: &[u8]) -> VulkanResult<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(VulkanError::ShaderAlignment { len: bytes.len() });
    }

    let mut words = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        words.push(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(words)
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a shader module from raw SPIR-V bytecode
    pub fn from_bytes(device: Device, bytes: &[u8]) -> VulkanResult<Self> {
        let words = decode_spirv(bytes)?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, module })
    }

    /// Load a shader module from a SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: Device, path: P) -> VulkanResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| VulkanError::ShaderLoad {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_bytes(device, &bytes)
    }

    /// Get the shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_length_not_multiple_of_four() {
        for len in [1, 2, 3, 5, 7, 1023] {
            let bytes = vec![0u8; len];
            let result = decode_spirv(&bytes);
            assert!(
                matches!(result, Err(VulkanError::ShaderAlignment { len: l }) if l == len),
                "length {len} should be rejected"
            );
        }
    }

    #[test]
    fn decodes_words_little_endian() {
        // SPIR-V magic number followed by one zero word.
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x00, 0x00];
        let words = decode_spirv(&bytes).unwrap();
        assert_eq!(words, vec![0x0723_0203, 0]);
    }

    #[test]
    fn empty_bytecode_decodes_to_no_words() {
        assert_eq!(decode_spirv(&[]).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn missing_file_reports_shader_load() {
        let err = fs::read("does/not/exist.spv").unwrap_err();
        // Mirrors the error mapping in from_file without needing a device.
        let mapped = VulkanError::ShaderLoad {
            path: "does/not/exist.spv".into(),
            source: err,
        };
        assert!(mapped.to_string().contains("does/not/exist.spv"));
    }
}
