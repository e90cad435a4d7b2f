//! Entry point resolution for instance- and device-level procedures
//!
//! Extension functions are not guaranteed to resolve; each table entry
//! declares whether a miss is fatal. Optional misses leave the slot empty and
//! are reported as warnings, so callers of extension-gated functions must
//! check the slot before use.

use ash::vk;
use std::ffi::CStr;

use crate::context::{VulkanError, VulkanResult};

/// One named entry point to resolve into a slot
pub struct ProcEntry {
    /// Symbol name as passed to the resolver
    pub name: &'static CStr,
    /// Whether a resolution failure aborts loading
    pub mandatory: bool,
}

impl ProcEntry {
    /// Entry whose absence fails the whole table load
    pub const fn mandatory(name: &'static CStr) -> Self {
        Self {
            name,
            mandatory: true,
        }
    }

    /// Entry whose absence is tolerated with a warning
    pub const fn optional(name: &'static CStr) -> Self {
        Self {
            name,
            mandatory: false,
        }
    }
}

/// Resolve each entry through `resolve` into one slot per entry.
///
/// A missing mandatory entry aborts with [`VulkanError::FunctionNotFound`];
/// a missing optional entry leaves its slot `None` and loading continues.
pub fn load_proc_table<R>(
    mut resolve: R,
    entries: &[ProcEntry],
) -> VulkanResult<Vec<vk::PFN_vkVoidFunction>>
where
    R: FnMut(&CStr) -> vk::PFN_vkVoidFunction,
{
    let mut slots = Vec::with_capacity(entries.len());
    for entry in entries {
        let slot = resolve(entry.name);
        if slot.is_none() {
            if entry.mandatory {
                return Err(VulkanError::FunctionNotFound(
                    entry.name.to_string_lossy().into_owned(),
                ));
            }
            log::warn!("Function {} was not loaded", entry.name.to_string_lossy());
        }
        slots.push(slot);
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "system" fn stub() {}

    fn name(bytes: &'static [u8]) -> &'static CStr {
        CStr::from_bytes_with_nul(bytes).unwrap()
    }

    #[test]
    fn resolves_all_entries_into_slots() {
        let entries = [
            ProcEntry::mandatory(name(b"vkAlpha\0")),
            ProcEntry::optional(name(b"vkBeta\0")),
        ];

        let slots = load_proc_table(|_| Some(stub as _), &entries).unwrap();

        assert_eq!(slots.len(), entries.len());
        assert!(slots.iter().all(Option::is_some));
    }

    #[test]
    fn missing_optional_entry_leaves_slot_empty() {
        let entries = [
            ProcEntry::mandatory(name(b"vkAlpha\0")),
            ProcEntry::optional(name(b"vkMissingExt\0")),
        ];

        let slots = load_proc_table(
            |sym| {
                if sym == name(b"vkMissingExt\0") {
                    None
                } else {
                    Some(stub as _)
                }
            },
            &entries,
        )
        .unwrap();

        assert_eq!(slots.len(), entries.len());
        assert!(slots[0].is_some());
        assert!(slots[1].is_none());
    }

    #[test]
    fn missing_mandatory_entry_is_an_error() {
        let entries = [ProcEntry::mandatory(name(b"vkCreateDevice\0"))];

        let result = load_proc_table(|_| None, &entries);

        assert!(matches!(
            result,
            Err(VulkanError::FunctionNotFound(ref sym)) if sym == "vkCreateDevice"
        ));
    }

    #[test]
    fn yields_one_slot_per_entry_even_with_misses() {
        // Every entry gets a slot; a trailing mandatory entry cannot be
        // skipped by a short output.
        let entries = [
            ProcEntry::optional(name(b"vkMissingExt\0")),
            ProcEntry::mandatory(name(b"vkAlpha\0")),
            ProcEntry::optional(name(b"vkBeta\0")),
        ];

        let slots = load_proc_table(
            |sym| {
                if sym == name(b"vkMissingExt\0") {
                    None
                } else {
                    Some(stub as _)
                }
            },
            &entries,
        )
        .unwrap();

        assert_eq!(slots.len(), 3);
        assert!(slots[0].is_none());
        assert!(slots[1].is_some());
        assert!(slots[2].is_some());
    }
}
