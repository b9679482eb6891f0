use std::ffi::CStr;
use std::os::raw::c_char;

use ash::vk;

///Reads a name out of one of Vulkan's fixed size, nul terminated char arrays (layer names, extension names,
/// device names). Returns `None` if the array contains no terminator.
pub fn fixed_array_to_cstr(raw: &[c_char]) -> Option<&CStr> {
    //Safety: c_char and u8 have the same size and alignment.
    let bytes = unsafe { core::slice::from_raw_parts(raw.as_ptr() as *const u8, raw.len()) };
    CStr::from_bytes_until_nul(bytes).ok()
}

///True if either axis of `extent` is zero. Happens for instance while a window is minimized.
pub fn extent_is_zero(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

///Viewport that covers the whole `extent` with the default 0..1 depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

///Scissor rectangle that covers the whole `extent`.
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_array(name: &str) -> [c_char; 256] {
        let mut arr = [0 as c_char; 256];
        for (dst, src) in arr.iter_mut().zip(name.bytes()) {
            *dst = src as c_char;
        }
        arr
    }

    #[test]
    fn parses_fixed_name_arrays() {
        let arr = to_array("VK_LAYER_KHRONOS_validation");
        assert_eq!(
            fixed_array_to_cstr(&arr).unwrap().to_str().unwrap(),
            "VK_LAYER_KHRONOS_validation"
        );
    }

    #[test]
    fn rejects_unterminated_arrays() {
        let arr = [b'a' as c_char; 4];
        assert!(fixed_array_to_cstr(&arr).is_none());
    }

    #[test]
    fn zero_extent_on_any_axis() {
        assert!(extent_is_zero(vk::Extent2D {
            width: 0,
            height: 600
        }));
        assert!(extent_is_zero(vk::Extent2D {
            width: 800,
            height: 0
        }));
        assert!(!extent_is_zero(vk::Extent2D {
            width: 800,
            height: 600
        }));
    }

    #[test]
    fn viewport_and_scissor_cover_extent() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let vp = full_viewport(extent);
        assert_eq!((vp.width, vp.height, vp.max_depth), (1280.0, 720.0, 1.0));
        let sc = full_scissor(extent);
        assert_eq!(sc.extent, extent);
        assert_eq!((sc.offset.x, sc.offset.y), (0, 0));
    }
}
