// 系统属性读取，Android 上走 __system_property_get，宿主机上始终缺失
#[cfg(target_os = "android")]
use std::ffi::{CStr, CString, c_char};

pub const PROP_SDK_NAME: &str = "ro.build.version.sdk";
#[cfg(target_os = "android")]
const SYSTEM_PROP_VALUE_MAX: usize = 92;

#[cfg(target_os = "android")]
unsafe extern "C" {
    fn __system_property_get(name: *const c_char, value: *mut c_char) -> libc::c_int;
}

/// Read-only lookup of platform configuration properties.
pub trait PropertySource: Send + Sync {
    fn get_string(&self, name: &str) -> Option<String>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemProperties;

impl PropertySource for SystemProperties {
    #[cfg(target_os = "android")]
    fn get_string(&self, name: &str) -> Option<String> {
        let prop_name = CString::new(name).ok()?;
        let mut prop_value = [0 as c_char; SYSTEM_PROP_VALUE_MAX];
        let len = unsafe { __system_property_get(prop_name.as_ptr(), prop_value.as_mut_ptr()) };
        if len <= 0 || len as usize >= SYSTEM_PROP_VALUE_MAX {
            return None;
        }
        let value = unsafe { CStr::from_ptr(prop_value.as_ptr()) };
        value.to_str().ok().map(str::to_string)
    }

    #[cfg(not(target_os = "android"))]
    fn get_string(&self, _name: &str) -> Option<String> {
        None
    }
}

// 缺失或无法解析的版本号一律视为 0（不支持拦截）
pub fn api_level(source: &dyn PropertySource) -> i32 {
    source
        .get_string(PROP_SDK_NAME)
        .and_then(|text| text.trim().parse::<i32>().ok())
        .unwrap_or(0)
}
