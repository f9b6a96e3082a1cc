// 平台相关：系统属性读取与按系统版本选择拦截目标

// 系统属性读取与 API level 解析
pub mod properties;
// 按 API level 选择 connect/open/write 的拦截目标
pub mod hook_plan;

pub use hook_plan::{EntryHook, HookPlan};
pub use properties::{PropertySource, SystemProperties, api_level};
