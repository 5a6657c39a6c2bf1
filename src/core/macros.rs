//! 核心宏定义
//!
//! 提供统一的宏来减少代码重复

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// use polyglot_core::impl_default;
///
/// struct ExecutionPaths {
///     paths: Vec<String>,
///     lazy: bool,
/// }
///
/// impl_default!(ExecutionPaths {
///     paths: vec![".".to_string()],
///     lazy: true,
/// });
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}

/// 同时实现Default和new()的宏
///
/// 使用示例:
/// ```rust
/// use polyglot_core::impl_default_and_new;
///
/// struct Counter {
///     hits: u64,
/// }
///
/// impl_default_and_new!(Counter { hits: 0 });
/// ```
#[macro_export]
macro_rules! impl_default_and_new {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }

        impl $struct_name {
            pub fn new() -> Self {
                Self::default()
            }
        }
    };
}
