//! 加载层
//!
//! - `backend` - 后端接口与加载来源
//! - `registry` - 后端注册表与句柄管理
//! - `dynlink` - 共享库后端
//! - `path` - 路径工具

pub mod backend;
pub mod dynlink;
pub mod path;
pub mod registry;

pub use backend::{module_ref, Backend, BackendFactory, BackendModule, Export, Linkage, LoadSource};
pub use dynlink::DynlinkFactory;
pub use path::{path_extension, path_is_absolute, path_name, resolve_script};
pub use registry::{HandleId, LoaderRegistry};
