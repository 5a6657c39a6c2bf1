//! 签名与类型描述
//!
//! A `Signature` is a fixed-size list of parameter slots plus a return slot.
//! Any slot may stay unset, which means "unknown" for duck-typed backends.

use super::TypeId;
use crate::core::error::{SignatureError, SignatureResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// 后端命名的类型
///
/// Backends publish their own names for the builtin tags
/// (`"Integer"` for `Int`, `"str"` for `String`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Type {
    id: TypeId,
    name: String,
}

impl Type {
    pub fn new(id: TypeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// A type named after its tag.
    pub fn builtin(id: TypeId) -> Arc<Type> {
        Arc::new(Self::new(id, id.name()))
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> serde_json::Value {
        json!({ "name": self.name, "id": self.id.as_u32() })
    }
}

/// 参数槽
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameter {
    pub name: Option<String>,
    pub ty: Option<Arc<Type>>,
}

/// 函数签名
#[derive(Debug, Clone, Default)]
pub struct Signature {
    params: Vec<Parameter>,
    ret: Option<Arc<Type>>,
    index: HashMap<String, usize>,
}

impl Signature {
    /// 创建签名，所有槽位初始为空
    pub fn new(count: usize) -> Self {
        Self {
            params: vec![Parameter::default(); count],
            ret: None,
            index: HashMap::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.params.len()
    }

    /// 设置参数槽（名称会被复制）
    ///
    /// Out of range indices leave the signature untouched.
    pub fn set(&mut self, index: usize, name: &str, ty: Option<Arc<Type>>) -> SignatureResult<()> {
        let count = self.params.len();
        if index >= count {
            return Err(SignatureError::IndexOutOfRange { index, count });
        }
        if let Some(&existing) = self.index.get(name) {
            if existing != index {
                return Err(SignatureError::DuplicateName(name.to_string()));
            }
        }

        let slot = &mut self.params[index];
        if let Some(old) = slot.name.take() {
            self.index.remove(&old);
        }
        slot.name = Some(name.to_string());
        slot.ty = ty;
        self.index.insert(name.to_string(), index);
        Ok(())
    }

    pub fn set_return(&mut self, ty: Option<Arc<Type>>) {
        self.ret = ty;
    }

    pub fn get_name(&self, index: usize) -> Option<&str> {
        self.params.get(index).and_then(|p| p.name.as_deref())
    }

    pub fn get_type(&self, index: usize) -> Option<&Arc<Type>> {
        self.params.get(index).and_then(|p| p.ty.as_ref())
    }

    pub fn get_return(&self) -> Option<&Arc<Type>> {
        self.ret.as_ref()
    }

    pub fn get_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    /// 调整参数数量；截断时移除被丢弃槽位的名称
    pub fn resize(&mut self, count: usize) {
        for dropped in self.params.iter().skip(count) {
            if let Some(name) = &dropped.name {
                self.index.remove(name);
            }
        }
        self.params.resize(count, Parameter::default());
    }

    /// Every parameter has a type.
    pub fn is_typed(&self) -> bool {
        self.params.iter().all(|p| p.ty.is_some())
    }

    /// Checks the signature against a return tag and argument tags. Unset
    /// slots match anything.
    pub fn compare(&self, ret: Option<TypeId>, args: &[TypeId]) -> bool {
        if args.len() != self.params.len() {
            return false;
        }
        let ret_matches = match (&self.ret, ret) {
            (Some(declared), Some(id)) => declared.id() == id,
            _ => true,
        };
        ret_matches
            && self.params.iter().zip(args).all(|(param, id)| match &param.ty {
                Some(declared) => declared.id() == *id,
                None => true,
            })
    }

    pub fn metadata(&self) -> serde_json::Value {
        let args: Vec<serde_json::Value> = self
            .params
            .iter()
            .map(|p| {
                json!({
                    "name": p.name.as_deref().unwrap_or(""),
                    "type": p.ty.as_ref().map(|t| t.metadata()).unwrap_or_else(|| json!({})),
                })
            })
            .collect();
        json!({
            "ret": { "type": self.ret.as_ref().map(|t| t.metadata()).unwrap_or_else(|| json!({})) },
            "args": args,
        })
    }
}
