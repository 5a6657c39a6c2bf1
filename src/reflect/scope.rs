//! 作用域
//!
//! A named symbol table mapping names to `Value`s. Handles and the host each
//! own one; discovery populates a handle's scope and global linkage merges
//! it into the host scope.

use super::{Value, ValueData};
use crate::core::error::{ScopeError, ScopeResult};
use serde_json::json;
use std::collections::HashMap;

/// 重复定义策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefinePolicy {
    /// Existing symbols are kept and the definition fails.
    #[default]
    Reject,
    /// Existing symbols are replaced.
    Overwrite,
}

/// 作用域
#[derive(Debug, Default)]
pub struct Scope {
    name: String,
    objects: HashMap<String, Value>,
}

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// 定义符号；返回被替换的旧值
    pub fn define(&mut self, key: &str, value: Value, policy: DefinePolicy) -> ScopeResult<Option<Value>> {
        if policy == DefinePolicy::Reject && self.objects.contains_key(key) {
            return Err(ScopeError::Duplicate {
                scope: self.name.clone(),
                symbol: key.to_string(),
            });
        }
        tracing::trace!(target: "scope", "Define {} in {}", key, self.name);
        Ok(self.objects.insert(key.to_string(), value))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.objects.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    pub fn undef(&mut self, key: &str) -> ScopeResult<Value> {
        self.objects.remove(key).ok_or_else(|| ScopeError::NotFound {
            scope: self.name.clone(),
            symbol: key.to_string(),
        })
    }

    /// Sorted symbol names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.objects.keys().cloned().collect();
        names.sort();
        names
    }

    /// 将另一个作用域的全部符号并入本作用域
    ///
    /// All-or-nothing: with `Reject`, a single clash leaves `self` untouched.
    pub fn append(&mut self, other: &Scope, policy: DefinePolicy) -> ScopeResult<()> {
        if policy == DefinePolicy::Reject {
            if let Some(clash) = other.names().into_iter().find(|k| self.contains(k)) {
                return Err(ScopeError::Duplicate {
                    scope: self.name.clone(),
                    symbol: clash,
                });
            }
        }
        for (key, value) in &other.objects {
            self.objects.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    /// 移除另一个作用域中出现的符号（仅当值为同一个单元时）
    pub fn remove(&mut self, other: &Scope) -> usize {
        let mut removed = 0;
        for (key, value) in &other.objects {
            if self.objects.get(key).is_some_and(|v| v.ptr_eq(value)) {
                self.objects.remove(key);
                removed += 1;
            }
        }
        removed
    }

    /// Exports the symbols as a `Map` value keyed by name.
    pub fn export(&self) -> Value {
        let pairs = self
            .names()
            .into_iter()
            .filter_map(|k| {
                let value = self.objects.get(&k)?.clone();
                Some((Value::string(k), value))
            })
            .collect();
        Value::map(pairs)
    }

    pub fn metadata(&self) -> serde_json::Value {
        let mut functions = Vec::new();
        let mut classes = Vec::new();
        let mut objects = Vec::new();
        for name in self.names() {
            let Some(value) = self.objects.get(&name) else { continue };
            match &*value.data() {
                ValueData::Function(f) => functions.push(f.metadata()),
                ValueData::Class(c) => classes.push(c.metadata()),
                ValueData::Object(o) => objects.push(o.metadata()),
                other => objects.push(json!({ "name": name, "type": other.type_id().name() })),
            }
        }
        json!({
            "name": self.name,
            "funcs": functions,
            "classes": classes,
            "objects": objects,
        })
    }

    /// 清空作用域并销毁其中的函数与类
    pub fn clear(&mut self) {
        for (key, value) in self.objects.drain() {
            match &*value.data() {
                ValueData::Function(f) => {
                    f.destroy();
                }
                ValueData::Class(c) => {
                    c.destroy();
                }
                _ => {}
            }
            tracing::trace!(target: "scope", "Undefine {} in {}", key, self.name);
        }
    }
}
