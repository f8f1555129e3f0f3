//! 按监听函数名分发收到的Invoke

use std::collections::HashMap;
use std::fmt;

use super::{Invoke, ParamValue};

/// 监听函数, 收到的实参不含任务序列号
pub trait InvokeListener: Send + Sync {
    fn on_invoke(&self, arguments: &[&ParamValue]);
}

impl<F> InvokeListener for F
where
    F: Fn(&[&ParamValue]) + Send + Sync,
{
    fn on_invoke(&self, arguments: &[&ParamValue]) {
        (self)(arguments)
    }
}

/// 监听函数名 -> 监听函数
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: HashMap<String, Box<dyn InvokeListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册监听函数, 同名的旧监听函数被替换
    pub fn register(&mut self, name: impl Into<String>, listener: impl InvokeListener + 'static) -> bool {
        self.listeners.insert(name.into(), Box::new(listener)).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.listeners.contains_key(name)
    }

    /// 交给与 `listener` 同名的监听函数; 没有对应监听函数时返回 `false`
    pub fn apply(&self, invoke: &Invoke) -> bool {
        match self.listeners.get(invoke.listener()) {
            Some(listener) => {
                listener.on_invoke(&invoke.arguments());
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.listeners.keys().collect();
        names.sort();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::INVOKE_HISTORY_UID;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_apply_routes_by_listener_name() {
        let total = Arc::new(AtomicI64::new(0));
        let mut registry = ListenerRegistry::new();
        let sink = total.clone();
        registry.register("add", move |args: &[&ParamValue]| {
            for arg in args {
                if let ParamValue::Integer(v) = arg {
                    sink.fetch_add(*v, Ordering::SeqCst);
                }
            }
        });

        let invoke = Invoke::new("add")
            .with("a", 2i64)
            .unwrap()
            .with("b", 5i64)
            .unwrap();
        assert!(registry.apply(&invoke));
        assert_eq!(total.load(Ordering::SeqCst), 7);

        assert!(!registry.apply(&Invoke::new("sub")));
    }

    #[test]
    fn test_history_uid_not_passed_to_listener() {
        let seen = Arc::new(AtomicI64::new(-1));
        let mut registry = ListenerRegistry::new();
        let sink = seen.clone();
        registry.register("count", move |args: &[&ParamValue]| {
            sink.store(args.len() as i64, Ordering::SeqCst);
        });

        let invoke = Invoke::new("count")
            .with(INVOKE_HISTORY_UID, 4u64)
            .unwrap()
            .with("x", 1.0)
            .unwrap();
        registry.apply(&invoke);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(registry.register("count", |_: &[&ParamValue]| {}));
    }
}
