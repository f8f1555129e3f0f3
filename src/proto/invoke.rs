//! Invoke消息 - 有序且名称唯一的参数集合

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{INVOKE_HISTORY_UID, PIECE_INDEX, PIECE_SIZE};
use crate::InvokeError;

/// 参数值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ParamValue {
    Integer(i64),
    Unsigned(u64),
    Number(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl ParamValue {
    /// 以非负整数读取参数值
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ParamValue::Integer(v) => u64::try_from(*v).ok(),
            ParamValue::Unsigned(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Integer(v)
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        ParamValue::Unsigned(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(v: Vec<u8>) -> Self {
        ParamValue::Bytes(v)
    }
}

/// 单个命名参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeParameter {
    pub name: String,
    pub value: ParamValue,
}

/// 一次远程调用请求
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Invoke {
    listener: String,
    parameters: Vec<InvokeParameter>,
}

impl Invoke {
    /// 创建指定监听函数名的空消息
    pub fn new(listener: impl Into<String>) -> Self {
        Self {
            listener: listener.into(),
            parameters: Vec::new(),
        }
    }

    /// 链式追加参数
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Result<Self, InvokeError> {
        self.append(name, value)?;
        Ok(self)
    }

    pub fn listener(&self) -> &str {
        &self.listener
    }

    pub fn has(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// 追加参数, 名称重复时报错
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Result<(), InvokeError> {
        let name = name.into();
        if self.has(&name) {
            return Err(InvokeError::NameCollision(name));
        }
        self.parameters.push(InvokeParameter {
            name,
            value: value.into(),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InvokeParameter> {
        self.parameters.iter()
    }

    /// 交给监听函数的实参列表, 不含任务序列号
    pub fn arguments(&self) -> Vec<&ParamValue> {
        self.parameters
            .iter()
            .filter(|p| p.name != INVOKE_HISTORY_UID)
            .map(|p| &p.value)
            .collect()
    }

    pub fn history_uid(&self) -> Option<u64> {
        self.get(INVOKE_HISTORY_UID).and_then(ParamValue::as_u64)
    }

    pub fn piece_index(&self) -> Option<u64> {
        self.get(PIECE_INDEX).and_then(ParamValue::as_u64)
    }

    pub fn piece_size(&self) -> Option<u64> {
        self.get(PIECE_SIZE).and_then(ParamValue::as_u64)
    }
}

impl fmt::Display for Invoke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.listener)?;
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p.name)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_rejects_duplicate_name() {
        let mut invoke = Invoke::new("compute");
        invoke.append("matrix", "m1").unwrap();

        let err = invoke.append("matrix", 3i64).unwrap_err();
        assert_eq!(err, InvokeError::NameCollision("matrix".into()));
        assert_eq!(invoke.len(), 1);
        assert_eq!(invoke.get("matrix"), Some(&ParamValue::Text("m1".into())));
    }

    #[test]
    fn test_arguments_skip_history_uid() {
        let invoke = Invoke::new("compute")
            .with("a", 1i64)
            .unwrap()
            .with(INVOKE_HISTORY_UID, 7u64)
            .unwrap()
            .with("b", 2.5)
            .unwrap();

        let args = invoke.arguments();
        assert_eq!(args, vec![&ParamValue::Integer(1), &ParamValue::Number(2.5)]);
        assert_eq!(invoke.history_uid(), Some(7));
    }

    #[test]
    fn test_offsets_above_i64_keep_full_width() {
        let offset = i64::MAX as u64 + 10;
        let invoke = Invoke::new("compute").with(PIECE_INDEX, offset).unwrap();
        assert_eq!(invoke.piece_index(), Some(offset));

        let json = serde_json::to_string(&invoke).unwrap();
        let decoded: Invoke = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.piece_index(), Some(offset));

        let negative = Invoke::new("compute").with(PIECE_SIZE, -1i64).unwrap();
        assert_eq!(negative.piece_size(), None);
    }

    #[test]
    fn test_reserved_names_survive_json() {
        let invoke = Invoke::new("compute")
            .with(INVOKE_HISTORY_UID, 3u64)
            .unwrap()
            .with(PIECE_INDEX, 40u64)
            .unwrap()
            .with(PIECE_SIZE, 60u64)
            .unwrap();

        let json = serde_json::to_string(&invoke).unwrap();
        assert!(json.contains("\"piece_index\""));
        let decoded: Invoke = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.piece_index(), Some(40));
        assert_eq!(decoded.piece_size(), Some(60));
        assert_eq!(decoded, invoke);
    }
}
