//! 记录：数据源产出的一行，按判别字段分类后分发

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// 只读记录：判别值 + 字段映射（+ 可选创建时间）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub discriminant: String,
    pub fields: BTreeMap<String, Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn new(discriminant: impl Into<String>) -> Self {
        Self {
            discriminant: discriminant.into(),
            fields: BTreeMap::new(),
            created_at: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// 字段的字符串形式（数字也会被转换），用于日志中的 id 展示
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// 记录标识：依次尝试 id / Id / ID
    pub fn id(&self) -> Option<String> {
        ["id", "Id", "ID"].iter().find_map(|k| self.get_str(k))
    }
}
