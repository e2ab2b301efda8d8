//! Declarative data source and driver configuration
//!
//! A [`DataSourceConfig`] describes a schema in YAML. [`DataSourceConfig::build`]
//! replays it through the regular registry calls, so a config-built source
//! is validated exactly like one built in code.
//!
//! ```rust
//! use fieldstream::config::DataSourceConfig;
//! use fieldstream::{Kind, SourceKind};
//!
//! let yaml = r#"
//! name: exec
//! kind: array
//! byte_order: big-endian
//! fields:
//!   - name: proc
//!     empty: true
//!   - name: pid
//!     kind: uint32
//!     parent: proc
//! containers:
//!   - size: 16
//!     members:
//!       - { name: comm, kind: cstring, offs: 0, size: 16 }
//! "#;
//!
//! let source = DataSourceConfig::from_yaml_str(yaml).unwrap().build().unwrap();
//! assert_eq!(source.kind(), SourceKind::Array);
//! assert_eq!(source.get_field("proc.pid").unwrap().kind(), Kind::Uint32);
//! assert_eq!(source.payload_count(), 2);
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{ByteOrder, FieldOptions, Kind, SourceKind, StaticField};
use crate::{DataSource, DataSourceError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub name: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Dynamic fields, added in order
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    /// Static containers, added after the dynamic fields
    #[serde(default)]
    pub containers: Vec<ContainerConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub name: String,
    pub kind: Kind,
    /// Name of a previously declared field
    pub parent: Option<String>,
    pub empty: bool,
    pub hidden: bool,
    pub tags: Vec<String>,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub size: u32,
    pub members: Vec<MemberConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberConfig {
    pub name: String,
    pub kind: Kind,
    pub offs: u32,
    #[serde(default)]
    pub size: u32,
    /// Name of another member of the same container
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl DataSourceConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml_ng::from_str(yaml).map_err(|e| DataSourceError::Config {
            context: "data source YAML".to_string(),
            details: e.to_string(),
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|source| DataSourceError::File { path: path.to_path_buf(), source })?;
        debug!(path = %path.display(), bytes = yaml.len(), "Loaded data source config");
        Self::from_yaml_str(&yaml)
    }

    /// Creates the described data source.
    pub fn build(&self) -> Result<DataSource> {
        let source = DataSource::with_byte_order(&self.name, self.kind, self.byte_order);
        for tag in &self.tags {
            source.add_tag(tag);
        }
        for (key, value) in &self.annotations {
            source.add_annotation(key, value);
        }

        for field in &self.fields {
            let mut options = FieldOptions::new().tags(field.tags.iter().cloned());
            for (key, value) in &field.annotations {
                options = options.annotation(key, value);
            }
            if field.empty {
                options = options.empty();
            }
            if field.hidden {
                options = options.hidden();
            }
            if let Some(parent) = &field.parent {
                let parent = source.get_field(parent).ok_or_else(|| DataSourceError::Config {
                    context: format!("field {:?}", field.name),
                    details: format!("parent {parent:?} is not declared before it"),
                })?;
                options = options.parent(&parent);
            }
            source.add_field(&field.name, field.kind, options)?;
        }

        for container in &self.containers {
            let members = container
                .members
                .iter()
                .map(|m| m.to_static_field(&container.members))
                .collect::<Result<Vec<_>>>()?;
            source.add_static_fields(container.size, &members)?;
        }

        Ok(source)
    }
}

impl MemberConfig {
    fn to_static_field(&self, batch: &[MemberConfig]) -> Result<StaticField> {
        let mut spec = StaticField::new(&self.name, self.kind, self.offs).with_size(self.size);
        if let Some(parent) = &self.parent {
            let index = batch.iter().position(|m| &m.name == parent).ok_or_else(|| {
                DataSourceError::Config {
                    context: format!("member {:?}", self.name),
                    details: format!("parent {parent:?} is not a member of the same container"),
                }
            })?;
            spec = spec.with_parent(index);
        }
        if self.hidden {
            spec = spec.hidden();
        }
        for tag in &self.tags {
            spec = spec.tag(tag);
        }
        for (key, value) in &self.annotations {
            spec = spec.annotation(key, value);
        }
        Ok(spec)
    }
}

/// Producer loop settings for [`Driver`](crate::Driver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Consecutive provider errors tolerated before the driver stops
    pub max_errors: u32,
    /// Base delay of the exponential backoff after a provider error
    pub backoff_base_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_errors: 10, backoff_base_ms: 50 }
    }
}

impl DriverConfig {
    /// Backoff after the `error_count`-th consecutive error: `base * 2^error_count`, capped at 32x base.
    pub fn backoff(&self, error_count: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1 << error_count.min(5)))
    }
}
