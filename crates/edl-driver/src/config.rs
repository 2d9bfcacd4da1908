//! 会话配置
//!
//! 所有字段都有默认值，TOML 中只需写出要覆盖的部分：
//!
//! ```toml
//! output_path = "run1.dat"
//!
//! [acquisition]
//! min_batch_threshold = 20
//!
//! [protocol]
//! kind = "square_wave"
//! hold_mv = -60.0
//! amplitude_mv = 20.0
//! period_ms = 50.0
//! ```

use crate::acquisition::AcquisitionConfig;
use crate::compensation::CompensationConfig;
use crate::error::SessionError;
use crate::modality::WorkingModality;
use crate::protocol::StimulusProtocol;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 默认输出文件名
pub const DEFAULT_OUTPUT_PATH: &str = "data.dat";

/// 一次测量会话的完整配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub modality: WorkingModality,
    pub compensation: CompensationConfig,
    pub protocol: StimulusProtocol,
    pub acquisition: AcquisitionConfig,
    pub disconnect: RetryPolicy,
    pub output_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            modality: WorkingModality::default(),
            compensation: CompensationConfig::default(),
            protocol: StimulusProtocol::default(),
            acquisition: AcquisitionConfig::default(),
            disconnect: RetryPolicy::default(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
        }
    }
}

impl SessionConfig {
    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, SessionError> {
        let config: SessionConfig =
            toml::from_str(content).map_err(|e| SessionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        self.protocol.validate()?;
        if self.output_path.as_os_str().is_empty() {
            return Err(SessionError::Config("output_path is empty".to_string()));
        }
        Ok(())
    }
}
