mod geojson;
mod reader;
mod writer;

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use mapsync_core::document::Document;
use thiserror::Error;
use tracing::{debug, warn};

pub use geojson::{parse_geojson_layer, read_geojson_layer};

/// 图层透明度在 LAYER 表项中以该应用的 1071 扩展数据保存。
pub(crate) const LAYER_TRANSPARENCY_APP: &str = "AcCmTransparency";
/// 视口图层覆盖保存在 LAYER 表项的该应用扩展数据中。
pub(crate) const VIEWPORT_OVERRIDE_APP: &str = "MAPSYNC_VPOVR";

/// 透明度（0.0 不透明 … 1.0 全透明）编码为组码 440 / 1071 的整数。
pub(crate) fn encode_transparency(transparency: f64) -> i32 {
    let alpha = ((1.0 - transparency.clamp(0.0, 1.0)) * 255.0).round() as i32;
    0x0200_0000 | alpha
}

pub(crate) fn decode_transparency(raw: i32) -> Option<f64> {
    if raw & 0x0200_0000 == 0 {
        return None;
    }
    let alpha = f64::from(raw & 0xFF);
    Some(1.0 - alpha / 255.0)
}

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
    #[error("invalid GeoJSON in {path:?}: {message}")]
    InvalidGeoJson { path: PathBuf, message: String },
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

pub trait DocumentSaver {
    fn save(&self, document: &Document, path: &Path) -> Result<(), IoError>;
}

/// 文本 DXF 读写门面。
#[derive(Debug, Default, Clone, Copy)]
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    /// 把文档序列化为 DXF 文本。
    pub fn to_dxf_string(&self, document: &Document) -> String {
        writer::DxfWriter::new(document).write()
    }

    pub fn from_dxf_str(&self, source: &str) -> Result<Document, IoError> {
        reader::DxfParser::new(source).parse().map_err(IoError::from)
    }
}

impl DocumentLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        self.from_dxf_str(&data)
    }
}

impl DocumentSaver for DxfFacade {
    fn save(&self, document: &Document, path: &Path) -> Result<(), IoError> {
        let content = self.to_dxf_string(document);
        fs::write(path, content).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// [`save_with_backup`] 的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub path: PathBuf,
    pub backup: Option<PathBuf>,
}

/// 在原文件名后追加后缀：`city.dxf` → `city.dxf.bak`。
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// 先备份已有输出，再写入临时文件，全部成功后才替换目标文件。
pub fn save_with_backup(
    saver: &dyn DocumentSaver,
    document: &Document,
    output: &Path,
) -> Result<SaveOutcome, IoError> {
    let backup_path = if output.exists() {
        let backup_path = sibling_with_suffix(output, ".bak");
        fs::copy(output, &backup_path).map_err(|source| IoError::WriteError {
            path: backup_path.clone(),
            source,
        })?;
        debug!(backup = %backup_path.display(), "已备份原有输出");
        Some(backup_path)
    } else {
        None
    };

    let temp_path = sibling_with_suffix(output, ".tmp");
    if let Err(err) = saver.save(document, &temp_path) {
        discard_temp(&temp_path);
        return Err(err);
    }
    if let Err(source) = fs::rename(&temp_path, output) {
        discard_temp(&temp_path);
        return Err(IoError::WriteError {
            path: output.to_path_buf(),
            source,
        });
    }

    Ok(SaveOutcome {
        path: output.to_path_buf(),
        backup: backup_path,
    })
}

fn discard_temp(path: &Path) {
    if path.exists() {
        if let Err(err) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %err, "清理临时文件失败");
        }
    }
}

impl From<reader::DxfError> for IoError {
    fn from(err: reader::DxfError) -> Self {
        match err {
            reader::DxfError::Unsupported { feature } => IoError::UnsupportedFeature(feature),
            reader::DxfError::Invalid { message } => IoError::InvalidDocument(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSaver;

    impl DocumentSaver for FailingSaver {
        fn save(&self, _document: &Document, path: &Path) -> Result<(), IoError> {
            fs::write(path, "partial").unwrap();
            Err(IoError::UnsupportedFeature("boom".into()))
        }
    }

    #[test]
    fn transparency_encoding_is_reversible_at_byte_precision() {
        assert_eq!(encode_transparency(0.0), 0x0200_00FF);
        assert_eq!(encode_transparency(1.0), 0x0200_0000);
        let decoded = decode_transparency(encode_transparency(0.5)).unwrap();
        assert!((decoded - 0.5).abs() < 1.0 / 255.0);
        assert_eq!(decode_transparency(0), None);
    }

    #[test]
    fn suffix_is_appended_to_full_file_name() {
        assert_eq!(
            sibling_with_suffix(Path::new("/tmp/out/city.dxf"), ".bak"),
            PathBuf::from("/tmp/out/city.dxf.bak")
        );
    }

    #[test]
    fn backup_is_taken_before_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("map.dxf");
        fs::write(&output, "old contents").unwrap();

        let outcome =
            save_with_backup(&DxfFacade::new(), &Document::default(), &output).unwrap();
        let backup = outcome.backup.expect("backup path");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "old contents");
        assert!(fs::read_to_string(&output).unwrap().contains("EOF"));
        assert!(!sibling_with_suffix(&output, ".tmp").exists());
    }

    #[test]
    fn failed_save_leaves_existing_output_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("map.dxf");
        fs::write(&output, "old contents").unwrap();

        let result = save_with_backup(&FailingSaver, &Document::default(), &output);
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&output).unwrap(), "old contents");
        assert!(!sibling_with_suffix(&output, ".tmp").exists());
        let backup = sibling_with_suffix(&output, ".bak");
        assert_eq!(fs::read_to_string(backup).unwrap(), "old contents");
    }

    #[test]
    fn first_save_needs_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("fresh.dxf");
        let outcome =
            save_with_backup(&DxfFacade::new(), &Document::default(), &output).unwrap();
        assert!(outcome.backup.is_none());
        assert!(output.exists());
    }
}
