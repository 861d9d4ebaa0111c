pub mod decorations;
pub mod envelope;
pub mod lifecycle;
pub mod ownership;
pub mod render;
pub mod style;
pub mod sync;

pub mod errors {
    use mapsync_config::ConfigError;
    use mapsync_core::document::DocumentError;
    use mapsync_io::IoError;
    use thiserror::Error;

    /// 文档级与图层级错误。文档读写失败对整次运行是致命的。
    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error(transparent)]
        Config(#[from] ConfigError),
        #[error(transparent)]
        Io(#[from] IoError),
        #[error(transparent)]
        Document(#[from] DocumentError),
        #[error(transparent)]
        Tag(#[from] TagError),
        #[error("layer {0:?} has no data source")]
        SourceMissing(String),
        #[error("layout {0:?} not found")]
        LayoutNotFound(String),
        #[error("block {0:?} exists and is not owned by this script")]
        ForeignBlock(String),
    }

    /// 单个要素的几何问题；该要素被跳过，其余要素继续处理。
    #[derive(Debug, Error)]
    pub enum GeometryError {
        #[error("{kind} has {count} points, at least {required} required")]
        TooFewPoints {
            kind: &'static str,
            count: usize,
            required: usize,
        },
        #[error("{0} contains non-finite coordinates")]
        NonFinite(&'static str),
        #[error("feature has no geometry")]
        Empty,
        #[error(transparent)]
        Document(#[from] DocumentError),
        #[error(transparent)]
        Tag(#[from] TagError),
    }

    /// 线型、文字样式等资源注册失败。调用方退回默认资源并告警。
    #[derive(Debug, Error)]
    pub enum ResourceError {
        #[error("failed to register linetype {name:?}: {source}")]
        Linetype {
            name: String,
            #[source]
            source: DocumentError,
        },
        #[error("failed to register text style {name:?}: {source}")]
        TextStyle {
            name: String,
            #[source]
            source: DocumentError,
        },
    }

    /// 归属标记读写错误。标记缺失不是错误。
    #[derive(Debug, Error)]
    pub enum TagError {
        #[error("script id {0:?} is not a valid application name")]
        InvalidId(String),
        #[error("malformed ownership tag under {app:?}: {reason}")]
        Malformed { app: String, reason: String },
        #[error(transparent)]
        Write(#[from] DocumentError),
    }
}
