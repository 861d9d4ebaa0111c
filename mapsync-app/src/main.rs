use std::path::PathBuf;
use std::process::exit;

use mapsync_config::SyncConfig;
use mapsync_engine::sync::{Synchronizer, load_sources};
use mapsync_io::DxfFacade;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    let mut args = std::env::args().skip(1);
    let mut config_override: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    eprintln!("`--config` 需要提供配置文件路径");
                    exit(1);
                };
                config_override = Some(PathBuf::from(path));
            }
            other => {
                eprintln!("未知参数：{other}");
                exit(1);
            }
        }
    }

    let config = load_configuration(config_override);
    init_logging(&config);
    info!(script_id = %config.script_id, layers = config.layers.len(), "启动 mapsync");

    let synchronizer = match Synchronizer::new(&config) {
        Ok(synchronizer) => synchronizer,
        Err(err) => {
            error!(error = %err, "配置无效");
            exit(1);
        }
    };

    let sources = load_sources(&config);
    let facade = DxfFacade::new();
    match synchronizer.run(&facade, &facade, &sources) {
        Ok(report) if report.failed() > 0 => {
            warn!(failed = report.failed(), "部分图层同步失败，详见日志");
        }
        Ok(_) => {}
        Err(err) => {
            error!(error = %err, "同步失败，文档未保存");
            exit(1);
        }
    }
}

/// 配置错误在修改任何文档之前终止运行。
fn load_configuration(override_path: Option<PathBuf>) -> SyncConfig {
    let loaded = match &override_path {
        Some(path) => SyncConfig::from_file(path),
        None => SyncConfig::discover(),
    };
    loaded.unwrap_or_else(|err| {
        eprintln!("加载配置失败：{err}");
        exit(1);
    })
}

fn init_logging(config: &SyncConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
