use std::fs;
use std::path::Path;
use std::process;

use kabu_trader::model::{default_config_yaml, TradingConfig};
use kabu_trader::trader::AutoTrader;
use tokio::runtime::Builder;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH_ENV: &str = "KABU_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config/trade-config.yaml";

// 設定ファイルが無ければテンプレートを書き出して終了する
fn load_config(config_path: &str) -> Option<TradingConfig> {
    let path = Path::new(config_path);
    if !path.exists() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory: {}", e);
                return None;
            }
        }
        match fs::write(path, default_config_yaml()) {
            Ok(()) => info!(
                "設定ファイルを作成しました: {} (api_password を設定してから再実行してください)",
                config_path
            ),
            Err(e) => error!("Failed to write config template: {}", e),
        }
        return None;
    }

    let yaml_str = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to read config file {}: {}", config_path, e);
            return None;
        }
    };
    match TradingConfig::from_yaml(&yaml_str) {
        Ok(config) => Some(config),
        Err(e) => {
            error!("Failed to parse config file {}: {}", config_path, e);
            None
        }
    }
}

// バイナリ自身のログ (設定テンプレート作成の案内など) も info で出す
fn env_filter() -> EnvFilter {
    EnvFilter::from_default_env()
        .add_directive("kabu_trader=info".parse().unwrap())
        .add_directive("auto_trader=info".parse().unwrap())
}

fn main() {
    // トレーシング初期化 (RUST_LOG環境変数でログレベル制御)
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .init();

    let config_path = std::env::var(CONFIG_PATH_ENV)
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let Some(config) = load_config(&config_path) else {
        process::exit(1);
    };
    info!(
        "Config loaded: symbols={:?} max_positions={} sl={} tp={}",
        config.symbols, config.max_positions, config.stop_loss_ratio, config.take_profit_ratio
    );

    let runtime = Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    let result = runtime.block_on(async move {
        let mut trader = AutoTrader::new(config)?;
        trader.start().await
    });

    if let Err(e) = result {
        error!("自動売買を終了します: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_enables_binary_target() {
        let filter = env_filter().to_string();
        assert!(filter.contains("auto_trader=info"));
        assert!(filter.contains("kabu_trader=info"));
    }

    #[test]
    fn missing_config_writes_template() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("kabu_trader_config_{}", nanos));
        let path = dir.join("trade-config.yaml");
        let path_str = path.to_string_lossy().to_string();

        assert!(load_config(&path_str).is_none());
        assert_eq!(fs::read_to_string(&path).unwrap(), default_config_yaml());

        // 2回目はテンプレートをそのまま読み込める
        let config = load_config(&path_str).unwrap();
        assert_eq!(config.symbols.len(), 10);

        let _ = fs::remove_dir_all(&dir);
    }
}
