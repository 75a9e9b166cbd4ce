use jira_extractor::{ExtractorConfig, JiraExtractor, Result};
use std::path::Path;
use tracing::error;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Keboola互換のデータディレクトリ（config.jsonと出力先を含む）
    let data_dir = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("KBC_DATADIR").ok())
        .unwrap_or_else(|| "/data".to_string());

    let code = match run(&data_dir).await {
        Ok(()) => 0,
        Err(e) if e.is_user_error() => {
            error!("{}", e);
            1
        }
        Err(e) => {
            error!("{}", e);
            2
        }
    };

    std::process::exit(code);
}

async fn run(data_dir: &str) -> Result<()> {
    let config = ExtractorConfig::from_json_file(Path::new(data_dir).join("config.json"))?;

    let out_dir = Path::new(data_dir).join("out").join("tables");
    std::fs::create_dir_all(&out_dir)?;

    let extractor = JiraExtractor::new(config, out_dir)?;
    extractor.run().await
}
