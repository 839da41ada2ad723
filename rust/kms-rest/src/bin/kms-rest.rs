use anyhow::Result;
use clap::Parser;
use kms_rest::{Command, Config, KmsRestCli, bootstrap, process_env, serve};
use kms_storage::{FileSystemStorageProvider, MemoryStorageProvider, StorageProvider};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
pub async fn main() -> Result<()> {
    let KmsRestCli {
        command: Command::Start(args),
    } = KmsRestCli::parse();
    let config = args.resolve(process_env)?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match config.storage_path.clone() {
        Some(path) => {
            info!(path = %path.display(), "using file-system storage");
            run(FileSystemStorageProvider::new(path), &config).await
        }
        None => {
            info!("using in-memory storage");
            run(MemoryStorageProvider::default(), &config).await
        }
    }
}

async fn run<Provider>(provider: Provider, config: &Config) -> Result<()>
where
    Provider: StorageProvider,
{
    let service = bootstrap(&provider).await?;

    let listener = TcpListener::bind(&config.host_url).await?;
    info!(host_url = %config.host_url, "starting KMS REST server");

    serve(listener, service, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await;

    Ok(())
}
