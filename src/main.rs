use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    chainhost::host::run_cli().await
}
