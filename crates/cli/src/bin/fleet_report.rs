use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    fleet_cli::main_entry().await
}
